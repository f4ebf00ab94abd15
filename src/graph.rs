//! Backend build-graph structures.
//!
//! The native build graph tsugite assembles from the codemodel. It mirrors
//! the conceptual model of Ninja without embedding Ninja syntax: named
//! rules with variable placeholders, edges binding outputs to inputs with
//! per-edge variable overrides, and a list of default targets.
//!
//! # Examples
//!
//! ```
//! use tsugite::graph::{BuildEdge, BuildGraph, Rule};
//! use camino::Utf8PathBuf;
//!
//! let mut graph = BuildGraph::default();
//! graph.rules.insert(
//!     "cc".into(),
//!     Rule::new("gcc $flags -c $in -o $out"),
//! );
//! graph.edges.push(BuildEdge::new(
//!     "cc",
//!     vec![Utf8PathBuf::from("main.o")],
//!     vec![Utf8PathBuf::from("main.c")],
//! ));
//! graph.defaults.push(Utf8PathBuf::from("main.o"));
//! ```

use camino::Utf8PathBuf;
use indexmap::IndexMap;

/// A reusable command template referenced by edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Command line with `$variable` placeholders.
    pub command: String,
    /// Optional human-friendly summary.
    pub description: Option<String>,
    /// Dependency file written by the command, if any.
    pub depfile: Option<String>,
    /// Dependency format consumed from the depfile (e.g. `gcc`).
    pub deps_format: Option<String>,
}

impl Rule {
    /// A rule with the given command and no extras.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: None,
            depfile: None,
            deps_format: None,
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a gcc-style depfile contract.
    #[must_use]
    pub fn with_gcc_depfile(mut self) -> Self {
        self.depfile = Some("$out.d".into());
        self.deps_format = Some("gcc".into());
        self
    }
}

/// One build statement binding outputs to inputs under a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEdge {
    /// Name of the rule executed for this edge.
    pub rule: String,
    /// Files produced by the edge.
    pub outputs: Vec<Utf8PathBuf>,
    /// Files consumed by the edge.
    pub inputs: Vec<Utf8PathBuf>,
    /// Dependencies that rebuild the edge when changed but are not passed
    /// on the command line.
    pub implicit_inputs: Vec<Utf8PathBuf>,
    /// Ordering-only prerequisites.
    pub order_only: Vec<Utf8PathBuf>,
    /// Per-edge variable overrides, emitted in insertion order.
    pub variables: IndexMap<String, String>,
    /// Whether this edge is a phony alias rather than a real command.
    pub phony: bool,
}

impl BuildEdge {
    /// An edge with the given rule, outputs, and inputs.
    #[must_use]
    pub fn new(rule: impl Into<String>, outputs: Vec<Utf8PathBuf>, inputs: Vec<Utf8PathBuf>) -> Self {
        Self {
            rule: rule.into(),
            outputs,
            inputs,
            implicit_inputs: Vec::new(),
            order_only: Vec::new(),
            variables: IndexMap::new(),
            phony: false,
        }
    }

    /// Set a per-edge variable, skipping empty values.
    pub fn set_var(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.variables.insert(key.to_owned(), value);
        }
    }
}

/// The assembled native build graph.
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    /// Top-level variables, emitted before the rules in insertion order.
    pub variables: IndexMap<String, String>,
    /// Rules keyed by name.
    pub rules: IndexMap<String, Rule>,
    /// Edges in assembly order.
    pub edges: Vec<BuildEdge>,
    /// Targets built when none are requested.
    pub defaults: Vec<Utf8PathBuf>,
}

impl BuildGraph {
    /// Set a top-level variable, skipping empty values.
    pub fn variable(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.variables.insert(key.to_owned(), value);
        }
    }

    /// Register `rule` under `name`, keeping an existing definition.
    pub fn rule(&mut self, name: &str, rule: Rule) {
        self.rules.entry(name.to_owned()).or_insert(rule);
    }

    /// Append an edge.
    pub fn edge(&mut self, edge: BuildEdge) {
        self.edges.push(edge);
    }
}
