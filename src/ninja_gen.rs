//! Ninja file generator.
//!
//! Converts a [`crate::graph::BuildGraph`] into the textual representation
//! expected by the Ninja build system. Rules are emitted sorted by name and
//! edges in assembly order, so output is deterministic for a fixed graph.

use crate::graph::{BuildEdge, BuildGraph, Rule};
use camino::Utf8PathBuf;
use itertools::Itertools;
use std::fmt::{self, Display, Formatter, Write};

macro_rules! write_kv {
    ($f:expr, $key:expr, $opt:expr) => {
        if let Some(val) = $opt {
            writeln!($f, "  {} = {}", $key, val)?;
        }
    };
}

/// Generate a Ninja build file as a string.
///
/// # Errors
///
/// Returns an error when an edge references an unregistered rule.
pub fn generate(graph: &BuildGraph) -> Result<String, NinjaGenError> {
    for edge in &graph.edges {
        if !edge.phony && !graph.rules.contains_key(&edge.rule) {
            return Err(NinjaGenError::UnknownRule {
                rule: edge.rule.clone(),
            });
        }
    }

    let mut out = String::new();
    for (key, value) in &graph.variables {
        let _ = writeln!(out, "{key} = {value}");
    }
    if !graph.variables.is_empty() {
        let _ = writeln!(out);
    }
    let mut names: Vec<&String> = graph.rules.keys().collect();
    names.sort();
    for name in names {
        if let Some(rule) = graph.rules.get(name) {
            let _ = write!(out, "{}", NamedRule { name, rule });
        }
    }
    for edge in &graph.edges {
        let _ = write!(out, "{}", DisplayEdge { edge });
    }
    if !graph.defaults.is_empty() {
        let _ = writeln!(out, "default {}", join(&graph.defaults));
    }
    Ok(out)
}

/// Errors raised while rendering a graph.
#[derive(Debug, thiserror::Error)]
pub enum NinjaGenError {
    /// An edge references a rule that was never registered.
    #[error("build edge references unknown rule {rule}")]
    UnknownRule {
        /// Name of the missing rule.
        rule: String,
    },
}

/// Escape Ninja-significant characters in a path.
fn escape(path: &Utf8PathBuf) -> String {
    path.as_str()
        .replace('$', "$$")
        .replace(' ', "$ ")
        .replace(':', "$:")
}

fn join(paths: &[Utf8PathBuf]) -> String {
    paths.iter().map(escape).join(" ")
}

struct NamedRule<'a> {
    name: &'a str,
    rule: &'a Rule,
}

impl Display for NamedRule<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "rule {}", self.name)?;
        writeln!(f, "  command = {}", self.rule.command)?;
        write_kv!(f, "description", &self.rule.description);
        write_kv!(f, "depfile", &self.rule.depfile);
        write_kv!(f, "deps", &self.rule.deps_format);
        writeln!(f)
    }
}

struct DisplayEdge<'a> {
    edge: &'a BuildEdge,
}

impl Display for DisplayEdge<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rule = if self.edge.phony {
            "phony"
        } else {
            &self.edge.rule
        };
        write!(f, "build {}: {rule}", join(&self.edge.outputs))?;
        if !self.edge.inputs.is_empty() {
            write!(f, " {}", join(&self.edge.inputs))?;
        }
        if !self.edge.implicit_inputs.is_empty() {
            write!(f, " | {}", join(&self.edge.implicit_inputs))?;
        }
        if !self.edge.order_only.is_empty() {
            write!(f, " || {}", join(&self.edge.order_only))?;
        }
        writeln!(f)?;
        for (key, value) in &self.edge.variables {
            writeln!(f, "  {key} = {value}")?;
        }
        writeln!(f)
    }
}
