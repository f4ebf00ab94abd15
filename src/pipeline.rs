//! The shared configure/harvest/assemble pipeline.
//!
//! The primary project, the bootloader, and the ULP sub-build all follow
//! the same translation sequence: acquire a codemodel, assemble every
//! static/object-library target into a component archive, classify the
//! executable's flags and link fragments, resolve the ordered dependency
//! list, and stitch the link step. This module holds the stages the
//! runner and the sub-builds compose.

use crate::assemble::{self, LinkExtras};
use crate::codemodel::{CodemodelLoader, TargetConfig, TargetType};
use crate::context::ProjectContext;
use crate::deps::{ComponentEntry, ComponentMap, find_lib_deps};
use crate::flags::{app_flags, prepare_compile_envs};
use crate::graph::BuildGraph;
use crate::linkargs::{ResolvedLinkArgs, extract_link_args};
use anyhow::{Result, bail};
use camino::Utf8PathBuf;
use std::rc::Rc;
use tracing::{debug, warn};

/// Targets gathered from one codemodel: the component registry (with
/// archive edges already in the graph) and the executables found.
#[derive(Debug)]
pub struct Collected {
    /// Insertion-ordered component registry keyed by target id.
    pub components: ComponentMap,
    /// Executable targets in codemodel order.
    pub executables: Vec<Rc<TargetConfig>>,
}

/// Load every target of the codemodel, assembling component archives into
/// `graph` and collecting executables.
///
/// # Errors
///
/// Returns an error when a target document cannot be loaded or a component
/// cannot be assembled.
pub fn collect_targets(
    graph: &mut BuildGraph,
    ctx: &ProjectContext,
    loader: &mut CodemodelLoader,
    debug: bool,
) -> Result<Collected> {
    let mut components = ComponentMap::new();
    let mut executables = Vec::new();
    for target_ref in loader.target_refs()? {
        let config = loader.target(&target_ref)?;
        match config.target_type {
            TargetType::Executable => executables.push(config),
            kind if kind.is_component() => {
                let envs = prepare_compile_envs(&config, debug);
                let lib = assemble::assemble_component(graph, ctx, &config, &envs)?;
                components.insert(
                    config.id.clone(),
                    ComponentEntry {
                        config: Rc::clone(&config),
                        lib,
                    },
                );
            }
            _ => debug!(target = %config.name, "skipping non-buildable target"),
        }
    }
    Ok(Collected {
        components,
        executables,
    })
}

/// Pick the executable target for linking: the first one found, warning
/// when the codemodel exposes several.
///
/// # Errors
///
/// Returns an error when no executable-type target exists.
pub fn select_executable(collected: &Collected) -> Result<Rc<TargetConfig>> {
    let Some(first) = collected.executables.first() else {
        bail!("no executable-type target found in the codemodel");
    };
    if collected.executables.len() > 1 {
        let names: Vec<&str> = collected
            .executables
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        warn!(candidates = ?names, "multiple executable targets found; using the first");
    }
    Ok(Rc::clone(first))
}

/// Classified link arguments plus the resolved component ordering for one
/// executable.
#[derive(Debug)]
pub struct Resolution {
    /// Output of the link-argument classifier.
    pub link_args: ResolvedLinkArgs,
    /// Dependency-ordered component ids.
    pub lib_deps: Vec<String>,
}

/// Classify the executable's link fragments and resolve its ordered
/// component dependency list.
#[must_use]
pub fn resolve(
    components: &ComponentMap,
    exe: &TargetConfig,
    ignore_ids: &[String],
) -> Resolution {
    let link_args = extract_link_args(exe);
    let lib_deps = find_lib_deps(components, exe, &link_args, ignore_ids);
    Resolution {
        link_args,
        lib_deps,
    }
}

/// Assemble the program link step from a completed resolution.
///
/// # Errors
///
/// Returns an error when the executable target cannot be assembled.
pub fn link(
    graph: &mut BuildGraph,
    ctx: &ProjectContext,
    exe: &TargetConfig,
    components: &ComponentMap,
    resolution: &Resolution,
    extras: &LinkExtras,
    debug: bool,
) -> Result<Utf8PathBuf> {
    let envs = prepare_compile_envs(exe, debug);
    let app = app_flags(exe, debug);
    let ordered: Vec<&ComponentEntry> = resolution
        .lib_deps
        .iter()
        .filter_map(|id| components.get(id))
        .collect();
    assemble::assemble_program(
        graph,
        ctx,
        exe,
        &envs,
        &app,
        &resolution.link_args,
        &ordered,
        extras,
    )
}

/// Resolved archive paths of the ordered dependency list, used for the
/// linker-script generator's library ordering.
#[must_use]
pub fn ordered_archives(components: &ComponentMap, lib_deps: &[String]) -> Vec<String> {
    lib_deps
        .iter()
        .filter_map(|id| components.get(id))
        .map(|entry| entry.lib.as_str().to_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn executable(name: &str, id: &str) -> Rc<TargetConfig> {
        let json = format!(
            r#"{{"name": "{name}", "id": "{id}", "type": "EXECUTABLE",
                 "nameOnDisk": "{name}"}}"#
        );
        Rc::new(serde_json::from_str(&json).expect("target"))
    }

    #[rstest]
    fn no_executable_target_is_fatal() {
        let collected = Collected {
            components: ComponentMap::new(),
            executables: Vec::new(),
        };
        let err = select_executable(&collected).expect_err("no executable");
        assert!(err.to_string().contains("no executable-type target"), "{err}");
    }

    #[rstest]
    fn multiple_executables_pick_the_first() {
        let collected = Collected {
            components: ComponentMap::new(),
            executables: vec![
                executable("blink.elf", "blink::@1"),
                executable("selftest.elf", "selftest::@2"),
            ],
        };
        let exe = select_executable(&collected).expect("first executable");
        assert_eq!(exe.name, "blink.elf");
    }
}
