//! Inter-component dependency resolution.
//!
//! The final ordered library list for a linked target is the union of the
//! explicit dependency edges the generator exposed and the static/object
//! components whose on-disk archive name matches an implicit-dependency
//! archive discovered by link-fragment classification. Components live in an
//! insertion-ordered registry so resolution is deterministic for a fixed
//! codemodel; no cycle detection is performed, the link step's repeated-scan
//! group tolerates duplicate or cyclic archive references.

use crate::codemodel::TargetConfig;
use crate::linkargs::ResolvedLinkArgs;
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use std::rc::Rc;

/// A component selected for building: its codemodel target plus the archive
/// path the assembler will produce for it. Immutable once created.
#[derive(Debug, Clone)]
pub struct ComponentEntry {
    /// The component's target description.
    pub config: Rc<TargetConfig>,
    /// Build-tree path of the component's archive.
    pub lib: Utf8PathBuf,
}

/// Insertion-ordered registry of components keyed by target id.
pub type ComponentMap = IndexMap<String, ComponentEntry>;

fn ignored(id: &str, ignore_ids: &[String]) -> bool {
    ignore_ids.iter().any(|prefix| id.starts_with(prefix.as_str()))
}

/// Resolve the ordered list of component ids `target` must link against.
///
/// Explicit edges come first in the generator's listed order, then implicit
/// archive-name matches in registry insertion order, deduplicated while
/// preserving first-seen order. Ids prefixed by an entry of `ignore_ids`
/// are excluded, which is how a target is kept out of its own dependency
/// list.
#[must_use]
pub fn find_lib_deps(
    components: &ComponentMap,
    target: &TargetConfig,
    link_args: &ResolvedLinkArgs,
    ignore_ids: &[String],
) -> Vec<String> {
    let mut deps: Vec<String> = Vec::new();

    for edge in &target.dependencies {
        if ignored(&edge.id, ignore_ids) || !components.contains_key(&edge.id) {
            continue;
        }
        if !deps.contains(&edge.id) {
            deps.push(edge.id.clone());
        }
    }

    for (id, entry) in components {
        if deps.contains(id) || ignored(id, ignore_ids) {
            continue;
        }
        if !entry.config.target_type.is_component() {
            continue;
        }
        let name = entry.config.artifact_name();
        if link_args.implicit_lib_deps.iter().any(|dep| dep == name) {
            deps.push(id.clone());
        }
    }

    deps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linkargs::ResolvedLinkArgs;
    use rstest::rstest;

    fn component(id: &str, name_on_disk: &str) -> (String, ComponentEntry) {
        let json = format!(
            r#"{{"name": "{name_on_disk}", "id": "{id}", "type": "STATIC_LIBRARY",
                 "nameOnDisk": "{name_on_disk}"}}"#
        );
        let config: TargetConfig = serde_json::from_str(&json).expect("component");
        (
            id.to_owned(),
            ComponentEntry {
                config: Rc::new(config),
                lib: Utf8PathBuf::from(format!("esp-idf/{name_on_disk}")),
            },
        )
    }

    fn exe_with_deps(deps: &[&str]) -> TargetConfig {
        let edges = deps
            .iter()
            .map(|id| format!(r#"{{"id": "{id}"}}"#))
            .collect::<Vec<_>>()
            .join(",");
        let json = format!(
            r#"{{"name": "app.elf", "id": "app::@1", "type": "EXECUTABLE",
                 "dependencies": [{edges}]}}"#
        );
        serde_json::from_str(&json).expect("exe")
    }

    #[rstest]
    fn explicit_edges_come_first_in_listed_order() {
        let mut components = ComponentMap::new();
        for (id, entry) in [component("liba::@2", "liba.a"), component("libb::@3", "libb.a")] {
            components.insert(id, entry);
        }
        let target = exe_with_deps(&["libb::@3", "liba::@2"]);
        let deps = find_lib_deps(&components, &target, &ResolvedLinkArgs::default(), &[]);
        assert_eq!(deps, vec!["libb::@3", "liba::@2"]);
    }

    #[rstest]
    fn implicit_matches_append_after_explicit_edges() {
        let mut components = ComponentMap::new();
        for (id, entry) in [component("liba::@2", "liba.a"), component("libb::@3", "libb.a")] {
            components.insert(id, entry);
        }
        let target = exe_with_deps(&["liba::@2"]);
        let link_args = ResolvedLinkArgs {
            implicit_lib_deps: vec!["libb.a".into()],
            ..ResolvedLinkArgs::default()
        };
        let deps = find_lib_deps(&components, &target, &link_args, &[]);
        assert_eq!(deps, vec!["liba::@2", "libb::@3"]);
    }

    #[rstest]
    fn ignore_prefix_excludes_own_target() {
        let mut components = ComponentMap::new();
        for (id, entry) in [component("app::@1", "libapp.a"), component("liba::@2", "liba.a")] {
            components.insert(id, entry);
        }
        let target = exe_with_deps(&["app::@1", "liba::@2"]);
        let deps = find_lib_deps(
            &components,
            &target,
            &ResolvedLinkArgs::default(),
            &["app::".to_owned()],
        );
        assert_eq!(deps, vec!["liba::@2"]);
    }

    #[rstest]
    fn resolution_is_deterministic() {
        let mut components = ComponentMap::new();
        for (id, entry) in [
            component("liba::@2", "liba.a"),
            component("libb::@3", "libb.a"),
            component("libc::@4", "libc.a"),
        ] {
            components.insert(id, entry);
        }
        let target = exe_with_deps(&["libc::@4"]);
        let link_args = ResolvedLinkArgs {
            implicit_lib_deps: vec!["libb.a".into(), "liba.a".into()],
            ..ResolvedLinkArgs::default()
        };
        let first = find_lib_deps(&components, &target, &link_args, &[]);
        let second = find_lib_deps(&components, &target, &link_args, &[]);
        assert_eq!(first, second);
        assert_eq!(first, vec!["libc::@4", "liba::@2", "libb::@3"]);
    }
}
