//! Linker-script generation.
//!
//! Merges the linker fragments every framework component contributes with a
//! base script template and the resolved library ordering. The libraries
//! list file the upstream link-generation script consumes is filtered to a
//! derived copy that drops the project's own archive, so the script never
//! tries to place the output image inside itself and repeated invocations
//! stay idempotent.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use minijinja::{Environment, UndefinedBehavior, context};
use std::fs;
use tracing::debug;

/// Service files collected from each immediate component subdirectory:
/// the linker fragment and the two configuration-option files.
pub const SERVICE_FILES: &[&str] = &["linker.lf", "sdkconfig.rename", "Kconfig"];
/// Fixed default fragment merged into every script, relative to the
/// component tree.
pub const DEFAULT_FRAGMENT: &str = "esp_common/common.lf";
/// Suffix of the derived (filtered) libraries list copy.
pub const FILTERED_SUFFIX: &str = ".filtered";

/// Fragment and option files discovered for one script generation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentSet {
    /// Linker fragment files (`linker.lf`).
    pub fragments: Vec<Utf8PathBuf>,
    /// Configuration-option files (`sdkconfig.rename`, `Kconfig`).
    pub config_files: Vec<Utf8PathBuf>,
}

/// Collect service files from every immediate subdirectory of the
/// component tree, plus the fixed default fragment.
///
/// # Errors
///
/// Returns an error when the component tree cannot be read.
pub fn collect_fragments(components_dir: &Utf8Path) -> Result<FragmentSet> {
    let mut set = FragmentSet::default();
    let default_fragment = components_dir.join(DEFAULT_FRAGMENT);
    if default_fragment.is_file() {
        set.fragments.push(default_fragment);
    }

    let mut subdirs: Vec<Utf8PathBuf> = fs::read_dir(components_dir.as_std_path())
        .with_context(|| format!("failed to read component tree {components_dir}"))?
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
        .collect();
    subdirs.sort();

    for dir in subdirs {
        for name in SERVICE_FILES {
            let candidate = dir.join(name);
            if !candidate.is_file() {
                continue;
            }
            if *name == "linker.lf" {
                set.fragments.push(candidate);
            } else {
                set.config_files.push(candidate);
            }
        }
    }
    debug!(
        fragments = set.fragments.len(),
        config_files = set.config_files.len(),
        "collected linker service files"
    );
    Ok(set)
}

/// Filter the libraries list file, dropping every line containing
/// `exclude`, and write the result as a derived copy next to the original.
/// The original is never edited in place.
///
/// # Errors
///
/// Returns an error when the list file cannot be read or the copy written.
pub fn filter_libraries_list(list_file: &Utf8Path, exclude: &str) -> Result<Utf8PathBuf> {
    let text = fs::read_to_string(list_file.as_std_path())
        .with_context(|| format!("failed to read libraries list {list_file}"))?;
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| !line.contains(exclude))
        .collect();
    let derived = Utf8PathBuf::from(format!("{list_file}{FILTERED_SUFFIX}"));
    fs::write(derived.as_std_path(), kept.join("\n") + "\n")
        .with_context(|| format!("failed to write filtered libraries list {derived}"))?;
    Ok(derived)
}

/// Render the final linker script from the base template.
///
/// The template receives the fragment paths, the dependency-ordered library
/// list, and the project configuration entries, and the result supersedes
/// any framework-default linker script.
///
/// # Errors
///
/// Returns an error when the template cannot be read or rendered, or the
/// output cannot be written.
pub fn render_linker_script(
    template_path: &Utf8Path,
    output_path: &Utf8Path,
    fragments: &FragmentSet,
    libraries: &[String],
) -> Result<Utf8PathBuf> {
    let template = fs::read_to_string(template_path.as_std_path())
        .with_context(|| format!("failed to read linker template {template_path}"))?;

    let mut jinja = Environment::new();
    jinja.set_undefined_behavior(UndefinedBehavior::Strict);
    jinja
        .add_template("sections", &template)
        .context("failed to compile linker template")?;
    let rendered = jinja
        .get_template("sections")
        .context("linker template missing after registration")?
        .render(context! {
            fragments => fragments
                .fragments
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>(),
            config_files => fragments
                .config_files
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>(),
            libraries => libraries,
        })
        .with_context(|| format!("failed to render linker template {template_path}"))?;

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .with_context(|| format!("failed to create linker output directory {parent}"))?;
    }
    fs::write(output_path.as_std_path(), rendered)
        .with_context(|| format!("failed to write linker script {output_path}"))?;
    Ok(output_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;

    #[rstest]
    fn filtering_is_idempotent_and_preserves_original() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8");
        let list = root.join("ldgen_libraries");
        fs::write(&list, "esp-idf/liba/liba.a\nesp-idf/app/libapp.a\n").expect("write");

        let first = filter_libraries_list(&list, "libapp.a").expect("filter");
        let second = filter_libraries_list(&list, "libapp.a").expect("filter again");
        assert_eq!(first, second);
        assert_eq!(
            fs::read_to_string(&first).expect("read"),
            "esp-idf/liba/liba.a\n"
        );
        assert_eq!(
            fs::read_to_string(&list).expect("read original"),
            "esp-idf/liba/liba.a\nesp-idf/app/libapp.a\n"
        );
    }

    #[rstest]
    fn template_renders_fragments_and_libraries() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8");
        let template = root.join("sections.ld.in");
        fs::write(
            &template,
            "/* {{ fragments | length }} fragments */\nGROUP({% for l in libraries %}{{ l }} {% endfor %})\n",
        )
        .expect("write template");

        let set = FragmentSet {
            fragments: vec![root.join("linker.lf")],
            config_files: Vec::new(),
        };
        let out = root.join("ld/sections.ld");
        render_linker_script(&template, &out, &set, &["liba.a".to_owned()]).expect("render");
        let text = fs::read_to_string(&out).expect("read");
        assert!(text.contains("1 fragments"));
        assert!(text.contains("GROUP(liba.a )"));
    }
}
