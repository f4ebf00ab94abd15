//! Bootloader sub-build.
//!
//! The bootloader is a nested CMake project shipped inside the framework
//! tree. It runs the full configure/harvest/assemble pipeline against its
//! own isolated build directory with a forced set of generator defines,
//! and its linked image is consumed at flash time by the primary project.
//! Because it links as an independent program, the libraries list the
//! upstream link-generation script reads must be rewritten to drop the
//! parent project's own archive first.

use crate::codemodel::CodemodelLoader;
use crate::context::ProjectContext;
use crate::graph::BuildGraph;
use crate::ldgen;
use crate::ninja_gen;
use crate::pipeline;
use crate::runner::process;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use tracing::info;

/// The bootloader project path inside the framework tree.
pub const SUBPROJECT_PATH: &str = "components/bootloader/subproject";
/// Build subdirectory of the bootloader, disjoint from the primary tree.
pub const BUILD_SUBDIR: &str = "bootloader";
/// Libraries list file the upstream link-generation script consumes.
pub const LIBRARIES_LIST: &str = "ldgen_libraries";

fn forced_defines(ctx: &ProjectContext) -> Vec<String> {
    vec![
        format!("IDF_TARGET={}", ctx.mcu),
        "PYTHON_DEPS_CHECKED=1".to_owned(),
        format!("IDF_PATH={}", ctx.framework_dir),
        format!("SDKCONFIG={}", ctx.sdkconfig_path()),
        format!("PROJECT_SOURCE_DIR={}", ctx.project_dir),
    ]
}

/// Configure, harvest, assemble, and build the bootloader image.
///
/// `parent_archive` names the parent project's own output archive, which
/// is filtered out of the libraries list before linking.
///
/// # Errors
///
/// Returns an error when configuration fails, the sub-codemodel has no
/// executable target, or the build itself fails.
pub fn build(
    ctx: &ProjectContext,
    parent_archive: &str,
    jobs: Option<usize>,
    verbose: bool,
) -> Result<Utf8PathBuf> {
    let sub_ctx = ctx.sub_build(BUILD_SUBDIR);
    let src_dir = ctx.framework_dir.join(SUBPROJECT_PATH);
    let defines = forced_defines(ctx);

    let mut loader = CodemodelLoader::load(
        &sub_ctx,
        &src_dir,
        &sub_ctx.build_dir,
        &defines,
        verbose,
    )
    .context("failed to configure the bootloader sub-project")?;

    let list_file = sub_ctx.build_dir.join(LIBRARIES_LIST);
    if list_file.is_file() {
        let derived = ldgen::filter_libraries_list(&list_file, parent_archive)?;
        info!("filtered bootloader libraries list into {derived}");
    }

    let mut graph = BuildGraph::default();
    let collected = pipeline::collect_targets(&mut graph, &sub_ctx, &mut loader, false)?;
    let exe = pipeline::select_executable(&collected)
        .context("bootloader sub-codemodel has no executable target")?;
    let resolution = pipeline::resolve(&collected.components, &exe, &[]);
    let elf = pipeline::link(
        &mut graph,
        &sub_ctx,
        &exe,
        &collected.components,
        &resolution,
        &crate::assemble::LinkExtras::default(),
        false,
    )?;
    graph.defaults.push(elf.clone());

    let ninja_text = ninja_gen::generate(&graph)?;
    let build_file = sub_ctx.build_dir.join("tsugite.ninja");
    process::write_ninja_file(&build_file, &ninja_text)?;
    process::run_ninja(&build_file, &[], jobs)
        .context("bootloader build failed")?;

    Ok(elf)
}
