//! ULP co-processor sub-build.
//!
//! The auxiliary low-power co-processor sources live under the project's
//! `ulp/` directory and build as a separate, much smaller CMake project
//! with a fixed toolchain file. The harvest yields a generated header, a
//! linker fragment, and a raw binary; the binary is converted into an
//! assembly-embeddable source through a template so the main image can
//! carry the blob. The framework does not expose this edge through the
//! main codemodel, so the runner wires the artifacts into the link step
//! explicitly.

use crate::configure;
use crate::context::ProjectContext;
use crate::graph::{BuildEdge, BuildGraph, Rule};
use crate::runner::process;
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use minijinja::{Environment, UndefinedBehavior, context};
use std::fs;
use tracing::info;

/// Project subdirectory holding the co-processor sources.
pub const ULP_SOURCE_DIR: &str = "ulp";
/// Fixed name of the co-processor application.
pub const ULP_APP_NAME: &str = "ulp_main";

/// Template converting the raw binary into an embeddable assembly source.
const EMBED_TEMPLATE: &str = "\
/* generated from {{ binary }} */
\t.data
\t.section .binary_data,\"aw\"
\t.global {{ symbol }}_bin_start
{{ symbol }}_bin_start:
\t.incbin \"{{ binary }}\"
\t.global {{ symbol }}_bin_end
{{ symbol }}_bin_end:
";

/// Harvested co-processor artifacts wired into the primary link step.
#[derive(Debug, Clone)]
pub struct UlpArtifacts {
    /// Directory containing the generated `ulp_main.h`.
    pub include_dir: Utf8PathBuf,
    /// Directory containing the generated linker fragment.
    pub ld_dir: Utf8PathBuf,
    /// The raw co-processor binary.
    pub binary: Utf8PathBuf,
    /// Object embedding the binary, linked into the main image.
    pub embed_object: Utf8PathBuf,
}

fn toolchain_file(ctx: &ProjectContext) -> Utf8PathBuf {
    ctx.components_dir()
        .join("ulp/cmake")
        .join(format!("toolchain-{}-ulp.cmake", ctx.mcu))
}

fn render_embed_source(binary: &Utf8Path, output: &Utf8Path) -> Result<()> {
    let mut jinja = Environment::new();
    jinja.set_undefined_behavior(UndefinedBehavior::Strict);
    jinja
        .add_template("embed", EMBED_TEMPLATE)
        .context("failed to compile the embed template")?;
    let rendered = jinja
        .get_template("embed")
        .context("embed template missing after registration")?
        .render(context! {
            binary => binary.as_str(),
            symbol => ULP_APP_NAME,
        })
        .context("failed to render the embed source")?;
    fs::write(output.as_std_path(), rendered)
        .with_context(|| format!("failed to write embed source {output}"))?;
    Ok(())
}

/// Build the co-processor project if the source directory exists.
///
/// Runs its own configure/build cycle into a build directory keyed by the
/// project name, harvests the generated artifacts, and registers an edge
/// in `graph` assembling the embeddable source. Returns `None` when the
/// project carries no `ulp/` directory.
///
/// # Errors
///
/// Returns an error when configuration, the build, or the harvest fails.
pub fn maybe_build(
    graph: &mut BuildGraph,
    ctx: &ProjectContext,
    jobs: Option<usize>,
    verbose: bool,
) -> Result<Option<UlpArtifacts>> {
    let src_dir = ctx.project_dir.join(ULP_SOURCE_DIR);
    if !src_dir.is_dir() {
        return Ok(None);
    }
    let project_name = ctx.project_dir.file_name().unwrap_or("firmware");
    let sub_ctx = ctx.sub_build(&format!("ulp_{project_name}"));

    if configure::needs_reconfigure(&src_dir, &sub_ctx.build_dir) {
        let defines = vec![
            format!("CMAKE_TOOLCHAIN_FILE={}", toolchain_file(ctx)),
            format!("ULP_APP_NAME={ULP_APP_NAME}"),
            format!("IDF_TARGET={}", ctx.mcu),
        ];
        configure::run_cmake(&sub_ctx, &src_dir, &sub_ctx.build_dir, &defines, verbose)?;
    }
    process::run_ninja(&sub_ctx.build_dir.join("build.ninja"), &[], jobs)
        .context("ULP build failed")?;

    let binary = sub_ctx.build_dir.join(format!("{ULP_APP_NAME}.bin"));
    if !binary.is_file() {
        bail!("ULP build produced no binary at {binary}");
    }
    let embed_source = sub_ctx.build_dir.join(format!("{ULP_APP_NAME}.bin.S"));
    render_embed_source(&binary, &embed_source)?;
    info!("embedded ULP binary via {embed_source}");

    let embed_object = Utf8PathBuf::from(format!("{embed_source}.o"));
    graph.rule(
        "ulp_embed",
        Rule::new(format!(
            "{} -c $in -o $out",
            ctx.tool("gcc")
        ))
        .with_description("embed ULP binary $out"),
    );
    let mut edge = BuildEdge::new(
        "ulp_embed",
        vec![embed_object.clone()],
        vec![embed_source],
    );
    edge.implicit_inputs.push(binary.clone());
    graph.edge(edge);

    Ok(Some(UlpArtifacts {
        include_dir: sub_ctx.build_dir.clone(),
        ld_dir: sub_ctx.build_dir.clone(),
        binary,
        embed_object,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn embed_source_names_the_symbol_and_binary() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8");
        let binary = root.join("ulp_main.bin");
        let output = root.join("ulp_main.bin.S");
        render_embed_source(&binary, &output).expect("render");
        let text = fs::read_to_string(&output).expect("read");
        assert!(text.contains(".global ulp_main_bin_start"));
        assert!(text.contains(&format!(".incbin \"{binary}\"")));
    }
}
