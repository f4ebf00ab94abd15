//! CLI execution and pipeline orchestration.
//!
//! This module keeps `main` minimal by providing a single entry point that
//! handles command execution: it constructs the immutable build context,
//! drives the primary codemodel pipeline, runs the bootloader and ULP
//! sub-builds into their disjoint build directories, and finally delegates
//! the assembled Ninja file to the Ninja subprocess.

pub mod process;

use crate::assemble::LinkExtras;
use crate::bootloader;
use crate::cli::{BuildArgs, Cli, Commands};
use crate::codemodel::CodemodelLoader;
use crate::context::{BuildType, ContextError, ProjectContext, has_whitespace};
use crate::deps::{ComponentEntry, ComponentMap};
use crate::graph::BuildGraph;
use crate::ldgen;
use crate::ninja_gen;
use crate::partitions;
use crate::pipeline;
use crate::ulp;
use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use std::env;
use std::fs;
use std::io::Write;
use tracing::{info, warn};

/// Name of the Ninja file tsugite writes into the build tree, distinct
/// from the `build.ninja` CMake's own generator emits there.
pub const BUILD_FILE_NAME: &str = "tsugite.ninja";
/// Base linker-script template inside the framework component tree.
pub const LINKER_TEMPLATE: &str = "esp_system/ld/sections.ld.in";

/// Execute the parsed [`Cli`] commands.
///
/// # Errors
///
/// Returns an error if context validation, codemodel translation, a
/// sub-build, or the Ninja process fails.
pub fn run(cli: &Cli) -> Result<()> {
    let ctx = build_context(cli)?;
    let command = cli.command.clone().unwrap_or_else(|| {
        Commands::Build(BuildArgs {
            targets: Vec::new(),
        })
    });
    match command {
        Commands::Build(args) => handle_build(cli, &ctx, &args),
        Commands::Manifest { file } => {
            let ninja = translate(cli, &ctx, &[], false)?;
            if file.as_str() == "-" {
                let mut out = std::io::stdout().lock();
                out.write_all(ninja.as_bytes())
                    .context("failed to write Ninja text to stdout")?;
            } else {
                process::write_ninja_file(&file, &ninja)?;
            }
            Ok(())
        }
        Commands::Clean => handle_ninja_tool(cli, &ctx, "clean"),
        Commands::Graph => handle_ninja_tool(cli, &ctx, "graph"),
    }
}

fn build_context(cli: &Cli) -> Result<ProjectContext> {
    if cli.src_filter.is_some() {
        return Err(ContextError::SourceFilterUnsupported.into());
    }
    let framework_dir = cli
        .framework
        .clone()
        .or_else(|| env::var(tool_env::FRAMEWORK_ENV).ok().map(Utf8PathBuf::from))
        .context("no framework root; pass --framework or set TSUGITE_FRAMEWORK_PATH")?;
    let build_dir = cli
        .build_dir
        .clone()
        .unwrap_or_else(|| cli.project_dir.join(".tsugite"));
    let toolchain_prefix = cli
        .toolchain_prefix
        .clone()
        .unwrap_or_else(|| format!("xtensa-{}-elf-", cli.mcu));
    let mut tool_dirs = cli.tool_dirs.clone();
    if let Some(list) = env::var_os(tool_env::TOOL_PATH_ENV) {
        tool_dirs.extend(env::split_paths(&list).filter_map(|p| Utf8PathBuf::from_path_buf(p).ok()));
    }
    tool_dirs.push(framework_dir.join("tools"));
    let ctx = ProjectContext {
        project_dir: cli.project_dir.clone(),
        build_dir,
        framework_dir: framework_dir.clone(),
        toolchain_prefix,
        mcu: cli.mcu.clone(),
        board: cli.board.clone(),
        frameworks: vec!["espidf".to_owned()],
        build_type: if cli.debug {
            BuildType::Debug
        } else {
            BuildType::Release
        },
        tool_dirs,
    };
    ctx.validate()?;
    Ok(ctx)
}

fn handle_build(cli: &Cli, ctx: &ProjectContext, args: &BuildArgs) -> Result<()> {
    let ninja = translate(cli, ctx, &args.targets, true)?;
    let build_file = ctx.build_dir.join(BUILD_FILE_NAME);
    process::write_ninja_file(&build_file, &ninja)?;
    let ninja_targets: Vec<String> = args
        .targets
        .iter()
        .filter(|t| t.as_str() != "debug")
        .cloned()
        .collect();
    process::run_ninja(&build_file, &ninja_targets, cli.jobs)?;
    info!("build complete");
    Ok(())
}

fn handle_ninja_tool(cli: &Cli, ctx: &ProjectContext, tool: &str) -> Result<()> {
    let ninja = translate(cli, ctx, &[], false)?;
    let build_file = ctx.build_dir.join(BUILD_FILE_NAME);
    process::write_ninja_file(&build_file, &ninja)?;
    process::run_ninja_tool(&build_file, tool)
}

/// Find the project's main component among the assembled components.
///
/// The default source-dir component and a custom source-dir component are
/// both recognised; exactly one must exist.
fn find_main_component<'a>(
    components: &'a ComponentMap,
    custom_dir: &str,
) -> Result<&'a ComponentEntry> {
    let default_name = "__idf_main";
    let custom_name = format!("__idf_{custom_dir}");
    let default = components
        .values()
        .find(|entry| entry.config.name == default_name);
    let custom = components
        .values()
        .find(|entry| entry.config.name == custom_name);
    match (default, custom) {
        (Some(_), Some(_)) if default_name != custom_name => bail!(
            "both {default_name} and {custom_name} claim the main target; \
             remove one of the source directories"
        ),
        (Some(entry), _) | (None, Some(entry)) => Ok(entry),
        (None, None) => bail!(
            "no main target found: neither {default_name} nor {custom_name} \
             exists in the codemodel"
        ),
    }
}

/// Drive the whole translation: codemodel → components → sub-builds →
/// program link, returning the rendered Ninja text for the primary graph.
fn translate(
    cli: &Cli,
    ctx: &ProjectContext,
    requested_targets: &[String],
    run_sub_builds: bool,
) -> Result<String> {
    let debug = ctx.debug_build(requested_targets);
    let defines = vec![
        format!("IDF_TARGET={}", ctx.mcu),
        "PYTHON_DEPS_CHECKED=1".to_owned(),
        format!("SDKCONFIG={}", ctx.sdkconfig_path()),
    ];
    let mut loader = CodemodelLoader::load(
        ctx,
        &ctx.project_dir,
        &ctx.build_dir,
        &defines,
        cli.verbose,
    )?;

    let mut graph = BuildGraph::default();
    let collected = pipeline::collect_targets(&mut graph, ctx, &mut loader, debug)?;
    let exe = pipeline::select_executable(&collected)?;
    let main_component = find_main_component(&collected.components, "src")?;
    let main_archive = main_component.config.artifact_name().to_owned();

    let ignore_ids = vec![exe.id.clone()];
    let resolution = pipeline::resolve(&collected.components, &exe, &ignore_ids);

    let mut extras = LinkExtras {
        linker_script: generate_linker_script(ctx, &collected.components, &resolution, &main_archive)?,
        ..LinkExtras::default()
    };

    if run_sub_builds {
        if let Some(artifacts) = ulp::maybe_build(&mut graph, ctx, cli.jobs, cli.verbose)? {
            extras.extra_objects.push(artifacts.embed_object);
            extras.extra_includes.push(artifacts.include_dir);
            extras.extra_libpaths.push(artifacts.ld_dir);
            extras.order_only.push(artifacts.binary);
        }
        let bootloader_image = bootloader::build(ctx, &main_archive, cli.jobs, cli.verbose)?;
        extras.flash_companions.push(bootloader_image);
        if let Some(table) = emit_partition_table(cli, ctx)? {
            extras.flash_companions.push(table);
        }
    }

    let elf = pipeline::link(
        &mut graph,
        ctx,
        &exe,
        &collected.components,
        &resolution,
        &extras,
        debug,
    )?;
    graph.defaults.push(elf);

    Ok(ninja_gen::generate(&graph)?)
}

/// Run the linker-script generator once dependency resolution is complete.
fn generate_linker_script(
    ctx: &ProjectContext,
    components: &ComponentMap,
    resolution: &pipeline::Resolution,
    main_archive: &str,
) -> Result<Option<Utf8PathBuf>> {
    let template = ctx.components_dir().join(LINKER_TEMPLATE);
    if !template.is_file() {
        warn!("no linker template at {template}; relying on the framework default script");
        return Ok(None);
    }
    let fragments = ldgen::collect_fragments(&ctx.components_dir())?;
    // The generator's own libraries list, when it wrote one, is the
    // authoritative ordering; the filtered derived copy feeds the
    // template. Otherwise fall back to the resolved component order.
    let list_file = ctx.build_dir.join(bootloader::LIBRARIES_LIST);
    let libraries: Vec<String> = if list_file.is_file() {
        let derived = ldgen::filter_libraries_list(&list_file, main_archive)?;
        info!("filtered libraries list into {derived}");
        fs::read_to_string(derived.as_std_path())
            .with_context(|| format!("failed to read filtered libraries list {derived}"))?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_owned)
            .collect()
    } else {
        pipeline::ordered_archives(components, &resolution.lib_deps)
            .into_iter()
            .filter(|lib| !lib.contains(main_archive))
            .collect()
    };
    let output = ctx.build_dir.join("ld/sections.ld");
    ldgen::render_linker_script(&template, &output, &fragments, &libraries).map(Some)
}

/// Parse and emit the partition table when the project carries one.
fn emit_partition_table(cli: &Cli, ctx: &ProjectContext) -> Result<Option<Utf8PathBuf>> {
    let csv_path = cli
        .partitions
        .clone()
        .unwrap_or_else(|| ctx.project_dir.join("partitions.csv"));
    if !csv_path.is_file() {
        return Ok(None);
    }
    if has_whitespace(&csv_path) {
        bail!("whitespace in partition table path {csv_path:?}; relocate the file");
    }
    let csv = fs::read_to_string(csv_path.as_std_path())
        .with_context(|| format!("failed to read partition table {csv_path}"))?;
    let table = partitions::parse_csv(&csv)
        .with_context(|| format!("failed to parse partition table {csv_path}"))?;
    let output = ctx.build_dir.join("partitions.bin");
    fs::write(output.as_std_path(), partitions::to_binary(&table))
        .with_context(|| format!("failed to write partition table {output}"))?;
    info!("partition table written to {output}");
    Ok(Some(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linkargs::ResolvedLinkArgs;
    use crate::pipeline::Resolution;
    use camino::Utf8Path;
    use clap::Parser;
    use rstest::rstest;
    use std::rc::Rc;

    fn component(name: &str, id: &str) -> ComponentEntry {
        let json = format!(
            r#"{{"name": "{name}", "id": "{id}", "type": "STATIC_LIBRARY",
                 "nameOnDisk": "lib{name}.a"}}"#
        );
        ComponentEntry {
            config: Rc::new(serde_json::from_str(&json).expect("target")),
            lib: Utf8PathBuf::from(format!("/b/lib{name}.a")),
        }
    }

    fn registry(names: &[&str]) -> ComponentMap {
        let mut map = ComponentMap::new();
        for (index, name) in names.iter().enumerate() {
            let id = format!("{name}::@{index}");
            map.insert(id.clone(), component(name, &id));
        }
        map
    }

    #[rstest]
    fn missing_main_component_is_fatal() {
        let components = registry(&["__idf_freertos", "__idf_hal"]);
        let err = find_main_component(&components, "src").expect_err("no main");
        assert!(err.to_string().contains("no main target"), "{err}");
    }

    #[rstest]
    fn default_and_custom_main_together_are_ambiguous() {
        let components = registry(&["__idf_main", "__idf_src"]);
        let err = find_main_component(&components, "src").expect_err("ambiguous");
        assert!(err.to_string().contains("claim the main target"), "{err}");
    }

    #[rstest]
    fn custom_source_dir_component_is_accepted() {
        let components = registry(&["__idf_freertos", "__idf_src"]);
        let entry = find_main_component(&components, "src").expect("custom main");
        assert_eq!(entry.config.name, "__idf_src");
    }

    #[rstest]
    fn tool_dirs_combine_flags_env_and_framework_tools() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let framework = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8");
        let cli = Cli::parse_from([
            "tsugite",
            "--framework",
            framework.as_str(),
            "--tool-dir",
            "/opt/xtensa/bin",
            "--tool-dir",
            "/opt/ninja/bin",
        ]);
        unsafe { env::set_var(tool_env::TOOL_PATH_ENV, "/opt/cmake/bin:/opt/python/bin") };
        let ctx = build_context(&cli).expect("context");
        unsafe { env::remove_var(tool_env::TOOL_PATH_ENV) };
        assert_eq!(
            ctx.tool_dirs,
            vec![
                Utf8PathBuf::from("/opt/xtensa/bin"),
                Utf8PathBuf::from("/opt/ninja/bin"),
                Utf8PathBuf::from("/opt/cmake/bin"),
                Utf8PathBuf::from("/opt/python/bin"),
                framework.join("tools"),
            ]
        );
    }

    #[rstest]
    fn linker_script_orders_libraries_from_the_filtered_list() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8");
        let template_dir = root.join("fw/components/esp_system/ld");
        fs::create_dir_all(template_dir.as_std_path()).expect("template dir");
        fs::write(
            template_dir.join("sections.ld.in").as_std_path(),
            "GROUP({% for l in libraries %}{{ l }} {% endfor %})\n",
        )
        .expect("template");
        let build_dir = root.join("build");
        fs::create_dir_all(build_dir.as_std_path()).expect("build dir");
        fs::write(
            build_dir.join(bootloader::LIBRARIES_LIST).as_std_path(),
            "esp-idf/hal/libhal.a\nesp-idf/main/libmain.a\nesp-idf/freertos/libfreertos.a\n",
        )
        .expect("list");

        let ctx = ProjectContext {
            project_dir: root.join("proj"),
            build_dir,
            framework_dir: root.join("fw"),
            toolchain_prefix: "xtensa-esp32-elf-".into(),
            mcu: "esp32".into(),
            board: "esp32dev".into(),
            frameworks: vec!["espidf".into()],
            build_type: BuildType::Release,
            tool_dirs: Vec::new(),
        };
        let resolution = Resolution {
            link_args: ResolvedLinkArgs::default(),
            lib_deps: Vec::new(),
        };

        let script = generate_linker_script(&ctx, &ComponentMap::new(), &resolution, "libmain.a")
            .expect("generate")
            .expect("template present");
        let text = fs::read_to_string(script.as_std_path()).expect("read script");
        assert_eq!(
            text,
            "GROUP(esp-idf/hal/libhal.a esp-idf/freertos/libfreertos.a )\n"
        );
        assert!(
            Utf8Path::new(&format!(
                "{}{}",
                ctx.build_dir.join(bootloader::LIBRARIES_LIST),
                ldgen::FILTERED_SUFFIX
            ))
            .is_file()
        );
    }
}
