//! Native graph assembly.
//!
//! Turns resolved components into compile and archive edges and stitches
//! the program link step together: classified flags merged, linker-script
//! and undefined-symbol selections pulled out of the generic flag set into
//! a dedicated override slot, component archives wrapped in a repeated-scan
//! link group, and the flash-time companion images attached as defaults
//! rather than link inputs.

use crate::codemodel::{TargetConfig, TargetType};
use crate::context::ProjectContext;
use crate::deps::ComponentEntry;
use crate::flags::{AppFlags, CompileEnv};
use crate::graph::{BuildEdge, BuildGraph, Rule};
use crate::linkargs::ResolvedLinkArgs;
use anyhow::{Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use tracing::warn;

/// Suffix of generated rule files, which are never compiled.
pub const RULE_SUFFIX: &str = ".rule";

/// Extra link inputs contributed by the sub-builds.
#[derive(Debug, Clone, Default)]
pub struct LinkExtras {
    /// Generated linker script superseding the framework default.
    pub linker_script: Option<Utf8PathBuf>,
    /// Additional objects linked into the image (e.g. the embedded ULP
    /// blob).
    pub extra_objects: Vec<Utf8PathBuf>,
    /// Additional library search paths (e.g. the ULP linker-fragment dir).
    pub extra_libpaths: Vec<Utf8PathBuf>,
    /// Additional include dirs for the program's own sources (e.g. the ULP
    /// header dir).
    pub extra_includes: Vec<Utf8PathBuf>,
    /// Hard ordering prerequisites of the link step.
    pub order_only: Vec<Utf8PathBuf>,
    /// Images flashed alongside the program but never linked into it.
    pub flash_companions: Vec<Utf8PathBuf>,
}

fn rule_for_language(ctx: &ProjectContext, graph: &mut BuildGraph, language: &str) -> String {
    let (name, tool) = match language {
        "CXX" => ("cxx", ctx.tool("g++")),
        "ASM" => ("asm", ctx.tool("gcc")),
        _ => ("cc", ctx.tool("gcc")),
    };
    graph.rule(
        name,
        Rule::new(format!(
            "{tool} -MMD -MF $out.d $flags $defines $includes -c $in -o $out"
        ))
        .with_description(format!("compile ({name}) $out"))
        .with_gcc_depfile(),
    );
    name.to_owned()
}

fn ar_rule(ctx: &ProjectContext, graph: &mut BuildGraph) {
    graph.rule(
        "ar",
        Rule::new(format!("{} crs $out $in", ctx.tool("ar")))
            .with_description("archive $out"),
    );
}

fn link_rule(ctx: &ProjectContext, graph: &mut BuildGraph) {
    graph.rule(
        "link",
        Rule::new(format!(
            "{} $linkflags $libpaths $ldscripts -o $out $in -Wl,--start-group $libs -Wl,--end-group",
            ctx.tool("g++")
        ))
        .with_description("link $out"),
    );
}

/// Mirror a source path into the build tree, relative to `obj_root`.
/// Absolute sources outside both the project and framework trees keep
/// their full path under an `ext/` root so same-named files cannot
/// collide.
fn object_path(ctx: &ProjectContext, obj_root: &Utf8Path, source: &Utf8Path) -> Utf8PathBuf {
    let relative = if source.is_absolute() {
        source
            .strip_prefix(&ctx.framework_dir)
            .or_else(|_| source.strip_prefix(&ctx.project_dir))
            .map_or_else(
                |_| Utf8PathBuf::from(format!("ext{source}")),
                Utf8Path::to_path_buf,
            )
    } else {
        source.to_path_buf()
    };
    obj_root.join(format!("{relative}.o"))
}

fn absolute_source(ctx: &ProjectContext, source: &Utf8Path) -> Utf8PathBuf {
    if source.is_absolute() {
        source.to_path_buf()
    } else {
        ctx.project_dir.join(source)
    }
}

fn include_args(env: &CompileEnv) -> String {
    let plain = env.include_paths.iter().map(|p| format!("-I{p}"));
    let system = env.sys_include_paths.iter().map(|p| format!("-isystem {p}"));
    plain.chain(system).join(" ")
}

fn define_args(env: &CompileEnv) -> String {
    env.defines.iter().map(|d| format!("-D{d}")).join(" ")
}

/// How compile edges receive their flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagStyle {
    /// Each edge carries its compile group's flag list verbatim.
    PerGroup,
    /// Edges reference the whole-target tier variables (`$common_flags`
    /// plus the language-specific set), keeping the common/C-only/C++-only
    /// split visible in the emitted graph.
    TargetTiers,
}

/// The tier variables a compile edge of the given language references.
fn tier_reference(language: &str) -> &'static str {
    match language {
        "CXX" => "$common_flags $cxxflags",
        "ASM" => "$asflags",
        _ => "$common_flags $cflags",
    }
}

/// Emit compile edges for every compiled source of `target` and return the
/// object list. Sources without a compile group and generated rule files
/// are skipped.
pub fn compile_objects(
    graph: &mut BuildGraph,
    ctx: &ProjectContext,
    target: &TargetConfig,
    envs: &[CompileEnv],
    extra_includes: &[Utf8PathBuf],
    flag_style: FlagStyle,
) -> Vec<Utf8PathBuf> {
    let obj_root = ctx.build_dir.join(&target.paths.build);
    let mut objects = Vec::new();
    for source in &target.sources {
        let Some(group_index) = source.compile_group_index else {
            continue;
        };
        if source.path.as_str().ends_with(RULE_SUFFIX) {
            continue;
        }
        let Some(env) = envs.get(group_index) else {
            continue;
        };
        let rule = rule_for_language(ctx, graph, &env.language);
        let object = object_path(ctx, &obj_root, &source.path);
        let mut edge = BuildEdge::new(
            rule,
            vec![object.clone()],
            vec![absolute_source(ctx, &source.path)],
        );
        let flags = match flag_style {
            FlagStyle::PerGroup => env.flags.join(" "),
            FlagStyle::TargetTiers => tier_reference(&env.language).to_owned(),
        };
        edge.set_var("flags", flags);
        edge.set_var("defines", define_args(env));
        let mut env_with_extras = env.clone();
        let mut includes: Vec<Utf8PathBuf> = extra_includes.to_vec();
        includes.append(&mut env_with_extras.include_paths);
        env_with_extras.include_paths = includes;
        edge.set_var("includes", include_args(&env_with_extras));
        graph.edge(edge);
        objects.push(object);
    }
    objects
}

/// Compile a component's sources and archive them into the static library
/// the generator named.
///
/// # Errors
///
/// Returns an error when a static-library component carries no on-disk
/// archive name.
pub fn assemble_component(
    graph: &mut BuildGraph,
    ctx: &ProjectContext,
    target: &TargetConfig,
    envs: &[CompileEnv],
) -> Result<Utf8PathBuf> {
    if target.target_type == TargetType::StaticLibrary && target.name_on_disk.is_none() {
        bail!("static library target {} has no on-disk name", target.name);
    }
    let objects = compile_objects(graph, ctx, target, envs, &[], FlagStyle::PerGroup);
    let lib = ctx
        .build_dir
        .join(&target.paths.build)
        .join(target.artifact_name());
    ar_rule(ctx, graph);
    graph.edge(BuildEdge::new("ar", vec![lib.clone()], objects));
    Ok(lib)
}

/// Linker-script-select and undefined-symbol flags extracted from the
/// generic flag set; these need a guaranteed position in the link command
/// that generic flag merging cannot provide.
fn split_script_overrides(linkflags: &[String]) -> (Vec<String>, Vec<String>) {
    let mut generic = Vec::new();
    let mut overrides = Vec::new();
    let mut take_next = false;
    for flag in linkflags {
        if take_next {
            overrides.push(flag.clone());
            take_next = false;
            continue;
        }
        if flag == "-T" || flag == "-u" {
            overrides.push(flag.clone());
            take_next = true;
        } else if flag.starts_with("-T") || flag.starts_with("-u") {
            overrides.push(flag.clone());
        } else {
            generic.push(flag.clone());
        }
    }
    (generic, overrides)
}

fn lib_token(lib: &str) -> String {
    if lib.starts_with('-') {
        lib.to_owned()
    } else {
        format!("-l:{lib}")
    }
}

/// Stitch the program link edge into the graph and return the image path.
///
/// # Errors
///
/// Returns an error when the executable target carries no on-disk name.
#[expect(clippy::too_many_arguments, reason = "link assembly joins every pipeline output")]
pub fn assemble_program(
    graph: &mut BuildGraph,
    ctx: &ProjectContext,
    exe: &TargetConfig,
    exe_envs: &[CompileEnv],
    app: &AppFlags,
    link_args: &ResolvedLinkArgs,
    lib_order: &[&ComponentEntry],
    extras: &LinkExtras,
) -> Result<Utf8PathBuf> {
    let Some(name_on_disk) = &exe.name_on_disk else {
        bail!("executable target {} has no on-disk name", exe.name);
    };

    // The generator omits the project's own include dirs when the source
    // directory does not carry the framework's expected default name, so
    // they are prepended here unconditionally.
    let mut project_includes = vec![ctx.project_dir.join("src"), ctx.build_dir.join("config")];
    project_includes.extend(extras.extra_includes.iter().cloned());

    // The program's compile edges reference the whole-target tier split so
    // the common, language-only, and assembler axes stay distinct in the
    // emitted graph.
    graph.variable("common_flags", app.common.join(" "));
    graph.variable("cflags", app.c_only.join(" "));
    graph.variable("cxxflags", app.cxx_only.join(" "));
    graph.variable("asflags", app.asflags.join(" "));
    let objects = compile_objects(
        graph,
        ctx,
        exe,
        exe_envs,
        &project_includes,
        FlagStyle::TargetTiers,
    );

    let (generic_flags, mut script_overrides) = split_script_overrides(&link_args.linkflags);
    if let Some(script) = &extras.linker_script {
        script_overrides.push(format!("-T{script}"));
    }
    if !script_overrides.iter().any(|f| f.starts_with("-T")) {
        warn!("no linker-script selection found in link flags; relying on linker defaults");
    }

    let mut linkflags: Vec<String> = app.common.clone();
    linkflags.extend(generic_flags);

    let mut libpaths: Vec<String> = link_args.libpaths.iter().map(|p| format!("-L{p}")).collect();
    libpaths.extend(extras.extra_libpaths.iter().map(|p| format!("-L{p}")));

    let mut libs: Vec<String> = lib_order
        .iter()
        .map(|entry| entry.lib.as_str().to_owned())
        .collect();
    libs.extend(link_args.libs.iter().map(|lib| lib_token(lib)));

    let elf = ctx.build_dir.join(name_on_disk);
    link_rule(ctx, graph);
    let mut inputs = objects;
    inputs.extend(extras.extra_objects.iter().cloned());
    let mut edge = BuildEdge::new("link", vec![elf.clone()], inputs);
    edge.implicit_inputs = lib_order.iter().map(|entry| entry.lib.clone()).collect();
    if let Some(script) = &extras.linker_script {
        edge.implicit_inputs.push(script.clone());
    }
    edge.order_only = extras.order_only.clone();
    edge.set_var("linkflags", linkflags.join(" "));
    edge.set_var("libpaths", libpaths.join(" "));
    edge.set_var("ldscripts", script_overrides.join(" "));
    edge.set_var("libs", libs.join(" "));
    graph.edge(edge);

    // Flash companions are build outputs that ride along at flash time;
    // they must never appear among the link inputs.
    let mut companion_edge = BuildEdge::new(
        "",
        vec![ctx.build_dir.join("flash-artifacts")],
        vec![elf.clone()],
    );
    companion_edge.phony = true;
    companion_edge
        .inputs
        .extend(extras.flash_companions.iter().cloned());
    graph.edge(companion_edge);
    graph.defaults.push(ctx.build_dir.join("flash-artifacts"));

    Ok(elf)
}
