//! Configure gate and external generator invocation.
//!
//! The gate decides, from filesystem timestamps and presence of prior
//! output, whether `cmake` must be re-run before the codemodel reply can be
//! trusted. It hashes nothing: restoring an older file with a newer mtime
//! defeats it, which is an accepted staleness hazard of this design.

use crate::context::ProjectContext;
use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use std::time::SystemTime;
use tracing::{debug, info};

/// Reply directory of the file API, relative to the build dir.
pub const REPLY_DIR: &str = ".cmake/api/v1/reply";
/// CMake's internal configure cache directory, relative to the build dir.
pub const CMAKE_FILES_DIR: &str = "CMakeFiles";
/// CMake's cache file, relative to the build dir.
pub const CACHE_FILE: &str = "CMakeCache.txt";
/// The low-level build file CMake's Ninja generator writes.
pub const BUILD_FILE: &str = "build.ninja";

/// Default CMake executable, overridable via [`tool_env::CMAKE_ENV`].
pub const CMAKE_PROGRAM: &str = "cmake";

fn mtime(path: &Utf8Path) -> Option<SystemTime> {
    fs::metadata(path.as_std_path())
        .and_then(|meta| meta.modified())
        .ok()
}

fn missing_or_empty(dir: &Utf8Path) -> bool {
    fs::read_dir(dir.as_std_path()).map_or(true, |mut entries| entries.next().is_none())
}

/// Decide whether the generator must be re-invoked.
///
/// Each check is sufficient on its own; the result is a disjunction, not a
/// priority order. Unreadable metadata counts as missing, biasing toward
/// reconfiguration.
#[must_use]
pub fn needs_reconfigure(project_dir: &Utf8Path, build_dir: &Utf8Path) -> bool {
    if missing_or_empty(&build_dir.join(REPLY_DIR)) {
        return true;
    }
    let cmake_files = build_dir.join(CMAKE_FILES_DIR);
    if missing_or_empty(&cmake_files) {
        return true;
    }
    let Some(cache_mtime) = mtime(&build_dir.join(CACHE_FILE)) else {
        return true;
    };
    if mtime(&build_dir.join(BUILD_FILE)).is_none() {
        return true;
    }
    let newer_than_cache = |path: &Utf8Path| mtime(path).is_some_and(|t| t > cache_mtime);
    let sdkconfig = project_dir.join("sdkconfig");
    if sdkconfig.exists() && newer_than_cache(&sdkconfig) {
        return true;
    }
    newer_than_cache(&project_dir.join("CMakeLists.txt")) || newer_than_cache(&cmake_files)
}

/// Which executable the configure stage should spawn.
#[must_use]
pub fn resolve_cmake_program() -> PathBuf {
    env::var_os(tool_env::CMAKE_ENV).map_or_else(|| PathBuf::from(CMAKE_PROGRAM), PathBuf::from)
}

/// Build the `PATH` value for the generator: the context's tool directories
/// prepended to the inherited search path.
fn augmented_path(ctx: &ProjectContext) -> OsString {
    let inherited = env::var_os("PATH").unwrap_or_default();
    let mut dirs: Vec<PathBuf> = ctx
        .tool_dirs
        .iter()
        .map(|d| d.as_std_path().to_path_buf())
        .collect();
    dirs.extend(env::split_paths(&inherited));
    env::join_paths(dirs).unwrap_or(inherited)
}

/// Invoke the external generator once.
///
/// Output is captured; on nonzero exit it is written to the error stream
/// before a fatal error is returned. There is no retry. On success with
/// verbose mode requested the captured output is echoed.
///
/// # Errors
///
/// Returns an error when the process cannot be spawned or exits nonzero.
pub fn run_cmake(
    ctx: &ProjectContext,
    src_dir: &Utf8Path,
    build_dir: &Utf8Path,
    extra_defines: &[String],
    verbose: bool,
) -> Result<()> {
    fs::create_dir_all(build_dir.as_std_path())
        .with_context(|| format!("failed to create build directory {build_dir}"))?;

    let program = resolve_cmake_program();
    let mut cmd = Command::new(&program);
    cmd.arg("-S")
        .arg(src_dir.as_std_path())
        .arg("-B")
        .arg(build_dir.as_std_path())
        .args(["-G", "Ninja"]);
    for define in extra_defines {
        cmd.arg(format!("-D{define}"));
    }
    cmd.env("PATH", augmented_path(ctx));

    info!(
        "Configuring {} into {} with {}",
        src_dir,
        build_dir,
        program.display()
    );
    debug!(defines = ?extra_defines, "generator definitions");

    let output = cmd
        .output()
        .with_context(|| format!("failed to spawn {}", program.display()))?;

    if !output.status.success() {
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(&output.stdout);
        let _ = err.write_all(&output.stderr);
        bail!(
            "{} exited with {} while configuring {}",
            program.display(),
            output.status,
            src_dir
        );
    }
    if verbose {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(&output.stdout);
        let _ = out.write_all(&output.stderr);
    }
    Ok(())
}
