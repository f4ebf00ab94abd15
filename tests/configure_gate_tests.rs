//! Integration tests for the reconfigure gate.
//!
//! The gate is a disjunction of freshness checks over the build tree; these
//! tests lay out real directories so timestamp comparisons are exercised
//! against actual filesystem metadata.

use anyhow::{Context, Result, ensure};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::thread::sleep;
use std::time::Duration;
use tempfile::tempdir;
use tsugite::configure::{needs_reconfigure, resolve_cmake_program};

fn utf8(path: &std::path::Path) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path.to_path_buf())
        .map_err(|p| anyhow::anyhow!("non-UTF-8 temp path {}", p.display()))
}

/// Lay out a configured build tree whose cache is the newest artefact.
fn configured_tree(project_dir: &Utf8Path, build_dir: &Utf8Path) -> Result<()> {
    fs::write(
        project_dir.join("CMakeLists.txt").as_std_path(),
        "project(firmware)\n",
    )
    .context("write project description")?;
    let reply = build_dir.join(".cmake/api/v1/reply");
    fs::create_dir_all(reply.as_std_path()).context("create reply dir")?;
    fs::write(reply.join("codemodel-v2-0.json").as_std_path(), "{}")
        .context("write reply document")?;
    let cmake_files = build_dir.join("CMakeFiles");
    fs::create_dir_all(cmake_files.as_std_path()).context("create CMakeFiles")?;
    fs::write(cmake_files.join("rules.ninja").as_std_path(), "")
        .context("write CMakeFiles content")?;
    fs::write(build_dir.join("build.ninja").as_std_path(), "")
        .context("write generator build file")?;
    // The cache must carry the newest timestamp of the configured tree.
    sleep(Duration::from_millis(20));
    fs::write(build_dir.join("CMakeCache.txt").as_std_path(), "")
        .context("write generator cache")?;
    Ok(())
}

#[test]
fn empty_build_dir_requires_configure() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    let root = utf8(temp.path())?;
    let build_dir = root.join("build");
    fs::create_dir_all(build_dir.as_std_path()).context("create build dir")?;
    ensure!(needs_reconfigure(&root, &build_dir));
    Ok(())
}

#[test]
fn fresh_tree_requires_no_configure() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    let root = utf8(temp.path())?;
    let build_dir = root.join("build");
    configured_tree(&root, &build_dir)?;
    ensure!(!needs_reconfigure(&root, &build_dir));
    Ok(())
}

#[test]
fn empty_reply_dir_wins_over_fresh_timestamps() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    let root = utf8(temp.path())?;
    let build_dir = root.join("build");
    configured_tree(&root, &build_dir)?;
    let reply = build_dir.join(".cmake/api/v1/reply");
    fs::remove_file(reply.join("codemodel-v2-0.json").as_std_path())
        .context("empty the reply dir")?;
    ensure!(
        needs_reconfigure(&root, &build_dir),
        "an empty reply dir must force reconfiguration regardless of timestamps"
    );
    Ok(())
}

#[test]
fn missing_cache_requires_configure() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    let root = utf8(temp.path())?;
    let build_dir = root.join("build");
    configured_tree(&root, &build_dir)?;
    fs::remove_file(build_dir.join("CMakeCache.txt").as_std_path())
        .context("remove generator cache")?;
    ensure!(needs_reconfigure(&root, &build_dir));
    Ok(())
}

#[test]
fn newer_sdkconfig_requires_configure() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    let root = utf8(temp.path())?;
    let build_dir = root.join("build");
    configured_tree(&root, &build_dir)?;
    sleep(Duration::from_millis(20));
    fs::write(root.join("sdkconfig").as_std_path(), "CONFIG_FOO=y\n")
        .context("write sdkconfig")?;
    ensure!(needs_reconfigure(&root, &build_dir));
    Ok(())
}

#[test]
fn newer_project_description_requires_configure() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    let root = utf8(temp.path())?;
    let build_dir = root.join("build");
    configured_tree(&root, &build_dir)?;
    sleep(Duration::from_millis(20));
    fs::write(
        root.join("CMakeLists.txt").as_std_path(),
        "project(firmware)\n# edited\n",
    )
    .context("touch project description")?;
    ensure!(needs_reconfigure(&root, &build_dir));
    Ok(())
}

#[test]
fn cmake_program_respects_environment_override() {
    // Serialized by the process-wide env var; no other test touches it.
    unsafe { std::env::set_var(tool_env::CMAKE_ENV, "/opt/cmake/bin/cmake") };
    let resolved = resolve_cmake_program();
    unsafe { std::env::remove_var(tool_env::CMAKE_ENV) };
    assert_eq!(resolved, std::path::PathBuf::from("/opt/cmake/bin/cmake"));
}
