//! Integration tests for codemodel ingestion: reply discovery, schema
//! version checks, memoized target details, and project-description
//! synthesis.

use anyhow::{Context, Result, ensure};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tempfile::tempdir;
use tsugite::codemodel::{
    CodemodelError, CodemodelLoader, TargetType, ensure_project_description, ensure_query_file,
};

fn utf8(path: &std::path::Path) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path.to_path_buf())
        .map_err(|p| anyhow::anyhow!("non-UTF-8 temp path {}", p.display()))
}

fn write_reply(reply_dir: &Utf8Path, codemodel: &str) -> Result<()> {
    fs::create_dir_all(reply_dir.as_std_path()).context("create reply dir")?;
    fs::write(
        reply_dir.join("codemodel-v2-0123.json").as_std_path(),
        codemodel,
    )
    .context("write codemodel document")?;
    Ok(())
}

const MINIMAL_CODEMODEL: &str = r#"{
    "version": {"major": 2, "minor": 4},
    "configurations": [{
        "projects": [{"name": "firmware", "targetIndexes": [0]}],
        "targets": [
            {"id": "main::@1", "name": "main", "jsonFile": "target-main.json"}
        ]
    }]
}"#;

const MAIN_TARGET: &str = r#"{
    "name": "main",
    "id": "main::@1",
    "type": "STATIC_LIBRARY",
    "nameOnDisk": "libmain.a"
}"#;

#[test]
fn reply_dir_parses_and_memoizes_target_details() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    let reply_dir = utf8(temp.path())?;
    write_reply(&reply_dir, MINIMAL_CODEMODEL)?;
    fs::write(reply_dir.join("target-main.json").as_std_path(), MAIN_TARGET)
        .context("write target detail")?;

    let mut loader = CodemodelLoader::from_reply_dir(&reply_dir)?;
    let refs = loader.target_refs()?;
    ensure!(refs.len() == 1, "expected one target ref, got {}", refs.len());

    let first = loader.target(&refs[0])?;
    let second = loader.target(&refs[0])?;
    ensure!(first.target_type == TargetType::StaticLibrary);
    ensure!(first.artifact_name() == "libmain.a");
    ensure!(
        std::rc::Rc::ptr_eq(&first, &second),
        "detail documents should be memoized, not re-parsed"
    );
    Ok(())
}

#[test]
fn unsupported_major_version_is_fatal() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    let reply_dir = utf8(temp.path())?;
    let codemodel = r#"{"version": {"major": 3}, "configurations": []}"#;
    write_reply(&reply_dir, codemodel)?;

    let err = CodemodelLoader::from_reply_dir(&reply_dir)
        .err()
        .context("major version 3 should be rejected")?;
    ensure!(
        matches!(
            err.downcast_ref::<CodemodelError>(),
            Some(CodemodelError::UnsupportedVersion {
                found: 3,
                expected: 2
            })
        ),
        "unexpected error: {err:#}"
    );
    Ok(())
}

#[test]
fn missing_reply_directory_is_reported() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    let reply_dir = utf8(temp.path())?.join("no-such-reply");

    let err = CodemodelLoader::from_reply_dir(&reply_dir)
        .err()
        .context("absent reply dir should fail")?;
    ensure!(
        matches!(
            err.downcast_ref::<CodemodelError>(),
            Some(CodemodelError::MissingReply(_))
        ),
        "unexpected error: {err:#}"
    );
    Ok(())
}

#[test]
fn reply_without_codemodel_document_is_reported() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    let reply_dir = utf8(temp.path())?;
    fs::write(reply_dir.join("index-2026.json").as_std_path(), "{}")
        .context("write unrelated reply document")?;

    let err = CodemodelLoader::from_reply_dir(&reply_dir)
        .err()
        .context("reply without codemodel should fail")?;
    ensure!(
        matches!(
            err.downcast_ref::<CodemodelError>(),
            Some(CodemodelError::MissingCodemodel(_))
        ),
        "unexpected error: {err:#}"
    );
    Ok(())
}

#[test]
fn two_codemodel_documents_are_ambiguous() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    let reply_dir = utf8(temp.path())?;
    write_reply(&reply_dir, MINIMAL_CODEMODEL)?;
    fs::write(
        reply_dir.join("codemodel-v2-4567.json").as_std_path(),
        MINIMAL_CODEMODEL,
    )
    .context("write second codemodel document")?;

    let err = CodemodelLoader::from_reply_dir(&reply_dir)
        .err()
        .context("two codemodel documents should fail")?;
    ensure!(
        matches!(
            err.downcast_ref::<CodemodelError>(),
            Some(CodemodelError::AmbiguousCodemodel(_, _))
        ),
        "unexpected error: {err:#}"
    );
    Ok(())
}

#[test]
fn query_marker_is_created_once() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    let build_dir = utf8(temp.path())?;
    ensure_query_file(&build_dir)?;
    let marker = build_dir.join(".cmake/api/v1/query/codemodel-v2");
    ensure!(marker.is_file(), "query marker should exist at {marker}");
    // A second call must tolerate the existing marker.
    ensure_query_file(&build_dir)?;
    Ok(())
}

#[test]
fn project_description_is_synthesized_then_left_alone() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    let project_dir = utf8(temp.path())?;
    let src_dir = project_dir.join("src");
    fs::create_dir_all(src_dir.as_std_path()).context("create src dir")?;
    fs::write(src_dir.join("main.c").as_std_path(), "int app_main(void);\n")
        .context("write source")?;
    fs::write(src_dir.join("util.cpp").as_std_path(), "// util\n").context("write source")?;

    let synthesized = ensure_project_description(&project_dir, "firmware")?;
    ensure!(synthesized, "first run should synthesize the description");

    let root = fs::read_to_string(project_dir.join("CMakeLists.txt").as_std_path())
        .context("read root description")?;
    ensure!(root.contains("project(firmware)"), "got: {root}");
    let component = fs::read_to_string(src_dir.join("CMakeLists.txt").as_std_path())
        .context("read component description")?;
    ensure!(
        component.contains("\"main.c\"") && component.contains("\"util.cpp\""),
        "sources should be listed, got: {component}"
    );

    // User edits must survive subsequent runs.
    fs::write(
        project_dir.join("CMakeLists.txt").as_std_path(),
        "# hand-written\n",
    )
    .context("overwrite root description")?;
    let second = ensure_project_description(&project_dir, "firmware")?;
    ensure!(!second, "an existing description must not be regenerated");
    let kept = fs::read_to_string(project_dir.join("CMakeLists.txt").as_std_path())
        .context("re-read root description")?;
    ensure!(kept == "# hand-written\n", "description was clobbered");
    Ok(())
}
