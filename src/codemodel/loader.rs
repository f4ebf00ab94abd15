//! Codemodel acquisition: query bootstrap, configure, reply scan, and lazy
//! target-detail loading.
//!
//! The loader owns the handshake with the generator's file API. It plants
//! the query marker, synthesizes a first-run project description when none
//! exists, consults the configure gate, and then locates and validates the
//! versioned codemodel document inside the reply directory. Target detail
//! documents are read on demand and memoized for the duration of one build
//! invocation.

use crate::codemodel::model::{CodeModel, TargetConfig, TargetRef};
use crate::configure::{self, REPLY_DIR};
use crate::context::ProjectContext;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::fs;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Query marker file of the file API, relative to the build dir.
pub const QUERY_FILE: &str = ".cmake/api/v1/query/codemodel-v2";
/// Filename prefix of the codemodel reply document.
pub const CODEMODEL_PREFIX: &str = "codemodel-v2";
/// Codemodel schema major version this bridge understands.
pub const SUPPORTED_MAJOR: u32 = 2;

/// Source extensions listed when synthesizing a project description.
const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "S", "s", "asm"];

/// Errors raised while acquiring or validating the codemodel.
#[derive(Debug, Error)]
pub enum CodemodelError {
    /// The reply directory is absent or empty after configuration.
    #[error("no file-API reply found under {0}; the generator produced no codemodel")]
    MissingReply(Utf8PathBuf),
    /// No document in the reply directory carries the codemodel prefix.
    #[error("no codemodel document in reply directory {0}")]
    MissingCodemodel(Utf8PathBuf),
    /// More than one codemodel document is present.
    #[error("ambiguous codemodel reply: both {0} and {1} are present")]
    AmbiguousCodemodel(String, String),
    /// The codemodel carries an unsupported schema major version.
    #[error("unsupported codemodel schema version {found}; expected major version {expected}")]
    UnsupportedVersion {
        /// Major version found in the reply.
        found: u32,
        /// Major version this bridge requires.
        expected: u32,
    },
}

/// Ensure the file-API query marker exists under `build_dir`.
///
/// # Errors
///
/// Returns an error when the marker or its parents cannot be created.
pub fn ensure_query_file(build_dir: &Utf8Path) -> Result<()> {
    let query = build_dir.join(QUERY_FILE);
    if query.exists() {
        return Ok(());
    }
    if let Some(parent) = query.parent() {
        fs::create_dir_all(parent.as_std_path())
            .with_context(|| format!("failed to create query directory {parent}"))?;
    }
    fs::write(query.as_std_path(), [])
        .with_context(|| format!("failed to create query marker {query}"))?;
    debug!("created file-API query marker {query}");
    Ok(())
}

fn is_source_file(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

fn discovered_sources(src_dir: &Utf8Path) -> Vec<Utf8PathBuf> {
    let mut sources: Vec<Utf8PathBuf> = WalkDir::new(src_dir.as_std_path())
        .follow_links(false)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.into_path()).ok())
        .filter(|path| is_source_file(path))
        .filter_map(|path| {
            path.strip_prefix(src_dir)
                .map(Utf8Path::to_path_buf)
                .ok()
        })
        .collect();
    sources.sort();
    sources
}

/// Synthesize a minimal root and per-source project description when the
/// project ships none (first-run convenience, not a cache-correctness
/// concern). A later invocation with the files present and unmodified skips
/// synthesis entirely.
///
/// # Errors
///
/// Returns an error when the description files cannot be written.
pub fn ensure_project_description(project_dir: &Utf8Path, project_name: &str) -> Result<bool> {
    let root_lists = project_dir.join("CMakeLists.txt");
    if root_lists.exists() {
        return Ok(false);
    }
    let src_dir = project_dir.join("src");
    let sources = discovered_sources(&src_dir);
    let listed = sources
        .iter()
        .map(|path| format!("\"{path}\""))
        .collect::<Vec<_>>()
        .join(" ");

    let root = format!(
        "cmake_minimum_required(VERSION 3.16.0)\n\
         include($ENV{{IDF_PATH}}/tools/cmake/project.cmake)\n\
         project({project_name})\n"
    );
    fs::write(root_lists.as_std_path(), root)
        .with_context(|| format!("failed to write {root_lists}"))?;

    let src_lists = src_dir.join("CMakeLists.txt");
    fs::create_dir_all(src_dir.as_std_path())
        .with_context(|| format!("failed to create source directory {src_dir}"))?;
    let component = format!("idf_component_register(SRCS {listed})\n");
    fs::write(src_lists.as_std_path(), component)
        .with_context(|| format!("failed to write {src_lists}"))?;
    info!("synthesized CMake project description for {project_name}");
    Ok(true)
}

fn find_codemodel_file(reply_dir: &Utf8Path) -> Result<Utf8PathBuf> {
    let mut found: Option<Utf8PathBuf> = None;
    let entries = fs::read_dir(reply_dir.as_std_path())
        .map_err(|_| CodemodelError::MissingReply(reply_dir.to_path_buf()))?;
    let mut names: Vec<Utf8PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
        .collect();
    names.sort();
    for path in names {
        let starts = path
            .file_name()
            .is_some_and(|name| name.starts_with(CODEMODEL_PREFIX));
        if !starts {
            continue;
        }
        if let Some(existing) = &found {
            return Err(CodemodelError::AmbiguousCodemodel(
                existing.to_string(),
                path.to_string(),
            )
            .into());
        }
        found = Some(path);
    }
    found.ok_or_else(|| CodemodelError::MissingCodemodel(reply_dir.to_path_buf()).into())
}

/// Parsed codemodel plus the reply directory its detail documents live in.
#[derive(Debug)]
pub struct CodemodelLoader {
    reply_dir: Utf8PathBuf,
    model: CodeModel,
    details: HashMap<String, Rc<TargetConfig>>,
}

impl CodemodelLoader {
    /// Acquire the codemodel for `src_dir`, configuring into `build_dir`.
    ///
    /// Plants the query marker, synthesizes a project description when the
    /// project has none, consults the configure gate, runs the generator if
    /// required, and validates the reply. The absence of a reply is never
    /// silently tolerated.
    ///
    /// # Errors
    ///
    /// Returns an error for generator failures, missing or ambiguous reply
    /// documents, and schema major-version mismatches.
    pub fn load(
        ctx: &ProjectContext,
        src_dir: &Utf8Path,
        build_dir: &Utf8Path,
        extra_defines: &[String],
        verbose: bool,
    ) -> Result<Self> {
        ensure_query_file(build_dir)?;
        let project_name = src_dir.file_name().unwrap_or("firmware");
        ensure_project_description(src_dir, project_name)?;

        if configure::needs_reconfigure(src_dir, build_dir) {
            configure::run_cmake(ctx, src_dir, build_dir, extra_defines, verbose)?;
        } else {
            debug!("configure gate: reply for {build_dir} is current");
        }

        Self::from_reply_dir(&build_dir.join(REPLY_DIR))
    }

    /// Parse and validate the codemodel inside an existing reply directory.
    ///
    /// # Errors
    ///
    /// Returns an error for missing/ambiguous documents or an unsupported
    /// schema version.
    pub fn from_reply_dir(reply_dir: &Utf8Path) -> Result<Self> {
        let codemodel_path = find_codemodel_file(reply_dir)?;
        let text = fs::read_to_string(codemodel_path.as_std_path())
            .with_context(|| format!("failed to read codemodel {codemodel_path}"))?;
        let model: CodeModel = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse codemodel {codemodel_path}"))?;
        if model.version.major != SUPPORTED_MAJOR {
            return Err(CodemodelError::UnsupportedVersion {
                found: model.version.major,
                expected: SUPPORTED_MAJOR,
            }
            .into());
        }
        Ok(Self {
            reply_dir: reply_dir.to_path_buf(),
            model,
            details: HashMap::new(),
        })
    }

    /// The validated codemodel root document.
    #[must_use]
    pub const fn model(&self) -> &CodeModel {
        &self.model
    }

    /// Load (or fetch the memoized) detail document for `target`.
    ///
    /// # Errors
    ///
    /// Returns an error when the detail document is missing or malformed.
    pub fn target(&mut self, target: &TargetRef) -> Result<Rc<TargetConfig>> {
        if let Some(config) = self.details.get(&target.id) {
            return Ok(Rc::clone(config));
        }
        let path = self.reply_dir.join(&target.json_file);
        let text = fs::read_to_string(path.as_std_path())
            .with_context(|| format!("failed to read target document {path}"))?;
        let config: TargetConfig = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse target document {path}"))?;
        let config = Rc::new(config);
        self.details.insert(target.id.clone(), Rc::clone(&config));
        Ok(config)
    }

    /// Target references of the first configuration, in project-listed order.
    ///
    /// # Errors
    ///
    /// Returns an error when the codemodel has no configuration.
    pub fn target_refs(&self) -> Result<Vec<TargetRef>> {
        let configuration = self
            .model
            .configuration()
            .context("codemodel has no configurations")?;
        let mut refs = Vec::new();
        for project in &configuration.projects {
            for index in &project.target_indexes {
                if let Some(target) = configuration.targets.get(*index) {
                    refs.push(target.clone());
                }
            }
        }
        if refs.is_empty() {
            refs.extend(configuration.targets.iter().cloned());
        }
        Ok(refs)
    }
}
