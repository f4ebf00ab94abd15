//! Immutable build context shared by every pipeline stage.
//!
//! A [`ProjectContext`] is constructed once by the runner from CLI flags and
//! the process environment, then passed by reference into the configure,
//! classification, and assembly stages. Stages that need additional settings
//! clone-and-extend derived values instead of mutating shared state.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Build profile requested for the current invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildType {
    /// Optimized build with the generator's own flags left untouched.
    #[default]
    Release,
    /// Debug build; the project debug-flag policy is appended after all
    /// generator-supplied flags so optimization flags cannot override it.
    Debug,
}

/// Errors raised while validating the project layout.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The vendor framework directory does not exist.
    #[error("framework directory {0} does not exist; install the framework or set TSUGITE_FRAMEWORK_PATH")]
    MissingFramework(Utf8PathBuf),
    /// A critical absolute path contains whitespace, which the generator and
    /// the Ninja command lines cannot tolerate.
    #[error("whitespace in {role} path {path:?}; relocate the directory to a path without spaces")]
    WhitespaceInPath {
        /// Which path was rejected (project, build, or framework).
        role: &'static str,
        /// The offending path.
        path: Utf8PathBuf,
    },
    /// Per-file source filtering was configured for a CMake-driven project.
    #[error("per-file source filters are not supported for CMake-driven projects; remove the filter and express the layout in CMakeLists.txt")]
    SourceFilterUnsupported,
}

/// Paths and identifiers fixed for one build invocation.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// Root of the user's project (holds `CMakeLists.txt` and `sdkconfig`).
    pub project_dir: Utf8PathBuf,
    /// Root of the primary build tree.
    pub build_dir: Utf8PathBuf,
    /// Root of the vendor framework checkout.
    pub framework_dir: Utf8PathBuf,
    /// Cross-toolchain prefix, e.g. `xtensa-esp32-elf-`.
    pub toolchain_prefix: String,
    /// Chip target identifier passed to the generator, e.g. `esp32`.
    pub mcu: String,
    /// Board identifier, used for diagnostics only.
    pub board: String,
    /// Frameworks active for this project.
    pub frameworks: Vec<String>,
    /// Release or debug profile.
    pub build_type: BuildType,
    /// Directories prepended to `PATH` when invoking the generator, so the
    /// companion tools (toolchain `bin`, ninja, the generator's interpreter)
    /// resolve without touching the user's environment.
    pub tool_dirs: Vec<Utf8PathBuf>,
}

impl ProjectContext {
    /// Validate the layout invariants that every later stage relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when the framework directory is missing or a
    /// critical absolute path contains whitespace.
    pub fn validate(&self) -> Result<(), ContextError> {
        if !self.framework_dir.is_dir() {
            return Err(ContextError::MissingFramework(self.framework_dir.clone()));
        }
        for (role, path) in [
            ("project", &self.project_dir),
            ("build", &self.build_dir),
            ("framework", &self.framework_dir),
        ] {
            if path.as_str().chars().any(char::is_whitespace) {
                return Err(ContextError::WhitespaceInPath {
                    role,
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Path of the user-editable project configuration file.
    #[must_use]
    pub fn sdkconfig_path(&self) -> Utf8PathBuf {
        self.project_dir.join("sdkconfig")
    }

    /// Root of the framework's component tree.
    #[must_use]
    pub fn components_dir(&self) -> Utf8PathBuf {
        self.framework_dir.join("components")
    }

    /// Name of a cross tool with the toolchain prefix applied.
    #[must_use]
    pub fn tool(&self, name: &str) -> String {
        format!("{}{name}", self.toolchain_prefix)
    }

    /// Whether the requested profile (or an explicit `debug` target name)
    /// selects the debug-flag policy.
    #[must_use]
    pub fn debug_build(&self, requested_targets: &[String]) -> bool {
        self.build_type == BuildType::Debug || requested_targets.iter().any(|t| t == "debug")
    }

    /// Derive the context for a nested sub-project rooted at `source_dir`,
    /// building into `build_subdir` under the primary build tree.
    #[must_use]
    pub fn sub_build(&self, build_subdir: &str) -> Self {
        let mut ctx = self.clone();
        ctx.build_dir = self.build_dir.join(build_subdir);
        ctx
    }
}

/// Check a camino path for whitespace without constructing a full context.
///
/// Used by the runner to validate auxiliary paths (partition CSV, linker
/// templates) with the same policy as the core paths.
#[must_use]
pub fn has_whitespace(path: &Utf8Path) -> bool {
    path.as_str().chars().any(char::is_whitespace)
}
