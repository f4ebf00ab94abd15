//! Serde structures for the CMake file-API reply documents.
//!
//! These mirror the v2 codemodel schema: a root document referencing one or
//! more configurations, each holding project and target references, with the
//! per-target detail stored in its own JSON file. Only the fields tsugite
//! consumes are modelled; unknown fields are ignored so minor-version
//! additions do not break ingestion. A major-version change is rejected by
//! the loader before any target is processed.
//!
//! ```rust
//! use tsugite::codemodel::CodeModel;
//!
//! let json = r#"{
//!     "version": {"major": 2, "minor": 3},
//!     "configurations": [{"projects": [], "targets": []}]
//! }"#;
//! let model: CodeModel = serde_json::from_str(json).expect("parse");
//! assert_eq!(model.version.major, 2);
//! ```

use camino::Utf8PathBuf;
use serde::Deserialize;

/// Schema version stamped on the codemodel root document.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SchemaVersion {
    /// Major schema version; tsugite requires `2`.
    pub major: u32,
    /// Minor schema version; informational only.
    #[serde(default)]
    pub minor: u32,
}

/// Root codemodel document.
///
/// Only the first configuration is consumed; multi-config generators are not
/// produced by the Ninja generator this bridge drives.
#[derive(Debug, Deserialize)]
pub struct CodeModel {
    /// Schema version contract.
    pub version: SchemaVersion,
    /// Build configurations; the first one is used.
    #[serde(default)]
    pub configurations: Vec<Configuration>,
}

impl CodeModel {
    /// The configuration the build graph is assembled from.
    #[must_use]
    pub fn configuration(&self) -> Option<&Configuration> {
        self.configurations.first()
    }
}

/// One build configuration within the codemodel.
#[derive(Debug, Deserialize)]
pub struct Configuration {
    /// Projects declared by the configuration.
    #[serde(default)]
    pub projects: Vec<ProjectRef>,
    /// Targets declared by the configuration, indexed by `targetIndexes`.
    #[serde(default)]
    pub targets: Vec<TargetRef>,
}

/// A project entry referencing targets by index.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRef {
    /// Project name.
    #[serde(default)]
    pub name: String,
    /// Indexes into [`Configuration::targets`].
    #[serde(default)]
    pub target_indexes: Vec<usize>,
}

/// Reference to a target's detail document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    /// Stable target id, unique within one codemodel.
    pub id: String,
    /// Target name.
    pub name: String,
    /// Detail document path, relative to the reply directory.
    pub json_file: Utf8PathBuf,
}

/// Kind of build target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TargetType {
    /// A linked program image.
    #[serde(rename = "EXECUTABLE")]
    Executable,
    /// An archived static library.
    #[serde(rename = "STATIC_LIBRARY")]
    StaticLibrary,
    /// A collection of objects without an archive step.
    #[serde(rename = "OBJECT_LIBRARY")]
    ObjectLibrary,
    /// Any other target kind; ignored by assembly.
    #[serde(other)]
    Other,
}

impl TargetType {
    /// Whether targets of this type participate in component assembly.
    #[must_use]
    pub const fn is_component(self) -> bool {
        matches!(self, Self::StaticLibrary | Self::ObjectLibrary)
    }
}

/// Source and build directories of a target, relative to the project root.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetPaths {
    /// Source directory.
    #[serde(default)]
    pub source: Utf8PathBuf,
    /// Build directory.
    #[serde(default)]
    pub build: Utf8PathBuf,
}

/// An include directory entry of a compile group.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Include {
    /// Directory path.
    pub path: Utf8PathBuf,
    /// Whether the compiler should treat it as a system header directory,
    /// suppressing warnings from vendor headers.
    #[serde(default)]
    pub is_system: bool,
}

/// A raw preprocessor define, possibly containing an `=value`.
#[derive(Debug, Clone, Deserialize)]
pub struct Define {
    /// The define text without the `-D` prefix.
    pub define: String,
}

/// A compiler command fragment.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandFragment {
    /// Raw fragment text.
    pub fragment: String,
}

/// A linker command fragment tagged with its role.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkFragment {
    /// Raw fragment text.
    pub fragment: String,
    /// Fragment role, `"flags"` or `"libraries"`.
    #[serde(default)]
    pub role: String,
}

/// The sources of one target that share language, defines, includes, and
/// compiler flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileGroup {
    /// Language tag, e.g. `C`, `CXX`, or `ASM`.
    pub language: String,
    /// Ordered include directories.
    #[serde(default)]
    pub includes: Vec<Include>,
    /// Ordered preprocessor defines.
    #[serde(default)]
    pub defines: Vec<Define>,
    /// Ordered compiler command fragments.
    #[serde(default)]
    pub compile_command_fragments: Vec<CommandFragment>,
}

/// One source file entry of a target.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceEntry {
    /// File path, relative to the target's source root or absolute.
    pub path: Utf8PathBuf,
    /// Index into the target's compile groups; absent for non-compiled
    /// files such as generated rule files, which assembly skips.
    pub compile_group_index: Option<usize>,
}

/// Link step description of an executable target.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkInfo {
    /// Ordered linker command fragments.
    #[serde(default)]
    pub command_fragments: Vec<LinkFragment>,
}

/// Explicit dependency edge of a target.
#[derive(Debug, Clone, Deserialize)]
pub struct DependencyRef {
    /// Id of the depended-upon target.
    pub id: String,
}

/// One build target, loaded lazily from its detail document and never
/// mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    /// Target name.
    pub name: String,
    /// Stable target id.
    pub id: String,
    /// Target kind.
    #[serde(rename = "type")]
    pub target_type: TargetType,
    /// On-disk artifact name, e.g. `libmain.a` or `firmware.elf`. Unique
    /// within the set of targets built in one assembly pass; also the key
    /// used for implicit-dependency archive matching.
    #[serde(default)]
    pub name_on_disk: Option<String>,
    /// Source/build directories relative to the project root.
    #[serde(default)]
    pub paths: TargetPaths,
    /// Compile groups of this target.
    #[serde(default)]
    pub compile_groups: Vec<CompileGroup>,
    /// Source file entries.
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
    /// Explicit dependency edges.
    #[serde(default)]
    pub dependencies: Vec<DependencyRef>,
    /// Link step, present for linked targets only.
    pub link: Option<LinkInfo>,
}

impl TargetConfig {
    /// The archive or image name the generator chose for this target.
    #[must_use]
    pub fn artifact_name(&self) -> &str {
        self.name_on_disk.as_deref().unwrap_or(&self.name)
    }
}
