//! CMake file-API codemodel ingestion.
//!
//! The codemodel is the generator's machine-readable description of every
//! build target, compile setting, and link command for one configured
//! project. [`model`] holds the serde document structures and [`loader`]
//! drives the query/configure/reply cycle that produces them.

pub mod loader;
pub mod model;

pub use loader::{CodemodelError, CodemodelLoader, ensure_project_description, ensure_query_file};
pub use model::{
    CodeModel, CommandFragment, CompileGroup, Configuration, Define, DependencyRef, Include,
    LinkFragment, LinkInfo, ProjectRef, SchemaVersion, SourceEntry, TargetConfig, TargetPaths,
    TargetRef, TargetType,
};
