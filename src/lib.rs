//! Tsugite core library.
//!
//! Tsugite drives a CMake-described firmware project through the Ninja
//! generator, reads the resulting file-API codemodel, and re-projects it
//! into its own build graph: component archives, classified compile and
//! link arguments, a generated linker script, and the bootloader and ULP
//! sub-builds.

pub mod assemble;
pub mod bootloader;
pub mod cli;
pub mod codemodel;
pub mod configure;
pub mod context;
pub mod deps;
pub mod flags;
pub mod graph;
pub mod ldgen;
pub mod linkargs;
pub mod ninja_gen;
pub mod partitions;
pub mod pipeline;
pub mod runner;
pub mod ulp;
