#![forbid(unsafe_code)]

//! Shared environment constants used across tsugite crates (library, tests,
//! and helpers).

/// Environment variable override for the Ninja executable.
///
/// # Examples
///
/// ```
/// use tool_env::NINJA_ENV;
/// unsafe { std::env::set_var(NINJA_ENV, "/usr/bin/ninja") };
/// assert_eq!(
///     std::env::var(NINJA_ENV).expect("NINJA_ENV should be set"),
///     "/usr/bin/ninja",
/// );
/// unsafe { std::env::remove_var(NINJA_ENV) };
/// ```
pub const NINJA_ENV: &str = "TSUGITE_NINJA";

/// Environment variable override for the CMake executable.
///
/// Points the configure stage at an alternative generator binary, which the
/// integration tests use to substitute a stub that records its invocation.
pub const CMAKE_ENV: &str = "TSUGITE_CMAKE";

/// Environment variable naming the vendor framework root.
///
/// When unset, the framework root must be supplied on the command line.
pub const FRAMEWORK_ENV: &str = "TSUGITE_FRAMEWORK_PATH";

/// Environment variable carrying extra companion-tool directories.
///
/// A platform path list (`:`-separated on Unix) prepended to `PATH` when
/// the generator runs, so toolchain `bin` directories, the build driver,
/// the Ninja executor, and the generator's interpreter resolve without
/// touching the user's environment. Combined with any `--tool-dir` flags.
pub const TOOL_PATH_ENV: &str = "TSUGITE_TOOL_PATH";
