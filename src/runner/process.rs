//! Ninja subprocess plumbing.
//!
//! Spawns the Ninja executable against a generated build file, streaming
//! its output back to the user line by line. The executable can be
//! overridden through [`tool_env::NINJA_ENV`], which the integration tests
//! use to substitute a stub.

use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::{env, fs, thread};
use tracing::info;

/// Default Ninja executable to invoke.
pub const NINJA_PROGRAM: &str = "ninja";

/// Determine which Ninja executable to invoke.
#[must_use]
pub fn resolve_ninja_program() -> PathBuf {
    env::var_os(tool_env::NINJA_ENV).map_or_else(|| PathBuf::from(NINJA_PROGRAM), PathBuf::from)
}

/// Write generated Ninja text to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error when the parents or the file cannot be written.
pub fn write_ninja_file(path: &Utf8Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        fs::create_dir_all(parent.as_std_path())
            .with_context(|| format!("failed to create parent directory {parent}"))?;
    }
    fs::write(path.as_std_path(), content)
        .with_context(|| format!("failed to write Ninja file to {path}"))?;
    info!("Generated Ninja file at {path}");
    Ok(())
}

/// Invoke Ninja against `build_file`, forwarding the job count and target
/// names and streaming output back to the user.
///
/// # Errors
///
/// Returns an error when the process cannot be spawned or exits nonzero.
/// There is no retry; a failing build terminates the whole invocation.
pub fn run_ninja(build_file: &Utf8Path, targets: &[String], jobs: Option<usize>) -> Result<()> {
    let program = resolve_ninja_program();
    let mut cmd = Command::new(&program);
    if let Some(jobs) = jobs {
        cmd.arg("-j").arg(jobs.to_string());
    }
    cmd.arg("-f").arg(build_file.as_std_path());
    cmd.args(targets);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    info!(
        "Running command: {} -f {} {}",
        program.display(),
        build_file,
        targets.join(" ")
    );

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn {}", program.display()))?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out_handle = stdout.map(|pipe| {
        thread::spawn(move || {
            let reader = BufReader::new(pipe);
            let mut handle = io::stdout();
            for line in reader.lines().map_while(Result::ok) {
                let _ = writeln!(handle, "{line}");
            }
        })
    });
    let err_handle = stderr.map(|pipe| {
        thread::spawn(move || {
            let reader = BufReader::new(pipe);
            let mut handle = io::stderr();
            for line in reader.lines().map_while(Result::ok) {
                let _ = writeln!(handle, "{line}");
            }
        })
    });

    let status = child
        .wait()
        .with_context(|| format!("failed to wait for {}", program.display()))?;
    if let Some(handle) = out_handle {
        let _ = handle.join();
    }
    if let Some(handle) = err_handle {
        let _ = handle.join();
    }

    if !status.success() {
        bail!("ninja exited with {status} for build file {build_file}");
    }
    Ok(())
}

/// Invoke a Ninja tool (e.g. `ninja -t clean`) against `build_file`.
///
/// # Errors
///
/// Returns an error when the process cannot be spawned or exits nonzero.
pub fn run_ninja_tool(build_file: &Utf8Path, tool: &str) -> Result<()> {
    let program = resolve_ninja_program();
    let status = Command::new(&program)
        .arg("-f")
        .arg(build_file.as_std_path())
        .args(["-t", tool])
        .status()
        .with_context(|| format!("failed to spawn {}", program.display()))?;
    if !status.success() {
        bail!("ninja -t {tool} exited with {status}");
    }
    Ok(())
}
