/// Sandboxed Runner - the seam between the orchestrator and the isolation technology
///
/// **Core Responsibility:**
/// Compile (if needed) and run one workspace inside a disposable isolated
/// environment, under a wall-clock limit, and hand back raw output.
///
/// **Boundary:**
/// - A sandbox never judges correctness; a non-zero exit or stderr output is
///   data for the classifier, not an error.
/// - `SandboxError` is reserved for the environment itself failing
///   (cannot create, start, or talk to the isolation runtime).
///
/// Production uses `DockerSandbox` (see `docker.rs`); tests substitute fakes.

use crate::error::SandboxError;
use crate::language::LanguageProfile;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub mod docker;

pub use docker::DockerSandbox;

/// Appended to stderr when the wall-clock limit fired
pub const TIMEOUT_MARKER: &str = "[Execution timed out]";
/// Appended to stderr when the memory ceiling killed the program
pub const OOM_MARKER: &str = "[Memory limit exceeded]";
pub const TRUNCATION_MARKER: &str = "[output truncated]";

/// Everything needed to run one attempt
#[derive(Debug, Clone, Copy)]
pub struct SandboxSpec<'a> {
    /// Host directory mounted as the sole writable working directory
    pub workspace: &'a Path,
    pub profile: &'a LanguageProfile,
    pub source_file: &'a str,
    pub time_limit: Duration,
    pub memory_limit_mb: u64,
}

/// Untrusted program's observable behaviour, plus what the runtime saw
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
    pub timed_out: bool,
    pub oom_killed: bool,
    /// Measured by the caller around the whole invocation
    pub elapsed_ms: u64,
    pub peak_memory_kb: Option<u64>,
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn run(&self, spec: &SandboxSpec<'_>) -> Result<RawOutput, SandboxError>;
}

/// Cap captured bytes at `max`, cutting on a char boundary
pub(crate) fn truncate_output(bytes: &[u8], max: usize) -> String {
    if bytes.len() <= max {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let mut text = String::from_utf8_lossy(&bytes[..max]).into_owned();
    // A multi-byte char split at `max` decodes to U+FFFD; drop it
    if text.ends_with('\u{FFFD}') {
        text.pop();
    }
    text.push('\n');
    text.push_str(TRUNCATION_MARKER);
    text
}

/// Append a runtime marker to stderr on its own line
pub(crate) fn append_marker(stderr: &mut String, marker: &str) {
    if stderr.contains(marker) {
        return;
    }
    if !stderr.is_empty() && !stderr.ends_with('\n') {
        stderr.push('\n');
    }
    stderr.push_str(marker);
}
