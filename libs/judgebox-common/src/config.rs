// Runtime configuration for the sandbox and the orchestrator
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_IMAGE: &str = "judgebox-sandbox:latest";
pub const DEFAULT_ENTRYPOINT_DIR: &str = "/usr/local/bin";
pub const DEFAULT_SANDBOX_USER: &str = "65534:65534";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Image exposing one `execute-<language>.sh` per supported language
    pub image: String,
    pub entrypoint_dir: String,
    /// Parent directory of every per-attempt workspace
    pub workspace_root: PathBuf,
    /// Fixed unprivileged `uid:gid` the program runs as
    pub user: String,
    pub pids_limit: i64,
    pub default_memory_mb: u64,
    pub max_memory_mb: u64,
    /// Added to the time limit for the caller-side timeout
    pub timeout_buffer_secs: u64,
    /// Per-stream capture cap
    pub max_output_bytes: usize,
    /// Largest single file the program may write (`RLIMIT_FSIZE`)
    pub max_file_size_mb: u64,
    /// `None` fans out every test case at once
    pub max_parallel_tests: Option<usize>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            entrypoint_dir: DEFAULT_ENTRYPOINT_DIR.to_string(),
            workspace_root: std::env::temp_dir().join("judgebox"),
            user: DEFAULT_SANDBOX_USER.to_string(),
            pids_limit: 64,
            default_memory_mb: 256,
            max_memory_mb: 1024,
            timeout_buffer_secs: 5,
            max_output_bytes: 64 * 1024,
            max_file_size_mb: 64,
            max_parallel_tests: None,
        }
    }
}

impl SandboxConfig {
    /// Build from `JUDGEBOX_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            image: parsed("JUDGEBOX_IMAGE").unwrap_or(defaults.image),
            entrypoint_dir: parsed("JUDGEBOX_ENTRYPOINT_DIR").unwrap_or(defaults.entrypoint_dir),
            workspace_root: parsed("JUDGEBOX_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            user: parsed("JUDGEBOX_SANDBOX_USER").unwrap_or(defaults.user),
            pids_limit: parse_or(parsed("JUDGEBOX_PIDS_LIMIT"), defaults.pids_limit),
            default_memory_mb: parse_or(
                parsed("JUDGEBOX_DEFAULT_MEMORY_MB"),
                defaults.default_memory_mb,
            ),
            max_memory_mb: parse_or(parsed("JUDGEBOX_MAX_MEMORY_MB"), defaults.max_memory_mb),
            timeout_buffer_secs: parse_or(
                parsed("JUDGEBOX_TIMEOUT_BUFFER_SECS"),
                defaults.timeout_buffer_secs,
            ),
            max_output_bytes: parse_or(
                parsed("JUDGEBOX_MAX_OUTPUT_BYTES"),
                defaults.max_output_bytes,
            ),
            max_file_size_mb: parse_or(
                parsed("JUDGEBOX_MAX_FILE_SIZE_MB"),
                defaults.max_file_size_mb,
            ),
            max_parallel_tests: parsed("JUDGEBOX_MAX_PARALLEL_TESTS")
                .and_then(|v| v.trim().parse().ok())
                .filter(|n: &usize| *n > 0),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
