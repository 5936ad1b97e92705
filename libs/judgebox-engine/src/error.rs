use std::path::PathBuf;
use thiserror::Error;

/// Request-level rejections. Raised before any workspace exists.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecuteError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("no test cases supplied")]
    NoTestCases,

    #[error("source code is empty")]
    EmptySource,

    #[error("source code exceeds maximum size of {max} bytes")]
    SourceTooLarge { max: usize },

    #[error("input of test case {index} exceeds maximum size of {max} bytes")]
    InputTooLarge { index: usize, max: usize },

    #[error("{0} limit must be greater than zero")]
    InvalidLimit(&'static str),
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the isolation environment itself, never of the program under test.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to connect to container runtime: {0}")]
    Connect(String),

    #[error("sandbox image '{image}' unavailable: {message}")]
    Image { image: String, message: String },

    #[error("failed to create sandbox: {0}")]
    Create(String),

    #[error("failed to start sandbox: {0}")]
    Start(String),

    #[error("sandbox runtime error: {0}")]
    Runtime(String),
}

impl From<bollard::errors::Error> for SandboxError {
    fn from(err: bollard::errors::Error) -> Self {
        SandboxError::Runtime(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read language table {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse language table: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("language key '{0}' is declared more than once")]
    DuplicateKey(String),

    #[error("language table is empty")]
    Empty,
}
