use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One (input, expected output) pair a submission is graded against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
        }
    }
}

/// A batch submission: one program graded against every test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub source_code: String,
    pub language: String,
    pub test_cases: Vec<TestCase>,
    /// Seconds; clamped to the language default.
    #[serde(default)]
    pub time_limit_secs: Option<u64>,
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,
}

/// Verdict taxonomy.
///
/// `PRIORITY` is the order used both when several signals are present in one
/// run and when folding a batch into its overall status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    CompilationError,
}

impl Status {
    /// Failure statuses in decreasing precedence.
    pub const PRIORITY: [Status; 5] = [
        Status::TimeLimitExceeded,
        Status::MemoryLimitExceeded,
        Status::CompilationError,
        Status::RuntimeError,
        Status::WrongAnswer,
    ];

    pub fn is_accepted(self) -> bool {
        self == Status::Accepted
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Accepted => "ACCEPTED",
            Status::WrongAnswer => "WRONG_ANSWER",
            Status::TimeLimitExceeded => "TIME_LIMIT_EXCEEDED",
            Status::MemoryLimitExceeded => "MEMORY_LIMIT_EXCEEDED",
            Status::RuntimeError => "RUNTIME_ERROR",
            Status::CompilationError => "COMPILATION_ERROR",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of running the program against a single test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: Status,
    pub stdout: String,
    /// Program stderr, or an infrastructure error description.
    pub error: Option<String>,
    pub elapsed_ms: u64,
    /// Peak resident memory sampled from the sandbox; `None` when the
    /// sandbox could not provide a measurement.
    pub memory_kb: Option<u64>,
    pub passed: bool,
}

impl ExecutionResult {
    /// Result for a test case that never reached the program because the
    /// execution environment itself failed.
    pub fn infrastructure_failure(message: impl Into<String>) -> Self {
        Self {
            status: Status::RuntimeError,
            stdout: String::new(),
            error: Some(message.into()),
            elapsed_ms: 0,
            memory_kb: None,
            passed: false,
        }
    }
}

/// Aggregate over every test case of one request, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub language: String,
    pub status: Status,
    pub all_passed: bool,
    pub passed_count: usize,
    pub total_count: usize,
    pub results: Vec<ExecutionResult>,
    pub average_runtime_ms: f64,
    pub average_memory_kb: Option<f64>,
    pub time_limit_ms: u64,
    pub memory_limit_mb: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
