/// Result Classifier - raw sandbox output to verdict
///
/// **Core Responsibility:**
/// Assign exactly one `Status` per run. When several signals are present the
/// first match wins:
/// 1. TIME_LIMIT_EXCEEDED - the wall-clock limit fired
/// 2. MEMORY_LIMIT_EXCEEDED - the memory ceiling was hit
/// 3. COMPILATION_ERROR - stderr carries compiler diagnostics
/// 4. RUNTIME_ERROR - any other stderr, or a non-zero exit
/// 5. ACCEPTED - trimmed stdout equals trimmed expected output
/// 6. WRONG_ANSWER - otherwise
///
/// **Comparison Rules:**
/// - Trim leading/trailing whitespace: YES
/// - Internal whitespace, case, line endings inside the text: exact
/// - Floating-point tolerance: NO
///
/// Knows nothing about Docker or workspaces: a pure function of raw output.

use crate::sandbox::{RawOutput, OOM_MARKER, TIMEOUT_MARKER};
use judgebox_common::{ExecutionResult, Status};

/// Stderr fragments runtimes print when an allocation fails
const MEMORY_MARKERS: &[&str] = &[
    OOM_MARKER,
    "MemoryError",
    "std::bad_alloc",
    "OutOfMemoryError",
    "JavaScript heap out of memory",
    "memory allocation of",
    "Cannot allocate memory",
];

/// Decides whether stderr is a compiler diagnostic.
///
/// Substring matching is the default strategy; a language can plug in a
/// structured one (e.g. parsing compiler JSON output) instead.
pub trait DiagnosticMatcher: Send + Sync {
    fn is_compile_error(&self, stderr: &str) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct SubstringMatcher {
    markers: Vec<String>,
}

impl SubstringMatcher {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }
}

impl DiagnosticMatcher for SubstringMatcher {
    fn is_compile_error(&self, stderr: &str) -> bool {
        self.markers
            .iter()
            .any(|marker| !marker.is_empty() && stderr.contains(marker.as_str()))
    }
}

fn normalize_output(output: &str) -> &str {
    output.trim()
}

/// Trimmed exact equality
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize_output(actual) == normalize_output(expected)
}

pub fn classify(raw: &RawOutput, expected: &str, matcher: &dyn DiagnosticMatcher) -> Status {
    let stderr = raw.stderr.as_str();

    if raw.timed_out || stderr.contains(TIMEOUT_MARKER) {
        Status::TimeLimitExceeded
    } else if raw.oom_killed || MEMORY_MARKERS.iter().any(|m| stderr.contains(m)) {
        Status::MemoryLimitExceeded
    } else if matcher.is_compile_error(stderr) {
        Status::CompilationError
    } else if !stderr.trim().is_empty() || raw.exit_code.is_some_and(|code| code != 0) {
        Status::RuntimeError
    } else if outputs_match(&raw.stdout, expected) {
        Status::Accepted
    } else {
        Status::WrongAnswer
    }
}

/// Classify and package one test case's outcome
pub fn evaluate(
    raw: RawOutput,
    expected: &str,
    matcher: &dyn DiagnosticMatcher,
) -> ExecutionResult {
    let status = classify(&raw, expected, matcher);
    let error = (!raw.stderr.is_empty()).then_some(raw.stderr);

    ExecutionResult {
        status,
        stdout: raw.stdout,
        error,
        elapsed_ms: raw.elapsed_ms,
        memory_kb: raw.peak_memory_kb,
        passed: status.is_accepted(),
    }
}

/// Batch status: ACCEPTED only if every case passed, otherwise the failing
/// status that ranks highest in `Status::PRIORITY`, regardless of how many
/// other cases passed.
pub fn overall_status(results: &[ExecutionResult]) -> Status {
    Status::PRIORITY
        .iter()
        .copied()
        .find(|status| results.iter().any(|r| r.status == *status))
        .unwrap_or(Status::Accepted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> SubstringMatcher {
        SubstringMatcher::new(vec![
            "error:".to_string(),
            "cannot find symbol".to_string(),
        ])
    }

    fn stdout(text: &str) -> RawOutput {
        RawOutput {
            stdout: text.to_string(),
            exit_code: Some(0),
            ..Default::default()
        }
    }

    fn stderr(text: &str, exit_code: i64) -> RawOutput {
        RawOutput {
            stderr: text.to_string(),
            exit_code: Some(exit_code),
            ..Default::default()
        }
    }

    fn result(status: Status) -> ExecutionResult {
        ExecutionResult {
            status,
            stdout: String::new(),
            error: None,
            elapsed_ms: 0,
            memory_kb: None,
            passed: status.is_accepted(),
        }
    }

    #[test]
    fn test_normalize_output() {
        assert_eq!(normalize_output("hello"), "hello");
        assert_eq!(normalize_output("  hello  "), "hello");
        assert_eq!(normalize_output("\nhello\r\n"), "hello");
        assert_eq!(normalize_output("   "), "");
    }

    #[test]
    fn test_trim_only_comparison() {
        assert_eq!(classify(&stdout("42\n"), "42", &matcher()), Status::Accepted);
        assert_eq!(classify(&stdout("42 "), "4 2", &matcher()), Status::WrongAnswer);
        assert_eq!(classify(&stdout("Hello"), "hello", &matcher()), Status::WrongAnswer);
        assert_eq!(classify(&stdout("1.0"), "1", &matcher()), Status::WrongAnswer);
        assert_eq!(
            classify(&stdout("a\n\nb"), "a\nb", &matcher()),
            Status::WrongAnswer
        );
    }

    #[test]
    fn test_timeout_wins_over_everything() {
        let raw = RawOutput {
            stdout: "42".to_string(),
            stderr: "main.c:1: error: oops".to_string(),
            timed_out: true,
            oom_killed: true,
            ..Default::default()
        };
        assert_eq!(classify(&raw, "42", &matcher()), Status::TimeLimitExceeded);

        let marker_only = stderr(TIMEOUT_MARKER, 124);
        assert_eq!(
            classify(&marker_only, "", &matcher()),
            Status::TimeLimitExceeded
        );
    }

    #[test]
    fn test_memory_before_compilation() {
        let raw = RawOutput {
            stderr: "error: something".to_string(),
            oom_killed: true,
            exit_code: Some(137),
            ..Default::default()
        };
        assert_eq!(classify(&raw, "", &matcher()), Status::MemoryLimitExceeded);

        let python = stderr("Traceback...\nMemoryError", 1);
        assert_eq!(classify(&python, "", &matcher()), Status::MemoryLimitExceeded);
    }

    #[test]
    fn test_compilation_error() {
        let raw = stderr("Main.java:3: error: cannot find symbol", 1);
        assert_eq!(classify(&raw, "", &matcher()), Status::CompilationError);
    }

    #[test]
    fn test_runtime_error_from_stderr_or_exit() {
        let raw = stderr("Exception in thread \"main\" java.lang.ArithmeticException", 1);
        assert_eq!(classify(&raw, "", &matcher()), Status::RuntimeError);

        // Segfaults often print nothing
        let silent = RawOutput {
            stdout: "expected".to_string(),
            exit_code: Some(139),
            ..Default::default()
        };
        assert_eq!(classify(&silent, "expected", &matcher()), Status::RuntimeError);
    }

    #[test]
    fn test_stderr_never_accepted() {
        let raw = RawOutput {
            stdout: "42".to_string(),
            stderr: "warning: something".to_string(),
            exit_code: Some(1),
            ..Default::default()
        };
        assert_ne!(classify(&raw, "42", &matcher()), Status::Accepted);
    }

    #[test]
    fn test_empty_markers_never_match() {
        let matcher = SubstringMatcher::new(vec![String::new()]);
        assert!(!matcher.is_compile_error("anything"));
    }

    #[test]
    fn test_evaluate_packages_result() {
        let raw = RawOutput {
            stdout: "6\n".to_string(),
            exit_code: Some(0),
            elapsed_ms: 37,
            peak_memory_kb: Some(9000),
            ..Default::default()
        };

        let result = evaluate(raw, "6", &matcher());

        assert_eq!(result.status, Status::Accepted);
        assert!(result.passed);
        assert_eq!(result.error, None);
        assert_eq!(result.elapsed_ms, 37);
        assert_eq!(result.memory_kb, Some(9000));
    }

    #[test]
    fn test_overall_status_all_accepted() {
        let results = vec![result(Status::Accepted), result(Status::Accepted)];
        assert_eq!(overall_status(&results), Status::Accepted);
    }

    #[test]
    fn test_overall_status_priority() {
        let results = vec![
            result(Status::Accepted),
            result(Status::CompilationError),
            result(Status::Accepted),
        ];
        assert_eq!(overall_status(&results), Status::CompilationError);

        let results = vec![
            result(Status::WrongAnswer),
            result(Status::RuntimeError),
            result(Status::TimeLimitExceeded),
        ];
        assert_eq!(overall_status(&results), Status::TimeLimitExceeded);
    }
}
