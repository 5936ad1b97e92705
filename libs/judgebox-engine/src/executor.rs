/// Execution Orchestrator - the public entry point
///
/// **Responsibility:**
/// For one submission, drive workspace creation, sandbox invocation,
/// classification and cleanup for every test case, then aggregate.
///
/// **Architecture:**
/// 1. Resolve the language profile once; reject unknown languages and bad
///    requests before any workspace exists
/// 2. Fan out one attempt per test case (workspace -> sandbox -> classify ->
///    destroy), all awaited jointly
/// 3. Fold the per-case results, in input order, into an `ExecutionReport`
///
/// A failure inside one test case (workspace or sandbox infrastructure)
/// becomes a RUNTIME_ERROR result for that case; the batch always completes.

use crate::classifier::{self, DiagnosticMatcher, SubstringMatcher};
use crate::error::ExecuteError;
use crate::language::{LanguageProfile, LanguageRegistry};
use crate::sandbox::{Sandbox, SandboxSpec};
use crate::workspace::WorkspaceManager;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use judgebox_common::{
    ExecutionReport, ExecutionRequest, ExecutionResult, SandboxConfig, TestCase,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Safety limits to prevent pathological inputs from reaching the sandbox
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_TEST_INPUT_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Effective limits for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub time: Duration,
    pub memory_mb: u64,
}

pub struct Executor {
    registry: LanguageRegistry,
    workspaces: WorkspaceManager,
    sandbox: Arc<dyn Sandbox>,
    config: SandboxConfig,
    matchers: HashMap<String, Arc<dyn DiagnosticMatcher>>,
}

impl Executor {
    pub fn new(
        registry: LanguageRegistry,
        sandbox: Arc<dyn Sandbox>,
        config: SandboxConfig,
    ) -> Self {
        Self {
            registry,
            workspaces: WorkspaceManager::new(config.workspace_root.clone()),
            sandbox,
            config,
            matchers: HashMap::new(),
        }
    }

    /// Replace the compile-diagnostic strategy for one language
    pub fn with_matcher(
        mut self,
        language: &str,
        matcher: Arc<dyn DiagnosticMatcher>,
    ) -> Result<Self, ExecuteError> {
        let name = self.registry.profile_for(language)?.name.clone();
        self.matchers.insert(name, matcher);
        Ok(self)
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Run `request.source_code` against every test case
    #[instrument(
        skip(self, request),
        fields(
            language = %request.language,
            test_count = request.test_cases.len(),
            source_size = request.source_code.len()
        )
    )]
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionReport, ExecuteError> {
        let profile = self.registry.profile_for(&request.language)?;
        validate(request)?;
        let limits = self.limits(profile, request)?;

        let started_at = Utc::now();
        info!(
            language = %profile.name,
            time_limit_ms = limits.time.as_millis() as u64,
            memory_limit_mb = limits.memory_mb,
            "Starting execution"
        );

        let matcher = self.matcher_for(profile);
        let runs = request
            .test_cases
            .iter()
            .enumerate()
            .map(|(index, test_case)| {
                self.run_test_case(
                    index,
                    profile,
                    matcher.as_ref(),
                    &request.source_code,
                    test_case,
                    limits,
                )
            });

        // Both paths yield results in input order, not completion order
        let results: Vec<ExecutionResult> = match self.config.max_parallel_tests {
            Some(width) => stream::iter(runs).buffered(width.max(1)).collect().await,
            None => join_all(runs).await,
        };

        let report = aggregate(&profile.name, results, limits, started_at);

        info!(
            language = %profile.name,
            status = %report.status,
            passed = report.passed_count,
            total = report.total_count,
            average_runtime_ms = report.average_runtime_ms,
            "Execution completed"
        );

        Ok(report)
    }

    /// Time limit is capped by the language default; memory by the configured maximum
    pub fn limits(
        &self,
        profile: &LanguageProfile,
        request: &ExecutionRequest,
    ) -> Result<Limits, ExecuteError> {
        let default_time = profile.default_timeout();
        let time = match request.time_limit_secs {
            Some(0) => return Err(ExecuteError::InvalidLimit("time")),
            Some(secs) => Duration::from_secs(secs).min(default_time),
            None => default_time,
        };
        if time.is_zero() {
            return Err(ExecuteError::InvalidLimit("time"));
        }

        let memory_mb = match request.memory_limit_mb {
            Some(0) => return Err(ExecuteError::InvalidLimit("memory")),
            Some(mb) => mb,
            None => self.config.default_memory_mb,
        }
        .min(self.config.max_memory_mb);
        if memory_mb == 0 {
            return Err(ExecuteError::InvalidLimit("memory"));
        }

        Ok(Limits { time, memory_mb })
    }

    fn matcher_for(&self, profile: &LanguageProfile) -> Arc<dyn DiagnosticMatcher> {
        self.matchers
            .get(&profile.name)
            .cloned()
            .unwrap_or_else(|| Arc::new(SubstringMatcher::new(profile.compile_markers.clone())))
    }

    /// One isolated attempt. Never fails: infrastructure problems become a
    /// RUNTIME_ERROR result carrying the error text.
    async fn run_test_case(
        &self,
        index: usize,
        profile: &LanguageProfile,
        matcher: &dyn DiagnosticMatcher,
        source_code: &str,
        test_case: &TestCase,
        limits: Limits,
    ) -> ExecutionResult {
        let workspace = match self
            .workspaces
            .create(profile, source_code, &test_case.input)
            .await
        {
            Ok(workspace) => workspace,
            Err(e) => {
                error!(test_index = index, error = %e, "Workspace creation failed");
                return ExecutionResult::infrastructure_failure(format!(
                    "Workspace creation failed: {}",
                    e
                ));
            }
        };

        debug!(test_index = index, workspace = %workspace.id(), "Running test case");

        let outcome = {
            let spec = SandboxSpec {
                workspace: workspace.path(),
                profile,
                source_file: workspace.source_file(),
                time_limit: limits.time,
                memory_limit_mb: limits.memory_mb,
            };
            self.sandbox.run(&spec).await
        };

        // Cleanup happens before classification so no path can skip it
        workspace.destroy().await;

        match outcome {
            Ok(raw) => {
                let result = classifier::evaluate(raw, &test_case.expected_output, matcher);
                debug!(
                    test_index = index,
                    status = %result.status,
                    elapsed_ms = result.elapsed_ms,
                    memory_kb = ?result.memory_kb,
                    "Test case finished"
                );
                result
            }
            Err(e) => {
                warn!(test_index = index, error = %e, "Sandbox execution failed");
                ExecutionResult::infrastructure_failure(format!(
                    "Sandbox execution failed: {}",
                    e
                ))
            }
        }
    }
}

/// Request-shape checks that need no profile
fn validate(request: &ExecutionRequest) -> Result<(), ExecuteError> {
    if request.test_cases.is_empty() {
        return Err(ExecuteError::NoTestCases);
    }
    if request.source_code.trim().is_empty() {
        return Err(ExecuteError::EmptySource);
    }
    if request.source_code.len() > MAX_SOURCE_CODE_BYTES {
        return Err(ExecuteError::SourceTooLarge {
            max: MAX_SOURCE_CODE_BYTES,
        });
    }
    if let Some(index) = request
        .test_cases
        .iter()
        .position(|tc| tc.input.len() > MAX_TEST_INPUT_BYTES)
    {
        return Err(ExecuteError::InputTooLarge {
            index,
            max: MAX_TEST_INPUT_BYTES,
        });
    }
    Ok(())
}

/// Fold per-case results into the report.
///
/// Averages include failed cases. Memory is averaged over the cases that
/// have a measurement and is `None` when none do.
pub fn aggregate(
    language: &str,
    results: Vec<ExecutionResult>,
    limits: Limits,
    started_at: DateTime<Utc>,
) -> ExecutionReport {
    let total_count = results.len();
    let passed_count = results.iter().filter(|r| r.passed).count();

    let average_runtime_ms = if total_count == 0 {
        0.0
    } else {
        results.iter().map(|r| r.elapsed_ms as f64).sum::<f64>() / total_count as f64
    };

    let measured: Vec<u64> = results.iter().filter_map(|r| r.memory_kb).collect();
    let average_memory_kb = (!measured.is_empty())
        .then(|| measured.iter().sum::<u64>() as f64 / measured.len() as f64);

    ExecutionReport {
        language: language.to_string(),
        status: classifier::overall_status(&results),
        all_passed: passed_count == total_count,
        passed_count,
        total_count,
        results,
        average_runtime_ms,
        average_memory_kb,
        time_limit_ms: limits.time.as_millis() as u64,
        memory_limit_mb: limits.memory_mb,
        started_at,
        finished_at: Utc::now(),
    }
}
