// CLI commands for running submissions locally
use anyhow::{bail, Context, Result};
use judgebox_common::{ExecutionRequest, SandboxConfig, TestCase};
use judgebox_engine::{DockerSandbox, Executor, LanguageRegistry};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub fn load_registry(path: Option<&Path>) -> Result<LanguageRegistry> {
    match path {
        Some(path) => LanguageRegistry::load(path)
            .with_context(|| format!("Failed to load language table {}", path.display())),
        None => Ok(LanguageRegistry::builtin()),
    }
}

fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read test cases {}", path.display()))?;
    let cases: Vec<TestCase> =
        serde_json::from_str(&content).context("Failed to parse test cases")?;
    if cases.is_empty() {
        bail!("{} contains no test cases", path.display());
    }
    Ok(cases)
}

/// Execute one submission and print the report as JSON.
/// Returns whether every test case passed.
pub async fn run(
    registry: LanguageRegistry,
    language: &str,
    source: &Path,
    tests: &Path,
    time_limit_secs: Option<u64>,
    memory_limit_mb: Option<u64>,
) -> Result<bool> {
    let source_code = fs::read_to_string(source)
        .with_context(|| format!("Failed to read source {}", source.display()))?;
    let test_cases = load_test_cases(tests)?;

    let config = SandboxConfig::from_env();
    let sandbox = DockerSandbox::connect(config.clone()).context("Docker is not reachable")?;
    sandbox
        .ensure_image()
        .await
        .context("Sandbox image is not available")?;

    let executor = Executor::new(registry, Arc::new(sandbox), config);
    let request = ExecutionRequest {
        source_code,
        language: language.to_string(),
        test_cases,
        time_limit_secs,
        memory_limit_mb,
    };

    let report = executor.execute(&request).await?;
    info!(
        status = %report.status,
        passed = report.passed_count,
        total = report.total_count,
        "Run finished"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.all_passed)
}

pub fn list_languages(registry: &LanguageRegistry) {
    println!(
        "{:<12} {:<24} {:<6} {:<8} {:<10}",
        "NAME", "ALIASES", "EXT", "COMPILE", "TIMEOUT"
    );
    println!("{}", "─".repeat(64));

    for name in registry.languages() {
        let Ok(profile) = registry.profile_for(&name) else {
            continue;
        };
        println!(
            "{:<12} {:<24} {:<6} {:<8} {}s",
            profile.name,
            profile.aliases.join(","),
            profile.extension,
            if profile.requires_compilation() { "yes" } else { "no" },
            profile.timeout_secs,
        );
    }
}

pub async fn pull_image() -> Result<()> {
    let config = SandboxConfig::from_env();
    let sandbox = DockerSandbox::connect(config).context("Docker is not reachable")?;
    sandbox.ensure_image().await?;
    println!("✅ Image {} is ready", sandbox.config().image);
    Ok(())
}
