/// Docker-backed sandbox
///
/// **Isolation per attempt (one fresh container each time):**
/// - No network (`network_mode: none`)
/// - Single CPU (`nano_cpus = 1e9`)
/// - Memory ceiling with swap pinned to the same value
/// - PID ceiling against fork bombs
/// - Fixed non-root uid:gid, `no-new-privileges`, every capability dropped
/// - Read-only root filesystem; the workspace bind mount at `/sandbox` is the
///   only writable host path, plus a small `noexec` tmpfs on `/tmp`
///
/// **Two-layer timeout:**
/// The entrypoint runs under `timeout <N>s` inside the container. The caller
/// additionally waits at most `N + buffer` seconds and kills the container if
/// the inner layer failed to stop it.

use super::{
    append_marker, truncate_output, RawOutput, Sandbox, SandboxSpec, OOM_MARKER, TIMEOUT_MARKER,
};
use crate::error::SandboxError;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, StatsOptions,
    WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, ResourcesUlimits};
use bollard::Docker;
use futures_util::stream::StreamExt;
use judgebox_common::SandboxConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Mount point of the workspace inside the container
pub const SANDBOX_WORKDIR: &str = "/sandbox";

/// Exit status of coreutils `timeout` when the limit fired
const TIMEOUT_EXIT_CODE: i64 = 124;
/// 128 + SIGKILL: OOM killer, or `timeout -k` escalating
const SIGKILL_EXIT_CODE: i64 = 137;
const NANO_CPUS_SINGLE_CORE: i64 = 1_000_000_000;
const TMPFS_OPTIONS: &str = "rw,noexec,nosuid,size=64m";

/// Container cleanup guard - guarantees container removal on drop
///
/// The happy path calls `remove()`; drop only covers early returns,
/// panics and cancellation of the surrounding future.
struct ContainerGuard {
    docker: Docker,
    container_id: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(docker: Docker, container_id: String) -> Self {
        Self {
            docker,
            container_id,
            armed: true,
        }
    }

    async fn remove(mut self) {
        self.armed = false;
        remove_container(&self.docker, &self.container_id).await;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let docker = self.docker.clone();
        let container_id = self.container_id.clone();

        // Cannot be async in Drop; hand off to the runtime if there is one
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    remove_container(&docker, &container_id).await;
                });
            }
            Err(_) => warn!(
                container = %container_id,
                "No runtime available to remove container"
            ),
        }
    }
}

async fn remove_container(docker: &Docker, container_id: &str) {
    let options = RemoveContainerOptions {
        force: true,
        ..Default::default()
    };
    match docker.remove_container(container_id, Some(options)).await {
        Ok(()) => debug!(container = %container_id, "Container removed"),
        Err(e) => warn!(container = %container_id, error = %e, "Failed to remove container"),
    }
}

pub struct DockerSandbox {
    docker: Docker,
    config: SandboxConfig,
}

impl DockerSandbox {
    pub fn connect(config: SandboxConfig) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::Connect(e.to_string()))?;
        Ok(Self { docker, config })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Pull the sandbox image unless it is already cached locally
    pub async fn ensure_image(&self) -> Result<(), SandboxError> {
        let image = self.config.image.as_str();

        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = %image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %image, "Image cache miss, pulling");

        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });
        let mut stream = self.docker.create_image(options, None, None);
        while let Some(progress) = stream.next().await {
            progress.map_err(|e| SandboxError::Image {
                image: image.to_string(),
                message: e.to_string(),
            })?;
        }

        info!(image = %image, "Image pulled");
        Ok(())
    }

    /// Block until the container stops; `None` when the daemon gave no status
    async fn wait_exit(&self, container_id: &str) -> Result<Option<i64>, SandboxError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.docker.wait_container(container_id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(Some(response.status_code)),
            // bollard surfaces non-zero exits as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                Ok(Some(code))
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    async fn was_oom_killed(&self, container_id: &str) -> bool {
        match self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => inspect
                .state
                .and_then(|state| state.oom_killed)
                .unwrap_or(false),
            Err(e) => {
                warn!(container = %container_id, error = %e, "Failed to inspect container");
                false
            }
        }
    }

    /// Collect stdout/stderr, each capped at `max_output_bytes`
    async fn collect_logs(&self, container_id: &str) -> (String, String) {
        let options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        });
        let limit = self.config.max_output_bytes;
        // One byte over the cap is enough to know truncation happened
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let mut logs = self.docker.logs(container_id, options);
        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) => extend_capped(&mut stdout, &message, limit),
                Ok(LogOutput::StdErr { message }) => extend_capped(&mut stderr, &message, limit),
                Ok(_) => {}
                Err(e) => {
                    warn!(container = %container_id, error = %e, "Error reading container logs");
                    break;
                }
            }
        }

        (
            truncate_output(&stdout, limit),
            truncate_output(&stderr, limit),
        )
    }
}

fn container_config(
    config: &SandboxConfig,
    spec: &SandboxSpec<'_>,
    host_dir: &str,
) -> Config<String> {
    let profile = spec.profile;
    let entrypoint = format!(
        "{}/{}",
        config.entrypoint_dir.trim_end_matches('/'),
        profile.entrypoint()
    );
    let stem = spec
        .source_file
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(spec.source_file);

    let mut env = vec![
        format!("LANGUAGE={}", profile.name),
        format!("SOURCE_FILE={}", spec.source_file),
        format!("SOURCE_STEM={}", stem),
        format!("INPUT_FILE={}", crate::workspace::INPUT_FILE),
        format!("RUN_CMD={}", profile.run_command(spec.source_file)),
    ];
    if let Some(compile) = profile.compile_command(spec.source_file) {
        env.push(format!("COMPILE_CMD={}", compile));
    }

    let memory_bytes = (spec.memory_limit_mb as i64) * 1024 * 1024;
    let file_size_bytes = (config.max_file_size_mb as i64) * 1024 * 1024;

    Config {
        image: Some(config.image.clone()),
        cmd: Some(vec![
            "timeout".to_string(),
            "-k".to_string(),
            "1s".to_string(),
            format!("{}s", spec.time_limit.as_secs_f64()),
            entrypoint,
        ]),
        env: Some(env),
        user: Some(config.user.clone()),
        working_dir: Some(SANDBOX_WORKDIR.to_string()),
        network_disabled: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        host_config: Some(HostConfig {
            binds: Some(vec![format!("{}:{}:rw", host_dir, SANDBOX_WORKDIR)]),
            network_mode: Some("none".to_string()),
            nano_cpus: Some(NANO_CPUS_SINGLE_CORE),
            memory: Some(memory_bytes),
            memory_swap: Some(memory_bytes),
            pids_limit: Some(config.pids_limit),
            // The bind mount has no quota; cap each file the program writes
            ulimits: Some(vec![ResourcesUlimits {
                name: Some("fsize".to_string()),
                soft: Some(file_size_bytes),
                hard: Some(file_size_bytes),
            }]),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            readonly_rootfs: Some(true),
            tmpfs: Some(HashMap::from([(
                "/tmp".to_string(),
                TMPFS_OPTIONS.to_string(),
            )])),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Runtime signals that end a run early; both false for a normal exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Termination {
    timed_out: bool,
    oom_killed: bool,
}

/// Timeout wins over memory. Exit 137 is SIGKILL from either `timeout -k`
/// (only once the limit has passed) or the cgroup OOM killer.
fn termination(
    exit_code: Option<i64>,
    oom_flagged: bool,
    outer_timed_out: bool,
    elapsed: Duration,
    limit: Duration,
) -> Termination {
    let sigkilled = exit_code == Some(SIGKILL_EXIT_CODE);
    let timed_out = outer_timed_out
        || exit_code == Some(TIMEOUT_EXIT_CODE)
        || (sigkilled && !oom_flagged && elapsed >= limit);
    let oom_killed = !timed_out && (oom_flagged || sigkilled);

    Termination {
        timed_out,
        oom_killed,
    }
}

fn extend_capped(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize) {
    let room = (limit + 1).saturating_sub(buffer.len());
    buffer.extend_from_slice(&chunk[..chunk.len().min(room)]);
}

/// Sample memory usage until aborted, keeping the peak in bytes
fn spawn_memory_sampler(
    docker: Docker,
    container_id: String,
    peak: Arc<AtomicU64>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let options = Some(StatsOptions {
            stream: true,
            one_shot: false,
        });
        let mut stats = docker.stats(&container_id, options);
        while let Some(Ok(sample)) = stats.next().await {
            let memory = &sample.memory_stats;
            // cgroup v1 reports max_usage; v2 only has the instantaneous value
            if let Some(bytes) = memory.max_usage.or(memory.usage) {
                peak.fetch_max(bytes, Ordering::Relaxed);
            }
        }
    })
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn run(&self, spec: &SandboxSpec<'_>) -> Result<RawOutput, SandboxError> {
        let host_dir = tokio::fs::canonicalize(spec.workspace)
            .await
            .map_err(|e| SandboxError::Create(format!("cannot resolve workspace: {}", e)))?;
        let host_dir = host_dir.display().to_string();

        let container_name = format!("judgebox-{}", uuid::Uuid::new_v4().simple());
        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), container_config(&self.config, spec, &host_dir))
            .await
            .map_err(|e| SandboxError::Create(e.to_string()))?;

        let container_id = container.id;
        // Set up cleanup immediately; everything below may bail out early
        let guard = ContainerGuard::new(self.docker.clone(), container_id.clone());

        let start_time = Instant::now();

        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SandboxError::Start(e.to_string()))?;

        let peak_bytes = Arc::new(AtomicU64::new(0));
        let sampler =
            spawn_memory_sampler(self.docker.clone(), container_id.clone(), peak_bytes.clone());

        let outer_limit = spec.time_limit + Duration::from_secs(self.config.timeout_buffer_secs);
        let waited = tokio::time::timeout(outer_limit, self.wait_exit(&container_id)).await;

        let (exit_code, outer_timed_out) = match waited {
            Ok(Ok(code)) => (code, false),
            Ok(Err(e)) => {
                sampler.abort();
                return Err(e);
            }
            Err(_) => {
                warn!(
                    container = %container_id,
                    outer_limit_ms = outer_limit.as_millis() as u64,
                    "Inner timeout did not stop the sandbox, killing container"
                );
                if let Err(e) = self
                    .docker
                    .kill_container(&container_id, None::<KillContainerOptions<String>>)
                    .await
                {
                    warn!(container = %container_id, error = %e, "Failed to kill container");
                }
                (None, true)
            }
        };

        let elapsed = start_time.elapsed();
        sampler.abort();

        let oom_flagged = !outer_timed_out && self.was_oom_killed(&container_id).await;
        let (stdout, mut stderr) = self.collect_logs(&container_id).await;

        let Termination {
            timed_out,
            oom_killed,
        } = termination(
            exit_code,
            oom_flagged,
            outer_timed_out,
            elapsed,
            spec.time_limit,
        );

        if timed_out {
            append_marker(&mut stderr, TIMEOUT_MARKER);
        } else if oom_killed {
            append_marker(&mut stderr, OOM_MARKER);
        }

        let peak = peak_bytes.load(Ordering::Relaxed);
        let peak_memory_kb = (peak > 0).then_some(peak / 1024);

        debug!(
            container = %container_id,
            exit_code = ?exit_code,
            timed_out,
            oom_killed,
            elapsed_ms = elapsed.as_millis() as u64,
            peak_memory_kb = ?peak_memory_kb,
            "Sandbox finished"
        );

        guard.remove().await;

        Ok(RawOutput {
            stdout,
            stderr,
            exit_code,
            timed_out,
            oom_killed,
            elapsed_ms: elapsed.as_millis() as u64,
            peak_memory_kb,
        })
    }
}
