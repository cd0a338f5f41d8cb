//! Eval subprocess execution under an admission gate and a timeout.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::command::EvalCommand;
use super::error::{DispatchError, DispatchResult};
use crate::config::EvalConfig;
use crate::metrics::DispatchMetrics;

/// Exit code reported when an eval was killed for exceeding its time limit.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Stderr placed in the synthetic timeout result.
pub const TIMEOUT_MARKER: &str = "Timed out (EVAL_TIMEOUT_S)";

/// Captured result of one eval subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code (0 = success, -1 = killed by a signal, 124 = timed out).
    pub exit_code: i32,

    /// Captured stdout, lossily decoded.
    pub stdout: String,

    /// Captured stderr, lossily decoded.
    pub stderr: String,

    /// Set only for the synthetic result produced by the timeout.
    pub timed_out: bool,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    fn timeout(duration_ms: u64) -> Self {
        Self {
            exit_code: TIMEOUT_EXIT_CODE,
            stdout: String::new(),
            stderr: TIMEOUT_MARKER.to_string(),
            timed_out: true,
            duration_ms,
        }
    }
}

/// Runs eval subprocesses, at most `max_concurrency` at a time.
///
/// The gate is held for the whole child lifetime, so the cap bounds live
/// processes rather than queued requests.
pub struct EvalDispatcher {
    config: EvalConfig,
    gate: Arc<Semaphore>,
    metrics: DispatchMetrics,
}

impl EvalDispatcher {
    pub fn new(config: EvalConfig) -> Self {
        let permits = config.max_concurrency.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            config,
            gate: Arc::new(Semaphore::new(permits)),
            metrics: DispatchMetrics::new(),
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    /// Free slots in the admission gate right now.
    pub fn available_slots(&self) -> usize {
        self.gate.available_permits()
    }

    /// Run the configured eval against `policy_path`.
    ///
    /// Waits for a free slot, then spawns the child and captures its output
    /// until it exits or the timeout kills it.
    pub async fn run(&self, policy_path: &Path) -> DispatchResult<ProcessOutput> {
        let command = EvalCommand::build(&self.config, policy_path);

        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| DispatchError::GateClosed)?;

        info!(command = %command, "Launching eval");
        let output = self.execute(&command).await?;

        if output.timed_out {
            self.metrics.record_timeout();
        } else if output.exit_code == 0 {
            self.metrics.record_success();
        } else {
            self.metrics.record_failure();
        }
        Ok(output)
    }

    async fn execute(&self, command: &EvalCommand) -> DispatchResult<ProcessOutput> {
        let start = Instant::now();

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DispatchError::Spawn {
                program: command.program.clone(),
                source,
            })?;
        let _active = self.metrics.track_active();

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let limit = self.config.timeout;
        let collected = tokio::time::timeout(limit, async {
            let (status, out, err) = tokio::join!(
                child.wait(),
                read_all(stdout_pipe.as_mut()),
                read_all(stderr_pipe.as_mut()),
            );
            Ok::<_, std::io::Error>((status?, out?, err?))
        })
        .await;

        let duration_ms = start.elapsed().as_millis() as u64;

        match collected {
            Ok(Ok((status, out, err))) => Ok(ProcessOutput {
                exit_code: status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&out).into_owned(),
                stderr: String::from_utf8_lossy(&err).into_owned(),
                timed_out: false,
                duration_ms,
            }),
            Ok(Err(source)) => {
                reap(&mut child).await;
                Err(DispatchError::Wait {
                    program: command.program.clone(),
                    source,
                })
            }
            Err(_elapsed) => {
                warn!(
                    program = %command.program,
                    timeout_secs = limit.as_secs_f64(),
                    "Eval exceeded time limit; killing child"
                );
                reap(&mut child).await;
                Ok(ProcessOutput::timeout(duration_ms))
            }
        }
    }
}

async fn read_all<R>(pipe: Option<&mut R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Kill the child and wait until the OS has released it.
async fn reap(child: &mut tokio::process::Child) {
    if let Err(e) = child.kill().await {
        warn!(error = %e, "failed to kill eval child");
    }
}
