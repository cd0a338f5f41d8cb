//! Upload command coordination.
//!
//! One `!policy` command walks through
//! `Received → Validating → Saving → {Failed | Saved}` synchronously and is
//! acknowledged right away. A saved policy then continues in a detached job:
//! `Dispatching → Running → {Linked | NoLink | Failed | TimedOut} → Reported`.
//! Every terminal state produces exactly one reply through the [`ReplySink`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn, Instrument};

use crate::dispatch::{EvalDispatcher, ProcessOutput};
use crate::obs;
use crate::resolve::{resolve_link, ResolvedLink};
use crate::store::{PolicyStore, StoreError, StoredPolicy, Upload};

/// Maximum characters of stdout / stderr quoted back in a failure reply.
pub const EXCERPT_CHARS: usize = 1500;

pub const NO_ATTACHMENT_REPLY: &str = "❌ Please attach a file with the `!policy` command.";
pub const TOO_MANY_ATTACHMENTS_REPLY: &str = "❌ Please attach only **one** file at a time.";
pub const NAME_EXHAUSTION_REPLY: &str = "❌ Could not generate a unique name. Try again.";
pub const SAVE_FAILED_REPLY: &str = "❌ An internal error occurred while saving the file.";
pub const NO_LINK_REPLY: &str =
    "ℹ️ Eval completed, but Notion link was not detected in output. Check server logs.";
pub const EVAL_FAULT_REPLY: &str = "❌ Eval failed. Check server logs.";
pub const GENERIC_FAULT_REPLY: &str = "⚠️ Something went wrong while processing your request.";

/// Where replies for one command go (the originating conversation).
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn reply(&self, text: &str) -> anyhow::Result<()>;
}

/// Workflow phases, used to tag log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Received,
    Validating,
    Saving,
    Saved,
    Failed,
    Dispatching,
    Running,
    Reported,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Received => "received",
            Phase::Validating => "validating",
            Phase::Saving => "saving",
            Phase::Saved => "saved",
            Phase::Failed => "failed",
            Phase::Dispatching => "dispatching",
            Phase::Running => "running",
            Phase::Reported => "reported",
        }
    }
}

fn enter(phase: Phase) {
    debug!(phase = phase.as_str(), "workflow phase");
}

/// Result of the synchronous intake half.
#[derive(Debug)]
pub enum IntakeOutcome {
    NoAttachment,
    TooManyAttachments(usize),
    Rejected(StoreError),
    Saved(StoredPolicy),
}

impl IntakeOutcome {
    pub fn reply_text(&self) -> String {
        match self {
            IntakeOutcome::NoAttachment => NO_ATTACHMENT_REPLY.to_string(),
            IntakeOutcome::TooManyAttachments(_) => TOO_MANY_ATTACHMENTS_REPLY.to_string(),
            IntakeOutcome::Rejected(err @ StoreError::InvalidFileType { .. }) => {
                format!("❌ {err}.")
            }
            IntakeOutcome::Rejected(StoreError::NameExhaustion { .. }) => {
                NAME_EXHAUSTION_REPLY.to_string()
            }
            IntakeOutcome::Rejected(_) => SAVE_FAILED_REPLY.to_string(),
            IntakeOutcome::Saved(policy) => format!(
                "✅ Your policy has been added to the queue. Its nickname is `{}`",
                policy.nickname
            ),
        }
    }
}

/// Terminal state of the background eval job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalOutcome {
    /// The stored file vanished before the job started.
    MissingFile { nickname: String, path: PathBuf },
    Linked(ResolvedLink),
    NoLink,
    Failed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    TimedOut {
        timeout: Duration,
        stdout: String,
        stderr: String,
    },
}

impl EvalOutcome {
    /// Classify a finished run. `link` is only consulted for exit code 0.
    pub fn from_run(output: &ProcessOutput, link: Option<ResolvedLink>, timeout: Duration) -> Self {
        if output.timed_out {
            return EvalOutcome::TimedOut {
                timeout,
                stdout: output.stdout.clone(),
                stderr: output.stderr.clone(),
            };
        }
        if output.exit_code != 0 {
            return EvalOutcome::Failed {
                exit_code: output.exit_code,
                stdout: output.stdout.clone(),
                stderr: output.stderr.clone(),
            };
        }
        match link {
            Some(link) => EvalOutcome::Linked(link),
            None => EvalOutcome::NoLink,
        }
    }

    pub fn reply_text(&self) -> String {
        match self {
            EvalOutcome::MissingFile { nickname, path } => format!(
                "⚠️ Could not find saved file for `{}` at `{}`",
                nickname,
                path.display()
            ),
            EvalOutcome::Linked(link) => format!("📄 Notion log: {}", link.url),
            EvalOutcome::NoLink => NO_LINK_REPLY.to_string(),
            EvalOutcome::Failed {
                exit_code,
                stdout,
                stderr,
            } => format!(
                "❌ Eval failed (rc={exit_code}).{}",
                output_block(stdout, stderr)
            ),
            EvalOutcome::TimedOut {
                timeout,
                stdout,
                stderr,
            } => format!(
                "⏱️ Eval timed out after {}s (rc={}).{}",
                timeout.as_secs_f64(),
                crate::dispatch::TIMEOUT_EXIT_CODE,
                output_block(stdout, stderr)
            ),
        }
    }
}

fn output_block(stdout: &str, stderr: &str) -> String {
    format!(
        "\nstdout:\n```{}```\nstderr:\n```{}```",
        excerpt(stdout),
        excerpt(stderr)
    )
}

/// Trimmed text cut to [`EXCERPT_CHARS`] characters.
pub fn excerpt(text: &str) -> String {
    text.trim().chars().take(EXCERPT_CHARS).collect()
}

/// Ties the store and the dispatcher together for each upload command.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<PolicyStore>,
    dispatcher: Arc<EvalDispatcher>,
}

impl Coordinator {
    pub fn new(store: Arc<PolicyStore>, dispatcher: Arc<EvalDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    pub fn store(&self) -> &PolicyStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &EvalDispatcher {
        &self.dispatcher
    }

    /// Handle one upload command end to end.
    ///
    /// Replies with the intake result immediately and, if the policy was
    /// saved, returns the handle of the detached eval job. Never fails: any
    /// unexpected error is logged and turned into a generic apology.
    pub async fn handle_upload(
        &self,
        uploads: Vec<Box<dyn Upload>>,
        sink: Arc<dyn ReplySink>,
    ) -> Option<JoinHandle<()>> {
        match self.try_handle_upload(uploads, Arc::clone(&sink)).await {
            Ok(job) => job,
            Err(e) => {
                obs::emit_fault("intake", &format!("{e:#}"));
                if let Err(e) = sink.reply(GENERIC_FAULT_REPLY).await {
                    error!(error = %e, "failed to deliver fault reply");
                }
                None
            }
        }
    }

    async fn try_handle_upload(
        &self,
        mut uploads: Vec<Box<dyn Upload>>,
        sink: Arc<dyn ReplySink>,
    ) -> anyhow::Result<Option<JoinHandle<()>>> {
        enter(Phase::Received);
        let outcome = self.intake(&mut uploads).await;

        sink.reply(&outcome.reply_text())
            .await
            .context("sending intake reply")?;

        match outcome {
            IntakeOutcome::Saved(policy) => Ok(Some(self.spawn_eval(policy, sink))),
            _ => Ok(None),
        }
    }

    /// Validate the attachment list and save the single upload.
    pub async fn intake(&self, uploads: &mut [Box<dyn Upload>]) -> IntakeOutcome {
        enter(Phase::Validating);
        let upload = match uploads {
            [] => return IntakeOutcome::NoAttachment,
            [single] => single,
            many => return IntakeOutcome::TooManyAttachments(many.len()),
        };

        enter(Phase::Saving);
        match self.store.save(&mut **upload).await {
            Ok(policy) => {
                enter(Phase::Saved);
                obs::emit_policy_saved(&policy.nickname, policy.bytes, upload.filename());
                IntakeOutcome::Saved(policy)
            }
            Err(e) => {
                enter(Phase::Failed);
                match &e {
                    StoreError::InvalidFileType { .. } => {
                        debug!(filename = upload.filename(), "rejected upload type")
                    }
                    other => error!(error = %other, "Failed to save policy"),
                }
                IntakeOutcome::Rejected(e)
            }
        }
    }

    /// Run the eval for `policy` in a detached, supervised task.
    ///
    /// Errors and panics inside the job are reported to `sink` as
    /// [`EVAL_FAULT_REPLY`] and never reach the caller.
    pub fn spawn_eval(&self, policy: StoredPolicy, sink: Arc<dyn ReplySink>) -> JoinHandle<()> {
        let this = self.clone();
        let span = obs::eval_span(&policy.nickname);
        let job_sink = Arc::clone(&sink);

        tokio::spawn(async move {
            let job = tokio::spawn(
                async move { this.run_eval(&policy, job_sink.as_ref()).await }.instrument(span),
            );

            let fault = match job.await {
                Ok(Ok(_)) => return,
                Ok(Err(e)) => format!("{e:#}"),
                Err(e) => e.to_string(),
            };
            obs::emit_fault("eval", &fault);
            if let Err(e) = sink.reply(EVAL_FAULT_REPLY).await {
                error!(error = %e, "failed to deliver eval fault reply");
            }
        })
    }

    /// The body of the eval job. Sends the start notice and the final reply.
    pub async fn run_eval(
        &self,
        policy: &StoredPolicy,
        sink: &dyn ReplySink,
    ) -> anyhow::Result<EvalOutcome> {
        let config = self.dispatcher.config();

        let exists = tokio::fs::try_exists(&policy.path).await.unwrap_or(false);
        if !exists {
            warn!(path = %policy.path.display(), "saved policy disappeared before eval");
            let outcome = EvalOutcome::MissingFile {
                nickname: policy.nickname.clone(),
                path: policy.path.clone(),
            };
            sink.reply(&outcome.reply_text()).await?;
            return Ok(outcome);
        }

        enter(Phase::Dispatching);
        sink.reply(&format!(
            "▶️ Running eval with motion `{}` on robot `{}` for `{}`…",
            config.eval_name, config.robot, policy.nickname
        ))
        .await
        .context("sending start notice")?;

        obs::emit_eval_started(&policy.nickname, &config.robot, &config.eval_name);
        enter(Phase::Running);
        let output = self
            .dispatcher
            .run(&policy.path)
            .await
            .with_context(|| format!("running eval for {}", policy.nickname))?;
        obs::emit_eval_finished(
            &policy.nickname,
            output.exit_code,
            output.duration_ms,
            output.timed_out,
        );
        self.dispatcher.metrics().flush();

        let link = if output.success() {
            let out_dir = config.out_dir.clone();
            let eval_name = config.eval_name.clone();
            let policy_path = policy.path.clone();
            let (stdout, stderr) = (output.stdout.clone(), output.stderr.clone());
            tokio::task::spawn_blocking(move || {
                resolve_link(&out_dir, &eval_name, &policy_path, &stdout, &stderr)
            })
            .await
            .context("resolving result link")?
        } else {
            None
        };
        if let Some(link) = &link {
            obs::emit_link_resolved(&policy.nickname, &link.url, link.source.as_str());
        }

        let outcome = EvalOutcome::from_run(&output, link, config.timeout);
        sink.reply(&outcome.reply_text())
            .await
            .context("sending eval result")?;
        enter(Phase::Reported);
        Ok(outcome)
    }
}
