//! Response coordination: submit a message, poll the run to a terminal
//! state, and extract the reply.
//!
//! The assistant run is an asynchronous job with no push channel, so the
//! coordinator polls at a fixed short interval while the run is live and
//! wraps the whole submit+poll sequence in a bounded retry with
//! exponential backoff for transient failures.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::assistant::backend::{AssistantBackend, BackendError, MessageRole, RunStatus};

/// Tuning knobs for one exchange.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum submit+poll attempts before the last error propagates.
    pub max_retries: u32,
    /// Per-attempt wall-clock budget. Each retry restarts the submit+poll
    /// sequence and with it the timeout window, so total wait across
    /// retries can exceed this value.
    pub timeout: Duration,
    /// Sleep between status polls while the run is live.
    pub poll_interval: Duration,
    /// Base unit for the exponential backoff between retry attempts
    /// (`backoff_base * 2^attempt`).
    pub backoff_base: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Errors from one assistant exchange.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("assistant run {status}{}", format_detail(.detail))]
    RunFailed {
        status: RunStatus,
        detail: Option<String>,
    },

    #[error("assistant response timed out after {} seconds", budget.as_secs())]
    Timeout { budget: Duration },

    #[error("{0}")]
    NoResponse(String),
}

fn format_detail(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(": {detail}"),
        None => String::new(),
    }
}

/// Drives (thread_id, message) -> reply text against an assistant backend.
pub struct ResponseCoordinator {
    backend: Arc<dyn AssistantBackend>,
    config: CoordinatorConfig,
}

impl ResponseCoordinator {
    pub fn new(backend: Arc<dyn AssistantBackend>, config: CoordinatorConfig) -> Self {
        Self { backend, config }
    }

    /// Submit a user message to the thread and wait for the assistant's
    /// reply.
    ///
    /// The submit+poll sequence is retried up to `max_retries` times with
    /// exponential backoff; the final attempt's error propagates.
    pub async fn respond(&self, thread_id: &str, text: &str) -> Result<String, CoordinatorError> {
        let mut attempt: u32 = 0;
        loop {
            match self.submit_and_poll(thread_id, text).await {
                Ok(reply) => return Ok(reply),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.config.max_retries {
                        return Err(err);
                    }
                    let backoff = self
                        .config
                        .backoff_base
                        .saturating_mul(1u32 << attempt.min(16));
                    warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "exchange attempt failed, retrying: {err}"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// One attempt: append the message, start a run, poll it to a terminal
    /// state within the timeout window, and extract the reply text.
    async fn submit_and_poll(
        &self,
        thread_id: &str,
        text: &str,
    ) -> Result<String, CoordinatorError> {
        self.backend.add_message(thread_id, text).await?;
        let run_id = self.backend.start_run(thread_id).await?;
        debug!(thread_id, run_id, "run started");

        let started = Instant::now();
        loop {
            if started.elapsed() > self.config.timeout {
                return Err(CoordinatorError::Timeout {
                    budget: self.config.timeout,
                });
            }

            let run = self.backend.run_status(thread_id, &run_id).await?;
            debug!(thread_id, run_id, status = %run.status, "run polled");

            match run.status {
                RunStatus::Completed => return self.extract_reply(thread_id).await,

                RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired => {
                    return Err(CoordinatorError::RunFailed {
                        status: run.status,
                        detail: run.error_detail(),
                    });
                }

                RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling => {
                    tokio::time::sleep(self.config.poll_interval).await;
                }

                RunStatus::Unknown => {
                    warn!(thread_id, run_id, "unknown run status, retrying poll");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    /// Fetch the thread's messages and return the newest assistant reply's
    /// first text payload.
    async fn extract_reply(&self, thread_id: &str) -> Result<String, CoordinatorError> {
        let messages = self.backend.list_messages(thread_id).await?;

        if messages.is_empty() {
            return Err(CoordinatorError::NoResponse(
                "no response received from assistant".to_string(),
            ));
        }

        // Messages arrive newest first; the first assistant entry wins.
        messages
            .iter()
            .filter(|message| message.role == MessageRole::Assistant)
            .find_map(|message| message.first_text())
            .map(|text| text.to_string())
            .ok_or_else(|| {
                CoordinatorError::NoResponse("no valid response content found".to_string())
            })
    }
}
