//! End-to-end relay tests over a scripted assistant backend.
//!
//! Drives [`MessageHandler`] the same way the receive loop does and checks
//! what reaches the outbound channel, with thread state persisted through a
//! real SQLite store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use relaybot::assistant::backend::{
    AssistantBackend, BackendError, RunError, RunState, RunStatus, ThreadMessage,
};
use relaybot::assistant::coordinator::{CoordinatorConfig, ResponseCoordinator};
use relaybot::channels::telegram::ChannelError;
use relaybot::channels::telegram_inbound::TelegramInbound;
use relaybot::relay::{MessageHandler, OutboundChannel};
use relaybot::threads::store::open_store;
use relaybot::threads::ThreadRegistry;

/// Assistant backend driven by a script of run statuses. Each poll pops the
/// next status; the last one repeats. Replies come from `answer`.
#[derive(Default)]
struct ScriptedBackend {
    statuses: Mutex<Vec<RunStatus>>,
    answer: Mutex<Option<String>>,
    last_error: Mutex<Option<RunError>>,
    threads_created: Mutex<u32>,
    submit_calls: Mutex<u32>,
}

impl ScriptedBackend {
    fn completing_with(answer: &str) -> Self {
        let backend = Self::default();
        *backend.statuses.lock() = vec![RunStatus::Completed];
        *backend.answer.lock() = Some(answer.to_string());
        backend
    }

    fn script(&self, statuses: Vec<RunStatus>) {
        *self.statuses.lock() = statuses;
    }
}

#[async_trait]
impl AssistantBackend for ScriptedBackend {
    async fn create_thread(&self) -> Result<String, BackendError> {
        let mut created = self.threads_created.lock();
        *created += 1;
        Ok(format!("thread_{created}"))
    }

    async fn add_message(&self, _: &str, _: &str) -> Result<(), BackendError> {
        *self.submit_calls.lock() += 1;
        Ok(())
    }

    async fn start_run(&self, _: &str) -> Result<String, BackendError> {
        Ok("run_1".to_string())
    }

    async fn run_status(&self, _: &str, run_id: &str) -> Result<RunState, BackendError> {
        let mut statuses = self.statuses.lock();
        let status = if statuses.len() > 1 {
            statuses.remove(0)
        } else {
            statuses.first().copied().unwrap_or(RunStatus::Completed)
        };
        Ok(RunState {
            id: run_id.to_string(),
            status,
            last_error: self.last_error.lock().clone(),
        })
    }

    async fn list_messages(&self, _: &str) -> Result<Vec<ThreadMessage>, BackendError> {
        Ok(self
            .answer
            .lock()
            .as_ref()
            .map(|text| vec![ThreadMessage::assistant_text("msg_1", text)])
            .unwrap_or_default())
    }
}

/// Captures outbound traffic instead of delivering it.
#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl OutboundChannel for RecordingChannel {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        self.sent.lock().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn send_chat_action(&self, _: i64) -> Result<(), ChannelError> {
        Ok(())
    }
}

struct Harness {
    backend: Arc<ScriptedBackend>,
    channel: Arc<RecordingChannel>,
    handler: MessageHandler,
    _dir: TempDir,
}

impl Harness {
    fn new(backend: ScriptedBackend) -> Self {
        Self::with_config(backend, fast_config())
    }

    fn with_config(backend: ScriptedBackend, config: CoordinatorConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(backend);
        let store = open_store(&dir.path().join("threads.db"), dir.path());
        assert_eq!(store.backend_name(), "sqlite");

        let registry = Arc::new(ThreadRegistry::new(backend.clone(), store));
        let coordinator = ResponseCoordinator::new(backend.clone(), config);
        let channel = Arc::new(RecordingChannel::default());
        let handler = MessageHandler::new(registry, coordinator, channel.clone(), Vec::new());

        Self {
            backend,
            channel,
            handler,
            _dir: dir,
        }
    }

    async fn send(&self, user_id: i64, text: &str) {
        let inbound = TelegramInbound {
            sender_id: user_id,
            sender_name: format!("user{user_id}"),
            chat_id: user_id,
            text: text.to_string(),
        };
        self.handler.handle(&inbound).await;
    }

    fn replies(&self) -> Vec<String> {
        self.channel
            .sent
            .lock()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        max_retries: 3,
        timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(1),
        backoff_base: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn test_completed_run_reaches_user() {
    let h = Harness::new(ScriptedBackend::completing_with("42"));
    h.send(10, "what is the answer?").await;
    assert_eq!(h.replies(), vec!["42"]);
}

#[tokio::test]
async fn test_thread_reused_across_messages() {
    let h = Harness::new(ScriptedBackend::completing_with("ok"));
    h.send(10, "first").await;
    h.send(10, "second").await;
    h.send(10, "third").await;
    assert_eq!(*h.backend.threads_created.lock(), 1);
}

#[tokio::test]
async fn test_reset_starts_new_thread() {
    let h = Harness::new(ScriptedBackend::completing_with("ok"));
    h.send(10, "hello").await;
    h.send(10, "/reset").await;
    h.send(10, "hello again").await;

    assert_eq!(*h.backend.threads_created.lock(), 2);
    assert!(h.replies()[1].contains("has been reset"));
}

#[tokio::test]
async fn test_stats_counts_users() {
    let h = Harness::new(ScriptedBackend::completing_with("ok"));
    for user_id in 1..=3 {
        h.send(user_id, "hi").await;
    }
    h.send(1, "/stats").await;

    let replies = h.replies();
    let stats_reply = replies.last().unwrap();
    assert!(stats_reply.contains("Active conversations: 3"));
    assert!(stats_reply.contains("Total threads: 3"));
}

#[tokio::test]
async fn test_run_through_live_states_then_completion() {
    let backend = ScriptedBackend::completing_with("done");
    backend.script(vec![
        RunStatus::Queued,
        RunStatus::InProgress,
        RunStatus::InProgress,
        RunStatus::Completed,
    ]);
    let h = Harness::new(backend);
    h.send(10, "slow question").await;
    assert_eq!(h.replies(), vec!["done"]);
}

#[tokio::test]
async fn test_failed_run_yields_generic_apology() {
    let backend = ScriptedBackend::default();
    backend.script(vec![RunStatus::Failed]);
    *backend.last_error.lock() = Some(RunError {
        code: Some("rate_limited".to_string()),
        message: Some("Rate limit reached".to_string()),
    });
    let h = Harness::new(backend);
    h.send(10, "hello").await;

    let replies = h.replies();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains("Sorry, I encountered an error"));
}

#[tokio::test]
async fn test_stuck_run_yields_timeout_notice() {
    let backend = ScriptedBackend::default();
    backend.script(vec![RunStatus::InProgress]);
    let h = Harness::with_config(
        backend,
        CoordinatorConfig {
            max_retries: 1,
            timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(1),
            backoff_base: Duration::from_millis(1),
        },
    );
    h.send(10, "hello").await;

    let replies = h.replies();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains("took too long"));
}

#[tokio::test]
async fn test_empty_message_list_yields_apology_not_empty_reply() {
    let backend = ScriptedBackend::default();
    backend.script(vec![RunStatus::Completed]);
    // No answer configured, so the completed run has no messages.
    let h = Harness::new(backend);
    h.send(10, "hello").await;

    let replies = h.replies();
    assert_eq!(replies.len(), 1);
    assert!(!replies[0].is_empty());
    assert!(replies[0].contains("Sorry, I encountered an error"));
}

#[tokio::test]
async fn test_thread_persists_across_restart() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::completing_with("ok"));
    let db_path = dir.path().join("threads.db");

    {
        let store = open_store(&db_path, dir.path());
        let registry = ThreadRegistry::new(backend.clone(), store);
        registry.get_or_create(10).await.unwrap();
    }

    let store = open_store(&db_path, dir.path());
    let registry = ThreadRegistry::new(backend.clone(), store);
    registry.get_or_create(10).await.unwrap();

    // The second registry reused the persisted mapping.
    assert_eq!(*backend.threads_created.lock(), 1);
    assert_eq!(registry.stats().total_threads, 1);
}
