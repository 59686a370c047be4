//! Exchange audit log.
//!
//! Records one CSV row per completed question/answer exchange to
//! `{state_dir}/exchanges.csv`. Records are sent through a bounded mpsc
//! channel and flushed by a background Tokio task, so the message handler
//! never blocks on audit I/O and audit failures never abort an exchange.

use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Bounded channel capacity for non-blocking writes.
const CHANNEL_CAPACITY: usize = 1_000;

/// Audit file name inside the state directory.
const AUDIT_FILE_NAME: &str = "exchanges.csv";

/// One completed question/answer exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeRecord {
    /// RFC 3339 timestamp.
    pub ts: String,
    pub user_id: i64,
    pub user_name: String,
    pub question: String,
    pub answer: String,
    pub thread_id: String,
    /// End-to-end latency of the exchange in milliseconds.
    pub response_ms: u64,
}

impl ExchangeRecord {
    pub fn new(
        user_id: i64,
        user_name: impl Into<String>,
        question: impl Into<String>,
        answer: impl Into<String>,
        thread_id: impl Into<String>,
        response_ms: u64,
    ) -> Self {
        Self {
            ts: Utc::now().to_rfc3339(),
            user_id,
            user_name: user_name.into(),
            question: question.into(),
            answer: answer.into(),
            thread_id: thread_id.into(),
            response_ms,
        }
    }
}

static EXCHANGE_LOG: OnceLock<ExchangeLog> = OnceLock::new();

/// Global exchange log backed by a bounded mpsc channel and a background
/// writer task.
pub struct ExchangeLog {
    tx: mpsc::Sender<ExchangeRecord>,
    path: PathBuf,
}

impl ExchangeLog {
    /// Initialize the global exchange log.
    ///
    /// Spawns a background Tokio task that drains the channel and appends
    /// CSV rows. Calling this more than once is a no-op.
    pub async fn init(state_dir: PathBuf) {
        if let Err(e) = fs::create_dir_all(&state_dir) {
            tracing::error!("audit: failed to create state dir: {e}");
            return;
        }

        let (tx, rx) = mpsc::channel::<ExchangeRecord>(CHANNEL_CAPACITY);
        let path = state_dir.join(AUDIT_FILE_NAME);

        tokio::spawn(writer_task(rx, path.clone()));

        let _ = EXCHANGE_LOG.set(ExchangeLog { tx, path });
    }

    /// Send a record to the background writer (non-blocking best-effort).
    pub fn record(&self, record: ExchangeRecord) {
        // try_send so callers never block; drop if the channel is full.
        if let Err(e) = self.tx.try_send(record) {
            tracing::warn!("audit: channel full or closed, dropping record: {e}");
        }
    }
}

/// Log a completed exchange. No-ops silently if [`ExchangeLog::init`] has
/// not been called.
pub fn record_exchange(record: ExchangeRecord) {
    if let Some(log) = EXCHANGE_LOG.get() {
        log.record(record);
    }
}

async fn writer_task(mut rx: mpsc::Receiver<ExchangeRecord>, path: PathBuf) {
    while let Some(record) = rx.recv().await {
        if let Err(e) = append_record(&path, &record) {
            tracing::error!("audit: failed to write record: {e}");
        }
    }
}

/// Append one CSV row, writing the header when the file is new.
fn append_record(path: &PathBuf, record: &ExchangeRecord) -> Result<(), csv::Error> {
    let write_header = !path.exists();
    let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(write_header)
        .from_writer(file);
    writer.serialize(record)?;
    writer.flush()?;
    Ok(())
}

/// Read all exchange records from a CSV file. Used by tests and offline
/// inspection; returns an empty vec when the file is missing.
pub fn read_records(path: &PathBuf) -> Vec<ExchangeRecord> {
    let Ok(file) = fs::File::open(path) else {
        return Vec::new();
    };
    let mut reader = csv::Reader::from_reader(file);
    reader.deserialize().filter_map(Result::ok).collect()
}
