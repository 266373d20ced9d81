use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Request,
    Response,
    Error,
    Info,
}

#[derive(Clone, Debug, Serialize)]
pub struct LogEntry {
    pub id: String,
    pub kind: LogKind,
    pub session_id: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Bounded activity log of exchanges, newest last.
#[derive(Debug, Clone)]
pub struct LogManager {
    inner: Arc<RwLock<VecDeque<LogEntry>>>,
    capacity: usize,
}

impl LogManager {
    pub fn new(capacity: usize) -> Self {
        Self { inner: Arc::new(RwLock::new(VecDeque::new())), capacity: capacity.max(1) }
    }

    pub async fn record(&self, kind: LogKind, session_id: Option<&str>, message: impl Into<String>, data: Option<Value>) {
        let entry = LogEntry {
            id: Uuid::new_v4().to_string(),
            kind,
            session_id: session_id.map(str::to_string),
            message: message.into(),
            timestamp: Utc::now(),
            data,
        };
        let mut entries = self.inner.write().await;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub async fn entries(&self) -> Vec<LogEntry> {
        self.inner.read().await.iter().cloned().collect()
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}
