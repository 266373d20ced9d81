// src/services/session_manager.rs
use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::body::BodyNode;
use super::store::{PersistedState, StateStore, StoreError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Bot,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_request: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            raw_request: None,
            raw_response: None,
        }
    }

    pub fn with_raw_request(mut self, raw: Value) -> Self {
        self.raw_request = Some(raw);
        self
    }

    pub fn with_raw_response(mut self, raw: Value) -> Self {
        self.raw_response = Some(raw);
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Websocket,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Header or cookie row as edited by the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub id: String,
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4().to_string(), key: key.into(), value: value.into() }
    }
}

/// Which of a session's two schema trees an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    Request,
    Response,
}

/// Every user-editable part of a session. Saved as a whole.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub name: String,
    pub url: String,
    pub protocol: Protocol,
    pub method: HttpMethod,
    pub headers: Vec<KeyValue>,
    pub cookies: Vec<KeyValue>,
    pub request_body: BodyNode,
    pub response_body_mapping: BodyNode,
    pub is_markdown: bool,
    pub is_pinned: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "New Chat Session".to_string(),
            url: String::new(),
            protocol: Protocol::Http,
            method: HttpMethod::Post,
            headers: vec![
                KeyValue::new("Authorization", ""),
                KeyValue::new("Accept", "application/json"),
                KeyValue::new("Accept-Encoding", "gzip, deflate, br"),
                KeyValue::new("Connection", "keep-alive"),
            ],
            cookies: Vec::new(),
            request_body: BodyNode::empty_object(),
            response_body_mapping: BodyNode::empty_object(),
            is_markdown: true,
            is_pinned: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    #[serde(flatten)]
    pub config: SessionConfig,
    #[serde(default)]
    pub history: Vec<Message>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let mut session = Self { id: Uuid::new_v4().to_string(), config: SessionConfig::default(), history: Vec::new() };
        session.apply(config);
        session
    }

    /// Replaces the editable record, keeping id and history.
    fn apply(&mut self, mut config: SessionConfig) {
        config.request_body = config.request_body.normalize_carrier();
        config.response_body_mapping = config.response_body_mapping.normalize_carrier();
        self.config = config;
    }

    pub fn schema(&self, kind: SchemaKind) -> &BodyNode {
        match kind {
            SchemaKind::Request => &self.config.request_body,
            SchemaKind::Response => &self.config.response_body_mapping,
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearanceSettings {
    pub primary_color: String,
    pub secondary_color: String,
}

impl Default for AppearanceSettings {
    fn default() -> Self {
        Self { primary_color: "#ffffff".to_string(), secondary_color: "#000000".to_string() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns the session list and flushes it to the store on every change.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<RwLock<PersistedState>>,
    store: Arc<dyn StateStore>,
}

impl Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Hydrates from `store`, starting empty when nothing was saved.
    pub async fn load(store: Arc<dyn StateStore>) -> Result<Self, StoreError> {
        let state = store.load().await?.unwrap_or_default();
        tracing::info!(sessions = state.sessions.len(), "session state hydrated");
        Ok(Self { inner: Arc::new(RwLock::new(state)), store })
    }

    // Apply `f` to a copy under the write lock; the copy replaces the live
    // state only once it has been flushed.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut PersistedState) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut guard = self.inner.write().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.store.save(&next).await?;
        *guard = next;
        Ok(out)
    }

    async fn read<T>(&self, f: impl FnOnce(&PersistedState) -> T) -> T {
        let guard = self.inner.read().await;
        f(&guard)
    }

    fn find_mut<'a>(state: &'a mut PersistedState, id: &str) -> Result<&'a mut ChatSession, SessionError> {
        state
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    pub async fn create_session(&self, config: Option<SessionConfig>) -> Result<ChatSession, SessionError> {
        let session = ChatSession::with_config(config.unwrap_or_default());
        let created = session.clone();
        self.mutate(move |state| {
            state.sessions.push(session);
            Ok(())
        })
        .await?;
        tracing::info!(session_id = %created.id, "session created");
        Ok(created)
    }

    /// Pinned sessions first, otherwise in creation order.
    pub async fn list_sessions(&self) -> Vec<ChatSession> {
        let mut sessions = self.read(|state| state.sessions.clone()).await;
        sessions.sort_by_key(|s| !s.config.is_pinned);
        sessions
    }

    pub async fn get_session(&self, id: &str) -> Option<ChatSession> {
        self.read(|state| state.sessions.iter().find(|s| s.id == id).cloned()).await
    }

    pub async fn update_session(&self, id: &str, config: SessionConfig) -> Result<ChatSession, SessionError> {
        self.mutate(|state| {
            let session = Self::find_mut(state, id)?;
            session.apply(config);
            Ok(session.clone())
        })
        .await
    }

    /// Removes the session and clears the active pointer if it referenced it.
    pub async fn delete_session(&self, id: &str) -> Result<(), SessionError> {
        self.mutate(|state| {
            let before = state.sessions.len();
            state.sessions.retain(|s| s.id != id);
            if state.sessions.len() == before {
                return Err(SessionError::NotFound(id.to_string()));
            }
            if state.active_session_id.as_deref() == Some(id) {
                state.active_session_id = None;
            }
            Ok(())
        })
        .await?;
        tracing::info!(session_id = %id, "session deleted");
        Ok(())
    }

    pub async fn set_pinned(&self, id: &str, pinned: bool) -> Result<ChatSession, SessionError> {
        self.mutate(|state| {
            let session = Self::find_mut(state, id)?;
            session.config.is_pinned = pinned;
            Ok(session.clone())
        })
        .await
    }

    /// Designates `node_id` as the carrier of one of the session's trees.
    pub async fn set_carrier(&self, id: &str, kind: SchemaKind, node_id: &str) -> Result<BodyNode, SessionError> {
        self.mutate(|state| {
            let session = Self::find_mut(state, id)?;
            let tree = match kind {
                SchemaKind::Request => &mut session.config.request_body,
                SchemaKind::Response => &mut session.config.response_body_mapping,
            };
            *tree = tree.set_carrier(node_id);
            Ok(tree.clone())
        })
        .await
    }

    pub async fn set_active_session(&self, id: Option<&str>) -> Result<(), SessionError> {
        self.mutate(|state| {
            if let Some(id) = id {
                if !state.sessions.iter().any(|s| s.id == id) {
                    return Err(SessionError::NotFound(id.to_string()));
                }
            }
            state.active_session_id = id.map(str::to_string);
            Ok(())
        })
        .await
    }

    pub async fn active_session_id(&self) -> Option<String> {
        self.read(|state| state.active_session_id.clone()).await
    }

    // Append a message to a session's history. Returns the new history length.
    pub async fn append_message(&self, session_id: &str, message: Message) -> Result<usize, SessionError> {
        self.mutate(|state| {
            let session = Self::find_mut(state, session_id)?;
            session.history.push(message);
            Ok(session.history.len())
        })
        .await
    }

    /// Get a copy of the session history
    pub async fn get_history(&self, session_id: &str) -> Option<Vec<Message>> {
        self.read(|state| state.sessions.iter().find(|s| s.id == session_id).map(|s| s.history.clone()))
            .await
    }

    pub async fn clear_history(&self, session_id: &str) -> Result<(), SessionError> {
        self.mutate(|state| {
            Self::find_mut(state, session_id)?.history.clear();
            Ok(())
        })
        .await
    }

    pub async fn settings(&self) -> AppearanceSettings {
        self.read(|state| state.settings.clone()).await
    }

    pub async fn update_settings(&self, settings: AppearanceSettings) -> Result<AppearanceSettings, SessionError> {
        self.mutate(|state| {
            state.settings = settings;
            Ok(state.settings.clone())
        })
        .await
    }

    /// Number of sessions
    pub async fn len(&self) -> usize {
        self.read(|state| state.sessions.len()).await
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::body::Property;
    use crate::services::store::MemoryStore;

    /// Loads fine but refuses every write.
    struct ReadOnlyStore;

    #[async_trait::async_trait]
    impl StateStore for ReadOnlyStore {
        async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
            Ok(None)
        }

        async fn save(&self, _state: &PersistedState) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }
    }

    async fn manager() -> SessionManager {
        SessionManager::load(Arc::new(MemoryStore::new())).await.unwrap()
    }

    #[tokio::test]
    async fn basic_session_flow() {
        let mgr = manager().await;
        let session = mgr.create_session(None).await.unwrap();
        assert!(!session.id.is_empty());
        let len = mgr.append_message(&session.id, Message::new(MessageRole::User, "hello")).await.unwrap();
        assert_eq!(len, 1);
        let history = mgr.get_history(&session.id).await.unwrap();
        assert_eq!(history.len(), 1);
        mgr.delete_session(&session.id).await.unwrap();
        assert!(mgr.is_empty().await);
    }

    #[tokio::test]
    async fn failed_flush_leaves_state_untouched() {
        let mgr = SessionManager::load(Arc::new(ReadOnlyStore)).await.unwrap();

        assert!(matches!(mgr.create_session(None).await, Err(SessionError::Store(StoreError::Io(_)))));
        assert!(mgr.is_empty().await);
        assert!(mgr.list_sessions().await.is_empty());

        let settings = AppearanceSettings { primary_color: "#123456".into(), ..AppearanceSettings::default() };
        assert!(mgr.update_settings(settings).await.is_err());
        assert_eq!(mgr.settings().await, AppearanceSettings::default());
    }

    #[tokio::test]
    async fn hydrates_from_existing_state() {
        let mut state = PersistedState::default();
        let session = ChatSession::new();
        state.active_session_id = Some(session.id.clone());
        state.sessions.push(session);

        let mgr = SessionManager::load(Arc::new(MemoryStore::with_state(state.clone()))).await.unwrap();
        assert_eq!(mgr.len().await, 1);
        assert_eq!(mgr.active_session_id().await, state.active_session_id);
    }

    #[tokio::test]
    async fn saved_config_gets_single_carrier() {
        let mgr = manager().await;
        let session = mgr.create_session(None).await.unwrap();
        let config = SessionConfig {
            request_body: BodyNode::object(vec![
                Property::new("a", BodyNode::carrier()),
                Property::new("b", BodyNode::carrier()),
            ]),
            ..SessionConfig::default()
        };
        let updated = mgr.update_session(&session.id, config).await.unwrap();
        assert_eq!(updated.config.request_body.carrier_count(), 1);
    }
}
