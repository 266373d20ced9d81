use chatbot_postman::services::body::{BodyNode, Property};
use chatbot_postman::services::session_manager::{
    AppearanceSettings, Message, MessageRole, SchemaKind, SessionConfig, SessionError, SessionManager,
};
use chatbot_postman::services::store::{JsonFileStore, MemoryStore};
use std::sync::Arc;

async fn manager() -> SessionManager {
    SessionManager::load(Arc::new(MemoryStore::new())).await.unwrap()
}

#[tokio::test]
async fn basic_session_flow() {
    let mgr = manager().await;
    let session = mgr.create_session(None).await.unwrap();
    assert_eq!(session.config.name, "New Chat Session");
    assert_eq!(session.config.headers.len(), 4);
    assert_eq!(session.config.request_body.carrier_id(), None);

    let len = mgr.append_message(&session.id, Message::new(MessageRole::User, "hello")).await.unwrap();
    assert_eq!(len, 1);
    let len = mgr.append_message(&session.id, Message::new(MessageRole::Bot, "hi")).await.unwrap();
    assert_eq!(len, 2);

    let history = mgr.get_history(&session.id).await.unwrap();
    assert_eq!(history[0].role, MessageRole::User);
    assert_eq!(history[1].content, "hi");

    mgr.clear_history(&session.id).await.unwrap();
    assert!(mgr.get_history(&session.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn pinned_sessions_list_first() {
    let mgr = manager().await;
    let a = mgr.create_session(None).await.unwrap();
    let b = mgr.create_session(None).await.unwrap();
    let c = mgr.create_session(None).await.unwrap();

    mgr.set_pinned(&c.id, true).await.unwrap();
    let order: Vec<_> = mgr.list_sessions().await.into_iter().map(|s| s.id).collect();
    assert_eq!(order, vec![c.id.clone(), a.id.clone(), b.id.clone()]);

    mgr.set_pinned(&c.id, false).await.unwrap();
    let order: Vec<_> = mgr.list_sessions().await.into_iter().map(|s| s.id).collect();
    assert_eq!(order, vec![a.id, b.id, c.id]);
}

#[tokio::test]
async fn deleting_active_session_clears_pointer() {
    let mgr = manager().await;
    let keep = mgr.create_session(None).await.unwrap();
    let doomed = mgr.create_session(None).await.unwrap();

    mgr.set_active_session(Some(&doomed.id)).await.unwrap();
    assert_eq!(mgr.active_session_id().await, Some(doomed.id.clone()));

    mgr.delete_session(&doomed.id).await.unwrap();
    assert_eq!(mgr.active_session_id().await, None);
    assert_eq!(mgr.len().await, 1);

    mgr.set_active_session(Some(&keep.id)).await.unwrap();
    mgr.delete_session(&doomed.id).await.unwrap_err();
    assert_eq!(mgr.active_session_id().await, Some(keep.id));
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let mgr = manager().await;
    let err = mgr.set_active_session(Some("nope")).await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound(_)));
    let err = mgr.append_message("nope", Message::new(MessageRole::User, "x")).await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound(_)));
    assert!(mgr.get_history("nope").await.is_none());
}

#[tokio::test]
async fn update_replaces_config_and_keeps_history() {
    let mgr = manager().await;
    let session = mgr.create_session(None).await.unwrap();
    mgr.append_message(&session.id, Message::new(MessageRole::User, "kept")).await.unwrap();

    let config = SessionConfig {
        name: "Renamed".to_string(),
        url: "http://localhost:9/chat".to_string(),
        is_markdown: false,
        ..SessionConfig::default()
    };
    let updated = mgr.update_session(&session.id, config).await.unwrap();
    assert_eq!(updated.id, session.id);
    assert_eq!(updated.config.name, "Renamed");
    assert!(!updated.config.is_markdown);
    assert_eq!(updated.history.len(), 1);
}

#[tokio::test]
async fn set_carrier_targets_one_tree() {
    let mgr = manager().await;
    let text = BodyNode::primitive("");
    let text_id = text.id().to_string();
    let config = SessionConfig {
        request_body: BodyNode::object(vec![Property::new("text", text)]),
        response_body_mapping: BodyNode::object(vec![Property::new("reply", BodyNode::carrier())]),
        ..SessionConfig::default()
    };
    let session = mgr.create_session(Some(config)).await.unwrap();

    let tree = mgr.set_carrier(&session.id, SchemaKind::Request, &text_id).await.unwrap();
    assert_eq!(tree.carrier_id(), Some(text_id.as_str()));

    let stored = mgr.get_session(&session.id).await.unwrap();
    assert_eq!(stored.config.request_body.carrier_id(), Some(text_id.as_str()));
    // The response tree keeps its own carrier.
    assert_eq!(stored.config.response_body_mapping.carrier_count(), 1);
}

#[tokio::test]
async fn state_survives_reload_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = SessionManager::load(Arc::new(JsonFileStore::new(dir.path()))).await.unwrap();

    let session = mgr.create_session(None).await.unwrap();
    mgr.append_message(&session.id, Message::new(MessageRole::User, "persist me")).await.unwrap();
    mgr.set_active_session(Some(&session.id)).await.unwrap();
    let settings = AppearanceSettings { primary_color: "#123456".to_string(), ..AppearanceSettings::default() };
    mgr.update_settings(settings.clone()).await.unwrap();

    let reloaded = SessionManager::load(Arc::new(JsonFileStore::new(dir.path()))).await.unwrap();
    assert_eq!(reloaded.list_sessions().await, mgr.list_sessions().await);
    assert_eq!(reloaded.active_session_id().await, Some(session.id.clone()));
    assert_eq!(reloaded.settings().await, settings);
    assert_eq!(reloaded.get_history(&session.id).await.unwrap()[0].content, "persist me");
}
