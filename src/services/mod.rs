// src/services/mod.rs
pub mod body;
pub mod chat;
pub mod http_transport;
pub mod log_manager;
pub mod session_manager;
pub mod store;
pub mod ws_manager;
