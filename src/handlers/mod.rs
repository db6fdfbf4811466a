/// HTTP handlers module
/// Provides REST and WebSocket endpoints
pub mod rest;
pub mod websocket;

pub use rest::{get_messages, health};
pub use websocket::{ws_connect, WsSession};
