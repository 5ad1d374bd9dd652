/// HTTP handlers module
/// Provides REST and WebSocket endpoints

pub mod rest;
pub mod websocket;

pub use rest::{get_group, health, list_groups};
pub use websocket::{ws_connect, Router, WsServer};
