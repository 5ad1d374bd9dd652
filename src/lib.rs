/// Pairchat server library
///
/// Matchmaking core (group registry and session router) plus the
/// actix-web WebSocket transport that hosts it.
pub mod config;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
