/// HTTP server factory and configuration.
/// Provides a reusable function to create and configure the HTTP server
/// for use in both the main binary and tests.

use crate::error::ServerError;
use crate::handlers::{get_group, health, list_groups, ws_connect, Router, WsServer};
use crate::router::SendPolicy;
use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;

/// Register every route on an app or test service
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // REST endpoints
        .route("/health", web::get().to(health))
        .route("/groups", web::get().to(list_groups))
        .route("/groups/{name}", web::get().to(get_group))
        // WebSocket endpoint
        .route("/ws", web::get().to(ws_connect));
}

/// Headers added to every response when cross-origin access is enabled
pub fn cors_headers() -> middleware::DefaultHeaders {
    middleware::DefaultHeaders::new().add(("Access-Control-Allow-Origin", "*"))
}

/// Build a router backed by a fresh WebSocket transport
pub fn create_router(policy: SendPolicy) -> web::Data<Router> {
    web::Data::new(Router::new(Arc::new(WsServer::new())).with_policy(policy))
}

/// Create a configured HTTP server
///
/// Takes the session router and bind address, then returns a fully
/// configured `Server` ready to be awaited.
///
/// # Arguments
/// * `router` - Session router wrapped in web::Data
/// * `bind_addr` - Address to bind the server to (e.g., "127.0.0.1:8080")
/// * `cors` - Allow cross-origin requests from any origin
///
/// # Example
/// ```ignore
/// let router = server::create_router(SendPolicy::Open);
/// let server = server::create_http_server(router, "127.0.0.1:8080", true)?;
/// server.await?;
/// ```
pub fn create_http_server(
    router: web::Data<Router>,
    bind_addr: &str,
    cors: bool,
) -> Result<actix_web::dev::Server, ServerError> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(router.clone())
            .wrap(middleware::Condition::new(cors, cors_headers()))
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(bind_addr)
    .map_err(|source| ServerError::Bind {
        addr: bind_addr.to_string(),
        source,
    })?
    .run();

    Ok(server)
}

/// Create a test HTTP server with a fresh router
///
/// Binds to a random available port.
///
/// # Returns
/// A tuple of (server, bind_address) where bind_address can be used to make requests
pub fn create_test_http_server() -> Result<(actix_web::dev::Server, String), ServerError> {
    let router = create_router(SendPolicy::Open);

    // Bind to 127.0.0.1:0 to get a random available port
    let bind_addr = "127.0.0.1:0";

    let server = HttpServer::new(move || {
        App::new()
            .app_data(router.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(bind_addr)
    .map_err(|source| ServerError::Bind {
        addr: bind_addr.to_string(),
        source,
    })?;

    // Get the actual bind address (including the assigned port)
    let addr_str = server
        .addrs()
        .first()
        .map(|addr| addr.to_string())
        .ok_or_else(|| ServerError::Bind {
            addr: bind_addr.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "No bind address found"),
        })?;

    Ok((server.run(), addr_str))
}
