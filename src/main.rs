/// Pairchat Server - two-party matchmaking and relay
///
/// Main server entry point. Handles:
/// - Command-line argument parsing
/// - HTTP and WebSocket server startup
use anyhow::Context;
use pairchat_server::config::Config;
use pairchat_server::server;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .init();

    let config = Config::from_args();
    let bind_addr = config.bind_addr();

    log::info!("Starting server...");
    log::info!("Send policy: {:?}", config.send_policy());
    log::info!("CORS: {}", if config.cors_enabled() { "allow all" } else { "off" });

    if let Some(pidfile) = config.write_pidfile()? {
        log::info!("PID file written to: {:?}", pidfile);
    }

    let router = server::create_router(config.send_policy());

    let http_server = match server::create_http_server(router, &bind_addr, config.cors_enabled()) {
        Ok(s) => s,
        Err(e) if e.is_addr_in_use() => {
            log::error!(
                "Server failed to start. A server is already running on {}",
                bind_addr
            );
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    log::info!("Server started at http://{}", bind_addr);
    http_server.await.context("HTTP server terminated")
}
