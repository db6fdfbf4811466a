/// Chat Relay Server
///
/// Main server entry point. Handles:
/// - Command-line argument parsing
/// - Database initialization
/// - HTTP and WebSocket server startup
use actix_web::web;
use anyhow::Context;
use std::fs;
use std::process;
use std::time::Duration;

use chat_relay_server::config::Config;
use chat_relay_server::db;
use chat_relay_server::router::{spawn_typing_pump, Router};
use chat_relay_server::server;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .init();

    let config = Config::from_args();

    log::info!("Starting chat relay server");
    log::info!("Database: {:?}", config.database);
    log::info!("Port: {}", config.port);
    log::info!("Typing timeout: {}ms", config.typing_timeout_ms);

    // Write PID file if specified
    if let Some(pidfile) = &config.pidfile {
        fs::write(pidfile, process::id().to_string()).context("failed to write PID file")?;
        log::info!("PID file written to: {:?}", pidfile);
    }

    // Initialize database
    let db_path = config
        .database
        .to_str()
        .context("database path is not valid UTF-8")?;
    let pool = db::create_pool(db_path).context("failed to open database")?;
    log::info!("Database initialized");

    let (router, expiry_rx) = Router::new(
        pool.clone(),
        Duration::from_millis(config.typing_timeout_ms),
    );
    let router = web::Data::new(router);
    spawn_typing_pump(router.clone().into_inner(), expiry_rx);

    // Start HTTP server
    let bind_addr = format!("127.0.0.1:{}", config.port);
    log::info!("Starting HTTP server on {}", bind_addr);

    let http_server = server::create_http_server(web::Data::new(pool), router, &bind_addr)?;
    http_server.await.context("server terminated")?;
    Ok(())
}
