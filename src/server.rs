/// HTTP server factory and configuration.
/// Provides a reusable function to create and configure the HTTP server
/// for use in both the main binary and tests.
use actix_web::{middleware, web, App, HttpServer};
use std::time::Duration;

use crate::db::DbPool;
use crate::handlers::{get_messages, health, ws_connect};
use crate::router::{spawn_typing_pump, Router};

/// Create a configured HTTP server
///
/// Takes a database pool, a router, and a bind address, then returns a
/// fully configured `HttpServer` ready to be run. The caller is
/// responsible for having spawned the router's typing pump.
pub fn create_http_server(
    pool: web::Data<DbPool>,
    router: web::Data<Router>,
    bind_addr: &str,
) -> std::io::Result<actix_web::dev::Server> {
    let pool_clone = pool.clone();
    let router_clone = router.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(pool_clone.clone())
            .app_data(router_clone.clone())
            .wrap(middleware::Logger::default())
            // REST endpoints
            .route("/health", web::get().to(health))
            .route("/messages", web::get().to(get_messages))
            // WebSocket endpoint
            .route("/ws", web::get().to(ws_connect))
    })
    .bind(bind_addr)?
    .run();

    Ok(server)
}

/// Create a test HTTP server with an in-memory database and a running
/// typing pump. Binds to a random available port and uses a short typing
/// timeout so timeout paths are observable in tests.
///
/// # Returns
/// A tuple of (server, bind_address) where bind_address can be used to make requests
pub fn create_test_http_server() -> std::io::Result<(actix_web::dev::Server, String)> {
    let pool = web::Data::new(crate::db::create_test_pool());
    let (router, expiry_rx) = Router::new(pool.get_ref().clone(), Duration::from_millis(200));
    let router = web::Data::new(router);
    spawn_typing_pump(router.clone().into_inner(), expiry_rx);

    // Bind to 127.0.0.1:0 to get a random available port
    let bind_addr = "127.0.0.1:0";
    let pool_clone = pool.clone();
    let router_clone = router.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(pool_clone.clone())
            .app_data(router_clone.clone())
            .wrap(middleware::Logger::default())
            // REST endpoints
            .route("/health", web::get().to(health))
            .route("/messages", web::get().to(get_messages))
            // WebSocket endpoint
            .route("/ws", web::get().to(ws_connect))
    })
    .bind(bind_addr)?;

    // Get the actual bind address (including the assigned port)
    let addrs = server.addrs();
    let addr_str = addrs
        .first()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "No bind address found"))?
        .to_string();

    let server = server.run();

    Ok((server, addr_str))
}
