use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use scout_settings::ServerSettings;

use crate::api;
use crate::client;
use crate::context::AppContext;

/// Listener configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            cors_origins: settings.cors_origins.clone(),
        }
    }
}

/// Build the router with every route.
pub fn build_router(ctx: AppContext, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(api::root))
        .route("/health", get(api::health))
        .route("/ws", get(ws_handler))
        .route("/api/chat", post(api::chat))
        .route("/api/generate-artifact", post(api::generate_artifact))
        .route("/api/logs", get(api::logs))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Bind and serve. Returns once the listener is bound.
pub async fn start(config: ServerConfig, ctx: AppContext) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(ctx.clone(), &config.cors_origins);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    info!(addr = %local_addr, "scout server listening");

    let shutdown = ctx.shutdown_token();
    let server = tokio::spawn(async move {
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = served {
            warn!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        addr: local_addr,
        ctx,
        server,
    })
}

/// Handle returned by [`start`]. Keeps the serve task alive.
pub struct ServerHandle {
    pub addr: SocketAddr,
    ctx: AppContext,
    server: JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Stop accepting connections, close sockets and wait for in-flight turns.
    pub async fn shutdown(self) {
        self.ctx.shutdown().await;
        if let Err(e) = self.server.await {
            warn!(error = %e, "server task failed");
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(ctx): State<AppContext>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client::handle_ws_connection(socket, ctx))
}
