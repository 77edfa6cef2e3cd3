mod api;
mod config;
mod constants;
mod error;
mod format;
mod model_pattern;
mod oauth;
mod routes;
mod session;
mod templates;

use axum::ServiceExt;
use clap::Parser;
use config::Config;
use reqwest::Client;
use session::SessionStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use templates::Renderer;
use tower_http::normalize_path::NormalizePath;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::constants::SESSION_PURGE_INTERVAL;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const BUILD_TIME: &str = env!("BUILD_TIME");

pub struct AppState {
    pub sessions: SessionStore,
    pub renderer: Renderer,
    /// API base pre-filled on the login form when no login is remembered
    pub default_api_base: String,
    /// Whether to set the Secure flag on cookies (true when not binding to localhost)
    pub secure_cookies: bool,
}

#[derive(Parser)]
#[command(name = "cpa-dashboard")]
#[command(about = "Web dashboard for a CLIProxyAPI management API")]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, env = "CPA_DASHBOARD_HOST")]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "CPA_DASHBOARD_PORT")]
    port: Option<u16>,

    /// Management API base URL offered on the login form
    #[arg(long, env = "CPA_DASHBOARD_API_BASE")]
    api_base: Option<String>,
}

/// Resolve the listen address; names such as `localhost` and bare IPv6 hosts are accepted
async fn resolve_bind_addr(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address for {host}"),
            )
        })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env();

    let host = args.host.unwrap_or(config.host.clone());
    let port = args.port.unwrap_or(config.port);
    let default_api_base = args
        .api_base
        .map(|b| b.trim().trim_end_matches('/').to_string())
        .filter(|b| !b.is_empty())
        .unwrap_or(config.default_api_base.clone());

    // Shared HTTP client for every management session
    let http_client = Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .pool_max_idle_per_host(10)
        .build()?;

    let sessions = SessionStore::load(
        config.sessions_path(),
        http_client,
        config.session_ttl_secs,
    )
    .await;

    let is_localhost = matches!(
        host.trim_start_matches('[').trim_end_matches(']'),
        "127.0.0.1" | "localhost" | "::1"
    );

    let state = Arc::new(AppState {
        sessions,
        renderer: Renderer::new()?,
        default_api_base,
        secure_cookies: !is_localhost,
    });

    let purge_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match purge_state.sessions.purge_expired().await {
                Ok(0) => {}
                Ok(n) => info!("Purged {n} expired dashboard session(s)"),
                Err(e) => warn!("Failed to persist session purge: {e}"),
            }
        }
    });

    let app = NormalizePath::trim_trailing_slash(
        routes::router(state.clone()).layer(TraceLayer::new_for_http()),
    );

    let addr = resolve_bind_addr(&host, port).await?;
    info!(
        "Starting cpa-dashboard v{}-{} (built {})",
        VERSION, GIT_HASH, BUILD_TIME
    );
    info!("Listening on http://{}", addr);
    info!("Default management API: {}", state.default_api_base);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        ServiceExt::<axum::extract::Request>::into_make_service(app),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}
