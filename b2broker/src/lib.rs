//! # b2broker: a credential broker for Backblaze B2
//!
//! `b2broker` sits between untrusted clients (typically a browser frontend)
//! and a Backblaze B2 object-storage account, so the account's long-lived
//! `keyId`/`applicationKey` pair never leaves the server. Clients ask the
//! broker for what they need and receive only minimal, time-bounded
//! credentials in return.
//!
//! ## What It Does
//!
//! A client POSTs an optional JSON body `{"action": "upload" | "list"}` to
//! the root endpoint. The broker authorizes against B2 using the account key
//! pair (Basic auth), caches the resulting account token for 23 hours - a
//! deliberate margin under B2's 24-hour token lifetime - and then performs
//! the requested call with it:
//!
//! - `upload` (the default): fetches a per-upload URL + upload token via
//!   `b2_get_upload_url` and returns `{uploadUrl, authorizationToken}`. The
//!   client uploads directly to B2 with those.
//! - `list`: fetches one page (1000 entries) of `b2_list_file_names` and
//!   returns `{files, nextFileName}` verbatim; pagination is the client's
//!   business.
//!
//! Malformed or missing bodies are not errors - they fall back to the upload
//! action, which keeps legacy clients working.
//!
//! ## Request Flow
//!
//! ```text
//! client -> POST /
//!   CONFIG_CHECK   credentials complete? (no network call otherwise, 500)
//!   AUTH           token cache hit, or b2_authorize_account refresh (401 on rejection)
//!   DISPATCH       b2_get_upload_url | b2_list_file_names (500 on upstream failure)
//!   RESPOND        200 with the grant or listing
//! ```
//!
//! Every error path produces a JSON `{"error": ...}` body; a top-level
//! conversion in [`errors`] guarantees no failure escapes as a crash. The
//! token cache ([`token_cache`]) is the only stateful component: a single
//! process-wide slot, read concurrently, refreshed outside its write lock
//! (overlapping refreshes may duplicate an authorize call; each result is
//! valid and the last write wins).
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use b2broker::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = b2broker::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     b2broker::telemetry::init_telemetry();
//!
//!     Application::new(config)?
//!         .serve(async {
//!             tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!         })
//!         .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module: YAML file plus `B2BROKER_`-prefixed environment
//! overrides, with the bare `B2_KEY_ID`/`B2_APP_KEY`/`B2_BUCKET_ID` variables
//! accepted for compatibility with existing deployments.

pub mod api;
pub mod b2;
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod token_cache;

use std::sync::Arc;

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info};

use crate::b2::{B2Api, B2Client};
use crate::config::CorsOrigin;
use crate::token_cache::TokenCache;

pub use crate::config::Config;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Process-wide single-slot authorization cache
    pub token_cache: Arc<TokenCache>,
    /// Upstream B2 client; a trait object so tests can substitute doubles
    pub b2: Arc<dyn B2Api>,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    // tower-http panics if `*` is passed to `AllowOrigin::list`; a wildcard
    // must be expressed as `AllowOrigin::any()` instead.
    let allow_origin = if config
        .cors
        .allowed_origins
        .iter()
        .any(|origin| matches!(origin, CorsOrigin::Wildcard))
    {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &config.cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router: the broker endpoint, the health route, CORS,
/// and request tracing.
///
/// # Errors
///
/// Returns an error if a configured CORS origin is not a valid header value.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors = create_cors_layer(&state.config)?;

    let router = Router::new()
        .route("/", post(api::handlers::broker))
        .route("/health", get(api::handlers::health))
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// The assembled broker application.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] builds the upstream client, the token
///    cache, and the router
/// 2. **Serve**: [`Application::serve`] binds a TCP port and handles requests
///    until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance from loaded configuration.
    ///
    /// Incomplete B2 credentials are not fatal here: the server starts and
    /// answers every request with a configuration error until they are set,
    /// so `--validate` (or the logs) is where misconfiguration shows up first.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        if let Err(err) = config.b2.credentials().validate() {
            tracing::warn!("{err}; all requests will fail until the credentials are configured");
        }

        let state = AppState {
            token_cache: Arc::new(TokenCache::new()),
            b2: Arc::new(B2Client::new(&config.b2)),
            config: config.clone(),
        };

        let router = build_router(state)?;

        Ok(Self { router, config })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("B2 credential broker listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutdown complete");
        Ok(())
    }
}
