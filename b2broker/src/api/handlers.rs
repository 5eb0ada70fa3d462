//! HTTP request handlers for the broker endpoints.
//!
//! The broker exposes a single credential endpoint plus a liveness route.
//! Handlers return [`crate::errors::Error`] which automatically converts to
//! the appropriate HTTP status code and JSON error response, so every failure
//! path in the sequence below produces a structured body rather than a crash:
//!
//! ```text
//! CONFIG_CHECK -> AUTH (cache hit or refresh) -> DISPATCH -> RESPOND
//! ```

use axum::{Json, body::Bytes, extract::State};
use serde_json::{Value, json};

use crate::AppState;
use crate::api::models::{Action, BrokerResponse, parse_action};
use crate::b2::B2Api;
use crate::config::Credentials;
use crate::errors::Result;
use crate::token_cache::CachedAuthorization;

// GET /health - liveness probe for the hosting runtime
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// POST / - exchange the server-held account credentials for the minimal
// grant the client needs: an upload URL + token, or one page of the bucket
// listing. Body is optional JSON `{"action": "upload" | "list"}`.
pub async fn broker(State(state): State<AppState>, body: Bytes) -> Result<Json<BrokerResponse>> {
    // No network call is attempted while the key configuration is incomplete
    let credentials = state.config.b2.credentials();
    credentials.validate()?;

    let auth = state.token_cache.get_valid(state.b2.as_ref(), &credentials).await?;

    let action = parse_action(&body);
    let response = dispatch(action, state.b2.as_ref(), &credentials, &auth).await?;

    Ok(Json(response))
}

/// Route the requested action to the matching upstream call.
async fn dispatch(action: Action, api: &dyn B2Api, credentials: &Credentials, auth: &CachedAuthorization) -> Result<BrokerResponse> {
    match action {
        Action::Upload => {
            tracing::info!("Fetching a B2 upload URL for bucket {}", credentials.bucket_id);
            let grant = api.get_upload_url(auth, &credentials.bucket_id).await?;
            Ok(BrokerResponse::Upload(grant))
        }
        Action::List => {
            tracing::info!("Listing files in bucket {}", credentials.bucket_id);
            let listing = api.list_file_names(auth, &credentials.bucket_id).await?;
            tracing::info!("Listed {} files", listing.files.len());
            Ok(BrokerResponse::Listing(listing))
        }
    }
}
