//! Wire types for the B2 native API.
//!
//! Only the fields the broker actually uses are modeled; B2 returns a number
//! of additional fields (account capabilities, download URLs, bucket metadata)
//! that are ignored on deserialization.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Successful `b2_authorize_account` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeOk {
    /// Base URL for all subsequent API calls with this token
    pub api_url: Url,
    /// Account-level bearer token, valid for 24 hours on the provider side
    pub authorization_token: String,
}

/// Per-upload credentials returned by `b2_get_upload_url` and passed to the
/// client verbatim.
///
/// The upload token is scoped to one bucket and expires on a provider-defined
/// schedule this system does not track.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadGrant {
    pub upload_url: String,
    pub authorization_token: String,
}

/// One page of `b2_list_file_names` results, passed to the client verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListing {
    /// File entries exactly as the provider returned them; the broker does
    /// not interpret their attributes
    pub files: Vec<Value>,
    /// Pagination cursor, `null` when the listing is complete. Opaque to the
    /// broker - no follow-up fetch is performed
    pub next_file_name: Option<String>,
}

/// B2's error body shape: `{"status": ..., "code": ..., "message": ...}`.
///
/// Decoding is lenient; callers fall back to the raw body when `message` is
/// absent.
#[derive(Debug, Deserialize)]
pub struct B2ErrorBody {
    pub message: Option<String>,
}
