//! Request/response data structures for the broker endpoint.

use serde::{Deserialize, Serialize};

use crate::b2::models::{FileListing, UploadGrant};

/// Client-selected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// Hand out a per-upload URL and upload token (the default)
    #[default]
    Upload,
    /// List one page of bucket contents
    List,
}

impl Action {
    /// Tolerant mapping from the wire value. Anything other than `"list"`
    /// means upload - unknown values from malformed or legacy clients are not
    /// an error.
    fn from_name(name: &str) -> Self {
        match name {
            "list" => Action::List,
            _ => Action::Upload,
        }
    }
}

/// Optional JSON request body: `{"action": "upload" | "list"}`.
#[derive(Debug, Default, Deserialize)]
pub struct ActionRequest {
    pub action: Option<String>,
}

/// Best-effort action extraction - total, never fails.
///
/// An absent, empty, or unparsable body falls back to the default upload
/// action with a logged warning; parse failure is treated as "no action
/// specified", not as a bad request.
pub fn parse_action(body: &[u8]) -> Action {
    if body.is_empty() {
        return Action::default();
    }

    match serde_json::from_slice::<ActionRequest>(body) {
        Ok(request) => request.action.as_deref().map(Action::from_name).unwrap_or_default(),
        Err(err) => {
            tracing::warn!("Request body was empty or invalid ({err}); using default action: upload");
            Action::default()
        }
    }
}

/// Successful broker result, serialized verbatim as the response body.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BrokerResponse {
    /// `{"uploadUrl": ..., "authorizationToken": ...}`
    Upload(UploadGrant),
    /// `{"files": [...], "nextFileName": ...}`
    Listing(FileListing),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_body_defaults_to_upload() {
        assert_eq!(parse_action(b""), Action::Upload);
    }

    #[test]
    fn invalid_json_defaults_to_upload() {
        assert_eq!(parse_action(b"not json at all"), Action::Upload);
        assert_eq!(parse_action(b"{\"action\": "), Action::Upload);
        assert_eq!(parse_action(b"{\"action\": 5}"), Action::Upload);
    }

    #[test]
    fn empty_object_defaults_to_upload() {
        assert_eq!(parse_action(b"{}"), Action::Upload);
    }

    #[test]
    fn unknown_action_defaults_to_upload() {
        assert_eq!(parse_action(br#"{"action": "delete"}"#), Action::Upload);
    }

    #[test]
    fn explicit_actions_are_honored() {
        assert_eq!(parse_action(br#"{"action": "upload"}"#), Action::Upload);
        assert_eq!(parse_action(br#"{"action": "list"}"#), Action::List);
    }

    #[test]
    fn upload_response_uses_provider_field_names() {
        let response = BrokerResponse::Upload(UploadGrant {
            upload_url: "https://pod-000.backblaze.com/b2api/v2/b2_upload_file/x".to_string(),
            authorization_token: "4_upload".to_string(),
        });

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("uploadUrl").is_some());
        assert!(json.get("authorizationToken").is_some());
    }
}
