//! Outbound client for the B2 native API.
//!
//! Stateless: every method performs one blocking-awaited call with no retries.
//! A failed call surfaces immediately; the end client is responsible for
//! retrying the whole broker request.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::{Client, header::AUTHORIZATION};
use serde_json::json;
use url::Url;

use super::models::{AuthorizeOk, B2ErrorBody, FileListing, UploadGrant};
use crate::config::{B2Config, Credentials};
use crate::errors::{Error, Result};
use crate::token_cache::CachedAuthorization;

/// Number of file entries requested per listing call. B2 accepts up to
/// 10000, but bills one transaction per 1000 returned entries.
pub const LIST_PAGE_SIZE: u32 = 1000;

/// A trait for the three B2 API calls the broker performs.
///
/// In practice this is implemented over HTTP by [`B2Client`]; tests substitute
/// call-counting doubles so cache and dispatch behavior can be checked without
/// a network.
#[async_trait]
pub trait B2Api: Send + Sync {
    /// Exchange the account key pair for an account authorization token.
    async fn authorize(&self, credentials: &Credentials) -> Result<AuthorizeOk>;

    /// Obtain a per-upload URL and upload token for `bucket_id`.
    async fn get_upload_url(&self, auth: &CachedAuthorization, bucket_id: &str) -> Result<UploadGrant>;

    /// Fetch one page of file names from `bucket_id`.
    async fn list_file_names(&self, auth: &CachedAuthorization, bucket_id: &str) -> Result<FileListing>;
}

/// The concrete reqwest-backed implementation of [`B2Api`].
pub struct B2Client {
    client: Client,
    base_url: Url,
}

impl B2Client {
    pub fn new(config: &B2Config) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create B2 HTTP client");

        Self {
            client,
            base_url: config.api_url.clone(),
        }
    }
}

/// Join an API path onto a base URL.
///
/// `Url::join` drops the last path segment when the base has no trailing
/// slash, so one is added first.
fn endpoint(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        base.set_path(&format!("{}/", base.path()));
    }
    base.join(path)
        .map_err(|e| Error::Other(anyhow::anyhow!("invalid B2 endpoint URL: {e}")))
}

/// Pull the provider's reported reason out of a non-success response.
///
/// Falls back to the HTTP status plus raw body when the body is not the
/// documented `{message}` shape.
async fn provider_message(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<B2ErrorBody>(&body) {
        Ok(B2ErrorBody { message: Some(message) }) if !message.is_empty() => message,
        _ => format!("{status} - {body}"),
    }
}

#[async_trait]
impl B2Api for B2Client {
    async fn authorize(&self, credentials: &Credentials) -> Result<AuthorizeOk> {
        let url = endpoint(&self.base_url, "b2api/v2/b2_authorize_account")?;
        let encoded = general_purpose::STANDARD.encode(format!("{}:{}", credentials.key_id, credentials.application_key));

        tracing::debug!("Authorizing account against {}", url);
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Basic {encoded}"))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Authentication {
                message: provider_message(response).await,
            });
        }

        Ok(response.json::<AuthorizeOk>().await?)
    }

    async fn get_upload_url(&self, auth: &CachedAuthorization, bucket_id: &str) -> Result<UploadGrant> {
        let url = endpoint(&auth.api_url, "b2api/v2/b2_get_upload_url")?;

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, &auth.authorization_token)
            .json(&json!({ "bucketId": bucket_id }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Upstream {
                operation: "get upload URL",
                message: provider_message(response).await,
            });
        }

        Ok(response.json::<UploadGrant>().await?)
    }

    async fn list_file_names(&self, auth: &CachedAuthorization, bucket_id: &str) -> Result<FileListing> {
        let url = endpoint(&auth.api_url, "b2api/v2/b2_list_file_names")?;

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, &auth.authorization_token)
            .json(&json!({ "bucketId": bucket_id, "maxFileCount": LIST_PAGE_SIZE }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Upstream {
                operation: "list files",
                message: provider_message(response).await,
            });
        }

        Ok(response.json::<FileListing>().await?)
    }
}
