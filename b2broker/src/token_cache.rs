//! Process-wide single-slot cache for the B2 account authorization token.
//!
//! The account token B2 issues is valid for 24 hours. The cache refreshes an
//! hour early, leaving a margin for clock drift and for requests already in
//! flight when the window closes. The slot is shared across concurrent
//! requests; overlapping refreshes are allowed to race (each produces a valid
//! token, last write wins) rather than serialized behind a lock.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use url::Url;

use crate::b2::B2Api;
use crate::b2::models::AuthorizeOk;
use crate::config::Credentials;
use crate::errors::Result;

/// How long a cached token is served before re-authorizing.
const TOKEN_TTL_HOURS: i64 = 23;

/// The latest successful account authorization and when it was fetched.
///
/// Invariant: while fresh, `authorization_token` is valid for use against
/// `api_url`.
#[derive(Debug, Clone)]
pub struct CachedAuthorization {
    pub api_url: Url,
    pub authorization_token: String,
    pub fetched_at: DateTime<Utc>,
}

impl CachedAuthorization {
    fn from_response(auth: AuthorizeOk, fetched_at: DateTime<Utc>) -> Self {
        Self {
            api_url: auth.api_url,
            authorization_token: auth.authorization_token,
            fetched_at,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now <= self.fetched_at + Duration::hours(TOKEN_TTL_HOURS)
    }
}

/// Time source for freshness checks, injectable so expiry can be tested
/// without real time passing.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Single-slot authorization cache.
pub struct TokenCache {
    slot: RwLock<Option<CachedAuthorization>>,
    clock: Box<dyn Clock>,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            slot: RwLock::new(None),
            clock,
        }
    }

    /// Drop any cached authorization.
    pub async fn reset(&self) {
        *self.slot.write().await = None;
    }

    /// Return a valid account authorization, reusing the cached one when it
    /// is younger than the TTL (the dominant fast path - no network call).
    ///
    /// A stale or empty slot triggers an authorize call via `api`. The call
    /// runs outside the write lock, so concurrent requests that find the slot
    /// stale at the same moment may each re-authorize; the last write wins.
    /// On failure the slot is cleared - a token the provider just refused is
    /// never served again - and the error propagates to the caller.
    pub async fn get_valid(&self, api: &dyn B2Api, credentials: &Credentials) -> Result<CachedAuthorization> {
        let now = self.clock.now();
        if let Some(cached) = self.slot.read().await.as_ref() {
            if cached.is_fresh(now) {
                tracing::debug!("Reusing B2 authorization cached at {}", cached.fetched_at);
                return Ok(cached.clone());
            }
        }

        tracing::info!("Authorizing with Backblaze B2...");
        match api.authorize(credentials).await {
            Ok(auth) => {
                let cached = CachedAuthorization::from_response(auth, self.clock.now());
                *self.slot.write().await = Some(cached.clone());
                Ok(cached)
            }
            Err(err) => {
                *self.slot.write().await = None;
                Err(err)
            }
        }
    }

    #[cfg(test)]
    async fn is_empty(&self) -> bool {
        self.slot.read().await.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::b2::models::{FileListing, UploadGrant};
    use crate::errors::Error;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Clock that only moves when the test says so.
    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn at(now: DateTime<Utc>) -> Self {
            Self { now: Mutex::new(now) }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    /// Counts authorize calls and replays a scripted sequence of outcomes
    /// (`true` = success, `false` = provider rejection).
    struct ScriptedApi {
        calls: AtomicUsize,
        outcomes: Mutex<Vec<bool>>,
    }

    impl ScriptedApi {
        fn new(outcomes: Vec<bool>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcomes: Mutex::new(outcomes),
            }
        }

        fn authorize_calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl B2Api for ScriptedApi {
        async fn authorize(&self, _credentials: &Credentials) -> Result<AuthorizeOk> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let ok = self.outcomes.lock().unwrap().remove(0);
            if ok {
                Ok(AuthorizeOk {
                    api_url: Url::parse("https://api005.backblazeb2.com").unwrap(),
                    authorization_token: format!("token-{call}"),
                })
            } else {
                Err(Error::Authentication {
                    message: "bad credentials".to_string(),
                })
            }
        }

        async fn get_upload_url(&self, _auth: &CachedAuthorization, _bucket_id: &str) -> Result<UploadGrant> {
            unreachable!("cache tests never dispatch")
        }

        async fn list_file_names(&self, _auth: &CachedAuthorization, _bucket_id: &str) -> Result<FileListing> {
            unreachable!("cache tests never dispatch")
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            key_id: "key".to_string(),
            application_key: "secret".to_string(),
            bucket_id: "bucket".to_string(),
        }
    }

    fn fixed_instant() -> DateTime<Utc> {
        "2026-01-10T12:00:00Z".parse().unwrap()
    }

    #[tokio::test]
    async fn first_request_authorizes_and_caches() {
        let api = ScriptedApi::new(vec![true]);
        let cache = TokenCache::with_clock(Box::new(ManualClock::at(fixed_instant())));

        let auth = cache.get_valid(&api, &credentials()).await.unwrap();

        assert_eq!(auth.authorization_token, "token-0");
        assert_eq!(auth.fetched_at, fixed_instant());
        assert_eq!(api.authorize_calls(), 1);
    }

    #[tokio::test]
    async fn fresh_token_is_served_without_network() {
        let api = ScriptedApi::new(vec![true]);
        let cache = TokenCache::with_clock(Box::new(ManualClock::at(fixed_instant())));

        cache.get_valid(&api, &credentials()).await.unwrap();
        let again = cache.get_valid(&api, &credentials()).await.unwrap();

        assert_eq!(again.authorization_token, "token-0");
        assert_eq!(api.authorize_calls(), 1, "cache hit must not re-authorize");
    }

    #[test]
    fn freshness_boundary_is_23_hours() {
        let cached = CachedAuthorization {
            api_url: Url::parse("https://api005.backblazeb2.com").unwrap(),
            authorization_token: "t".to_string(),
            fetched_at: fixed_instant(),
        };

        assert!(cached.is_fresh(fixed_instant() + Duration::hours(23) - Duration::seconds(1)));
        assert!(!cached.is_fresh(fixed_instant() + Duration::hours(23) + Duration::seconds(1)));
    }

    #[tokio::test]
    async fn expired_token_triggers_exactly_one_refresh() {
        let api = ScriptedApi::new(vec![true, true]);
        let clock = std::sync::Arc::new(ManualClock::at(fixed_instant()));

        struct SharedClock(std::sync::Arc<ManualClock>);
        impl Clock for SharedClock {
            fn now(&self) -> DateTime<Utc> {
                self.0.now()
            }
        }

        let cache = TokenCache::with_clock(Box::new(SharedClock(clock.clone())));
        cache.get_valid(&api, &credentials()).await.unwrap();
        assert_eq!(api.authorize_calls(), 1);

        // Just inside the window: still a cache hit
        *clock.now.lock().unwrap() = fixed_instant() + Duration::hours(23) - Duration::seconds(1);
        let hit = cache.get_valid(&api, &credentials()).await.unwrap();
        assert_eq!(hit.authorization_token, "token-0");
        assert_eq!(api.authorize_calls(), 1);

        // Just past the window: exactly one re-authorize
        *clock.now.lock().unwrap() = fixed_instant() + Duration::hours(23) + Duration::seconds(1);
        let refreshed = cache.get_valid(&api, &credentials()).await.unwrap();
        assert_eq!(refreshed.authorization_token, "token-1");
        assert_eq!(api.authorize_calls(), 2);
    }

    #[tokio::test]
    async fn failed_authorize_clears_the_slot() {
        let api = ScriptedApi::new(vec![false, true]);
        let cache = TokenCache::with_clock(Box::new(ManualClock::at(fixed_instant())));

        let err = cache.get_valid(&api, &credentials()).await.unwrap_err();
        assert!(matches!(err, Error::Authentication { .. }));
        assert!(cache.is_empty().await, "a refused token must not be retained");

        // The immediately following request attempts a fresh authorize
        let auth = cache.get_valid(&api, &credentials()).await.unwrap();
        assert_eq!(auth.authorization_token, "token-1");
        assert_eq!(api.authorize_calls(), 2);
    }

    #[tokio::test]
    async fn reset_empties_the_slot() {
        let api = ScriptedApi::new(vec![true, true]);
        let cache = TokenCache::with_clock(Box::new(ManualClock::at(fixed_instant())));

        cache.get_valid(&api, &credentials()).await.unwrap();
        cache.reset().await;
        assert!(cache.is_empty().await);

        cache.get_valid(&api, &credentials()).await.unwrap();
        assert_eq!(api.authorize_calls(), 2);
    }
}
