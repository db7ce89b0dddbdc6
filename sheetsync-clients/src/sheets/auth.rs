//! Service account authentication for the Sheets backend.
//!
//! A service account key is exchanged for a short-lived bearer token:
//!
//! 1. Sign an RS256 assertion `{iss, sub, aud, iat, exp, scope}` with the
//!    account's private key.
//! 2. POST it to the key's `token_uri` using the JWT bearer grant.
//! 3. Cache the returned access token until shortly before it expires.
//!
//! [`TokenCache`] owns the token for one backend instance. Callers always go
//! through [`TokenCache::bearer`], which refreshes proactively and never
//! hands out a token past its refresh point.

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sheetsync_core::constants::{SHEETS_SCOPE, TOKEN_LIFETIME_SECS, TOKEN_REFRESH_SKEW_SECS};
use sheetsync_core::{BackendError, ConfigError};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Clock used for assertion timestamps and token expiry checks.
///
/// Injected so token refresh can be tested deterministically.
pub trait Clock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

// ============================================================================
// SERVICE ACCOUNT KEY
// ============================================================================

#[derive(Deserialize)]
struct RawServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

/// Credentials of a service account, as found in its JSON key file.
#[derive(Clone)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub token_uri: String,
    private_key: SecretString,
}

impl ServiceAccountKey {
    /// Parse a JSON key. Unknown fields are ignored.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawServiceAccountKey =
            serde_json::from_str(json).map_err(|e| ConfigError::Credentials {
                path: "<inline>".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client_email: raw.client_email,
            token_uri: raw.token_uri,
            private_key: SecretString::new(raw.private_key.into()),
        })
    }

    /// Load a JSON key file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Credentials {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&contents).map_err(|e| match e {
            ConfigError::Credentials { reason, .. } => ConfigError::Credentials {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    fn encoding_key(&self) -> Result<EncodingKey, ConfigError> {
        EncodingKey::from_rsa_pem(self.private_key.expose_secret().as_bytes()).map_err(|e| {
            ConfigError::Credentials {
                path: self.client_email.clone(),
                reason: format!("invalid RSA private key: {}", e),
            }
        })
    }
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Claims of the signed grant assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub scope: String,
}

impl AssertionClaims {
    pub fn new(key: &ServiceAccountKey, scope: &str, now: i64) -> Self {
        Self {
            iss: key.client_email.clone(),
            sub: key.client_email.clone(),
            aud: key.token_uri.clone(),
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
            scope: scope.to_string(),
        }
    }
}

// ============================================================================
// ACCESS TOKENS
// ============================================================================

/// A bearer token and the epoch second at which it stops being valid.
#[derive(Clone)]
pub struct AccessToken {
    value: SecretString,
    expires_at: i64,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: i64) -> Self {
        Self {
            value: SecretString::new(value.into().into()),
            expires_at,
        }
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Whether the token can still be handed out at `now`, keeping `skew`
    /// seconds of headroom before expiry.
    pub fn is_fresh(&self, now: i64, skew: i64) -> bool {
        now + skew < self.expires_at
    }

    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Something that can mint a fresh access token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken, BackendError>;
}

/// A pre-issued token that never refreshes. Useful against emulators and in
/// tests.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: AccessToken,
}

impl StaticTokenSource {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(value, i64::MAX),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken, BackendError> {
        Ok(self.token.clone())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

/// Exchanges signed service account assertions for access tokens.
pub struct ServiceAccountTokenSource {
    http: reqwest::Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    scope: String,
    clock: Arc<dyn Clock>,
}

impl ServiceAccountTokenSource {
    /// Create a token source for the spreadsheets scope.
    ///
    /// # Errors
    /// Returns `ConfigError::Credentials` if the private key is not a valid
    /// RSA PEM.
    pub fn new(
        http: reqwest::Client,
        key: ServiceAccountKey,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let encoding_key = key.encoding_key()?;
        Ok(Self {
            http,
            key,
            encoding_key,
            scope: SHEETS_SCOPE.to_string(),
            clock,
        })
    }

    /// Sign a grant assertion for `now`.
    pub fn sign_assertion(&self, now: i64) -> Result<String, BackendError> {
        let claims = AssertionClaims::new(&self.key, &self.scope, now);
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key).map_err(|e| {
            BackendError::unavailable("authenticate", format!("failed to sign assertion: {}", e))
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken, BackendError> {
        let now = self.clock.now_epoch_secs();
        let assertion = self.sign_assertion(now)?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| BackendError::unavailable("authenticate", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::unavailable(
                "authenticate",
                format!("token endpoint returned {}: {}", status, body),
            ));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| BackendError::protocol("authenticate", e.to_string()))?;

        let access_token = body.access_token.ok_or_else(|| {
            BackendError::protocol("authenticate", "token response has no access_token")
        })?;
        let lifetime = body.expires_in.unwrap_or(TOKEN_LIFETIME_SECS);

        tracing::debug!(
            client_email = %self.key.client_email,
            expires_in = lifetime,
            "Obtained backend access token"
        );

        Ok(AccessToken::new(access_token, now + lifetime))
    }
}

impl std::fmt::Debug for ServiceAccountTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokenSource")
            .field("key", &self.key)
            .field("scope", &self.scope)
            .finish()
    }
}

// ============================================================================
// TOKEN CACHE
// ============================================================================

/// Shared, proactively refreshed bearer token for one backend instance.
///
/// Reads share the lock. A refresh takes the write lock and re-checks
/// freshness first, so concurrent callers that all saw a stale token trigger
/// exactly one exchange, and any call that starts after the refresh sees the
/// new token.
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    clock: Arc<dyn Clock>,
    refresh_skew_secs: i64,
    current: RwLock<Option<AccessToken>>,
}

impl TokenCache {
    pub fn new(source: Arc<dyn TokenSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            refresh_skew_secs: TOKEN_REFRESH_SKEW_SECS,
            current: RwLock::new(None),
        }
    }

    /// Set the headroom kept before expiry.
    pub fn with_refresh_skew(mut self, secs: i64) -> Self {
        self.refresh_skew_secs = secs;
        self
    }

    /// A token valid for at least the refresh skew.
    pub async fn bearer(&self) -> Result<AccessToken, BackendError> {
        {
            let guard = self.current.read().await;
            if let Some(token) = guard.as_ref() {
                if token.is_fresh(self.clock.now_epoch_secs(), self.refresh_skew_secs) {
                    return Ok(token.clone());
                }
            }
        }

        let mut guard = self.current.write().await;
        if let Some(token) = guard.as_ref() {
            if token.is_fresh(self.clock.now_epoch_secs(), self.refresh_skew_secs) {
                return Ok(token.clone());
            }
        }

        let token = self.source.fetch_token().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token, e.g. after the backend rejected it.
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("refresh_skew_secs", &self.refresh_skew_secs)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

    struct ManualClock(AtomicI64);

    impl Clock for ManualClock {
        fn now_epoch_secs(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Issues numbered tokens valid for one hour from the shared clock.
    struct CountingSource {
        clock: Arc<ManualClock>,
        issued: AtomicU64,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self) -> Result<AccessToken, BackendError> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(AccessToken::new(
                format!("token-{}", n),
                self.clock.now_epoch_secs() + TOKEN_LIFETIME_SECS,
            ))
        }
    }

    fn cache_at(start: i64) -> (Arc<ManualClock>, Arc<CountingSource>, TokenCache) {
        let clock = Arc::new(ManualClock(AtomicI64::new(start)));
        let source = Arc::new(CountingSource {
            clock: Arc::clone(&clock),
            issued: AtomicU64::new(0),
        });
        let cache = TokenCache::new(source.clone(), clock.clone());
        (clock, source, cache)
    }

    #[test]
    fn test_access_token_freshness() {
        let token = AccessToken::new("t", 1_000);
        assert!(token.is_fresh(900, 60));
        assert!(!token.is_fresh(940, 60));
        assert!(!token.is_fresh(1_000, 0));
    }

    #[test]
    fn test_assertion_claims() {
        let key = ServiceAccountKey::from_json(
            r#"{
                "client_email": "svc@example.iam",
                "private_key": "x",
                "token_uri": "https://oauth.example/token"
            }"#,
        )
        .unwrap();
        let claims = AssertionClaims::new(&key, SHEETS_SCOPE, 1_704_067_200);
        assert_eq!(claims.iss, "svc@example.iam");
        assert_eq!(claims.sub, claims.iss);
        assert_eq!(claims.aud, "https://oauth.example/token");
        assert_eq!(claims.exp - claims.iat, TOKEN_LIFETIME_SECS);
        assert_eq!(claims.scope, SHEETS_SCOPE);
    }

    #[test]
    fn test_key_debug_redacts_private_key() {
        let key = ServiceAccountKey::from_json(
            r#"{"client_email":"svc@example.iam","private_key":"SECRET","token_uri":"t"}"#,
        )
        .unwrap();
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains("SECRET"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_key_from_json_rejects_missing_fields() {
        let err = ServiceAccountKey::from_json(r#"{"client_email":"svc"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Credentials { .. }));
    }

    #[test]
    fn test_token_source_rejects_bad_pem() {
        let key = ServiceAccountKey::from_json(
            r#"{"client_email":"svc","private_key":"not a pem","token_uri":"t"}"#,
        )
        .unwrap();
        let result =
            ServiceAccountTokenSource::new(reqwest::Client::new(), key, Arc::new(SystemClock));
        assert!(matches!(result, Err(ConfigError::Credentials { .. })));
    }

    #[tokio::test]
    async fn test_cache_reuses_fresh_token() {
        let (clock, source, cache) = cache_at(1_000);

        let first = cache.bearer().await.unwrap();
        clock.0.store(1_000 + 1_800, Ordering::SeqCst);
        let second = cache.bearer().await.unwrap();

        assert_eq!(first.expose(), "token-1");
        assert_eq!(second.expose(), "token-1");
        assert_eq!(source.issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_refreshes_before_expiry() {
        let (clock, source, cache) = cache_at(1_000);

        cache.bearer().await.unwrap();
        // Inside the refresh skew but before the stated expiry.
        clock.0.store(1_000 + TOKEN_LIFETIME_SECS - 30, Ordering::SeqCst);
        let refreshed = cache.bearer().await.unwrap();

        assert_eq!(refreshed.expose(), "token-2");
        assert_eq!(source.issued.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_zero_skew_keeps_token_until_expiry() {
        let (clock, source, cache) = cache_at(1_000);
        let cache = cache.with_refresh_skew(0);

        cache.bearer().await.unwrap();
        clock.0.store(1_000 + TOKEN_LIFETIME_SECS - 30, Ordering::SeqCst);
        assert_eq!(cache.bearer().await.unwrap().expose(), "token-1");

        clock.0.store(1_000 + TOKEN_LIFETIME_SECS, Ordering::SeqCst);
        assert_eq!(cache.bearer().await.unwrap().expose(), "token-2");
        assert_eq!(source.issued.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_concurrent_callers_share_one_refresh() {
        let (_clock, source, cache) = cache_at(1_000);
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.bearer().await.unwrap().expose().to_string() })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "token-1");
        }
        assert_eq!(source.issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_invalidate_forces_refresh() {
        let (_clock, source, cache) = cache_at(1_000);

        cache.bearer().await.unwrap();
        cache.invalidate().await;
        let next = cache.bearer().await.unwrap();

        assert_eq!(next.expose(), "token-2");
        assert_eq!(source.issued.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_static_source_never_expires() {
        let cache = TokenCache::new(
            Arc::new(StaticTokenSource::new("fixed")),
            Arc::new(FixedClock(1_704_067_200)),
        );
        assert_eq!(cache.bearer().await.unwrap().expose(), "fixed");
    }
}
