use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::VerifierInitError;
use crate::types::Identity;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Malformed, expired or wrongly signed token
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// The verifier was never initialized
    #[error("verifier unavailable: {0}")]
    ServiceUnavailable(String),

    /// Unexpected fault while verifying (e.g. key set fetch failed)
    #[error("verifier fault: {0}")]
    Internal(String),
}

/// Maps a raw bearer token to a verified identity
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, VerifyError>;
}

enum KeySource {
    Secret(DecodingKey),
    Jwks(JwksSource),
}

struct JwksSource {
    url: String,
    http: reqwest::Client,
    refresh_ttl: Duration,
    cache: RwLock<JwksCache>,
}

/// Delay before retrying a key set fetch that failed
const FAILED_FETCH_RETRY: Duration = Duration::from_secs(10);

#[derive(Default)]
struct JwksCache {
    jwks: Option<JwkSet>,
    attempted_at: Option<Instant>,
    last_fetch_failed: bool,
}

/// JWT verifier backed by either a shared secret (HS256) or the identity
/// provider's published key set (RS256).
pub struct JwtVerifier {
    keys: KeySource,
    validation: Validation,
    check_issue_times: bool,
}

impl JwtVerifier {
    /// HS256 tokens signed with `secret`; issuer and audience are not checked
    pub fn with_secret(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.leeway = 60;
        Self {
            keys: KeySource::Secret(DecodingKey::from_secret(secret.as_bytes())),
            validation,
            check_issue_times: false,
        }
    }

    /// RS256 ID tokens issued for `project_id`, checked against the key set at `jwks_url`
    pub fn for_project(
        project_id: &str,
        jwks_url: impl Into<String>,
        refresh_ttl: Duration,
        leeway: Duration,
    ) -> Result<Self, VerifierInitError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| VerifierInitError::HttpClient(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", project_id)]);
        validation.set_audience(&[project_id]);
        validation.leeway = leeway.as_secs();

        Ok(Self {
            keys: KeySource::Jwks(JwksSource {
                url: jwks_url.into(),
                http,
                refresh_ttl,
                cache: RwLock::new(JwksCache::default()),
            }),
            validation,
            check_issue_times: true,
        })
    }

    async fn decoding_key(&self, token: &str) -> Result<DecodingKey, VerifyError> {
        match &self.keys {
            KeySource::Secret(key) => Ok(key.clone()),
            KeySource::Jwks(source) => {
                let header = decode_header(token)
                    .map_err(|e| VerifyError::InvalidToken(format!("bad header: {}", e)))?;
                if header.alg != Algorithm::RS256 {
                    return Err(VerifyError::InvalidToken(format!(
                        "unsupported alg {:?}",
                        header.alg
                    )));
                }
                let kid = header
                    .kid
                    .ok_or_else(|| VerifyError::InvalidToken("header missing kid".to_string()))?;
                source.key_for_kid(&kid).await
            }
        }
    }
}

impl JwksSource {
    async fn key_for_kid(&self, kid: &str) -> Result<DecodingKey, VerifyError> {
        {
            let cache = self.cache.read().await;
            if let Some(key) = cache.key_for_kid(kid)? {
                return Ok(key);
            }
            if !cache.refresh_due(self.refresh_ttl) {
                return Err(cache.miss(kid));
            }
        }

        // Claim the refresh, then fetch without holding the lock so tokens
        // with known keys keep verifying meanwhile.
        {
            let mut cache = self.cache.write().await;
            if let Some(key) = cache.key_for_kid(kid)? {
                return Ok(key);
            }
            if !cache.refresh_due(self.refresh_ttl) {
                return Err(cache.miss(kid));
            }
            cache.attempted_at = Some(Instant::now());
        }

        let fetched = self.fetch().await;
        let mut cache = self.cache.write().await;
        match fetched {
            Ok(jwks) => {
                cache.jwks = Some(jwks);
                cache.last_fetch_failed = false;
            }
            Err(e) => {
                cache.last_fetch_failed = true;
                return Err(e);
            }
        }
        cache.key_for_kid(kid)?.ok_or_else(|| cache.miss(kid))
    }

    async fn fetch(&self) -> Result<JwkSet, VerifyError> {
        let jwks = self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| VerifyError::Internal(format!("failed to fetch key set: {}", e)))?
            .json::<JwkSet>()
            .await
            .map_err(|e| VerifyError::Internal(format!("failed to parse key set: {}", e)))?;
        info!("Fetched {} signing keys from {}", jwks.keys.len(), self.url);
        Ok(jwks)
    }
}

impl JwksCache {
    /// One fetch per TTL, or per retry delay after a failure
    fn refresh_due(&self, refresh_ttl: Duration) -> bool {
        let wait = if self.last_fetch_failed {
            FAILED_FETCH_RETRY.min(refresh_ttl)
        } else {
            refresh_ttl
        };
        self.attempted_at.map_or(true, |at| at.elapsed() > wait)
    }

    fn miss(&self, kid: &str) -> VerifyError {
        match self.jwks {
            Some(_) => VerifyError::InvalidToken(format!("unknown kid {}", kid)),
            None => VerifyError::Internal("signing keys unavailable".to_string()),
        }
    }

    fn key_for_kid(&self, kid: &str) -> Result<Option<DecodingKey>, VerifyError> {
        let Some(jwk) = self.jwks.as_ref().and_then(|set| set.find(kid)) else {
            return Ok(None);
        };
        DecodingKey::from_jwk(jwk)
            .map(Some)
            .map_err(|e| VerifyError::Internal(format!("unusable signing key {}: {}", kid, e)))
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
        let key = self.decoding_key(token).await?;
        let decoded = decode::<Map<String, Value>>(token, &key, &self.validation)
            .map_err(|e| VerifyError::InvalidToken(e.to_string()))?;
        if self.check_issue_times {
            check_issue_times(&decoded.claims, self.validation.leeway)?;
        }
        let identity = identity_from_claims(decoded.claims)?;
        debug!("Verified token for {}", identity.uid);
        Ok(identity)
    }
}

/// Provider tokens must carry `iat` and `auth_time`, neither in the future
fn check_issue_times(claims: &Map<String, Value>, leeway: u64) -> Result<(), VerifyError> {
    let latest = chrono::Utc::now().timestamp() + leeway as i64;
    for claim in ["iat", "auth_time"] {
        let at = claims
            .get(claim)
            .and_then(Value::as_i64)
            .ok_or_else(|| VerifyError::InvalidToken(format!("token has no {}", claim)))?;
        if at > latest {
            return Err(VerifyError::InvalidToken(format!("{} is in the future", claim)));
        }
    }
    Ok(())
}

/// Subject comes from `sub`, falling back to `user_id`
fn identity_from_claims(claims: Map<String, Value>) -> Result<Identity, VerifyError> {
    let uid = ["sub", "user_id"]
        .iter()
        .filter_map(|claim| claims.get(*claim).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .ok_or_else(|| VerifyError::InvalidToken("token has no subject".to_string()))?
        .to_string();
    let email = claims.get("email").and_then(Value::as_str).map(str::to_string);

    Ok(Identity { uid, email, claims })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "unit-test-secret";

    fn sign(claims: Value, secret: &str) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn in_one_hour() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn accepts_valid_hs256_token() {
        let verifier = JwtVerifier::with_secret(SECRET);
        let token = sign(
            json!({"sub": "user1", "email": "u1@example.com", "exp": in_one_hour()}),
            SECRET,
        );

        let identity = verifier.verify(&token).await.unwrap();
        assert_eq!(identity.uid, "user1");
        assert_eq!(identity.email.as_deref(), Some("u1@example.com"));
        assert_eq!(identity.claims["sub"], "user1");
    }

    #[tokio::test]
    async fn falls_back_to_user_id_claim() {
        let verifier = JwtVerifier::with_secret(SECRET);
        let token = sign(json!({"user_id": "user2", "exp": in_one_hour()}), SECRET);
        assert_eq!(verifier.verify(&token).await.unwrap().uid, "user2");
    }

    #[tokio::test]
    async fn rejects_bad_tokens() {
        let verifier = JwtVerifier::with_secret(SECRET);

        let wrong_secret = sign(json!({"sub": "u", "exp": in_one_hour()}), "other");
        let expired = sign(
            json!({"sub": "u", "exp": chrono::Utc::now().timestamp() - 3600}),
            SECRET,
        );
        let no_subject = sign(json!({"exp": in_one_hour()}), SECRET);

        for token in [wrong_secret.as_str(), expired.as_str(), no_subject.as_str(), "garbage"] {
            let err = verifier.verify(token).await.unwrap_err();
            assert!(matches!(err, VerifyError::InvalidToken(_)), "{token}: {err:?}");
        }
    }

    #[tokio::test]
    async fn project_verifier_rejects_non_rs256_without_fetching() {
        let verifier = JwtVerifier::for_project(
            "moviemaster",
            "http://127.0.0.1:9/unused",
            Duration::from_secs(60),
            Duration::from_secs(5),
        )
        .unwrap();
        let token = sign(json!({"sub": "u", "exp": in_one_hour()}), SECRET);

        let err = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(err, VerifyError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn project_verifier_reports_unreachable_key_set_as_fault() {
        let verifier = JwtVerifier::for_project(
            "moviemaster",
            "http://127.0.0.1:9/jwks",
            Duration::from_secs(60),
            Duration::from_secs(5),
        )
        .unwrap();
        // {"alg":"RS256","typ":"JWT","kid":"k1"} with an empty payload
        let token = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCIsImtpZCI6ImsxIn0.e30.c2ln";

        let err = verifier.verify(token).await.unwrap_err();
        assert!(matches!(err, VerifyError::Internal(_)), "{err:?}");
    }

    #[test]
    fn issue_times_must_be_present_and_past() {
        let now = chrono::Utc::now().timestamp();
        let claims = |value: Value| value.as_object().cloned().unwrap();

        assert!(check_issue_times(&claims(json!({"iat": now, "auth_time": now - 60})), 5).is_ok());
        // within leeway
        assert!(check_issue_times(&claims(json!({"iat": now + 3, "auth_time": now})), 5).is_ok());

        for bad in [
            json!({"iat": now + 600, "auth_time": now}),
            json!({"iat": now, "auth_time": now + 600}),
            json!({"auth_time": now}),
            json!({"iat": now}),
            json!({"iat": "yesterday", "auth_time": now}),
        ] {
            let err = check_issue_times(&claims(bad.clone()), 5).unwrap_err();
            assert!(matches!(err, VerifyError::InvalidToken(_)), "{bad}");
        }
    }

    #[tokio::test]
    async fn failed_key_set_fetch_is_not_retried_immediately() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let served = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                served.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });

        let verifier = JwtVerifier::for_project(
            "moviemaster",
            format!("http://{}/jwks", addr),
            Duration::from_secs(3600),
            Duration::from_secs(5),
        )
        .unwrap();
        // {"alg":"RS256","typ":"JWT","kid":"k1"} with an empty payload
        let token = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCIsImtpZCI6ImsxIn0.e30.c2ln";

        for _ in 0..3 {
            let err = verifier.verify(token).await.unwrap_err();
            assert!(matches!(err, VerifyError::Internal(_)), "{err:?}");
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
