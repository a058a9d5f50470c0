pub mod verifier;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{AppConfig, CredentialSource, IdentityConfig};
use crate::types::Identity;

pub use verifier::{JwtVerifier, TokenVerifier, VerifyError};

/// Errors raised while initializing the token verifier at startup
#[derive(Debug, Error)]
pub enum VerifierInitError {
    #[error("Missing configuration: {0}")]
    MissingCredential(&'static str),

    #[error("Failed to read service account file {path}: {source}")]
    CredentialFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid service account JSON: {0}")]
    InvalidCredential(#[from] serde_json::Error),

    #[error("Service account has an empty project_id")]
    MissingProjectId,

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// The fields of an identity provider service-account key this service uses
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    #[serde(rename = "type", default)]
    pub account_type: Option<String>,
    pub project_id: String,
    #[serde(default)]
    pub client_email: Option<String>,
}

impl ServiceAccount {
    pub fn from_json(json: &str) -> Result<Self, VerifierInitError> {
        let account: ServiceAccount = serde_json::from_str(json)?;
        if account.project_id.trim().is_empty() {
            return Err(VerifierInitError::MissingProjectId);
        }
        Ok(account)
    }

    pub fn load(source: &CredentialSource) -> Result<Self, VerifierInitError> {
        match source {
            CredentialSource::Inline(Some(json)) => Self::from_json(json),
            CredentialSource::Inline(None) => {
                Err(VerifierInitError::MissingCredential("FIREBASE_SERVICE_ACCOUNT"))
            }
            CredentialSource::File(path) => {
                let json = std::fs::read_to_string(path).map_err(|source| {
                    VerifierInitError::CredentialFile {
                        path: path.clone(),
                        source,
                    }
                })?;
                Self::from_json(&json)
            }
        }
    }
}

/// Process-wide token verification handle.
///
/// Either wraps a ready verifier or records why none could be built, in which
/// case every verification fails with `ServiceUnavailable`.
#[derive(Clone)]
pub struct Verifier {
    inner: Result<Arc<dyn TokenVerifier>, Arc<str>>,
}

impl Verifier {
    pub fn new(verifier: impl TokenVerifier + 'static) -> Self {
        Self {
            inner: Ok(Arc::new(verifier)),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        let reason: String = reason.into();
        Self {
            inner: Err(Arc::from(reason)),
        }
    }

    /// Build the verifier from configuration.
    ///
    /// Outside production a failure degrades to an unavailable verifier so the
    /// public routes keep serving; in production it is returned to the caller.
    pub fn initialize(config: &AppConfig) -> Result<Self, VerifierInitError> {
        match Self::build(&config.identity) {
            Ok(verifier) => Ok(verifier),
            Err(e) if config.is_production() => Err(e),
            Err(e) => {
                warn!("Token verifier not initialized, protected routes will return 503: {}", e);
                Ok(Self::unavailable(e.to_string()))
            }
        }
    }

    fn build(identity: &IdentityConfig) -> Result<Self, VerifierInitError> {
        if let Some(secret) = &identity.jwt_secret {
            info!("Token verifier using shared HS256 secret");
            return Ok(Self::new(JwtVerifier::with_secret(secret)));
        }

        let account = ServiceAccount::load(&identity.credential)?;
        info!("Token verifier initialized for project {}", account.project_id);
        let verifier = JwtVerifier::for_project(
            &account.project_id,
            identity.jwks_url.clone(),
            Duration::from_secs(identity.jwks_refresh_secs),
            Duration::from_secs(identity.clock_skew_secs),
        )?;
        Ok(Self::new(verifier))
    }

    pub fn is_available(&self) -> bool {
        self.inner.is_ok()
    }

    pub async fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
        match &self.inner {
            Ok(verifier) => verifier.verify(token).await,
            Err(reason) => Err(VerifyError::ServiceUnavailable(reason.to_string())),
        }
    }
}
