use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const GOOGLE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub identity: IdentityConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Where the identity provider's service-account credential comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialSource {
    /// Inline JSON (production). `None` when the variable is unset.
    Inline(Option<String>),
    /// Local file (development and staging)
    File(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub credential: CredentialSource,
    /// Shared HS256 secret; replaces the provider key set when present
    pub jwt_secret: Option<String>,
    pub jwks_url: String,
    pub jwks_refresh_secs: u64,
    pub clock_skew_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Allowed browser origins; `"*"` allows any
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let environment = match lookup("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_overrides(lookup)
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        // Server overrides
        if let Some(v) = lookup("HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }

        // Database overrides
        if let Some(v) = lookup("DATABASE_URL").or_else(|| lookup("MONGO_URI")) {
            self.database.url = v;
        }

        // Identity overrides
        match &mut self.identity.credential {
            CredentialSource::Inline(json) => *json = lookup("FIREBASE_SERVICE_ACCOUNT"),
            CredentialSource::File(path) => {
                if let Some(v) = lookup("FIREBASE_SERVICE_ACCOUNT_PATH") {
                    *path = PathBuf::from(v);
                }
            }
        }
        if let Some(v) = lookup("AUTH_JWT_SECRET").filter(|s| !s.is_empty()) {
            self.identity.jwt_secret = Some(v);
        }
        if let Some(v) = lookup("AUTH_JWKS_URL") {
            self.identity.jwks_url = v;
        }
        if let Some(v) = lookup("AUTH_JWKS_REFRESH_SECS") {
            self.identity.jwks_refresh_secs = v.parse().unwrap_or(self.identity.jwks_refresh_secs);
        }
        if let Some(v) = lookup("AUTH_CLOCK_SKEW_SECS") {
            self.identity.clock_skew_secs = v.parse().unwrap_or(self.identity.clock_skew_secs);
        }

        // Security overrides
        if let Some(v) = lookup("CORS_ORIGINS") {
            self.security.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        self
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
            },
            database: DatabaseConfig {
                url: "memory://moviemasterdb".to_string(),
            },
            identity: IdentityConfig {
                credential: CredentialSource::File(PathBuf::from("serviceAccountKey.json")),
                jwt_secret: None,
                jwks_url: GOOGLE_JWKS_URL.to_string(),
                jwks_refresh_secs: 3600,
                clock_skew_secs: 60,
            },
            security: SecurityConfig {
                cors_origins: vec!["*".to_string()],
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            security: SecurityConfig {
                cors_origins: Vec::new(),
            },
            ..Self::development()
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            identity: IdentityConfig {
                credential: CredentialSource::Inline(None),
                clock_skew_secs: 5,
                ..Self::development().identity
            },
            security: SecurityConfig {
                cors_origins: Vec::new(),
            },
            ..Self::development()
        }
    }
}
