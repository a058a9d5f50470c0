#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

use moviemaster_api::auth::{JwtVerifier, Verifier};
use moviemaster_api::config::SecurityConfig;
use moviemaster_api::database::ConnectionManager;
use moviemaster_api::AppState;

pub const SECRET: &str = "integration-test-secret";

/// In-process application backed by a fresh volatile store
pub struct TestApp {
    router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub text: String,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_verifier(Verifier::new(JwtVerifier::with_secret(SECRET)))
    }

    pub fn with_verifier(verifier: Verifier) -> Self {
        Self::build("memory://test", verifier)
    }

    pub fn with_database_url(url: &str) -> Self {
        Self::build(url, Verifier::new(JwtVerifier::with_secret(SECRET)))
    }

    pub fn with_cors_origins(origins: &[&str]) -> Self {
        let security = SecurityConfig {
            cors_origins: origins.iter().map(|o| o.to_string()).collect(),
        };
        Self::build_with(
            "memory://test",
            Verifier::new(JwtVerifier::with_secret(SECRET)),
            security,
        )
    }

    fn build(url: &str, verifier: Verifier) -> Self {
        let security = SecurityConfig {
            cors_origins: vec!["*".to_string()],
        };
        Self::build_with(url, verifier, security)
    }

    fn build_with(url: &str, verifier: Verifier, security: SecurityConfig) -> Self {
        let state = AppState::new(ConnectionManager::from_url(url), verifier);
        Self {
            router: moviemaster_api::app(state, &security),
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        self.request(builder.body(body).unwrap()).await
    }

    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
            text,
        }
    }

    pub async fn get(&self, uri: &str, user: Option<&str>) -> TestResponse {
        let auth = user.map(bearer);
        self.send(Method::GET, uri, auth.as_deref(), None).await
    }

    pub async fn post(&self, uri: &str, user: &str, body: Value) -> TestResponse {
        self.send(Method::POST, uri, Some(&bearer(user)), Some(body)).await
    }

    pub async fn put(&self, uri: &str, user: &str, body: Value) -> TestResponse {
        self.send(Method::PUT, uri, Some(&bearer(user)), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, user: &str) -> TestResponse {
        self.send(Method::DELETE, uri, Some(&bearer(user)), None).await
    }
}

/// Signed token for `uid`, valid for an hour
pub fn token_for(uid: &str) -> String {
    let claims = json!({
        "sub": uid,
        "email": format!("{}@example.com", uid),
        "iat": chrono::Utc::now().timestamp(),
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn bearer(uid: &str) -> String {
    format!("Bearer {}", token_for(uid))
}
