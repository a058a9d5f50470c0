mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};

use common::TestApp;

const ALLOWED: &str = "https://moviemaster.example.com";

fn from_origin(method: Method, origin: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri("/api/movies")
        .header(header::ORIGIN, origin)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn listed_origin_is_allowed() {
    let app = TestApp::with_cors_origins(&[ALLOWED]);

    let res = app.request(from_origin(Method::GET, ALLOWED)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(
        res.headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        ALLOWED
    );
}

#[tokio::test]
async fn listed_origin_passes_preflight() {
    let app = TestApp::with_cors_origins(&[ALLOWED]);

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/movies")
        .header(header::ORIGIN, ALLOWED)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization,content-type")
        .body(Body::empty())
        .unwrap();
    let res = app.request(request).await;
    assert_eq!(
        res.headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        ALLOWED
    );
    let methods = res.headers[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap()
        .to_string();
    assert!(methods.contains("POST"), "{methods}");
}

#[tokio::test]
async fn unlisted_origin_gets_no_cors_headers() {
    let app = TestApp::with_cors_origins(&[ALLOWED]);

    let res = app
        .request(from_origin(Method::GET, "https://elsewhere.example.com"))
        .await;
    // the request itself is served; the browser enforces the missing header
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn no_configured_origins_allows_none() {
    let app = TestApp::with_cors_origins(&[]);
    let res = app.request(from_origin(Method::GET, ALLOWED)).await;
    assert!(res.headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn wildcard_allows_any_origin() {
    let app = TestApp::new();
    let res = app
        .request(from_origin(Method::GET, "https://elsewhere.example.com"))
        .await;
    assert_eq!(res.headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
}
