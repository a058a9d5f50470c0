use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::SecurityConfig;
use crate::handlers::{protected, public};
use crate::middleware::require_identity;
use crate::state::AppState;

/// Full application router
pub fn app(state: AppState, security: &SecurityConfig) -> Router {
    Router::new()
        .merge(public_routes())
        .merge(protected_routes(state.clone()))
        .with_state(state)
        // Global middleware
        .layer(cors_layer(security))
        .layer(TraceLayer::new_for_http())
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .route("/api/movies", get(public::movie_list))
        .route("/api/movies/:id", get(public::movie_get))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Catalog mutations
        .route("/api/movies", post(protected::movie_create))
        .route(
            "/api/movies/:id",
            put(protected::movie_update).delete(protected::movie_delete),
        )
        // Watchlist
        .route("/api/watchListInsert", post(protected::watchlist_insert))
        .route("/api/myWatchList/:addedBy", get(protected::watchlist_list))
        .route(
            "/api/watchListDelete/:addedBy/:movieId",
            delete(protected::watchlist_delete),
        )
        .route(
            "/api/watchlist/check/:addedBy/:movieId",
            get(protected::watchlist_check),
        )
        .route_layer(middleware::from_fn_with_state(state, require_identity))
}

/// `*` allows any origin; otherwise only the listed origins
fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if security.cors_origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}
