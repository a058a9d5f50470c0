use axum::{
    extract::State,
    Json,
};

use crate::database::{filter_of, Document, Filter, ID_FIELD};
use crate::error::ApiError;
use crate::handlers::utils::{parse_object_id, PathParams};
use crate::state::AppState;
use crate::types::Collection;

/// GET /api/movies - every movie, in store order
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Document>>, ApiError> {
    let db = state.db().await?;
    let movies = db
        .store()
        .find(Collection::Movies.name(), &Filter::new())
        .await?;
    Ok(Json(movies))
}

/// GET /api/movies/:id
pub async fn get(
    State(state): State<AppState>,
    PathParams(id): PathParams<String>,
) -> Result<Json<Document>, ApiError> {
    let id = parse_object_id(&id)?;
    let db = state.db().await?;
    db.store()
        .find_one(Collection::Movies.name(), &filter_of([(ID_FIELD, id)]))
        .await?
        .map(Json)
        .ok_or_else(ApiError::not_found)
}
