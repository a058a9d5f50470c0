use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};

use crate::database::{filter_of, Document, ID_FIELD};
use crate::error::{ApiError, DeleteError};
use crate::handlers::utils::{parse_object_id, timestamp, JsonObject, PathParams};
use crate::state::AppState;
use crate::types::{Collection, Identity};

/// POST /api/movies - store arbitrary movie fields, stamped with `createdAt`
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    JsonObject(mut movie): JsonObject,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    movie.insert("createdAt".to_string(), timestamp());

    let db = state.db().await?;
    let id = db
        .store()
        .insert_one(Collection::Movies.name(), movie.clone())
        .await?;
    tracing::info!("Movie {} created by {}", id, identity.uid);

    movie.insert(ID_FIELD.to_string(), id.into());
    Ok((StatusCode::CREATED, Json(movie)))
}

/// PUT /api/movies/:id - merge supplied fields, stamped with `updatedAt`
pub async fn update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    PathParams(id): PathParams<String>,
    JsonObject(mut fields): JsonObject,
) -> Result<Json<Value>, ApiError> {
    let id = parse_object_id(&id)?;
    fields.insert("updatedAt".to_string(), timestamp());

    let db = state.db().await?;
    let result = db
        .store()
        .update_one(Collection::Movies.name(), &filter_of([(ID_FIELD, id)]), fields)
        .await?;
    if result.matched_count == 0 {
        return Err(ApiError::not_found());
    }

    tracing::info!("Movie {} updated by {}", id, identity.uid);
    Ok(Json(json!({ "message": "Updated" })))
}

/// DELETE /api/movies/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    params: Result<PathParams<String>, ApiError>,
) -> Result<Json<Value>, DeleteError> {
    let PathParams(id) = params?;
    let id = parse_object_id(&id)?;

    let db = state.db().await?;
    let result = db
        .store()
        .delete_one(Collection::Movies.name(), &filter_of([(ID_FIELD, id)]))
        .await?;
    if result.deleted_count == 0 {
        return Err(ApiError::not_found().into());
    }

    tracing::info!("Movie {} deleted by {}", id, identity.uid);
    Ok(Json(json!({ "success": true, "message": "Deleted" })))
}
