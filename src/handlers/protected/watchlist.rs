use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};

use crate::database::{filter_of, Document, Filter, StoreError, ID_FIELD};
use crate::error::{ApiError, DeleteError};
use crate::handlers::utils::{timestamp, JsonObject, PathParams};
use crate::state::AppState;
use crate::types::{Collection, Identity};

/// The path owner must be the caller
fn ensure_owner(identity: &Identity, owner: &str) -> Result<(), ApiError> {
    if identity.owns(owner) {
        Ok(())
    } else {
        tracing::warn!("{} tried to access the watchlist of {}", identity.uid, owner);
        Err(ApiError::forbidden("Forbidden"))
    }
}

fn entry_filter(owner: &str, movie_id: &str) -> Filter {
    filter_of([("addedBy", owner), ("movieId", movie_id)])
}

/// POST /api/watchListInsert - add an entry owned by the caller
pub async fn insert(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    JsonObject(mut entry): JsonObject,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    match entry.get("movieId") {
        Some(Value::String(id)) if !id.is_empty() => {}
        _ => return Err(ApiError::bad_request("movieId must be a non-empty string")),
    }
    // never trust a client-supplied owner
    entry.insert("addedBy".to_string(), Value::String(identity.uid.clone()));
    entry.insert("createdAt".to_string(), timestamp());

    let db = state.db().await?;
    let id = match db
        .store()
        .insert_one(Collection::WatchList.name(), entry.clone())
        .await
    {
        Ok(id) => id,
        Err(StoreError::DuplicateKey { .. }) => {
            return Err(ApiError::conflict("Already in watchlist"));
        }
        Err(e) => return Err(e.into()),
    };

    entry.insert(ID_FIELD.to_string(), id.into());
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /api/myWatchList/:addedBy - the caller's entries; empty is `[]`
pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    PathParams(added_by): PathParams<String>,
) -> Result<Json<Vec<Document>>, ApiError> {
    ensure_owner(&identity, &added_by)?;

    let db = state.db().await?;
    let entries = db
        .store()
        .find(Collection::WatchList.name(), &filter_of([("addedBy", added_by)]))
        .await?;
    Ok(Json(entries))
}

/// DELETE /api/watchListDelete/:addedBy/:movieId
pub async fn delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    params: Result<PathParams<(String, String)>, ApiError>,
) -> Result<Json<Value>, DeleteError> {
    let PathParams((added_by, movie_id)) = params?;
    ensure_owner(&identity, &added_by)?;

    let db = state.db().await?;
    let result = db
        .store()
        .delete_one(Collection::WatchList.name(), &entry_filter(&added_by, &movie_id))
        .await?;
    if result.deleted_count == 0 {
        return Err(ApiError::not_found().into());
    }

    Ok(Json(json!({ "success": true, "message": "Removed from watchlist" })))
}

/// GET /api/watchlist/check/:addedBy/:movieId - `{ inWatchlist }`, never 404
pub async fn check(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    PathParams((added_by, movie_id)): PathParams<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    ensure_owner(&identity, &added_by)?;

    let db = state.db().await?;
    let entry = db
        .store()
        .find_one(Collection::WatchList.name(), &entry_filter(&added_by, &movie_id))
        .await?;
    Ok(Json(json!({ "inWatchlist": entry.is_some() })))
}
