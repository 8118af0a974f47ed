//! Batch HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{require_role, CurrentUser};
use crate::models::{ListResponse, Role};
use crate::services::batch::{BatchQuery, BatchView, CreateBatchInput, UpdateBatchInput};
use crate::services::BatchService;
use crate::AppState;

/// List batches
pub async fn list_batches(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<BatchQuery>,
) -> AppResult<Json<ListResponse<BatchView>>> {
    let service = BatchService::new(state.db);
    let batches = service.list_batches(query).await?;
    Ok(Json(batches.into()))
}

/// Get a batch
pub async fn get_batch(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<BatchView>> {
    let service = BatchService::new(state.db);
    Ok(Json(service.get_batch(batch_id).await?))
}

/// Register a batch
pub async fn create_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateBatchInput>,
) -> AppResult<(StatusCode, Json<BatchView>)> {
    require_role(
        &current_user.0,
        &[Role::Admin, Role::Manager, Role::KitchenStaff],
    )?;
    let service = BatchService::new(state.db);
    let batch = service.create_batch(input).await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

/// Update a batch
pub async fn update_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<UpdateBatchInput>,
) -> AppResult<Json<BatchView>> {
    require_role(&current_user.0, &[Role::Admin, Role::Manager])?;
    let service = BatchService::new(state.db);
    let batch = service.update_batch(batch_id, input).await?;
    Ok(Json(batch))
}

/// Delete a batch
pub async fn delete_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(batch_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_role(&current_user.0, &[Role::Admin, Role::Manager])?;
    let service = BatchService::new(state.db);
    service.delete_batch(batch_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
