//! Transfer HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{ListResponse, TransferDetails};
use crate::repositories::PgStockStore;
use crate::services::transfer::CreateTransferInput;
use crate::services::TransferWorkflow;
use crate::middleware::CurrentUser;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TransferListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

fn workflow(state: &AppState) -> TransferWorkflow<PgStockStore> {
    TransferWorkflow::new(PgStockStore::new(state.db.clone()), &state.config.transfers)
}

/// List transfers visible to the current user
pub async fn list_transfers(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<TransferListQuery>,
) -> AppResult<Json<ListResponse<TransferDetails>>> {
    let transfers = workflow(&state)
        .list_transfers(&current_user.0.actor(), query.status.as_deref())
        .await?;
    Ok(Json(transfers.into()))
}

/// Get a single transfer
pub async fn get_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<TransferDetails>> {
    let transfer = workflow(&state)
        .get_transfer(&current_user.0.actor(), transfer_id)
        .await?;
    Ok(Json(transfer))
}

/// Create a pending transfer
pub async fn create_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateTransferInput>,
) -> AppResult<(StatusCode, Json<TransferDetails>)> {
    let transfer = workflow(&state)
        .create_transfer(&current_user.0.actor(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

/// Ship, receive or cancel a transfer
pub async fn update_transfer_status(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(transfer_id): Path<Uuid>,
    Json(body): Json<UpdateStatusRequest>,
) -> AppResult<Json<TransferDetails>> {
    let transfer = workflow(&state)
        .request_transition(
            transfer_id,
            body.status.as_deref(),
            &current_user.0.actor(),
        )
        .await?;
    Ok(Json(transfer))
}

/// Delete a pending transfer
pub async fn delete_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    workflow(&state)
        .delete_transfer(&current_user.0.actor(), transfer_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
