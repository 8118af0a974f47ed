//! HTTP handlers for store inventory endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::inventory::{AllInventoryReport, InventoryQuery, StoreInventoryReport};
use crate::services::InventoryService;
use crate::AppState;

/// Stock of a single store
pub async fn get_store_inventory(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(store_id): Path<Uuid>,
    Query(query): Query<InventoryQuery>,
) -> AppResult<Json<StoreInventoryReport>> {
    let service = InventoryService::new(state.db);
    let report = service
        .store_inventory(&current_user.0.actor(), store_id, query)
        .await?;
    Ok(Json(report))
}

/// Stock of every store
pub async fn get_all_inventory(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<InventoryQuery>,
) -> AppResult<Json<AllInventoryReport>> {
    let service = InventoryService::new(state.db);
    let report = service
        .all_inventory(&current_user.0.actor(), query)
        .await?;
    Ok(Json(report))
}
