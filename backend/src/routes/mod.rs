//! Route definitions for the Central Kitchen Platform

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Auth routes
        .nest("/auth", auth_routes(state.clone()))
        // Protected routes - transfers between the kitchen and stores
        .nest("/transfers", transfer_routes(state.clone()))
        // Protected routes - production batches
        .nest("/batches", batch_routes(state.clone()))
        // Protected routes - store stock
        .nest("/inventory", inventory_routes(state))
}

/// Authentication routes
fn auth_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/me", get(handlers::me))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/login", post(handlers::login))
        .merge(protected)
}

/// Transfer routes (protected)
fn transfer_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_transfers).post(handlers::create_transfer),
        )
        .route(
            "/:transfer_id",
            get(handlers::get_transfer).delete(handlers::delete_transfer),
        )
        .route("/:transfer_id/status", put(handlers::update_transfer_status))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Batch routes (protected)
fn batch_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_batches).post(handlers::create_batch))
        .route(
            "/:batch_id",
            get(handlers::get_batch)
                .put(handlers::update_batch)
                .delete(handlers::delete_batch),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Store inventory routes (protected)
fn inventory_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/all", get(handlers::get_all_inventory))
        .route("/store/:store_id", get(handlers::get_store_inventory))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
