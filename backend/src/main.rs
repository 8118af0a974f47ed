//! Central Kitchen Platform - Backend Server
//!
//! Inventory and production tracking for a bakery central kitchen: batches,
//! transfers to stores and per-store stock, behind role-based access.

use axum::{routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod handlers;
mod middleware;
mod models;
mod repositories;
mod routes;
mod services;

pub use config::Config;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bakery_server=debug,tower_http=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::load()?;

    tracing::info!("Starting Central Kitchen Server");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.is_development() {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let state = AppState {
        db: db_pool,
        config: Arc::new(config.clone()),
    };

    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Central Kitchen Platform API v1.0"
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::config::{DatabaseConfig, JwtConfig, ServerConfig, TransferConfig};
    use crate::models::Role;
    use crate::services::TokenIssuer;

    const SECRET: &str = "router-test-secret";

    fn test_app() -> Router {
        let config = Config {
            environment: "test".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://postgres@127.0.0.1:1/unused".to_string(),
                max_connections: 1,
                min_connections: 0,
                acquire_timeout_secs: 1,
            },
            jwt: JwtConfig {
                secret: SECRET.to_string(),
                access_token_expiry: 3600,
            },
            transfers: TransferConfig::default(),
        };
        let db = PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(1))
            .connect_lazy(&config.database.url)
            .unwrap();
        create_app(AppState {
            db,
            config: Arc::new(config),
        })
    }

    fn token(role: Role, store_id: Option<Uuid>) -> String {
        TokenIssuer::new(SECRET, 3600)
            .issue(Uuid::new_v4(), role, store_id)
            .unwrap()
            .access_token
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = test_app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn authed(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token));
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let request = Request::builder()
            .uri("/api/v1/transfers")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_TOKEN");

        let (status, _) = send(authed("GET", "/api/v1/batches", "not-a-jwt", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_status_is_a_validation_error() {
        let token = token(Role::Manager, None);
        let uri = format!("/api/v1/transfers/{}/status", Uuid::new_v4());
        let (status, body) = send(authed("PUT", &uri, &token, Some(json!({})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["field"], "status");
    }

    #[tokio::test]
    async fn store_staff_are_turned_away_from_manager_actions() {
        let token = token(Role::StoreStaff, Some(Uuid::new_v4()));

        let (status, body) = send(authed("GET", "/api/v1/inventory/all", &token, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let uri = format!("/api/v1/transfers/{}", Uuid::new_v4());
        let (status, _) = send(authed("DELETE", &uri, &token, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let batch = json!({
            "code": "MC-001",
            "product_id": Uuid::new_v4(),
            "manufactured_at": "2024-01-01T00:00:00Z",
            "expires_at": "2024-01-10T00:00:00Z",
            "current_quantity": 10
        });
        let (status, _) = send(authed("POST", "/api/v1/batches", &token, Some(batch))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn store_staff_cannot_read_another_stores_inventory() {
        let token = token(Role::StoreStaff, Some(Uuid::new_v4()));
        let uri = format!("/api/v1/inventory/store/{}", Uuid::new_v4());
        let (status, _) = send(authed("GET", &uri, &token, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
