//! Production batch service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{normalize_batch_code, Batch, ProductSummary};
use crate::repositories::postgres::{BatchRow, BATCH_COLUMNS};
use shared::validation::{validate_batch_dates, validate_batch_quantities};

/// Batch service
#[derive(Clone)]
pub struct BatchService {
    db: PgPool,
}

/// Batch with its product resolved
#[derive(Debug, Clone, Serialize)]
pub struct BatchView {
    #[serde(flatten)]
    pub batch: Batch,
    pub product: ProductSummary,
}

/// Input for creating a batch
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBatchInput {
    #[validate(length(min = 1, max = 50, message = "Batch code must be 1-50 characters"))]
    pub code: String,
    pub product_id: Uuid,
    pub manufactured_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Defaults to `current_quantity`
    pub initial_quantity: Option<i32>,
    pub current_quantity: i32,
}

/// Partial batch update
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateBatchInput {
    #[validate(length(min = 1, max = 50, message = "Batch code must be 1-50 characters"))]
    pub code: Option<String>,
    pub product_id: Option<Uuid>,
    pub manufactured_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub initial_quantity: Option<i32>,
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub current_quantity: Option<i32>,
}

/// Batch list filters
#[derive(Debug, Default, Deserialize)]
pub struct BatchQuery {
    pub product_id: Option<Uuid>,
    /// Only batches expiring within the next week
    #[serde(default)]
    pub expiring: bool,
}

#[derive(Debug, FromRow)]
struct BatchProductRow {
    #[sqlx(flatten)]
    batch: BatchRow,
    product_name: String,
    product_sku: String,
}

impl From<BatchProductRow> for BatchView {
    fn from(row: BatchProductRow) -> Self {
        let product = ProductSummary {
            id: row.batch.product_id,
            name: row.product_name,
            sku: row.product_sku,
        };
        BatchView {
            batch: row.batch.into(),
            product,
        }
    }
}

const BATCH_VIEW_SELECT: &str = r#"
    SELECT b.id, b.code, b.product_id, b.manufactured_at, b.expires_at,
           b.initial_quantity, b.current_quantity, b.created_at, b.updated_at,
           p.name AS product_name, p.sku AS product_sku
    FROM batches b
    JOIN products p ON p.id = b.product_id
"#;

impl BatchService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Register a new batch
    pub async fn create_batch(&self, input: CreateBatchInput) -> AppResult<BatchView> {
        input.validate()?;

        let initial_quantity = input.initial_quantity.unwrap_or(input.current_quantity);
        validate_batch_dates(input.manufactured_at, input.expires_at)
            .map_err(|msg| AppError::validation("expires_at", msg))?;
        validate_batch_quantities(initial_quantity, input.current_quantity)
            .map_err(|msg| AppError::validation("current_quantity", msg))?;

        self.ensure_product(input.product_id).await?;

        let code = normalize_batch_code(&input.code);
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO batches (code, product_id, manufactured_at, expires_at, initial_quantity, current_quantity)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&code)
        .bind(input.product_id)
        .bind(input.manufactured_at)
        .bind(input.expires_at)
        .bind(initial_quantity)
        .bind(input.current_quantity)
        .fetch_one(&self.db)
        .await
        .map_err(duplicate_code)?;

        tracing::info!(batch_id = %id, code = %code, quantity = input.current_quantity, "Batch created");

        self.get_batch(id).await
    }

    /// List batches, soonest expiry first
    pub async fn list_batches(&self, query: BatchQuery) -> AppResult<Vec<BatchView>> {
        let sql = format!(
            r#"{}
            WHERE ($1::UUID IS NULL OR b.product_id = $1)
            ORDER BY b.expires_at ASC
            "#,
            BATCH_VIEW_SELECT
        );

        let rows = sqlx::query_as::<_, BatchProductRow>(&sql)
            .bind(query.product_id)
            .fetch_all(&self.db)
            .await?;

        let now = Utc::now();
        Ok(rows
            .into_iter()
            .map(BatchView::from)
            .filter(|view| !query.expiring || view.batch.is_expiring(now))
            .collect())
    }

    /// Get batch by ID
    pub async fn get_batch(&self, batch_id: Uuid) -> AppResult<BatchView> {
        let sql = format!("{} WHERE b.id = $1", BATCH_VIEW_SELECT);
        sqlx::query_as::<_, BatchProductRow>(&sql)
            .bind(batch_id)
            .fetch_optional(&self.db)
            .await?
            .map(BatchView::from)
            .ok_or_else(|| AppError::NotFound("Batch".to_string()))
    }

    /// Update a batch.
    ///
    /// The row stays locked from read to write so a shipment committing in
    /// between cannot have its decrement overwritten. Quantities are only
    /// written when the request carries them.
    pub async fn update_batch(&self, batch_id: Uuid, input: UpdateBatchInput) -> AppResult<BatchView> {
        input.validate()?;

        let mut tx = self.db.begin().await?;

        let mut batch: Batch = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {} FROM batches WHERE id = $1 FOR UPDATE",
            BATCH_COLUMNS
        ))
        .bind(batch_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Batch::from)
        .ok_or_else(|| AppError::NotFound("Batch".to_string()))?;

        if let Some(product_id) = input.product_id {
            if product_id != batch.product_id {
                self.ensure_product(product_id).await?;
            }
        }

        let (initial_quantity, current_quantity) = (input.initial_quantity, input.current_quantity);
        apply_update(&mut batch, input)?;

        sqlx::query(
            r#"
            UPDATE batches
            SET code = $2, product_id = $3, manufactured_at = $4, expires_at = $5,
                initial_quantity = COALESCE($6, initial_quantity),
                current_quantity = COALESCE($7, current_quantity),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(batch.id)
        .bind(&batch.code)
        .bind(batch.product_id)
        .bind(batch.manufactured_at)
        .bind(batch.expires_at)
        .bind(initial_quantity)
        .bind(current_quantity)
        .execute(&mut *tx)
        .await
        .map_err(duplicate_code)?;

        tx.commit().await?;

        tracing::info!(batch_id = %batch.id, "Batch updated");

        self.get_batch(batch_id).await
    }

    /// Delete a batch nothing refers to
    pub async fn delete_batch(&self, batch_id: Uuid) -> AppResult<()> {
        let (in_transfers, in_stores) = sqlx::query_as::<_, (bool, bool)>(
            r#"
            SELECT EXISTS(SELECT 1 FROM transfer_items WHERE batch_id = $1),
                   EXISTS(SELECT 1 FROM store_inventory WHERE batch_id = $1)
            "#,
        )
        .bind(batch_id)
        .fetch_one(&self.db)
        .await?;

        if in_transfers {
            return Err(AppError::Conflict(
                "Batch is referenced by a transfer".to_string(),
            ));
        }
        if in_stores {
            return Err(AppError::Conflict("Batch is held in store stock".to_string()));
        }

        let result = sqlx::query("DELETE FROM batches WHERE id = $1")
            .bind(batch_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Batch".to_string()));
        }

        tracing::info!(batch_id = %batch_id, "Batch deleted");
        Ok(())
    }

    async fn ensure_product(&self, product_id: Uuid) -> AppResult<()> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)",
        )
        .bind(product_id)
        .fetch_one(&self.db)
        .await?;

        if exists {
            Ok(())
        } else {
            Err(AppError::NotFound("Product".to_string()))
        }
    }
}

/// Merge a partial update into `batch` and re-check it
fn apply_update(batch: &mut Batch, input: UpdateBatchInput) -> AppResult<()> {
    if let Some(code) = input.code {
        batch.code = normalize_batch_code(&code);
    }
    if let Some(product_id) = input.product_id {
        batch.product_id = product_id;
    }
    if let Some(at) = input.manufactured_at {
        batch.manufactured_at = at;
    }
    if let Some(at) = input.expires_at {
        batch.expires_at = at;
    }
    if let Some(quantity) = input.initial_quantity {
        batch.initial_quantity = quantity;
    }
    if let Some(quantity) = input.current_quantity {
        batch.current_quantity = quantity;
    }

    if batch.code.is_empty() {
        return Err(AppError::validation("code", "Batch code is required"));
    }
    validate_batch_dates(batch.manufactured_at, batch.expires_at)
        .map_err(|msg| AppError::validation("expires_at", msg))?;
    validate_batch_quantities(batch.initial_quantity, batch.current_quantity)
        .map_err(|msg| AppError::validation("current_quantity", msg))
}

fn duplicate_code(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("Batch code already exists".to_string())
        }
        _ => AppError::DatabaseError(err),
    }
}
