//! Store stock queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    group_by_store, summarize_by_product, Actor, InventoryBatchInfo, ProductStock,
    ProductSummary, Role, Store, StoreInventoryView, StoreStock, StoreSummary,
};

/// Inventory service for reading what each store holds
#[derive(Clone)]
pub struct InventoryService {
    db: PgPool,
}

/// Inventory query filters
#[derive(Debug, Default, Deserialize)]
pub struct InventoryQuery {
    pub product_id: Option<Uuid>,
}

/// Stock of one store with a per-product summary
#[derive(Debug, Serialize)]
pub struct StoreInventoryReport {
    pub store: StoreSummary,
    pub items: Vec<StoreInventoryView>,
    pub summary: Vec<ProductStock>,
}

/// Stock of every store
#[derive(Debug, Serialize)]
pub struct AllInventoryReport {
    pub stores: Vec<StoreStock>,
    pub total_quantity: i64,
}

#[derive(Debug, FromRow)]
struct StoreRow {
    id: Uuid,
    name: String,
    address: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StoreRow> for Store {
    fn from(row: StoreRow) -> Self {
        Store {
            id: row.id,
            name: row.name,
            address: row.address,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Row for stock queries with store, product and batch joined in
#[derive(Debug, FromRow)]
struct InventoryRow {
    id: Uuid,
    quantity: i32,
    last_updated_at: DateTime<Utc>,
    store_id: Uuid,
    store_name: String,
    store_address: String,
    product_id: Uuid,
    product_name: String,
    product_sku: String,
    batch_id: Uuid,
    batch_code: String,
    manufactured_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<InventoryRow> for StoreInventoryView {
    fn from(row: InventoryRow) -> Self {
        StoreInventoryView {
            id: row.id,
            store: StoreSummary {
                id: row.store_id,
                name: row.store_name,
                address: row.store_address,
            },
            product: ProductSummary {
                id: row.product_id,
                name: row.product_name,
                sku: row.product_sku,
            },
            batch: InventoryBatchInfo {
                id: row.batch_id,
                code: row.batch_code,
                manufactured_at: row.manufactured_at,
                expires_at: row.expires_at,
            },
            quantity: row.quantity,
            last_updated_at: row.last_updated_at,
        }
    }
}

const INVENTORY_SELECT: &str = r#"
    SELECT si.id, si.quantity, si.last_updated_at,
           s.id AS store_id, s.name AS store_name, s.address AS store_address,
           p.id AS product_id, p.name AS product_name, p.sku AS product_sku,
           b.id AS batch_id, b.code AS batch_code, b.manufactured_at, b.expires_at
    FROM store_inventory si
    JOIN stores s ON s.id = si.store_id
    JOIN products p ON p.id = si.product_id
    JOIN batches b ON b.id = si.batch_id
"#;

impl InventoryService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Stock held by one store, most recently updated first
    pub async fn store_inventory(
        &self,
        actor: &Actor,
        store_id: Uuid,
        query: InventoryQuery,
    ) -> AppResult<StoreInventoryReport> {
        check_store_access(actor, store_id)?;

        let store: Store = sqlx::query_as::<_, StoreRow>(
            "SELECT id, name, address, is_active, created_at, updated_at FROM stores WHERE id = $1",
        )
        .bind(store_id)
        .fetch_optional(&self.db)
        .await?
        .map(Store::from)
        .ok_or_else(|| AppError::NotFound("Store".to_string()))?;

        let sql = format!(
            r#"{}
            WHERE si.store_id = $1
              AND ($2::UUID IS NULL OR si.product_id = $2)
            ORDER BY si.last_updated_at DESC
            "#,
            INVENTORY_SELECT
        );

        let items: Vec<StoreInventoryView> = sqlx::query_as::<_, InventoryRow>(&sql)
            .bind(store_id)
            .bind(query.product_id)
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(StoreInventoryView::from)
            .collect();

        let summary = summarize_by_product(&items);

        Ok(StoreInventoryReport {
            store: StoreSummary::from(&store),
            items,
            summary,
        })
    }

    /// Stock of every store, grouped by store
    pub async fn all_inventory(
        &self,
        actor: &Actor,
        query: InventoryQuery,
    ) -> AppResult<AllInventoryReport> {
        if !actor.role.is_privileged() {
            return Err(AppError::Unauthorized(
                "Only Manager/Admin can view all store inventory".to_string(),
            ));
        }

        let sql = format!(
            r#"{}
            WHERE ($1::UUID IS NULL OR si.product_id = $1)
            ORDER BY s.name, si.last_updated_at DESC
            "#,
            INVENTORY_SELECT
        );

        let rows: Vec<StoreInventoryView> = sqlx::query_as::<_, InventoryRow>(&sql)
            .bind(query.product_id)
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(StoreInventoryView::from)
            .collect();

        let stores = group_by_store(rows);
        let total_quantity = stores.iter().map(|s| s.total_quantity).sum();

        Ok(AllInventoryReport {
            stores,
            total_quantity,
        })
    }
}

/// Store staff may only read their own store's stock
fn check_store_access(actor: &Actor, store_id: Uuid) -> AppResult<()> {
    match actor.role {
        Role::StoreStaff if !actor.works_at(store_id) => Err(AppError::Unauthorized(
            "You can only view inventory of your store".to_string(),
        )),
        _ => Ok(()),
    }
}
