//! PostgreSQL implementation of the transfer storage seam
//!
//! A unit of work is a database transaction. Transfers and batches touched by
//! a transition are locked with `SELECT ... FOR UPDATE`, batches in id order
//! so two shipments sharing batches cannot deadlock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{StockStore, StockUnit, TransferFilter};
use crate::error::{AppError, AppResult};
use crate::models::{
    Batch, BatchSummary, NewTransfer, ProductSummary, StoreInventory, StoreSummary, Transfer,
    TransferDetails, TransferItem, TransferLine, TransferStatus, UserSummary,
};

/// Transfer storage backed by PostgreSQL
#[derive(Clone)]
pub struct PgStockStore {
    db: PgPool,
}

impl PgStockStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Row for the `batches` table
#[derive(Debug, FromRow)]
pub(crate) struct BatchRow {
    pub id: Uuid,
    pub code: String,
    pub product_id: Uuid,
    pub manufactured_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub initial_quantity: i32,
    pub current_quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BatchRow> for Batch {
    fn from(row: BatchRow) -> Self {
        Batch {
            id: row.id,
            code: row.code,
            product_id: row.product_id,
            manufactured_at: row.manufactured_at,
            expires_at: row.expires_at,
            initial_quantity: row.initial_quantity,
            current_quantity: row.current_quantity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(crate) const BATCH_COLUMNS: &str = "id, code, product_id, manufactured_at, expires_at, \
     initial_quantity, current_quantity, created_at, updated_at";

/// Row for the `transfers` table
#[derive(Debug, FromRow)]
struct TransferRow {
    id: Uuid,
    code: String,
    destination_store_id: Uuid,
    created_by: Uuid,
    status: String,
    shipped_at: Option<DateTime<Utc>>,
    received_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransferRow {
    fn into_transfer(self, items: Vec<TransferItem>) -> AppResult<Transfer> {
        Ok(Transfer {
            id: self.id,
            code: self.code,
            destination_store_id: self.destination_store_id,
            created_by: self.created_by,
            status: parse_status(&self.status)?,
            shipped_at: self.shipped_at,
            received_at: self.received_at,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const TRANSFER_COLUMNS: &str = "id, code, destination_store_id, created_by, status, \
     shipped_at, received_at, created_at, updated_at";

/// Row for the `store_inventory` table
#[derive(Debug, FromRow)]
pub(crate) struct StoreInventoryRow {
    pub id: Uuid,
    pub store_id: Uuid,
    pub product_id: Uuid,
    pub batch_id: Uuid,
    pub quantity: i32,
    pub last_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<StoreInventoryRow> for StoreInventory {
    fn from(row: StoreInventoryRow) -> Self {
        StoreInventory {
            id: row.id,
            store_id: row.store_id,
            product_id: row.product_id,
            batch_id: row.batch_id,
            quantity: row.quantity,
            last_updated_at: row.last_updated_at,
            created_at: row.created_at,
        }
    }
}

/// Row for the transfer header with store and creator joined in
#[derive(Debug, FromRow)]
struct TransferHeaderRow {
    id: Uuid,
    code: String,
    status: String,
    shipped_at: Option<DateTime<Utc>>,
    received_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    store_id: Uuid,
    store_name: String,
    store_address: String,
    user_id: Option<Uuid>,
    user_full_name: Option<String>,
    user_username: Option<String>,
}

/// Row for a transfer line with batch and product joined in
#[derive(Debug, FromRow)]
struct TransferLineRow {
    quantity: i32,
    batch_id: Uuid,
    batch_code: String,
    manufactured_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    current_quantity: i32,
    product_id: Uuid,
    product_name: String,
    product_sku: String,
}

impl From<TransferLineRow> for TransferLine {
    fn from(row: TransferLineRow) -> Self {
        TransferLine {
            batch: BatchSummary {
                id: row.batch_id,
                code: row.batch_code,
                product: ProductSummary {
                    id: row.product_id,
                    name: row.product_name,
                    sku: row.product_sku,
                },
                manufactured_at: row.manufactured_at,
                expires_at: row.expires_at,
                current_quantity: row.current_quantity,
            },
            quantity: row.quantity,
        }
    }
}

fn parse_status(raw: &str) -> AppResult<TransferStatus> {
    TransferStatus::parse(raw)
        .map_err(|e| AppError::Internal(format!("Stored transfer has {}", e)))
}

impl PgStockStore {
    async fn load_details(&self, header: TransferHeaderRow) -> AppResult<TransferDetails> {
        let lines = sqlx::query_as::<_, TransferLineRow>(
            r#"
            SELECT ti.quantity, b.id AS batch_id, b.code AS batch_code, b.manufactured_at,
                   b.expires_at, b.current_quantity,
                   p.id AS product_id, p.name AS product_name, p.sku AS product_sku
            FROM transfer_items ti
            JOIN batches b ON b.id = ti.batch_id
            JOIN products p ON p.id = b.product_id
            WHERE ti.transfer_id = $1
            ORDER BY ti.position
            "#,
        )
        .bind(header.id)
        .fetch_all(&self.db)
        .await?;

        let created_by = match (header.user_id, header.user_full_name, header.user_username) {
            (Some(id), Some(full_name), Some(username)) => Some(UserSummary {
                id,
                full_name,
                username,
            }),
            _ => None,
        };

        Ok(TransferDetails {
            id: header.id,
            code: header.code,
            status: parse_status(&header.status)?,
            destination_store: StoreSummary {
                id: header.store_id,
                name: header.store_name,
                address: header.store_address,
            },
            created_by,
            shipped_at: header.shipped_at,
            received_at: header.received_at,
            items: lines.into_iter().map(TransferLine::from).collect(),
            created_at: header.created_at,
            updated_at: header.updated_at,
        })
    }
}

const TRANSFER_HEADER_SELECT: &str = r#"
    SELECT t.id, t.code, t.status, t.shipped_at, t.received_at, t.created_at, t.updated_at,
           s.id AS store_id, s.name AS store_name, s.address AS store_address,
           u.id AS user_id, u.full_name AS user_full_name, u.username AS user_username
    FROM transfers t
    JOIN stores s ON s.id = t.destination_store_id
    LEFT JOIN users u ON u.id = t.created_by
"#;

#[async_trait]
impl StockStore for PgStockStore {
    async fn begin(&self) -> AppResult<Box<dyn StockUnit>> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgStockUnit { tx }))
    }

    async fn store_exists(&self, store_id: Uuid) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM stores WHERE id = $1)")
            .bind(store_id)
            .fetch_one(&self.db)
            .await?;
        Ok(exists)
    }

    async fn get_batch(&self, batch_id: Uuid) -> AppResult<Option<Batch>> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {} FROM batches WHERE id = $1",
            BATCH_COLUMNS
        ))
        .bind(batch_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Batch::from))
    }

    async fn insert_transfer(&self, transfer: &NewTransfer) -> AppResult<Option<Transfer>> {
        let mut tx = self.db.begin().await?;

        let inserted = sqlx::query_as::<_, TransferRow>(&format!(
            r#"
            INSERT INTO transfers (code, destination_store_id, created_by, status)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            TRANSFER_COLUMNS
        ))
        .bind(&transfer.code)
        .bind(transfer.destination_store_id)
        .bind(transfer.created_by)
        .bind(TransferStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        for (position, item) in transfer.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO transfer_items (transfer_id, position, batch_id, quantity)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(row.id)
            .bind(position as i32)
            .bind(item.batch_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        row.into_transfer(transfer.items.clone()).map(Some)
    }

    async fn transfer_details(&self, transfer_id: Uuid) -> AppResult<Option<TransferDetails>> {
        let header = sqlx::query_as::<_, TransferHeaderRow>(&format!(
            "{} WHERE t.id = $1",
            TRANSFER_HEADER_SELECT
        ))
        .bind(transfer_id)
        .fetch_optional(&self.db)
        .await?;

        match header {
            Some(header) => self.load_details(header).await.map(Some),
            None => Ok(None),
        }
    }

    async fn list_transfers(&self, filter: &TransferFilter) -> AppResult<Vec<TransferDetails>> {
        let headers = sqlx::query_as::<_, TransferHeaderRow>(&format!(
            r#"{}
            WHERE ($1::VARCHAR IS NULL OR t.status = $1)
              AND ($2::UUID IS NULL OR t.destination_store_id = $2)
            ORDER BY t.created_at DESC
            "#,
            TRANSFER_HEADER_SELECT
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.destination_store_id)
        .fetch_all(&self.db)
        .await?;

        let mut transfers = Vec::with_capacity(headers.len());
        for header in headers {
            transfers.push(self.load_details(header).await?);
        }
        Ok(transfers)
    }
}

/// A PostgreSQL transaction acting as one unit of work.
///
/// Dropping it without `commit` rolls the transaction back.
pub struct PgStockUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StockUnit for PgStockUnit {
    async fn lock_transfer(&mut self, transfer_id: Uuid) -> AppResult<Option<Transfer>> {
        let row = sqlx::query_as::<_, TransferRow>(&format!(
            "SELECT {} FROM transfers WHERE id = $1 FOR UPDATE",
            TRANSFER_COLUMNS
        ))
        .bind(transfer_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, (Uuid, i32)>(
            "SELECT batch_id, quantity FROM transfer_items WHERE transfer_id = $1 ORDER BY position",
        )
        .bind(transfer_id)
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(|(batch_id, quantity)| TransferItem { batch_id, quantity })
        .collect();

        row.into_transfer(items).map(Some)
    }

    async fn lock_batches(&mut self, batch_ids: &[Uuid]) -> AppResult<Vec<Batch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {} FROM batches WHERE id = ANY($1) ORDER BY id FOR UPDATE",
            BATCH_COLUMNS
        ))
        .bind(batch_ids)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Batch::from).collect())
    }

    async fn decrement_batch_quantity(&mut self, batch_id: Uuid, amount: i32) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE batches
            SET current_quantity = current_quantity - $2, updated_at = NOW()
            WHERE id = $1 AND current_quantity >= $2
            "#,
        )
        .bind(batch_id)
        .bind(amount)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::InsufficientQuantity(format!(
                "Batch {} cannot supply {}",
                batch_id, amount
            )));
        }
        Ok(())
    }

    async fn get_store_inventory(
        &mut self,
        store_id: Uuid,
        batch_id: Uuid,
    ) -> AppResult<Option<StoreInventory>> {
        let row = sqlx::query_as::<_, StoreInventoryRow>(
            r#"
            SELECT id, store_id, product_id, batch_id, quantity, last_updated_at, created_at
            FROM store_inventory
            WHERE store_id = $1 AND batch_id = $2
            "#,
        )
        .bind(store_id)
        .bind(batch_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(StoreInventory::from))
    }

    async fn upsert_store_inventory(
        &mut self,
        store_id: Uuid,
        batch_id: Uuid,
        product_id: Uuid,
        amount: i32,
        at: DateTime<Utc>,
    ) -> AppResult<StoreInventory> {
        let row = sqlx::query_as::<_, StoreInventoryRow>(
            r#"
            INSERT INTO store_inventory (store_id, batch_id, product_id, quantity, last_updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (store_id, batch_id)
            DO UPDATE SET
                quantity = store_inventory.quantity + EXCLUDED.quantity,
                last_updated_at = EXCLUDED.last_updated_at
            RETURNING id, store_id, product_id, batch_id, quantity, last_updated_at, created_at
            "#,
        )
        .bind(store_id)
        .bind(batch_id)
        .bind(product_id)
        .bind(amount)
        .bind(at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn save_transfer_status(&mut self, transfer: &Transfer) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE transfers
            SET status = $2, shipped_at = $3, received_at = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(transfer.id)
        .bind(transfer.status.as_str())
        .bind(transfer.shipped_at)
        .bind(transfer.received_at)
        .bind(transfer.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_transfer(&mut self, transfer_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM transfers WHERE id = $1")
            .bind(transfer_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::test_db::{self, Seed};
    use super::*;
    use crate::config::TransferConfig;
    use crate::models::{Actor, Role};
    use crate::services::transfer::{CreateTransferInput, TransferWorkflow};

    fn workflow(pool: &PgPool) -> Arc<TransferWorkflow<PgStockStore>> {
        Arc::new(TransferWorkflow::new(
            PgStockStore::new(pool.clone()),
            &TransferConfig::default(),
        ))
    }

    async fn create(
        workflow: &TransferWorkflow<PgStockStore>,
        seed: &Seed,
        batch_id: Uuid,
        quantity: i32,
    ) -> TransferDetails {
        let manager = Actor::new(seed.user_id, Role::Manager, None);
        workflow
            .create_transfer(
                &manager,
                CreateTransferInput {
                    destination_store_id: seed.store_id,
                    items: vec![TransferItem { batch_id, quantity }],
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn concurrent_shipments_never_oversell() {
        let Some(pool) = test_db::connect().await else { return };
        let seed = test_db::seed(&pool).await;
        let batch = test_db::add_batch(&pool, seed.product_id, 50).await;
        let workflow = workflow(&pool);

        let a = create(&workflow, &seed, batch, 40).await;
        let b = create(&workflow, &seed, batch, 40).await;

        let manager = Actor::new(seed.user_id, Role::Manager, None);
        let (wa, wb) = (workflow.clone(), workflow.clone());
        let (ma, mb) = (manager.clone(), manager.clone());
        let ta = tokio::spawn(async move { wa.request_transition(a.id, Some("Shipped"), &ma).await });
        let tb = tokio::spawn(async move { wb.request_transition(b.id, Some("Shipped"), &mb).await });
        let results = [ta.await.unwrap(), tb.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AppError::InsufficientQuantity(_)))));
        assert_eq!(test_db::current_quantity(&pool, batch).await, 10);
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn concurrent_receipts_accumulate_in_one_row() {
        let Some(pool) = test_db::connect().await else { return };
        let seed = test_db::seed(&pool).await;
        let batch = test_db::add_batch(&pool, seed.product_id, 100).await;
        let workflow = workflow(&pool);
        let manager = Actor::new(seed.user_id, Role::Manager, None);

        let a = create(&workflow, &seed, batch, 20).await;
        let b = create(&workflow, &seed, batch, 28).await;
        workflow.request_transition(a.id, Some("Shipped"), &manager).await.unwrap();
        workflow.request_transition(b.id, Some("Shipped"), &manager).await.unwrap();

        let staff = Actor::new(Uuid::new_v4(), Role::StoreStaff, Some(seed.store_id));
        let (wa, wb) = (workflow.clone(), workflow.clone());
        let (sa, sb) = (staff.clone(), staff.clone());
        let ta = tokio::spawn(async move { wa.request_transition(a.id, Some("Received"), &sa).await });
        let tb = tokio::spawn(async move { wb.request_transition(b.id, Some("Received"), &sb).await });
        ta.await.unwrap().unwrap();
        tb.await.unwrap().unwrap();

        let rows = sqlx::query_as::<_, (i32,)>(
            "SELECT quantity FROM store_inventory WHERE store_id = $1 AND batch_id = $2",
        )
        .bind(seed.store_id)
        .bind(batch)
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(rows, vec![(48,)]);
        assert_eq!(test_db::current_quantity(&pool, batch).await, 52);
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn taken_code_is_reported_instead_of_failing() {
        let Some(pool) = test_db::connect().await else { return };
        let seed = test_db::seed(&pool).await;
        let batch = test_db::add_batch(&pool, seed.product_id, 10).await;
        let store = PgStockStore::new(pool.clone());

        let code = format!("TRF-19990101-{:04}", rand::random::<u16>() % 10_000);
        sqlx::query("DELETE FROM transfers WHERE code = $1")
            .bind(&code)
            .execute(&pool)
            .await
            .unwrap();

        let transfer = NewTransfer {
            code,
            destination_store_id: seed.store_id,
            created_by: seed.user_id,
            items: vec![TransferItem {
                batch_id: batch,
                quantity: 5,
            }],
        };
        let first = store.insert_transfer(&transfer).await.unwrap();
        assert_eq!(first.map(|t| t.status), Some(TransferStatus::Pending));
        assert!(store.insert_transfer(&transfer).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn dropped_unit_rolls_back() {
        let Some(pool) = test_db::connect().await else { return };
        let seed = test_db::seed(&pool).await;
        let batch = test_db::add_batch(&pool, seed.product_id, 30).await;
        let store = PgStockStore::new(pool.clone());

        {
            let mut unit = store.begin().await.unwrap();
            unit.lock_batches(&[batch]).await.unwrap();
            unit.decrement_batch_quantity(batch, 10).await.unwrap();
            let err = unit.decrement_batch_quantity(batch, 25).await.unwrap_err();
            assert!(matches!(err, AppError::InsufficientQuantity(_)));
        }

        assert_eq!(test_db::current_quantity(&pool, batch).await, 30);
    }
}
