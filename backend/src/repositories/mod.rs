//! Storage seam for the transfer workflow
//!
//! The workflow only talks to batches, store stock and transfers through these
//! traits. Every status transition runs inside one [`StockUnit`]: all of its
//! writes become visible together on [`StockUnit::commit`], and dropping the
//! unit without committing discards them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Batch, NewTransfer, StoreInventory, Transfer, TransferDetails, TransferStatus};

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[cfg(test)]
pub use memory::MemoryStockStore;
pub use postgres::PgStockStore;

/// Reads and unit-of-work factory for transfers and the stock they move
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Open an atomic unit of work
    async fn begin(&self) -> AppResult<Box<dyn StockUnit>>;

    async fn store_exists(&self, store_id: Uuid) -> AppResult<bool>;

    async fn get_batch(&self, batch_id: Uuid) -> AppResult<Option<Batch>>;

    /// Insert a new `Pending` transfer.
    ///
    /// Returns `None` when the transfer code is already taken.
    async fn insert_transfer(&self, transfer: &NewTransfer) -> AppResult<Option<Transfer>>;

    /// Load a transfer with its store, creator, batches and products resolved
    async fn transfer_details(&self, transfer_id: Uuid) -> AppResult<Option<TransferDetails>>;

    /// Transfers matching `filter`, newest first
    async fn list_transfers(&self, filter: &TransferFilter) -> AppResult<Vec<TransferDetails>>;
}

/// Filter for listing transfers
#[derive(Debug, Clone, Default)]
pub struct TransferFilter {
    pub status: Option<TransferStatus>,
    pub destination_store_id: Option<Uuid>,
}

/// One atomic unit of work over transfers, batches and store stock.
///
/// Records read through `lock_*` stay locked against other units until this
/// one commits or is dropped.
#[async_trait]
pub trait StockUnit: Send {
    async fn lock_transfer(&mut self, transfer_id: Uuid) -> AppResult<Option<Transfer>>;

    /// Lock the given batches. Missing ids are absent from the result.
    async fn lock_batches(&mut self, batch_ids: &[Uuid]) -> AppResult<Vec<Batch>>;

    async fn decrement_batch_quantity(&mut self, batch_id: Uuid, amount: i32) -> AppResult<()>;

    async fn get_store_inventory(
        &mut self,
        store_id: Uuid,
        batch_id: Uuid,
    ) -> AppResult<Option<StoreInventory>>;

    /// Add `amount` to the `(store_id, batch_id)` row, creating it if missing
    async fn upsert_store_inventory(
        &mut self,
        store_id: Uuid,
        batch_id: Uuid,
        product_id: Uuid,
        amount: i32,
        at: DateTime<Utc>,
    ) -> AppResult<StoreInventory>;

    /// Persist status and transition timestamps
    async fn save_transfer_status(&mut self, transfer: &Transfer) -> AppResult<()>;

    async fn delete_transfer(&mut self, transfer_id: Uuid) -> AppResult<()>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}
