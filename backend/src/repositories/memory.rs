//! In-memory transfer storage for tests
//!
//! A unit of work holds the store-wide lock for its whole lifetime and edits a
//! private copy of the state, which replaces the shared state on commit. Units
//! are therefore fully serialized, like SERIALIZABLE transactions that never
//! conflict.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{StockStore, StockUnit, TransferFilter};
use crate::error::{AppError, AppResult};
use crate::models::{
    Batch, BatchSummary, NewTransfer, ProductSummary, StoreInventory, StoreSummary, Transfer,
    TransferDetails, TransferLine, TransferStatus, UserSummary,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    stores: HashMap<Uuid, StoreSummary>,
    users: HashMap<Uuid, UserSummary>,
    products: HashMap<Uuid, ProductSummary>,
    batches: HashMap<Uuid, Batch>,
    transfers: HashMap<Uuid, Transfer>,
    inventory: HashMap<(Uuid, Uuid), StoreInventory>,
}

impl MemoryState {
    fn details(&self, transfer: &Transfer) -> AppResult<TransferDetails> {
        let destination_store = self
            .stores
            .get(&transfer.destination_store_id)
            .cloned()
            .ok_or_else(|| AppError::Internal("Transfer store missing".to_string()))?;

        let mut items = Vec::with_capacity(transfer.items.len());
        for item in &transfer.items {
            let batch = self
                .batches
                .get(&item.batch_id)
                .ok_or_else(|| AppError::Internal("Transfer batch missing".to_string()))?;
            let product = self
                .products
                .get(&batch.product_id)
                .cloned()
                .ok_or_else(|| AppError::Internal("Batch product missing".to_string()))?;
            items.push(TransferLine {
                batch: BatchSummary {
                    id: batch.id,
                    code: batch.code.clone(),
                    product,
                    manufactured_at: batch.manufactured_at,
                    expires_at: batch.expires_at,
                    current_quantity: batch.current_quantity,
                },
                quantity: item.quantity,
            });
        }

        Ok(TransferDetails {
            id: transfer.id,
            code: transfer.code.clone(),
            status: transfer.status,
            destination_store,
            created_by: self.users.get(&transfer.created_by).cloned(),
            shipped_at: transfer.shipped_at,
            received_at: transfer.received_at,
            items,
            created_at: transfer.created_at,
            updated_at: transfer.updated_at,
        })
    }
}

/// Test double for [`StockStore`]
#[derive(Clone, Default)]
pub struct MemoryStockStore {
    state: Arc<Mutex<MemoryState>>,
    fail_inventory_writes: Arc<AtomicBool>,
    colliding_inserts: Arc<AtomicUsize>,
}

impl MemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_store(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().await.stores.insert(
            id,
            StoreSummary {
                id,
                name: name.to_string(),
                address: format!("{} address", name),
            },
        );
        id
    }

    pub async fn add_user(&self, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().await.users.insert(
            id,
            UserSummary {
                id,
                full_name: username.to_uppercase(),
                username: username.to_string(),
            },
        );
        id
    }

    pub async fn add_product(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().await.products.insert(
            id,
            ProductSummary {
                id,
                name: name.to_string(),
                sku: name.to_uppercase(),
            },
        );
        id
    }

    pub async fn add_batch(&self, product_id: Uuid, quantity: i32) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let code = format!("B-{:03}", state.batches.len() + 1);
        state.batches.insert(
            id,
            Batch {
                id,
                code,
                product_id,
                manufactured_at: now - Duration::days(1),
                expires_at: now + Duration::days(30),
                initial_quantity: quantity,
                current_quantity: quantity,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub async fn batch(&self, batch_id: Uuid) -> Option<Batch> {
        self.state.lock().await.batches.get(&batch_id).cloned()
    }

    pub async fn transfer(&self, transfer_id: Uuid) -> Option<Transfer> {
        self.state.lock().await.transfers.get(&transfer_id).cloned()
    }

    pub async fn inventory(&self, store_id: Uuid, batch_id: Uuid) -> Option<StoreInventory> {
        self.state
            .lock()
            .await
            .inventory
            .get(&(store_id, batch_id))
            .cloned()
    }

    pub async fn inventory_rows(&self) -> usize {
        self.state.lock().await.inventory.len()
    }

    /// Make every inventory write fail, as a storage outage would
    pub fn fail_inventory_writes(&self, fail: bool) {
        self.fail_inventory_writes.store(fail, Ordering::SeqCst);
    }

    /// Report the next `n` transfer inserts as code collisions
    pub fn collide_next_inserts(&self, n: usize) {
        self.colliding_inserts.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl StockStore for MemoryStockStore {
    async fn begin(&self) -> AppResult<Box<dyn StockUnit>> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryStockUnit {
            guard,
            working,
            fail_inventory_writes: self.fail_inventory_writes.load(Ordering::SeqCst),
        }))
    }

    async fn store_exists(&self, store_id: Uuid) -> AppResult<bool> {
        Ok(self.state.lock().await.stores.contains_key(&store_id))
    }

    async fn get_batch(&self, batch_id: Uuid) -> AppResult<Option<Batch>> {
        Ok(self.batch(batch_id).await)
    }

    async fn insert_transfer(&self, transfer: &NewTransfer) -> AppResult<Option<Transfer>> {
        let collide = self
            .colliding_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        let mut state = self.state.lock().await;
        if collide || state.transfers.values().any(|t| t.code == transfer.code) {
            return Ok(None);
        }

        let now = Utc::now();
        let created = Transfer {
            id: Uuid::new_v4(),
            code: transfer.code.clone(),
            destination_store_id: transfer.destination_store_id,
            created_by: transfer.created_by,
            status: TransferStatus::Pending,
            shipped_at: None,
            received_at: None,
            items: transfer.items.clone(),
            created_at: now,
            updated_at: now,
        };
        state.transfers.insert(created.id, created.clone());
        Ok(Some(created))
    }

    async fn transfer_details(&self, transfer_id: Uuid) -> AppResult<Option<TransferDetails>> {
        let state = self.state.lock().await;
        match state.transfers.get(&transfer_id) {
            Some(transfer) => state.details(transfer).map(Some),
            None => Ok(None),
        }
    }

    async fn list_transfers(&self, filter: &TransferFilter) -> AppResult<Vec<TransferDetails>> {
        let state = self.state.lock().await;
        let mut transfers: Vec<&Transfer> = state
            .transfers
            .values()
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| {
                filter
                    .destination_store_id
                    .map_or(true, |id| t.destination_store_id == id)
            })
            .collect();
        transfers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        transfers.into_iter().map(|t| state.details(t)).collect()
    }
}

struct MemoryStockUnit {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_inventory_writes: bool,
}

#[async_trait]
impl StockUnit for MemoryStockUnit {
    async fn lock_transfer(&mut self, transfer_id: Uuid) -> AppResult<Option<Transfer>> {
        Ok(self.working.transfers.get(&transfer_id).cloned())
    }

    async fn lock_batches(&mut self, batch_ids: &[Uuid]) -> AppResult<Vec<Batch>> {
        Ok(batch_ids
            .iter()
            .filter_map(|id| self.working.batches.get(id).cloned())
            .collect())
    }

    async fn decrement_batch_quantity(&mut self, batch_id: Uuid, amount: i32) -> AppResult<()> {
        let batch = self
            .working
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| AppError::NotFound(format!("Batch {}", batch_id)))?;
        if batch.current_quantity < amount {
            return Err(AppError::InsufficientQuantity(format!(
                "Batch {} cannot supply {}",
                batch.code, amount
            )));
        }
        batch.current_quantity -= amount;
        batch.updated_at = Utc::now();
        Ok(())
    }

    async fn get_store_inventory(
        &mut self,
        store_id: Uuid,
        batch_id: Uuid,
    ) -> AppResult<Option<StoreInventory>> {
        Ok(self.working.inventory.get(&(store_id, batch_id)).cloned())
    }

    async fn upsert_store_inventory(
        &mut self,
        store_id: Uuid,
        batch_id: Uuid,
        product_id: Uuid,
        amount: i32,
        at: DateTime<Utc>,
    ) -> AppResult<StoreInventory> {
        if self.fail_inventory_writes {
            return Err(AppError::Internal("inventory write failed".to_string()));
        }
        let row = self
            .working
            .inventory
            .entry((store_id, batch_id))
            .and_modify(|row| {
                row.quantity += amount;
                row.last_updated_at = at;
            })
            .or_insert_with(|| StoreInventory {
                id: Uuid::new_v4(),
                store_id,
                product_id,
                batch_id,
                quantity: amount,
                last_updated_at: at,
                created_at: at,
            });
        Ok(row.clone())
    }

    async fn save_transfer_status(&mut self, transfer: &Transfer) -> AppResult<()> {
        self.working.transfers.insert(transfer.id, transfer.clone());
        Ok(())
    }

    async fn delete_transfer(&mut self, transfer_id: Uuid) -> AppResult<()> {
        self.working.transfers.remove(&transfer_id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryStockUnit {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}
