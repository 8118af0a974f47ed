//! Store inventory models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StoreSummary;
use crate::types::ProductSummary;

/// On-hand stock of one batch at one store.
///
/// At most one row exists per `(store_id, batch_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreInventory {
    pub id: Uuid,
    pub store_id: Uuid,
    pub product_id: Uuid,
    pub batch_id: Uuid,
    pub quantity: i32,
    pub last_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Batch fields shown on a stock row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryBatchInfo {
    pub id: Uuid,
    pub code: String,
    pub manufactured_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A stock row with its store, product and batch resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreInventoryView {
    pub id: Uuid,
    pub store: StoreSummary,
    pub product: ProductSummary,
    pub batch: InventoryBatchInfo,
    pub quantity: i32,
    pub last_updated_at: DateTime<Utc>,
}

/// Total stock of one product at a store across its batches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductStock {
    pub product_id: Uuid,
    pub product_name: String,
    pub product_sku: String,
    pub total_quantity: i64,
    pub batches: usize,
}

/// Stock rows of a single store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStock {
    pub store: StoreSummary,
    pub items: Vec<StoreInventoryView>,
    pub total_quantity: i64,
}

/// Sum rows per product, keeping the order in which products first appear
pub fn summarize_by_product(rows: &[StoreInventoryView]) -> Vec<ProductStock> {
    let mut summary: Vec<ProductStock> = Vec::new();
    for row in rows {
        match summary.iter_mut().find(|s| s.product_id == row.product.id) {
            Some(entry) => {
                entry.total_quantity += i64::from(row.quantity);
                entry.batches += 1;
            }
            None => summary.push(ProductStock {
                product_id: row.product.id,
                product_name: row.product.name.clone(),
                product_sku: row.product.sku.clone(),
                total_quantity: i64::from(row.quantity),
                batches: 1,
            }),
        }
    }
    summary
}

/// Group rows by store, ordered by store id
pub fn group_by_store(rows: Vec<StoreInventoryView>) -> Vec<StoreStock> {
    let mut by_store: BTreeMap<Uuid, StoreStock> = BTreeMap::new();
    for row in rows {
        let entry = by_store.entry(row.store.id).or_insert_with(|| StoreStock {
            store: row.store.clone(),
            items: Vec::new(),
            total_quantity: 0,
        });
        entry.total_quantity += i64::from(row.quantity);
        entry.items.push(row);
    }
    by_store.into_values().collect()
}
