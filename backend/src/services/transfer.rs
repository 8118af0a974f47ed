//! Transfer workflow: shipments from the central kitchen to stores
//!
//! Every status transition runs in a single unit of work. All checks happen
//! before the first write, and the batch decrements or stock credits commit
//! together with the transfer's own status change, or not at all.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TransferConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    authorize_transition, can_view_transfer, generate_transfer_code, AccessDecision, Actor, Batch,
    NewTransfer, Role, Transfer, TransferDetails, TransferItem, TransferStatus,
};
use crate::repositories::{StockStore, StockUnit, TransferFilter};
use shared::validation::validate_transfer_items;

/// Transfer lifecycle service over any [`StockStore`]
pub struct TransferWorkflow<S> {
    store: S,
    code_attempts: u32,
}

/// Input for creating a transfer
#[derive(Debug, Deserialize)]
pub struct CreateTransferInput {
    pub destination_store_id: Uuid,
    #[serde(default)]
    pub items: Vec<TransferItem>,
}

impl<S: StockStore> TransferWorkflow<S> {
    pub fn new(store: S, config: &TransferConfig) -> Self {
        Self {
            store,
            code_attempts: config.code_attempts.max(1),
        }
    }

    /// Open a `Pending` transfer.
    ///
    /// The quantity check here only rejects obviously impossible requests
    /// early; shipping re-validates against the locked batches.
    pub async fn create_transfer(
        &self,
        actor: &Actor,
        input: CreateTransferInput,
    ) -> AppResult<TransferDetails> {
        if !actor.role.is_privileged() {
            return Err(AppError::Unauthorized(
                "Only Manager/Admin can create transfers".to_string(),
            ));
        }

        if !self.store.store_exists(input.destination_store_id).await? {
            return Err(AppError::NotFound("Destination store".to_string()));
        }

        validate_transfer_items(&input.items).map_err(|msg| AppError::validation("items", msg))?;

        for item in &input.items {
            let batch = self
                .store
                .get_batch(item.batch_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Batch {}", item.batch_id)))?;
            if !batch.has_available(item.quantity) {
                return Err(insufficient(&batch, batch.current_quantity, item.quantity));
            }
        }

        for attempt in 1..=self.code_attempts {
            let new_transfer = NewTransfer {
                code: next_transfer_code(),
                destination_store_id: input.destination_store_id,
                created_by: actor.user_id,
                items: input.items.clone(),
            };

            match self.store.insert_transfer(&new_transfer).await? {
                Some(transfer) => {
                    info!(
                        transfer_id = %transfer.id,
                        code = %transfer.code,
                        store_id = %transfer.destination_store_id,
                        items = transfer.items.len(),
                        "Transfer created"
                    );
                    return self.details(transfer.id).await;
                }
                None => warn!(code = %new_transfer.code, attempt, "Transfer code already taken, retrying"),
            }
        }

        Err(AppError::Conflict(
            "Could not allocate a unique transfer code".to_string(),
        ))
    }

    /// Move a transfer to `requested` on behalf of `actor`.
    ///
    /// Checks run in order: status present, transfer exists, status
    /// recognised, edge legal, actor allowed, and for shipments every batch
    /// exists with enough stock.
    pub async fn request_transition(
        &self,
        transfer_id: Uuid,
        requested: Option<&str>,
        actor: &Actor,
    ) -> AppResult<TransferDetails> {
        let requested = requested
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::validation("status", "Status is required"))?;

        let mut unit = self.store.begin().await?;

        let mut transfer = unit
            .lock_transfer(transfer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;

        let target = TransferStatus::parse(requested)
            .map_err(|e| AppError::validation("status", e.to_string()))?;

        if !transfer.status.can_transition_to(target) {
            debug!(transfer_id = %transfer.id, from = %transfer.status, to = %target, "Illegal transition");
            return Err(AppError::InvalidTransition(transition_error(
                transfer.status,
                target,
            )));
        }

        if let AccessDecision::Denied(reason) =
            authorize_transition(actor, transfer.destination_store_id, target)
        {
            warn!(
                transfer_id = %transfer.id,
                user_id = %actor.user_id,
                role = %actor.role,
                to = %target,
                "Transition denied"
            );
            return Err(AppError::Unauthorized(reason.to_string()));
        }

        let now = Utc::now();
        match target {
            TransferStatus::Shipped => {
                ship(unit.as_mut(), &transfer).await?;
                transfer.shipped_at = Some(now);
            }
            TransferStatus::Received => {
                receive(unit.as_mut(), &transfer, now).await?;
                transfer.received_at = Some(now);
            }
            TransferStatus::Cancelled | TransferStatus::Pending => {}
        }

        let from = transfer.status;
        transfer.status = target;
        transfer.updated_at = now;
        unit.save_transfer_status(&transfer).await?;
        unit.commit().await?;

        info!(
            transfer_id = %transfer.id,
            code = %transfer.code,
            from = %from,
            to = %target,
            user_id = %actor.user_id,
            "Transfer status updated"
        );

        self.details(transfer.id).await
    }

    /// Fetch one transfer; store staff only see their own store's
    pub async fn get_transfer(&self, actor: &Actor, transfer_id: Uuid) -> AppResult<TransferDetails> {
        let details = self.details(transfer_id).await?;
        if !can_view_transfer(actor, details.destination_store.id) {
            return Err(AppError::Unauthorized(
                "You can only view transfers to your store".to_string(),
            ));
        }
        Ok(details)
    }

    /// List transfers, newest first, optionally by status
    pub async fn list_transfers(
        &self,
        actor: &Actor,
        status: Option<&str>,
    ) -> AppResult<Vec<TransferDetails>> {
        let status = status
            .filter(|s| !s.is_empty())
            .map(TransferStatus::parse)
            .transpose()
            .map_err(|e| AppError::validation("status", e.to_string()))?;

        let destination_store_id = match actor.role {
            Role::StoreStaff => Some(actor.store_id.ok_or_else(|| {
                AppError::Unauthorized("Store staff must be assigned to a store".to_string())
            })?),
            _ => None,
        };

        self.store
            .list_transfers(&TransferFilter {
                status,
                destination_store_id,
            })
            .await
    }

    /// Delete a transfer that has not left `Pending`
    pub async fn delete_transfer(&self, actor: &Actor, transfer_id: Uuid) -> AppResult<()> {
        if !actor.role.is_privileged() {
            return Err(AppError::Unauthorized(
                "Only Manager/Admin can delete transfers".to_string(),
            ));
        }

        let mut unit = self.store.begin().await?;
        let transfer = unit
            .lock_transfer(transfer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;

        if transfer.status != TransferStatus::Pending {
            return Err(AppError::InvalidTransition(
                "Can only delete Pending transfers".to_string(),
            ));
        }

        unit.delete_transfer(transfer_id).await?;
        unit.commit().await?;

        info!(transfer_id = %transfer_id, code = %transfer.code, "Transfer deleted");
        Ok(())
    }

    async fn details(&self, transfer_id: Uuid) -> AppResult<TransferDetails> {
        self.store
            .transfer_details(transfer_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transfer".to_string()))
    }
}

/// Check every line against the locked batches, then debit them
async fn ship(unit: &mut dyn StockUnit, transfer: &Transfer) -> AppResult<()> {
    let batches = lock_batches(unit, transfer).await?;

    // Lines drawing on the same batch share its stock
    let mut remaining: HashMap<Uuid, i32> = batches
        .values()
        .map(|b| (b.id, b.current_quantity))
        .collect();

    for item in &transfer.items {
        let batch = batches
            .get(&item.batch_id)
            .ok_or_else(|| AppError::NotFound(format!("Batch {}", item.batch_id)))?;
        let available = remaining.entry(batch.id).or_insert(batch.current_quantity);
        if item.quantity > *available {
            return Err(insufficient(batch, *available, item.quantity));
        }
        *available -= item.quantity;
    }

    for item in &transfer.items {
        unit.decrement_batch_quantity(item.batch_id, item.quantity)
            .await?;
    }
    Ok(())
}

/// Credit every line to the destination store's stock
async fn receive(unit: &mut dyn StockUnit, transfer: &Transfer, at: DateTime<Utc>) -> AppResult<()> {
    let batches = lock_batches(unit, transfer).await?;

    let mut lines = Vec::with_capacity(transfer.items.len());
    for item in &transfer.items {
        let batch = batches
            .get(&item.batch_id)
            .ok_or_else(|| AppError::NotFound(format!("Batch {}", item.batch_id)))?;
        lines.push((item, batch.product_id));
    }

    let store_id = transfer.destination_store_id;
    for (item, product_id) in lines {
        let existing = unit.get_store_inventory(store_id, item.batch_id).await?;
        let row = unit
            .upsert_store_inventory(store_id, item.batch_id, product_id, item.quantity, at)
            .await?;
        debug!(
            store_id = %store_id,
            batch_id = %item.batch_id,
            created = existing.is_none(),
            quantity = row.quantity,
            "Store stock credited"
        );
    }
    Ok(())
}

async fn lock_batches(
    unit: &mut dyn StockUnit,
    transfer: &Transfer,
) -> AppResult<HashMap<Uuid, Batch>> {
    let mut ids: Vec<Uuid> = transfer.items.iter().map(|i| i.batch_id).collect();
    ids.sort();
    ids.dedup();
    Ok(unit
        .lock_batches(&ids)
        .await?
        .into_iter()
        .map(|b| (b.id, b))
        .collect())
}

fn insufficient(batch: &Batch, available: i32, requested: i32) -> AppError {
    AppError::InsufficientQuantity(format!(
        "Insufficient quantity for batch {}. Available: {}, Requested: {}",
        batch.code, available, requested
    ))
}

fn transition_error(from: TransferStatus, to: TransferStatus) -> String {
    if from == to {
        return format!("Transfer is already {}", from);
    }
    if from.is_terminal() {
        return format!("Transfer is {} and can no longer change", from);
    }
    match to {
        TransferStatus::Shipped => format!("Cannot ship transfer with status: {}", from),
        TransferStatus::Received => format!("Cannot receive transfer with status: {}", from),
        TransferStatus::Cancelled => "Can only cancel Pending transfers".to_string(),
        TransferStatus::Pending => "Transfers cannot be moved back to Pending".to_string(),
    }
}

fn next_transfer_code() -> String {
    let suffix = rand::thread_rng().gen_range(0..10_000u16);
    generate_transfer_code(Utc::now().date_naive(), suffix)
}
