//! Transfer models, lifecycle rules and the transfer access policy

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{Actor, BatchSummary, Role, StoreSummary, UserSummary};

/// Prefix of every transfer code
pub const TRANSFER_CODE_PREFIX: &str = "TRF";

/// A shipment request from the central kitchen to one store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transfer {
    pub id: Uuid,
    /// Human-readable code, e.g. "TRF-20241023-0427"
    pub code: String,
    pub destination_store_id: Uuid,
    pub created_by: Uuid,
    pub status: TransferStatus,
    pub shipped_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    /// Never empty
    pub items: Vec<TransferItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of a transfer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferItem {
    pub batch_id: Uuid,
    pub quantity: i32,
}

/// Transfer lifecycle state.
///
/// Legal edges: Pending -> Shipped -> Received, Pending -> Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    Pending,
    Shipped,
    Received,
    Cancelled,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("'{0}' is not a valid transfer status")]
pub struct UnknownStatus(pub String);

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "Pending",
            TransferStatus::Shipped => "Shipped",
            TransferStatus::Received => "Received",
            TransferStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, UnknownStatus> {
        match s {
            "Pending" => Ok(TransferStatus::Pending),
            "Shipped" => Ok(TransferStatus::Shipped),
            "Received" => Ok(TransferStatus::Received),
            "Cancelled" => Ok(TransferStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }

    /// Received and Cancelled accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Received | TransferStatus::Cancelled)
    }

    pub fn can_transition_to(&self, target: TransferStatus) -> bool {
        matches!(
            (self, target),
            (TransferStatus::Pending, TransferStatus::Shipped)
                | (TransferStatus::Shipped, TransferStatus::Received)
                | (TransferStatus::Pending, TransferStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the transfer access policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Denied(&'static str),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed)
    }
}

/// Decide whether `actor` may move a transfer addressed to
/// `destination_store_id` into `target`.
///
/// Shipping and cancelling need Admin or Manager. Receiving is also open to
/// store staff of the destination store.
pub fn authorize_transition(
    actor: &Actor,
    destination_store_id: Uuid,
    target: TransferStatus,
) -> AccessDecision {
    match target {
        TransferStatus::Shipped if actor.role.is_privileged() => AccessDecision::Allowed,
        TransferStatus::Shipped => AccessDecision::Denied("Only Manager/Admin can ship transfers"),
        TransferStatus::Cancelled if actor.role.is_privileged() => AccessDecision::Allowed,
        TransferStatus::Cancelled => {
            AccessDecision::Denied("Only Manager/Admin can cancel transfers")
        }
        TransferStatus::Received => match actor.role {
            Role::Admin | Role::Manager => AccessDecision::Allowed,
            Role::StoreStaff if actor.works_at(destination_store_id) => AccessDecision::Allowed,
            Role::StoreStaff => {
                AccessDecision::Denied("You can only receive transfers to your store")
            }
            _ => AccessDecision::Denied("Only StoreStaff/Manager/Admin can receive transfers"),
        },
        TransferStatus::Pending => AccessDecision::Denied("Transfers cannot be moved back to Pending"),
    }
}

/// Store staff only see transfers addressed to their own store
pub fn can_view_transfer(actor: &Actor, destination_store_id: Uuid) -> bool {
    match actor.role {
        Role::StoreStaff => actor.works_at(destination_store_id),
        _ => true,
    }
}

/// Build a transfer code: `TRF-YYYYMMDD-NNNN`
pub fn generate_transfer_code(date: NaiveDate, suffix: u16) -> String {
    format!(
        "{}-{}-{:04}",
        TRANSFER_CODE_PREFIX,
        date.format("%Y%m%d"),
        suffix % 10_000
    )
}

/// A validated transfer ready to be stored
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub code: String,
    pub destination_store_id: Uuid,
    pub created_by: Uuid,
    pub items: Vec<TransferItem>,
}

/// A transfer line with its batch and product resolved
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferLine {
    pub batch: BatchSummary,
    pub quantity: i32,
}

/// A transfer with its store, creator and batches resolved for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferDetails {
    pub id: Uuid,
    pub code: String,
    pub status: TransferStatus,
    pub destination_store: StoreSummary,
    pub created_by: Option<UserSummary>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub items: Vec<TransferLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
