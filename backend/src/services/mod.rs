//! Business logic services for the Central Kitchen Platform

pub mod auth;
pub mod batch;
pub mod inventory;
pub mod transfer;

pub use auth::{AuthService, TokenIssuer};
pub use batch::BatchService;
pub use inventory::InventoryService;
pub use transfer::TransferWorkflow;
