//! HTTP handlers

pub mod auth;
pub mod batch;
pub mod health;
pub mod inventory;
pub mod transfer;

pub use auth::*;
pub use batch::*;
pub use health::*;
pub use inventory::*;
pub use transfer::*;
