//! Domain models for the Central Kitchen Platform

mod batch;
mod inventory;
mod store;
mod transfer;
mod user;

pub use batch::*;
pub use inventory::*;
pub use store::*;
pub use transfer::*;
pub use user::*;
