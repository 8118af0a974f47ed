//! Shared types and models for the Central Kitchen Platform
//!
//! This crate contains the domain types and pure decision logic shared by the
//! backend and any other component that needs to reason about batches,
//! transfers and store stock without touching storage.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
