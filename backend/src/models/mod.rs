//! Database models for the Central Kitchen Platform
//!
//! Re-exports models from the shared crate

pub use shared::models::*;
pub use shared::types::*;
