//! Validation utilities for the Central Kitchen Platform

use chrono::{DateTime, Utc};

use crate::models::TransferItem;

// ============================================================================
// Transfer Validations
// ============================================================================

/// Validate transfer lines: at least one, every quantity at least 1
pub fn validate_transfer_items(items: &[TransferItem]) -> Result<(), &'static str> {
    if items.is_empty() {
        return Err("Transfer must have at least one item");
    }
    if items.iter().any(|item| item.quantity < 1) {
        return Err("Quantity must be at least 1");
    }
    Ok(())
}

/// Validate transfer code format: TRF-YYYYMMDD-NNNN
pub fn validate_transfer_code(code: &str) -> Result<(), &'static str> {
    let parts: Vec<&str> = code.split('-').collect();
    match parts.as_slice() {
        [prefix, date, suffix]
            if *prefix == crate::models::TRANSFER_CODE_PREFIX
                && date.len() == 8
                && suffix.len() == 4
                && date.chars().chain(suffix.chars()).all(|c| c.is_ascii_digit()) =>
        {
            Ok(())
        }
        _ => Err("Transfer code must look like TRF-YYYYMMDD-NNNN"),
    }
}

// ============================================================================
// Batch Validations
// ============================================================================

/// Expiry must be strictly after manufacture
pub fn validate_batch_dates(
    manufactured_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<(), &'static str> {
    if expires_at <= manufactured_at {
        return Err("Expiration date must be after manufacturing date");
    }
    Ok(())
}

/// Quantities cannot be negative and a batch cannot hold more than it was made with
pub fn validate_batch_quantities(initial: i32, current: i32) -> Result<(), &'static str> {
    if initial < 0 {
        return Err("Initial quantity cannot be negative");
    }
    if current < 0 {
        return Err("Quantity cannot be negative");
    }
    if current > initial {
        return Err("Current quantity cannot exceed initial quantity");
    }
    Ok(())
}
