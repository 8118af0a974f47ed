//! Common types used across the platform

use serde::{Deserialize, Serialize};

/// List response carrying the number of returned records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub count: usize,
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self {
            count: data.len(),
            data,
        }
    }
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self::new(data)
    }
}

/// Product fields shown next to batches and stock rows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductSummary {
    pub id: uuid::Uuid,
    pub name: String,
    pub sku: String,
}
