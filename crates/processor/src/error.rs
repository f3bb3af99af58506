//! Order processing error types.

use std::time::Duration;

use common::ProductId;
use domain::{FilterError, OrderError, OrderKind};
use store::StoreError;
use thiserror::Error;

/// Step of order processing at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Aggregation,
    Persistence,
    Inventory,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Aggregation => "aggregation",
            Stage::Persistence => "persistence",
            Stage::Inventory => "inventory",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while processing orders.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The order request is malformed.
    #[error("Invalid order: {0}")]
    Validation(#[from] OrderError),

    /// A list filter could not be parsed.
    #[error("Invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),

    /// The requested order or product does not exist.
    #[error("{0}")]
    NotFound(StoreError),

    /// Writing or reading the order failed. Nothing was committed.
    #[error("Persistence failed: {0}")]
    Persistence(StoreError),

    /// Adjusting stock for a line failed. Nothing was committed.
    #[error("Inventory adjustment failed on line {line} for product {product_id}: {source}")]
    InventoryAdjustment {
        /// 1-based position among the persisted lines.
        line: usize,
        product_id: ProductId,
        #[source]
        source: StoreError,
    },

    /// The idempotency key already belongs to an order with different
    /// contents. Nothing was committed.
    #[error("Idempotency key {key:?} was already used for a different {kind}")]
    IdempotencyConflict { kind: OrderKind, key: String },

    /// The store did not finish within the configured request timeout.
    /// Nothing was committed.
    #[error("Order processing timed out after {0:?}")]
    TimedOut(Duration),
}

impl ProcessError {
    /// Returns the processing stage the error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            ProcessError::Validation(_) | ProcessError::InvalidFilter(_) => Stage::Aggregation,
            ProcessError::NotFound(_)
            | ProcessError::Persistence(_)
            | ProcessError::IdempotencyConflict { .. }
            | ProcessError::TimedOut(_) => Stage::Persistence,
            ProcessError::InventoryAdjustment { .. } => Stage::Inventory,
        }
    }

    /// Returns the underlying store error, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            ProcessError::NotFound(e) | ProcessError::Persistence(e) => Some(e),
            ProcessError::InventoryAdjustment { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Returns true if the error reports a missing order or product.
    pub fn is_not_found(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_not_found)
    }
}

impl From<StoreError> for ProcessError {
    fn from(err: StoreError) -> Self {
        if err.is_not_found() {
            ProcessError::NotFound(err)
        } else {
            ProcessError::Persistence(err)
        }
    }
}

/// Convenience type alias for processor results.
pub type Result<T> = std::result::Result<T, ProcessError>;
