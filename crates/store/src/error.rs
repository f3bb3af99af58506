use common::{OrderId, ProductId};
use domain::OrderKind;
use thiserror::Error;

/// Errors that can occur when interacting with the order and inventory store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// No order of this kind exists with the given ID.
    #[error("{kind} not found: {id}")]
    OrderNotFound { kind: OrderKind, id: OrderId },

    /// A stock adjustment would drive the on-hand count below zero.
    #[error(
        "Insufficient stock for product {product_id}: {on_hand} on hand, adjustment of {delta}"
    )]
    InsufficientStock {
        product_id: ProductId,
        on_hand: i64,
        delta: i64,
    },

    /// Another order of this kind already holds the idempotency key.
    #[error("Duplicate idempotency key for {kind}: {key}")]
    DuplicateKey { kind: OrderKind, key: String },

    /// The store could not serve the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A persisted row could not be mapped back to the domain model.
    #[error("Invalid stored row: {0}")]
    InvalidRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if the error reports a missing order or product.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::ProductNotFound(_) | StoreError::OrderNotFound { .. }
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
