//! Purchase and sale orders.

mod aggregator;
mod kind;
mod model;
mod value_objects;

pub use aggregator::aggregate;
pub use kind::{OrderKind, UnknownOrderKind};
pub use model::{
    DraftOrder, HeaderPatch, LineRequest, Order, OrderHeader, OrderLine, OrderRequest,
};
pub use value_objects::Money;

use thiserror::Error;

/// Validation errors raised while aggregating an order request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// A required header field is missing or blank.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A line carries a negative unit price.
    #[error("Invalid price on line {line}: {price} (must not be negative)")]
    NegativePrice { line: usize, price: i64 },

    /// A line or order total does not fit the money representation.
    #[error("Amount overflow while totalling line {line}")]
    AmountOverflow { line: usize },

    /// No line with a non-zero quantity was supplied.
    #[error("Order has no items")]
    NoItems,
}
