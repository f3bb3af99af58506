//! Domain layer for the order-processing system.
//!
//! This crate provides:
//! - Money and the purchase/sale order model
//! - The line-item aggregator that validates and totals order requests
//! - Translation of sparse list filters into order query predicates
//! - The inventory product record

pub mod order;
pub mod product;
pub mod query;

pub use order::{
    DraftOrder, HeaderPatch, LineRequest, Money, Order, OrderError, OrderHeader, OrderKind,
    OrderLine, OrderRequest, UnknownOrderKind, aggregate,
};
pub use product::{NewProduct, Product, ProductPatch};
pub use query::{
    Clause, FilterError, OrderFilter, OrderQuery, ProductFilter, ProductQuery, build_predicate,
    build_product_query,
};
