//! Persistence for orders and inventory.
//!
//! [`OrderStore`] is the read and admin surface; writes that must land
//! together go through a [`StoreTransaction`] obtained from
//! [`OrderStore::begin`].

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTransaction, StockAdjustment};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use store::{InventoryStore, OrderRepository, OrderStore, StoreTransaction};
