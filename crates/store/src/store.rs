use async_trait::async_trait;
use common::{OrderId, ProductId};
use domain::{
    DraftOrder, HeaderPatch, NewProduct, Order, OrderKind, OrderQuery, Product, ProductPatch,
    ProductQuery,
};

use crate::Result;

/// Durable write side of the order repository.
///
/// Only reachable through a [`StoreTransaction`], so that an order and its
/// inventory effects become visible together or not at all.
#[async_trait]
pub trait OrderRepository: Send {
    /// Persists an order header and all of its lines in one write.
    ///
    /// The store assigns the order ID and the creation timestamp. Line order
    /// is preserved. Fails with
    /// [`StoreError::DuplicateKey`](crate::StoreError::DuplicateKey) if another
    /// order of the same kind already carries the draft's idempotency key.
    async fn save_order(&mut self, draft: &DraftOrder) -> Result<Order>;

    /// Finds an order of the given kind by its idempotency key.
    async fn find_by_idempotency_key(
        &mut self,
        kind: OrderKind,
        key: &str,
    ) -> Result<Option<Order>>;
}

/// The single write path to a product's on-hand count.
#[async_trait]
pub trait InventoryStore: Send {
    /// Atomically adds `delta` to the product's on-hand count and returns
    /// the updated product.
    ///
    /// Fails with [`StoreError::ProductNotFound`](crate::StoreError::ProductNotFound)
    /// for an unknown product and with
    /// [`StoreError::InsufficientStock`](crate::StoreError::InsufficientStock)
    /// if the count would drop below zero. Concurrent adjustments of the same
    /// product are serialized by the store.
    async fn adjust_stock(&mut self, product_id: ProductId, delta: i64) -> Result<Product>;
}

/// A unit of work spanning order persistence and inventory adjustment.
///
/// Nothing written through the transaction is visible to other readers until
/// [`commit`](StoreTransaction::commit). Dropping a transaction without
/// committing discards every write made through it.
#[async_trait]
pub trait StoreTransaction: OrderRepository + InventoryStore + Sized {
    /// Makes every write of this transaction visible.
    async fn commit(self) -> Result<()>;

    /// Discards every write of this transaction.
    async fn rollback(self) -> Result<()>;
}

/// Core trait for order and inventory store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// The transaction type handed out by [`OrderStore::begin`].
    type Tx: StoreTransaction;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Loads an order of the given kind with its lines.
    async fn load_order(&self, kind: OrderKind, id: OrderId) -> Result<Order>;

    /// Lists the orders matching a query, newest first.
    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>>;

    /// Applies the non-blank fields of a patch to an order header and returns
    /// the updated order. Lines and totals are never modified.
    async fn update_order_header(
        &self,
        kind: OrderKind,
        id: OrderId,
        patch: &HeaderPatch,
    ) -> Result<Order>;

    /// Deletes an order and its lines, returning the number of orders
    /// removed. Inventory is left untouched.
    async fn delete_order(&self, kind: OrderKind, id: OrderId) -> Result<u64>;

    /// Registers a new product with no stock on hand.
    async fn create_product(&self, product: NewProduct) -> Result<Product>;

    /// Loads a product.
    async fn get_product(&self, id: ProductId) -> Result<Product>;

    /// Applies an administrative patch to a product's catalog fields and
    /// returns the updated product. The on-hand count is never modified.
    async fn update_product(&self, id: ProductId, patch: &ProductPatch) -> Result<Product>;

    /// Lists the products matching a query, newest first.
    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>>;
}
