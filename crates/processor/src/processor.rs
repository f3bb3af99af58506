//! Order processor: aggregation, persistence and inventory adjustment.

use std::time::Instant;

use common::{OrderId, ProductId};
use domain::{
    DraftOrder, HeaderPatch, NewProduct, Order, OrderFilter, OrderKind, OrderRequest, Product,
    ProductFilter, ProductPatch, aggregate, build_predicate, build_product_query,
};
use serde::Serialize;
use store::{InventoryStore, OrderRepository, OrderStore, StoreError, StoreTransaction};

use crate::config::ProcessorConfig;
use crate::error::{ProcessError, Result};

/// Outcome of a successful purchase or sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedOrder {
    pub order: Order,
    /// Product state after each line's adjustment, in line order.
    pub stock: Vec<Product>,
    /// True if the order already existed under the request's idempotency key.
    /// No stock was adjusted in that case and `stock` is empty.
    pub replayed: bool,
}

/// Turns purchase and sale requests into persisted orders with their
/// inventory effects applied.
///
/// Every create runs in a single store transaction: the order and all of its
/// stock adjustments are committed together, or none of them are.
#[derive(Clone)]
pub struct OrderProcessor<S: OrderStore> {
    store: S,
    config: ProcessorConfig,
}

impl<S: OrderStore> OrderProcessor<S> {
    /// Creates a processor with default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, ProcessorConfig::default())
    }

    pub fn with_config(store: S, config: ProcessorConfig) -> Self {
        Self { store, config }
    }

    /// Records a purchase and adds every line's quantity to stock.
    pub async fn create_purchase(&self, request: OrderRequest) -> Result<ProcessedOrder> {
        self.create(OrderKind::Purchase, request).await
    }

    /// Records a sale and removes every line's quantity from stock.
    pub async fn create_sale(&self, request: OrderRequest) -> Result<ProcessedOrder> {
        self.create(OrderKind::Sale, request).await
    }

    #[tracing::instrument(skip_all, fields(kind = %kind, lines = request.lines.len()))]
    async fn create(&self, kind: OrderKind, request: OrderRequest) -> Result<ProcessedOrder> {
        let start = Instant::now();

        let result = match aggregate(kind, request) {
            Ok(draft) => match self.config.request_timeout {
                Some(limit) => tokio::time::timeout(limit, self.persist(draft))
                    .await
                    .unwrap_or(Err(ProcessError::TimedOut(limit))),
                None => self.persist(draft).await,
            },
            Err(e) => Err(e.into()),
        };

        metrics::histogram!("order_processing_seconds", "kind" => kind.as_str())
            .record(start.elapsed().as_secs_f64());

        match &result {
            Ok(processed) if processed.replayed => {
                tracing::info!(
                    order_id = %processed.order.id,
                    "order replayed from idempotency key"
                );
            }
            Ok(processed) => {
                metrics::counter!("orders_created_total", "kind" => kind.as_str()).increment(1);
                tracing::info!(
                    order_id = %processed.order.id,
                    total = %processed.order.total(),
                    "order created"
                );
            }
            Err(e) => {
                let stage = e.stage();
                metrics::counter!(
                    "orders_failed_total",
                    "kind" => kind.as_str(),
                    "stage" => stage.as_str()
                )
                .increment(1);
                tracing::warn!(stage = %stage, error = %e, "order rejected");
            }
        }

        result
    }

    /// Persists a draft and applies its stock deltas in line order inside one
    /// transaction. Stops at the first failing line.
    async fn persist(&self, draft: DraftOrder) -> Result<ProcessedOrder> {
        let kind = draft.kind();
        let mut tx = self.store.begin().await.map_err(ProcessError::Persistence)?;

        if let Some(key) = draft.idempotency_key.as_deref() {
            let existing = match tx.find_by_idempotency_key(kind, key).await {
                Ok(existing) => existing,
                Err(e) => return abort(tx, ProcessError::Persistence(e)).await,
            };
            if let Some(order) = existing {
                tx.rollback().await.map_err(ProcessError::Persistence)?;
                return replay(order, &draft);
            }
        }

        let order = match tx.save_order(&draft).await {
            Ok(order) => order,
            Err(StoreError::DuplicateKey { key, .. }) => {
                // A concurrent request holding the same key committed first.
                tx.rollback().await.map_err(ProcessError::Persistence)?;
                return self.replay_committed(&draft, key).await;
            }
            Err(e) => return abort(tx, ProcessError::Persistence(e)).await,
        };

        let mut stock = Vec::with_capacity(order.lines.len());
        for (index, (product_id, delta)) in order.stock_deltas().enumerate() {
            match tx.adjust_stock(product_id, delta).await {
                Ok(product) => {
                    metrics::counter!("stock_adjustments_total", "kind" => kind.as_str())
                        .increment(1);
                    stock.push(product);
                }
                Err(source) => {
                    tracing::warn!(
                        order_id = %order.id,
                        line = index + 1,
                        product_id = %product_id,
                        delta,
                        "inventory adjustment failed, rolling back"
                    );
                    let err = ProcessError::InventoryAdjustment {
                        line: index + 1,
                        product_id,
                        source,
                    };
                    return abort(tx, err).await;
                }
            }
        }

        tx.commit().await.map_err(ProcessError::Persistence)?;

        Ok(ProcessedOrder {
            order,
            stock,
            replayed: false,
        })
    }

    /// Re-reads the order that won the idempotency key in a fresh transaction.
    async fn replay_committed(&self, draft: &DraftOrder, key: String) -> Result<ProcessedOrder> {
        let kind = draft.kind();
        let mut tx = self.store.begin().await.map_err(ProcessError::Persistence)?;
        let existing = tx.find_by_idempotency_key(kind, &key).await;
        tx.rollback().await.map_err(ProcessError::Persistence)?;

        match existing.map_err(ProcessError::Persistence)? {
            Some(order) => replay(order, draft),
            None => Err(ProcessError::Persistence(StoreError::DuplicateKey {
                kind,
                key,
            })),
        }
    }

    /// Loads one order of the given kind.
    pub async fn get_order(&self, kind: OrderKind, id: OrderId) -> Result<Order> {
        Ok(self.store.load_order(kind, id).await?)
    }

    /// Lists the orders of one kind matching a sparse filter, newest first.
    #[tracing::instrument(skip_all, fields(kind = %kind))]
    pub async fn list_orders(&self, kind: OrderKind, filter: &OrderFilter) -> Result<Vec<Order>> {
        let query = build_predicate(kind, filter)?;
        Ok(self.store.list_orders(&query).await?)
    }

    /// Updates the description and/or payment method of an order.
    ///
    /// Blank fields are ignored; an empty patch returns the order unchanged.
    #[tracing::instrument(skip_all, fields(kind = %kind, order_id = %id))]
    pub async fn update_order_header(
        &self,
        kind: OrderKind,
        id: OrderId,
        patch: HeaderPatch,
    ) -> Result<Order> {
        if patch.is_empty() {
            return self.get_order(kind, id).await;
        }
        Ok(self.store.update_order_header(kind, id, &patch).await?)
    }

    /// Deletes an order and returns how many orders were removed (0 or 1).
    ///
    /// Stock adjusted by the order is not reversed.
    #[tracing::instrument(skip_all, fields(kind = %kind, order_id = %id))]
    pub async fn delete_order(&self, kind: OrderKind, id: OrderId) -> Result<u64> {
        let deleted = self.store.delete_order(kind, id).await?;
        if deleted > 0 {
            tracing::info!("order deleted");
        }
        Ok(deleted)
    }

    /// Registers a product with no stock on hand.
    pub async fn create_product(&self, product: NewProduct) -> Result<Product> {
        let product = self.store.create_product(product).await?;
        tracing::info!(product_id = %product.id, name = %product.name, "product created");
        Ok(product)
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        Ok(self.store.get_product(id).await?)
    }

    /// Updates a product's catalog fields. Stock on hand is never changed
    /// here; an empty patch returns the product unchanged.
    #[tracing::instrument(skip_all, fields(product_id = %id))]
    pub async fn update_product(&self, id: ProductId, patch: ProductPatch) -> Result<Product> {
        if patch.is_empty() {
            return self.get_product(id).await;
        }
        let product = self.store.update_product(id, &patch).await?;
        tracing::info!("product updated");
        Ok(product)
    }

    /// Lists products by category and name fragment, newest first.
    pub async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let query = build_product_query(filter)?;
        Ok(self.store.list_products(&query).await?)
    }
}

/// Answers a resubmission with the stored order, provided it asks for the
/// same thing.
fn replay(order: Order, draft: &DraftOrder) -> Result<ProcessedOrder> {
    if !order.matches_draft(draft) {
        return Err(ProcessError::IdempotencyConflict {
            kind: draft.kind(),
            key: order.idempotency_key.unwrap_or_default(),
        });
    }
    Ok(ProcessedOrder {
        order,
        stock: Vec::new(),
        replayed: true,
    })
}

/// Rolls back the transaction and returns the original error.
async fn abort<T, Tx: StoreTransaction>(tx: Tx, err: ProcessError) -> Result<T> {
    if let Err(rollback_err) = tx.rollback().await {
        tracing::warn!(error = %rollback_err, "rollback failed");
    }
    Err(err)
}
