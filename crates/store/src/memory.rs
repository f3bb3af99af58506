use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, ProductId};
use domain::{
    DraftOrder, HeaderPatch, NewProduct, Order, OrderKind, OrderQuery, Product, ProductPatch,
    ProductQuery,
};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::{
    Result, StoreError,
    store::{InventoryStore, OrderRepository, OrderStore, StoreTransaction},
};

/// One stock adjustment, as requested of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    pub delta: i64,
}

#[derive(Debug, Default)]
struct MemoryState {
    products: HashMap<ProductId, Product>,
    /// Orders keyed by insertion sequence.
    orders: BTreeMap<u64, Order>,
    by_id: HashMap<OrderId, u64>,
    by_key: HashMap<(OrderKind, String), OrderId>,
    next_seq: u64,
}

impl MemoryState {
    fn order(&self, kind: OrderKind, id: OrderId) -> Option<&Order> {
        let seq = self.by_id.get(&id)?;
        self.orders.get(seq).filter(|o| o.kind() == kind)
    }

    fn order_mut(&mut self, kind: OrderKind, id: OrderId) -> Option<&mut Order> {
        let seq = self.by_id.get(&id)?;
        self.orders.get_mut(seq).filter(|o| o.kind() == kind)
    }

    fn order_by_key(&self, kind: OrderKind, key: &str) -> Option<&Order> {
        let id = self.by_key.get(&(kind, key.to_string()))?;
        self.order(kind, *id)
    }

    fn insert_order(&mut self, order: Order) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(key) = &order.idempotency_key {
            self.by_key.insert((order.kind(), key.clone()), order.id);
        }
        self.by_id.insert(order.id, seq);
        self.orders.insert(seq, order);
    }

    fn remove_order(&mut self, kind: OrderKind, id: OrderId) -> bool {
        if self.order(kind, id).is_none() {
            return false;
        }
        let Some(seq) = self.by_id.remove(&id) else {
            return false;
        };
        if let Some(order) = self.orders.remove(&seq)
            && let Some(key) = order.idempotency_key
        {
            self.by_key.remove(&(kind, key));
        }
        true
    }
}

#[derive(Debug, Default)]
struct Faults {
    fail_on_save: bool,
    fail_on_adjust: HashSet<ProductId>,
    adjust_delay: Option<Duration>,
    hidden_key_lookups: usize,
}

#[derive(Debug, Default)]
struct Journal {
    attempted: Vec<StockAdjustment>,
    committed: Vec<StockAdjustment>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory order and inventory store.
///
/// Transactions are serialized: a transaction holds the store's write lock
/// from [`OrderStore::begin`] until it is committed, rolled back or dropped.
/// It stages only its own writes and applies them on commit.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
    faults: Arc<Mutex<Faults>>,
    journal: Option<Arc<Mutex<Journal>>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that records every stock adjustment, for tests
    /// that assert on [`attempted_adjustments`](Self::attempted_adjustments)
    /// and [`committed_adjustments`](Self::committed_adjustments).
    pub fn recording() -> Self {
        Self {
            journal: Some(Arc::default()),
            ..Self::default()
        }
    }

    /// Configures the store to fail every `save_order` call.
    pub fn set_fail_on_save(&self, fail: bool) {
        lock(&self.faults).fail_on_save = fail;
    }

    /// Configures the store to fail every adjustment of the given product.
    pub fn set_fail_on_adjust(&self, product_id: ProductId, fail: bool) {
        let mut faults = lock(&self.faults);
        if fail {
            faults.fail_on_adjust.insert(product_id);
        } else {
            faults.fail_on_adjust.remove(&product_id);
        }
    }

    /// Delays every stock adjustment, to simulate a slow store.
    pub fn set_adjust_delay(&self, delay: Option<Duration>) {
        lock(&self.faults).adjust_delay = delay;
    }

    /// Makes the next `count` idempotency-key lookups miss, as they would
    /// while a concurrent transaction holding the key is still uncommitted.
    pub fn hide_idempotency_lookups(&self, count: usize) {
        lock(&self.faults).hidden_key_lookups = count;
    }

    /// Returns every `adjust_stock` call made, committed or not. Empty unless
    /// the store was created with [`recording`](Self::recording).
    pub fn attempted_adjustments(&self) -> Vec<StockAdjustment> {
        self.journal
            .as_ref()
            .map(|j| lock(j).attempted.clone())
            .unwrap_or_default()
    }

    /// Returns the adjustments that were committed. Empty unless the store
    /// was created with [`recording`](Self::recording).
    pub fn committed_adjustments(&self) -> Vec<StockAdjustment> {
        self.journal
            .as_ref()
            .map(|j| lock(j).committed.clone())
            .unwrap_or_default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = self.state.clone().write_owned().await;
        Ok(InMemoryTransaction {
            guard,
            new_orders: Vec::new(),
            stock: HashMap::new(),
            adjustments: Vec::new(),
            faults: self.faults.clone(),
            journal: self.journal.clone(),
        })
    }

    async fn load_order(&self, kind: OrderKind, id: OrderId) -> Result<Order> {
        let state = self.state.read().await;
        state
            .order(kind, id)
            .cloned()
            .ok_or(StoreError::OrderNotFound { kind, id })
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        // Newest insert first, then a stable sort keeps that order for ties.
        let mut orders: Vec<_> = state
            .orders
            .values()
            .rev()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_order_header(
        &self,
        kind: OrderKind,
        id: OrderId,
        patch: &HeaderPatch,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state
            .order_mut(kind, id)
            .ok_or(StoreError::OrderNotFound { kind, id })?;
        patch.apply_to(&mut order.header);
        Ok(order.clone())
    }

    async fn delete_order(&self, kind: OrderKind, id: OrderId) -> Result<u64> {
        let mut state = self.state.write().await;
        Ok(u64::from(state.remove_order(kind, id)))
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        let product = product.into_product(ProductId::new(), Utc::now());
        let mut state = self.state.write().await;
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get_product(&self, id: ProductId) -> Result<Product> {
        let state = self.state.read().await;
        state
            .products
            .get(&id)
            .cloned()
            .ok_or(StoreError::ProductNotFound(id))
    }

    async fn update_product(&self, id: ProductId, patch: &ProductPatch) -> Result<Product> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&id)
            .ok_or(StoreError::ProductNotFound(id))?;
        patch.apply_to(product);
        Ok(product.clone())
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<_> = state
            .products
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }
}

/// Transaction over an [`InMemoryStore`].
pub struct InMemoryTransaction {
    guard: OwnedRwLockWriteGuard<MemoryState>,
    new_orders: Vec<Order>,
    /// Products whose stock this transaction changed, with their new counts.
    stock: HashMap<ProductId, Product>,
    adjustments: Vec<StockAdjustment>,
    faults: Arc<Mutex<Faults>>,
    journal: Option<Arc<Mutex<Journal>>>,
}

impl InMemoryTransaction {
    fn staged_by_key(&self, kind: OrderKind, key: &str) -> Option<&Order> {
        self.new_orders
            .iter()
            .find(|o| o.kind() == kind && o.idempotency_key.as_deref() == Some(key))
            .or_else(|| self.guard.order_by_key(kind, key))
    }
}

#[async_trait]
impl OrderRepository for InMemoryTransaction {
    async fn save_order(&mut self, draft: &DraftOrder) -> Result<Order> {
        if lock(&self.faults).fail_on_save {
            return Err(StoreError::Unavailable("order write rejected".to_string()));
        }
        if let Some(key) = draft.idempotency_key.as_deref()
            && self.staged_by_key(draft.kind(), key).is_some()
        {
            return Err(StoreError::DuplicateKey {
                kind: draft.kind(),
                key: key.to_string(),
            });
        }

        let order = Order::from_draft(OrderId::new(), Utc::now(), draft.clone());
        self.new_orders.push(order.clone());
        Ok(order)
    }

    async fn find_by_idempotency_key(
        &mut self,
        kind: OrderKind,
        key: &str,
    ) -> Result<Option<Order>> {
        {
            let mut faults = lock(&self.faults);
            if faults.hidden_key_lookups > 0 {
                faults.hidden_key_lookups -= 1;
                return Ok(None);
            }
        }
        Ok(self.staged_by_key(kind, key).cloned())
    }
}

#[async_trait]
impl InventoryStore for InMemoryTransaction {
    async fn adjust_stock(&mut self, product_id: ProductId, delta: i64) -> Result<Product> {
        if let Some(journal) = &self.journal {
            lock(journal)
                .attempted
                .push(StockAdjustment { product_id, delta });
        }

        let (fail, delay) = {
            let faults = lock(&self.faults);
            (
                faults.fail_on_adjust.contains(&product_id),
                faults.adjust_delay,
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(StoreError::Unavailable(format!(
                "stock update rejected for product {product_id}"
            )));
        }

        let current = match self.stock.get(&product_id) {
            Some(product) => product.clone(),
            None => self
                .guard
                .products
                .get(&product_id)
                .cloned()
                .ok_or(StoreError::ProductNotFound(product_id))?,
        };

        let on_hand = current.on_hand_count;
        let count = on_hand
            .checked_add(delta)
            .filter(|count| *count >= 0)
            .ok_or(StoreError::InsufficientStock {
                product_id,
                on_hand,
                delta,
            })?;

        let product = Product {
            on_hand_count: count,
            ..current
        };
        self.stock.insert(product_id, product.clone());
        self.adjustments.push(StockAdjustment { product_id, delta });
        Ok(product)
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn commit(self) -> Result<()> {
        let Self {
            mut guard,
            new_orders,
            stock,
            adjustments,
            journal,
            ..
        } = self;

        for order in new_orders {
            guard.insert_order(order);
        }
        guard.products.extend(stock);
        if let Some(journal) = journal {
            lock(&journal).committed.extend(adjustments);
        }
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
