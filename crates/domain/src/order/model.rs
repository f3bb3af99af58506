//! Request, draft and persisted shapes of a purchase or sale.

use chrono::{DateTime, Utc};
use common::{OrderId, PartyId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::{Money, OrderKind};

/// One requested line, as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price captured at order time.
    pub unit_price: Money,
}

impl LineRequest {
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }
}

/// A raw purchase or sale request before validation and totalling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Supplier of a purchase or client of a sale.
    pub counterparty_id: PartyId,
    /// User who recorded the order.
    pub actor_id: UserId,
    pub payment_method: String,
    #[serde(default)]
    pub description: String,
    pub lines: Vec<LineRequest>,
    /// Caller-chosen key that makes re-submitting the same request safe.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl OrderRequest {
    /// Creates a request with no lines; add them with [`OrderRequest::line`].
    pub fn new(
        counterparty_id: PartyId,
        actor_id: UserId,
        payment_method: impl Into<String>,
    ) -> Self {
        Self {
            counterparty_id,
            actor_id,
            payment_method: payment_method.into(),
            description: String::new(),
            lines: Vec::new(),
            idempotency_key: None,
        }
    }

    /// Appends a line.
    pub fn line(mut self, product_id: ProductId, quantity: u32, unit_price: Money) -> Self {
        self.lines
            .push(LineRequest::new(product_id, quantity, unit_price));
        self
    }

    /// Sets the free-text description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the idempotency key.
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// A normalized, priced order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    /// Always `quantity * unit_price`.
    pub total_price: Money,
}

/// Header-level fields of a purchase or sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHeader {
    pub kind: OrderKind,
    pub counterparty_id: PartyId,
    pub actor_id: UserId,
    pub payment_method: String,
    pub description: String,
    /// Total cost of a purchase or total sale price of a sale. Always the sum
    /// of the line totals.
    pub total: Money,
}

/// A validated and totalled order that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftOrder {
    pub header: OrderHeader,
    pub lines: Vec<OrderLine>,
    pub idempotency_key: Option<String>,
}

impl DraftOrder {
    pub fn kind(&self) -> OrderKind {
        self.header.kind
    }
}

/// A persisted order with its store-assigned identity and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    pub header: OrderHeader,
    pub lines: Vec<OrderLine>,
    pub idempotency_key: Option<String>,
}

impl Order {
    /// Builds the persisted form of a draft.
    pub fn from_draft(id: OrderId, created_at: DateTime<Utc>, draft: DraftOrder) -> Self {
        Self {
            id,
            created_at,
            header: draft.header,
            lines: draft.lines,
            idempotency_key: draft.idempotency_key,
        }
    }

    pub fn kind(&self) -> OrderKind {
        self.header.kind
    }

    pub fn total(&self) -> Money {
        self.header.total
    }

    /// Inventory deltas this order applies, one per line, in line order.
    pub fn stock_deltas(&self) -> impl Iterator<Item = (ProductId, i64)> + '_ {
        let kind = self.kind();
        self.lines
            .iter()
            .map(move |line| (line.product_id, kind.signed_delta(line.quantity)))
    }

    /// Returns true if the draft asks for the same order as this one.
    ///
    /// Compares kind, parties, lines and total. Description and payment
    /// method are left out since they may have been patched after creation.
    pub fn matches_draft(&self, draft: &DraftOrder) -> bool {
        self.header.kind == draft.header.kind
            && self.header.counterparty_id == draft.header.counterparty_id
            && self.header.actor_id == draft.header.actor_id
            && self.header.total == draft.header.total
            && self.lines == draft.lines
    }

    /// Returns true if any line references the product.
    pub fn has_product(&self, product_id: ProductId) -> bool {
        self.lines.iter().any(|line| line.product_id == product_id)
    }
}

/// Sparse update of the mutable header fields.
///
/// `None` and blank values leave the field untouched. Lines and totals are
/// immutable once an order is persisted, so they cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderPatch {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

impl HeaderPatch {
    /// Drops blank values so that only real changes remain.
    pub fn normalized(self) -> Self {
        fn keep(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        Self {
            description: keep(self.description),
            payment_method: keep(self.payment_method).map(|v| v.trim().to_string()),
        }
    }

    /// Returns true if the patch would not change anything.
    pub fn is_empty(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
        blank(&self.description) && blank(&self.payment_method)
    }

    /// Applies the non-blank fields to a header.
    pub fn apply_to(&self, header: &mut OrderHeader) {
        let patch = self.clone().normalized();
        if let Some(description) = patch.description {
            header.description = description;
        }
        if let Some(payment_method) = patch.payment_method {
            header.payment_method = payment_method;
        }
    }
}
