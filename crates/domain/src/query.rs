//! Translation of sparse list filters into order query predicates.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use common::{CategoryId, PartyId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::{Order, OrderKind};
use crate::product::Product;

/// Sparse filter criteria for listing orders, as received from a caller.
///
/// Every field is optional. An absent, empty or whitespace-only value means
/// "no constraint on this field", never "match the empty string".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    /// Orders having at least one line for this product.
    #[serde(default)]
    pub product_id: Option<String>,
    /// Supplier (purchases) or client (sales).
    #[serde(default)]
    pub counterparty_id: Option<String>,
    /// User who recorded the order.
    #[serde(default)]
    pub actor_id: Option<String>,
    /// Inclusive lower creation-time bound (RFC 3339 or `YYYY-MM-DD`).
    #[serde(default)]
    pub created_from: Option<String>,
    /// Inclusive upper creation-time bound (RFC 3339 or `YYYY-MM-DD`; a bare
    /// date covers the whole day).
    #[serde(default)]
    pub created_to: Option<String>,
}

/// A filter field could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid filter field {field}: {value:?}")]
pub struct FilterError {
    pub field: &'static str,
    pub value: String,
}

/// A single constraint of an order query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Product(ProductId),
    Counterparty(PartyId),
    Actor(UserId),
    CreatedFrom(DateTime<Utc>),
    CreatedTo(DateTime<Utc>),
}

impl Clause {
    /// Returns true if the order satisfies this clause.
    pub fn matches(&self, order: &Order) -> bool {
        match *self {
            Clause::Product(id) => order.has_product(id),
            Clause::Counterparty(id) => order.header.counterparty_id == id,
            Clause::Actor(id) => order.header.actor_id == id,
            Clause::CreatedFrom(from) => order.created_at >= from,
            Clause::CreatedTo(to) => order.created_at <= to,
        }
    }
}

/// Query predicate over the orders of one kind.
///
/// Clauses are combined with logical AND; a query without clauses matches
/// every order of its kind. Results are ordered by creation time, newest
/// first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    pub kind: OrderKind,
    pub clauses: Vec<Clause>,
}

impl OrderQuery {
    /// Creates a query matching every order of the given kind.
    pub fn all(kind: OrderKind) -> Self {
        Self {
            kind,
            clauses: Vec::new(),
        }
    }

    /// Adds a clause.
    pub fn with(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    /// Returns true if the order is of the query's kind and satisfies every
    /// clause.
    pub fn matches(&self, order: &Order) -> bool {
        order.kind() == self.kind && self.clauses.iter().all(|c| c.matches(order))
    }
}

/// Builds the query predicate for a sparse filter.
///
/// Only fields holding a non-blank value contribute a clause. Set fields
/// that fail to parse are reported as a [`FilterError`].
pub fn build_predicate(kind: OrderKind, filter: &OrderFilter) -> Result<OrderQuery, FilterError> {
    let mut query = OrderQuery::all(kind);

    if let Some(value) = present(&filter.product_id) {
        let id = ProductId::parse(value).map_err(|_| invalid("product_id", value))?;
        query = query.with(Clause::Product(id));
    }
    if let Some(value) = present(&filter.counterparty_id) {
        let id = PartyId::parse(value).map_err(|_| invalid("counterparty_id", value))?;
        query = query.with(Clause::Counterparty(id));
    }
    if let Some(value) = present(&filter.actor_id) {
        let id = UserId::parse(value).map_err(|_| invalid("actor_id", value))?;
        query = query.with(Clause::Actor(id));
    }
    if let Some(value) = present(&filter.created_from) {
        let from =
            parse_bound(value, NaiveTime::MIN).ok_or_else(|| invalid("created_from", value))?;
        query = query.with(Clause::CreatedFrom(from));
    }
    if let Some(value) = present(&filter.created_to) {
        let end_of_day =
            NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
        let to = parse_bound(value, end_of_day).ok_or_else(|| invalid("created_to", value))?;
        query = query.with(Clause::CreatedTo(to));
    }

    Ok(query)
}

/// Sparse filter criteria for listing products.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    #[serde(default)]
    pub category_id: Option<String>,
    /// Case-insensitive substring of the product name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Query predicate over products. Results are ordered newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductQuery {
    pub category_id: Option<CategoryId>,
    pub name_contains: Option<String>,
}

impl ProductQuery {
    pub fn matches(&self, product: &Product) -> bool {
        let category = self
            .category_id
            .is_none_or(|id| product.category_id == Some(id));
        let name = self.name_contains.as_deref().is_none_or(|needle| {
            product
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase())
        });
        category && name
    }
}

/// Builds the product query for a sparse filter. Blank fields are ignored.
pub fn build_product_query(filter: &ProductFilter) -> Result<ProductQuery, FilterError> {
    let category_id = present(&filter.category_id)
        .map(|value| CategoryId::parse(value).map_err(|_| invalid("category_id", value)))
        .transpose()?;

    Ok(ProductQuery {
        category_id,
        name_contains: present(&filter.name).map(str::to_string),
    })
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn invalid(field: &'static str, value: &str) -> FilterError {
    FilterError {
        field,
        value: value.to_string(),
    }
}

/// Parses an RFC 3339 timestamp, or a bare date at the given time of day.
fn parse_bound(value: &str, time_of_day: NaiveTime) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(time_of_day).and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::order::{Money, OrderHeader, OrderLine};
    use common::OrderId;

    fn order(kind: OrderKind, product: ProductId, party: PartyId, actor: UserId) -> Order {
        Order {
            id: OrderId::new(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap(),
            header: OrderHeader {
                kind,
                counterparty_id: party,
                actor_id: actor,
                payment_method: "cash".to_string(),
                description: String::new(),
                total: Money::from_cents(100),
            },
            lines: vec![OrderLine {
                product_id: product,
                quantity: 1,
                unit_price: Money::from_cents(100),
                total_price: Money::from_cents(100),
            }],
            idempotency_key: None,
        }
    }

    #[test]
    fn empty_filter_matches_everything_of_its_kind() {
        let filter = OrderFilter {
            product_id: Some(String::new()),
            counterparty_id: Some("   ".to_string()),
            ..Default::default()
        };
        let query = build_predicate(OrderKind::Purchase, &filter).unwrap();

        assert!(query.clauses.is_empty());
        let purchase = order(OrderKind::Purchase, ProductId::new(), PartyId::new(), UserId::new());
        let sale = order(OrderKind::Sale, ProductId::new(), PartyId::new(), UserId::new());
        assert!(query.matches(&purchase));
        assert!(!query.matches(&sale));
    }

    #[test]
    fn single_field_constrains_only_that_field() {
        let party = PartyId::new();
        let filter = OrderFilter {
            counterparty_id: Some(party.to_string()),
            ..Default::default()
        };
        let query = build_predicate(OrderKind::Sale, &filter).unwrap();

        assert_eq!(query.clauses, vec![Clause::Counterparty(party)]);
        assert!(query.matches(&order(OrderKind::Sale, ProductId::new(), party, UserId::new())));
        assert!(!query.matches(&order(
            OrderKind::Sale,
            ProductId::new(),
            PartyId::new(),
            UserId::new()
        )));
    }

    #[test]
    fn clause_order_does_not_change_matches() {
        let product = ProductId::new();
        let actor = UserId::new();
        let hit = order(OrderKind::Purchase, product, PartyId::new(), actor);
        let miss = order(OrderKind::Purchase, product, PartyId::new(), UserId::new());

        let forward = OrderQuery::all(OrderKind::Purchase)
            .with(Clause::Product(product))
            .with(Clause::Actor(actor));
        let backward = OrderQuery::all(OrderKind::Purchase)
            .with(Clause::Actor(actor))
            .with(Clause::Product(product));

        for o in [&hit, &miss] {
            assert_eq!(forward.matches(o), backward.matches(o));
        }
        assert!(forward.matches(&hit));
        assert!(!forward.matches(&miss));
    }

    #[test]
    fn date_bounds_cover_whole_days() {
        let o = order(OrderKind::Sale, ProductId::new(), PartyId::new(), UserId::new());

        let same_day = OrderFilter {
            created_from: Some("2024-03-15".to_string()),
            created_to: Some("2024-03-15".to_string()),
            ..Default::default()
        };
        assert!(build_predicate(OrderKind::Sale, &same_day).unwrap().matches(&o));

        let day_before = OrderFilter {
            created_to: Some("2024-03-14".to_string()),
            ..Default::default()
        };
        assert!(!build_predicate(OrderKind::Sale, &day_before).unwrap().matches(&o));

        let rfc3339 = OrderFilter {
            created_from: Some("2024-03-15T12:00:00Z".to_string()),
            ..Default::default()
        };
        assert!(build_predicate(OrderKind::Sale, &rfc3339).unwrap().matches(&o));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let filter = OrderFilter {
            actor_id: Some("bob".to_string()),
            ..Default::default()
        };
        assert_eq!(
            build_predicate(OrderKind::Purchase, &filter),
            Err(FilterError {
                field: "actor_id",
                value: "bob".to_string()
            })
        );

        let filter = OrderFilter {
            created_from: Some("yesterday".to_string()),
            ..Default::default()
        };
        assert!(build_predicate(OrderKind::Purchase, &filter).is_err());
    }

    #[test]
    fn product_query_matches_category_and_name_fragment() {
        let category = CategoryId::new();
        let mut product = crate::product::NewProduct::new("Steel Bolt M8")
            .into_product(ProductId::new(), Utc::now());
        product.category_id = Some(category);

        let filter = ProductFilter {
            category_id: Some(category.to_string()),
            name: Some(" bolt ".to_string()),
        };
        let query = build_product_query(&filter).unwrap();
        assert_eq!(query.name_contains.as_deref(), Some("bolt"));
        assert!(query.matches(&product));

        let other_category = ProductQuery {
            category_id: Some(CategoryId::new()),
            name_contains: None,
        };
        assert!(!other_category.matches(&product));
        assert!(ProductQuery::default().matches(&product));

        let bad = ProductFilter {
            category_id: Some("tools".to_string()),
            name: None,
        };
        assert!(build_product_query(&bad).is_err());
    }
}
