//! Inventory product records.

use chrono::{DateTime, Utc};
use common::{CategoryId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::Money;

/// A product held in inventory.
///
/// `on_hand_count` only changes through stock adjustments; it never drops
/// below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub bill_format: String,
    /// Cost price paid to suppliers.
    pub incoming_price: Money,
    /// Standard sale price.
    pub standard_price: Money,
    pub on_hand_count: i64,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to register a new product. New products start with no
/// stock on hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    pub name: String,
    #[serde(default)]
    pub bill_format: String,
    pub incoming_price: Money,
    pub standard_price: Money,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

impl NewProduct {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            category_id: None,
            name: name.into(),
            bill_format: String::new(),
            incoming_price: Money::zero(),
            standard_price: Money::zero(),
            created_by: None,
        }
    }

    pub fn prices(mut self, incoming: Money, standard: Money) -> Self {
        self.incoming_price = incoming;
        self.standard_price = standard;
        self
    }

    pub fn bill_format(mut self, bill_format: impl Into<String>) -> Self {
        self.bill_format = bill_format.into();
        self
    }

    /// Builds the stored record with an empty stock count.
    pub fn into_product(self, id: ProductId, created_at: DateTime<Utc>) -> Product {
        Product {
            id,
            category_id: self.category_id,
            name: self.name,
            bill_format: self.bill_format,
            incoming_price: self.incoming_price,
            standard_price: self.standard_price,
            on_hand_count: 0,
            created_by: self.created_by,
            created_at,
        }
    }
}

/// Administrative update of a product's catalog fields.
///
/// `None` and blank strings leave a field untouched. The on-hand count is not
/// part of the patch; it only moves through stock adjustments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bill_format: Option<String>,
    #[serde(default)]
    pub incoming_price: Option<Money>,
    #[serde(default)]
    pub standard_price: Option<Money>,
}

impl ProductPatch {
    /// Drops blank strings and trims the name.
    pub fn normalized(self) -> Self {
        let keep = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            category_id: self.category_id,
            name: keep(self.name),
            bill_format: keep(self.bill_format),
            incoming_price: self.incoming_price,
            standard_price: self.standard_price,
        }
    }

    /// Returns true if the patch would not change anything.
    pub fn is_empty(&self) -> bool {
        let patch = self.clone().normalized();
        patch.category_id.is_none()
            && patch.name.is_none()
            && patch.bill_format.is_none()
            && patch.incoming_price.is_none()
            && patch.standard_price.is_none()
    }

    /// Applies the set fields to a product.
    pub fn apply_to(&self, product: &mut Product) {
        let patch = self.clone().normalized();
        if let Some(category_id) = patch.category_id {
            product.category_id = Some(category_id);
        }
        if let Some(name) = patch.name {
            product.name = name;
        }
        if let Some(bill_format) = patch.bill_format {
            product.bill_format = bill_format;
        }
        if let Some(price) = patch.incoming_price {
            product.incoming_price = price;
        }
        if let Some(price) = patch.standard_price {
            product.standard_price = price;
        }
    }
}
