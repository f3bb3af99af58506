//! Product registration and catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CategoryId, ProductId, UserId};
use domain::{Money, NewProduct, Product, ProductFilter, ProductPatch};
use serde::{Deserialize, Serialize};
use store::OrderStore;

use crate::error::ApiError;
use crate::routes::orders::{AppState, parse_id};

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub bill_format: String,
    #[serde(default)]
    pub incoming_price_cents: i64,
    #[serde(default)]
    pub standard_price_cents: i64,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateProductRequest {
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bill_format: Option<String>,
    #[serde(default)]
    pub incoming_price_cents: Option<i64>,
    #[serde(default)]
    pub standard_price_cents: Option<i64>,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: String,
    pub category_id: Option<String>,
    pub name: String,
    pub bill_format: String,
    pub incoming_price_cents: i64,
    pub standard_price_cents: i64,
    pub on_hand_count: i64,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id.to_string(),
            category_id: product.category_id.map(|id| id.to_string()),
            name: product.name,
            bill_format: product.bill_format,
            incoming_price_cents: product.incoming_price.cents(),
            standard_price_cents: product.standard_price.cents(),
            on_hand_count: product.on_hand_count,
            created_by: product.created_by.map(|id| id.to_string()),
            created_at: product.created_at,
        }
    }
}

impl CreateProductRequest {
    fn into_new_product(self) -> Result<NewProduct, ApiError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ApiError::BadRequest("Missing required field: name".to_string()));
        }
        if self.incoming_price_cents < 0 || self.standard_price_cents < 0 {
            return Err(ApiError::BadRequest(
                "Product prices must not be negative".to_string(),
            ));
        }

        let mut product = NewProduct::new(name)
            .bill_format(self.bill_format)
            .prices(
                Money::from_cents(self.incoming_price_cents),
                Money::from_cents(self.standard_price_cents),
            );
        product.category_id = self
            .category_id
            .filter(|id| !id.trim().is_empty())
            .map(|id| parse_id::<CategoryId>("category_id", &id))
            .transpose()?;
        product.created_by = self
            .created_by
            .filter(|id| !id.trim().is_empty())
            .map(|id| parse_id::<UserId>("created_by", &id))
            .transpose()?;
        Ok(product)
    }
}

impl UpdateProductRequest {
    fn into_patch(self) -> Result<ProductPatch, ApiError> {
        let price = |cents: Option<i64>| match cents {
            Some(c) if c < 0 => Err(ApiError::BadRequest(
                "Product prices must not be negative".to_string(),
            )),
            other => Ok(other.map(Money::from_cents)),
        };

        Ok(ProductPatch {
            category_id: self
                .category_id
                .filter(|id| !id.trim().is_empty())
                .map(|id| parse_id::<CategoryId>("category_id", &id))
                .transpose()?,
            name: self.name,
            bill_format: self.bill_format,
            incoming_price: price(self.incoming_price_cents)?,
            standard_price: price(self.standard_price_cents)?,
        })
    }
}

/// POST /products — register a product with no stock on hand.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let product = state
        .processor
        .create_product(req.into_new_product()?)
        .await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// GET /products/{id} — current stock and prices of a product.
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id = parse_id::<ProductId>("id", &id)?;
    let product = state.processor.get_product(id).await?;
    Ok(Json(product.into()))
}

/// GET /products — list products, optionally by category and name fragment.
#[tracing::instrument(skip(state, filter))]
pub async fn list<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.processor.list_products(&filter).await?;
    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

/// PUT /products/{id} — update catalog fields. Stock on hand is not editable.
#[tracing::instrument(skip(state, req))]
pub async fn update<S: OrderStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id = parse_id::<ProductId>("id", &id)?;
    let product = state
        .processor
        .update_product(id, req.into_patch()?)
        .await?;
    Ok(Json(product.into()))
}
