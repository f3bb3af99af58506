//! Purchase and sale endpoints.
//!
//! Both surfaces share the same handlers; the [`KindRoute`] type parameter
//! selects the order kind.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, PartyId, ProductId, UserId};
use domain::{HeaderPatch, Money, Order, OrderFilter, OrderKind, OrderRequest, Product};
use processor::{OrderProcessor, ProcessedOrder};
use serde::{Deserialize, Serialize};
use store::OrderStore;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore> {
    pub processor: OrderProcessor<S>,
}

/// Binds a route set to one order kind.
pub trait KindRoute: Send + Sync + 'static {
    const KIND: OrderKind;
}

/// `/purchases`
pub struct Purchases;

impl KindRoute for Purchases {
    const KIND: OrderKind = OrderKind::Purchase;
}

/// `/sales`
pub struct Sales;

impl KindRoute for Sales {
    const KIND: OrderKind = OrderKind::Sale;
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    #[serde(alias = "supplier_id", alias = "client_id")]
    pub counterparty_id: String,
    #[serde(alias = "purchased_by", alias = "sold_by")]
    pub actor_id: String,
    pub payment_method: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    pub items: Vec<LineItemRequest>,
}

#[derive(Deserialize)]
pub struct LineItemRequest {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Deserialize)]
pub struct UpdateOrderRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub kind: String,
    pub counterparty_id: String,
    pub actor_id: String,
    pub payment_method: String,
    pub description: String,
    pub total_cents: i64,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<LineItemResponse>,
}

#[derive(Serialize)]
pub struct LineItemResponse {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
}

#[derive(Serialize)]
pub struct StockResponse {
    pub product_id: String,
    pub on_hand_count: i64,
}

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order: OrderResponse,
    pub stock: Vec<StockResponse>,
    pub replayed: bool,
}

#[derive(Serialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            kind: order.kind().to_string(),
            counterparty_id: order.header.counterparty_id.to_string(),
            actor_id: order.header.actor_id.to_string(),
            payment_method: order.header.payment_method,
            description: order.header.description,
            total_cents: order.header.total.cents(),
            idempotency_key: order.idempotency_key,
            created_at: order.created_at,
            items: order
                .lines
                .into_iter()
                .map(|line| LineItemResponse {
                    product_id: line.product_id.to_string(),
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price.cents(),
                    total_price_cents: line.total_price.cents(),
                })
                .collect(),
        }
    }
}

impl From<&Product> for StockResponse {
    fn from(product: &Product) -> Self {
        Self {
            product_id: product.id.to_string(),
            on_hand_count: product.on_hand_count,
        }
    }
}

impl From<ProcessedOrder> for OrderCreatedResponse {
    fn from(processed: ProcessedOrder) -> Self {
        Self {
            stock: processed.stock.iter().map(StockResponse::from).collect(),
            replayed: processed.replayed,
            order: processed.order.into(),
        }
    }
}

impl CreateOrderRequest {
    fn into_order_request(self) -> Result<OrderRequest, ApiError> {
        let mut request = OrderRequest::new(
            parse_id::<PartyId>("counterparty_id", &self.counterparty_id)?,
            parse_id::<UserId>("actor_id", &self.actor_id)?,
            self.payment_method,
        )
        .description(self.description);
        if let Some(key) = self.idempotency_key {
            request = request.idempotency_key(key);
        }

        for item in self.items {
            request = request.line(
                parse_id::<ProductId>("product_id", &item.product_id)?,
                item.quantity,
                Money::from_cents(item.unit_price_cents),
            );
        }
        Ok(request)
    }
}

// -- Handlers --

/// POST /purchases, POST /sales — record an order and adjust stock.
#[tracing::instrument(skip(state, req), fields(kind = %K::KIND))]
pub async fn create<S: OrderStore + 'static, K: KindRoute>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let request = req.into_order_request()?;
    let processed = match K::KIND {
        OrderKind::Purchase => state.processor.create_purchase(request).await?,
        OrderKind::Sale => state.processor.create_sale(request).await?,
    };

    let status = if processed.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(processed.into())))
}

/// GET /purchases, GET /sales — list orders matching the query filter.
#[tracing::instrument(skip(state, filter), fields(kind = %K::KIND))]
pub async fn list<S: OrderStore + 'static, K: KindRoute>(
    State(state): State<Arc<AppState<S>>>,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.processor.list_orders(K::KIND, &filter).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// GET /purchases/{id}, GET /sales/{id}
#[tracing::instrument(skip(state), fields(kind = %K::KIND))]
pub async fn get<S: OrderStore + 'static, K: KindRoute>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id = parse_id::<OrderId>("id", &id)?;
    let order = state.processor.get_order(K::KIND, id).await?;
    Ok(Json(order.into()))
}

/// PUT /purchases/{id}, PUT /sales/{id} — patch description or payment method.
#[tracing::instrument(skip(state, req), fields(kind = %K::KIND))]
pub async fn update<S: OrderStore + 'static, K: KindRoute>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id = parse_id::<OrderId>("id", &id)?;
    let patch = HeaderPatch {
        description: req.description,
        payment_method: req.payment_method,
    };
    let order = state
        .processor
        .update_order_header(K::KIND, id, patch)
        .await?;
    Ok(Json(order.into()))
}

/// DELETE /purchases/{id}, DELETE /sales/{id} — stock is not reversed.
#[tracing::instrument(skip(state), fields(kind = %K::KIND))]
pub async fn delete<S: OrderStore + 'static, K: KindRoute>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let order_id = parse_id::<OrderId>("id", &id)?;
    let deleted = state.processor.delete_order(K::KIND, order_id).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound(format!("{} not found: {id}", K::KIND)));
    }
    Ok(Json(DeletedResponse { deleted }))
}

/// Parses a path or body identifier, reporting the field on failure.
pub(crate) fn parse_id<T: FromStr>(field: &str, value: &str) -> Result<T, ApiError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}
