//! Order lifecycle endpoints (§6, §4.10): thin JSON translation over
//! `OrderService`.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::OrderId;
use domain::{Order, OrderItemInput, TimelineEvent};
use serde::{Deserialize, Serialize};
use storage::StorageBackend;

use crate::error::ApiError;
use crate::service::{CreateOrderInput, OrderService, RefundInput};

/// Shared application state accessible from all handlers.
pub struct AppState<S: StorageBackend + Clone + 'static> {
    pub storage: S,
    pub service: OrderService<S>,
    /// Readiness turns unhealthy once the outbox backlog exceeds this
    /// count (§6's `outbox-max-pending`).
    pub outbox_max_pending: i64,
    pub started_at: Instant,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub currency: String,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub sku: String,
    pub qty: u32,
    pub price_minor: i64,
}

#[derive(Deserialize, Default)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize, Default)]
pub struct RefundOrderRequest {
    pub amount_minor: Option<i64>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub customer_id: String,
    pub limit: Option<i64>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub id: String,
    pub sku: String,
    pub qty: u32,
    pub price_minor: i64,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub customer_id: String,
    pub status: String,
    pub currency: String,
    pub amount_minor: i64,
    pub items: Vec<OrderItemResponse>,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        OrderResponse {
            id: order.id.to_string(),
            customer_id: order.customer_id.to_string(),
            status: order.status.as_str().to_string(),
            currency: order.currency,
            amount_minor: order.amount_minor,
            items: order
                .items
                .into_iter()
                .map(|item| OrderItemResponse {
                    id: item.id.to_string(),
                    sku: item.sku,
                    qty: item.qty,
                    price_minor: item.price_minor,
                })
                .collect(),
            version: order.version,
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct OrderStatusResponse {
    pub order_id: String,
    pub status: String,
}

impl From<Order> for OrderStatusResponse {
    fn from(order: Order) -> Self {
        OrderStatusResponse {
            order_id: order.id.to_string(),
            status: order.status.as_str().to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct TimelineEventResponse {
    pub event_type: String,
    pub reason: String,
    pub occurred_at: String,
}

impl From<TimelineEvent> for TimelineEventResponse {
    fn from(event: TimelineEvent) -> Self {
        TimelineEventResponse {
            event_type: event.event_type.as_str().to_string(),
            reason: event.reason,
            occurred_at: event.occurred_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct GetOrderResponse {
    pub order: OrderResponse,
    pub timeline: Vec<TimelineEventResponse>,
}

#[derive(Serialize)]
pub struct ListOrdersResponse {
    pub orders: Vec<OrderResponse>,
}

fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::invalid_argument(format!("invalid order id: {raw}")))
}

// -- Handlers --

/// POST /v1/orders — create a new order.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: StorageBackend + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(axum::http::StatusCode, Json<OrderResponse>), ApiError> {
    let items = req
        .items
        .into_iter()
        .map(|i| OrderItemInput {
            sku: i.sku,
            qty: i.qty,
            price_minor: i.price_minor,
        })
        .collect();

    let order = state
        .service
        .create(CreateOrderInput {
            customer_id: req.customer_id,
            currency: req.currency,
            items,
        })
        .await?;

    Ok((axum::http::StatusCode::CREATED, Json(order.into())))
}

/// GET /v1/orders/{id} — load an order and its timeline.
#[tracing::instrument(skip(state))]
pub async fn get<S: StorageBackend + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<GetOrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let (order, timeline) = state.service.get(order_id).await?;

    Ok(Json(GetOrderResponse {
        order: order.into(),
        timeline: timeline.into_iter().map(Into::into).collect(),
    }))
}

/// GET /v1/orders — list a customer's orders, paged (default 100).
#[tracing::instrument(skip(state))]
pub async fn list<S: StorageBackend + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<ListOrdersResponse>, ApiError> {
    let orders = state.service.list(&query.customer_id, query.limit).await?;
    Ok(Json(ListOrdersResponse {
        orders: orders.into_iter().map(Into::into).collect(),
    }))
}

/// POST /v1/orders/{id}/pay — dispatch payment capture.
#[tracing::instrument(skip(state))]
pub async fn pay<S: StorageBackend + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.service.pay(order_id).await?;
    Ok(Json(order.into()))
}

/// POST /v1/orders/{id}/cancel — cancel an order.
#[tracing::instrument(skip(state, req))]
pub async fn cancel<S: StorageBackend + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<CancelOrderRequest>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.service.cancel(order_id, req.reason).await?;
    Ok(Json(order.into()))
}

/// POST /v1/orders/{id}/refund — refund an order, fully or partially.
#[tracing::instrument(skip(state, req))]
pub async fn refund<S: StorageBackend + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<RefundOrderRequest>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .service
        .refund(
            order_id,
            RefundInput {
                amount_minor: req.amount_minor,
                reason: req.reason,
            },
        )
        .await?;
    Ok(Json(order.into()))
}
