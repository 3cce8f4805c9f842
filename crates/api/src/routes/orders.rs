//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use domain::{LineRequest, Order, OrderItem};
use order_store::{OrderStore, SagaJournal};
use saga::{InventoryGateway, OrderService};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared application state accessible from all handlers.
pub struct AppState<G, S, J> {
    pub service: OrderService<G, S, J>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<LineRequest>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: i64,
    pub user_id: i64,
    pub items: Vec<OrderItemResponse>,
    pub status: String,
    pub total: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: i64,
    pub quantity: u32,
    pub price: f64,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id.as_i64(),
            quantity: item.quantity,
            price: item.price.as_decimal(),
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.as_i64(),
            user_id: order.user_id.as_i64(),
            total: order.total_amount().as_decimal(),
            items: order.items.iter().map(OrderItemResponse::from).collect(),
            status: order.status.to_string(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

// -- Handlers --

/// POST /orders — reserve stock and create an order for the caller.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<G, S, J>(
    State(state): State<Arc<AppState<G, S, J>>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError>
where
    G: InventoryGateway + 'static,
    S: OrderStore + 'static,
    J: SagaJournal + 'static,
{
    let user_id = caller(&headers)?;
    let order = state.service.create_order(user_id, &req.items).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<G, S, J>(
    State(state): State<Arc<AppState<G, S, J>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError>
where
    G: InventoryGateway + 'static,
    S: OrderStore + 'static,
    J: SagaJournal + 'static,
{
    let order = state.service.get_order(parse_order_id(&id)?).await?;
    Ok(Json(order.into()))
}

/// PATCH /orders/{id} — move the order to another status.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<G, S, J>(
    State(state): State<Arc<AppState<G, S, J>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError>
where
    G: InventoryGateway + 'static,
    S: OrderStore + 'static,
    J: SagaJournal + 'static,
{
    let order = state
        .service
        .update_order_status(parse_order_id(&id)?, &req.status)
        .await?;
    Ok(Json(order.into()))
}

/// GET /orders — the caller's orders, newest first.
#[tracing::instrument(skip(state, headers, params))]
pub async fn list<G, S, J>(
    State(state): State<Arc<AppState<G, S, J>>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<OrderResponse>>, ApiError>
where
    G: InventoryGateway + 'static,
    S: OrderStore + 'static,
    J: SagaJournal + 'static,
{
    let user_id = caller(&headers)?;
    let orders = state
        .service
        .list_orders(user_id, params.limit, params.offset)
        .await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

fn caller(headers: &HeaderMap) -> Result<i64, ApiError> {
    let value = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| ApiError::BadRequest("missing X-User-ID header".to_string()))?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .ok_or_else(|| ApiError::BadRequest("invalid X-User-ID header".to_string()))
}

fn parse_order_id(id: &str) -> Result<i64, ApiError> {
    id.parse::<i64>()
        .map_err(|e| ApiError::BadRequest(format!("invalid order id {id:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_caller_header() {
        let mut headers = HeaderMap::new();
        assert!(caller(&headers).is_err());

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("abc"));
        assert!(caller(&headers).is_err());

        headers.insert(USER_ID_HEADER, HeaderValue::from_static(" 42 "));
        assert_eq!(caller(&headers).unwrap(), 42);
    }

    #[test]
    fn test_order_id_must_be_numeric() {
        assert_eq!(parse_order_id("17").unwrap(), 17);
        assert!(parse_order_id("seventeen").is_err());
    }
}
