//! Order service HTTP surface.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    Json,
};

use crate::common::OrderId;
use crate::domains::orders::actions::{
    cancel_order, complete_order, create_order, get_order, list_orders, mark_ready,
    restaurant_confirm, CreateOrderInput,
};
use crate::domains::orders::models::Order;
use crate::server::app::OrderAppState;
use crate::server::error::ApiError;
use crate::server::middleware::AuthUser;

pub async fn create_order_handler(
    Extension(state): Extension<OrderAppState>,
    auth: AuthUser,
    payload: Result<Json<CreateOrderInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let Json(input) = payload.map_err(|rejection| ApiError::Validation(vec![rejection.body_text()]))?;
    let order = create_order(&auth.actor, input, &state.deps).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_orders_handler(
    Extension(state): Extension<OrderAppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(list_orders(&auth.actor, &state.deps).await?))
}

pub async fn get_order_handler(
    Extension(state): Extension<OrderAppState>,
    auth: AuthUser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(get_order(&auth.actor, order_id, &state.deps).await?))
}

pub async fn cancel_order_handler(
    Extension(state): Extension<OrderAppState>,
    auth: AuthUser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(cancel_order(&auth.actor, order_id, &state.deps).await?))
}

pub async fn restaurant_confirm_handler(
    Extension(state): Extension<OrderAppState>,
    auth: AuthUser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(
        restaurant_confirm(&auth.actor, order_id, &state.deps).await?,
    ))
}

pub async fn mark_ready_handler(
    Extension(state): Extension<OrderAppState>,
    auth: AuthUser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(mark_ready(&auth.actor, order_id, &state.deps).await?))
}

pub async fn complete_order_handler(
    Extension(state): Extension<OrderAppState>,
    auth: AuthUser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(complete_order(&auth.actor, order_id, &state.deps).await?))
}
