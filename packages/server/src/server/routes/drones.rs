//! Drone service HTTP surface.
//!
//! Operator actions forward the caller's token to the order service so the
//! order is read with the caller's own permissions.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    Json,
};
use serde::Deserialize;

use crate::common::OrderId;
use crate::domains::drones::actions::{
    assign_pickup, get_drone_for_order, list_available_drones, list_drones, recall,
    start_delivery, verify_pin,
};
use crate::domains::drones::models::DroneSnapshot;
use crate::server::app::DroneAppState;
use crate::server::error::ApiError;
use crate::server::middleware::AuthUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub order_id: OrderId,
}

#[derive(Debug, Deserialize)]
pub struct PinInput {
    pub pin: String,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::Validation(vec![rejection.body_text()]))
}

pub async fn assign_handler(
    Extension(state): Extension<DroneAppState>,
    auth: AuthUser,
    payload: Result<Json<OrderRef>, JsonRejection>,
) -> Result<Json<DroneSnapshot>, ApiError> {
    let input = body(payload)?;
    let drone = assign_pickup(&auth.actor, input.order_id, &auth.token, &state.deps).await?;
    Ok(Json(drone))
}

pub async fn deliver_handler(
    Extension(state): Extension<DroneAppState>,
    auth: AuthUser,
    payload: Result<Json<OrderRef>, JsonRejection>,
) -> Result<Json<DroneSnapshot>, ApiError> {
    let input = body(payload)?;
    let drone = start_delivery(&auth.actor, input.order_id, &auth.token, &state.deps).await?;
    Ok(Json(drone))
}

pub async fn verify_pin_handler(
    Extension(state): Extension<DroneAppState>,
    auth: AuthUser,
    Path(order_id): Path<OrderId>,
    payload: Result<Json<PinInput>, JsonRejection>,
) -> Result<Json<DroneSnapshot>, ApiError> {
    let input = body(payload)?;
    let drone = verify_pin(&auth.actor, order_id, &input.pin, &state.deps).await?;
    Ok(Json(drone))
}

pub async fn recall_handler(
    Extension(state): Extension<DroneAppState>,
    auth: AuthUser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<DroneSnapshot>, ApiError> {
    Ok(Json(recall(&auth.actor, order_id, &state.deps).await?))
}

pub async fn drone_for_order_handler(
    Extension(state): Extension<DroneAppState>,
    auth: AuthUser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<DroneSnapshot>, ApiError> {
    Ok(Json(
        get_drone_for_order(&auth.actor, order_id, &state.deps).await?,
    ))
}

pub async fn available_drones_handler(
    Extension(state): Extension<DroneAppState>,
    auth: AuthUser,
) -> Result<Json<Vec<DroneSnapshot>>, ApiError> {
    Ok(Json(list_available_drones(&auth.actor, &state.deps).await?))
}

pub async fn list_drones_handler(
    Extension(state): Extension<DroneAppState>,
    auth: AuthUser,
) -> Result<Json<Vec<DroneSnapshot>>, ApiError> {
    Ok(Json(list_drones(&auth.actor, &state.deps).await?))
}
