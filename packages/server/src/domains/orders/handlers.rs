//! Bus subscriptions of the order service.
//!
//! A handler error terminates the message; the saga does not retry it.

use anyhow::Result;
use tracing::info;

use super::actions::{handle_drone_event, handle_payment_completed, handle_payment_failed};
use super::events::{PaymentCompleted, PaymentFailed, PAYMENTS_EXCHANGE, PAYMENT_COMPLETED, PAYMENT_FAILED};
use crate::domains::drones::events::{DroneEvent, ALL_DRONE_EVENTS, DRONES_EXCHANGE};
use crate::kernel::{handler_fn, EventEnvelope, OrderServiceDeps};

pub async fn register_order_handlers(deps: &OrderServiceDeps) -> Result<()> {
    let bus = deps.bus.clone();

    let on_completed = deps.clone();
    bus.subscribe(
        PAYMENTS_EXCHANGE,
        PAYMENT_COMPLETED,
        handler_fn(move |envelope: EventEnvelope| {
            let deps = on_completed.clone();
            async move {
                let event: PaymentCompleted = envelope.decode()?;
                handle_payment_completed(event, &deps).await?;
                Ok::<(), anyhow::Error>(())
            }
        }),
    )
    .await?;

    let on_failed = deps.clone();
    bus.subscribe(
        PAYMENTS_EXCHANGE,
        PAYMENT_FAILED,
        handler_fn(move |envelope: EventEnvelope| {
            let deps = on_failed.clone();
            async move {
                let event: PaymentFailed = envelope.decode()?;
                handle_payment_failed(event, &deps).await?;
                Ok::<(), anyhow::Error>(())
            }
        }),
    )
    .await?;

    let on_drone = deps.clone();
    bus.subscribe(
        DRONES_EXCHANGE,
        ALL_DRONE_EVENTS,
        handler_fn(move |envelope: EventEnvelope| {
            let deps = on_drone.clone();
            async move {
                let event: DroneEvent = envelope.decode()?;
                handle_drone_event(&envelope.event_type, event, &deps).await?;
                Ok::<(), anyhow::Error>(())
            }
        }),
    )
    .await?;

    info!(service_id = bus.service_id(), "Order saga subscriptions registered");
    Ok(())
}
