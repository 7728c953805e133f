//! Drone simulation loop.
//!
//! One timer drives the whole fleet. Each tick moves in-flight drones toward
//! their target, fires arrivals and recharges docked drones. A tick that
//! fires while the previous one is still running is skipped, not queued.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::common::{OrderId, RestaurantId, StoreError, UserId};
use crate::domains::drones::error::DispatchError;
use crate::domains::drones::events::{DRONE_ARRIVED, DRONE_RETURNED};
use crate::domains::drones::models::{ArrivalPoint, Drone, DroneStatus};
use crate::kernel::DroneServiceDeps;

use super::dispatch::publish_event;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub moved: usize,
    pub arrived: usize,
    pub recharged: usize,
    /// Drones whose write lost to a concurrent operator action.
    pub conflicts: usize,
    /// The previous tick was still running.
    pub skipped: bool,
}

impl TickOutcome {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

enum Step {
    Moved(Drone),
    Arrived(Drone, ArrivalPoint),
    Recharged,
    Idle,
}

pub struct DroneSimulation {
    deps: DroneServiceDeps,
    running: Mutex<()>,
}

impl DroneSimulation {
    pub fn new(deps: DroneServiceDeps) -> Self {
        Self {
            deps,
            running: Mutex::new(()),
        }
    }

    /// One tick using the configured interval as elapsed time.
    pub async fn tick(&self) -> Result<TickOutcome, DispatchError> {
        self.tick_for(self.deps.simulation.tick_interval).await
    }

    pub async fn tick_for(&self, elapsed: Duration) -> Result<TickOutcome, DispatchError> {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("Previous tick still running, skipping");
            return Ok(TickOutcome::skipped());
        };

        let mut outcome = TickOutcome::default();
        let fleet = self.deps.drones.list().await?;

        for drone in fleet {
            let drone_id = drone.id;
            let order_id = drone.assigned_order;
            // Captured before arrival clears them.
            let audience = (drone.customer_id, drone.restaurant_id);

            match self.step(drone, elapsed).await {
                Ok(Step::Moved(drone)) => {
                    outcome.moved += 1;
                    self.deps.tracking.publish_drone(&drone.snapshot()).await;
                }
                Ok(Step::Arrived(drone, point)) => {
                    outcome.arrived += 1;
                    self.on_arrival(&drone, order_id, audience, point).await;
                }
                Ok(Step::Recharged) => outcome.recharged += 1,
                Ok(Step::Idle) => {}
                Err(e) if e.is_conflict() => {
                    outcome.conflicts += 1;
                    debug!(drone_id = %drone_id, "Drone changed during tick, skipping it");
                }
                Err(e) => return Err(e.into()),
            }
        }

        debug!(
            moved = outcome.moved,
            arrived = outcome.arrived,
            recharged = outcome.recharged,
            conflicts = outcome.conflicts,
            "Simulation tick"
        );
        Ok(outcome)
    }

    async fn step(&self, mut drone: Drone, elapsed: Duration) -> Result<Step, StoreError> {
        let config = &self.deps.simulation;

        if drone.is_in_flight() {
            let remaining = drone.distance_to_target().unwrap_or(0.0);
            if remaining <= config.arrival_threshold {
                let point = match drone.arrive() {
                    Ok(point) => point,
                    Err(e) => {
                        warn!(drone_id = %drone.id, error = %e, "Arrival rejected");
                        return Ok(Step::Idle);
                    }
                };
                let saved = self.deps.drones.update(&drone).await?;
                return Ok(Step::Arrived(saved, point));
            }

            drone.advance(
                config.drone_speed * elapsed.as_secs_f64(),
                config.battery_drain_per_degree,
            );
            let saved = self.deps.drones.update(&drone).await?;
            return Ok(Step::Moved(saved));
        }

        if drone.status == DroneStatus::Available && drone.recharge(config.recharge_per_tick) {
            self.deps.drones.update(&drone).await?;
            return Ok(Step::Recharged);
        }

        Ok(Step::Idle)
    }

    async fn on_arrival(
        &self,
        drone: &Drone,
        order_id: Option<OrderId>,
        (customer_id, restaurant_id): (Option<UserId>, Option<RestaurantId>),
        point: ArrivalPoint,
    ) {
        self.deps
            .tracking
            .publish_drone_to(&drone.snapshot(), customer_id, restaurant_id)
            .await;
        let Some(order_id) = order_id else {
            return;
        };

        let event_type = match point {
            ArrivalPoint::Home => DRONE_RETURNED,
            ArrivalPoint::Restaurant | ArrivalPoint::Customer => DRONE_ARRIVED,
        };
        info!(drone_id = %drone.id, order_id = %order_id, arrived_at = ?point, "Drone arrived");

        if let Err(e) = publish_event(drone, order_id, event_type, Some(point), &self.deps).await {
            warn!(drone_id = %drone.id, order_id = %order_id, error = %e, "Failed to publish arrival");
        }
    }

    /// Tick until `shutdown` fires. Each tick runs on its own task so a slow
    /// one overlaps the next timer fire and trips the skip guard.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.deps.simulation.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?self.deps.simulation.tick_interval, "Drone simulation started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Drone simulation stopping");
                    break;
                }
                _ = interval.tick() => {
                    let simulation = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = simulation.tick().await {
                            warn!(error = %e, "Simulation tick failed");
                        }
                    });
                }
            }
        }
    }
}
