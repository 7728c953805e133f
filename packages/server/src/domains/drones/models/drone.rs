use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::DroneStatus;
use crate::common::{DroneId, OrderId, Position, RestaurantId, UserId};
use crate::domains::drones::error::DispatchError;

/// Drone - a simulated delivery unit. Created at fleet seeding, never deleted.
///
/// Not serializable on purpose: clients only ever see a [`DroneSnapshot`],
/// which leaves out the delivery PIN.
#[derive(Debug, Clone, PartialEq)]
pub struct Drone {
    pub id: DroneId,
    pub name: String,
    pub home_station: Position,
    pub position: Position,
    pub status: DroneStatus,
    pub assigned_order: Option<OrderId>,
    pub target: Option<Position>,
    /// Percent, 0-100.
    pub battery: f64,
    pub delivery_pin: Option<String>,
    pub arrived_at_customer: bool,
    pub unlocked: bool,
    pub restaurant_location: Option<Position>,
    pub customer_location: Option<Position>,
    pub customer_id: Option<UserId>,
    pub restaurant_id: Option<RestaurantId>,
    pub revision: i64,
    pub updated_at: DateTime<Utc>,
}

/// Everything the drone needs to carry out one order.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub order_id: OrderId,
    pub restaurant_location: Position,
    pub customer_location: Position,
    pub delivery_pin: String,
    pub customer_id: UserId,
    pub restaurant_id: RestaurantId,
}

/// Where a drone was when its target was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalPoint {
    Restaurant,
    Customer,
    Home,
}

impl Drone {
    /// A docked, fully charged drone at its home station.
    pub fn docked(name: impl Into<String>, home_station: Position) -> Self {
        Self {
            id: DroneId::new(),
            name: name.into(),
            home_station,
            position: home_station,
            status: DroneStatus::Available,
            assigned_order: None,
            target: None,
            battery: 100.0,
            delivery_pin: None,
            arrived_at_customer: false,
            unlocked: false,
            restaurant_location: None,
            customer_location: None,
            customer_id: None,
            restaurant_id: None,
            revision: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn is_eligible(&self, min_battery: f64) -> bool {
        self.status == DroneStatus::Available
            && self.battery >= min_battery
            && self.assigned_order.is_none()
    }

    /// Moving with somewhere to go. The simulation only ticks these.
    pub fn is_in_flight(&self) -> bool {
        self.status.is_active() && self.target.is_some()
    }

    pub fn assign(&mut self, assignment: &Assignment) -> Result<(), DispatchError> {
        self.status.ensure_move(DroneStatus::Pickup)?;

        self.status = DroneStatus::Pickup;
        self.assigned_order = Some(assignment.order_id);
        self.restaurant_location = Some(assignment.restaurant_location);
        self.customer_location = Some(assignment.customer_location);
        self.delivery_pin = Some(assignment.delivery_pin.clone());
        self.customer_id = Some(assignment.customer_id);
        self.restaurant_id = Some(assignment.restaurant_id);
        self.arrived_at_customer = false;
        self.unlocked = false;
        self.target = Some(assignment.restaurant_location);
        self.touch();
        Ok(())
    }

    pub fn start_delivery(&mut self) -> Result<(), DispatchError> {
        self.status.ensure_move(DroneStatus::Delivering)?;
        let customer = self
            .customer_location
            .ok_or_else(|| DispatchError::Conflict("drone has no customer location".into()))?;

        self.status = DroneStatus::Delivering;
        self.target = Some(customer);
        self.arrived_at_customer = false;
        self.touch();
        Ok(())
    }

    /// PIN gate. On mismatch nothing changes and the caller may retry.
    pub fn verify_pin(&mut self, submitted: &str) -> Result<(), DispatchError> {
        if !self.arrived_at_customer {
            return Err(DispatchError::NotArrived);
        }
        let submitted = normalize_pin(submitted)?;
        let expected = self
            .delivery_pin
            .as_deref()
            .map(normalize_pin)
            .transpose()?
            .ok_or(DispatchError::InvalidPin)?;
        if submitted != expected {
            return Err(DispatchError::InvalidPin);
        }

        self.status.ensure_move(DroneStatus::Returning)?;
        self.status = DroneStatus::Returning;
        self.target = Some(self.home_station);
        self.arrived_at_customer = false;
        self.unlocked = true;
        self.touch();
        Ok(())
    }

    /// Operator abort during pickup: fly home without delivering.
    pub fn recall(&mut self) -> Result<(), DispatchError> {
        if !self.status.is_collecting() {
            return Err(DispatchError::Conflict(format!(
                "drone {} is {}; only a drone on pickup can be recalled",
                self.id, self.status
            )));
        }
        self.status.ensure_move(DroneStatus::Returning)?;
        self.status = DroneStatus::Returning;
        self.target = Some(self.home_station);
        self.touch();
        Ok(())
    }

    /// Target reached. Applies the arrival side effects for the current leg.
    pub fn arrive(&mut self) -> Result<ArrivalPoint, DispatchError> {
        if let Some(target) = self.target {
            self.position = target;
        }

        let point = match self.status {
            DroneStatus::Pickup => {
                self.status.ensure_move(DroneStatus::WaitingAtRestaurant)?;
                self.status = DroneStatus::WaitingAtRestaurant;
                self.target = None;
                ArrivalPoint::Restaurant
            }
            DroneStatus::Delivering => {
                self.arrived_at_customer = true;
                self.target = None;
                ArrivalPoint::Customer
            }
            DroneStatus::Returning => {
                self.status.ensure_move(DroneStatus::Available)?;
                self.status = DroneStatus::Available;
                self.target = None;
                self.assigned_order = None;
                self.delivery_pin = None;
                self.restaurant_location = None;
                self.customer_location = None;
                self.customer_id = None;
                self.restaurant_id = None;
                self.arrived_at_customer = false;
                self.unlocked = false;
                ArrivalPoint::Home
            }
            other => {
                return Err(DispatchError::Conflict(format!(
                    "drone {} cannot arrive while {}",
                    self.id, other
                )))
            }
        };
        self.touch();
        Ok(point)
    }

    /// Move up to `step` degrees toward the target. Returns the distance flown.
    pub fn advance(&mut self, step: f64, drain_per_degree: f64) -> f64 {
        let Some(target) = self.target else {
            return 0.0;
        };
        let next = self.position.step_toward(&target, step);
        let flown = self.position.distance_to(&next);
        self.position = next;
        self.battery = (self.battery - flown * drain_per_degree).max(0.0);
        self.touch();
        flown
    }

    /// Docked charging. Returns whether the level changed.
    pub fn recharge(&mut self, amount: f64) -> bool {
        if self.status != DroneStatus::Available || self.battery >= 100.0 {
            return false;
        }
        self.battery = (self.battery + amount).min(100.0);
        self.touch();
        true
    }

    pub fn distance_to_target(&self) -> Option<f64> {
        self.target.map(|t| self.position.distance_to(&t))
    }

    pub fn snapshot(&self) -> DroneSnapshot {
        DroneSnapshot {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
            position: self.position,
            target: self.target,
            battery: self.battery,
            assigned_order: self.assigned_order,
            arrived_at_customer: self.arrived_at_customer,
            unlocked: self.unlocked,
            home_station: self.home_station,
            restaurant_location: self.restaurant_location,
            customer_location: self.customer_location,
            customer_id: self.customer_id,
            restaurant_id: self.restaurant_id,
            updated_at: self.updated_at,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Zero-pad a submitted PIN to 4 digits. Anything but 1-4 ASCII digits is rejected.
pub fn normalize_pin(raw: &str) -> Result<String, DispatchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > 4 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DispatchError::MalformedPin);
    }
    Ok(format!("{:0>4}", trimmed))
}

/// Client-facing view of a drone. Never carries the PIN.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DroneSnapshot {
    pub id: DroneId,
    pub name: String,
    pub status: DroneStatus,
    pub position: Position,
    pub target: Option<Position>,
    pub battery: f64,
    pub assigned_order: Option<OrderId>,
    pub arrived_at_customer: bool,
    pub unlocked: bool,
    pub home_station: Position,
    pub restaurant_location: Option<Position>,
    pub customer_location: Option<Position>,
    pub customer_id: Option<UserId>,
    pub restaurant_id: Option<RestaurantId>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment() -> Assignment {
        Assignment {
            order_id: OrderId::new(),
            restaurant_location: Position::new(10.78, 106.70),
            customer_location: Position::new(10.79, 106.71),
            delivery_pin: "0427".to_string(),
            customer_id: UserId::new(),
            restaurant_id: RestaurantId::new(),
        }
    }

    fn at_customer() -> Drone {
        let mut drone = Drone::docked("Falcon", Position::new(10.77, 106.69));
        drone.assign(&assignment()).unwrap();
        drone.start_delivery().unwrap();
        drone.arrive().unwrap();
        drone
    }

    #[test]
    fn test_assignment_targets_restaurant() {
        let mut drone = Drone::docked("Falcon", Position::new(10.77, 106.69));
        let job = assignment();
        drone.assign(&job).unwrap();

        assert_eq!(drone.status, DroneStatus::Pickup);
        assert_eq!(drone.assigned_order, Some(job.order_id));
        assert_eq!(drone.target, Some(job.restaurant_location));
        assert!(!drone.is_eligible(0.0));
    }

    #[test]
    fn test_busy_drone_cannot_be_assigned_again() {
        let mut drone = Drone::docked("Falcon", Position::new(10.77, 106.69));
        drone.assign(&assignment()).unwrap();
        assert!(drone.assign(&assignment()).is_err());
    }

    #[test]
    fn test_arrival_at_restaurant_waits() {
        let mut drone = Drone::docked("Falcon", Position::new(10.77, 106.69));
        drone.assign(&assignment()).unwrap();

        assert_eq!(drone.arrive().unwrap(), ArrivalPoint::Restaurant);
        assert_eq!(drone.status, DroneStatus::WaitingAtRestaurant);
        assert_eq!(drone.target, None);
        assert!(drone.start_delivery().is_ok());
    }

    #[test]
    fn test_wrong_pin_changes_nothing() {
        let mut drone = at_customer();
        let before = drone.clone();

        assert!(matches!(drone.verify_pin("9999"), Err(DispatchError::InvalidPin)));
        assert_eq!(drone, before);
    }

    #[test]
    fn test_correct_pin_unlocks_once() {
        let mut drone = at_customer();

        drone.verify_pin("427").unwrap();
        assert_eq!(drone.status, DroneStatus::Returning);
        assert_eq!(drone.target, Some(drone.home_station));
        assert!(drone.unlocked);
        assert!(!drone.arrived_at_customer);

        assert!(matches!(drone.verify_pin("0427"), Err(DispatchError::NotArrived)));
    }

    #[test]
    fn test_pin_before_arrival_is_rejected() {
        let mut drone = Drone::docked("Falcon", Position::new(10.77, 106.69));
        drone.assign(&assignment()).unwrap();
        drone.start_delivery().unwrap();
        assert!(matches!(drone.verify_pin("0427"), Err(DispatchError::NotArrived)));
    }

    #[test]
    fn test_normalize_pin() {
        assert_eq!(normalize_pin("7").unwrap(), "0007");
        assert_eq!(normalize_pin("0427").unwrap(), "0427");
        assert!(normalize_pin("12345").is_err());
        assert!(normalize_pin("12a4").is_err());
        assert!(normalize_pin("").is_err());
    }

    #[test]
    fn test_return_home_clears_assignment() {
        let mut drone = at_customer();
        drone.verify_pin("0427").unwrap();

        assert_eq!(drone.arrive().unwrap(), ArrivalPoint::Home);
        assert_eq!(drone.status, DroneStatus::Available);
        assert_eq!(drone.position, drone.home_station);
        assert!(drone.assigned_order.is_none());
        assert!(drone.delivery_pin.is_none());
        assert!(drone.customer_location.is_none());
        assert!(drone.is_eligible(20.0));
    }

    #[test]
    fn test_advance_drains_battery_by_distance() {
        let mut drone = Drone::docked("Falcon", Position::new(0.0, 0.0));
        drone.target = Some(Position::new(0.0, 1.0));
        drone.status = DroneStatus::Returning;

        let flown = drone.advance(0.1, 110.0);
        assert!((flown - 0.1).abs() < 1e-12);
        assert!((drone.battery - 89.0).abs() < 1e-9);

        drone.battery = 1.0;
        drone.advance(0.5, 110.0);
        assert_eq!(drone.battery, 0.0);
    }

    #[test]
    fn test_recall_only_during_pickup() {
        let mut drone = Drone::docked("Falcon", Position::new(10.77, 106.69));
        assert!(drone.recall().is_err());

        drone.assign(&assignment()).unwrap();
        drone.recall().unwrap();
        assert_eq!(drone.status, DroneStatus::Returning);
        assert_eq!(drone.target, Some(drone.home_station));
    }

    #[test]
    fn test_snapshot_omits_pin() {
        let drone = at_customer();
        let json = serde_json::to_value(drone.snapshot()).unwrap();
        assert!(json.get("deliveryPin").is_none());
        assert_eq!(json["status"], "delivering");
        assert_eq!(json["arrivedAtCustomer"], true);
    }
}
