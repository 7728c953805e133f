use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::common::{ensure_transition, Lifecycle, TransitionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DroneStatus {
    Available,
    Pickup,
    /// Sub-state of `Pickup`: parked at the restaurant, awaiting start of delivery.
    WaitingAtRestaurant,
    Delivering,
    Returning,
}

impl DroneStatus {
    pub const ALL: [DroneStatus; 5] = [
        DroneStatus::Available,
        DroneStatus::Pickup,
        DroneStatus::WaitingAtRestaurant,
        DroneStatus::Delivering,
        DroneStatus::Returning,
    ];

    /// Moving states; only these carry a target.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            DroneStatus::Pickup | DroneStatus::Delivering | DroneStatus::Returning
        )
    }

    /// States that hold an order assignment.
    pub fn holds_assignment(self) -> bool {
        !matches!(self, DroneStatus::Available)
    }

    pub fn is_collecting(self) -> bool {
        matches!(self, DroneStatus::Pickup | DroneStatus::WaitingAtRestaurant)
    }

    /// Validated move, including entry into the pickup sub-state.
    pub fn ensure_move(self, to: DroneStatus) -> Result<(), TransitionError> {
        if to == DroneStatus::WaitingAtRestaurant {
            return if self == DroneStatus::Pickup {
                Ok(())
            } else {
                Err(TransitionError {
                    entity: Self::ENTITY,
                    from: self.to_string(),
                    to: to.to_string(),
                })
            };
        }
        ensure_transition(self, to)
    }
}

impl Lifecycle for DroneStatus {
    const ENTITY: &'static str = "drone";

    fn next_states(self) -> &'static [Self] {
        use DroneStatus::*;
        match self {
            Available => &[Pickup],
            Pickup | WaitingAtRestaurant => &[Delivering, Returning],
            Delivering => &[Returning],
            Returning => &[Available],
        }
    }
}

impl std::fmt::Display for DroneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DroneStatus::Available => write!(f, "available"),
            DroneStatus::Pickup => write!(f, "pickup"),
            DroneStatus::WaitingAtRestaurant => write!(f, "waiting_at_restaurant"),
            DroneStatus::Delivering => write!(f, "delivering"),
            DroneStatus::Returning => write!(f, "returning"),
        }
    }
}

impl std::str::FromStr for DroneStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(DroneStatus::Available),
            "pickup" => Ok(DroneStatus::Pickup),
            "waiting_at_restaurant" => Ok(DroneStatus::WaitingAtRestaurant),
            "delivering" => Ok(DroneStatus::Delivering),
            "returning" => Ok(DroneStatus::Returning),
            _ => Err(anyhow::anyhow!("Invalid drone status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_keys_match_the_table() {
        use DroneStatus::*;
        let allowed = [
            (Available, Pickup),
            (Pickup, Delivering),
            (Pickup, Returning),
            (Delivering, Returning),
            (Returning, Available),
        ];

        for from in [Available, Pickup, Delivering, Returning] {
            for to in [Available, Pickup, Delivering, Returning] {
                assert_eq!(
                    from.can_transition(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_waiting_sub_state_behaves_like_pickup() {
        for to in DroneStatus::ALL {
            if to == DroneStatus::WaitingAtRestaurant {
                continue;
            }
            assert_eq!(
                DroneStatus::WaitingAtRestaurant.can_transition(to),
                DroneStatus::Pickup.can_transition(to)
            );
        }
    }

    #[test]
    fn test_waiting_sub_state_entered_only_from_pickup() {
        assert!(DroneStatus::Pickup
            .ensure_move(DroneStatus::WaitingAtRestaurant)
            .is_ok());
        for from in [
            DroneStatus::Available,
            DroneStatus::Delivering,
            DroneStatus::Returning,
            DroneStatus::WaitingAtRestaurant,
        ] {
            let err = from.ensure_move(DroneStatus::WaitingAtRestaurant).unwrap_err();
            assert_eq!(err.entity, "drone");
        }
    }

    #[test]
    fn test_undeclared_move_names_both_states() {
        let err = DroneStatus::Available
            .ensure_move(DroneStatus::Delivering)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid drone transition: cannot move from available to delivering"
        );
    }
}
