use crate::common::Position;
use crate::domains::drones::models::Drone;

/// Nearest eligible drone to `position`.
///
/// Eligible means available, at least `min_battery` charged and unbound.
/// Ties go to the first drone in `fleet` order, so callers pass the fleet
/// sorted by id for a stable choice.
pub fn select_nearest<'a>(
    fleet: &'a [Drone],
    position: Position,
    min_battery: f64,
) -> Option<&'a Drone> {
    let mut best: Option<(&Drone, f64)> = None;
    for drone in fleet.iter().filter(|d| d.is_eligible(min_battery)) {
        let distance = drone.position.distance_to(&position);
        match best {
            Some((_, closest)) if distance >= closest => {}
            _ => best = Some((drone, distance)),
        }
    }
    best.map(|(drone, _)| drone)
}
