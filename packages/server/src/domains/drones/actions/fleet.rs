use tracing::info;

use crate::config::FleetConfig;
use crate::domains::drones::error::DispatchError;
use crate::domains::drones::models::Drone;
use crate::domains::drones::store::DroneStore;

/// Create the fleet at the home station on first boot. Returns how many
/// drones were created; an existing fleet is left alone.
pub async fn seed_fleet(store: &dyn DroneStore, fleet: &FleetConfig) -> Result<usize, DispatchError> {
    let existing = store.count().await?;
    if existing > 0 {
        info!(existing, "Fleet already seeded");
        return Ok(0);
    }

    for n in 1..=fleet.size {
        let drone = Drone::docked(format!("Drone-{:02}", n), fleet.home_station);
        store.insert(&drone).await?;
    }

    info!(size = fleet.size, home = ?fleet.home_station, "Fleet seeded");
    Ok(fleet.size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::drones::models::DroneStatus;
    use crate::domains::drones::store::InMemoryDroneStore;

    #[tokio::test]
    async fn test_seeds_once() {
        let store = InMemoryDroneStore::new();
        let fleet = FleetConfig {
            size: 3,
            ..FleetConfig::default()
        };

        assert_eq!(seed_fleet(&store, &fleet).await.unwrap(), 3);
        assert_eq!(seed_fleet(&store, &fleet).await.unwrap(), 0);

        let drones = store.list().await.unwrap();
        assert_eq!(drones.len(), 3);
        assert!(drones.iter().all(|d| d.status == DroneStatus::Available
            && d.battery == 100.0
            && d.position == fleet.home_station));
    }
}
