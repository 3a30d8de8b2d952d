//! Vehicle Tracking Types
//!
//! Domain types for the latest known position of every vehicle in the fleet.
//!
//! # Design
//!
//! The feed pushes position records keyed by vehicle identifier. The
//! [`Fleet`] snapshot keeps exactly one [`Vehicle`] per identifier:
//!
//! - A newer record for a known vehicle replaces the old one wholesale.
//!   Optional fields missing from the new record are *not* carried over.
//! - The `last_update` timestamp is always assigned on receipt; nothing
//!   from the wire is trusted for it.
//! - Vehicles are never evicted. A vehicle that stops reporting stays at
//!   its last known position.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Types
// =============================================================================

/// Unique identifier of a tracked vehicle.
pub type VehicleId = String;

/// A position record as received from the feed.
///
/// Unknown fields (including any `lastUpdate`) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleUpdate {
    /// Vehicle identifier.
    pub id: VehicleId,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Route label, if the vehicle is assigned to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Ground speed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Heading in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

/// Latest known state of one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    /// Vehicle identifier.
    pub id: VehicleId,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Route label.
    pub route: Option<String>,
    /// Ground speed.
    pub speed: Option<f64>,
    /// Heading in degrees.
    pub heading: Option<f64>,
    /// When the client received this record.
    pub last_update: DateTime<Utc>,
}

impl Vehicle {
    /// Build a vehicle from a wire record, stamped with the receipt time.
    #[must_use]
    pub fn from_update(update: VehicleUpdate, received_at: DateTime<Utc>) -> Self {
        let VehicleUpdate {
            id,
            lat,
            lng,
            route,
            speed,
            heading,
        } = update;

        Self {
            id,
            lat,
            lng,
            route,
            speed,
            heading,
            last_update: received_at,
        }
    }
}

// =============================================================================
// Fleet Snapshot
// =============================================================================

/// Mapping from vehicle identifier to its latest known state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fleet {
    vehicles: HashMap<VehicleId, Vehicle>,
}

impl Fleet {
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a batch of records received together.
    ///
    /// Every record replaces any existing entry for its identifier and is
    /// stamped with `received_at`. Returns the number of records applied.
    pub fn apply<I>(&mut self, updates: I, received_at: DateTime<Utc>) -> usize
    where
        I: IntoIterator<Item = VehicleUpdate>,
    {
        let mut applied = 0;
        for update in updates {
            let vehicle = Vehicle::from_update(update, received_at);
            self.vehicles.insert(vehicle.id.clone(), vehicle);
            applied += 1;
        }
        applied
    }

    /// Look up a vehicle by identifier.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Vehicle> {
        self.vehicles.get(id)
    }

    /// Number of tracked vehicles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    /// Whether no vehicle has been seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// Iterate over vehicles in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Vehicles sorted by identifier.
    #[must_use]
    pub fn sorted_by_id(&self) -> Vec<&Vehicle> {
        let mut vehicles: Vec<_> = self.vehicles.values().collect();
        vehicles.sort_by(|a, b| a.id.cmp(&b.id));
        vehicles
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn update(id: &str, lat: f64, lng: f64) -> VehicleUpdate {
        VehicleUpdate {
            id: id.to_string(),
            lat,
            lng,
            route: None,
            speed: None,
            heading: None,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn apply_inserts_new_vehicles() {
        let mut fleet = Fleet::new();
        let applied = fleet.apply([update("1", 1.0, 2.0), update("2", 3.0, 4.0)], at(10));

        assert_eq!(applied, 2);
        assert_eq!(fleet.len(), 2);
        assert_eq!(fleet.get("1").unwrap().lat, 1.0);
        assert_eq!(fleet.get("2").unwrap().last_update, at(10));
    }

    #[test]
    fn newer_record_replaces_without_merging() {
        let mut fleet = Fleet::new();
        let first = VehicleUpdate {
            route: Some("101".to_string()),
            heading: Some(90.0),
            ..update("7", 10.0, 20.0)
        };
        fleet.apply([first], at(1));

        let second = VehicleUpdate {
            speed: Some(30.0),
            ..update("7", 11.0, 21.0)
        };
        fleet.apply([second], at(2));

        let vehicle = fleet.get("7").unwrap();
        assert_eq!(fleet.len(), 1);
        assert_eq!(vehicle.lat, 11.0);
        assert_eq!(vehicle.lng, 21.0);
        assert_eq!(vehicle.speed, Some(30.0));
        assert_eq!(vehicle.route, None);
        assert_eq!(vehicle.heading, None);
        assert_eq!(vehicle.last_update, at(2));
    }

    #[test]
    fn last_record_in_a_batch_wins() {
        let mut fleet = Fleet::new();
        fleet.apply(
            [update("a", 1.0, 1.0), update("a", 2.0, 2.0), update("a", 3.0, 3.0)],
            at(5),
        );

        assert_eq!(fleet.len(), 1);
        assert_eq!(fleet.get("a").unwrap().lat, 3.0);
    }

    #[test]
    fn wire_timestamp_is_ignored() {
        let json = r#"{"id":"9","lat":1.5,"lng":2.5,"lastUpdate":"1999-01-01T00:00:00Z"}"#;
        let parsed: VehicleUpdate = serde_json::from_str(json).unwrap();

        let mut fleet = Fleet::new();
        fleet.apply([parsed], at(42));
        assert_eq!(fleet.get("9").unwrap().last_update, at(42));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let result = serde_json::from_str::<VehicleUpdate>(r#"{"id":"1","lat":1.0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn sorted_by_id_orders_lexicographically() {
        let mut fleet = Fleet::new();
        fleet.apply(
            [update("b", 0.0, 0.0), update("a", 0.0, 0.0), update("c", 0.0, 0.0)],
            at(0),
        );

        let ids: Vec<_> = fleet.sorted_by_id().iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn vehicle_serializes_camel_case() {
        let vehicle = Vehicle::from_update(update("1", 1.0, 2.0), at(0));
        let json = serde_json::to_value(&vehicle).unwrap();
        assert!(json.get("lastUpdate").is_some());
        assert!(json.get("last_update").is_none());
    }
}
