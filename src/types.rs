use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type ZoneId = u64;
pub type TileId = u64;

/// Temperature stored as Celsius internally.
/// The API reports and accepts tenths of a degree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature(f64);

impl Temperature {
    pub fn from_celsius(c: f64) -> Self {
        Self(c)
    }

    pub fn from_tenths(tenths: i64) -> Self {
        Self(tenths as f64 / 10.0)
    }

    pub fn celsius(&self) -> f64 {
        self.0
    }

    /// Rounded to the nearest tenth of a degree.
    pub fn to_tenths(&self) -> i64 {
        (self.0 * 10.0).round() as i64
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneState {
    On,
    #[default]
    Off,
}

impl ZoneState {
    pub fn as_tech_str(&self) -> &'static str {
        match self {
            ZoneState::On => "zoneOn",
            ZoneState::Off => "zoneOff",
        }
    }

    pub fn from_tech_str(s: &str) -> Self {
        match s {
            "zoneOn" | "noAlarm" => ZoneState::On,
            _ => ZoneState::Off,
        }
    }
}

/// What the zone's relay is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HvacAction {
    #[default]
    Off,
    Idle,
    Heating,
    Cooling,
}

impl HvacAction {
    pub fn from_flags(relay_state: Option<&str>, algorithm: Option<&str>) -> Self {
        match (relay_state, algorithm) {
            (Some("on"), Some("cooling")) => HvacAction::Cooling,
            (Some("on"), Some("heating")) => HvacAction::Heating,
            (Some("on"), _) | (Some("off"), _) => HvacAction::Idle,
            _ => HvacAction::Off,
        }
    }
}

/// One controller module as listed for the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    pub udid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A heating zone. `raw` is the vendor record exactly as fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub current_temperature: Option<Temperature>,
    pub target_temperature: Option<Temperature>,
    pub humidity: Option<f64>,
    pub battery_level: Option<u8>,
    pub state: ZoneState,
    pub action: HvacAction,
    pub mode_id: Option<u64>,
    pub raw: Value,
}

impl Zone {
    /// Builds a zone from one `zones.elements` entry. `None` when the
    /// entry carries no integer `zone.id`.
    pub fn from_record(record: &Value) -> Option<Self> {
        let zone = record.get("zone")?;
        let id = zone.get("id")?.as_u64()?;

        let tenths = |key: &str| {
            zone.get(key)
                .and_then(|v| v.as_i64())
                .map(Temperature::from_tenths)
        };
        let flag = |key: &str| zone.pointer(&format!("/flags/{key}")).and_then(|v| v.as_str());

        Some(Self {
            id,
            name: record
                .pointer("/description/name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            current_temperature: tenths("currentTemperature"),
            target_temperature: tenths("setTemperature"),
            humidity: zone
                .get("humidity")
                .and_then(|v| v.as_f64())
                .filter(|h| *h != 0.0),
            battery_level: zone
                .get("batteryLevel")
                .and_then(|v| v.as_u64())
                .map(|b| b.min(100) as u8),
            state: zone
                .get("zoneState")
                .and_then(|v| v.as_str())
                .map(ZoneState::from_tech_str)
                .unwrap_or_default(),
            action: HvacAction::from_flags(flag("relayState"), flag("algorithm")),
            mode_id: record.pointer("/mode/id").and_then(|v| v.as_u64()),
            raw: record.clone(),
        })
    }

    pub fn is_visible(record: &Value) -> bool {
        record
            .pointer("/zone/visibility")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// A display tile (sensor, valve, fan, text status, ...). Snapshots only
/// hold visible tiles; use [`Tile::is_visible`] on raw records.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub id: TileId,
    pub tile_type: Option<u64>,
    pub params: Value,
    pub raw: Value,
}

impl Tile {
    pub fn from_record(record: &Value) -> Option<Self> {
        let id = record.get("id")?.as_u64()?;
        Some(Self {
            id,
            tile_type: record.get("type").and_then(|v| v.as_u64()),
            params: record.get("params").cloned().unwrap_or(Value::Null),
            raw: record.clone(),
        })
    }

    pub fn is_visible(record: &Value) -> bool {
        record
            .get("visibility")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// Cached view of one module, derived from a single document fetch.
#[derive(Debug, Clone)]
pub struct ModuleSnapshot {
    pub zones: BTreeMap<ZoneId, Zone>,
    pub tiles: BTreeMap<TileId, Tile>,
    pub fetched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn zone_record() -> Value {
        json!({
            "zone": {
                "id": 5,
                "visibility": true,
                "currentTemperature": 214,
                "setTemperature": 220,
                "humidity": 0,
                "batteryLevel": 80,
                "zoneState": "noAlarm",
                "flags": { "relayState": "on", "algorithm": "heating" }
            },
            "description": { "name": "Living room" },
            "mode": { "id": 1234, "mode": "timeLimit" }
        })
    }

    #[test]
    fn zone_from_record() {
        let zone = Zone::from_record(&zone_record()).unwrap();
        assert_eq!(zone.id, 5);
        assert_eq!(zone.name, "Living room");
        assert_eq!(zone.current_temperature, Some(Temperature::from_celsius(21.4)));
        assert_eq!(zone.target_temperature.unwrap().to_tenths(), 220);
        assert_eq!(zone.humidity, None);
        assert_eq!(zone.battery_level, Some(80));
        assert_eq!(zone.state, ZoneState::On);
        assert_eq!(zone.action, HvacAction::Heating);
        assert_eq!(zone.mode_id, Some(1234));
    }

    #[test]
    fn zone_without_id_is_rejected() {
        assert!(Zone::from_record(&json!({"zone": {"visibility": true}})).is_none());
        assert!(Zone::from_record(&json!({})).is_none());
    }

    #[test]
    fn zone_nulls_are_none() {
        let zone = Zone::from_record(&json!({
            "zone": {
                "id": 1,
                "currentTemperature": null,
                "setTemperature": null,
                "humidity": 45,
                "batteryLevel": null,
                "zoneState": "zoneOff",
                "flags": { "relayState": "off" }
            }
        }))
        .unwrap();
        assert_eq!(zone.current_temperature, None);
        assert_eq!(zone.target_temperature, None);
        assert_eq!(zone.humidity, Some(45.0));
        assert_eq!(zone.state, ZoneState::Off);
        assert_eq!(zone.action, HvacAction::Idle);
        assert_eq!(zone.mode_id, None);
    }

    #[test]
    fn hvac_action_from_flags() {
        assert_eq!(HvacAction::from_flags(Some("on"), Some("cooling")), HvacAction::Cooling);
        assert_eq!(HvacAction::from_flags(None, Some("heating")), HvacAction::Off);
        assert_eq!(HvacAction::from_flags(Some("unknown"), None), HvacAction::Off);
    }

    #[test]
    fn tile_from_record() {
        let tile = Tile::from_record(&json!({
            "id": 3,
            "type": 1,
            "visibility": true,
            "params": { "description": "Temperature sensor", "value": 123 }
        }))
        .unwrap();
        assert_eq!(tile.id, 3);
        assert_eq!(tile.tile_type, Some(1));
        assert!(Tile::is_visible(&tile.raw));
        assert_eq!(tile.param("value"), Some(&json!(123)));
        assert_eq!(tile.param("missing"), None);
    }

    #[test]
    fn module_keeps_unknown_fields() {
        let module: Module = serde_json::from_value(json!({
            "id": 77,
            "udid": "abc-123",
            "name": "L-8",
            "version": "1.2.3",
            "type": "eModule"
        }))
        .unwrap();
        assert_eq!(module.udid, "abc-123");
        assert_eq!(module.version, "1.2.3");
        assert_eq!(module.extra["id"], 77);
    }
}
