use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::trace;

use crate::types::*;

pub const DEFAULT_BASE_URL: &str = "https://emodul.eu/api/v1/";

pub const AUTHENTICATION_PATH: &str = "authentication";

const CONST_TEMP_MODE: &str = "constantTemp";
const CONST_TEMP_TIME_MINUTES: u32 = 60;
const SCHEDULE_INDEX: u32 = 0;

pub fn modules_path(user_id: &str) -> String {
    format!("users/{user_id}/modules")
}

pub fn module_path(user_id: &str, udid: &str) -> String {
    format!("users/{user_id}/modules/{udid}")
}

pub fn zones_path(user_id: &str, udid: &str) -> String {
    format!("users/{user_id}/modules/{udid}/zones")
}

pub fn authentication_data(username: &str, password: &str) -> Value {
    json!({
        "username": username,
        "password": password
    })
}

pub fn const_temp_data(mode_id: u64, zone_id: ZoneId, target: Temperature) -> Value {
    json!({
        "mode": {
            "id": mode_id,
            "parentId": zone_id,
            "mode": CONST_TEMP_MODE,
            "constTempTime": CONST_TEMP_TIME_MINUTES,
            "setTemperature": target.to_tenths(),
            "scheduleIndex": SCHEDULE_INDEX
        }
    })
}

pub fn zone_state_data(zone_id: ZoneId, state: ZoneState) -> Value {
    json!({
        "zone": {
            "id": zone_id,
            "zoneState": state.as_tech_str()
        }
    })
}

/// `user_id` comes back as a number from some API versions.
pub fn user_id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Splits a module document into its visible zones and tiles.
pub fn parse_module_document(doc: &Value) -> ModuleSnapshot {
    let mut zones = BTreeMap::new();
    if let Some(Value::Array(elements)) = doc.pointer("/zones/elements") {
        for element in elements.iter().filter(|e| Zone::is_visible(e)) {
            match Zone::from_record(element) {
                Some(zone) => {
                    zones.insert(zone.id, zone);
                }
                None => trace!("skipping zone element without id"),
            }
        }
    }

    let mut tiles = BTreeMap::new();
    if let Some(Value::Array(elements)) = doc.get("tiles") {
        for element in elements.iter().filter(|e| Tile::is_visible(e)) {
            match Tile::from_record(element) {
                Some(tile) => {
                    tiles.insert(tile.id, tile);
                }
                None => trace!("skipping tile without id"),
            }
        }
    }

    ModuleSnapshot {
        zones,
        tiles,
        fetched_at: Utc::now(),
    }
}
