use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique numeric identity of a player as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u64);

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ActorId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

/// A confirm action from a player, consumed synchronously by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneRequest {
    pub actor: ActorId,
    pub position: Position,
}

/// Everything the zone service needs to create or update a protected zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneSpec {
    pub zone_id: String,
    pub position: Position,
    pub radius: f64,
    pub flags: BTreeMap<String, String>,
}

/// The persisted fact that a group has used its one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub group: String,
    pub zone_id: String,
    pub claimed_by: ActorId,
    pub position: Position,
    pub radius: f64,
    pub claimed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub zone_erased: bool,
}

/// Build the deterministic zone id for a group.
pub fn zone_id_for(prefix: &str, group: &str) -> String {
    format!("{prefix}{group}")
}

/// Expand `{group}` placeholders in configured zone flags.
pub fn expand_flags(flags: &BTreeMap<String, String>, group: &str) -> BTreeMap<String, String> {
    flags
        .iter()
        .map(|(key, value)| (key.clone(), value.replace("{group}", group)))
        .collect()
}
