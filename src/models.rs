use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dispatch::Availability;

/// Identifies one traffic class: every packet of the same service chain and
/// user level draws from the same bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct TrafficClassKey {
    pub service_chain_id: i64,
    pub user_level: i64,
}

impl TrafficClassKey {
    pub const fn new(service_chain_id: i64, user_level: i64) -> Self {
        Self {
            service_chain_id,
            user_level,
        }
    }
}

impl fmt::Display for TrafficClassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.service_chain_id, self.user_level)
    }
}

/// One row of a per-class table (tokens, capacities or refill rates).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ClassValue {
    pub service_chain_id: i64,
    pub user_level: i64,
    pub value: f64,
}

impl ClassValue {
    pub fn new(key: TrafficClassKey, value: f64) -> Self {
        Self {
            service_chain_id: key.service_chain_id,
            user_level: key.user_level,
            value,
        }
    }

    pub fn key(&self) -> TrafficClassKey {
        TrafficClassKey::new(self.service_chain_id, self.user_level)
    }
}

/// Exported bucket configuration of an admission controller.
///
/// Every field is required; a document missing one is rejected at parse time.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ControllerSnapshot {
    pub device_id: i64,
    pub tokens: Vec<ClassValue>,
    pub capacities: Vec<ClassValue>,
    pub refill_rates: Vec<ClassValue>,
}

/// Gateway profile used when a session has not been configured yet: two
/// traffic classes, one token per minute each.
impl Default for ControllerSnapshot {
    fn default() -> Self {
        let primary = TrafficClassKey::new(1, 1);
        let secondary = TrafficClassKey::new(2, 1);
        Self {
            device_id: 1,
            tokens: vec![ClassValue::new(primary, 10.0), ClassValue::new(secondary, 5.0)],
            capacities: vec![ClassValue::new(primary, 10.0), ClassValue::new(secondary, 5.0)],
            refill_rates: vec![ClassValue::new(primary, 1.0), ClassValue::new(secondary, 1.0)],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Packet {
    pub destination_service_id: i64,
    pub service_chain_id: i64,
    pub user_level: i64,
}

impl Packet {
    pub fn key(&self) -> TrafficClassKey {
        TrafficClassKey::new(self.service_chain_id, self.user_level)
    }
}

/// Counter flushed at a minute boundary. `minute_index` is the minute being
/// entered; `admitted_count` covers the minutes since the previous flush.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct HistoryRecord {
    pub minute_index: i64,
    pub device_id: i64,
    pub service_chain_id: i64,
    pub user_level: i64,
    pub admitted_count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetworkDevice {
    pub id: i64,
    pub identity: String,
    #[serde(default)]
    pub child_device_ids: Vec<i64>,
}

impl NetworkDevice {
    pub fn is_cloud(&self) -> bool {
        self.identity == "cloud"
    }
}

/// Topology relationships of the device handling a request, plus the
/// availability snapshot resolved by service discovery.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct DispatchContext {
    pub this_device_id: i64,
    #[serde(default)]
    pub availability: Availability,
    #[serde(default)]
    pub child_device_ids: Vec<i64>,
    #[serde(default)]
    pub parent_device_ids: Vec<i64>,
    #[serde(default)]
    pub same_level_device_ids: Vec<i64>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PacketEvent {
    pub id: usize,
    pub sim_time: f64,
    /// Tenant whose controller handles the packet; unset means the default session.
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub destination_service_id: i64,
    pub service_chain_id: i64,
    pub user_level: i64,
}

impl PacketEvent {
    pub fn packet(&self) -> Packet {
        Packet {
            destination_service_id: self.destination_service_id,
            service_chain_id: self.service_chain_id,
            user_level: self.user_level,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub controller: ControllerSnapshot,
    #[serde(default)]
    pub topology: Vec<NetworkDevice>,
    pub dispatch: DispatchContext,
    pub packets: Vec<PacketEvent>,
    #[serde(default)]
    pub tie_break: TieBreakConfig,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub unconfigured: UnconfiguredPolicy,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreakConfig {
    #[default]
    Stable,
    Seeded,
}

impl TieBreakConfig {
    pub fn label_with_seed(&self, seed: Option<u64>) -> String {
        match (self, seed) {
            (Self::Seeded, Some(seed)) => format!("seeded({})", seed),
            (Self::Seeded, None) => "seeded".to_string(),
            (Self::Stable, _) => "stable".to_string(),
        }
    }
}

/// What the controller does with a traffic class that has no token entry.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UnconfiguredPolicy {
    #[default]
    FailOpen,
    FailClosed,
}

impl fmt::Display for UnconfiguredPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailOpen => write!(f, "fail-open"),
            Self::FailClosed => write!(f, "fail-closed"),
        }
    }
}
