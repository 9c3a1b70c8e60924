use serde::Serialize;

use crate::dispatch::Tier;
use crate::models::{HistoryRecord, TrafficClassKey};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PacketDecision {
    pub packet_id: usize,
    pub session: String,
    pub sim_time: f64,
    pub class: TrafficClassKey,
    pub admitted: bool,
    pub device_id: Option<i64>,
    pub tier: Option<Tier>,
}

impl PacketDecision {
    /// Admitted, but no tier had a device to take it.
    pub fn is_undeliverable(&self) -> bool {
        self.admitted && self.device_id.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClassSummary {
    pub session: String,
    pub class: TrafficClassKey,
    pub admitted: u64,
    pub denied: u64,
    pub undeliverable: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionHistory {
    pub session: String,
    pub records: Vec<HistoryRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunMetadata {
    pub tie_break: String,
    pub unconfigured: String,
    pub packets: usize,
    pub admitted: usize,
    pub denied: usize,
    pub undeliverable: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationResult {
    pub metadata: RunMetadata,
    pub decisions: Vec<PacketDecision>,
    pub totals: Vec<ClassSummary>,
    pub history: Vec<SessionHistory>,
}
