use std::cmp::Ordering;

use crate::models::PacketEvent;

pub const DEFAULT_SESSION: &str = "default";

/// A trace entry waiting in the replay queue.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledPacket {
    pub sim_time: f64,
    pub id: usize,
    pub event: PacketEvent,
}

impl ScheduledPacket {
    pub fn new(event: PacketEvent) -> Self {
        Self {
            sim_time: event.sim_time,
            id: event.id,
            event,
        }
    }

    pub fn session(&self) -> &str {
        self.event.session.as_deref().unwrap_or(DEFAULT_SESSION)
    }
}

impl Eq for ScheduledPacket {}

impl Ord for ScheduledPacket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sim_time
            .total_cmp(&other.sim_time)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for ScheduledPacket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
