use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashSet};
use tracing::info;

use crate::admission::AdmissionController;
use crate::dispatch::{DispatchPlanner, StableRng};
use crate::error::{Error, Result};
use crate::events::ScheduledPacket;
use crate::models::{ScenarioConfig, TieBreakConfig, TrafficClassKey};
use crate::registry::InstanceRegistry;
use crate::state::{ClassSummary, PacketDecision, RunMetadata, SessionHistory, SimulationResult};

/// Replays a packet trace through per-session admission controllers and the
/// dispatch planner, in simulated time order.
pub struct SimulationEngine {
    pub config: ScenarioConfig,
    pub controllers: InstanceRegistry<AdmissionController>,
    pub planner: DispatchPlanner,
    pub rng: StdRng,
}

impl SimulationEngine {
    pub fn new(config: ScenarioConfig) -> Result<Self> {
        validate_config(&config)?;
        let template =
            AdmissionController::from_snapshot(&config.controller)?.with_policy(config.unconfigured);
        let controllers = InstanceRegistry::new(move || template.fork());
        let planner = DispatchPlanner::new(config.topology.clone())?;
        let seed = match config.tie_break {
            TieBreakConfig::Seeded => config.seed.unwrap_or(0),
            TieBreakConfig::Stable => 0,
        };

        Ok(Self {
            config,
            controllers,
            planner,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn run(&mut self) -> SimulationResult {
        let mut queue: BinaryHeap<Reverse<ScheduledPacket>> = self
            .config
            .packets
            .iter()
            .cloned()
            .map(|event| Reverse(ScheduledPacket::new(event)))
            .collect();

        let mut stable_rng = StableRng;
        let mut decisions = Vec::with_capacity(queue.len());
        let mut totals: BTreeMap<(String, TrafficClassKey), ClassSummary> = BTreeMap::new();

        while let Some(Reverse(scheduled)) = queue.pop() {
            let session = scheduled.session().to_string();
            let packet = scheduled.event.packet();
            let controller = self.controllers.get(&session);
            let admitted = controller.admit(&packet, scheduled.sim_time);

            let selection = if admitted {
                let rng: &mut dyn RngCore = match self.config.tie_break {
                    TieBreakConfig::Stable => &mut stable_rng,
                    TieBreakConfig::Seeded => &mut self.rng,
                };
                self.planner.select_device(&self.config.dispatch, rng)
            } else {
                None
            };

            let decision = PacketDecision {
                packet_id: scheduled.id,
                session,
                sim_time: scheduled.sim_time,
                class: packet.key(),
                admitted,
                device_id: selection.map(|selection| selection.device_id),
                tier: selection.map(|selection| selection.tier),
            };

            let summary = totals
                .entry((decision.session.clone(), decision.class))
                .or_insert_with(|| ClassSummary {
                    session: decision.session.clone(),
                    class: decision.class,
                    admitted: 0,
                    denied: 0,
                    undeliverable: 0,
                });
            if decision.admitted {
                summary.admitted += 1;
            } else {
                summary.denied += 1;
            }
            if decision.is_undeliverable() {
                summary.undeliverable += 1;
            }

            decisions.push(decision);
        }

        let history = self
            .controllers
            .sessions()
            .into_iter()
            .map(|session| {
                let records = self.controllers.get(&session).history();
                SessionHistory { session, records }
            })
            .collect();

        let admitted = decisions.iter().filter(|decision| decision.admitted).count();
        let undeliverable = decisions
            .iter()
            .filter(|decision| decision.is_undeliverable())
            .count();
        let metadata = RunMetadata {
            tie_break: self.config.tie_break.label_with_seed(self.config.seed),
            unconfigured: self.config.unconfigured.to_string(),
            packets: decisions.len(),
            admitted,
            denied: decisions.len() - admitted,
            undeliverable,
        };
        info!(
            packets = metadata.packets,
            admitted = metadata.admitted,
            denied = metadata.denied,
            undeliverable = metadata.undeliverable,
            "packet trace replayed"
        );

        SimulationResult {
            metadata,
            decisions,
            totals: totals.into_values().collect(),
            history,
        }
    }
}

pub fn run_simulation(config: &ScenarioConfig) -> Result<SimulationResult> {
    let mut engine = SimulationEngine::new(config.clone())?;
    Ok(engine.run())
}

pub fn validate_config(config: &ScenarioConfig) -> Result<()> {
    if config.packets.is_empty() {
        return Err(Error::EmptyTrace);
    }
    let mut ids = HashSet::new();
    for packet in &config.packets {
        if !packet.sim_time.is_finite() || packet.sim_time < 0.0 {
            return Err(Error::InvalidSimTime(packet.id));
        }
        if !ids.insert(packet.id) {
            return Err(Error::DuplicatePacketId(packet.id));
        }
    }

    if matches!(config.tie_break, TieBreakConfig::Seeded) && config.seed.is_none() {
        return Err(Error::InvalidTieBreakSeed);
    }

    Ok(())
}
