use std::collections::BTreeSet;
use std::fmt::Write;

use crate::error::{Error, Result};
use crate::models::{ClassValue, ScenarioConfig, TrafficClassKey};
use crate::state::{PacketDecision, SimulationResult};

pub trait Formatter {
    fn write(&self, result: &SimulationResult) -> Result<String>;
}

/// Metadata, one line per packet, per-class totals and the minute history.
pub struct HumanFormatter;

/// Same as [`HumanFormatter`] without the per-packet lines.
pub struct SummaryFormatter;

pub struct JsonFormatter;

impl Formatter for HumanFormatter {
    fn write(&self, result: &SimulationResult) -> Result<String> {
        let mut out = String::new();
        write_metadata(&mut out, result);
        out.push_str("Decisions:\n");
        for decision in &result.decisions {
            let _ = writeln!(out, "{}", describe_decision(decision));
        }
        write_summary(&mut out, result);
        write_history(&mut out, result);
        Ok(out)
    }
}

impl Formatter for SummaryFormatter {
    fn write(&self, result: &SimulationResult) -> Result<String> {
        let mut out = String::new();
        write_metadata(&mut out, result);
        write_summary(&mut out, result);
        write_history(&mut out, result);
        Ok(out)
    }
}

impl Formatter for JsonFormatter {
    fn write(&self, result: &SimulationResult) -> Result<String> {
        let mut out = serde_json::to_string_pretty(result)
            .map_err(|err| Error::Output(format!("failed to encode result: {}", err)))?;
        out.push('\n');
        Ok(out)
    }
}

fn write_metadata(out: &mut String, result: &SimulationResult) {
    let metadata = &result.metadata;
    out.push_str("Metadata:\n");
    let _ = writeln!(out, "tie_break: {}", metadata.tie_break);
    let _ = writeln!(out, "unconfigured: {}", metadata.unconfigured);
    let _ = writeln!(out, "packets: {}", metadata.packets);
    let _ = writeln!(out, "admitted: {}", metadata.admitted);
    let _ = writeln!(out, "denied: {}", metadata.denied);
    let _ = writeln!(out, "undeliverable: {}", metadata.undeliverable);
}

fn write_summary(out: &mut String, result: &SimulationResult) {
    out.push_str("Summary:\n");
    for summary in &result.totals {
        let _ = writeln!(
            out,
            "{} {}: {} admitted, {} denied, {} undeliverable",
            summary.session, summary.class, summary.admitted, summary.denied, summary.undeliverable
        );
    }
}

fn write_history(out: &mut String, result: &SimulationResult) {
    out.push_str("History:\n");
    let mut empty = true;
    for session in &result.history {
        for record in &session.records {
            empty = false;
            let _ = writeln!(
                out,
                "{}: minute {}, device {}, class {}, admitted {}",
                session.session,
                record.minute_index,
                record.device_id,
                TrafficClassKey::new(record.service_chain_id, record.user_level),
                record.admitted_count
            );
        }
    }
    if empty {
        out.push_str("(empty)\n");
    }
}

fn describe_decision(decision: &PacketDecision) -> String {
    let outcome = match (decision.admitted, decision.device_id, decision.tier) {
        (true, Some(device_id), Some(tier)) => format!("device {} [{}]", device_id, tier),
        (true, _, _) => "admitted, no device available".to_string(),
        (false, _, _) => "denied".to_string(),
    };
    format!(
        "Packet {} ({}, t={}s, class {}) -> {}",
        decision.packet_id, decision.session, decision.sim_time, decision.class, outcome
    )
}

/// Human-readable rendering of a parsed scenario.
pub fn describe_config(config: &ScenarioConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Device: {}", config.controller.device_id);
    let _ = writeln!(out, "Unconfigured: {}", config.unconfigured);
    let _ = writeln!(
        out,
        "Tie-break: {}",
        config.tie_break.label_with_seed(config.seed)
    );
    let _ = writeln!(out, "Packets: {}", config.packets.len());

    out.push_str("Classes:\n");
    let controller = &config.controller;
    let keys: BTreeSet<TrafficClassKey> = controller
        .tokens
        .iter()
        .chain(&controller.capacities)
        .chain(&controller.refill_rates)
        .map(ClassValue::key)
        .collect();
    for key in keys {
        let _ = writeln!(
            out,
            "- {} tokens: {}, capacity: {}, refill: {}/min",
            key,
            table_value(&controller.tokens, key),
            table_value(&controller.capacities, key),
            table_value(&controller.refill_rates, key)
        );
    }

    out.push_str("Topology:\n");
    for device in &config.topology {
        let _ = writeln!(
            out,
            "- {} {} (children: {})",
            device.id,
            device.identity,
            join_ids(&device.child_device_ids)
        );
    }

    let dispatch = &config.dispatch;
    out.push_str("Dispatch:\n");
    let _ = writeln!(out, "this_device_id: {}", dispatch.this_device_id);
    let _ = writeln!(out, "same_level: {}", join_ids(&dispatch.same_level_device_ids));
    let _ = writeln!(out, "children: {}", join_ids(&dispatch.child_device_ids));
    let _ = writeln!(out, "parents: {}", join_ids(&dispatch.parent_device_ids));
    let reported: Vec<&str> = dispatch
        .availability
        .iter()
        .filter(|(_, instances)| *instances > 0)
        .map(|(device_id, _)| device_id)
        .collect();
    let _ = writeln!(
        out,
        "available: {}",
        if reported.is_empty() {
            "none".to_string()
        } else {
            reported.join(", ")
        }
    );
    out
}

fn table_value(table: &[ClassValue], key: TrafficClassKey) -> String {
    table
        .iter()
        .find(|entry| entry.key() == key)
        .map_or_else(|| "-".to_string(), |entry| entry.value.to_string())
}

fn join_ids(ids: &[i64]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
