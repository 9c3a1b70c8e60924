use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Service instances reported per device, keyed by the device id rendered as
/// a string (the shape service discovery hands out).
///
/// A device has capacity when its entry exists and is a non-empty list.
/// Missing entries are normal for sparse discovery tables; entries that are
/// not lists are kept as reported and count as zero instances.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Availability(BTreeMap<String, Value>);

impl Availability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, device_id: i64, instances: Vec<Value>) {
        self.0.insert(device_id.to_string(), Value::Array(instances));
    }

    pub fn has_capacity(&self, device_id: i64) -> bool {
        if !self.0.contains_key(&device_id.to_string()) {
            debug!(device_id, "device missing from availability snapshot");
            return false;
        }
        self.instance_count(device_id) > 0
    }

    pub fn instance_count(&self, device_id: i64) -> usize {
        self.0
            .get(&device_id.to_string())
            .map_or(0, |entry| instances(device_id, entry))
    }

    /// Reported device keys with their instance counts, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.0.iter().map(|(device_id, entry)| {
            (
                device_id.as_str(),
                entry.as_array().map_or(0, |instances| instances.len()),
            )
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

fn instances(device_id: i64, entry: &Value) -> usize {
    match entry.as_array() {
        Some(instances) => instances.len(),
        None => {
            debug!(device_id, %entry, "availability entry is not an instance list");
            0
        }
    }
}

impl FromIterator<(i64, Vec<Value>)> for Availability {
    fn from_iter<I: IntoIterator<Item = (i64, Vec<Value>)>>(iter: I) -> Self {
        let mut availability = Self::new();
        for (device_id, instances) in iter {
            availability.insert(device_id, instances);
        }
        availability
    }
}
