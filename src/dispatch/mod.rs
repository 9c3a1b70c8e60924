//! Tiered fallback dispatch.
//!
//! The planner walks concentric candidate sets (self, same level, children,
//! parents, the parents' other children, cloud) and stops at the first tier
//! holding a device with capacity. Ties inside a tier go to the injected
//! random source.

mod availability;

pub use availability::Availability;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{DispatchContext, NetworkDevice};

/// Wire value returned when no tier yields a device.
pub const NOT_FOUND: i64 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    #[serde(rename = "self")]
    Local,
    SameLevel,
    Child,
    Parent,
    Cousin,
    Cloud,
}

impl Tier {
    /// Every tier in the order the planner consults them.
    pub const ALL: [Tier; 6] = [
        Tier::Local,
        Tier::SameLevel,
        Tier::Child,
        Tier::Parent,
        Tier::Cousin,
        Tier::Cloud,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Tier::Local => "self",
            Tier::SameLevel => "same-level",
            Tier::Child => "child",
            Tier::Parent => "parent",
            Tier::Cousin => "cousin",
            Tier::Cloud => "cloud",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub device_id: i64,
    pub tier: Tier,
}

/// Static device table plus the tier walk over it.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DispatchPlanner {
    devices: Vec<NetworkDevice>,
}

impl DispatchPlanner {
    pub fn new(devices: Vec<NetworkDevice>) -> Result<Self> {
        validate_devices(&devices)?;
        Ok(Self { devices })
    }

    pub fn devices(&self) -> &[NetworkDevice] {
        &self.devices
    }

    /// Swaps in a new device table; the old one stays when validation fails.
    pub fn set_devices(&mut self, devices: Vec<NetworkDevice>) -> Result<Vec<NetworkDevice>> {
        validate_devices(&devices)?;
        Ok(std::mem::replace(&mut self.devices, devices))
    }

    pub fn select_device(&self, ctx: &DispatchContext, rng: &mut dyn RngCore) -> Option<Selection> {
        let availability = &ctx.availability;
        if availability.has_capacity(ctx.this_device_id) {
            return Some(Selection {
                device_id: ctx.this_device_id,
                tier: Tier::Local,
            });
        }

        let mut examined = HashSet::from([ctx.this_device_id]);
        for tier in &Tier::ALL[1..] {
            let members = self.tier_members(*tier, ctx, &mut examined);
            let candidates: Vec<i64> = members
                .into_iter()
                .filter(|device_id| availability.has_capacity(*device_id))
                .collect();
            if candidates.is_empty() {
                continue;
            }

            let device_id = pick(&candidates, rng);
            debug!(
                this_device_id = ctx.this_device_id,
                device_id,
                tier = %tier,
                candidates = candidates.len(),
                "dispatch target selected"
            );
            return Some(Selection {
                device_id,
                tier: *tier,
            });
        }

        warn!(
            this_device_id = ctx.this_device_id,
            reported_devices = availability.len(),
            "service discovery information missing or no service instance available"
        );
        None
    }

    /// Same walk as [`select_device`](Self::select_device), collapsed to the
    /// wire representation where [`NOT_FOUND`] marks a discovery gap.
    pub fn find_device_id(&self, ctx: &DispatchContext, rng: &mut dyn RngCore) -> i64 {
        self.select_device(ctx, rng)
            .map_or(NOT_FOUND, |selection| selection.device_id)
    }

    /// Devices belonging to `tier` that no earlier tier has examined, in
    /// first-seen order.
    fn tier_members(
        &self,
        tier: Tier,
        ctx: &DispatchContext,
        examined: &mut HashSet<i64>,
    ) -> Vec<i64> {
        let ids: Vec<i64> = match tier {
            Tier::Local => vec![ctx.this_device_id],
            Tier::SameLevel => ctx.same_level_device_ids.clone(),
            Tier::Child => ctx.child_device_ids.clone(),
            Tier::Parent => ctx.parent_device_ids.clone(),
            Tier::Cousin => ctx
                .parent_device_ids
                .iter()
                .filter_map(|parent_id| self.device(*parent_id))
                .flat_map(|parent| parent.child_device_ids.iter().copied())
                .collect(),
            Tier::Cloud => self
                .devices
                .iter()
                .filter(|device| device.is_cloud())
                .map(|device| device.id)
                .collect(),
        };

        ids.into_iter()
            .filter(|device_id| examined.insert(*device_id))
            .collect()
    }

    fn device(&self, device_id: i64) -> Option<&NetworkDevice> {
        let device = self.devices.iter().find(|device| device.id == device_id);
        if device.is_none() {
            debug!(device_id, "parent device missing from topology table");
        }
        device
    }
}

fn validate_devices(devices: &[NetworkDevice]) -> Result<()> {
    let mut ids = HashSet::new();
    for device in devices {
        if !ids.insert(device.id) {
            return Err(Error::DuplicateDeviceId(device.id));
        }
    }
    Ok(())
}

fn pick(candidates: &[i64], rng: &mut dyn RngCore) -> i64 {
    if candidates.len() == 1 {
        return candidates[0];
    }
    candidates[rng.gen_range(0..candidates.len())]
}

/// Random source that always draws zero, which makes every tie resolve to
/// the first candidate in input order.
#[derive(Clone, Copy, Debug, Default)]
pub struct StableRng;

impl RngCore for StableRng {
    fn next_u32(&mut self) -> u32 {
        0
    }

    fn next_u64(&mut self) -> u64 {
        0
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        dest.fill(0);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
