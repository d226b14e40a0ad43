//! Turning user intent into slot ranges.
//!
//! Two selection modes exist: an explicit `<slot>` / `<start>,<end>` spec,
//! or a number of slots taken greedily from what the source node owns.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::client::{NodeClient, SlotRange, Transport};
use crate::error::{ReshardError, Result};

// Pattern: ^<slot>$
static SLOT_EXACT_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^\d+$").ok());
// Pattern: ^<start>,<end>$
static SLOT_RANGE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d+),(\d+)$").ok());

/// How the slots to migrate are chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotSelection {
    /// A single slot or a `start,end` pair.
    Explicit(String),
    /// The first `n` slots owned by the source node.
    Count(u32),
}

impl SlotSelection {
    /// Build a selection from command-line input.
    ///
    /// A non-empty spec wins over the count.
    pub fn from_cli(spec: Option<&str>, count: i64) -> Result<Self> {
        match spec.map(str::trim).filter(|s| !s.is_empty()) {
            Some(spec) => Ok(SlotSelection::Explicit(spec.to_string())),
            None if count > 0 => u32::try_from(count)
                .map(SlotSelection::Count)
                .map_err(|_| ReshardError::InvalidConfig(format!("slot count {} is too large", count))),
            None => Err(ReshardError::InvalidConfig(
                "either a slot range or a positive number of slots is required".to_string(),
            )),
        }
    }
}

fn invalid_spec(spec: &str, reason: impl Into<String>) -> ReshardError {
    ReshardError::InvalidSlotSpec {
        spec: spec.to_string(),
        reason: reason.into(),
    }
}

fn pattern(re: &'static LazyLock<Option<Regex>>) -> Result<&'static Regex> {
    re.as_ref()
        .ok_or_else(|| ReshardError::InvalidConfig("slot pattern failed to compile".to_string()))
}

fn parse_slot(spec: &str, digits: &str) -> Result<u16> {
    digits
        .parse()
        .map_err(|_| invalid_spec(spec, format!("slot {} is out of range", digits)))
}

/// Parse a `<slot>` or `<start>,<end>` specification.
pub fn parse_slot_spec(spec: &str) -> Result<SlotRange> {
    let trimmed = spec.trim();

    if pattern(&SLOT_EXACT_RE)?.is_match(trimmed) {
        let slot = parse_slot(spec, trimmed)?;
        return SlotRange::single(slot).map_err(|e| invalid_spec(spec, e.to_string()));
    }

    if let Some(caps) = pattern(&SLOT_RANGE_RE)?.captures(trimmed)
        && let (Some(start), Some(end)) = (caps.get(1), caps.get(2))
    {
        let start = parse_slot(spec, start.as_str())?;
        let end = parse_slot(spec, end.as_str())?;
        return SlotRange::new(start, end).map_err(|e| invalid_spec(spec, e.to_string()));
    }

    Err(invalid_spec(spec, "expected '<slot>' or '<start>,<end>'"))
}

/// Take ranges in order until `count` slots are covered, truncating the last.
///
/// Returns every range when they cover fewer than `count` slots.
pub fn limit_to(ranges: &[SlotRange], count: u32) -> Vec<SlotRange> {
    let mut remaining = count;
    let mut selected = Vec::new();

    for range in ranges {
        let Some(taken) = range.take(remaining) else {
            break;
        };
        remaining -= taken.count();
        selected.push(taken);
    }

    selected
}

/// Resolve a selection into the ranges to hand to the scheduler.
pub async fn resolve_slots<T: Transport>(
    source: &NodeClient<T>,
    selection: &SlotSelection,
) -> Result<Vec<SlotRange>> {
    match selection {
        SlotSelection::Explicit(spec) => Ok(vec![parse_slot_spec(spec)?]),
        SlotSelection::Count(count) => {
            let snapshot =
                source
                    .topology_snapshot()
                    .await
                    .map_err(|e| ReshardError::Node {
                        address: source.address().clone(),
                        source: e,
                    })?;

            let ranges = limit_to(&snapshot.ranges(), *count);
            let selected: u32 = ranges.iter().map(SlotRange::count).sum();
            if selected < *count {
                warn!(
                    requested = count,
                    owned = selected,
                    node = %source.address(),
                    "Source owns fewer slots than requested, migrating all of them"
                );
            }
            info!(ranges = ranges.len(), slots = selected, "Resolved slots to migrate");
            Ok(ranges)
        }
    }
}
