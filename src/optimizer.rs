//! Segmentation optimizer. Lines whose segmentation entry is negative share
//! that value as a group key; the optimizer tunes one segment length per
//! group, descending on the deduplicated route count. Trial enumerations run
//! against a mask of just the affected lines (closed over friend and merge
//! relations), which keeps each probe cheap on large maps.

use crate::convert::Cancelled;
use crate::dedup;
use crate::model::{LineId, TransitMap};
use crate::rc::RcLine;
use crate::tracks;
use ahash::AHashSet;
use anyhow::Result;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

const WIDE_DELTAS: [i64; 6] = [-11, -5, -2, 2, 5, 11];
const NARROW_DELTAS: [i64; 4] = [-5, -2, 2, 5];

pub fn is_active(map: &TransitMap) -> bool {
    map.config.optimize_segmentation && map.config.segmented_lines.values().any(|v| *v < 0)
}

fn route_count(
    map: &TransitMap,
    segmented: &BTreeMap<LineId, i64>,
    mask: Option<&AHashSet<LineId>>,
    cancel: &AtomicBool,
) -> Result<usize> {
    let mut routes = tracks::enumerate_routes(map, segmented, mask, cancel)?;
    dedup::remove_duplicate_routes(&mut routes);
    Ok(routes.len())
}

/// The set of lines a segmentation change can influence: the grouped lines
/// themselves plus everything reachable over friend/merge pairs.
fn affected_lines(map: &TransitMap, seeds: &AHashSet<LineId>) -> AHashSet<LineId> {
    let mut mask = seeds.clone();
    let mut frontier: Vec<LineId> = mask.iter().copied().collect();
    while let Some(line) = frontier.pop() {
        for &(a, b) in map
            .config
            .friend_lines
            .iter()
            .chain(map.config.merged_lines.iter())
        {
            if a == line && mask.insert(b) {
                frontier.push(b);
            }
        }
    }
    mask
}

/// Tunes the grouped segment lengths and returns the final deduplicated
/// route set from a full, unmasked enumeration.
pub fn optimize_segmentation(
    map: &TransitMap,
    cancel: &AtomicBool,
) -> Result<BTreeMap<i64, RcLine>> {
    let mut segmented = map.config.segmented_lines.clone();

    let mut groups: BTreeMap<i64, Vec<LineId>> = BTreeMap::new();
    for (&line_id, &value) in &segmented {
        if value < 0 {
            groups.entry(value).or_default().push(line_id);
        }
    }

    let initial = map.config.max_rc_steps << 1;
    let mut group_values: BTreeMap<i64, i64> = BTreeMap::new();
    for (&key, lines) in &groups {
        group_values.insert(key, initial);
        for line_id in lines {
            segmented.insert(*line_id, initial);
        }
    }

    let seeds: AHashSet<LineId> = groups.values().flatten().copied().collect();
    let mask = affected_lines(map, &seeds);

    let mut best_cost = route_count(map, &segmented, Some(&mask), cancel)?;
    info!(
        "optimizing {} segmentation group(s) over {} line(s), starting at {} routes",
        groups.len(),
        mask.len(),
        best_cost
    );

    let mut iteration = 0u32;
    while iteration < map.config.max_iterations {
        if cancel.load(Ordering::Relaxed) {
            return Err(Cancelled.into());
        }
        let deltas: &[i64] = if iteration < 2 {
            &WIDE_DELTAS
        } else {
            &NARROW_DELTAS
        };

        let mut improved = false;
        for (&key, lines) in &groups {
            let current = group_values[&key];
            let mut best_delta = None;
            for &delta in deltas {
                let value = current + delta;
                if value <= map.config.max_rc_steps || value >= map.config.max_length * 2 {
                    continue;
                }
                let mut trial = segmented.clone();
                for line_id in lines {
                    trial.insert(*line_id, value);
                }
                let cost = route_count(map, &trial, Some(&mask), cancel)?;
                debug!(
                    "iteration {}, group {}: length {} gives {} routes",
                    iteration, key, value, cost
                );
                if cost < best_cost {
                    best_cost = cost;
                    best_delta = Some(delta);
                }
            }
            if let Some(delta) = best_delta {
                let value = current + delta;
                group_values.insert(key, value);
                for line_id in lines {
                    segmented.insert(*line_id, value);
                }
                improved = true;
                info!(
                    "iteration {}: group {} moves to segment length {} ({} routes)",
                    iteration, key, value, best_cost
                );
            }
        }

        iteration += 1;
        if !improved {
            break;
        }
    }

    let mut routes = tracks::enumerate_routes(map, &segmented, None, cancel)?;
    dedup::remove_duplicate_routes(&mut routes);
    Ok(routes)
}
