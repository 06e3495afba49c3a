//! Pipeline orchestration: descriptor in, RC map out. The conversion is a
//! pure function of its inputs plus a cancellation flag that long stages
//! poll; a set flag surfaces as the typed [`Cancelled`] error so callers can
//! tell a timeout apart from a genuine fault.

use crate::builder;
use crate::dedup;
use crate::model::{PointKind, TransitMap};
use crate::optimizer;
use crate::rc::{RcMap, RcStation};
use crate::tracks;
use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::AtomicBool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conversion cancelled")
    }
}

impl std::error::Error for Cancelled {}

pub fn convert_descriptor(aarc: &Value, config: &Value, cancel: &AtomicBool) -> Result<RcMap> {
    let map = builder::build_map(aarc, config)?;
    convert_map(&map, cancel)
}

pub fn convert_map(map: &TransitMap, cancel: &AtomicBool) -> Result<RcMap> {
    let lines = if optimizer::is_active(map) {
        optimizer::optimize_segmentation(map, cancel)?
    } else {
        let mut routes =
            tracks::enumerate_routes(map, &map.config.segmented_lines, None, cancel)?;
        dedup::remove_duplicate_routes(&mut routes);
        routes
    };
    Ok(RcMap {
        stations: collect_stations(map),
        lines,
    })
}

/// Every group (at its member centroid) and every ungrouped station appears
/// in the output, whether or not a route serves it.
fn collect_stations(map: &TransitMap) -> BTreeMap<i64, RcStation> {
    let mut stations = BTreeMap::new();
    for (&group_id, _) in &map.station_groups {
        let pos = map.normalized_pos(map.group_pos(group_id));
        stations.insert(
            group_id,
            RcStation {
                id: group_id,
                norm_x: pos.x,
                norm_y: pos.y,
            },
        );
    }
    for (&point_id, point) in &map.points {
        if point.kind != PointKind::Station || map.point_to_group.contains_key(&point_id) {
            continue;
        }
        let pos = map.normalized_pos(point.pos);
        stations.insert(
            point_id,
            RcStation {
                id: point_id,
                norm_x: pos.x,
                norm_y: pos.y,
            },
        );
    }
    stations
}
