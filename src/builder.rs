//! Builds the normalized [`TransitMap`] from an AARC descriptor and a
//! converter config. The build is a fixed pipeline: entities, sizes, config
//! tables, auxiliary points, point links, grouping, and the derived line
//! flags. Dangling ids anywhere in the descriptor are skipped silently.

use crate::aarc::{AarcDescriptor, AarcLine, ConfigDescriptor, LineRef, SegmentedEntry};
use crate::aux_points;
use crate::geometry::Position;
use crate::model::{
    Line, LineId, LinkMode, LinkType, Point, PointDir, PointId, PointKind, TransitMap,
};
use ahash::AHashMap;
use ahash::AHashSet;
use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::Value;
use std::collections::BTreeMap;

pub fn build_map(aarc: &Value, config: &Value) -> Result<TransitMap> {
    let descriptor: AarcDescriptor =
        serde_json::from_value(aarc.clone()).context("invalid AARC descriptor")?;
    let config_descriptor: ConfigDescriptor = if config.is_null() {
        ConfigDescriptor::default()
    } else {
        serde_json::from_value(config.clone()).context("invalid converter config")?
    };
    build_from_descriptors(&descriptor, &config_descriptor)
}

fn resolve_line_ref(lines: &BTreeMap<LineId, Line>, r: &LineRef) -> Option<LineId> {
    match r {
        LineRef::Id(id) => lines.contains_key(id).then_some(*id),
        LineRef::Name(name) => lines.values().find(|l| &l.name == name).map(|l| l.id),
    }
}

fn width_key(width: f64) -> i64 {
    (width * 100.0 + 0.5) as i64
}

fn line_point_size(line: &AarcLine, width_to_size: &AHashMap<i64, f64>) -> f64 {
    let mut point_size = match &line.pt_size {
        Some(v) => v.as_f64().unwrap_or(1.0),
        None => 0.0,
    };
    if point_size < 1e-3 {
        point_size = match &line.width {
            Some(w) => {
                let width = w.as_f64().unwrap_or(1.0);
                width_to_size
                    .get(&width_key(width))
                    .copied()
                    .unwrap_or(width)
            }
            None => 1.0,
        };
    }
    point_size
}

pub fn build_from_descriptors(
    descriptor: &AarcDescriptor,
    config: &ConfigDescriptor,
) -> Result<TransitMap> {
    let mut map = TransitMap::default();

    if let Some([w, h]) = descriptor.cvs_size {
        map.width = w;
        map.height = h;
    }

    for p in &descriptor.points {
        map.points.insert(
            p.id,
            Point {
                id: p.id,
                pos: Position::new(p.pos[0], p.pos[1]),
                dir: PointDir::from_code(p.dir),
                kind: PointKind::from_code(p.sta),
                size: 1.0,
                name: p.name.clone().unwrap_or_default(),
            },
        );
    }

    let mut width_to_size: AHashMap<i64, f64> = AHashMap::new();
    if let Some(embedded) = &descriptor.config {
        for (key, mapping) in &embedded.line_width_mapped {
            let (Ok(width), Some(size)) = (key.trim().parse::<f64>(), mapping.sta_size) else {
                continue;
            };
            width_to_size.insert(width_key(width), size);
        }
    }

    let mut max_line_id: LineId = 0;
    for l in &descriptor.lines {
        if l.line_type != 0 || l.is_fake {
            continue;
        }
        let point_ids = l.pts.clone();
        let is_loop = point_ids.len() >= 2 && point_ids.first() == point_ids.last();
        if let Some(parent) = l.parent {
            map.connect_lines(l.id, parent, false);
        }
        max_line_id = max_line_id.max(l.id);

        let point_size = line_point_size(l, &width_to_size);
        for pid in &point_ids {
            if let Some(p) = map.points.get_mut(pid) {
                p.size = p.size.max(point_size);
            }
        }

        map.lines.insert(
            l.id,
            Line {
                id: l.id,
                name: l.name.clone().unwrap_or_default(),
                point_ids,
                is_loop,
                is_simple: false,
                parent_id: l.parent,
            },
        );
    }

    apply_config(&mut map, config);

    aux_points::add_auxiliary_points(&mut map);

    apply_point_links(&mut map, descriptor, max_line_id);
    auto_group_stations(&mut map);
    connect_common_parents(&mut map);

    // explicit segmentation must stay strictly above the step floor
    let floor = map.config.max_rc_steps;
    for v in map.config.segmented_lines.values_mut() {
        if *v >= 0 && *v <= floor {
            *v = floor + 1;
        }
    }

    refine_loops(&mut map);
    flag_simple_lines(&mut map);

    info!(
        "built map: {} points, {} lines, {} station groups",
        map.points.len(),
        map.lines.len(),
        map.station_groups.len()
    );
    Ok(map)
}

fn apply_config(map: &mut TransitMap, cfg: &ConfigDescriptor) {
    if let Some(v) = cfg.max_length {
        if v > 0 {
            map.config.max_length = v;
        }
    }
    if let Some(v) = cfg.max_rc_steps {
        if v > 0 {
            map.config.max_rc_steps = v;
        }
    }
    if let Some(v) = cfg.max_iterations {
        if v > 0 {
            map.config.max_iterations = v as u32;
        }
    }
    if let Some(v) = cfg.auto_group_distance {
        if v > 0.0 {
            map.config.auto_group_distance = v;
        }
    }
    if let Some(v) = cfg.merge_consecutive_duplicates {
        map.config.merge_consecutive_duplicates = v;
    }
    if let Some(v) = cfg.optimize_segmentation {
        map.config.optimize_segmentation = v;
    }

    if let Some(modes) = &cfg.link_modes {
        for (key, value) in modes {
            let (Some(link_type), Some(mode)) =
                (LinkType::from_name(key), LinkMode::from_name(value))
            else {
                continue;
            };
            map.config.link_modes.insert(link_type, mode);
        }
    }

    if let Some(pairs) = &cfg.friend_lines {
        for pair in pairs {
            if pair.len() != 2 {
                continue;
            }
            let (Some(a), Some(b)) = (
                resolve_line_ref(&map.lines, &pair[0]),
                resolve_line_ref(&map.lines, &pair[1]),
            ) else {
                continue;
            };
            map.connect_lines(a, b, true);
        }
    }

    if let Some(pairs) = &cfg.merged_lines {
        for pair in pairs {
            if pair.len() != 2 {
                continue;
            }
            let (Some(a), Some(b)) = (
                resolve_line_ref(&map.lines, &pair[0]),
                resolve_line_ref(&map.lines, &pair[1]),
            ) else {
                continue;
            };
            map.merge_lines(a, b, true);
        }
    }

    if let Some(entries) = &cfg.segmented_lines {
        let mut param_ind: i64 = 0;
        for entry in entries {
            param_ind += 1;
            match entry {
                SegmentedEntry::One(r) => {
                    if let Some(id) = resolve_line_ref(&map.lines, r) {
                        map.config.segmented_lines.insert(id, -param_ind);
                    }
                }
                SegmentedEntry::Many(refs) => {
                    for r in refs {
                        if let Some(id) = resolve_line_ref(&map.lines, r) {
                            map.config.segmented_lines.insert(id, -param_ind);
                        }
                    }
                }
                SegmentedEntry::Detailed {
                    line,
                    lines,
                    segment_length,
                } => {
                    if line.is_none() && lines.is_none() {
                        continue;
                    }
                    let mut seg_len = -param_ind;
                    if let Some(explicit) = segment_length {
                        if *explicit > 0 {
                            seg_len = *explicit;
                        }
                    }
                    if let Some(r) = line {
                        if let Some(id) = resolve_line_ref(&map.lines, r) {
                            map.config.segmented_lines.insert(id, seg_len);
                        }
                    } else if let Some(refs) = lines {
                        for r in refs {
                            if let Some(id) = resolve_line_ref(&map.lines, r) {
                                map.config.segmented_lines.insert(id, seg_len);
                            }
                        }
                    }
                }
            }
        }
    }
}

fn apply_point_links(map: &mut TransitMap, descriptor: &AarcDescriptor, mut max_line_id: LineId) {
    for link in &descriptor.point_links {
        if link.pts.len() < 2 {
            debug!("skipping malformed point link {:?}", link.pts);
            continue;
        }
        let Some(link_type) = LinkType::from_code(link.link_type) else {
            continue;
        };
        let mode = map
            .config
            .link_modes
            .get(&link_type)
            .copied()
            .unwrap_or(LinkMode::None);
        match mode {
            LinkMode::None => {}
            LinkMode::Connect => {
                max_line_id += 1;
                map.lines.insert(
                    max_line_id,
                    Line {
                        id: max_line_id,
                        name: format!("PointLink_{}", max_line_id),
                        point_ids: vec![link.pts[0], link.pts[1]],
                        is_loop: false,
                        is_simple: false,
                        parent_id: None,
                    },
                );
            }
            LinkMode::Group => {
                map.join_stations(link.pts[0], link.pts[1]);
            }
        }
    }
}

fn auto_group_stations(map: &mut TransitMap) {
    let stations: Vec<(PointId, Position, f64)> = map
        .points
        .values()
        .filter(|p| p.kind == PointKind::Station)
        .map(|p| (p.id, p.pos, p.size))
        .collect();
    for (i, &(id1, pos1, size1)) in stations.iter().enumerate() {
        for &(id2, pos2, size2) in &stations[i + 1..] {
            let group_distance = map.config.auto_group_distance * (size1 + size2) / 2.0;
            if (pos1 - pos2).length() <= group_distance + 1e-3 {
                map.join_stations(id1, id2);
            }
        }
    }
}

fn connect_common_parents(map: &mut TransitMap) {
    let parented: Vec<(LineId, LineId)> = map
        .lines
        .values()
        .filter_map(|l| l.parent_id.map(|p| (l.id, p)))
        .collect();
    for (i, &(id1, parent1)) in parented.iter().enumerate() {
        for &(id2, parent2) in &parented[i + 1..] {
            if parent1 == parent2 {
                map.connect_lines(id1, id2, false);
            }
        }
    }
}

/// A non-loop line whose point sequence repeats with some period is a loop
/// that was traced more than once; truncate it to a single revolution.
fn refine_loops(map: &mut TransitMap) {
    for line in map.lines.values_mut() {
        if line.is_loop {
            continue;
        }
        let pids = &line.point_ids;
        let mut period = 0usize;
        for i in 1..pids.len() {
            if period == 0 && pids[i] == pids[0] {
                period = i;
            } else if period != 0 && pids[i] != pids[i % period] {
                period = 0;
                break;
            }
        }
        if period != 0 {
            line.is_loop = true;
            line.point_ids.truncate(period + 1);
        }
    }
}

fn flag_simple_lines(map: &mut TransitMap) {
    let friend_members: AHashSet<LineId> = map
        .config
        .friend_lines
        .iter()
        .flat_map(|&(a, b)| [a, b])
        .collect();
    let merged_members: AHashSet<LineId> = map
        .config
        .merged_lines
        .iter()
        .flat_map(|&(a, b)| [a, b])
        .collect();

    let mut flags: Vec<(LineId, bool)> = Vec::with_capacity(map.lines.len());
    for (id, line) in &map.lines {
        let simple = !map.config.segmented_lines.contains_key(id)
            && !friend_members.contains(id)
            && !merged_members.contains(id)
            && !has_duplicate_stations(map, line);
        flags.push((*id, simple));
    }
    for (id, simple) in flags {
        if let Some(line) = map.lines.get_mut(&id) {
            line.is_simple = simple;
        }
    }
}

fn has_duplicate_stations(map: &TransitMap, line: &Line) -> bool {
    // the closing duplicate of a loop does not count
    let limit = if line.is_loop {
        line.point_ids.len().saturating_sub(1)
    } else {
        line.point_ids.len()
    };
    let mut seen = AHashSet::new();
    for pid in &line.point_ids[..limit] {
        if let Some(p) = map.points.get(pid) {
            if p.kind == PointKind::Station && !seen.insert(*pid) {
                return true;
            }
        }
    }
    false
}
