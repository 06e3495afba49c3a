//! Track graph and route enumeration. Every (line, index) position sprouts
//! direction-tagged half-edges ("tracks"); a breadth-first search walks them,
//! crossing between lines only where the friend/merge rules allow, and emits
//! one RC line per maximal admissible walk.

use crate::convert::Cancelled;
use crate::model::{Line, LineId, PointId, PointKind, TransitMap};
use crate::rc::RcLine;
use ahash::AHashMap;
use ahash::AHashSet;
use anyhow::Result;
use log::debug;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

/// A directed half-edge leaving a (line, index) position. `next_override`
/// carries the wrap-around target on loop lines; `is_end` marks the dead end
/// of a non-loop line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Track {
    pub point_id: PointId,
    pub line_id: LineId,
    pub index_in_line: usize,
    pub forward: bool,
    pub is_end: bool,
    pub next_override: Option<usize>,
}

impl Track {
    fn new(point_id: PointId, line_id: LineId, index_in_line: usize, forward: bool) -> Track {
        Track {
            point_id,
            line_id,
            index_in_line,
            forward,
            is_end: false,
            next_override: None,
        }
    }

    /// Index of the position this track runs toward. Only meaningful for
    /// non-end tracks, which by construction never step out of range.
    fn next_index(&self) -> usize {
        match self.next_override {
            Some(i) => i,
            None => {
                if self.forward {
                    self.index_in_line + 1
                } else {
                    self.index_in_line - 1
                }
            }
        }
    }
}

type TrackTable = AHashMap<PointId, Vec<Track>>;

fn build_track_table(map: &TransitMap, mask: Option<&AHashSet<LineId>>) -> TrackTable {
    let mut by_point: TrackTable = AHashMap::new();
    for (line_id, line) in &map.lines {
        if let Some(mask) = mask {
            if !mask.contains(line_id) {
                continue;
            }
        }
        let n = line.point_ids.len();
        for (i, pid) in line.point_ids.iter().enumerate() {
            if !map.points.contains_key(pid) {
                continue;
            }
            let tracks = by_point.entry(*pid).or_default();
            if i + 1 < n {
                tracks.push(Track::new(*pid, *line_id, i, true));
            }
            if i > 0 {
                tracks.push(Track::new(*pid, *line_id, i, false));
            }
            if line.is_loop {
                if i == 0 {
                    tracks.push(Track {
                        next_override: Some(n - 1),
                        ..Track::new(*pid, *line_id, i, false)
                    });
                }
                if i + 1 == n {
                    tracks.push(Track {
                        next_override: Some(0),
                        ..Track::new(*pid, *line_id, i, true)
                    });
                }
            } else {
                if i == 0 {
                    tracks.push(Track {
                        is_end: true,
                        ..Track::new(*pid, *line_id, i, false)
                    });
                }
                if i + 1 == n {
                    tracks.push(Track {
                        is_end: true,
                        ..Track::new(*pid, *line_id, i, true)
                    });
                }
            }
        }
    }
    by_point
}

fn next_tracks(map: &TransitMap, table: &TrackTable, track: &Track) -> Vec<Track> {
    if track.is_end {
        return Vec::new();
    }
    let Some(line) = map.lines.get(&track.line_id) else {
        return Vec::new();
    };
    let ni = track.next_index();
    let Some(&next_pid) = line.point_ids.get(ni) else {
        return Vec::new();
    };
    let Some(candidates) = table.get(&next_pid) else {
        return Vec::new();
    };

    let mut result = Vec::new();
    for cand in candidates {
        if cand.line_id == track.line_id && cand.index_in_line == ni {
            if cand.forward == track.forward || cand.is_end {
                result.push(*cand);
            }
            continue;
        }
        if cand.is_end {
            continue;
        }
        let pair = (track.line_id, cand.line_id);
        if map.config.merged_lines.contains(&pair) {
            result.push(*cand);
            continue;
        }
        if !map.config.friend_lines.contains(&pair) {
            continue;
        }
        let Some(cand_line) = map.lines.get(&cand.line_id) else {
            continue;
        };
        let Some(&after_next) = cand_line.point_ids.get(cand.next_index()) else {
            continue;
        };
        if map.can_move_through(track.point_id, next_pid, after_next) {
            result.push(*cand);
        }
    }

    // an end track is only taken when there is no alternative
    if result.len() > 1 {
        result.retain(|t| !t.is_end);
    }
    result
}

fn line_cap(segmented: &BTreeMap<LineId, i64>, max_length: i64, line_id: LineId) -> i64 {
    match segmented.get(&line_id) {
        Some(&v) if v > 0 => v,
        _ => max_length,
    }
}

/// A partial route under construction. `remaining` is the station budget:
/// it shrinks by one per station pushed and is clamped to the cap of every
/// line the route touches.
#[derive(Debug, Clone)]
struct RouteEntry {
    tracks: Vec<Track>,
    remaining: i64,
}

impl RouteEntry {
    fn seeded(
        map: &TransitMap,
        segmented: &BTreeMap<LineId, i64>,
        track: Track,
    ) -> RouteEntry {
        let mut entry = RouteEntry {
            tracks: Vec::new(),
            remaining: map.config.max_length,
        };
        entry.push(map, segmented, track);
        entry
    }

    fn push(&mut self, map: &TransitMap, segmented: &BTreeMap<LineId, i64>, track: Track) {
        let cap = line_cap(segmented, map.config.max_length, track.line_id);
        self.remaining = self.remaining.min(cap);
        let is_station = map
            .points
            .get(&track.point_id)
            .is_some_and(|p| p.kind == PointKind::Station);
        if is_station {
            self.remaining -= 1;
        }
        self.tracks.push(track);
    }

    fn full(&self) -> bool {
        self.remaining <= 0
    }
}

fn push_emitted(out: &mut BTreeMap<i64, RcLine>, station_ids: Vec<PointId>, is_loop: bool) {
    if station_ids.len() < 2 {
        return;
    }
    let id = out.len() as i64 + 1;
    out.insert(
        id,
        RcLine {
            id,
            station_ids,
            is_loop,
        },
    );
}

fn collect_stations<'a>(
    map: &TransitMap,
    point_ids: impl Iterator<Item = &'a PointId>,
) -> Vec<PointId> {
    let mut stations = Vec::new();
    for pid in point_ids {
        let Some(point) = map.points.get(pid) else {
            continue;
        };
        if point.kind != PointKind::Station {
            continue;
        }
        let id = map.station_id_for(*pid);
        if !map.config.merge_consecutive_duplicates || stations.last() != Some(&id) {
            stations.push(id);
        }
    }
    stations
}

fn emit_route(map: &TransitMap, tracks: &[Track], out: &mut BTreeMap<i64, RcLine>) {
    if tracks.len() < 2 {
        return;
    }
    let stations = collect_stations(map, tracks.iter().map(|t| &t.point_id));
    push_emitted(out, stations, false);
}

/// A simple line contributes exactly its own station sequence; there is
/// nothing to search.
fn emit_simple_line(map: &TransitMap, line: &Line, out: &mut BTreeMap<i64, RcLine>) {
    let stations = collect_stations(map, line.point_ids.iter());
    push_emitted(out, stations, line.is_loop);
}

/// Enumerates every admissible route as an RC line. `segmented` is the
/// caller's segmentation table (the optimizer passes trial copies); `mask`
/// restricts the search to a subset of lines. Checks `cancel` once per BFS
/// iteration.
pub fn enumerate_routes(
    map: &TransitMap,
    segmented: &BTreeMap<LineId, i64>,
    mask: Option<&AHashSet<LineId>>,
    cancel: &AtomicBool,
) -> Result<BTreeMap<i64, RcLine>> {
    if cancel.load(Ordering::Relaxed) {
        return Err(Cancelled.into());
    }

    let table = build_track_table(map, mask);
    let mut out = BTreeMap::new();
    let mut queue: VecDeque<RouteEntry> = VecDeque::new();

    for (line_id, line) in &map.lines {
        if let Some(mask) = mask {
            if !mask.contains(line_id) {
                continue;
            }
        }
        if line.point_ids.len() < 2 {
            continue;
        }
        if line.is_simple {
            emit_simple_line(map, line, &mut out);
            continue;
        }

        let n = line.point_ids.len();
        queue.push_back(RouteEntry::seeded(
            map,
            segmented,
            Track::new(line.point_ids[0], *line_id, 0, true),
        ));
        queue.push_back(RouteEntry::seeded(
            map,
            segmented,
            Track::new(line.point_ids[n - 1], *line_id, n - 1, false),
        ));

        // interior seeds give segmented lines restart points, so the split
        // position is controlled by the segment length
        if let Some(&cap) = segmented.get(line_id) {
            if cap > 0 {
                let step = (cap - map.config.max_rc_steps).max(1) as usize;
                let mut i = step;
                while i + 1 < n {
                    queue.push_back(RouteEntry::seeded(
                        map,
                        segmented,
                        Track::new(line.point_ids[i], *line_id, i, true),
                    ));
                    queue.push_back(RouteEntry::seeded(
                        map,
                        segmented,
                        Track::new(line.point_ids[i], *line_id, i, false),
                    ));
                    i += step;
                }
            }
        }
    }

    // No visited tracking: all admissible routes matter, and the station
    // budget bounds the search.
    while let Some(entry) = queue.pop_front() {
        if cancel.load(Ordering::Relaxed) {
            return Err(Cancelled.into());
        }
        let Some(last) = entry.tracks.last() else {
            continue;
        };
        let nexts = next_tracks(map, &table, last);
        if nexts.is_empty() || entry.full() {
            emit_route(map, &entry.tracks, &mut out);
            continue;
        }
        for next in nexts {
            let mut extended = entry.clone();
            extended.push(map, segmented, next);
            queue.push_back(extended);
        }
    }

    debug!("enumerated {} routes", out.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Position;
    use crate::model::{Point, PointDir};

    fn station(id: PointId, x: f64, y: f64) -> Point {
        Point {
            id,
            pos: Position::new(x, y),
            dir: PointDir::Orthogonal,
            kind: PointKind::Station,
            size: 1.0,
            name: String::new(),
        }
    }

    fn line(id: LineId, point_ids: Vec<PointId>) -> Line {
        let is_loop = point_ids.len() >= 2 && point_ids.first() == point_ids.last();
        Line {
            id,
            name: String::new(),
            point_ids,
            is_loop,
            is_simple: false,
            parent_id: None,
        }
    }

    fn no_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    fn enumerate(map: &TransitMap) -> Vec<Vec<PointId>> {
        enumerate_routes(map, &map.config.segmented_lines, None, &no_cancel())
            .unwrap()
            .into_values()
            .map(|l| l.station_ids)
            .collect()
    }

    fn y_junction() -> TransitMap {
        // line 1 runs west-east through point 2; line 2 runs south-north
        let mut map = TransitMap::default();
        map.points.insert(1, station(1, 0.0, 0.0));
        map.points.insert(2, station(2, 100.0, 0.0));
        map.points.insert(3, station(3, 200.0, 0.0));
        map.points.insert(4, station(4, 100.0, -100.0));
        map.points.insert(5, station(5, 100.0, 100.0));
        map.lines.insert(1, line(1, vec![1, 2, 3]));
        map.lines.insert(2, line(2, vec![4, 2, 5]));
        map
    }

    #[test]
    fn track_table_shapes() {
        let mut map = TransitMap::default();
        map.points.insert(1, station(1, 0.0, 0.0));
        map.points.insert(2, station(2, 100.0, 0.0));
        map.points.insert(3, station(3, 200.0, 0.0));
        map.lines.insert(1, line(1, vec![1, 2, 3]));
        let table = build_track_table(&map, None);
        // endpoints: one running track plus one end track
        assert_eq!(table[&1].len(), 2);
        assert_eq!(table[&3].len(), 2);
        assert!(table[&1].iter().any(|t| t.is_end && !t.forward));
        // middle point: forward and backward
        assert_eq!(table[&2].len(), 2);
        assert!(table[&2].iter().all(|t| !t.is_end));
    }

    #[test]
    fn loop_lines_get_wrap_tracks_instead_of_ends() {
        let mut map = TransitMap::default();
        for (id, (x, y)) in [(1, (0.0, 0.0)), (2, (100.0, 0.0)), (3, (100.0, 100.0))] {
            map.points.insert(id, station(id, x, y));
        }
        map.lines.insert(1, line(1, vec![1, 2, 3, 1]));
        let table = build_track_table(&map, None);
        assert!(table.values().flatten().all(|t| !t.is_end));
        let wrap_back = table[&1]
            .iter()
            .find(|t| t.index_in_line == 0 && !t.forward)
            .unwrap();
        assert_eq!(wrap_back.next_index(), 3);
        let wrap_fwd = table[&1]
            .iter()
            .find(|t| t.index_in_line == 3 && t.forward)
            .unwrap();
        assert_eq!(wrap_fwd.next_index(), 0);
    }

    #[test]
    fn unrelated_lines_never_cross() {
        let map = y_junction();
        let routes = enumerate(&map);
        assert!(routes.contains(&vec![1, 2, 3]));
        assert!(routes.contains(&vec![4, 2, 5]));
        assert!(!routes.iter().any(|r| r.contains(&1) && r.contains(&5)));
    }

    #[test]
    fn friend_lines_cross_within_ninety_degrees() {
        let mut map = y_junction();
        map.connect_lines(1, 2, false);
        let routes = enumerate(&map);
        for expected in [vec![1, 2, 3], vec![4, 2, 5], vec![1, 2, 5], vec![4, 2, 3]] {
            let reversed: Vec<_> = expected.iter().rev().copied().collect();
            assert!(
                routes.contains(&expected) || routes.contains(&reversed),
                "missing route {:?}",
                expected
            );
        }
    }

    #[test]
    fn friend_crossing_rejects_reversing_turns() {
        // line 2 leaves point 2 back toward point 1's side: a 180-degree turn
        let mut map = TransitMap::default();
        map.points.insert(1, station(1, 0.0, 0.0));
        map.points.insert(2, station(2, 100.0, 0.0));
        map.points.insert(3, station(3, 50.0, -100.0));
        map.lines.insert(1, line(1, vec![1, 2]));
        map.lines.insert(2, line(2, vec![2, 1]));
        map.connect_lines(1, 2, true);
        let table = build_track_table(&map, None);
        let start = Track::new(1, 1, 0, true);
        let nexts = next_tracks(&map, &table, &start);
        // the friendly track heading back to point 1 fails the turn rule,
        // leaving only line 1's own end track
        assert_eq!(nexts.len(), 1);
        assert!(nexts[0].is_end);
    }

    #[test]
    fn merged_lines_cross_unconditionally() {
        let mut map = TransitMap::default();
        map.points.insert(1, station(1, 0.0, 0.0));
        map.points.insert(2, station(2, 100.0, 0.0));
        map.points.insert(3, station(3, 0.0, 10.0));
        map.lines.insert(1, line(1, vec![1, 2]));
        map.lines.insert(2, line(2, vec![2, 3]));
        map.merge_lines(1, 2, false);
        let routes = enumerate(&map);
        // the sharp turn at point 2 is fine for merged lines
        assert!(routes
            .iter()
            .any(|r| r == &vec![1, 2, 3] || r == &vec![3, 2, 1]));
    }

    #[test]
    fn end_tracks_lose_to_alternatives() {
        // line 1 dead-ends at point 3, where merged line 2 continues
        let mut map = TransitMap::default();
        map.points.insert(1, station(1, 0.0, 0.0));
        map.points.insert(2, station(2, 100.0, 0.0));
        map.points.insert(3, station(3, 200.0, 0.0));
        map.points.insert(4, station(4, 300.0, 0.0));
        map.lines.insert(1, line(1, vec![1, 2, 3]));
        map.lines.insert(2, line(2, vec![3, 4]));
        map.merge_lines(1, 2, false);
        let table = build_track_table(&map, None);
        let approaching = Track::new(2, 1, 1, true);
        let nexts = next_tracks(&map, &table, &approaching);
        // line 1's own end track is demoted in favor of the continuation
        assert_eq!(nexts.len(), 1);
        assert!(!nexts[0].is_end);
        assert_eq!(nexts[0].line_id, 2);
    }

    #[test]
    fn segmented_line_caps_route_stations() {
        let mut map = TransitMap::default();
        for i in 0..20 {
            map.points.insert(i + 1, station(i + 1, 100.0 * i as f64, 0.0));
        }
        map.lines.insert(1, line(1, (1..=20).collect()));
        map.config.max_rc_steps = 4;
        map.config.segmented_lines.insert(1, 8);
        let routes = enumerate(&map);
        assert!(!routes.is_empty());
        for route in &routes {
            assert!(route.len() <= 8, "route too long: {:?}", route);
        }
        // interior seeds start every (8 - 4) positions
        assert!(routes.iter().any(|r| r.first() == Some(&5)));
    }

    #[test]
    fn simple_line_shortcut_matches_bfs_output() {
        let mut map = TransitMap::default();
        map.points.insert(1, station(1, 0.0, 0.0));
        map.points.insert(2, station(2, 100.0, 0.0));
        map.points.insert(3, station(3, 200.0, 0.0));
        map.lines.insert(1, line(1, vec![1, 2, 3]));

        map.lines.get_mut(&1).unwrap().is_simple = true;
        let shortcut = enumerate(&map);
        map.lines.get_mut(&1).unwrap().is_simple = false;
        let searched = enumerate(&map);

        assert_eq!(shortcut, vec![vec![1, 2, 3]]);
        // BFS finds the same sequence twice (once per direction); dedup
        // collapses that later
        assert!(searched.contains(&vec![1, 2, 3]) || searched.contains(&vec![3, 2, 1]));
    }

    #[test]
    fn single_point_and_degenerate_loops_emit_nothing() {
        let mut map = TransitMap::default();
        map.points.insert(1, station(1, 0.0, 0.0));
        map.lines.insert(1, line(1, vec![1]));
        map.lines.insert(2, line(2, vec![1, 1]));
        let routes = enumerate(&map);
        assert!(routes.is_empty());
    }

    #[test]
    fn cancellation_is_observed() {
        let map = y_junction();
        let cancel = AtomicBool::new(true);
        let err = enumerate_routes(&map, &map.config.segmented_lines, None, &cancel).unwrap_err();
        assert!(err.is::<Cancelled>());
    }

    #[test]
    fn consecutive_duplicates_collapse_under_the_flag() {
        let mut map = TransitMap::default();
        map.points.insert(1, station(1, 0.0, 0.0));
        map.points.insert(2, station(2, 100.0, 0.0));
        map.points.insert(3, station(3, 200.0, 0.0));
        map.lines.insert(1, line(1, vec![1, 2, 3]));
        map.join_stations(1, 2);
        map.lines.get_mut(&1).unwrap().is_simple = true;

        let routes = enumerate(&map);
        assert_eq!(routes, vec![vec![1, 3]]);

        map.config.merge_consecutive_duplicates = false;
        let routes = enumerate(&map);
        assert_eq!(routes, vec![vec![1, 1, 3]]);
    }
}
