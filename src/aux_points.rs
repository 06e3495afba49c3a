//! Auxiliary-point synthesis. Physical segments may only run at multiples of
//! 45 degrees, and each endpoint restricts which of those headings are usable
//! via its `dir` attribute. This pass rewrites every line's point sequence,
//! inserting Node waypoints wherever two adjacent points cannot be joined by
//! one admissible segment.

use crate::geometry::{is_zero, Position, Ray, EPSILON};
use crate::model::{LineId, Point, PointDir, PointKind, TransitMap};
use log::debug;

/// Half-plane classification of the offset between two points. The `reversed`
/// flag folds the other half-plane onto these nine cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PosRel {
    Same,
    Left,
    LeftLeftUp,
    LeftUp,
    LeftUpUp,
    Up,
    UpUpRight,
    UpRight,
    UpRightRight,
}

fn coord_rel_diff(x_diff: f64, y_diff: f64) -> (PosRel, bool) {
    if is_zero(x_diff) {
        if is_zero(y_diff) {
            return (PosRel::Same, false);
        }
        return (PosRel::Up, y_diff > 0.0);
    }
    if is_zero(y_diff) {
        return (PosRel::Left, x_diff > 0.0);
    }
    if is_zero(x_diff - y_diff) {
        return (PosRel::LeftUp, x_diff > 0.0);
    }
    if is_zero(x_diff + y_diff) {
        return (PosRel::UpRight, y_diff > 0.0);
    }
    if (y_diff > 0.0 && x_diff > y_diff) || (y_diff < 0.0 && x_diff < y_diff) {
        return (PosRel::LeftLeftUp, y_diff > 0.0);
    }
    if (x_diff > 0.0 && y_diff > x_diff) || (x_diff < 0.0 && y_diff < x_diff) {
        return (PosRel::LeftUpUp, x_diff > 0.0);
    }
    if (y_diff > 0.0 && -x_diff < y_diff) || (y_diff < 0.0 && x_diff < -y_diff) {
        return (PosRel::UpUpRight, y_diff > 0.0);
    }
    (PosRel::UpRightRight, x_diff < 0.0)
}

/// Where the inserted corner(s) sit relative to the segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillType {
    Top,
    Bottom,
    MidVert,
    MidInc,
}

fn coord_fill_unordered(
    a: Position,
    b: Position,
    x_diff: f64,
    y_diff: f64,
    pos_rel: PosRel,
    fill: FillType,
) -> Vec<Position> {
    match pos_rel {
        PosRel::LeftLeftUp => {
            let bias = -x_diff + y_diff;
            match fill {
                FillType::Top => vec![Position::new(a.x + bias, a.y)],
                FillType::Bottom => vec![Position::new(b.x - bias, b.y)],
                FillType::MidInc => {
                    let bias = bias / 2.0;
                    vec![
                        Position::new(a.x + bias, a.y),
                        Position::new(b.x - bias, b.y),
                    ]
                }
                FillType::MidVert => {
                    let bias = -y_diff / 2.0;
                    vec![
                        Position::new(a.x + bias, a.y + bias),
                        Position::new(b.x - bias, b.y - bias),
                    ]
                }
            }
        }
        PosRel::LeftUpUp => {
            let bias = x_diff - y_diff;
            match fill {
                FillType::Top => vec![Position::new(b.x, b.y - bias)],
                FillType::Bottom => vec![Position::new(a.x, a.y + bias)],
                FillType::MidInc => {
                    let bias = bias / 2.0;
                    vec![
                        Position::new(a.x, a.y + bias),
                        Position::new(b.x, b.y - bias),
                    ]
                }
                FillType::MidVert => {
                    let bias = -x_diff / 2.0;
                    vec![
                        Position::new(a.x + bias, a.y + bias),
                        Position::new(b.x - bias, b.y - bias),
                    ]
                }
            }
        }
        PosRel::UpUpRight => {
            let bias = -x_diff - y_diff;
            match fill {
                FillType::Top => vec![Position::new(b.x, b.y - bias)],
                FillType::Bottom => vec![Position::new(a.x, a.y + bias)],
                FillType::MidInc => {
                    let bias = bias / 2.0;
                    vec![
                        Position::new(a.x, a.y + bias),
                        Position::new(b.x, b.y - bias),
                    ]
                }
                FillType::MidVert => {
                    let bias = -x_diff / 2.0;
                    vec![
                        Position::new(a.x + bias, a.y - bias),
                        Position::new(b.x - bias, b.y + bias),
                    ]
                }
            }
        }
        PosRel::UpRightRight => {
            let bias = x_diff + y_diff;
            match fill {
                FillType::Top => vec![Position::new(a.x - bias, a.y)],
                FillType::Bottom => vec![Position::new(b.x + bias, b.y)],
                FillType::MidInc => {
                    let bias = bias / 2.0;
                    vec![
                        Position::new(a.x - bias, a.y),
                        Position::new(b.x + bias, b.y),
                    ]
                }
                FillType::MidVert => {
                    let bias = y_diff / 2.0;
                    vec![
                        Position::new(a.x + bias, a.y - bias),
                        Position::new(b.x - bias, b.y + bias),
                    ]
                }
            }
        }
        // straight or exactly diagonal offsets need no corners
        _ => Vec::new(),
    }
}

fn coord_fill(
    a: Position,
    b: Position,
    x_diff: f64,
    y_diff: f64,
    pos_rel: PosRel,
    reversed: bool,
    fill: FillType,
) -> Vec<Position> {
    let mut result = coord_fill_unordered(a, b, x_diff, y_diff, pos_rel, fill);
    if reversed {
        result.reverse();
    }
    result
}

/// A segment with its synthesized intermediate positions and ill-posed level:
/// 0 = admissible as-is, 1 = corners inserted, 2 = no admissible fill exists.
#[derive(Debug, Clone)]
struct FormalSegment {
    a: Position,
    itp: Vec<Position>,
    b: Position,
    ill: u8,
}

fn formalize_segment(point_a: &Point, point_b: &Point) -> FormalSegment {
    let mut x_diff = point_a.pos.x - point_b.pos.x;
    let mut y_diff = point_a.pos.y - point_b.pos.y;

    let (pr, rv) = coord_rel_diff(x_diff, y_diff);
    if pr == PosRel::Same {
        return FormalSegment {
            a: point_a.pos,
            itp: Vec::new(),
            b: point_b.pos,
            ill: 0,
        };
    }

    let (p_a, p_b) = if rv {
        x_diff = -x_diff;
        y_diff = -y_diff;
        (point_b, point_a)
    } else {
        (point_a, point_b)
    };

    let itp;
    let mut ill = 0u8;

    if p_a.dir == p_b.dir {
        let fill = if p_a.dir == PointDir::Diagonal {
            FillType::MidVert
        } else {
            FillType::MidInc
        };
        itp = coord_fill(p_a.pos, p_b.pos, x_diff, y_diff, pr, rv, fill);
        if itp.is_empty() {
            let ortho_blocked = p_a.dir == PointDir::Orthogonal
                && (pr == PosRel::LeftUp || pr == PosRel::UpRight);
            let diag_blocked =
                p_a.dir == PointDir::Diagonal && (pr == PosRel::Left || pr == PosRel::Up);
            if ortho_blocked || diag_blocked {
                ill = 2;
            }
        } else {
            ill = 1;
        }
    } else if p_a.dir == PointDir::Diagonal {
        let fill = if pr == PosRel::LeftUpUp || pr == PosRel::UpUpRight {
            FillType::Top
        } else {
            FillType::Bottom
        };
        itp = coord_fill(p_a.pos, p_b.pos, x_diff, y_diff, pr, rv, fill);
    } else {
        let fill = if pr == PosRel::LeftUpUp || pr == PosRel::UpUpRight {
            FillType::Bottom
        } else {
            FillType::Top
        };
        itp = coord_fill(p_a.pos, p_b.pos, x_diff, y_diff, pr, rv, fill);
    }

    FormalSegment {
        a: point_a.pos,
        itp,
        b: point_b.pos,
        ill,
    }
}

/// Single-intermediate rewrite of an end segment. `this_ref` is the inner
/// reference of the segment itself when it has one; `tip` is the endpoint
/// with no neighbor on its outer side.
fn correct_end(
    neib_ref: Position,
    share: Position,
    this_ref: Option<Position>,
    tip: Position,
) -> Option<Position> {
    let neib_ray = Ray::between(neib_ref, share);
    match this_ref {
        None => {
            if neib_ray.distance_to_point(tip) < EPSILON {
                // tip already sits on the neighbor's extension
                return None;
            }
            let mut this_ray = neib_ray.rotated_90();
            this_ray.source = tip;
            neib_ray.intersect(&this_ray, true)
        }
        Some(this_ref) => {
            let mut this_ray = Ray::between(this_ref, share);
            this_ray.source = tip;
            if neib_ray.perpendicular_to(&this_ray) {
                neib_ray.intersect(&this_ray, true)
            } else {
                None
            }
        }
    }
}

/// Rewrites ill-posed segments using neighbor rays: a middle segment between
/// two strictly better neighbors takes their perpendicular intersection; an
/// end segment drops a perpendicular from its tip onto the neighbor's ray.
fn justify_ill_segments(segs: &mut [FormalSegment]) {
    if segs.len() <= 1 {
        return;
    }

    let ill_idxs: Vec<usize> = segs
        .iter()
        .enumerate()
        .filter(|(_, s)| s.ill > 0)
        .map(|(i, _)| i)
        .collect();

    for i in ill_idxs {
        if i > 0 && i < segs.len() - 1 {
            let prev_seg = &segs[i - 1];
            let next_seg = &segs[i + 1];
            let prev_helps = prev_seg.ill < segs[i].ill;
            let next_helps = next_seg.ill < segs[i].ill;
            if prev_helps && next_helps {
                let prev_ref = prev_seg.itp.last().copied().unwrap_or(prev_seg.a);
                let next_ref = next_seg.itp.first().copied().unwrap_or(next_seg.b);
                let prev_ray = Ray::between(prev_ref, prev_seg.b);
                let next_ray = Ray::between(next_ref, next_seg.a);
                if let Some(itsc) = prev_ray.intersect(&next_ray, true) {
                    segs[i].itp = vec![itsc];
                }
            }
        } else if i == segs.len() - 1 {
            let prev_seg = &segs[i - 1];
            let this_seg = &segs[i];
            let can_help = prev_seg.ill <= this_seg.ill && prev_seg.ill < 2;
            if can_help && this_seg.ill > 0 {
                let neib_ref = prev_seg.itp.last().copied().unwrap_or(prev_seg.a);
                let this_ref = if this_seg.itp.len() > 1 {
                    Some(this_seg.itp[0])
                } else {
                    None
                };
                if let Some(itsc) = correct_end(neib_ref, this_seg.a, this_ref, this_seg.b) {
                    segs[i].itp = vec![itsc];
                }
            }
        } else {
            let next_seg = &segs[i + 1];
            let this_seg = &segs[i];
            let can_help = next_seg.ill <= this_seg.ill && next_seg.ill < 2;
            if can_help && this_seg.ill > 0 {
                let neib_ref = next_seg.itp.first().copied().unwrap_or(next_seg.b);
                let this_ref = if this_seg.itp.len() > 1 {
                    Some(this_seg.itp[1])
                } else {
                    None
                };
                if let Some(itsc) = correct_end(neib_ref, this_seg.b, this_ref, this_seg.a) {
                    segs[i].itp = vec![itsc];
                }
            }
        }
    }
}

fn formalize_line(map: &TransitMap, point_ids: &[i64], is_ring: bool) -> Vec<FormalSegment> {
    let mut formal_segs = Vec::new();

    // loops get margin segments so the wrap-around join sees neighbor context
    if is_ring && point_ids.len() >= 3 {
        let a_id = point_ids[point_ids.len() - 2];
        let b_id = point_ids[0];
        if let (Some(a), Some(b)) = (map.points.get(&a_id), map.points.get(&b_id)) {
            formal_segs.push(formalize_segment(a, b));
        }
    }

    for pair in point_ids.windows(2) {
        let (Some(a), Some(b)) = (map.points.get(&pair[0]), map.points.get(&pair[1])) else {
            continue;
        };
        formal_segs.push(formalize_segment(a, b));
    }

    if is_ring && point_ids.len() >= 3 {
        let c_id = point_ids[point_ids.len() - 1];
        let d_id = point_ids[1];
        if let (Some(c), Some(d)) = (map.points.get(&c_id), map.points.get(&d_id)) {
            formal_segs.push(formalize_segment(c, d));
        }
    }

    formal_segs
}

/// Rewrites every line's `point_ids`, splicing in fresh Node points for each
/// synthesized corner. Fresh ids are allocated past the current maximum.
pub fn add_auxiliary_points(map: &mut TransitMap) {
    let mut next_id = map.max_point_id() + 1;
    let line_ids: Vec<LineId> = map.lines.keys().copied().collect();

    for line_id in line_ids {
        let (point_ids, is_ring) = match map.lines.get(&line_id) {
            Some(line) => (line.point_ids.clone(), line.is_loop),
            None => continue,
        };
        if point_ids.len() < 2 {
            continue;
        }

        let mut formal_segs = formalize_line(map, &point_ids, is_ring);
        justify_ill_segments(&mut formal_segs);
        if formal_segs.is_empty() {
            continue;
        }

        if is_ring && formal_segs.len() > 2 {
            formal_segs.remove(0);
            formal_segs.pop();
        }

        let mut new_point_ids = vec![point_ids[0]];
        let mut inserted = 0usize;
        for (i, seg) in formal_segs.iter().enumerate() {
            for pos in &seg.itp {
                map.points.insert(
                    next_id,
                    Point {
                        id: next_id,
                        pos: *pos,
                        dir: PointDir::Orthogonal,
                        kind: PointKind::Node,
                        size: 1.0,
                        name: String::new(),
                    },
                );
                new_point_ids.push(next_id);
                next_id += 1;
                inserted += 1;
            }
            if i + 1 < point_ids.len() {
                new_point_ids.push(point_ids[i + 1]);
            }
        }
        if !is_ring && new_point_ids.last() != point_ids.last() {
            if let Some(last) = point_ids.last() {
                new_point_ids.push(*last);
            }
        }

        if inserted > 0 {
            debug!(
                "line {}: inserted {} auxiliary point(s)",
                line_id, inserted
            );
        }
        if let Some(line) = map.lines.get_mut(&line_id) {
            line.point_ids = new_point_ids;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Line;

    fn point(id: i64, x: f64, y: f64, dir: PointDir) -> Point {
        Point {
            id,
            pos: Position::new(x, y),
            dir,
            kind: PointKind::Station,
            size: 1.0,
            name: String::new(),
        }
    }

    fn map_with(points: Vec<Point>, point_ids: Vec<i64>) -> TransitMap {
        let mut map = TransitMap::default();
        for p in points {
            map.points.insert(p.id, p);
        }
        let is_loop = point_ids.len() >= 2 && point_ids.first() == point_ids.last();
        map.lines.insert(
            1,
            Line {
                id: 1,
                name: String::new(),
                point_ids,
                is_loop,
                is_simple: false,
                parent_id: None,
            },
        );
        map
    }

    #[test]
    fn relation_classification() {
        assert_eq!(coord_rel_diff(0.0, 0.0), (PosRel::Same, false));
        assert_eq!(coord_rel_diff(-10.0, 0.0), (PosRel::Left, false));
        assert_eq!(coord_rel_diff(10.0, 0.0), (PosRel::Left, true));
        assert_eq!(coord_rel_diff(0.0, -4.0), (PosRel::Up, false));
        assert_eq!(coord_rel_diff(-7.0, -7.0), (PosRel::LeftUp, false));
        assert_eq!(coord_rel_diff(-7.0, 7.0), (PosRel::UpRight, true));
        assert_eq!(coord_rel_diff(-30.0, -10.0), (PosRel::LeftLeftUp, false));
        assert_eq!(coord_rel_diff(-10.0, -30.0), (PosRel::LeftUpUp, false));
        assert_eq!(coord_rel_diff(10.0, -30.0), (PosRel::UpUpRight, false));
        assert_eq!(coord_rel_diff(30.0, -10.0), (PosRel::UpRightRight, true));
    }

    #[test]
    fn shallow_orthogonal_pair_splits_into_two_corners() {
        let a = point(1, 0.0, 0.0, PointDir::Orthogonal);
        let b = point(2, 30.0, 10.0, PointDir::Orthogonal);
        let seg = formalize_segment(&a, &b);
        assert_eq!(seg.ill, 1);
        assert_eq!(seg.itp, vec![Position::new(10.0, 0.0), Position::new(20.0, 10.0)]);
    }

    #[test]
    fn shallow_diagonal_pair_splits_along_the_bisector() {
        let a = point(1, 0.0, 0.0, PointDir::Diagonal);
        let b = point(2, 30.0, 10.0, PointDir::Diagonal);
        let seg = formalize_segment(&a, &b);
        assert_eq!(seg.ill, 1);
        assert_eq!(seg.itp, vec![Position::new(5.0, 5.0), Position::new(25.0, 5.0)]);
    }

    #[test]
    fn mixed_pair_gets_a_single_corner() {
        let a = point(1, 0.0, 0.0, PointDir::Diagonal);
        let b = point(2, 30.0, 10.0, PointDir::Orthogonal);
        let seg = formalize_segment(&a, &b);
        assert_eq!(seg.ill, 0);
        assert_eq!(seg.itp.len(), 1);
        // the 45-degree leg leaves the diagonal endpoint
        let corner = seg.itp[0];
        let leg = corner - a.pos;
        assert!(is_zero(leg.x.abs() - leg.y.abs()));
    }

    #[test]
    fn diagonal_offset_between_orthogonal_points_is_ill_posed() {
        let a = point(1, 0.0, 0.0, PointDir::Orthogonal);
        let b = point(2, 10.0, 10.0, PointDir::Orthogonal);
        let seg = formalize_segment(&a, &b);
        assert_eq!(seg.ill, 2);
        assert!(seg.itp.is_empty());
    }

    #[test]
    fn straight_offset_between_diagonal_points_is_ill_posed() {
        let a = point(1, 0.0, 0.0, PointDir::Diagonal);
        let b = point(2, 10.0, 0.0, PointDir::Diagonal);
        let seg = formalize_segment(&a, &b);
        assert_eq!(seg.ill, 2);
    }

    #[test]
    fn reversed_offsets_mirror_the_fill_order() {
        let a = point(1, 30.0, 10.0, PointDir::Orthogonal);
        let b = point(2, 0.0, 0.0, PointDir::Orthogonal);
        let seg = formalize_segment(&a, &b);
        // same corners as the forward segment, listed from a's side
        assert_eq!(seg.itp, vec![Position::new(20.0, 10.0), Position::new(10.0, 0.0)]);
    }

    #[test]
    fn middle_segment_is_justified_by_perpendicular_neighbors() {
        let mut map = map_with(
            vec![
                point(1, 0.0, -20.0, PointDir::Orthogonal),
                point(2, 0.0, 0.0, PointDir::Orthogonal),
                point(3, 10.0, 10.0, PointDir::Orthogonal),
                point(4, 30.0, 10.0, PointDir::Orthogonal),
            ],
            vec![1, 2, 3, 4],
        );
        add_auxiliary_points(&mut map);
        let line = &map.lines[&1];
        assert_eq!(line.point_ids.len(), 5);
        let aux = &map.points[&line.point_ids[2]];
        assert_eq!(aux.kind, PointKind::Node);
        assert_eq!(aux.pos, Position::new(0.0, 10.0));
    }

    #[test]
    fn first_segment_drops_a_perpendicular_onto_the_neighbor_ray() {
        let mut map = map_with(
            vec![
                point(1, 10.0, 10.0, PointDir::Orthogonal),
                point(2, 0.0, 0.0, PointDir::Orthogonal),
                point(3, 0.0, -20.0, PointDir::Orthogonal),
            ],
            vec![1, 2, 3],
        );
        add_auxiliary_points(&mut map);
        let line = &map.lines[&1];
        assert_eq!(line.point_ids.len(), 4);
        let aux = &map.points[&line.point_ids[1]];
        assert_eq!(aux.pos, Position::new(0.0, 10.0));
    }

    #[test]
    fn straight_line_is_left_untouched() {
        let mut map = map_with(
            vec![
                point(1, 0.0, 0.0, PointDir::Orthogonal),
                point(2, 10.0, 0.0, PointDir::Orthogonal),
                point(3, 20.0, 0.0, PointDir::Orthogonal),
            ],
            vec![1, 2, 3],
        );
        add_auxiliary_points(&mut map);
        assert_eq!(map.lines[&1].point_ids, vec![1, 2, 3]);
        assert_eq!(map.points.len(), 3);
    }

    #[test]
    fn loop_endpoints_survive_the_margin_pass() {
        let mut map = map_with(
            vec![
                point(1, 0.0, 0.0, PointDir::Orthogonal),
                point(2, 100.0, 0.0, PointDir::Orthogonal),
                point(3, 100.0, 100.0, PointDir::Orthogonal),
                point(4, 0.0, 100.0, PointDir::Orthogonal),
            ],
            vec![1, 2, 3, 4, 1],
        );
        add_auxiliary_points(&mut map);
        let line = &map.lines[&1];
        assert_eq!(line.point_ids.first(), line.point_ids.last());
        assert_eq!(line.point_ids, vec![1, 2, 3, 4, 1]);
    }

    #[test]
    fn fresh_ids_continue_past_the_maximum() {
        let mut map = map_with(
            vec![
                point(7, 0.0, 0.0, PointDir::Orthogonal),
                point(40, 30.0, 10.0, PointDir::Orthogonal),
            ],
            vec![7, 40],
        );
        add_auxiliary_points(&mut map);
        let line = &map.lines[&1];
        assert_eq!(line.point_ids, vec![7, 41, 42, 40]);
        assert!(map.points.contains_key(&41));
        assert!(map.points.contains_key(&42));
    }
}
