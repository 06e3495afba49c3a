use crate::geometry::Position;
use ahash::AHashMap;
use ahash::AHashSet;
use std::collections::BTreeMap;

pub type PointId = i64;
pub type LineId = i64;
pub type GroupId = i64;

/// Axes on which segments leaving a point may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointDir {
    Orthogonal,
    Diagonal,
}

impl PointDir {
    pub fn from_code(code: i64) -> PointDir {
        if code == 1 {
            PointDir::Diagonal
        } else {
            PointDir::Orthogonal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    Node,
    Station,
}

impl PointKind {
    pub fn from_code(code: i64) -> PointKind {
        if code == 1 {
            PointKind::Station
        } else {
            PointKind::Node
        }
    }
}

#[derive(Debug, Clone)]
pub struct Point {
    pub id: PointId,
    pub pos: Position,
    pub dir: PointDir,
    pub kind: PointKind,
    pub size: f64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Line {
    pub id: LineId,
    pub name: String,
    pub point_ids: Vec<PointId>,
    pub is_loop: bool,
    pub is_simple: bool,
    pub parent_id: Option<LineId>,
}

/// A set of station points sold to riders as a single station. Groups live in
/// an id-keyed arena; points hold at most a group id, never a back-pointer.
#[derive(Debug, Clone)]
pub struct StationGroup {
    pub id: GroupId,
    pub name: String,
    pub station_ids: Vec<PointId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkType {
    ThickLine,
    ThinLine,
    DottedLine1,
    DottedLine2,
    Group,
}

impl LinkType {
    pub fn from_code(code: i64) -> Option<LinkType> {
        match code {
            0 => Some(LinkType::ThickLine),
            1 => Some(LinkType::ThinLine),
            2 => Some(LinkType::DottedLine1),
            3 => Some(LinkType::DottedLine2),
            4 => Some(LinkType::Group),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<LinkType> {
        match name {
            "ThickLine" => Some(LinkType::ThickLine),
            "ThinLine" => Some(LinkType::ThinLine),
            "DottedLine1" => Some(LinkType::DottedLine1),
            "DottedLine2" => Some(LinkType::DottedLine2),
            "Group" => Some(LinkType::Group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    Connect,
    Group,
    None,
}

impl LinkMode {
    pub fn from_name(name: &str) -> Option<LinkMode> {
        match name {
            "Connect" => Some(LinkMode::Connect),
            "Group" => Some(LinkMode::Group),
            "None" => Some(LinkMode::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MapConfig {
    pub max_length: i64,
    pub max_rc_steps: i64,
    pub max_iterations: u32,
    pub auto_group_distance: f64,
    pub merge_consecutive_duplicates: bool,
    pub optimize_segmentation: bool,
    pub link_modes: AHashMap<LinkType, LinkMode>,
    pub friend_lines: AHashSet<(LineId, LineId)>,
    pub merged_lines: AHashSet<(LineId, LineId)>,
    /// Positive value: per-line station cap. Negative value: optimizer group
    /// key shared by every line tuned together.
    pub segmented_lines: BTreeMap<LineId, i64>,
}

impl Default for MapConfig {
    fn default() -> Self {
        let mut link_modes = AHashMap::new();
        link_modes.insert(LinkType::ThickLine, LinkMode::Connect);
        link_modes.insert(LinkType::ThinLine, LinkMode::Connect);
        link_modes.insert(LinkType::DottedLine1, LinkMode::None);
        link_modes.insert(LinkType::DottedLine2, LinkMode::None);
        link_modes.insert(LinkType::Group, LinkMode::Group);
        Self {
            max_length: 128,
            max_rc_steps: 16,
            max_iterations: 4,
            auto_group_distance: 25.0,
            merge_consecutive_duplicates: true,
            optimize_segmentation: false,
            link_modes,
            friend_lines: AHashSet::new(),
            merged_lines: AHashSet::new(),
            segmented_lines: BTreeMap::new(),
        }
    }
}

/// The normalized transit map. Built once by the builder, then read-only for
/// the enumerator and optimizer.
#[derive(Debug, Clone)]
pub struct TransitMap {
    pub width: f64,
    pub height: f64,
    pub points: BTreeMap<PointId, Point>,
    pub lines: BTreeMap<LineId, Line>,
    pub station_groups: BTreeMap<GroupId, StationGroup>,
    pub point_to_group: AHashMap<PointId, GroupId>,
    pub config: MapConfig,
}

impl Default for TransitMap {
    fn default() -> Self {
        Self {
            width: 1024.0,
            height: 1024.0,
            points: BTreeMap::new(),
            lines: BTreeMap::new(),
            station_groups: BTreeMap::new(),
            point_to_group: AHashMap::new(),
            config: MapConfig::default(),
        }
    }
}

impl TransitMap {
    /// Turn rule for friend lines: moving p1 -> p2 -> p3 is allowed when the
    /// turn at p2 is at most 90 degrees. Missing points forbid the move.
    pub fn can_move_through(&self, p1: PointId, p2: PointId, p3: PointId) -> bool {
        let (Some(a), Some(b), Some(c)) = (
            self.points.get(&p1),
            self.points.get(&p2),
            self.points.get(&p3),
        ) else {
            return false;
        };
        (b.pos - a.pos).dot(c.pos - b.pos) >= 0.0
    }

    /// Centroid of the group's member stations. Dangling member ids are
    /// skipped; an empty or unknown group sits at the origin.
    pub fn group_pos(&self, group_id: GroupId) -> Position {
        let Some(group) = self.station_groups.get(&group_id) else {
            return Position::default();
        };
        let mut sum = Position::default();
        let mut count = 0usize;
        for sid in &group.station_ids {
            if let Some(p) = self.points.get(sid) {
                sum += p.pos;
                count += 1;
            }
        }
        if count == 0 {
            return Position::default();
        }
        sum / count as f64
    }

    pub fn normalized_pos(&self, pos: Position) -> Position {
        Position::new(pos.x / self.width, pos.y / self.height)
    }

    pub fn connect_lines(&mut self, a: LineId, b: LineId, forced: bool) {
        if a == b && !forced {
            return;
        }
        self.config.friend_lines.insert((a, b));
        self.config.friend_lines.insert((b, a));
    }

    pub fn merge_lines(&mut self, a: LineId, b: LineId, forced: bool) {
        if a == b && !forced {
            return;
        }
        self.config.merged_lines.insert((a, b));
        self.config.merged_lines.insert((b, a));
    }

    /// Put two stations into one group, merging their groups when both
    /// already belong to one. The surviving group keeps the first station's
    /// group id.
    pub fn join_stations(&mut self, a: PointId, b: PointId) {
        if a == b {
            return;
        }
        let ga = self.point_to_group.get(&a).copied();
        let gb = self.point_to_group.get(&b).copied();
        match (ga, gb) {
            (Some(ga), Some(gb)) => {
                if ga == gb {
                    return;
                }
                if let Some(absorbed) = self.station_groups.remove(&gb) {
                    for sid in &absorbed.station_ids {
                        self.point_to_group.insert(*sid, ga);
                    }
                    if let Some(keep) = self.station_groups.get_mut(&ga) {
                        keep.station_ids.extend(absorbed.station_ids);
                    }
                }
            }
            (Some(ga), None) => {
                if let Some(group) = self.station_groups.get_mut(&ga) {
                    group.station_ids.push(b);
                    self.point_to_group.insert(b, ga);
                }
            }
            (None, Some(gb)) => {
                if let Some(group) = self.station_groups.get_mut(&gb) {
                    group.station_ids.push(a);
                    self.point_to_group.insert(a, gb);
                }
            }
            (None, None) => {
                let group = StationGroup {
                    id: a,
                    name: format!("Station Group {}", a),
                    station_ids: vec![a, b],
                };
                self.station_groups.insert(a, group);
                self.point_to_group.insert(a, a);
                self.point_to_group.insert(b, a);
            }
        }
    }

    pub fn max_point_id(&self) -> PointId {
        self.points.keys().next_back().copied().unwrap_or(0)
    }

    /// RC station id for a point: its group id when grouped, else its own id.
    pub fn station_id_for(&self, point_id: PointId) -> PointId {
        self.point_to_group.get(&point_id).copied().unwrap_or(point_id)
    }
}
