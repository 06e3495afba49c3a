//! Serde types for the AARC input descriptor and the converter config
//! descriptor. Unknown keys are ignored everywhere; fields the drawing tools
//! emit inconsistently (numbers as strings, ids or names) get coercion
//! helpers here so the builder stays free of JSON details.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Default, Deserialize)]
pub struct AarcDescriptor {
    #[serde(rename = "cvsSize")]
    pub cvs_size: Option<[f64; 2]>,
    #[serde(default)]
    pub points: Vec<AarcPoint>,
    #[serde(default)]
    pub lines: Vec<AarcLine>,
    pub config: Option<AarcEmbeddedConfig>,
    #[serde(rename = "pointLinks", default)]
    pub point_links: Vec<AarcPointLink>,
}

#[derive(Debug, Deserialize)]
pub struct AarcPoint {
    pub id: i64,
    pub name: Option<String>,
    pub pos: [f64; 2],
    pub dir: i64,
    pub sta: i64,
}

#[derive(Debug, Deserialize)]
pub struct AarcLine {
    pub id: i64,
    pub name: Option<String>,
    #[serde(default)]
    pub pts: Vec<i64>,
    #[serde(rename = "type", default)]
    pub line_type: i64,
    #[serde(rename = "isFake", default)]
    pub is_fake: bool,
    pub parent: Option<i64>,
    pub width: Option<NumberLike>,
    #[serde(rename = "ptSize")]
    pub pt_size: Option<NumberLike>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AarcEmbeddedConfig {
    #[serde(rename = "lineWidthMapped", default)]
    pub line_width_mapped: BTreeMap<String, WidthMapping>,
}

#[derive(Debug, Deserialize)]
pub struct WidthMapping {
    #[serde(rename = "staSize")]
    pub sta_size: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct AarcPointLink {
    #[serde(default)]
    pub pts: Vec<i64>,
    #[serde(rename = "type", default)]
    pub link_type: i64,
}

/// A numeric field that some editors serialize as a string. Anything else
/// (booleans, nulls) is tolerated and coerces to nothing.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberLike {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl NumberLike {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NumberLike::Number(n) => Some(*n),
            NumberLike::Text(s) => s.trim().parse().ok(),
            NumberLike::Other(_) => None,
        }
    }
}

/// A line reference in the config descriptor: numeric id or line name.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LineRef {
    Id(i64),
    Name(String),
}

/// One entry of `segmented_lines`. A bare ref or an array of refs puts the
/// lines into an optimizer group; the object form may pin an explicit
/// segment length instead.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SegmentedEntry {
    One(LineRef),
    Many(Vec<LineRef>),
    Detailed {
        line: Option<LineRef>,
        lines: Option<Vec<LineRef>>,
        segment_length: Option<i64>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigDescriptor {
    pub max_length: Option<i64>,
    pub max_rc_steps: Option<i64>,
    pub max_iterations: Option<i64>,
    pub auto_group_distance: Option<f64>,
    pub merge_consecutive_duplicates: Option<bool>,
    pub optimize_segmentation: Option<bool>,
    pub link_modes: Option<BTreeMap<String, String>>,
    pub friend_lines: Option<Vec<Vec<LineRef>>>,
    pub merged_lines: Option<Vec<Vec<LineRef>>>,
    pub segmented_lines: Option<Vec<SegmentedEntry>>,
}
