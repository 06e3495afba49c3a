//! The route-chess output model and its wire encoding. Stations are listed as
//! `[id, x, y]` triples with coordinates normalized to the canvas and scaled
//! to integer ten-thousandths; lines carry their station sequence and loop
//! flag.

use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct RcStation {
    pub id: i64,
    pub norm_x: f64,
    pub norm_y: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcLine {
    pub id: i64,
    pub station_ids: Vec<i64>,
    pub is_loop: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RcMap {
    pub stations: BTreeMap<i64, RcStation>,
    pub lines: BTreeMap<i64, RcLine>,
}

impl RcMap {
    pub fn to_json(&self) -> Value {
        let stations: Vec<Value> = self
            .stations
            .values()
            .map(|s| {
                json!([
                    s.id,
                    (s.norm_x * 10000.0).round() as i64,
                    (s.norm_y * 10000.0).round() as i64
                ])
            })
            .collect();
        let lines: Vec<Value> = self
            .lines
            .values()
            .map(|l| {
                json!({
                    "Id": l.id,
                    "Stas": l.station_ids,
                    "IsNotLoop": !l.is_loop
                })
            })
            .collect();
        json!({ "Stations": stations, "Lines": lines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_rounds_and_orders_by_id() {
        let mut map = RcMap::default();
        map.stations.insert(
            2,
            RcStation {
                id: 2,
                norm_x: 0.5,
                norm_y: 0.25,
            },
        );
        map.stations.insert(
            1,
            RcStation {
                id: 1,
                norm_x: 0.33333,
                norm_y: 1.0,
            },
        );
        map.lines.insert(
            1,
            RcLine {
                id: 1,
                station_ids: vec![1, 2],
                is_loop: true,
            },
        );
        let j = map.to_json();
        assert_eq!(j["Stations"][0], json!([1, 3333, 10000]));
        assert_eq!(j["Stations"][1], json!([2, 5000, 2500]));
        assert_eq!(j["Lines"][0]["Id"], 1);
        assert_eq!(j["Lines"][0]["Stas"], json!([1, 2]));
        assert_eq!(j["Lines"][0]["IsNotLoop"], json!(false));
    }
}
