//! Removes redundant routes after enumeration: exact or reversed duplicates
//! (the larger id loses) and routes that ride entirely inside another one
//! (the shorter loses). Passes walk ids in ascending order and repeat until a
//! pass removes nothing, so the surviving set does not depend on where the
//! scan starts.

use crate::rc::RcLine;
use std::collections::BTreeMap;

fn is_subroute(a: &[i64], b: &[i64]) -> bool {
    if a.is_empty() || a.len() >= b.len() {
        return false;
    }
    b.windows(a.len()).any(|w| w == a)
}

pub fn remove_duplicate_routes(lines: &mut BTreeMap<i64, RcLine>) {
    loop {
        let mut removed = false;
        let ids: Vec<i64> = lines.keys().copied().collect();
        'outer: for &a_id in &ids {
            if !lines.contains_key(&a_id) {
                continue;
            }
            for &b_id in &ids {
                if a_id == b_id || !lines.contains_key(&b_id) {
                    continue;
                }
                let (Some(a), Some(b)) = (lines.get(&a_id), lines.get(&b_id)) else {
                    continue;
                };
                let rev_b: Vec<i64> = b.station_ids.iter().rev().copied().collect();
                if a.station_ids.len() == b.station_ids.len() {
                    if a.station_ids == b.station_ids || a.station_ids == rev_b {
                        if a_id > b_id {
                            lines.remove(&a_id);
                            removed = true;
                            continue 'outer;
                        }
                        continue;
                    }
                }
                if is_subroute(&a.station_ids, &b.station_ids)
                    || is_subroute(&a.station_ids, &rev_b)
                {
                    lines.remove(&a_id);
                    removed = true;
                    continue 'outer;
                }
            }
        }
        if !removed {
            break;
        }
    }
}
