//! Stop-pass detection over vehicle position traces.
//!
//! A vehicle "eclipses" a stop while its GPS trace sits inside the stop's
//! proximity zone. The nadir, the point of closest approach within one
//! pass, models the vehicle's arrival event at that stop.

use std::collections::BTreeMap;

use geo::{HaversineDistance, Point};

use crate::tables::{Stop, VehiclePosition};

/// Positions farther than this from the stop are ignored.
pub const PROXIMITY_RADIUS_M: f64 = 750.0;

/// A gap longer than this between retained positions splits one visit from
/// the next: a vehicle that loops the route re-enters the zone as a new
/// eclipse, not a continuation of the old one.
pub const SPLIT_GAP_MS: i64 = 30 * 60 * 1000;

/// Below this distance the forward minimum is accepted as the nadir
/// outright; at or above it the trace is too far out to trust a single
/// point and the backward scan weighs in.
const CLEAR_NADIR_M: f64 = 100.0;

/// One proximity-qualified sample of a vehicle's distance to a stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub time_ms: i64,
    pub distance_m: f64,
}

/// A time-contiguous pass of one vehicle near one stop.
#[derive(Debug, Clone, PartialEq)]
pub struct Eclipse {
    pub vid: String,
    pub points: Vec<TrackPoint>,
}

/// The modeled arrival event: the closest-approach instant of one eclipse.
#[derive(Debug, Clone, PartialEq)]
pub struct Nadir {
    pub vid: String,
    pub time_ms: i64,
    pub distance_m: f64,
}

/// Splits the position trace into disjoint stop passes.
///
/// Only positions heading the stop's direction count. Each retained
/// position carries its Haversine distance to the stop; anything at or
/// beyond [`PROXIMITY_RADIUS_M`] is discarded. Per vehicle, the remaining
/// samples are time-sorted and split wherever the gap to the previous
/// sample exceeds [`SPLIT_GAP_MS`]. A vehicle with a single in-zone sample
/// yields a one-point eclipse; a vehicle with none yields nothing.
pub fn detect_eclipses(positions: &[VehiclePosition], stop: &Stop) -> Vec<Eclipse> {
    let stop_point = Point::new(stop.lon, stop.lat);

    // per-vehicle distance traces, proximity-filtered; BTreeMap keeps the
    // output order independent of input ordering
    let mut traces: BTreeMap<&str, Vec<TrackPoint>> = BTreeMap::new();
    for pos in positions.iter().filter(|p| p.did == stop.did) {
        let distance_m = Point::new(pos.lon, pos.lat).haversine_distance(&stop_point);
        if distance_m < PROXIMITY_RADIUS_M {
            traces.entry(pos.vid.as_str()).or_default().push(TrackPoint {
                time_ms: pos.time_ms,
                distance_m,
            });
        }
    }

    let mut eclipses = Vec::new();
    for (vid, mut points) in traces {
        points.sort_by_key(|p| p.time_ms);

        let mut current: Vec<TrackPoint> = Vec::new();
        for point in points {
            if let Some(prev) = current.last() {
                if point.time_ms - prev.time_ms > SPLIT_GAP_MS {
                    eclipses.push(Eclipse {
                        vid: vid.to_string(),
                        points: std::mem::take(&mut current),
                    });
                }
            }
            current.push(point);
        }
        if !current.is_empty() {
            eclipses.push(Eclipse {
                vid: vid.to_string(),
                points: current,
            });
        }
    }
    eclipses
}

/// Finds the closest-approach event of one eclipse.
///
/// The forward scan takes the earliest occurrence of the minimum distance
/// and under [`CLEAR_NADIR_M`] that alone is the nadir. Farther out, a
/// backward scan locates the latest occurrence of the minimum: if both
/// scans land on the same instant the minimum is unique and wins; if they
/// disagree the trace plateaued at closest approach, and the nadir keeps
/// the earlier timestamp with the two extreme minimum distances averaged.
/// The averaging is a tie-break convention, not an interpolation.
///
/// Returns `None` only for an empty eclipse, which [`detect_eclipses`]
/// never produces.
pub fn find_nadir(eclipse: &Eclipse) -> Option<Nadir> {
    let forward = scan_min(eclipse.points.iter())?;
    if forward.distance_m < CLEAR_NADIR_M {
        return Some(nadir_at(eclipse, forward.time_ms, forward.distance_m));
    }

    let backward = scan_min(eclipse.points.iter().rev())?;
    if forward.time_ms == backward.time_ms {
        Some(nadir_at(eclipse, forward.time_ms, forward.distance_m))
    } else {
        let distance_m = (forward.distance_m + backward.distance_m) / 2.0;
        Some(nadir_at(eclipse, forward.time_ms, distance_m))
    }
}

/// Maps every eclipse to its nadir, in detection order.
pub fn find_nadirs(eclipses: &[Eclipse]) -> Vec<Nadir> {
    eclipses.iter().filter_map(find_nadir).collect()
}

fn nadir_at(eclipse: &Eclipse, time_ms: i64, distance_m: f64) -> Nadir {
    Nadir {
        vid: eclipse.vid.clone(),
        time_ms,
        distance_m,
    }
}

// First occurrence of the strict minimum, in iteration order.
fn scan_min<'a, I: Iterator<Item = &'a TrackPoint>>(points: I) -> Option<TrackPoint> {
    let mut best: Option<TrackPoint> = None;
    for point in points {
        match best {
            Some(b) if point.distance_m >= b.distance_m => {}
            _ => best = Some(*point),
        }
    }
    best
}
