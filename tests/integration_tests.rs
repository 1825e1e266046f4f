//! Full-pipeline test: a recorded telemetry response through table
//! building, eclipse detection, nadir finding, and wait estimation.

use headway_rater::eclipse::{SPLIT_GAP_MS, detect_eclipses, find_nadirs};
use headway_rater::query::QueryResponse;
use headway_rater::tables::{DirectionMeta, RouteConfig, StopMeta, produce_stops, produce_vehicles};
use headway_rater::waits::{ArrivalSeries, WaitStats, compute_wait_times, simulate_wait_times};

const FIXTURE: &str = include_str!("fixtures/trynstate_sample.json");

// 2018-11-12 08:00 -08:00, the fixture's window start
const BASE_MS: i64 = 1542038400000;

fn fixture_config() -> RouteConfig {
    RouteConfig {
        directions: vec![
            DirectionMeta {
                id: "12___I_F00".to_string(),
                stops: vec!["5579".to_string()],
            },
            DirectionMeta {
                id: "12___O_F00".to_string(),
                stops: vec![],
            },
        ],
        stops: vec![StopMeta {
            id: "5579".to_string(),
            title: Some("Folsom St & 24th St".to_string()),
        }],
    }
}

#[test]
fn test_full_pipeline() {
    let response: QueryResponse = serde_json::from_str(FIXTURE).expect("fixture parses");
    let data = response.into_routes().expect("fixture has route data");
    assert_eq!(data.len(), 1);

    let config = fixture_config();
    let stops = produce_stops(&data, &config);
    // "5599" has no direction and drops out
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].sid, "5579");
    assert_eq!(stops[0].did, "12___I_F00");
    assert_eq!(stops[0].ord, Some(0));

    let vehicles = produce_vehicles(&data).expect("vtimes parse");
    assert_eq!(vehicles.len(), 12);

    // vehicle 2102 never enters the 750 m zone, 2201 heads the other way;
    // 2101 passes twice with a 40-minute gap between visits
    let eclipses = detect_eclipses(&vehicles, &stops[0]);
    assert_eq!(eclipses.len(), 2);
    for eclipse in &eclipses {
        assert_eq!(eclipse.vid, "2101");
        for pair in eclipse.points.windows(2) {
            assert!(pair[1].time_ms - pair[0].time_ms <= SPLIT_GAP_MS);
        }
    }
    assert_eq!(eclipses[0].points.len(), 5);
    assert_eq!(eclipses[1].points.len(), 3);

    let nadirs = find_nadirs(&eclipses);
    let times: Vec<i64> = nadirs.iter().map(|n| n.time_ms).collect();
    assert_eq!(times, vec![BASE_MS + 2 * 60_000, BASE_MS + 45 * 60_000]);
    for nadir in &nadirs {
        assert!(nadir.distance_m < 100.0);
    }

    // wait grid over the series span: 45 one-minute boundaries
    let series = ArrivalSeries::from_unsorted(times);
    let samples = compute_wait_times(&series, BASE_MS, BASE_MS + 45 * 60_000);
    assert_eq!(samples.len(), 45);
    assert_eq!(samples[0].wait_secs, 120.0);
    assert_eq!(samples[2].wait_secs, 0.0);
    assert_eq!(samples[3].wait_secs, 42.0 * 60.0);
    assert_eq!(samples[44].wait_secs, 60.0);

    let waits: Vec<f64> = samples.iter().map(|s| s.wait_secs).collect();
    let stats = WaitStats::from_waits(&waits).expect("non-empty samples");
    assert_eq!(stats.count, 45);
    assert!(stats.mean > 0.0);
    assert!(stats.p95 <= 42.0 * 60.0);
    assert!(stats.p5 >= 0.0);

    // the simulator over the same series is seed-stable
    let a = simulate_wait_times(&series, 500, 8675309);
    let b = simulate_wait_times(&series, 500, 8675309);
    assert_eq!(a, b);
    assert_eq!(a.len(), 500);
}
