//! Passenger wait-time estimation over arrival series.
//!
//! Two estimators share the [`ArrivalSeries`] input: a seeded Monte Carlo
//! simulation of uniformly arriving passengers, and a deterministic
//! per-minute grid aggregation. Both model the wait as the time until the
//! next vehicle arrival at or after the passenger's instant.

use std::collections::HashMap;
use std::hash::Hash;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

pub const MINUTE_MS: i64 = 60_000;

/// Arrival instants (epoch ms) for one (route, stop, direction), sorted
/// non-decreasing on construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrivalSeries(Vec<i64>);

impl ArrivalSeries {
    pub fn from_unsorted(mut times: Vec<i64>) -> Self {
        times.sort_unstable();
        Self(times)
    }

    pub fn times(&self) -> &[i64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<i64> {
        self.0.first().copied()
    }

    pub fn last(&self) -> Option<i64> {
        self.0.last().copied()
    }
}

/// The modeled wait had a passenger shown up at `at_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WaitSample {
    pub at_ms: i64,
    pub wait_secs: f64,
}

/// Simulates `n_passengers` arriving uniformly at random over
/// `[0, last arrival)` and returns each one's wait in milliseconds.
///
/// The search is right-biased (first arrival strictly past ties), matching
/// a passenger who just misses a departing vehicle. A draw that lands at or
/// beyond every arrival is clipped to the final arrival, so the output
/// length always equals `n_passengers`. An empty series yields no waits.
/// Waits are reproducible per seed: the RNG is deterministic and consumed
/// identically on every path.
pub fn simulate_wait_times(series: &ArrivalSeries, n_passengers: usize, seed: u64) -> Vec<f64> {
    let arrivals = series.times();
    let Some(&horizon) = arrivals.last() else {
        return Vec::new();
    };
    if horizon <= 0 {
        return vec![0.0; n_passengers];
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut waits = Vec::with_capacity(n_passengers);
    for _ in 0..n_passengers {
        let t = rng.random_range(0.0..horizon as f64);
        let next = arrivals.partition_point(|&a| (a as f64) <= t);
        let wait = if next == arrivals.len() {
            0.0
        } else {
            arrivals[next] as f64 - t
        };
        waits.push(wait);
    }
    waits
}

/// Computes the wait at every minute boundary of `[start_ms, end_ms)`.
///
/// A single pointer advances monotonically over the sorted series, so the
/// whole grid is one linear scan. A boundary past the final arrival reuses
/// that arrival with the wait clamped to zero, keeping every sample
/// non-negative and the output length exactly the boundary count. An empty
/// series yields no samples.
pub fn compute_wait_times(series: &ArrivalSeries, start_ms: i64, end_ms: i64) -> Vec<WaitSample> {
    let arrivals = series.times();
    let Some(&final_arrival) = arrivals.last() else {
        return Vec::new();
    };

    let mut samples = Vec::new();
    let mut next = 0usize;
    let mut at_ms = start_ms;
    while at_ms < end_ms {
        while next < arrivals.len() && arrivals[next] < at_ms {
            next += 1;
        }
        let arrival = if next < arrivals.len() {
            arrivals[next]
        } else {
            final_arrival
        };
        samples.push(WaitSample {
            at_ms,
            wait_secs: (arrival - at_ms).max(0) as f64 / 1000.0,
        });
        at_ms += MINUTE_MS;
    }
    samples
}

/// Headways: gaps between consecutive arrivals, in milliseconds.
pub fn headways(series: &ArrivalSeries) -> Vec<i64> {
    series.times().windows(2).map(|w| w[1] - w[0]).collect()
}

/// Average wait under perfectly even service: half the mean headway.
pub fn scheduled_wait(headways_ms: &[i64]) -> f64 {
    if headways_ms.is_empty() {
        return 0.0;
    }
    let values: Vec<f64> = headways_ms.iter().map(|&h| h as f64).collect();
    mean(&values) / 2.0
}

/// Average wait a uniformly arriving passenger actually experiences,
/// length-biased toward long gaps: E[h²] / (2·E[h]). Equals
/// [`scheduled_wait`] only when every headway is identical; bunching
/// drives it up.
pub fn experienced_wait(headways_ms: &[i64]) -> f64 {
    let total: f64 = headways_ms.iter().map(|&h| h as f64).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let sum_squares: f64 = headways_ms.iter().map(|&h| (h as f64) * (h as f64)).sum();
    sum_squares / (2.0 * total)
}

/// Summary statistics over a collection of wait durations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WaitStats {
    pub count: usize,
    pub mean: f64,
    pub stddev: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

impl WaitStats {
    /// `None` for an empty collection.
    pub fn from_waits(waits: &[f64]) -> Option<Self> {
        if waits.is_empty() {
            return None;
        }

        let m = mean(waits);
        let sd = stddev(waits, m);

        let mut sorted = waits.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        Some(WaitStats {
            count: waits.len(),
            mean: m,
            stddev: sd,
            p5: percentile(&sorted, 5.0),
            p25: percentile(&sorted, 25.0),
            p50: percentile(&sorted, 50.0),
            p75: percentile(&sorted, 75.0),
            p95: percentile(&sorted, 95.0),
        })
    }
}

/// Buckets `(key, wait)` pairs and summarizes each bucket.
pub fn summarize_by<K, I>(samples: I) -> HashMap<K, WaitStats>
where
    K: Eq + Hash,
    I: IntoIterator<Item = (K, f64)>,
{
    let mut groups: HashMap<K, Vec<f64>> = HashMap::new();
    for (key, wait) in samples {
        groups.entry(key).or_default().push(wait);
    }

    groups
        .into_iter()
        .filter_map(|(key, waits)| WaitStats::from_waits(&waits).map(|stats| (key, stats)))
        .collect()
}

/// Arithmetic mean. 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation given a pre-computed mean. 0.0 for empty
/// input.
pub fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

    variance.sqrt()
}

/// Percentile with linear interpolation between ordered samples: the value
/// at fractional rank `p/100 · (n − 1)`. Input must be sorted ascending.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = p / 100.0 * (n - 1) as f64;
            let lo = rank.floor() as usize;
            if lo + 1 >= n {
                return sorted[n - 1];
            }
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[lo + 1] - sorted[lo]) * frac
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(values: &[i64]) -> ArrivalSeries {
        ArrivalSeries::from_unsorted(values.iter().map(|m| m * MINUTE_MS).collect())
    }

    #[test]
    fn test_series_sorts_on_construction() {
        let series = ArrivalSeries::from_unsorted(vec![30, 10, 20]);
        assert_eq!(series.times(), &[10, 20, 30]);
    }

    #[test]
    fn test_simulate_is_reproducible() {
        let series = minutes(&[0, 5, 5, 12]);

        let a = simulate_wait_times(&series, 1000, 8675309);
        let b = simulate_wait_times(&series, 1000, 8675309);

        assert_eq!(a, b);
    }

    #[test]
    fn test_simulate_different_seeds_differ() {
        let series = minutes(&[0, 5, 5, 12]);

        let a = simulate_wait_times(&series, 1000, 1);
        let b = simulate_wait_times(&series, 1000, 2);

        assert_ne!(a, b);
    }

    #[test]
    fn test_simulate_waits_are_bounded() {
        let series = minutes(&[0, 5, 5, 12]);
        let max_gap = 7.0 * MINUTE_MS as f64;

        let waits = simulate_wait_times(&series, 10_000, 42);

        assert_eq!(waits.len(), 10_000);
        for wait in waits {
            assert!(wait >= 0.0);
            assert!(wait <= max_gap);
        }
    }

    #[test]
    fn test_simulate_empty_series() {
        let waits = simulate_wait_times(&ArrivalSeries::default(), 100, 1);
        assert!(waits.is_empty());
    }

    #[test]
    fn test_grid_length_equals_boundary_count() {
        let series = minutes(&[0, 5, 5, 12]);
        let samples = compute_wait_times(&series, 0, 15 * MINUTE_MS);

        assert_eq!(samples.len(), 15);
        for sample in &samples {
            assert!(sample.wait_secs >= 0.0);
        }
    }

    #[test]
    fn test_grid_end_to_end_scenario() {
        let series = minutes(&[0, 5, 5, 12]);
        let samples = compute_wait_times(&series, 0, 15 * MINUTE_MS);

        let waits_min: Vec<f64> = samples.iter().map(|s| s.wait_secs / 60.0).collect();
        let expected = [
            0.0, 4.0, 3.0, 2.0, 1.0, 0.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0, 0.0, 0.0, 0.0,
        ];

        assert_eq!(waits_min, expected);
    }

    #[test]
    fn test_grid_pointer_is_monotone() {
        let series = minutes(&[3, 9, 31]);
        let samples = compute_wait_times(&series, 0, 35 * MINUTE_MS);

        // the wait never jumps back to an already-passed arrival
        for pair in samples.windows(2) {
            let next_arrival_a = pair[0].at_ms + (pair[0].wait_secs * 1000.0) as i64;
            let next_arrival_b = pair[1].at_ms + (pair[1].wait_secs * 1000.0) as i64;
            assert!(next_arrival_b >= next_arrival_a);
        }
    }

    #[test]
    fn test_grid_empty_series() {
        let samples = compute_wait_times(&ArrivalSeries::default(), 0, 10 * MINUTE_MS);
        assert!(samples.is_empty());
    }

    #[test]
    fn test_headways() {
        let series = minutes(&[0, 5, 5, 12]);
        assert_eq!(
            headways(&series),
            vec![5 * MINUTE_MS, 0, 7 * MINUTE_MS]
        );
    }

    #[test]
    fn test_even_service_waits_agree() {
        let gaps = vec![6 * MINUTE_MS; 10];

        let scheduled = scheduled_wait(&gaps);
        let experienced = experienced_wait(&gaps);

        assert!((scheduled - 3.0 * MINUTE_MS as f64).abs() < 1e-9);
        assert!((scheduled - experienced).abs() < 1e-9);
    }

    #[test]
    fn test_bunching_raises_experienced_wait() {
        // same total span as ten even 6-minute gaps, but bunched
        let gaps: Vec<i64> = [1, 1, 1, 1, 1, 11, 11, 11, 11, 11]
            .iter()
            .map(|m| m * MINUTE_MS)
            .collect();

        assert!(experienced_wait(&gaps) > scheduled_wait(&gaps));
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let sorted: Vec<f64> = (1..=10).map(|v| v as f64).collect();

        assert_eq!(percentile(&sorted, 50.0), 5.5);
        assert_eq!(percentile(&sorted, 25.0), 3.25);
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 100.0), 10.0);
    }

    #[test]
    fn test_wait_stats_from_waits() {
        let waits: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let stats = WaitStats::from_waits(&waits).unwrap();

        assert_eq!(stats.count, 10);
        assert_eq!(stats.mean, 5.5);
        assert_eq!(stats.p50, 5.5);
        assert!((stats.stddev - 2.8722813232690143).abs() < 1e-12);
    }

    #[test]
    fn test_wait_stats_empty_is_none() {
        assert!(WaitStats::from_waits(&[]).is_none());
    }

    #[test]
    fn test_summarize_by_groups_keys() {
        let samples = vec![
            (("12", "inbound"), 10.0),
            (("12", "inbound"), 20.0),
            (("14", "inbound"), 100.0),
        ];

        let stats = summarize_by(samples);

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[&("12", "inbound")].count, 2);
        assert_eq!(stats[&("12", "inbound")].mean, 15.0);
        assert_eq!(stats[&("14", "inbound")].count, 1);
    }
}
