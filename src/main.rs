//! CLI entry point for the headway rater tool.
//!
//! Provides subcommands for collecting stop-arrival events from raw
//! vehicle telemetry, computing passenger wait-time statistics, running
//! Monte Carlo wait simulations, and listing route stops.

mod infra;
mod services;

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::infra::restbus::client::RestbusClient;
use crate::services::route_meta::RouteMetaApi;
use headway_rater::{
    eclipse::{detect_eclipses, find_nadirs},
    fetch::BasicClient,
    output::{WaitSummaryRecord, append_record, print_json},
    query::{VehicleQuery, fetch_route_states},
    store::{ArrivalEvent, ArrivalStore, StopEntry},
    tables::{Stop, VehiclePosition, produce_stops, produce_vehicles},
    waits::{
        ArrivalSeries, MINUTE_MS, WaitStats, compute_wait_times, experienced_wait, headways,
        scheduled_wait, simulate_wait_times, summarize_by,
    },
};

const DEFAULT_TRYNSTATE_URL: &str =
    "https://06o8rkohub.execute-api.us-west-2.amazonaws.com/dev/graphql";
const DEFAULT_RESTBUS_URL: &str = "http://restbus.info/api";

#[derive(Parser)]
#[command(name = "headway_rater")]
#[command(about = "Detects stop arrivals in bus telemetry and rates passenger wait times", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch vehicle positions and merge detected stop arrivals into a JSON cache
    Collect {
        /// Dates to fetch, YYYY-MM-DD
        #[arg(long, required = true, num_args = 1..)]
        dates: Vec<String>,

        /// Route ids to fetch
        #[arg(long, required = true, num_args = 1..)]
        routes: Vec<String>,

        /// Transit agency identifier
        #[arg(long, default_value = "muni")]
        agency: String,

        /// Start of the daily window, HH:MM
        #[arg(long, default_value = "08:00")]
        from: String,

        /// End of the daily window, HH:MM
        #[arg(long, default_value = "11:00")]
        to: String,

        /// UTC offset of the agency's timezone, in hours
        #[arg(long, default_value_t = -8, allow_hyphen_values = true)]
        utc_offset: i32,

        /// Only process these stop ids (default: every stop on the route)
        #[arg(long, num_args = 0..)]
        stops: Vec<String>,

        /// JSON cache file to merge results into
        #[arg(short, long, default_value = "arrivals.json")]
        output: String,
    },
    /// Compute per-minute wait samples and summary stats from a cache file
    Waits {
        /// JSON cache file produced by `collect`
        #[arg(short, long, default_value = "arrivals.json")]
        input: String,

        /// Only include stops served in this direction
        #[arg(long)]
        direction: Option<String>,

        /// CSV file to append per-stop summary rows to
        #[arg(short, long, default_value = "wait_stats.csv")]
        output: String,
    },
    /// Monte Carlo simulation of passenger waits at one stop
    Simulate {
        /// JSON cache file produced by `collect`
        #[arg(short, long, default_value = "arrivals.json")]
        input: String,

        /// Route id
        #[arg(long)]
        route: String,

        /// Stop id
        #[arg(long)]
        stop: String,

        /// Number of simulated passengers
        #[arg(short = 'n', long, default_value_t = 1_000_000)]
        passengers: usize,

        /// RNG seed; the fixed default keeps runs reproducible
        #[arg(long, default_value_t = 8675309)]
        seed: u64,
    },
    /// List a route's stops with directions and ordinals
    Stops {
        /// Route id
        #[arg(long)]
        route: String,

        /// Transit agency identifier
        #[arg(long, default_value = "sf-muni")]
        agency: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/headway_rater.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("headway_rater.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Collect {
            dates,
            routes,
            agency,
            from,
            to,
            utc_offset,
            stops,
            output,
        } => {
            collect(
                &dates,
                &routes,
                &agency,
                &from,
                &to,
                utc_offset,
                &stops,
                &output,
            )
            .await?;
        }
        Commands::Waits {
            input,
            direction,
            output,
        } => {
            waits(&input, direction.as_deref(), &output)?;
        }
        Commands::Simulate {
            input,
            route,
            stop,
            passengers,
            seed,
        } => {
            simulate(&input, &route, &stop, passengers, seed)?;
        }
        Commands::Stops { route, agency } => {
            list_stops(&route, &agency).await?;
        }
    }

    Ok(())
}

/// Fetches telemetry per (route, date), detects arrivals per stop, folds
/// the per-unit results into one store, and merges it into the cache file.
#[allow(clippy::too_many_arguments)]
async fn collect(
    dates: &[String],
    routes: &[String],
    agency: &str,
    from: &str,
    to: &str,
    utc_offset: i32,
    stop_filter: &[String],
    output: &str,
) -> Result<()> {
    let base_url =
        std::env::var("TRYNSTATE_API_URL").unwrap_or_else(|_| DEFAULT_TRYNSTATE_URL.to_string());
    let meta_base =
        std::env::var("RESTBUS_API_URL").unwrap_or_else(|_| DEFAULT_RESTBUS_URL.to_string());

    // Malformed configuration fails here, before any network round trip
    let offset = FixedOffset::east_opt(utc_offset * 3600)
        .with_context(|| format!("UTC offset {utc_offset} is out of range"))?;
    let from = parse_clock(from)?;
    let to = parse_clock(to)?;
    let windows: Vec<(String, i64, i64)> = dates
        .iter()
        .map(|date| {
            let (start_ms, end_ms) = window_bounds(date, from, to, offset)?;
            Ok((date.clone(), start_ms, end_ms))
        })
        .collect::<Result<_>>()?;

    let http = BasicClient::new();
    let meta_client = RestbusClient::new(meta_base, meta_agency(agency));

    let mut collected = ArrivalStore::new();
    for route in routes {
        let config = match meta_client.route_config(route).await {
            Ok(config) => config,
            Err(e) => {
                warn!(route = %route, error = %e, "Route config fetch failed, skipping route");
                continue;
            }
        };

        for (date, start_ms, end_ms) in &windows {
            let query = VehicleQuery::new(agency, *start_ms, *end_ms, std::slice::from_ref(route));

            let data = match fetch_route_states(&http, &base_url, &query).await {
                Ok(Some(data)) if !data.is_empty() => data,
                Ok(_) => {
                    warn!(route = %route, date = %date, "No telemetry for window, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(route = %route, date = %date, error = %e, "Telemetry fetch failed, skipping");
                    continue;
                }
            };

            let stops = produce_stops(&data, &config);
            let vehicles = match produce_vehicles(&data) {
                Ok(vehicles) => vehicles,
                Err(e) => {
                    warn!(route = %route, date = %date, error = %e, "Malformed telemetry, skipping");
                    continue;
                }
            };

            let unit = collect_unit(route, &stops, &vehicles, stop_filter);
            let arrivals: usize = unit.iter().map(|(_, _, entry)| entry.eclipses.len()).sum();
            info!(
                route = %route,
                date = %date,
                stops = stops.len(),
                positions = vehicles.len(),
                arrivals,
                "Unit processed"
            );
            collected.merge(unit);
        }
    }

    let mut store = if Path::new(output).exists() {
        ArrivalStore::read_file(output)?
    } else {
        ArrivalStore::new()
    };
    store.merge(collected);
    store.write_file(output)?;

    info!(path = output, routes = store.routes().len(), "Cache written");
    Ok(())
}

/// Pure per-unit transform: one route's telemetry into one store. The
/// caller folds these into the run's accumulator.
fn collect_unit(
    route: &str,
    stops: &[Stop],
    vehicles: &[VehiclePosition],
    stop_filter: &[String],
) -> ArrivalStore {
    let mut unit = ArrivalStore::new();
    for stop in stops {
        if !stop_filter.is_empty() && !stop_filter.contains(&stop.sid) {
            continue;
        }

        let eclipses = detect_eclipses(vehicles, stop);
        let nadirs = find_nadirs(&eclipses);
        if nadirs.is_empty() {
            continue;
        }

        let events = nadirs
            .into_iter()
            .map(|nadir| ArrivalEvent {
                bus_id: nadir.vid,
                timestamp: nadir.time_ms,
            })
            .collect();

        unit.insert(
            route,
            &stop.sid,
            StopEntry {
                direction: stop.did.clone(),
                order: stop.ord,
                lat: stop.lat,
                lon: stop.lon,
                eclipses: events,
            },
        );
    }
    unit
}

/// Grid wait samples and summary stats for every cached (route, stop),
/// plus a per-(route, direction) rollup.
fn waits(input: &str, direction: Option<&str>, output: &str) -> Result<()> {
    let store = ArrivalStore::read_file(input)?;

    let mut rollup: Vec<((String, String), f64)> = Vec::new();
    let mut rows = 0usize;

    for (route, stop, entry) in store.iter() {
        if direction.is_some_and(|d| d != entry.direction) {
            continue;
        }

        let series =
            ArrivalSeries::from_unsorted(entry.eclipses.iter().map(|e| e.timestamp).collect());
        let (Some(first), Some(last)) = (series.first(), series.last()) else {
            continue;
        };

        // the cache does not record the fetch window; use the series span,
        // floored to the minute grid
        let start_ms = first - first.rem_euclid(MINUTE_MS);
        let samples = compute_wait_times(&series, start_ms, last);
        let stop_waits: Vec<f64> = samples.iter().map(|s| s.wait_secs).collect();
        let Some(stats) = WaitStats::from_waits(&stop_waits) else {
            continue;
        };

        let gaps = headways(&series);
        info!(
            route,
            stop,
            direction = %entry.direction,
            arrivals = series.len(),
            mean_wait_secs = stats.mean,
            p50_secs = stats.p50,
            scheduled_wait_secs = scheduled_wait(&gaps) / 1000.0,
            experienced_wait_secs = experienced_wait(&gaps) / 1000.0,
            "Stop wait stats"
        );

        append_record(
            output,
            &WaitSummaryRecord::new(route, stop, &entry.direction, &stats),
        )?;
        rows += 1;

        rollup.extend(
            stop_waits
                .into_iter()
                .map(|w| ((route.to_string(), entry.direction.clone()), w)),
        );
    }

    for ((route, direction), stats) in summarize_by(rollup) {
        info!(
            route = %route,
            direction = %direction,
            samples = stats.count,
            mean_wait_secs = stats.mean,
            stddev_secs = stats.stddev,
            p95_secs = stats.p95,
            "Route/direction rollup"
        );
    }

    info!(path = output, rows, "Wait summaries appended");
    Ok(())
}

/// Monte Carlo wait simulation for one cached stop.
fn simulate(input: &str, route: &str, stop: &str, passengers: usize, seed: u64) -> Result<()> {
    let store = ArrivalStore::read_file(input)?;
    let entry = store
        .get(route, stop)
        .with_context(|| format!("no cached arrivals for route {route} stop {stop}"))?;

    let series =
        ArrivalSeries::from_unsorted(entry.eclipses.iter().map(|e| e.timestamp).collect());
    let waits_secs: Vec<f64> = simulate_wait_times(&series, passengers, seed)
        .into_iter()
        .map(|w| w / 1000.0)
        .collect();
    let stats = WaitStats::from_waits(&waits_secs).with_context(|| {
        format!("route {route} stop {stop} has no arrivals to simulate against")
    })?;

    let gaps = headways(&series);
    info!(
        route,
        stop,
        passengers,
        seed,
        arrivals = series.len(),
        scheduled_wait_secs = scheduled_wait(&gaps) / 1000.0,
        experienced_wait_secs = experienced_wait(&gaps) / 1000.0,
        "Simulation complete"
    );
    print_json(&stats)?;

    Ok(())
}

/// Diagnostic listing of a route's stops with directions and ordinals.
async fn list_stops(route: &str, agency: &str) -> Result<()> {
    let meta_base =
        std::env::var("RESTBUS_API_URL").unwrap_or_else(|_| DEFAULT_RESTBUS_URL.to_string());
    let client = RestbusClient::new(meta_base, agency.to_string());
    let config = client.route_config(route).await?;

    info!(
        route,
        directions = config.directions.len(),
        stops = config.stops.len(),
        "Route config fetched"
    );

    let by_direction: HashMap<&str, &str> = config
        .directions
        .iter()
        .flat_map(|d| d.stops.iter().map(move |sid| (sid.as_str(), d.id.as_str())))
        .collect();

    for (ordinal, stop) in config.stops.iter().enumerate() {
        info!(
            ordinal,
            stop_id = %stop.id,
            title = stop.title.as_deref().unwrap_or(""),
            direction = by_direction.get(stop.id.as_str()).copied().unwrap_or(""),
            "Stop"
        );
    }

    Ok(())
}

// The telemetry endpoint and the metadata endpoint disagree on agency
// naming ("muni" vs "sf-muni").
fn meta_agency(agency: &str) -> String {
    match agency {
        "muni" => "sf-muni".to_string(),
        other => other.to_string(),
    }
}

fn parse_clock(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .with_context(|| format!("unparsable time {value:?}, expected HH:MM"))
}

/// Epoch-millisecond bounds of one date's daily window.
fn window_bounds(
    date: &str,
    from: NaiveTime,
    to: NaiveTime,
    offset: FixedOffset,
) -> Result<(i64, i64)> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("unparsable date {date:?}, expected YYYY-MM-DD"))?;

    let at = |time: NaiveTime| -> Result<DateTime<FixedOffset>> {
        day.and_time(time)
            .and_local_timezone(offset)
            .single()
            .with_context(|| format!("ambiguous local time {date} {time}"))
    };

    Ok((at(from)?.timestamp_millis(), at(to)?.timestamp_millis()))
}
