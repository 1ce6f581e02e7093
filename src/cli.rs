//! CLI commands for ebus-scraper.
//!
//! Scraping (route list, stop sweep, live lookup) and offline views over
//! the stored data (listings, arrival pairing, static route finder, maps).

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::driver::Sweeper;
use crate::finder::{pair_arrivals, write_timetable, StaticRouteFinder};
use crate::plot::RouteMap;
use crate::scraper::Browser;
use crate::storage::{BusRepository, Schema};
use crate::types::{Direction, RouteStatus, Stop};

#[derive(Parser)]
#[command(name = "ebus-scraper")]
#[command(version, about = "Taipei eBus route and stop scraper", long_about = None)]
pub struct Cli {
    /// SQLite database path override
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scrape the route list and store it
    Routes {
        /// Save the rendered HTML for inspection
        #[arg(long)]
        dump_html: bool,
    },

    /// Refresh the stops of pending (or the given) routes
    Sweep {
        /// Route ids to sweep instead of the pending ones
        #[arg(short, long = "route", value_name = "ROUTE_ID")]
        routes: Vec<String>,

        /// Directions to fetch (go, come)
        #[arg(short, long, value_delimiter = ',')]
        directions: Vec<Direction>,

        /// Reset every route to pending first
        #[arg(long)]
        reset: bool,

        /// Don't re-scrape the route list first
        #[arg(long)]
        skip_list: bool,

        /// Append arrival samples to the realtime table
        #[arg(long)]
        snapshots: bool,

        /// Save the rendered HTML for inspection
        #[arg(long)]
        dump_html: bool,
    },

    /// Print stored routes and their refresh status
    List {
        /// Only routes with this status (pending, updated, failed)
        #[arg(short, long)]
        status: Option<RouteStatus>,
    },

    /// Print row counts and refresh progress
    Stats,

    /// Export stored stops as a timetable CSV usable by `find`
    Export {
        #[arg(short, long, default_value = "data/timetable.csv")]
        output: PathBuf,
    },

    /// Print stored stops of a route
    Stops {
        #[arg(value_name = "ROUTE_ID")]
        route_id: String,

        #[arg(short, long, default_value = "go")]
        direction: Direction,
    },

    /// Fetch live arrivals of a route by its name
    Lookup {
        /// Route name, e.g. 承德幹線 (prompted if omitted)
        #[arg(short, long)]
        name: Option<String>,

        /// Direction (prompted if omitted)
        #[arg(short, long)]
        direction: Option<Direction>,

        /// Only print these stops
        #[arg(short, long = "stop", value_name = "STOP_NAME")]
        stops: Vec<String>,
    },

    /// Pair recorded arrivals at two stops per route
    Arrivals {
        /// Origin stop name (prompted if omitted)
        #[arg(long)]
        from: Option<String>,

        /// Destination stop name (prompted if omitted)
        #[arg(long)]
        to: Option<String>,
    },

    /// Find routes between two stops in a static timetable CSV
    Find {
        /// CSV with route_name, direction_text, stop_number, stop_name
        #[arg(long, value_name = "FILE")]
        csv: PathBuf,

        /// Origin stop name (prompted if omitted)
        #[arg(long)]
        from: Option<String>,

        /// Destination stop name (prompted if omitted)
        #[arg(long)]
        to: Option<String>,

        /// Also fetch live arrivals at both stops
        #[arg(long)]
        live: bool,
    },

    /// Export a route map as SVG
    Plot {
        #[arg(value_name = "ROUTE_ID")]
        route_id: String,

        #[arg(short, long, default_value = "go")]
        direction: Direction,

        /// Stop number to mark with the person marker
        #[arg(short, long)]
        person_stop: Option<u32>,

        /// Output file (default: data/route_<id>_<direction>.svg)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fetch the stops live instead of reading the store
        #[arg(long)]
        live: bool,
    },
}

/// Load configuration with the global CLI overrides applied.
pub fn load_config(db: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load()?;
    if let Some(path) = db {
        config.store.path = path.to_string_lossy().to_string();
    }
    Ok(config)
}

fn open_repository(config: &AppConfig) -> anyhow::Result<BusRepository> {
    let path = Path::new(&config.store.path);
    BusRepository::open(path, &Schema::ebus())
        .with_context(|| format!("Failed to open database {}", path.display()))
}

async fn launch_sweeper(config: &AppConfig) -> anyhow::Result<Sweeper<Browser>> {
    let repo = open_repository(config)?;
    info!("Launching browser");
    let browser = Browser::launch(&config.renderer).await?;
    Ok(Sweeper::new(browser, repo, config))
}

fn prompt_if_missing(value: Option<String>, message: &str) -> anyhow::Result<String> {
    match value {
        Some(v) => Ok(v.trim().to_string()),
        None => Ok(inquire::Text::new(message).prompt()?.trim().to_string()),
    }
}

/// Scrape and store the route list.
pub async fn run_routes(mut config: AppConfig, dump_html: bool) -> anyhow::Result<()> {
    config.diagnostics.dump_html |= dump_html;

    let sweeper = launch_sweeper(&config).await?;
    let result = sweeper.refresh_route_list().await;
    let total = sweeper.repository().route_count();
    sweeper.into_renderer().close().await;

    let count = result?;
    println!("Stored {} routes ({} in database)", count, total?);
    Ok(())
}

/// Sweep routes: fetch, parse, persist and mark each one.
pub async fn run_sweep(
    mut config: AppConfig,
    routes: Vec<String>,
    directions: Vec<Direction>,
    reset: bool,
    skip_list: bool,
    snapshots: bool,
    dump_html: bool,
) -> anyhow::Result<()> {
    config.diagnostics.dump_html |= dump_html;
    config.sweep.record_snapshots |= snapshots;
    if !routes.is_empty() {
        config.sweep.routes = routes;
    }
    if !directions.is_empty() {
        config.sweep.directions = directions;
    }

    let sweeper = launch_sweeper(&config).await?;
    let result = sweep_with(&sweeper, &config, reset, skip_list).await;
    sweeper.into_renderer().close().await;

    let report = result?;
    println!();
    println!("=== Sweep Summary ===");
    println!("  Updated: {}", report.updated.len());
    println!("  Failed:  {}", report.failed.len());
    for (route_id, reason) in &report.failed {
        println!("    {}: {}", route_id, reason);
    }
    Ok(())
}

async fn sweep_with(
    sweeper: &Sweeper<Browser>,
    config: &AppConfig,
    reset: bool,
    skip_list: bool,
) -> anyhow::Result<crate::driver::SweepReport> {
    if !skip_list {
        // Keep going with the stored list if the page can't be parsed
        if let Err(e) = sweeper.refresh_route_list().await {
            warn!("Route list refresh failed ({}): {}", e.kind(), e);
        }
    }

    if reset {
        let count = sweeper.repository().reset_statuses()?;
        info!("Reset {} routes to pending", count);
    }

    let route_ids = if config.sweep.routes.is_empty() {
        sweeper.pending_routes()?
    } else {
        config.sweep.routes.clone()
    };
    info!(
        "Sweeping {} routes ({})",
        route_ids.len(),
        config
            .sweep
            .directions
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(sweeper.sweep(&route_ids, &config.sweep.directions).await?)
}

/// Print stored routes.
pub fn run_list(config: AppConfig, status: Option<RouteStatus>) -> anyhow::Result<()> {
    let repo = open_repository(&config)?;
    let routes = match status {
        Some(s) => repo.routes_with_status(s)?,
        None => repo.routes()?,
    };

    println!("Routes in database: {}", routes.len());
    for route in &routes {
        println!("  {:<12} {:<8} {}", route.route_id, route.status, route.route_name);
    }
    Ok(())
}

/// Print table counts and route status breakdown.
pub fn run_stats(config: AppConfig) -> anyhow::Result<()> {
    let repo = open_repository(&config)?;

    println!("=== Database: {} ===", config.store.path);
    println!("  Routes:    {}", repo.route_count()?);
    println!("  Stops:     {}", repo.stop_count()?);
    println!("  Snapshots: {}", repo.snapshot_count()?);
    for status in [RouteStatus::Pending, RouteStatus::Updated, RouteStatus::Failed] {
        println!("  {:<9}  {}", status, repo.routes_with_status(status)?.len());
    }
    Ok(())
}

/// Export every stored stop as timetable rows.
pub fn run_export(config: AppConfig, output: PathBuf) -> anyhow::Result<()> {
    let repo = open_repository(&config)?;
    let routes = repo.routes()?;
    let stops = repo.all_stops()?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = std::fs::File::create(&output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let written = write_timetable(&routes, &stops, file)?;

    println!("Exported {} stops to {}", written, output.display());
    Ok(())
}

/// Print stored stops of a route.
pub fn run_stops(config: AppConfig, route_id: String, direction: Direction) -> anyhow::Result<()> {
    let repo = open_repository(&config)?;
    let status = repo
        .route_status(&route_id)?
        .ok_or_else(|| anyhow!("Route {} is not in the database", route_id))?;
    let stops = repo.stops(&route_id, direction)?;
    if stops.is_empty() {
        println!("No stops stored for {} ({}, {})", route_id, direction, status);
        return Ok(());
    }

    println!("Route {} ({}, {})", route_id, direction.label(), status);
    for stop in &stops {
        println!(
            "  Stop #{:>3}: {} (Lat: {}, Lon: {}) {}",
            stop.stop_number, stop.stop_name, stop.latitude, stop.longitude, stop.arrival_info
        );
    }
    Ok(())
}

/// Look up a route by name and print its live arrivals.
pub async fn run_lookup(
    config: AppConfig,
    name: Option<String>,
    direction: Option<Direction>,
    stop_names: Vec<String>,
) -> anyhow::Result<()> {
    let name = prompt_if_missing(name, "Route name:")?;
    let direction = match direction {
        Some(d) => d,
        None => inquire::Text::new("Direction (go / come):")
            .prompt()?
            .parse::<Direction>()
            .map_err(|e| anyhow!(e))?,
    };

    let route = open_repository(&config)?
        .route_by_name(&name)?
        .ok_or_else(|| anyhow!("No route named '{}'. Run `routes` first?", name))?;

    let sweeper = launch_sweeper(&config).await?;
    let result = sweeper.fetch_stops(&route.route_id, direction).await;
    sweeper.into_renderer().close().await;

    let stops = result?;
    println!("{} ({}, {})", route.route_name, route.route_id, direction.label());
    print_arrivals(&stops, &stop_names);
    Ok(())
}

fn print_arrivals(stops: &[Stop], only: &[String]) {
    let shown: Vec<_> = stops
        .iter()
        .filter(|s| only.is_empty() || only.contains(&s.stop_name))
        .collect();
    if shown.is_empty() {
        println!("  No arrival information found");
        return;
    }
    for stop in shown {
        println!("  {:>3}  {:<16} {}", stop.stop_number, stop.stop_name, stop.arrival_info);
    }
}

/// Pair recorded arrivals for two stops.
pub fn run_arrivals(config: AppConfig, from: Option<String>, to: Option<String>) -> anyhow::Result<()> {
    let from = prompt_if_missing(from, "Origin stop:")?;
    let to = prompt_if_missing(to, "Destination stop:")?;

    let repo = open_repository(&config)?;
    let snapshots = repo.snapshots_for_stop_names(&[from.as_str(), to.as_str()])?;
    let pairs = pair_arrivals(&snapshots, &from, &to);

    if pairs.is_empty() {
        println!("No routes recorded at '{}' or '{}'", from, to);
        return Ok(());
    }

    for pair in &pairs {
        println!("Route {}", pair.route_id);
        println!(
            "  {}: {}",
            from,
            pair.origin_arrival.as_deref().unwrap_or("未知")
        );
        println!(
            "  {}: {}",
            to,
            pair.destination_arrival.as_deref().unwrap_or("未知")
        );
    }
    Ok(())
}

/// Find routes between two stops in a static timetable.
pub async fn run_find(
    config: AppConfig,
    csv: PathBuf,
    from: Option<String>,
    to: Option<String>,
    live: bool,
) -> anyhow::Result<()> {
    let finder = StaticRouteFinder::from_path(&csv)?;
    let from = prompt_if_missing(from, "Origin stop:")?;
    let to = prompt_if_missing(to, "Destination stop:")?;

    let matches = finder.find_routes(&from, &to);
    if matches.is_empty() {
        println!("No route found. Check the stop names; the destination must come after the origin.");
        return Ok(());
    }

    for m in &matches {
        println!();
        println!("Route {} ({})", m.route_name, m.direction_text);
        println!("  {}", m.stops.join(" → "));
    }

    if !live {
        return Ok(());
    }

    let sweeper = launch_sweeper(&config).await?;
    let result = live_arrivals(&sweeper, &matches, &from, &to).await;
    sweeper.into_renderer().close().await;
    result
}

async fn live_arrivals(
    sweeper: &Sweeper<Browser>,
    matches: &[crate::finder::RouteMatch],
    from: &str,
    to: &str,
) -> anyhow::Result<()> {
    let only = [from.to_string(), to.to_string()];
    for m in matches {
        println!();
        println!("Live: {} ({})", m.route_name, m.direction_text);

        let Some(route) = sweeper.repository().route_by_name(&m.route_name)? else {
            println!("  No route id known for '{}'", m.route_name);
            continue;
        };
        let direction = match m.direction_text.parse::<Direction>() {
            Ok(d) => d,
            Err(e) => {
                println!("  {}", e);
                continue;
            }
        };

        match sweeper.fetch_stops(&route.route_id, direction).await {
            Ok(stops) => print_arrivals(&stops, &only),
            Err(e) => println!("  Lookup failed ({}): {}", e.kind(), e),
        }
    }
    Ok(())
}

/// Export a route map.
pub async fn run_plot(
    config: AppConfig,
    route_id: String,
    direction: Direction,
    person_stop: Option<u32>,
    output: Option<PathBuf>,
    live: bool,
) -> anyhow::Result<()> {
    let stops = if live {
        let sweeper = launch_sweeper(&config).await?;
        let result = sweeper.fetch_stops(&route_id, direction).await;
        sweeper.into_renderer().close().await;
        result?
    } else {
        open_repository(&config)?.stops(&route_id, direction)?
    };

    let output = output
        .unwrap_or_else(|| PathBuf::from(format!("data/route_{}_{}.svg", route_id, direction)));
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    RouteMap::new(&stops, format!("Route Map: {} ({})", route_id, direction))
        .person_at(person_stop)
        .icons(config.plot.bus_icon.clone(), config.plot.person_icon.clone())
        .save(&output)?;

    println!("Route map saved: {}", output.display());
    Ok(())
}
