//! Taipei eBus scraper
//!
//! Scrapes route and stop data from ebus.gov.taipei into SQLite and
//! provides lookup and map views over it.

mod cli;
mod config;
mod driver;
mod finder;
mod plot;
mod scraper;
mod storage;
mod types;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so listings on stdout stay clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ebus_scraper=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.db)?;
    tracing::debug!("Database: {}", config.store.path);

    match cli.command {
        Commands::Routes { dump_html } => cli::run_routes(config, dump_html).await,
        Commands::Sweep {
            routes,
            directions,
            reset,
            skip_list,
            snapshots,
            dump_html,
        } => {
            cli::run_sweep(
                config, routes, directions, reset, skip_list, snapshots, dump_html,
            )
            .await
        }
        Commands::List { status } => cli::run_list(config, status),
        Commands::Stats => cli::run_stats(config),
        Commands::Export { output } => cli::run_export(config, output),
        Commands::Stops {
            route_id,
            direction,
        } => cli::run_stops(config, route_id, direction),
        Commands::Lookup {
            name,
            direction,
            stops,
        } => cli::run_lookup(config, name, direction, stops).await,
        Commands::Arrivals { from, to } => cli::run_arrivals(config, from, to),
        Commands::Find {
            csv,
            from,
            to,
            live,
        } => cli::run_find(config, csv, from, to, live).await,
        Commands::Plot {
            route_id,
            direction,
            person_stop,
            output,
            live,
        } => cli::run_plot(config, route_id, direction, person_stop, output, live).await,
    }
}
