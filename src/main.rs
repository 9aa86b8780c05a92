mod config;
mod harvester;
mod loader;
mod models;
mod pipeline;
mod report;
mod scraper;
mod storage;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::loader::{load_fundamentals, load_live_trading, load_snapshot, resolve_dividend_snapshot};
use crate::pipeline::{DividendPipeline, FundamentalsPipeline, LiveTradingPipeline};
use crate::report::ReportSort;

#[derive(Parser)]
#[command(name = "nepse-harvest", about = "NEPSE dividend, price and fundamentals scraper", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest new proposed dividends and merge them into the sorted CSV
    Dividends,

    /// Refresh the Symbol/LTP cache from the live trading table
    LiveTrading,

    /// Fetch EPS and book value for every cached symbol
    Fundamentals,

    /// Re-sort the dividend CSV by Symbol and Fiscal Year
    SortDividends,

    /// Print per-symbol dividend averages and price ratios
    Report {
        #[arg(short, long, value_enum, default_value_t = SortArg::Symbol)]
        sort: SortArg,

        /// Sort descending
        #[arg(short, long)]
        desc: bool,
    },

    /// Show file statistics
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Symbol,
    Ltp,
    Bonus,
    Cash,
    Years,
}

impl From<SortArg> for ReportSort {
    fn from(s: SortArg) -> Self {
        match s {
            SortArg::Symbol => ReportSort::Symbol,
            SortArg::Ltp => ReportSort::Ltp,
            SortArg::Bonus => ReportSort::Bonus,
            SortArg::Cash => ReportSort::Cash,
            SortArg::Years => ReportSort::Years,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "nepse_harvest=info,warn",
        1 => "nepse_harvest=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Dividends => {
            let _t = utils::Timer::start("Dividend harvest");
            let stats = DividendPipeline::new(config).run().await?;
            info!(
                "Done: {} pages, {} new rows, {} total rows ({})",
                stats.pages, stats.new_rows, stats.total_rows, stats.stop.label()
            );
            if !stats.written {
                info!("Snapshot left unchanged");
            }
        }

        Command::LiveTrading => {
            let _t = utils::Timer::start("Live trading refresh");
            let n = LiveTradingPipeline::new(config).run().await?;
            info!("Done: {} records", n);
        }

        Command::Fundamentals => {
            let _t = utils::Timer::start("Fundamentals");
            let stats = FundamentalsPipeline::new(config).run().await?;
            info!(
                "Done: {} symbols, {} fetched, {} errors",
                stats.symbols, stats.fetched, stats.failed
            );
        }

        Command::SortDividends => {
            let n = pipeline::sort_dividends(&config)?;
            info!("Sorted {} rows into {:?}", n, config.storage.dividends_path());
        }

        Command::Report { sort, desc } => {
            let live = load_live_trading(&config.storage.live_trading_path())?;
            let dividends = load_snapshot(&resolve_dividend_snapshot(&config.storage))?;
            let fundamentals = load_fundamentals(&config.storage.fundamentals_path())?;

            let mut rows = report::build_report(&live, &dividends, &fundamentals);
            report::sort_report(&mut rows, sort.into(), desc);
            println!("Prices as of {}", live.timestamp);
            print!("{}", report::render(&rows));
        }

        Command::Stats => {
            let dividends = load_snapshot(&resolve_dividend_snapshot(&config.storage))?;
            let symbols: BTreeSet<&str> = dividends.column("Symbol").collect();
            let years: BTreeSet<&str> = dividends.column("Fiscal Year").collect();
            let live = load_live_trading(&config.storage.live_trading_path()).ok();
            let fundamentals = load_fundamentals(&config.storage.fundamentals_path())?;
            let unknown = fundamentals.iter().filter(|f| f.is_unknown()).count();

            println!("─────────────────────────────────");
            println!("  NEPSE Harvest — File Stats");
            println!("─────────────────────────────────");
            println!("  Dividend rows : {}", utils::fmt_count(dividends.len()));
            println!("  Symbols       : {}", utils::fmt_count(symbols.len()));
            println!("  Fiscal years  : {} → {}",
                years.first().copied().unwrap_or("—"),
                years.last().copied().unwrap_or("—"),
            );
            match &live {
                Some(cache) => {
                    println!("  Live quotes   : {}", utils::fmt_count(cache.quotes().count()));
                    println!("  Quoted at     : {}", cache.timestamp);
                }
                None => println!("  Live quotes   : — (run `nepse-harvest live-trading`)"),
            }
            println!("  Fundamentals  : {} ({} unknown)",
                utils::fmt_count(fundamentals.len()), unknown);
            println!("─────────────────────────────────");
        }
    }

    Ok(())
}
