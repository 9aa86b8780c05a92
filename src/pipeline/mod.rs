//! Pipeline orchestrator: ties scraper → harvester → storage together.
//!
//! ## Run modes
//!
//! `DividendPipeline` — incremental mode:
//!   1. Load the prior dividend snapshot and its known-row set
//!   2. Walk the paginated dividend table until a stop condition fires
//!   3. Merge new rows ahead of the snapshot, re-sort, replace the file
//!   Idempotent: re-running with nothing new leaves the file untouched.
//!
//! `LiveTradingPipeline` — full refresh of the Symbol/LTP cache.
//!
//! `FundamentalsPipeline` — one company page per cached symbol, fetched with
//!   bounded concurrency. Per-symbol failures are recorded, never fatal.

use crate::config::AppConfig;
use crate::harvester::{PageCheck, PageSource, SortSpec, harvest, merge, resolve_headers};
use crate::loader::{load_live_trading, load_snapshot, resolve_dividend_snapshot};
use crate::models::{EnrichmentOutcome, FundamentalRecord, LiveTradingCache};
use crate::scraper::{MarketDataSource, NepseScraper};
use crate::storage::{write_fundamentals, write_live_trading, write_snapshot};
use anyhow::{Context, Result, bail};
use chrono::Local;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

// ── Dividends ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct HarvestStats {
    pub pages: u32,
    pub new_rows: usize,
    pub total_rows: usize,
    pub stop: PageCheck,
    pub written: bool,
}

pub struct DividendPipeline {
    config: AppConfig,
}

impl DividendPipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<HarvestStats> {
        let scraper = NepseScraper::new(&self.config.scraper, &self.config.sources)
            .context("Failed to build scraper")?;
        let mut source = scraper.dividend_pages(self.config.harvest.page_size)?;
        self.run_with_source(&mut source).await
    }

    pub async fn run_with_source<S>(&self, source: &mut S) -> Result<HarvestStats>
    where
        S: PageSource + ?Sized,
    {
        let snapshot_path = resolve_dividend_snapshot(&self.config.storage);
        let prior = load_snapshot(&snapshot_path)
            .with_context(|| format!("Error loading existing data from {:?}", snapshot_path))?;
        if prior.is_empty() {
            info!("No existing rows; harvesting until the source is exhausted");
        }
        let known = prior.known_rows();

        let out = harvest(source, known, self.config.harvest.max_pages).await;
        debug!("{} rows known after harvest", out.known.len());

        let mut stats = HarvestStats {
            pages: out.pages,
            new_rows: out.rows.len(),
            total_rows: prior.len(),
            stop: out.stop.clone(),
            written: false,
        };

        if out.rows.is_empty() {
            if let PageCheck::SourceFailed(e) = &out.stop {
                bail!("Dividend source failed before any new rows: {}", e);
            }
            info!("No new data found.");
            return Ok(stats);
        }

        if out.stop.is_partial() && !self.config.harvest.persist_partial {
            warn!(
                "Discarding {} rows from an incomplete harvest ({}); set harvest.persist_partial to keep them",
                out.rows.len(),
                out.stop.label()
            );
            if let PageCheck::SourceFailed(e) = &out.stop {
                bail!("Dividend harvest incomplete: {}", e);
            }
            return Ok(stats);
        }

        let headers = resolve_headers(&prior, &source.headers(), &out.rows);
        info!("Sorting data by Symbol and Fiscal Year...");
        let merged = merge(out.rows, prior, headers, &SortSpec::dividends());

        let target = self.config.storage.dividends_path();
        write_snapshot(&target, &merged)?;

        stats.total_rows = merged.len();
        stats.written = true;
        Ok(stats)
    }
}

/// Re-sort an existing dividend file by Symbol asc, Fiscal Year desc.
pub fn sort_dividends(config: &AppConfig) -> Result<usize> {
    let source = resolve_dividend_snapshot(&config.storage);
    if !source.exists() {
        bail!("{:?} not found", source);
    }
    let mut snapshot = load_snapshot(&source)?;
    if !SortSpec::dividends().apply(&mut snapshot) {
        bail!("{:?} lacks a Symbol or Fiscal Year column", source);
    }
    write_snapshot(&config.storage.dividends_path(), &snapshot)?;
    Ok(snapshot.len())
}

// ── Live trading ──────────────────────────────────────────────────────────────

pub struct LiveTradingPipeline {
    config: AppConfig,
}

impl LiveTradingPipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<usize> {
        let scraper = NepseScraper::new(&self.config.scraper, &self.config.sources)
            .context("Failed to build scraper")?;
        self.run_with_source(&scraper).await
    }

    pub async fn run_with_source(&self, source: &dyn MarketDataSource) -> Result<usize> {
        let quotes = source.fetch_live_trading().await?;
        if quotes.is_empty() {
            bail!("No data extracted.");
        }
        let n = quotes.len();
        let timestamp = Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
        let cache = LiveTradingCache::from_quotes(timestamp, quotes);
        write_live_trading(&self.config.storage.live_trading_path(), &cache)?;
        Ok(n)
    }
}

// ── Fundamentals ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct EnrichmentStats {
    pub symbols: usize,
    pub fetched: usize,
    pub failed: usize,
}

pub struct FundamentalsPipeline {
    config: AppConfig,
}

impl FundamentalsPipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<EnrichmentStats> {
        let scraper = NepseScraper::new(&self.config.scraper, &self.config.sources)
            .context("Failed to build scraper")?;
        self.run_with_source(Arc::new(scraper)).await
    }

    pub async fn run_with_source(&self, source: Arc<dyn MarketDataSource>) -> Result<EnrichmentStats> {
        let cache = load_live_trading(&self.config.storage.live_trading_path())?;
        let symbols = cache.symbols();
        info!("Found {} symbols to scrape.", symbols.len());

        let outcomes = enrich(source, symbols.clone(), self.config.pipeline.concurrency).await;

        let mut failed = 0;
        for outcome in &outcomes {
            if let EnrichmentOutcome::Failed { symbol, reason } = outcome {
                warn!("Error scraping {}: {}", symbol, reason);
                failed += 1;
            }
        }
        let records: Vec<FundamentalRecord> =
            outcomes.into_iter().map(EnrichmentOutcome::into_record).collect();

        write_fundamentals(&self.config.storage.fundamentals_path(), &records)?;

        Ok(EnrichmentStats {
            symbols: symbols.len(),
            fetched: records.len() - failed,
            failed,
        })
    }
}

/// Fetch one record per symbol with at most `concurrency` requests in flight.
/// Outcomes come back sorted by symbol, one per input symbol.
pub async fn enrich(
    source: Arc<dyn MarketDataSource>,
    symbols: Vec<String>,
    concurrency: usize,
) -> Vec<EnrichmentOutcome> {
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(symbols.len());

    for symbol in symbols {
        let source = Arc::clone(&source);
        let sem = Arc::clone(&sem);
        let task_symbol = symbol.clone();

        let handle = tokio::spawn(async move {
            let _permit = sem.acquire_owned().await?;
            source.fetch_fundamentals(&task_symbol).await
        });
        handles.push((symbol, handle));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (symbol, handle) in handles {
        let outcome = match handle.await {
            Ok(Ok(record)) => EnrichmentOutcome::Fetched(record),
            Ok(Err(e)) => EnrichmentOutcome::Failed { symbol, reason: format!("{:#}", e) },
            Err(e) => {
                error!("Task panic for {}: {}", symbol, e);
                EnrichmentOutcome::Failed { symbol, reason: e.to_string() }
            }
        };
        outcomes.push(outcome);
    }

    outcomes.sort_by(|a, b| a.symbol().cmp(b.symbol()));
    outcomes
}
