//! Read side: previously persisted snapshots and caches.

use crate::config::StorageConfig;
use crate::models::{FundamentalRecord, LiveTradingCache, Row, Snapshot};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Prefer the sorted dividend file, falling back to the legacy unsorted one.
pub fn resolve_dividend_snapshot(storage: &StorageConfig) -> PathBuf {
    let sorted = storage.dividends_path();
    let legacy = storage.legacy_dividends_path();
    if !sorted.exists() && legacy.exists() {
        info!("Using legacy snapshot {:?}", legacy);
        return legacy;
    }
    sorted
}

/// Read a CSV table with every value kept as trimmed text.
///
/// A missing file is an empty snapshot. Rows are padded or truncated to the
/// header width so row identity is taken over the persisted schema.
pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    if !path.exists() {
        debug!("No snapshot at {:?}", path);
        return Ok(Snapshot::default());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read header of {:?}", path))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let width = headers.len();
    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Row {} in {:?}", i + 1, path))?;
        let row = Row::new(record.iter()).fit_to(width);
        if row.is_blank() {
            continue;
        }
        rows.push(row);
    }

    info!("Loaded {} existing rows from {:?}", rows.len(), path);
    Ok(Snapshot::new(headers, rows))
}

pub fn load_live_trading(path: &Path) -> Result<LiveTradingCache> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("{:?} not found; run `nepse-harvest live-trading` first", path))?;
    let cache: LiveTradingCache = serde_json::from_str(&text)
        .with_context(|| format!("Malformed live trading cache {:?}", path))?;
    let header_ok = cache
        .data
        .first()
        .is_some_and(|h| h.iter().map(String::as_str).eq(LiveTradingCache::HEADER));
    if !header_ok {
        warn!("Unexpected header row in {:?}: {:?}", path, cache.data.first());
    }
    Ok(cache)
}

pub fn load_fundamentals(path: &Path) -> Result<Vec<FundamentalRecord>> {
    if !path.exists() {
        debug!("No fundamentals at {:?}", path);
        return Ok(vec![]);
    }
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))?;
    let mut out = Vec::new();
    for (i, result) in reader.deserialize().enumerate() {
        let record: FundamentalRecord =
            result.with_context(|| format!("Row {} in {:?}", i + 1, path))?;
        out.push(record);
    }
    Ok(out)
}
