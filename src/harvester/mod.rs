//! Incremental table harvester.
//!
//! Walks a paginated [`PageSource`] newest-first and collects rows that are not
//! yet in the snapshot. The walk ends on the first of:
//!
//! - a row already known from the snapshot (or an earlier page of this run)
//! - a page identical to the previous one (the "next" control did not move)
//! - a page with no rows
//! - the source reporting no further page
//! - the page ceiling
//! - an error from the source (not retried here)
//!
//! Nothing is written to disk in this module; [`merge`] produces the new
//! snapshot and the pipeline decides whether to persist it.

use crate::models::{KnownRows, Row, Snapshot};
use anyhow::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_PAGES: u32 = 200;

// ── Source trait ──────────────────────────────────────────────────────────────

/// A paginated table. Calls are made strictly in sequence.
#[async_trait]
pub trait PageSource: Send {
    /// Column names of the table, empty if the source has none.
    fn headers(&self) -> Vec<String>;

    /// Rows on the page currently loaded, in page order.
    async fn current_rows(&mut self) -> Result<Vec<Row>>;

    /// Load the next page. `false` once pagination is exhausted.
    async fn advance(&mut self) -> Result<bool>;
}

// ── Per-page check ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCheck {
    Continue,
    StopKnown,
    StopStale,
    StopEmpty,
    StopExhausted,
    StopCeiling,
    SourceFailed(String),
}

impl PageCheck {
    pub fn is_stop(&self) -> bool {
        !matches!(self, Self::Continue)
    }

    /// True if the walk ended before the source ran out of new data.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::SourceFailed(_) | Self::StopCeiling)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::StopKnown => "known row reached",
            Self::StopStale => "pagination stalled",
            Self::StopEmpty => "empty page",
            Self::StopExhausted => "no next page",
            Self::StopCeiling => "page ceiling reached",
            Self::SourceFailed(_) => "source failed",
        }
    }
}

/// Outcome of scanning one page against the known set.
#[derive(Debug, Default, PartialEq)]
pub struct PageScan {
    /// Unknown rows ahead of the first known row, in page order.
    pub fresh: Vec<Row>,
    pub hit_known: bool,
    /// Unknown rows that appeared after the first known row.
    pub unknown_after_known: usize,
}

/// Split a page into fresh rows up to the first known row.
pub fn scan_page(rows: &[Row], known: &KnownRows) -> PageScan {
    let mut scan = PageScan::default();
    let mut seen = HashSet::new();

    for row in rows {
        if scan.hit_known {
            if !known.contains(row) {
                scan.unknown_after_known += 1;
            }
            continue;
        }
        if known.contains(row) {
            scan.hit_known = true;
            continue;
        }
        if seen.insert(row) {
            scan.fresh.push(row.clone());
        }
    }
    scan
}

/// A non-empty page equal to the previous page means "next" did not advance.
pub fn check_stale(page: &[Row], previous: &[Row]) -> PageCheck {
    if !page.is_empty() && page == previous {
        PageCheck::StopStale
    } else {
        PageCheck::Continue
    }
}

pub fn check_known(scan: &PageScan) -> PageCheck {
    if scan.hit_known {
        PageCheck::StopKnown
    } else {
        PageCheck::Continue
    }
}

pub fn check_empty(page: &[Row]) -> PageCheck {
    if page.is_empty() {
        PageCheck::StopEmpty
    } else {
        PageCheck::Continue
    }
}

pub fn check_ceiling(pages_walked: u32, max_pages: u32) -> PageCheck {
    if pages_walked >= max_pages {
        PageCheck::StopCeiling
    } else {
        PageCheck::Continue
    }
}

/// Evaluate the page-level stop conditions in priority order.
pub fn check_page(page: &[Row], previous: &[Row], scan: &PageScan) -> PageCheck {
    [check_stale(page, previous), check_empty(page), check_known(scan)]
        .into_iter()
        .find(PageCheck::is_stop)
        .unwrap_or(PageCheck::Continue)
}

// ── Harvest ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Harvest {
    /// Newly harvested rows in harvest order.
    pub rows: Vec<Row>,
    pub pages: u32,
    pub stop: PageCheck,
    /// Input set extended with every harvested row.
    pub known: KnownRows,
}

pub async fn harvest<S>(source: &mut S, mut known: KnownRows, max_pages: u32) -> Harvest
where
    S: PageSource + ?Sized,
{
    let max_pages = max_pages.max(1);
    let mut rows = Vec::new();
    let mut previous: Vec<Row> = Vec::new();
    let mut pages = 0u32;

    let stop = loop {
        pages += 1;
        info!("Scraping page {}...", pages);

        let page: Vec<Row> = match source.current_rows().await {
            Ok(r) => r.into_iter().filter(|r| !r.is_blank()).collect(),
            Err(e) => break PageCheck::SourceFailed(format!("{:#}", e)),
        };
        debug!("Page {}: {} rows", pages, page.len());

        let scan = scan_page(&page, &known);
        let check = check_page(&page, &previous, &scan);

        if check != PageCheck::StopStale {
            for row in &scan.fresh {
                known.insert(row.clone());
            }
            rows.extend(scan.fresh);
        }

        if check == PageCheck::StopKnown && scan.unknown_after_known > 0 {
            warn!(
                "Page {}: {} unknown rows follow a known row; source may not be newest-first",
                pages, scan.unknown_after_known
            );
        }
        if check.is_stop() {
            break check;
        }

        let ceiling = check_ceiling(pages, max_pages);
        if ceiling.is_stop() {
            warn!("Reached page limit ({}), stopping", max_pages);
            break ceiling;
        }

        match source.advance().await {
            Ok(true) => previous = page,
            Ok(false) => break PageCheck::StopExhausted,
            Err(e) => break PageCheck::SourceFailed(format!("{:#}", e)),
        }
    };

    match &stop {
        PageCheck::SourceFailed(e) => {
            warn!("Harvest stopped on page {}: {}", pages, e)
        }
        other => info!("Harvest stopped on page {}: {}", pages, other.label()),
    }
    info!("Found {} new rows", rows.len());

    Harvest {
        rows,
        pages,
        stop,
        known,
    }
}

// ── Merge & sort ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    pub keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(mut self, column: impl Into<String>) -> Self {
        self.keys.push(SortKey {
            column: column.into(),
            order: SortOrder::Ascending,
        });
        self
    }

    pub fn desc(mut self, column: impl Into<String>) -> Self {
        self.keys.push(SortKey {
            column: column.into(),
            order: SortOrder::Descending,
        });
        self
    }

    /// `Symbol` ascending, then `Fiscal Year` descending.
    pub fn dividends() -> Self {
        Self::new().asc("Symbol").desc("Fiscal Year")
    }

    /// Stable sort in place. Skipped if any key column is missing.
    pub fn apply(&self, snapshot: &mut Snapshot) -> bool {
        let mut resolved = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            match snapshot.column_index(&key.column) {
                Some(idx) => resolved.push((idx, key.order)),
                None => {
                    warn!("Sort column {:?} not in schema; leaving order as is", key.column);
                    return false;
                }
            }
        }

        snapshot.rows.sort_by(|a, b| {
            resolved
                .iter()
                .map(|&(idx, order)| {
                    let ord = a.get(idx).unwrap_or("").cmp(b.get(idx).unwrap_or(""));
                    match order {
                        SortOrder::Ascending => ord,
                        SortOrder::Descending => ord.reverse(),
                    }
                })
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        true
    }
}

/// Pick the schema for the merged table.
///
/// The prior snapshot wins. Otherwise the source headers are used if they match
/// the row width, falling back to positional names.
pub fn resolve_headers(prior: &Snapshot, source_headers: &[String], rows: &[Row]) -> Vec<String> {
    if !prior.headers.is_empty() {
        return prior.headers.clone();
    }
    let width = rows.first().map(Row::len).unwrap_or(source_headers.len());
    if source_headers.len() == width {
        source_headers.to_vec()
    } else {
        if !source_headers.is_empty() {
            warn!(
                "Header count {} does not match row width {}; using positional names",
                source_headers.len(),
                width
            );
        }
        (0..width).map(|i| i.to_string()).collect()
    }
}

/// Harvested rows ahead of prior rows, duplicate tuples dropped, then sorted.
pub fn merge(harvested: Vec<Row>, prior: Snapshot, headers: Vec<String>, sort: &SortSpec) -> Snapshot {
    let width = headers.len();
    let mut seen = KnownRows::new();
    let mut rows = Vec::with_capacity(harvested.len() + prior.rows.len());

    for row in harvested.into_iter().chain(prior.rows) {
        let row = row.fit_to(width);
        if seen.insert(row.clone()) {
            rows.push(row);
        }
    }

    let mut merged = Snapshot::new(headers, rows);
    sort.apply(&mut merged);
    merged
}
