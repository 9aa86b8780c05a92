use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ── Row ───────────────────────────────────────────────────────────────────────

/// One table row. Identity for de-duplication is the exact tuple of trimmed cells.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Row(Vec<String>);

impl Row {
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(cells.into_iter().map(|c| c.as_ref().trim().to_string()).collect())
    }

    pub fn cells(&self) -> &[String] {
        &self.0
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Rows rendered from empty `<tr>` placeholders carry no data.
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|c| c.is_empty())
    }

    /// Pad with empty cells or truncate so the row matches a schema width.
    pub fn fit_to(mut self, width: usize) -> Self {
        self.0.resize(width, String::new());
        self
    }
}

// ── Known rows ────────────────────────────────────────────────────────────────

/// Set of row tuples already harvested, passed into and returned from a harvest.
#[derive(Debug, Clone, Default)]
pub struct KnownRows(HashSet<Row>);

impl KnownRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, row: &Row) -> bool {
        self.0.contains(row)
    }

    /// Returns false if the row was already known.
    pub fn insert(&mut self, row: Row) -> bool {
        self.0.insert(row)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<Row> for KnownRows {
    fn from_iter<T: IntoIterator<Item = Row>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// Previously persisted table: one schema, many rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Snapshot {
    pub fn new(headers: Vec<String>, rows: Vec<Row>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn column<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        let idx = self.column_index(name);
        self.rows
            .iter()
            .filter_map(move |r| idx.and_then(|i| r.get(i)))
    }

    pub fn known_rows(&self) -> KnownRows {
        self.rows.iter().cloned().collect()
    }
}

// ── Page ──────────────────────────────────────────────────────────────────────

/// Rows visible on one page of a paginated table plus whether a next page exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResult {
    pub rows: Vec<Row>,
    pub has_next: bool,
}

// ── Live trading cache ────────────────────────────────────────────────────────

/// `{"timestamp": "...", "data": [["Symbol", "LTP"], ["ADBL", "310.00"], ...]}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveTradingCache {
    pub timestamp: String,
    pub data: Vec<Vec<String>>,
}

impl LiveTradingCache {
    pub const HEADER: [&'static str; 2] = ["Symbol", "LTP"];

    pub fn from_quotes(timestamp: String, quotes: Vec<Quote>) -> Self {
        let mut data = Vec::with_capacity(quotes.len() + 1);
        data.push(Self::HEADER.iter().map(|s| s.to_string()).collect());
        data.extend(quotes.into_iter().map(|q| vec![q.symbol, q.ltp]));
        Self { timestamp, data }
    }

    /// Data rows, header skipped.
    pub fn quotes(&self) -> impl Iterator<Item = Quote> + '_ {
        self.data.iter().skip(1).filter_map(|row| {
            Some(Quote {
                symbol: row.first()?.clone(),
                ltp: row.get(1).cloned().unwrap_or_default(),
            })
        })
    }

    pub fn symbols(&self) -> Vec<String> {
        self.quotes().map(|q| q.symbol).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub ltp: String,
}

// ── Fundamentals ──────────────────────────────────────────────────────────────

pub const PLACEHOLDER: &str = "N/A";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FundamentalRecord {
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "EPS")]
    pub eps: String,
    #[serde(rename = "Book Value")]
    pub book_value: String,
}

impl FundamentalRecord {
    pub fn unknown(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            eps: PLACEHOLDER.to_string(),
            book_value: PLACEHOLDER.to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.eps == PLACEHOLDER && self.book_value == PLACEHOLDER
    }
}

/// Result of fetching one auxiliary record.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentOutcome {
    Fetched(FundamentalRecord),
    Failed { symbol: String, reason: String },
}

impl EnrichmentOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Fetched(r) => &r.symbol,
            Self::Failed { symbol, .. } => symbol,
        }
    }

    /// Failures persist as placeholder values.
    pub fn into_record(self) -> FundamentalRecord {
        match self {
            Self::Fetched(r) => r,
            Self::Failed { symbol, .. } => FundamentalRecord::unknown(symbol),
        }
    }
}
