use crate::models::{FundamentalRecord, PLACEHOLDER, Quote, Row};

// ── Cell normalisation ────────────────────────────────────────────────────────

pub fn clean_cell(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_none_marker(s: &str) -> bool {
    s.is_empty() || s.eq_ignore_ascii_case("none") || s == "-" || s == "—"
}

/// Percent cells are stored as bare numbers; "None"/"-"/"" become "0".
/// "10.5%" → "10.5" | "None" → "0" | " 5 % " → "5"
pub fn clean_percentage(s: &str) -> String {
    let s = s.trim().trim_end_matches('%').trim();
    if is_none_marker(s) {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Strip the fiscal-year annotation from EPS cells.
/// "25.61 (FY:081-082, Q:1)" → "25.61"
pub fn clean_eps(s: &str) -> String {
    match s.split_once('(') {
        Some((value, _)) => value.trim().to_string(),
        None => s.trim().to_string(),
    }
}

pub fn normalise_symbol(s: &str) -> String {
    s.trim().to_uppercase()
}

/// Parse a display number: strip everything except digits, dot, minus.
/// "1,011.00" → 1011.0 | "N/A" → None
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if is_none_marker(s) || s == PLACEHOLDER {
        return None;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().ok()
}

// ── Row cleaning ──────────────────────────────────────────────────────────────

/// Columns whose header carries a percent sign hold percentage values.
pub fn percentage_columns(headers: &[String]) -> Vec<usize> {
    headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.contains('%'))
        .map(|(i, _)| i)
        .collect()
}

/// Non-percentage cells are only trimmed, the same as rows read back from the
/// snapshot, so a scraped row and its persisted copy share one identity.
pub fn clean_dividend_row(cells: Vec<String>, pct_cols: &[usize]) -> Row {
    Row::new(cells.iter().enumerate().map(|(i, c)| {
        if pct_cols.contains(&i) {
            clean_percentage(c)
        } else {
            c.trim().to_string()
        }
    }))
}

pub fn clean_quote(symbol: &str, ltp: &str) -> Option<Quote> {
    let symbol = normalise_symbol(symbol);
    if symbol.is_empty() {
        return None;
    }
    Some(Quote {
        symbol,
        ltp: clean_cell(ltp),
    })
}

pub fn clean_fundamentals(symbol: &str, eps: Option<String>, book_value: Option<String>) -> FundamentalRecord {
    let or_placeholder = |v: Option<String>| {
        v.filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| PLACEHOLDER.to_string())
    };
    FundamentalRecord {
        symbol: normalise_symbol(symbol),
        eps: or_placeholder(eps.map(|e| clean_eps(&e))),
        book_value: or_placeholder(book_value.map(|b| clean_cell(&b))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
