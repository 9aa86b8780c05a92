use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid selector {0:?}")]
    Selector(String),
    #[error("no table found on page")]
    NoTable,
    #[error("could not find {0} column")]
    MissingColumn(&'static str),
}

fn selector(s: &str) -> Result<Selector, ParseError> {
    Selector::parse(s).map_err(|_| ParseError::Selector(s.to_string()))
}

fn cell_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

// ── Generic table ─────────────────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// First `<table>` on the page: `thead th` headers and `tbody tr` cell text.
/// Rows whose cells are all empty are dropped.
pub fn parse_table(html: &str) -> Result<RawTable, ParseError> {
    let doc = Html::parse_document(html);

    let table_sel = selector("table")?;
    let th_sel = selector("thead th")?;
    let tr_sel = selector("tbody tr")?;
    let td_sel = selector("td")?;

    let table = doc.select(&table_sel).next().ok_or(ParseError::NoTable)?;

    let headers: Vec<String> = table.select(&th_sel).map(cell_text).collect();

    let rows: Vec<Vec<String>> = table
        .select(&tr_sel)
        .map(|tr| tr.select(&td_sel).map(cell_text).collect::<Vec<_>>())
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .collect();

    debug!("Parsed table: {} headers, {} rows", headers.len(), rows.len());
    Ok(RawTable { headers, rows })
}

/// Whether the page offers an enabled "next page" control.
pub fn has_next_page(html: &str) -> bool {
    let doc = Html::parse_document(html);
    let candidates = [
        "[aria-label='Go to next page']",
        "a[rel='next']",
        "link[rel='next']",
        "a",
        "button",
    ];

    for sel_str in candidates {
        let Ok(sel) = Selector::parse(sel_str) else { continue };
        for el in doc.select(&sel) {
            let text = cell_text(el);
            let is_next = match sel_str {
                "a" | "button" => matches!(text.as_str(), "Next" | "›" | ">" | "»"),
                _ => true,
            };
            if !is_next {
                continue;
            }
            let attrs = el.value();
            let disabled = attrs.attr("disabled").is_some()
                || attrs.attr("aria-disabled") == Some("true")
                || attrs.classes().any(|c| c == "disabled");
            let parent_disabled = el
                .parent()
                .and_then(ElementRef::wrap)
                .map(|p| p.value().classes().any(|c| c == "disabled"))
                .unwrap_or(false);
            if !disabled && !parent_disabled {
                return true;
            }
        }
    }
    false
}

// ── Live trading ──────────────────────────────────────────────────────────────

/// `(symbol, ltp)` pairs from the live trading table.
///
/// The first row holds the headers; `Symbol` and `LTP` are matched
/// case-insensitively. Data rows too short for either column are skipped.
pub fn parse_live_trading(html: &str) -> Result<Vec<(String, String)>, ParseError> {
    let doc = Html::parse_document(html);
    let tr_sel = selector("table tr")?;
    let cell_sel = selector("th, td")?;

    let mut rows = doc.select(&tr_sel);
    let header: Vec<String> = rows
        .next()
        .ok_or(ParseError::NoTable)?
        .select(&cell_sel)
        .map(|c| cell_text(c).to_lowercase())
        .collect();

    let symbol_idx = header
        .iter()
        .position(|h| h == "symbol")
        .ok_or(ParseError::MissingColumn("Symbol"))?;
    let ltp_idx = header
        .iter()
        .position(|h| h == "ltp")
        .ok_or(ParseError::MissingColumn("LTP"))?;

    let mut out = Vec::new();
    for tr in rows {
        let cells: Vec<String> = tr.select(&cell_sel).map(cell_text).collect();
        if cells.len() <= symbol_idx.max(ltp_idx) {
            continue;
        }
        out.push((cells[symbol_idx].clone(), cells[ltp_idx].clone()));
    }
    Ok(out)
}

// ── Company detail ────────────────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq)]
pub struct CompanyDetail {
    pub eps: Option<String>,
    pub book_value: Option<String>,
}

/// Value in the cell right after the first cell whose text contains `label`.
fn labelled_value(doc: &Html, label: &str) -> Result<Option<String>, ParseError> {
    let tr_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;

    for tr in doc.select(&tr_sel) {
        let cells: Vec<ElementRef<'_>> = tr.select(&cell_sel).collect();
        let Some(pos) = cells.iter().position(|c| cell_text(*c).contains(label)) else {
            continue;
        };
        return Ok(cells.get(pos + 1).map(|c| cell_text(*c)));
    }
    Ok(None)
}

pub fn parse_company_detail(html: &str, symbol: &str) -> Result<CompanyDetail, ParseError> {
    let doc = Html::parse_document(html);
    let detail = CompanyDetail {
        eps: labelled_value(&doc, "EPS")?,
        book_value: labelled_value(&doc, "Book Value")?,
    };
    if detail == CompanyDetail::default() {
        warn!("{}: neither EPS nor Book Value found", symbol);
    }
    Ok(detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIVIDENDS: &str = r#"
        <html><body>
        <table>
          <thead><tr><th>Symbol</th><th>Bonus(%)</th><th>Cash(%)</th><th>Fiscal Year</th></tr></thead>
          <tbody>
            <tr><td> NABIL </td><td>10%</td><td>None</td><td>2080/81</td></tr>
            <tr><td></td><td></td><td></td><td></td></tr>
            <tr><td>ADBL</td><td>0</td><td>5</td><td>2080/81</td></tr>
          </tbody>
        </table>
        <nav><button aria-label="Go to next page">›</button></nav>
        </body></html>"#;

    #[test]
    fn test_parse_table() {
        let t = parse_table(DIVIDENDS).unwrap();
        assert_eq!(t.headers, vec!["Symbol", "Bonus(%)", "Cash(%)", "Fiscal Year"]);
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[0][0], "NABIL");
    }

    #[test]
    fn test_parse_table_missing() {
        assert!(matches!(parse_table("<p>nothing</p>"), Err(ParseError::NoTable)));
    }

    #[test]
    fn test_has_next_page() {
        assert!(has_next_page(DIVIDENDS));
        assert!(!has_next_page(
            r#"<button aria-label="Go to next page" disabled>›</button>"#
        ));
        assert!(has_next_page(r#"<ul><li><a href="?page=2">Next</a></li></ul>"#));
        assert!(!has_next_page(
            r##"<ul><li class="disabled"><a href="#">Next</a></li></ul>"##
        ));
        assert!(!has_next_page("<p>Previous</p>"));
    }

    #[test]
    fn test_parse_live_trading() {
        let html = r#"<table>
            <tr><th>S.No</th><th>Symbol</th><th>LTP</th><th>Volume</th></tr>
            <tr><td>1</td><td>ACLBSL</td><td>1,011.00</td><td>200</td></tr>
            <tr><td>2</td></tr>
            <tr><td>3</td><td>ADBL</td><td>310.00</td><td>50</td></tr>
        </table>"#;
        let rows = parse_live_trading(html).unwrap();
        assert_eq!(
            rows,
            vec![
                ("ACLBSL".to_string(), "1,011.00".to_string()),
                ("ADBL".to_string(), "310.00".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_live_trading_missing_column() {
        let html = "<table><tr><th>Symbol</th><th>Close</th></tr></table>";
        assert!(matches!(
            parse_live_trading(html),
            Err(ParseError::MissingColumn("LTP"))
        ));
    }

    #[test]
    fn test_parse_company_detail() {
        let html = r#"<table>
            <tr><th>Sector</th><td>Commercial Banks</td></tr>
            <tr><th>EPS</th><td>25.61 (FY:081-082, Q:1)</td></tr>
            <tr><th>Book Value</th><td>210.45</td></tr>
        </table>"#;
        let d = parse_company_detail(html, "ADBL").unwrap();
        assert_eq!(d.eps.as_deref(), Some("25.61 (FY:081-082, Q:1)"));
        assert_eq!(d.book_value.as_deref(), Some("210.45"));
    }
}
