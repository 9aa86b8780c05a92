//! Per-symbol summary joining live prices, dividend history and fundamentals.

use crate::models::{FundamentalRecord, LiveTradingCache, Snapshot};
use crate::scraper::cleaner::parse_number;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DividendAverages {
    pub avg_bonus: f64,
    pub avg_cash: f64,
    pub years: usize,
}

/// Mean bonus and cash percentages per symbol. Unparseable values count as 0.
pub fn dividend_averages(dividends: &Snapshot) -> HashMap<String, DividendAverages> {
    let (Some(sym), bonus, cash) = (
        dividends.column_index("Symbol"),
        dividends.column_index("Bonus(%)"),
        dividends.column_index("Cash(%)"),
    ) else {
        return HashMap::new();
    };

    let value = |row: &crate::models::Row, idx: Option<usize>| {
        idx.and_then(|i| row.get(i)).and_then(parse_number).unwrap_or(0.0)
    };

    let mut totals: HashMap<String, (f64, f64, usize)> = HashMap::new();
    for row in &dividends.rows {
        let Some(symbol) = row.get(sym) else { continue };
        let entry = totals.entry(symbol.to_string()).or_default();
        entry.0 += value(row, bonus);
        entry.1 += value(row, cash);
        entry.2 += 1;
    }

    totals
        .into_iter()
        .map(|(symbol, (b, c, n))| {
            let avg = DividendAverages {
                avg_bonus: b / n as f64,
                avg_cash: c / n as f64,
                years: n,
            };
            (symbol, avg)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub symbol: String,
    pub ltp: String,
    pub dividends: Option<DividendAverages>,
    pub pe: Option<f64>,
    pub pb: Option<f64>,
}

fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

/// One row per live trading symbol, in cache order.
pub fn build_report(
    live: &LiveTradingCache,
    dividends: &Snapshot,
    fundamentals: &[FundamentalRecord],
) -> Vec<ReportRow> {
    let averages = dividend_averages(dividends);
    let fundamentals: HashMap<&str, &FundamentalRecord> =
        fundamentals.iter().map(|f| (f.symbol.as_str(), f)).collect();

    live.quotes()
        .map(|q| {
            let price = parse_number(&q.ltp);
            let fund = fundamentals.get(q.symbol.as_str());
            ReportRow {
                pe: ratio(price, fund.and_then(|f| parse_number(&f.eps))),
                pb: ratio(price, fund.and_then(|f| parse_number(&f.book_value))),
                dividends: averages.get(&q.symbol).copied(),
                symbol: q.symbol,
                ltp: q.ltp,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportSort {
    Symbol,
    Ltp,
    Bonus,
    Cash,
    Years,
}

/// Missing values sort lowest.
pub fn sort_report(rows: &mut [ReportRow], key: ReportSort, descending: bool) {
    let num = |r: &ReportRow| -> Option<f64> {
        match key {
            ReportSort::Ltp => parse_number(&r.ltp),
            ReportSort::Bonus => r.dividends.map(|d| d.avg_bonus),
            ReportSort::Cash => r.dividends.map(|d| d.avg_cash),
            ReportSort::Years => r.dividends.map(|d| d.years as f64),
            ReportSort::Symbol => None,
        }
    };

    rows.sort_by(|a, b| {
        let ord = match key {
            ReportSort::Symbol => a.symbol.cmp(&b.symbol),
            _ => match (num(a), num(b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        if descending { ord.reverse() } else { ord }
    });
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{:.2}", x)).unwrap_or_else(|| "-".to_string())
}

impl ReportRow {
    pub const HEADER: [&'static str; 7] = [
        "Symbol",
        "LTP",
        "Avg Bonus (%)",
        "Avg Cash (%)",
        "Years Count",
        "P/E",
        "P/B",
    ];

    pub fn cells(&self) -> [String; 7] {
        [
            self.symbol.clone(),
            self.ltp.clone(),
            fmt_opt(self.dividends.map(|d| d.avg_bonus)),
            fmt_opt(self.dividends.map(|d| d.avg_cash)),
            self.dividends
                .map(|d| d.years.to_string())
                .unwrap_or_else(|| "-".to_string()),
            fmt_opt(self.pe),
            fmt_opt(self.pb),
        ]
    }
}

/// Fixed-width text table.
pub fn render(rows: &[ReportRow]) -> String {
    let body: Vec<[String; 7]> = rows.iter().map(ReportRow::cells).collect();
    let mut widths = ReportRow::HEADER.map(str::len);
    for cells in &body {
        for (w, c) in widths.iter_mut().zip(cells) {
            *w = (*w).max(c.chars().count());
        }
    }

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(widths)
            .map(|(c, w)| format!("{:<w$}", c, w = w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let header = ReportRow::HEADER.map(str::to_string);
    let mut out = line(&header);
    out.push('\n');
    for cells in &body {
        out.push_str(&line(cells));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Row;

    fn dividends() -> Snapshot {
        Snapshot::new(
            vec!["Symbol".into(), "Bonus(%)".into(), "Cash(%)".into(), "Fiscal Year".into()],
            vec![
                Row::new(["ADBL", "10", "5", "2080"]),
                Row::new(["ADBL", "0", "abc", "2079"]),
                Row::new(["NABIL", "2", "20", "2080"]),
            ],
        )
    }

    fn live() -> LiveTradingCache {
        LiveTradingCache {
            timestamp: "2024-05-01T10:00:00".into(),
            data: vec![
                vec!["Symbol".into(), "LTP".into()],
                vec!["NABIL".into(), "1,000.00".into()],
                vec!["ADBL".into(), "300.00".into()],
                vec!["NEW".into(), "100.00".into()],
            ],
        }
    }

    #[test]
    fn test_dividend_averages() {
        let avg = dividend_averages(&dividends());
        let adbl = avg["ADBL"];
        assert_eq!(adbl.years, 2);
        assert!((adbl.avg_bonus - 5.0).abs() < 1e-9);
        assert!((adbl.avg_cash - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_build_report_ratios() {
        let funds = vec![
            FundamentalRecord { symbol: "ADBL".into(), eps: "20".into(), book_value: "150".into() },
            FundamentalRecord { symbol: "NABIL".into(), eps: "0".into(), book_value: "N/A".into() },
        ];
        let rows = build_report(&live(), &dividends(), &funds);
        assert_eq!(rows.len(), 3);

        let adbl = rows.iter().find(|r| r.symbol == "ADBL").unwrap();
        assert_eq!(adbl.pe, Some(15.0));
        assert_eq!(adbl.pb, Some(2.0));

        let nabil = rows.iter().find(|r| r.symbol == "NABIL").unwrap();
        assert_eq!(nabil.pe, None);
        assert_eq!(nabil.pb, None);

        let new = rows.iter().find(|r| r.symbol == "NEW").unwrap();
        assert_eq!(new.dividends, None);
        assert_eq!(new.cells()[2], "-");
    }

    #[test]
    fn test_sort_report_missing_lowest() {
        let mut rows = build_report(&live(), &dividends(), &[]);
        sort_report(&mut rows, ReportSort::Cash, true);
        let order: Vec<_> = rows.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(order, vec!["NABIL", "ADBL", "NEW"]);

        sort_report(&mut rows, ReportSort::Ltp, false);
        let order: Vec<_> = rows.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(order, vec!["NEW", "ADBL", "NABIL"]);
    }

    #[test]
    fn test_render_aligns_columns() {
        let rows = build_report(&live(), &dividends(), &[]);
        let text = render(&rows);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Symbol  LTP"));
        assert!(lines[1].starts_with("NABIL   1,000.00"));
    }
}
