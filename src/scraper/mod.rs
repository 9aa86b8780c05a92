pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::config::{ScraperConfig, SourceConfig};
use crate::harvester::PageSource;
use crate::models::{FundamentalRecord, PageResult, Quote, Row};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use self::cleaner::{clean_dividend_row, clean_fundamentals, clean_quote, percentage_columns};
use self::http_client::HttpClient;
use self::parsers::{has_next_page, parse_company_detail, parse_live_trading, parse_table};

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable data source abstraction.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_live_trading(&self) -> Result<Vec<Quote>>;
    async fn fetch_fundamentals(&self, symbol: &str) -> Result<FundamentalRecord>;
}

// ── HTTP scraper ──────────────────────────────────────────────────────────────

pub struct NepseScraper {
    client: Arc<HttpClient>,
    sources: SourceConfig,
}

impl NepseScraper {
    pub fn new(config: &ScraperConfig, sources: &SourceConfig) -> Result<Self> {
        Ok(Self {
            client: Arc::new(HttpClient::new(config)?),
            sources: sources.clone(),
        })
    }

    /// URL for a company's detail page. e.g. ADBL → CompanyDetail.aspx?symbol=ADBL
    fn company_url(&self, symbol: &str) -> Result<String> {
        let url = Url::parse_with_params(&self.sources.company_detail_url, &[("symbol", symbol)])
            .with_context(|| format!("Bad company detail URL {:?}", self.sources.company_detail_url))?;
        Ok(url.into())
    }

    /// Paginated page source over the proposed-dividend table.
    pub fn dividend_pages(&self, page_size: u32) -> Result<DividendPageSource> {
        DividendPageSource::new(Arc::clone(&self.client), &self.sources.dividends_url, page_size)
    }
}

#[async_trait]
impl MarketDataSource for NepseScraper {
    async fn fetch_live_trading(&self) -> Result<Vec<Quote>> {
        let url = &self.sources.live_trading_url;
        info!("Fetching live trading table ({})", url);

        let html = self.client.get_text(url).await
            .context("Failed to fetch live trading page")?;

        let pairs = parse_live_trading(&html).context("Live trading table not found")?;
        let quotes: Vec<Quote> = pairs
            .iter()
            .filter_map(|(symbol, ltp)| clean_quote(symbol, ltp))
            .collect();

        info!("Found {} live trading rows", quotes.len());
        Ok(quotes)
    }

    async fn fetch_fundamentals(&self, symbol: &str) -> Result<FundamentalRecord> {
        let url = self.company_url(symbol)?;
        debug!("Fetching company page: {}", url);

        let html = self.client.get_text(&url).await
            .with_context(|| format!("Failed to fetch company page for {}", symbol))?;

        let detail = parse_company_detail(&html, symbol)?;
        let record = clean_fundamentals(symbol, detail.eps, detail.book_value);
        info!("Scraped {}: EPS={}, BV={}", record.symbol, record.eps, record.book_value);
        Ok(record)
    }
}

// ── Dividend pages ────────────────────────────────────────────────────────────

/// `GET {url}?page={n}&limit={page_size}`, one table per page.
pub struct DividendPageSource {
    client: Arc<HttpClient>,
    base_url: Url,
    page_size: u32,
    page: u32,
    headers: Vec<String>,
    current: Option<PageResult>,
}

impl DividendPageSource {
    pub fn new(client: Arc<HttpClient>, url: &str, page_size: u32) -> Result<Self> {
        let base_url = Url::parse(url).with_context(|| format!("Bad dividends URL {:?}", url))?;
        Ok(Self {
            client,
            base_url,
            page_size,
            page: 1,
            headers: Vec::new(),
            current: None,
        })
    }

    fn page_url(&self, page: u32) -> String {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("limit", &self.page_size.to_string());
        url.into()
    }

    async fn load(&mut self) -> Result<&PageResult> {
        let url = self.page_url(self.page);
        info!("Fetching dividend page {} ({})", self.page, url);

        let html = self.client.get_text(&url).await
            .with_context(|| format!("Failed to fetch dividend page {}", self.page))?;

        let table = parse_table(&html)
            .with_context(|| format!("Dividend table missing on page {}", self.page))?;

        if self.headers.is_empty() {
            info!("Headers: {:?}", table.headers);
            self.headers = table.headers;
        } else if table.headers != self.headers {
            warn!("Page {} headers differ from page 1: {:?}", self.page, table.headers);
        }

        let pct = percentage_columns(&self.headers);
        let rows: Vec<Row> = table
            .rows
            .into_iter()
            .map(|cells| clean_dividend_row(cells, &pct))
            .collect();

        Ok(self.current.insert(PageResult {
            rows,
            has_next: has_next_page(&html),
        }))
    }
}

#[async_trait]
impl PageSource for DividendPageSource {
    fn headers(&self) -> Vec<String> {
        self.headers.clone()
    }

    async fn current_rows(&mut self) -> Result<Vec<Row>> {
        if let Some(page) = &self.current {
            return Ok(page.rows.clone());
        }
        Ok(self.load().await?.rows.clone())
    }

    async fn advance(&mut self) -> Result<bool> {
        if self.current.is_none() {
            self.load().await?;
        }
        let has_next = self.current.as_ref().map(|p| p.has_next).unwrap_or(false);
        if !has_next {
            debug!("No next page after page {}", self.page);
            return Ok(false);
        }
        self.page += 1;
        self.current = None;
        self.load().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScraperConfig;
    use crate::harvester::{PageCheck, SortSpec, harvest, merge};
    use crate::loader::load_snapshot;
    use crate::models::KnownRows;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page_html(rows: &[(&str, &str, &str)], next: bool) -> String {
        let body: String = rows
            .iter()
            .map(|(s, b, y)| format!("<tr><td>{}</td><td>{}</td><td>{}</td></tr>", s, b, y))
            .collect();
        let nav = if next {
            r#"<button aria-label="Go to next page">›</button>"#
        } else {
            r#"<button aria-label="Go to next page" disabled>›</button>"#
        };
        format!(
            "<table><thead><tr><th>Symbol</th><th>Bonus(%)</th><th>Fiscal Year</th></tr></thead>\
             <tbody>{}</tbody></table>{}",
            body, nav
        )
    }

    fn fast_client() -> Arc<HttpClient> {
        let cfg = ScraperConfig {
            request_delay_ms: 1,
            jitter_ms: 0,
            max_retries: 0,
            ..ScraperConfig::default()
        };
        Arc::new(HttpClient::new(&cfg).unwrap())
    }

    async fn mount_page(server: &MockServer, page: &str, html: String) {
        Mock::given(method("GET"))
            .and(path("/dividend"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_dividend_pages_walk_until_disabled_next() {
        let server = MockServer::start().await;
        mount_page(&server, "1", page_html(&[("NABIL", "10%", "2081"), ("ADBL", "None", "2081")], true)).await;
        mount_page(&server, "2", page_html(&[("NICA", "5%", "2080")], false)).await;

        let url = format!("{}/dividend", server.uri());
        let mut src = DividendPageSource::new(fast_client(), &url, 50).unwrap();
        let out = harvest(&mut src, KnownRows::new(), 10).await;

        assert_eq!(out.stop, PageCheck::StopExhausted);
        assert_eq!(out.pages, 2);
        assert_eq!(src.headers(), vec!["Symbol", "Bonus(%)", "Fiscal Year"]);
        assert_eq!(
            out.rows,
            vec![
                Row::new(["NABIL", "10", "2081"]),
                Row::new(["ADBL", "0", "2081"]),
                Row::new(["NICA", "5", "2080"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_dividend_page_failure_is_hard_stop() {
        let server = MockServer::start().await;
        mount_page(&server, "1", page_html(&[("NABIL", "10%", "2081")], true)).await;
        Mock::given(method("GET"))
            .and(path("/dividend"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let url = format!("{}/dividend", server.uri());
        let mut src = DividendPageSource::new(fast_client(), &url, 50).unwrap();
        let out = harvest(&mut src, KnownRows::new(), 10).await;

        assert!(matches!(out.stop, PageCheck::SourceFailed(_)));
        assert_eq!(out.rows, vec![Row::new(["NABIL", "10", "2081"])]);
    }

    #[tokio::test]
    async fn test_persisted_row_with_inner_spaces_stops_harvest() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("proposed_dividends_sorted.csv");
        std::fs::write(&csv, "Symbol,Bonus(%),Fiscal Year\nNABIL,10,2080/81  (Q4)\n").unwrap();
        let prior = load_snapshot(&csv).unwrap();

        let server = MockServer::start().await;
        mount_page(
            &server,
            "1",
            page_html(&[("NICA", "5%", "2081/82"), ("NABIL", "10%", "2080/81  (Q4)")], true),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/dividend"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page_html(&[("OLD", "1%", "2070")], false)))
            .expect(0)
            .mount(&server)
            .await;

        let url = format!("{}/dividend", server.uri());
        let mut src = DividendPageSource::new(fast_client(), &url, 50).unwrap();
        let out = harvest(&mut src, prior.known_rows(), 10).await;

        assert_eq!(out.stop, PageCheck::StopKnown);
        assert_eq!(out.pages, 1);
        assert_eq!(out.rows, vec![Row::new(["NICA", "5", "2081/82"])]);

        let headers = prior.headers.clone();
        let merged = merge(out.rows, prior, headers, &SortSpec::dividends());
        assert_eq!(
            merged.rows,
            vec![
                Row::new(["NABIL", "10", "2080/81  (Q4)"]),
                Row::new(["NICA", "5", "2081/82"]),
            ]
        );
    }

    #[test]
    fn test_page_url() {
        let src = DividendPageSource::new(fast_client(), "https://example.com/dividend", 50).unwrap();
        assert_eq!(src.page_url(3), "https://example.com/dividend?page=3&limit=50");
    }
}
