use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub sources: SourceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Pages scraped by each subcommand
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_dividends_url")]
    pub dividends_url: String,

    #[serde(default = "default_live_trading_url")]
    pub live_trading_url: String,

    #[serde(default = "default_company_detail_url")]
    pub company_detail_url: String,
}

/// Where the flat files live
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_dividends_file")]
    pub dividends_file: String,

    #[serde(default = "default_legacy_dividends_file")]
    pub legacy_dividends_file: String,

    #[serde(default = "default_live_trading_file")]
    pub live_trading_file: String,

    #[serde(default = "default_fundamentals_file")]
    pub fundamentals_file: String,
}

/// Dividend pagination walk
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HarvestConfig {
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Write rows gathered before a source failure or the page ceiling.
    #[serde(default)]
    pub persist_partial: bool,
}

/// Fundamentals enrichment
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_timeout_secs() -> u64 {
    15
}
fn default_request_delay_ms() -> u64 {
    100
}
fn default_jitter_ms() -> u64 {
    400
}
fn default_max_retries() -> u32 {
    2
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
}
fn default_dividends_url() -> String {
    "https://sharehubnepal.com/investment/proposed-dividend".to_string()
}
fn default_live_trading_url() -> String {
    "https://www.sharesansar.com/live-trading".to_string()
}
fn default_company_detail_url() -> String {
    "https://merolagani.com/CompanyDetail.aspx".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_dividends_file() -> String {
    "proposed_dividends_sorted.csv".to_string()
}
fn default_legacy_dividends_file() -> String {
    "proposed_dividends.csv".to_string()
}
fn default_live_trading_file() -> String {
    "live-trading-cache.json".to_string()
}
fn default_fundamentals_file() -> String {
    "eps.csv".to_string()
}
fn default_max_pages() -> u32 {
    crate::harvester::DEFAULT_MAX_PAGES
}
fn default_page_size() -> u32 {
    50
}
fn default_concurrency() -> usize {
    5
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dividends_url: default_dividends_url(),
            live_trading_url: default_live_trading_url(),
            company_detail_url: default_company_detail_url(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            dividends_file: default_dividends_file(),
            legacy_dividends_file: default_legacy_dividends_file(),
            live_trading_file: default_live_trading_file(),
            fundamentals_file: default_fundamentals_file(),
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            page_size: default_page_size(),
            persist_partial: false,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl StorageConfig {
    pub fn dividends_path(&self) -> PathBuf {
        self.data_dir.join(&self.dividends_file)
    }

    pub fn legacy_dividends_path(&self) -> PathBuf {
        self.data_dir.join(&self.legacy_dividends_file)
    }

    pub fn live_trading_path(&self) -> PathBuf {
        self.data_dir.join(&self.live_trading_file)
    }

    pub fn fundamentals_path(&self) -> PathBuf {
        self.data_dir.join(&self.fundamentals_file)
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("NEPSE").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|e| {
            warn!("Invalid configuration ({}), using defaults", e);
            AppConfig::default()
        });
        Ok(app_cfg)
    }
}
