use std::path::PathBuf;
use std::time::Duration;

use crate::data::ChartPeriod;

/// Quote snapshots go stale quickly; search results and movers less so; news
/// slowest of all. Mirrors the volatility of the underlying value.
pub const QUOTE_TTL: Duration = Duration::from_secs(60);
pub const SEARCH_TTL: Duration = Duration::from_secs(300);
pub const HISTORY_TTL: Duration = Duration::from_secs(300);
pub const MOVERS_TTL: Duration = Duration::from_secs(300);
pub const NEWS_TTL: Duration = Duration::from_secs(1800);

/// Calendar days covered by the forward projection.
pub const FORECAST_HORIZON_DAYS: usize = 30;
/// Days of history anchoring the back-cast line.
pub const BACKCAST_DAYS: usize = 30;
/// Applied to spot when the narrative model yields no usable target.
pub const FALLBACK_TARGET_MULTIPLIER: f64 = 1.05;
/// A model target further than this factor from spot is treated as a
/// mis-extraction and discarded.
pub const TARGET_SANITY_FACTOR: f64 = 10.0;

pub const MAX_SEARCH_RESULTS: usize = 8;
pub const MAX_NEWS_ITEMS: usize = 10;
pub const NEWS_PER_SYMBOL: usize = 2;
pub const MAX_MOVERS: usize = 20;

pub const DEFAULT_HOLDINGS_FILE: &str = "my_portfolio.csv";
pub const NARRATIVE_MODEL: &str = "llama-3.1-8b-instant";
pub const NARRATIVE_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";

/// High-yield income assets shown on the High Yield tab.
pub const HIGH_YIELD_ASSETS: &[(&str, &str)] = &[
    ("HYG", "iShares High Yield (~7.8%)"),
    ("JNK", "SPDR High Yield (~7.5%)"),
    ("BKLN", "Invesco Senior Loan (~8.5%)"),
    ("SDIV", "Global X SuperDividend (~9.7%)"),
    ("QYLD", "Global X NASDAQ Covered Call (~11.5%)"),
    ("JEPI", "JPMorgan Equity Premium (~8.5%)"),
];

pub const BOND_ETFS: &[&str] = &["ZAG.TO", "BND", "TLT", "HYG"];

pub const DIVIDEND_ETFS: &[&str] = &["HMAX.TO", "JEPI", "JEPQ", "SCHD"];

/// Universe scanned for the Top Movers tab.
pub const MOVER_UNIVERSE: &[&str] = &[
    "AAPL", "MSFT", "NVDA", "GOOGL", "TSLA", "META", "AMZN", "AVGO", "LLY", "JPM",
];

/// Symbols polled for the News tab.
pub const NEWS_SYMBOLS: &[&str] = &["AAPL", "MSFT", "GOOGL", "NVDA", "TSLA"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Theme {
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "Dark",
            Theme::Light => "Light",
        }
    }
}

/// Everything the components need, constructed once in `main` and passed by
/// reference. No module-level key or theme state.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub holdings_path: PathBuf,
    pub theme: Theme,
    pub default_period: ChartPeriod,
    /// Key for the hosted narrative model; `None` disables the model call
    /// and the forecast falls back to the fixed heuristic.
    pub narrative_api_key: Option<String>,
}

impl AppConfig {
    pub fn new(
        holdings_path: Option<PathBuf>,
        theme: Theme,
        default_period: ChartPeriod,
    ) -> Self {
        // .env is optional; a missing file is not an error.
        let _ = dotenvy::dotenv();

        let narrative_api_key = std::env::var("GROQ_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Self {
            holdings_path: holdings_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HOLDINGS_FILE)),
            theme,
            default_period,
            narrative_api_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_toggles_both_ways() {
        assert_eq!(Theme::Dark.toggled(), Theme::Light);
        assert_eq!(Theme::Light.toggled(), Theme::Dark);
    }

    #[test]
    fn default_holdings_path_applies() {
        let cfg = AppConfig::new(None, Theme::Dark, ChartPeriod::SixMonths);
        assert_eq!(cfg.holdings_path, PathBuf::from(DEFAULT_HOLDINGS_FILE));

        let cfg = AppConfig::new(
            Some(PathBuf::from("/tmp/lots.csv")),
            Theme::Light,
            ChartPeriod::OneYear,
        );
        assert_eq!(cfg.holdings_path, PathBuf::from("/tmp/lots.csv"));
    }
}
