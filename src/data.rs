use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info, warn};

use crate::config::{MAX_MOVERS, MAX_NEWS_ITEMS, MAX_SEARCH_RESULTS, NEWS_PER_SYMBOL};
use crate::error::ProviderError;

const YAHOO_HOSTS: &[&str] = &[
    "https://query1.finance.yahoo.com",
    "https://query2.finance.yahoo.com",
];
const FETCH_ATTEMPTS: usize = 3;
const RETRY_DELAY_MS: u64 = 700;
const USER_AGENT: &str = "Mozilla/5.0";

/// Time window for a history fetch. String forms match the provider's range
/// parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChartPeriod {
    OneDay,
    FiveDays,
    OneMonth,
    ThreeMonths,
    SixMonths,
    YearToDate,
    OneYear,
    TwoYears,
    FiveYears,
    Max,
}

impl ChartPeriod {
    pub const ALL: &'static [ChartPeriod] = &[
        ChartPeriod::OneDay,
        ChartPeriod::FiveDays,
        ChartPeriod::OneMonth,
        ChartPeriod::ThreeMonths,
        ChartPeriod::SixMonths,
        ChartPeriod::YearToDate,
        ChartPeriod::OneYear,
        ChartPeriod::TwoYears,
        ChartPeriod::FiveYears,
        ChartPeriod::Max,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChartPeriod::OneDay => "1d",
            ChartPeriod::FiveDays => "5d",
            ChartPeriod::OneMonth => "1mo",
            ChartPeriod::ThreeMonths => "3mo",
            ChartPeriod::SixMonths => "6mo",
            ChartPeriod::YearToDate => "ytd",
            ChartPeriod::OneYear => "1y",
            ChartPeriod::TwoYears => "2y",
            ChartPeriod::FiveYears => "5y",
            ChartPeriod::Max => "max",
        }
    }

    /// Bar interval paired with the range so short windows stay readable.
    pub fn interval(self) -> &'static str {
        match self {
            ChartPeriod::OneDay => "5m",
            ChartPeriod::FiveDays => "15m",
            _ => "1d",
        }
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|p| *p == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    /// Period to chart under a day-offset overlay. Intraday windows carry
    /// sub-daily bars, which would squeeze a 30-day line into a few hours of
    /// x-axis; those map to a daily-bar window instead.
    pub fn daily_overlay(self) -> Self {
        if self.interval() == "1d" {
            self
        } else {
            ChartPeriod::SixMonths
        }
    }
}

impl FromStr for ChartPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown period '{}' (try 1d, 5d, 1mo, 6mo, 1y, max)", s))
    }
}

/// A single OHLCV bar.
#[derive(Clone, Debug)]
pub struct Candle {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Historical bars for one symbol.
#[derive(Clone, Debug)]
pub struct StockData {
    pub symbol: String,
    pub history: Vec<Candle>,
}

impl StockData {
    pub fn closes(&self) -> Vec<f64> {
        self.history.iter().map(|c| c.close).collect()
    }

    /// Price range across the series, padded for chart axes.
    pub fn price_bounds(&self) -> (f64, f64) {
        let min = self
            .history
            .iter()
            .map(|c| c.low)
            .fold(f64::INFINITY, f64::min);
        let max = self
            .history
            .iter()
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max);
        (min, max)
    }

    /// Random-walk series for tests; no network involved.
    #[allow(dead_code)]
    pub fn new_mock(symbol: &str, days: usize) -> Self {
        let mut rng = rand::thread_rng();
        let mut history = Vec::with_capacity(days);
        let mut price: f64 = 100.0;
        let mut date = Utc::now() - Duration::days(days as i64);

        for _ in 0..days {
            let change_pct: f64 = rng.gen_range(-0.02..0.02);
            let open = price;
            let close = open * (1.0 + change_pct);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            history.push(Candle {
                date,
                open,
                high,
                low,
                close,
                volume: rng.gen_range(1000.0..10000.0),
            });
            price = close;
            date += Duration::days(1);
        }

        Self {
            symbol: symbol.to_string(),
            history,
        }
    }
}

/// Ephemeral current/open/change data. Never persisted; an all-zero snapshot
/// means "unavailable", not a true zero price.
#[derive(Clone, Copy, Debug, Default)]
pub struct QuoteSnapshot {
    pub current: f64,
    pub open: f64,
    pub change: f64,
    pub change_pct: f64,
}

impl QuoteSnapshot {
    fn from_prices(current: f64, open: f64) -> Self {
        let change = current - open;
        let change_pct = if open.abs() > 1e-9 {
            change / open * 100.0
        } else {
            0.0
        };
        Self {
            current,
            open,
            change,
            change_pct,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SearchResult {
    pub symbol: String,
    pub name: String,
    pub exchange: String,
}

#[derive(Clone, Debug)]
pub struct NewsItem {
    pub title: String,
    pub publisher: String,
    pub link: String,
}

#[derive(Clone, Debug)]
pub struct Mover {
    pub symbol: String,
    pub change_pct: f64,
}

// ── Provider wire shapes ────────────────────────────────────────────────────

#[derive(Deserialize, Serialize, Debug)]
struct YahooSearchResponse {
    #[serde(default)]
    quotes: Vec<YahooSearchQuote>,
    #[serde(default)]
    news: Vec<YahooSearchNews>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooSearchQuote {
    symbol: Option<String>,
    shortname: Option<String>,
    longname: Option<String>,
    exchange: Option<String>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooSearchNews {
    title: Option<String>,
    publisher: Option<String>,
    link: Option<String>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooChart {
    #[serde(default)]
    result: Option<Vec<YahooResult>>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooIndicators {
    #[serde(default)]
    quote: Vec<YahooQuote>,
}

#[derive(Deserialize, Serialize, Debug, Default)]
struct YahooQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

// ── Client ──────────────────────────────────────────────────────────────────

/// Thin client over the public quote endpoints. Holds one reqwest client;
/// result caching is the caller's concern (`TtlCache`).
pub struct MarketClient {
    http: reqwest::Client,
}

impl MarketClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http }
    }

    /// GET + JSON decode with retry across both query hosts.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path_and_query: &str,
    ) -> Result<T, ProviderError> {
        let mut last_error: Option<ProviderError> = None;

        for attempt in 1..=FETCH_ATTEMPTS {
            for host in YAHOO_HOSTS {
                let url = format!("{}{}", host, path_and_query);
                let response = match self
                    .http
                    .get(&url)
                    .header("User-Agent", USER_AGENT)
                    .send()
                    .await
                {
                    Ok(resp) => resp,
                    Err(err) => {
                        last_error = Some(err.into());
                        continue;
                    }
                };

                let status = response.status();
                if !status.is_success() {
                    last_error = Some(ProviderError::Status(status.as_u16()));
                    continue;
                }

                match response.json::<T>().await {
                    Ok(parsed) => return Ok(parsed),
                    Err(err) => last_error = Some(ProviderError::Parse(err.to_string())),
                }
            }

            if attempt < FETCH_ATTEMPTS {
                warn!(
                    "provider fetch failed (attempt {}/{}), retrying...",
                    attempt, FETCH_ATTEMPTS
                );
                tokio::time::sleep(std::time::Duration::from_millis(RETRY_DELAY_MS)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Unavailable("no hosts reachable".into())))
    }

    /// Free-text symbol search, capped at `MAX_SEARCH_RESULTS` matches.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ProviderError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(ProviderError::InvalidSymbol(query.to_string()));
        }

        let path = format!(
            "/v1/finance/search?q={}&quotesCount={}",
            urlencode(trimmed),
            MAX_SEARCH_RESULTS
        );
        let response: YahooSearchResponse = self.get_json(&path).await?;

        let results: Vec<SearchResult> = response
            .quotes
            .into_iter()
            .filter_map(|quote| {
                let symbol = quote.symbol?;
                let name = quote
                    .shortname
                    .or(quote.longname)
                    .unwrap_or_else(|| symbol.clone());
                Some(SearchResult {
                    symbol,
                    name,
                    exchange: quote.exchange.unwrap_or_default(),
                })
            })
            .take(MAX_SEARCH_RESULTS)
            .collect();

        info!("search '{}' -> {} matches", trimmed, results.len());
        Ok(results)
    }

    /// Latest quote from the 1-minute intraday chart: current is the last
    /// non-null close, open the first non-null open.
    pub async fn quote(&self, symbol: &str) -> Result<QuoteSnapshot, ProviderError> {
        let symbol = normalize_symbol(symbol)?;
        let path = format!("/v8/finance/chart/{}?interval=1m&range=1d", symbol);
        let response: YahooChartResponse = self.get_json(&path).await?;
        let data = parse_chart(&symbol, response)?;

        let current = data
            .history
            .last()
            .map(|c| c.close)
            .ok_or_else(|| ProviderError::NoData(symbol.clone()))?;
        let open = data.history.first().map(|c| c.open).unwrap_or(current);

        Ok(QuoteSnapshot::from_prices(current, open))
    }

    /// Historical OHLCV for the period. An empty series is `NoData`, which
    /// callers render as a placeholder rather than an error.
    pub async fn history(
        &self,
        symbol: &str,
        period: ChartPeriod,
    ) -> Result<StockData, ProviderError> {
        let symbol = normalize_symbol(symbol)?;
        let path = format!(
            "/v8/finance/chart/{}?range={}&interval={}",
            symbol,
            period.as_str(),
            period.interval()
        );
        let response: YahooChartResponse = self.get_json(&path).await?;
        parse_chart(&symbol, response)
    }

    /// 2-day close-over-close change across the universe, sorted descending.
    /// Per-symbol failures are skipped so one bad ticker cannot empty the
    /// board.
    pub async fn top_movers(&self, universe: &[&str]) -> Vec<Mover> {
        let mut movers = Vec::new();

        for symbol in universe {
            match self.history(symbol, ChartPeriod::FiveDays).await {
                Ok(data) => {
                    let closes = data.closes();
                    if closes.len() >= 2 {
                        let last = closes[closes.len() - 1];
                        let prev = closes[closes.len() - 2];
                        if prev.abs() > 1e-9 {
                            movers.push(Mover {
                                symbol: data.symbol,
                                change_pct: (last / prev - 1.0) * 100.0,
                            });
                        }
                    }
                }
                Err(err) => warn!("movers: skipping {}: {}", symbol, err),
            }
        }

        movers.sort_by(|a, b| {
            b.change_pct
                .partial_cmp(&a.change_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        movers.truncate(MAX_MOVERS);
        movers
    }

    /// Latest headlines via the search endpoint's news payload, a couple per
    /// symbol, capped overall.
    pub async fn news(&self, symbols: &[&str]) -> Vec<NewsItem> {
        let mut items = Vec::new();

        for symbol in symbols {
            let path = format!("/v1/finance/search?q={}&quotesCount=0", urlencode(symbol));
            match self.get_json::<YahooSearchResponse>(&path).await {
                Ok(response) => {
                    for news in response.news.into_iter().take(NEWS_PER_SYMBOL) {
                        items.push(NewsItem {
                            title: news.title.unwrap_or_else(|| "No title".to_string()),
                            publisher: news.publisher.unwrap_or_else(|| "Unknown".to_string()),
                            link: news.link.unwrap_or_else(|| "#".to_string()),
                        });
                    }
                }
                Err(err) => warn!("news: skipping {}: {}", symbol, err),
            }
            if items.len() >= MAX_NEWS_ITEMS {
                break;
            }
        }

        items.truncate(MAX_NEWS_ITEMS);
        items
    }
}

impl Default for MarketClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Uppercases and checks the symbol against the ticker alphabet. The symbol
/// namespace itself stays external and unvalidated.
pub fn normalize_symbol(symbol: &str) -> Result<String, ProviderError> {
    let upper = symbol.trim().to_uppercase();
    if upper.is_empty()
        || !upper
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '^' || c == '=')
    {
        return Err(ProviderError::InvalidSymbol(symbol.to_string()));
    }
    Ok(upper)
}

/// Percent-encodes per UTF-8 byte, so multi-byte characters expand to one
/// `%XX` triplet per byte.
fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Flattens the chart response into bars, dropping rows with null fields.
fn parse_chart(symbol: &str, response: YahooChartResponse) -> Result<StockData, ProviderError> {
    let result = response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| ProviderError::NoData(symbol.to_string()))?;

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

    let mut history = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let bar = (
            quote.open.get(i).copied().flatten(),
            quote.high.get(i).copied().flatten(),
            quote.low.get(i).copied().flatten(),
            quote.close.get(i).copied().flatten(),
            quote.volume.get(i).copied().flatten(),
        );
        if let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = bar {
            history.push(Candle {
                date: Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now),
                open,
                high,
                low,
                close,
                volume,
            });
        }
    }

    if history.is_empty() {
        return Err(ProviderError::NoData(symbol.to_string()));
    }

    Ok(StockData {
        symbol: symbol.to_string(),
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_round_trips_through_strings() {
        for period in ChartPeriod::ALL {
            assert_eq!(period.as_str().parse::<ChartPeriod>().unwrap(), *period);
        }
        assert!("fortnight".parse::<ChartPeriod>().is_err());
    }

    #[test]
    fn daily_overlay_replaces_intraday_periods() {
        assert_eq!(ChartPeriod::OneDay.daily_overlay(), ChartPeriod::SixMonths);
        assert_eq!(ChartPeriod::FiveDays.daily_overlay(), ChartPeriod::SixMonths);
        for period in ChartPeriod::ALL.iter().filter(|p| p.interval() == "1d") {
            assert_eq!(period.daily_overlay(), *period);
        }
    }

    #[test]
    fn period_next_cycles() {
        let mut period = ChartPeriod::OneDay;
        for _ in 0..ChartPeriod::ALL.len() {
            period = period.next();
        }
        assert_eq!(period, ChartPeriod::OneDay);
    }

    #[test]
    fn normalize_symbol_rules() {
        assert_eq!(normalize_symbol(" aapl ").unwrap(), "AAPL");
        assert_eq!(normalize_symbol("zag.to").unwrap(), "ZAG.TO");
        assert_eq!(normalize_symbol("BRK-B").unwrap(), "BRK-B");
        assert!(normalize_symbol("").is_err());
        assert!(normalize_symbol("AA PL").is_err());
    }

    #[test]
    fn quote_snapshot_change_math() {
        let snap = QuoteSnapshot::from_prices(110.0, 100.0);
        assert!((snap.change - 10.0).abs() < 1e-9);
        assert!((snap.change_pct - 10.0).abs() < 1e-9);

        // Zero open must not divide.
        let snap = QuoteSnapshot::from_prices(5.0, 0.0);
        assert_eq!(snap.change_pct, 0.0);
    }

    #[test]
    fn parse_chart_drops_null_rows() {
        let body = r#"{
            "chart": { "result": [ {
                "timestamp": [1700000000, 1700086400, 1700172800],
                "indicators": { "quote": [ {
                    "open":   [100.0, null, 102.0],
                    "high":   [101.0, 103.0, 104.0],
                    "low":    [99.0, 100.0, 101.0],
                    "close":  [100.5, 102.5, 103.0],
                    "volume": [1000.0, 2000.0, 1500.0]
                } ] }
            } ] }
        }"#;
        let response: YahooChartResponse = serde_json::from_str(body).unwrap();
        let data = parse_chart("TEST", response).unwrap();
        assert_eq!(data.history.len(), 2);
        assert!((data.history[0].close - 100.5).abs() < 1e-9);
        assert!((data.history[1].close - 103.0).abs() < 1e-9);
    }

    #[test]
    fn empty_series_is_no_data_not_a_panic() {
        let body = r#"{"chart": {"result": null}}"#;
        let response: YahooChartResponse = serde_json::from_str(body).unwrap();
        let err = parse_chart("GHOST", response).unwrap_err();
        assert!(err.is_no_data());

        let body = r#"{
            "chart": { "result": [ {
                "timestamp": [],
                "indicators": { "quote": [ {} ] }
            } ] }
        }"#;
        let response: YahooChartResponse = serde_json::from_str(body).unwrap();
        assert!(parse_chart("GHOST", response).unwrap_err().is_no_data());
    }

    #[test]
    fn search_response_tolerates_missing_fields() {
        let body = r#"{
            "quotes": [
                {"symbol": "AAPL", "shortname": "Apple Inc.", "exchange": "NMS"},
                {"shortname": "no symbol, dropped"},
                {"symbol": "MSFT"}
            ],
            "news": [{"title": "Headline", "publisher": "Wire"}]
        }"#;
        let response: YahooSearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.quotes.len(), 3);
        assert_eq!(response.news.len(), 1);
    }

    #[test]
    fn mock_series_has_sane_bars() {
        let data = StockData::new_mock("TEST", 50);
        assert_eq!(data.history.len(), 50);
        for candle in &data.history {
            assert!(candle.high >= candle.low);
            assert!(candle.high >= candle.close);
            assert!(candle.low <= candle.open);
        }
        let (min, max) = data.price_bounds();
        assert!(min <= max);
    }

    #[test]
    fn urlencode_escapes_reserved() {
        assert_eq!(urlencode("apple inc"), "apple%20inc");
        assert_eq!(urlencode("AT&T"), "AT%26T");
        assert_eq!(urlencode("plain"), "plain");
    }

    #[test]
    fn urlencode_emits_utf8_bytes() {
        assert_eq!(urlencode("café"), "caf%C3%A9");
        assert_eq!(urlencode("Nestlé"), "Nestl%C3%A9");
        assert_eq!(urlencode("€"), "%E2%82%AC");
    }
}
