use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use std::io;
use tracing::warn;

use crate::cache::TtlCache;
use crate::config::{
    AppConfig, BOND_ETFS, DIVIDEND_ETFS, HIGH_YIELD_ASSETS, HISTORY_TTL, MOVERS_TTL,
    MOVER_UNIVERSE, NEWS_SYMBOLS, NEWS_TTL, QUOTE_TTL, SEARCH_TTL, Theme,
};
use crate::data::{
    ChartPeriod, MarketClient, Mover, NewsItem, QuoteSnapshot, SearchResult, StockData,
};
use crate::forecast::{self, ForecastPath, GroqProvider, NarrativeProvider};
use crate::holdings::{self, HoldingRecord, LedgerValuation};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tab {
    Lookup,
    Forecast,
    HighYield,
    Movers,
    News,
    BondEtfs,
    DividendEtfs,
    Holdings,
}

impl Tab {
    pub const ALL: &'static [Tab] = &[
        Tab::Lookup,
        Tab::Forecast,
        Tab::HighYield,
        Tab::Movers,
        Tab::News,
        Tab::BondEtfs,
        Tab::DividendEtfs,
        Tab::Holdings,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Lookup => "Lookup",
            Tab::Forecast => "Forecast",
            Tab::HighYield => "High Yield",
            Tab::Movers => "Movers",
            Tab::News => "News",
            Tab::BondEtfs => "Bond ETFs",
            Tab::DividendEtfs => "Dividend ETFs",
            Tab::Holdings => "Holdings",
        }
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|t| *t == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn previous(self) -> Self {
        let idx = Self::ALL.iter().position(|t| *t == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// What the input line currently feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Idle,
    SearchQuery,
    ForecastSymbol,
    AddLot,
}

/// Work a key press has requested. The run loop executes these; keeping them
/// out of `handle_key` keeps the key handling testable without a network.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Search(String),
    LoadChart(String),
    RunForecast(String),
    AddLot(String),
    RefreshTab,
}

pub struct App {
    pub config: AppConfig,
    pub theme: Theme,
    pub tab: Tab,
    pub should_quit: bool,

    pub input_mode: InputMode,
    pub input: String,
    /// Inline status line; the only user-visible failure surface.
    pub status: Option<String>,

    // Lookup tab
    pub search_results: Vec<(SearchResult, QuoteSnapshot)>,
    pub selected_result: usize,
    pub chart: Option<StockData>,
    pub chart_placeholder: Option<String>,
    pub chart_period: ChartPeriod,

    // Forecast tab
    pub forecast_symbol: String,
    pub forecast_quote: QuoteSnapshot,
    pub forecast_history: Option<StockData>,
    pub forecast: Option<ForecastPath>,

    // Watchlist tabs
    pub yield_rows: Vec<(&'static str, &'static str, QuoteSnapshot)>,
    pub bond_rows: Vec<(&'static str, QuoteSnapshot)>,
    pub dividend_rows: Vec<(&'static str, QuoteSnapshot)>,
    pub movers: Vec<Mover>,
    pub news: Vec<NewsItem>,

    // Holdings tab
    pub valuation: Option<LedgerValuation>,

    client: MarketClient,
    narrative: Option<GroqProvider>,
    quote_cache: TtlCache<String, QuoteSnapshot>,
    search_cache: TtlCache<String, Vec<SearchResult>>,
    history_cache: TtlCache<(String, ChartPeriod), StockData>,
    movers_cache: TtlCache<(), Vec<Mover>>,
    news_cache: TtlCache<(), Vec<NewsItem>>,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let narrative = config.narrative_api_key.clone().map(GroqProvider::new);
        let theme = config.theme;
        let chart_period = config.default_period;

        Self {
            config,
            theme,
            tab: Tab::Lookup,
            should_quit: false,
            input_mode: InputMode::Idle,
            input: String::new(),
            status: None,
            search_results: Vec::new(),
            selected_result: 0,
            chart: None,
            chart_placeholder: None,
            chart_period,
            forecast_symbol: "JEPI".to_string(),
            forecast_quote: QuoteSnapshot::default(),
            forecast_history: None,
            forecast: None,
            yield_rows: Vec::new(),
            bond_rows: Vec::new(),
            dividend_rows: Vec::new(),
            movers: Vec::new(),
            news: Vec::new(),
            valuation: None,
            client: MarketClient::new(),
            narrative,
            quote_cache: TtlCache::new(QUOTE_TTL),
            search_cache: TtlCache::new(SEARCH_TTL),
            history_cache: TtlCache::new(HISTORY_TTL),
            movers_cache: TtlCache::new(MOVERS_TTL),
            news_cache: TtlCache::new(NEWS_TTL),
        }
    }

    pub async fn run(&mut self, terminal: &mut crate::tui::Tui) -> io::Result<()> {
        self.execute(Action::RefreshTab).await;

        while !self.should_quit {
            terminal.draw(|f| crate::ui::render(f, self))?;

            if event::poll(std::time::Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        if let Some(action) = self.handle_key(key) {
                            self.execute(action).await;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Translates a key press into state changes and, possibly, one action
    /// for the run loop to execute.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        if self.input_mode != InputMode::Idle {
            return self.handle_editing_key(key);
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
                None
            }
            KeyCode::Tab => {
                self.tab = self.tab.next();
                self.status = None;
                Some(Action::RefreshTab)
            }
            KeyCode::BackTab => {
                self.tab = self.tab.previous();
                self.status = None;
                Some(Action::RefreshTab)
            }
            KeyCode::Char('t') => {
                self.theme = self.theme.toggled();
                None
            }
            KeyCode::Char('r') => Some(Action::RefreshTab),
            KeyCode::Char('/') if self.tab == Tab::Lookup => {
                self.begin_input(InputMode::SearchQuery);
                None
            }
            KeyCode::Char('s') if self.tab == Tab::Forecast => {
                self.begin_input(InputMode::ForecastSymbol);
                None
            }
            KeyCode::Char('a') if self.tab == Tab::Holdings => {
                self.begin_input(InputMode::AddLot);
                None
            }
            KeyCode::Char('p') if matches!(self.tab, Tab::Lookup | Tab::Forecast) => {
                self.chart_period = self.chart_period.next();
                Some(Action::RefreshTab)
            }
            KeyCode::Up if self.tab == Tab::Lookup => {
                self.selected_result = self.selected_result.saturating_sub(1);
                None
            }
            KeyCode::Down if self.tab == Tab::Lookup => {
                if self.selected_result + 1 < self.search_results.len() {
                    self.selected_result += 1;
                }
                None
            }
            KeyCode::Enter if self.tab == Tab::Lookup => self
                .search_results
                .get(self.selected_result)
                .map(|(result, _)| Action::LoadChart(result.symbol.clone())),
            _ => None,
        }
    }

    fn handle_editing_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Char(c) => {
                self.input.push(c);
                None
            }
            KeyCode::Backspace => {
                self.input.pop();
                None
            }
            KeyCode::Esc => {
                self.input_mode = InputMode::Idle;
                self.input.clear();
                None
            }
            KeyCode::Enter => {
                let text = self.input.trim().to_string();
                let mode = self.input_mode;
                self.input_mode = InputMode::Idle;
                self.input.clear();
                if text.is_empty() {
                    return None;
                }
                match mode {
                    InputMode::SearchQuery => Some(Action::Search(text)),
                    InputMode::ForecastSymbol => Some(Action::RunForecast(text)),
                    InputMode::AddLot => Some(Action::AddLot(text)),
                    InputMode::Idle => None,
                }
            }
            _ => None,
        }
    }

    fn begin_input(&mut self, mode: InputMode) {
        self.input_mode = mode;
        self.input.clear();
        self.status = None;
    }

    pub async fn execute(&mut self, action: Action) {
        match action {
            Action::Search(query) => self.run_search(&query).await,
            Action::LoadChart(symbol) => self.load_chart(&symbol).await,
            Action::RunForecast(symbol) => self.run_forecast(&symbol).await,
            Action::AddLot(spec) => self.add_lot(&spec).await,
            Action::RefreshTab => self.refresh_tab().await,
        }
        self.quote_cache.purge_expired();
    }

    async fn refresh_tab(&mut self) {
        match self.tab {
            Tab::Lookup => {
                if let Some(symbol) = self.chart.as_ref().map(|d| d.symbol.clone()) {
                    self.load_chart(&symbol).await;
                }
            }
            Tab::Forecast => {
                let symbol = self.forecast_symbol.clone();
                self.run_forecast(&symbol).await;
            }
            Tab::HighYield => {
                self.yield_rows.clear();
                for (symbol, desc) in HIGH_YIELD_ASSETS {
                    let quote = self.quote_or_zero(symbol).await;
                    self.yield_rows.push((symbol, desc, quote));
                }
            }
            Tab::BondEtfs => {
                self.bond_rows.clear();
                for symbol in BOND_ETFS {
                    let quote = self.quote_or_zero(symbol).await;
                    self.bond_rows.push((symbol, quote));
                }
            }
            Tab::DividendEtfs => {
                self.dividend_rows.clear();
                for symbol in DIVIDEND_ETFS {
                    let quote = self.quote_or_zero(symbol).await;
                    self.dividend_rows.push((symbol, quote));
                }
            }
            Tab::Movers => {
                self.movers = match self.movers_cache.get(&()) {
                    Some(movers) => movers,
                    None => {
                        let movers = self.client.top_movers(MOVER_UNIVERSE).await;
                        self.movers_cache.insert((), movers.clone());
                        movers
                    }
                };
            }
            Tab::News => {
                self.news = match self.news_cache.get(&()) {
                    Some(news) => news,
                    None => {
                        let news = self.client.news(NEWS_SYMBOLS).await;
                        self.news_cache.insert((), news.clone());
                        news
                    }
                };
            }
            Tab::Holdings => self.refresh_holdings().await,
        }
    }

    async fn run_search(&mut self, query: &str) {
        let results = match self.search_cache.get(&query.to_string()) {
            Some(results) => results,
            None => match self.client.search(query).await {
                Ok(results) => {
                    self.search_cache.insert(query.to_string(), results.clone());
                    results
                }
                Err(err) => {
                    self.status = Some(format!("Search unavailable: {}", err));
                    return;
                }
            },
        };

        if results.is_empty() {
            self.status = Some(format!("No results for '{}'", query));
        }

        self.search_results.clear();
        self.selected_result = 0;
        for result in results {
            let quote = self.quote_or_zero(&result.symbol).await;
            self.search_results.push((result, quote));
        }
    }

    async fn load_chart(&mut self, symbol: &str) {
        self.chart = None;
        self.chart_placeholder = None;
        match self.cached_history(symbol, self.chart_period).await {
            Ok(data) => self.chart = Some(data),
            Err(err) if err.is_no_data() => {
                self.chart_placeholder = Some(format!("No chart data for {}", symbol));
            }
            Err(err) => {
                self.chart_placeholder = Some(format!("Chart unavailable: {}", err));
            }
        }
    }

    async fn run_forecast(&mut self, symbol: &str) {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return;
        }
        self.forecast_symbol = symbol.clone();
        self.forecast_quote = self.quote_or_zero(&symbol).await;
        // Day-offset overlays need daily bars under them.
        self.forecast_history = self
            .cached_history(&symbol, self.chart_period.daily_overlay())
            .await
            .ok();
        self.forecast = None;

        if self.forecast_quote.current <= 0.0 {
            self.status = Some(format!("No price available for {}", symbol));
            return;
        }

        let recent = self
            .forecast_history
            .as_ref()
            .map(|d| d.history.clone())
            .unwrap_or_default();
        let provider = self.narrative.as_ref().map(|p| p as &dyn NarrativeProvider);
        self.forecast = Some(
            forecast::build_forecast(&symbol, self.forecast_quote.current, &recent, provider)
                .await,
        );
    }

    async fn add_lot(&mut self, spec: &str) {
        // Accept both `TICKER:SHARES:PRICE` and space-separated fields.
        let normalized = if spec.contains(':') {
            spec.to_string()
        } else {
            spec.split_whitespace().collect::<Vec<_>>().join(":")
        };

        match HoldingRecord::parse_lot(&normalized) {
            Ok(record) => match holdings::append(&self.config.holdings_path, record) {
                Ok(records) => {
                    self.status = Some(format!("Added lot ({} total)", records.len()));
                    self.refresh_holdings().await;
                }
                Err(err) => self.status = Some(format!("Could not save lot: {}", err)),
            },
            Err(err) => self.status = Some(format!("Invalid lot: {}", err)),
        }
    }

    async fn refresh_holdings(&mut self) {
        let records = match holdings::load(&self.config.holdings_path) {
            Ok(records) => records,
            Err(err) => {
                self.status = Some(format!("Could not read holdings: {}", err));
                return;
            }
        };

        let mut prices = std::collections::HashMap::new();
        for record in &records {
            if prices.contains_key(&record.ticker) {
                continue;
            }
            let quote = self.quote_or_zero(&record.ticker).await;
            if quote.current > 0.0 {
                prices.insert(record.ticker.clone(), quote.current);
            }
        }

        self.valuation = Some(holdings::valuate(&records, |t| prices.get(t).copied()));
    }

    /// Cached quote; a zeroed snapshot stands for "unavailable" and is never
    /// cached, so the next refresh can retry.
    async fn quote_or_zero(&mut self, symbol: &str) -> QuoteSnapshot {
        let key = symbol.to_uppercase();
        if let Some(quote) = self.quote_cache.get(&key) {
            return quote;
        }
        match self.client.quote(&key).await {
            Ok(quote) => {
                self.quote_cache.insert(key, quote);
                quote
            }
            Err(err) => {
                warn!("quote {} unavailable: {}", key, err);
                QuoteSnapshot::default()
            }
        }
    }

    async fn cached_history(
        &mut self,
        symbol: &str,
        period: ChartPeriod,
    ) -> Result<StockData, crate::error::ProviderError> {
        let key = (symbol.to_uppercase(), period);
        if let Some(data) = self.history_cache.get(&key) {
            return Ok(data);
        }
        let data = self.client.history(symbol, period).await?;
        self.history_cache.insert(key, data.clone());
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn app() -> App {
        App::new(AppConfig::new(
            Some(std::env::temp_dir().join("foliodash_app_test.csv")),
            Theme::Dark,
            ChartPeriod::SixMonths,
        ))
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn tab_cycle_wraps_both_ways() {
        let mut tab = Tab::Lookup;
        for _ in 0..Tab::ALL.len() {
            tab = tab.next();
        }
        assert_eq!(tab, Tab::Lookup);
        assert_eq!(Tab::Lookup.previous(), Tab::Holdings);
        assert_eq!(Tab::Holdings.next(), Tab::Lookup);
    }

    #[test]
    fn tab_key_requests_refresh() {
        let mut app = app();
        let action = app.handle_key(press(KeyCode::Tab));
        assert_eq!(app.tab, Tab::Forecast);
        assert_eq!(action, Some(Action::RefreshTab));
    }

    #[test]
    fn theme_toggle_key() {
        let mut app = app();
        assert_eq!(app.theme, Theme::Dark);
        app.handle_key(press(KeyCode::Char('t')));
        assert_eq!(app.theme, Theme::Light);
    }

    #[test]
    fn search_input_commits_to_action() {
        let mut app = app();
        app.handle_key(press(KeyCode::Char('/')));
        assert_eq!(app.input_mode, InputMode::SearchQuery);
        for c in "apple".chars() {
            app.handle_key(press(KeyCode::Char(c)));
        }
        let action = app.handle_key(press(KeyCode::Enter));
        assert_eq!(action, Some(Action::Search("apple".to_string())));
        assert_eq!(app.input_mode, InputMode::Idle);
        assert!(app.input.is_empty());
    }

    #[test]
    fn escape_cancels_input_without_action() {
        let mut app = app();
        app.tab = Tab::Holdings;
        app.handle_key(press(KeyCode::Char('a')));
        app.handle_key(press(KeyCode::Char('x')));
        let action = app.handle_key(press(KeyCode::Esc));
        assert_eq!(action, None);
        assert_eq!(app.input_mode, InputMode::Idle);
        assert!(!app.should_quit);
    }

    #[test]
    fn quit_keys_only_apply_outside_editing() {
        let mut app = app();
        app.handle_key(press(KeyCode::Char('/')));
        app.handle_key(press(KeyCode::Char('q')));
        assert!(!app.should_quit);
        app.handle_key(press(KeyCode::Esc));
        app.handle_key(press(KeyCode::Char('q')));
        assert!(app.should_quit);
    }

    #[test]
    fn add_lot_key_only_on_holdings_tab() {
        let mut app = app();
        app.handle_key(press(KeyCode::Char('a')));
        assert_eq!(app.input_mode, InputMode::Idle);
        app.tab = Tab::Holdings;
        app.handle_key(press(KeyCode::Char('a')));
        assert_eq!(app.input_mode, InputMode::AddLot);
    }

    #[test]
    fn selection_stays_in_bounds() {
        let mut app = app();
        app.handle_key(press(KeyCode::Up));
        assert_eq!(app.selected_result, 0);
        app.handle_key(press(KeyCode::Down));
        assert_eq!(app.selected_result, 0);
    }

    #[test]
    fn period_key_cycles_and_refreshes() {
        let mut app = app();
        let before = app.chart_period;
        let action = app.handle_key(press(KeyCode::Char('p')));
        assert_ne!(app.chart_period, before);
        assert_eq!(action, Some(Action::RefreshTab));
    }
}
