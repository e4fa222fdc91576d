mod app;
mod cache;
mod config;
mod data;
mod error;
mod forecast;
mod holdings;
mod tui;
mod ui;

use app::App;
use clap::Parser;
use config::{AppConfig, Theme};
use data::{ChartPeriod, MarketClient};
use forecast::NarrativeProvider;
use std::io;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "foliodash: a terminal dashboard for stocks, ETFs, and a CSV holdings ledger",
    after_help = "EXAMPLES:
    # Interactive dashboard
    foliodash

    # One-shot lookups
    foliodash --search apple
    foliodash --quote AAPL
    foliodash --forecast JEPI

    # Holdings ledger
    foliodash --add AAPL:10:150.25
    foliodash --valuate"
)]
struct Args {
    /// Search for symbols matching a company name or ticker, then exit
    #[arg(long, value_name = "QUERY")]
    search: Option<String>,

    /// Print the latest quote for a symbol, then exit
    #[arg(long, value_name = "SYMBOL")]
    quote: Option<String>,

    /// Print the 30-day forecast path summary for a symbol, then exit
    #[arg(long, value_name = "SYMBOL")]
    forecast: Option<String>,

    /// Valuate the holdings ledger against live prices, then exit
    #[arg(long)]
    valuate: bool,

    /// Append a lot to the ledger as TICKER:SHARES:PRICE, then exit
    #[arg(long, value_name = "LOT")]
    add: Option<String>,

    /// Path to the holdings CSV (default: my_portfolio.csv)
    #[arg(long, value_name = "PATH")]
    holdings_file: Option<PathBuf>,

    /// Chart period: 1d, 5d, 1mo, 3mo, 6mo, ytd, 1y, 2y, 5y, or max
    #[arg(long, default_value = "6mo")]
    period: ChartPeriod,

    /// Start with the light theme
    #[arg(long)]
    light: bool,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("foliodash=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();

    let args = Args::parse();
    let theme = if args.light { Theme::Light } else { Theme::Dark };
    let config = AppConfig::new(args.holdings_file.clone(), theme, args.period);

    if let Some(ref query) = args.search {
        run_search(query).await;
        return Ok(());
    }

    if let Some(ref symbol) = args.quote {
        run_quote(symbol).await;
        return Ok(());
    }

    if let Some(ref symbol) = args.forecast {
        run_forecast(symbol, &config).await;
        return Ok(());
    }

    if let Some(ref spec) = args.add {
        match holdings::HoldingRecord::parse_lot(spec)
            .and_then(|record| holdings::append(&config.holdings_path, record))
        {
            Ok(records) => println!(
                "Added lot; {} now holds {} lots.",
                config.holdings_path.display(),
                records.len()
            ),
            Err(e) => error!("Could not add lot: {}", e),
        }
        return Ok(());
    }

    if args.valuate {
        run_valuate(&config).await;
        return Ok(());
    }

    let mut terminal = tui::init()?;
    let mut app = App::new(config);
    let res = app.run(&mut terminal).await;

    tui::restore()?;

    if let Err(e) = res {
        error!("Error: {:?}", e);
    }

    Ok(())
}

async fn run_search(query: &str) {
    let client = MarketClient::new();
    match client.search(query).await {
        Ok(results) if results.is_empty() => println!("No results for '{}'.", query),
        Ok(results) => {
            for result in results {
                println!("{:<8} {} [{}]", result.symbol, result.name, result.exchange);
            }
        }
        Err(e) => error!("Search failed: {}", e),
    }
}

async fn run_quote(symbol: &str) {
    let client = MarketClient::new();
    match client.quote(symbol).await {
        Ok(quote) => println!(
            "{}: ${:.2} ({:+.2}, {:+.2}%)",
            symbol.to_uppercase(),
            quote.current,
            quote.change,
            quote.change_pct
        ),
        Err(e) => error!("Quote failed: {}", e),
    }
}

async fn run_forecast(symbol: &str, config: &AppConfig) {
    let client = MarketClient::new();
    let quote = match client.quote(symbol).await {
        Ok(quote) => quote,
        Err(e) => {
            error!("No price available for {}: {}", symbol, e);
            return;
        }
    };

    let recent = client
        .history(symbol, config.default_period.daily_overlay())
        .await
        .map(|d| d.history)
        .unwrap_or_default();
    let provider = config
        .narrative_api_key
        .clone()
        .map(forecast::GroqProvider::new);
    let provider_ref = provider.as_ref().map(|p| p as &dyn NarrativeProvider);

    let path = forecast::build_forecast(
        &symbol.to_uppercase(),
        quote.current,
        &recent,
        provider_ref,
    )
    .await;

    println!(
        "{}: spot ${:.2} -> 30-day target ${:.2} ({:+.2}%, {} anchor)",
        path.symbol,
        path.spot,
        path.target,
        path.target_change_pct(),
        path.source.as_str()
    );
    println!("Illustrative only; not a prediction.");
}

async fn run_valuate(config: &AppConfig) {
    let records = match holdings::load(&config.holdings_path) {
        Ok(records) => records,
        Err(e) => {
            error!("Could not read {}: {}", config.holdings_path.display(), e);
            return;
        }
    };
    if records.is_empty() {
        println!("No lots in {}.", config.holdings_path.display());
        return;
    }

    let client = MarketClient::new();
    let mut prices = std::collections::HashMap::new();
    for record in &records {
        if prices.contains_key(&record.ticker) {
            continue;
        }
        if let Ok(quote) = client.quote(&record.ticker).await {
            if quote.current > 0.0 {
                prices.insert(record.ticker.clone(), quote.current);
            }
        }
    }

    let valuation = holdings::valuate(&records, |t| prices.get(t).copied());
    println!(
        "{:<8} {:>10} {:>10} {:>10} {:>12} {:>18} {:>7}",
        "Ticker", "Shares", "Cost", "Last", "Value", "Gain", "Alloc"
    );
    for lot in &valuation.lots {
        let last = lot
            .last_price
            .map(|p| format!("{:.2}", p))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<8} {:>10.2} {:>10.2} {:>10} {:>12.2} {:>9.2} ({:+.2}%) {:>6.1}%",
            lot.record.ticker,
            lot.record.shares,
            lot.record.buy_price,
            last,
            lot.value,
            lot.gain,
            lot.gain_pct,
            lot.allocation_pct
        );
    }
    println!(
        "Total: ${:.2} ({:+.2}, {:+.2}%) on ${:.2} cost",
        valuation.total_value,
        valuation.total_gain,
        valuation.total_gain_pct,
        valuation.total_cost
    );
}
