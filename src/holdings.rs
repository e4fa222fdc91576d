use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::data::normalize_symbol;

/// One lot: a ticker, a share count, and the per-share cost basis. Duplicate
/// tickers coexist as separate lots; the ledger is lot-oriented.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HoldingRecord {
    pub ticker: String,
    pub shares: f64,
    pub buy_price: f64,
}

impl HoldingRecord {
    pub fn new(ticker: &str, shares: f64, buy_price: f64) -> Result<Self> {
        let ticker = normalize_symbol(ticker).map_err(|e| anyhow!("{}", e))?;
        if !shares.is_finite() || shares < 0.0 {
            return Err(anyhow!("shares must be a non-negative number, got {}", shares));
        }
        if !buy_price.is_finite() || buy_price < 0.0 {
            return Err(anyhow!(
                "buy price must be a non-negative number, got {}",
                buy_price
            ));
        }
        Ok(Self {
            ticker,
            shares,
            buy_price,
        })
    }

    /// Parses the `TICKER:SHARES:PRICE` form used by `--add`.
    pub fn parse_lot(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() != 3 {
            return Err(anyhow!(
                "expected TICKER:SHARES:PRICE, got '{}'",
                spec
            ));
        }
        let shares = parts[1]
            .trim()
            .parse::<f64>()
            .map_err(|_| anyhow!("invalid share count '{}'", parts[1]))?;
        let buy_price = parts[2]
            .trim()
            .parse::<f64>()
            .map_err(|_| anyhow!("invalid buy price '{}'", parts[2]))?;
        Self::new(parts[0], shares, buy_price)
    }

    pub fn cost(&self) -> f64 {
        self.shares * self.buy_price
    }
}

/// Loads every lot from the CSV file. A missing file is an empty ledger;
/// malformed rows are an error.
pub fn load(path: &Path) -> Result<Vec<HoldingRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

/// Full-overwrite save with header. No append-only log, no fsync contract;
/// single local user, single process.
pub fn save(path: &Path, records: &[HoldingRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!("saved {} lots to {}", records.len(), path.display());
    Ok(())
}

/// Load, push, save. A crash between load and save loses the addition;
/// acceptable at this scale.
pub fn append(path: &Path, record: HoldingRecord) -> Result<Vec<HoldingRecord>> {
    let mut records = load(path)?;
    records.push(record);
    save(path, &records)?;
    Ok(records)
}

/// Valuation of one lot against a live price.
#[derive(Clone, Debug)]
pub struct LotValuation {
    pub record: HoldingRecord,
    /// `None` when the price lookup failed; the lot then contributes zero
    /// value but stays in the table.
    pub last_price: Option<f64>,
    pub value: f64,
    pub gain: f64,
    pub gain_pct: f64,
    pub allocation_pct: f64,
}

#[derive(Clone, Debug, Default)]
pub struct LedgerValuation {
    pub lots: Vec<LotValuation>,
    pub total_cost: f64,
    pub total_value: f64,
    pub total_gain: f64,
    pub total_gain_pct: f64,
}

/// Recomputes the full valuation from live prices. A failed lookup zeroes
/// only its own lot; the computation never aborts. An empty ledger yields
/// zero aggregates.
pub fn valuate(
    records: &[HoldingRecord],
    lookup: impl Fn(&str) -> Option<f64>,
) -> LedgerValuation {
    let mut lots = Vec::with_capacity(records.len());
    let mut total_cost = 0.0;
    let mut total_value = 0.0;

    for record in records {
        let last_price = lookup(&record.ticker);
        let value = last_price.map(|p| record.shares * p).unwrap_or(0.0);
        let cost = record.cost();
        let gain = value - cost;
        let gain_pct = if cost > 0.0 { gain / cost * 100.0 } else { 0.0 };

        total_cost += cost;
        total_value += value;

        lots.push(LotValuation {
            record: record.clone(),
            last_price,
            value,
            gain,
            gain_pct,
            allocation_pct: 0.0,
        });
    }

    for lot in &mut lots {
        lot.allocation_pct = if total_value > 0.0 {
            lot.value / total_value * 100.0
        } else {
            0.0
        };
    }

    let total_gain = total_value - total_cost;
    let total_gain_pct = if total_cost > 0.0 {
        total_gain / total_cost * 100.0
    } else {
        0.0
    };

    LedgerValuation {
        lots,
        total_cost,
        total_value,
        total_gain,
        total_gain_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn temp_csv(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("foliodash_{}_{}.csv", name, std::process::id()))
    }

    fn prices(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(t, p)| (t.to_string(), *p)).collect()
    }

    #[test]
    fn single_lot_example() {
        let records = vec![HoldingRecord::new("AAPL", 10.0, 150.0).unwrap()];
        let table = prices(&[("AAPL", 200.0)]);
        let valuation = valuate(&records, |t| table.get(t).copied());

        assert!((valuation.total_value - 2000.0).abs() < 1e-9);
        assert!((valuation.total_gain - 500.0).abs() < 1e-9);
        assert!((valuation.lots[0].gain_pct - 33.333333).abs() < 1e-3);
        assert!((valuation.lots[0].allocation_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn empty_ledger_is_zero_aggregates() {
        let valuation = valuate(&[], |_| Some(100.0));
        assert_eq!(valuation.lots.len(), 0);
        assert_eq!(valuation.total_cost, 0.0);
        assert_eq!(valuation.total_value, 0.0);
        assert_eq!(valuation.total_gain, 0.0);
        assert_eq!(valuation.total_gain_pct, 0.0);
    }

    #[test]
    fn failed_lookup_zeroes_only_its_lot() {
        let records = vec![
            HoldingRecord::new("AAPL", 10.0, 150.0).unwrap(),
            HoldingRecord::new("BADTICKER", 5.0, 10.0).unwrap(),
        ];
        let table = prices(&[("AAPL", 200.0)]);
        let valuation = valuate(&records, |t| table.get(t).copied());

        assert!((valuation.total_value - 2000.0).abs() < 1e-9);
        assert_eq!(valuation.lots[1].last_price, None);
        assert_eq!(valuation.lots[1].value, 0.0);
        // The AAPL lot is unaffected.
        assert!((valuation.lots[0].value - 2000.0).abs() < 1e-9);
        assert!((valuation.lots[0].allocation_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn total_value_matches_sum_of_resolvable_lots() {
        let records = vec![
            HoldingRecord::new("A", 2.0, 1.0).unwrap(),
            HoldingRecord::new("B", 3.0, 1.0).unwrap(),
            HoldingRecord::new("C", 4.0, 1.0).unwrap(),
        ];
        let table = prices(&[("A", 10.0), ("C", 5.0)]);
        let valuation = valuate(&records, |t| table.get(t).copied());
        assert!((valuation.total_value - (2.0 * 10.0 + 4.0 * 5.0)).abs() < 1e-9);
    }

    #[test]
    fn duplicate_tickers_are_separate_lots() {
        let records = vec![
            HoldingRecord::new("AAPL", 10.0, 150.0).unwrap(),
            HoldingRecord::new("AAPL", 5.0, 180.0).unwrap(),
        ];
        let table = prices(&[("AAPL", 200.0)]);
        let valuation = valuate(&records, |t| table.get(t).copied());
        assert_eq!(valuation.lots.len(), 2);
        assert!((valuation.total_value - 3000.0).abs() < 1e-9);
        assert!((valuation.total_cost - (1500.0 + 900.0)).abs() < 1e-9);
    }

    #[test]
    fn csv_round_trip() {
        let path = temp_csv("round_trip");
        let records = vec![
            HoldingRecord::new("AAPL", 10.0, 150.0).unwrap(),
            HoldingRecord::new("ZAG.TO", 2.5, 14.2).unwrap(),
            HoldingRecord::new("AAPL", 1.0, 190.0).unwrap(),
        ];
        save(&path, &records).unwrap();
        let loaded = load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, records);
    }

    #[test]
    fn missing_file_is_empty_ledger() {
        let path = temp_csv("does_not_exist");
        std::fs::remove_file(&path).ok();
        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn append_preserves_existing_lots() {
        let path = temp_csv("append");
        std::fs::remove_file(&path).ok();
        append(&path, HoldingRecord::new("AAPL", 1.0, 100.0).unwrap()).unwrap();
        let records = append(&path, HoldingRecord::new("MSFT", 2.0, 300.0).unwrap()).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ticker, "AAPL");
        assert_eq!(records[1].ticker, "MSFT");
    }

    #[test]
    fn lot_spec_parsing() {
        let lot = HoldingRecord::parse_lot("aapl:10:150.5").unwrap();
        assert_eq!(lot.ticker, "AAPL");
        assert!((lot.shares - 10.0).abs() < 1e-9);
        assert!((lot.buy_price - 150.5).abs() < 1e-9);

        assert!(HoldingRecord::parse_lot("AAPL:10").is_err());
        assert!(HoldingRecord::parse_lot("AAPL:ten:150").is_err());
        assert!(HoldingRecord::parse_lot("AAPL:-1:150").is_err());
        assert!(HoldingRecord::parse_lot(":10:150").is_err());
    }
}
