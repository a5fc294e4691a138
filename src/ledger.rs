use crate::models::{ActedReason, TradeRecord};
use crate::normalizer::TickerNormalizer;
use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use log::info;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Positions below this absolute share count are treated as flat, so
/// floating-point residue from partial fills never reads as a holding.
pub const POSITION_EPSILON: f64 = 0.01;

pub const DEFAULT_PRE_DAYS: i64 = 3;
pub const DEFAULT_POST_DAYS: i64 = 7;

/// Cumulative signed position checkpoints for one ledger ticker, ordered
/// by date with one checkpoint per trade date after accumulation.
#[derive(Debug, Clone, Default)]
pub struct PositionTimeline {
    checkpoints: Vec<(NaiveDate, f64)>,
}

impl PositionTimeline {
    pub fn from_trades(mut trades: Vec<(NaiveDate, f64)>) -> Self {
        trades.sort_by_key(|(date, _)| *date);
        let mut cumulative = 0.0;
        let mut checkpoints: Vec<(NaiveDate, f64)> = Vec::with_capacity(trades.len());
        for (date, signed_qty) in trades {
            cumulative += signed_qty;
            match checkpoints.last_mut() {
                Some((last_date, last_qty)) if *last_date == date => *last_qty = cumulative,
                _ => checkpoints.push((date, cumulative)),
            }
        }
        Self { checkpoints }
    }

    /// Position as of a date: the last checkpoint on or before it.
    pub fn position_on(&self, date: NaiveDate) -> f64 {
        let mut position = 0.0;
        for (d, qty) in &self.checkpoints {
            if *d > date {
                break;
            }
            position = *qty;
        }
        position
    }

    pub fn checkpoints(&self) -> &[(NaiveDate, f64)] {
        &self.checkpoints
    }
}

/// Raw ledger row as stored on disk. Rows with a non-stock asset type or
/// without a usable date are dropped on load.
#[derive(Debug, Deserialize)]
struct RawTrade {
    #[serde(default)]
    ticker: String,
    #[serde(default)]
    asset_type: Option<String>,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    quantity: Option<f64>,
    #[serde(default)]
    entry_date: Option<String>,
    #[serde(default)]
    exit_date: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    exit_price: Option<f64>,
    #[serde(default)]
    fill_price: Option<f64>,
    #[serde(default)]
    commission: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLedger {
    Wrapped { trades: Vec<RawTrade> },
    Bare(Vec<RawTrade>),
}

/// Trade ledger indexed by uppercased ledger ticker, with per-ticker
/// position timelines reconstructed from signed quantities.
pub struct TradeLedger {
    trades_by_ticker: HashMap<String, Vec<TradeRecord>>,
    timelines: HashMap<String, PositionTimeline>,
}

impl TradeLedger {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read trade ledger {}", path.display()))?;
        let raw: RawLedger = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse trade ledger {}", path.display()))?;
        let rows = match raw {
            RawLedger::Wrapped { trades } => trades,
            RawLedger::Bare(trades) => trades,
        };

        let mut records = Vec::new();
        for row in rows {
            if let Some(asset_type) = row.asset_type.as_deref() {
                if !asset_type.is_empty() && asset_type != "STK" {
                    continue;
                }
            }
            let ticker = row.ticker.trim().to_string();
            if ticker.is_empty() {
                continue;
            }
            let Some(date_str) = row.exit_date.or(row.entry_date).or(row.date) else {
                continue;
            };
            let Ok(date) = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d") else {
                continue;
            };
            let Some(direction) = row.direction.as_deref().and_then(|d| d.parse().ok()) else {
                continue;
            };
            records.push(TradeRecord {
                ticker,
                date,
                direction,
                quantity: row.quantity.unwrap_or(0.0),
                fill_price: row.fill_price.or(row.exit_price),
                commission: row.commission,
            });
        }

        let ledger = Self::from_records(records);
        info!(
            "Loaded {} stock trades across {} tickers",
            ledger.trade_count(),
            ledger.trades_by_ticker.len()
        );
        Ok(ledger)
    }

    pub fn from_records(records: Vec<TradeRecord>) -> Self {
        let mut trades_by_ticker: HashMap<String, Vec<TradeRecord>> = HashMap::new();
        for record in records {
            trades_by_ticker
                .entry(record.ticker.to_uppercase())
                .or_default()
                .push(record);
        }

        let mut timelines = HashMap::new();
        for (ticker, trades) in &trades_by_ticker {
            let signed: Vec<(NaiveDate, f64)> = trades
                .iter()
                .map(|t| (t.date, t.signed_quantity()))
                .collect();
            timelines.insert(ticker.clone(), PositionTimeline::from_trades(signed));
        }

        Self {
            trades_by_ticker,
            timelines,
        }
    }

    pub fn trade_count(&self) -> usize {
        self.trades_by_ticker.values().map(Vec::len).sum()
    }

    pub fn timeline(&self, ledger_ticker: &str) -> Option<&PositionTimeline> {
        self.timelines.get(&ledger_ticker.to_uppercase())
    }

    /// Whether a pick was acted on: a non-flat position on the meeting date
    /// ("held") or at least one fill inside the surrounding window
    /// ("traded"). Held takes precedence in the reported reason.
    pub fn is_acted_on(
        &self,
        normalizer: &TickerNormalizer,
        canonical: &str,
        meeting_date: NaiveDate,
        pre_days: i64,
        post_days: i64,
    ) -> (bool, ActedReason) {
        let candidates = normalizer.ledger_candidates(canonical);

        for candidate in &candidates {
            if let Some(timeline) = self.timeline(candidate) {
                if timeline.position_on(meeting_date).abs() > POSITION_EPSILON {
                    return (true, ActedReason::Held);
                }
            }
        }

        let window_start = meeting_date - Duration::days(pre_days);
        let window_end = meeting_date + Duration::days(post_days);
        for candidate in &candidates {
            if let Some(trades) = self.trades_by_ticker.get(&candidate.to_uppercase()) {
                if trades
                    .iter()
                    .any(|t| t.date >= window_start && t.date <= window_end)
                {
                    return (true, ActedReason::Traded);
                }
            }
        }

        (false, ActedReason::NotActed)
    }

    /// Cumulative share count on a date, via the first ledger candidate
    /// with a non-flat position. Zero when nothing is held.
    pub fn position_shares(
        &self,
        normalizer: &TickerNormalizer,
        canonical: &str,
        date: NaiveDate,
    ) -> f64 {
        for candidate in normalizer.ledger_candidates(canonical) {
            if let Some(timeline) = self.timeline(&candidate) {
                let position = timeline.position_on(date);
                if position.abs() > POSITION_EPSILON {
                    return position;
                }
            }
        }
        0.0
    }

    /// All fills for any candidate spelling inside the window around a
    /// date. Used by the acted-on check and by P&L reconciliation.
    pub fn trades_in_window(
        &self,
        normalizer: &TickerNormalizer,
        canonical: &str,
        center: NaiveDate,
        pre_days: i64,
        post_days: i64,
    ) -> Vec<&TradeRecord> {
        let window_start = center - Duration::days(pre_days);
        let window_end = center + Duration::days(post_days);
        let mut found = Vec::new();
        for candidate in normalizer.ledger_candidates(canonical) {
            if let Some(trades) = self.trades_by_ticker.get(&candidate.to_uppercase()) {
                found.extend(
                    trades
                        .iter()
                        .filter(|t| t.date >= window_start && t.date <= window_end),
                );
            }
        }
        found.sort_by_key(|t| t.date);
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeDirection;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(ticker: &str, d: NaiveDate, direction: TradeDirection, qty: f64) -> TradeRecord {
        TradeRecord {
            ticker: ticker.to_string(),
            date: d,
            direction,
            quantity: qty,
            fill_price: None,
            commission: None,
        }
    }

    #[test]
    fn timeline_accumulates_signed_quantities_in_date_order() {
        let timeline = PositionTimeline::from_trades(vec![
            (date(2024, 2, 1), -40.0),
            (date(2024, 1, 1), 100.0),
            (date(2024, 1, 15), 50.0),
        ]);
        assert_eq!(
            timeline.checkpoints(),
            &[
                (date(2024, 1, 1), 100.0),
                (date(2024, 1, 15), 150.0),
                (date(2024, 2, 1), 110.0),
            ]
        );
    }

    #[test]
    fn timeline_merges_same_day_trades() {
        let timeline = PositionTimeline::from_trades(vec![
            (date(2024, 1, 1), 100.0),
            (date(2024, 1, 1), -30.0),
        ]);
        assert_eq!(timeline.checkpoints(), &[(date(2024, 1, 1), 70.0)]);
    }

    #[test]
    fn position_on_uses_last_checkpoint_at_or_before() {
        let timeline = PositionTimeline::from_trades(vec![
            (date(2024, 1, 1), 100.0),
            (date(2024, 2, 1), -100.0),
        ]);
        assert_eq!(timeline.position_on(date(2023, 12, 31)), 0.0);
        assert_eq!(timeline.position_on(date(2024, 1, 1)), 100.0);
        assert_eq!(timeline.position_on(date(2024, 1, 20)), 100.0);
        assert_eq!(timeline.position_on(date(2024, 2, 1)), 0.0);
        assert_eq!(timeline.position_on(date(2024, 3, 1)), 0.0);
    }

    #[test]
    fn buy_then_sell_moves_position_by_exact_quantities() {
        let timeline = PositionTimeline::from_trades(vec![
            (date(2024, 1, 1), 80.0),
            (date(2024, 1, 10), -25.0),
        ]);
        let checkpoints = timeline.checkpoints();
        assert_eq!(checkpoints[0].1, 80.0);
        assert_eq!(checkpoints[1].1 - checkpoints[0].1, -25.0);
    }

    #[test]
    fn held_position_wins_even_with_empty_window() {
        let normalizer = TickerNormalizer::new();
        let ledger = TradeLedger::from_records(vec![record(
            "NVDA",
            date(2023, 6, 1),
            TradeDirection::Buy,
            100.0,
        )]);
        let (acted, reason) = ledger.is_acted_on(
            &normalizer,
            "NVDA",
            date(2024, 1, 15),
            DEFAULT_PRE_DAYS,
            DEFAULT_POST_DAYS,
        );
        assert!(acted);
        assert_eq!(reason, ActedReason::Held);
    }

    #[test]
    fn trade_in_window_counts_when_flat() {
        let normalizer = TickerNormalizer::new();
        let meeting = date(2024, 1, 15);
        let ledger = TradeLedger::from_records(vec![record(
            "NVDA",
            meeting + Duration::days(2),
            TradeDirection::Buy,
            10.0,
        )]);
        let (acted, reason) =
            ledger.is_acted_on(&normalizer, "NVDA", meeting, DEFAULT_PRE_DAYS, DEFAULT_POST_DAYS);
        assert!(acted);
        assert_eq!(reason, ActedReason::Traded);
    }

    #[test]
    fn no_position_and_no_window_trade_is_not_acted() {
        let normalizer = TickerNormalizer::new();
        let meeting = date(2024, 1, 15);
        let ledger = TradeLedger::from_records(vec![record(
            "NVDA",
            meeting + Duration::days(30),
            TradeDirection::Buy,
            10.0,
        )]);
        let (acted, reason) =
            ledger.is_acted_on(&normalizer, "NVDA", meeting, DEFAULT_PRE_DAYS, DEFAULT_POST_DAYS);
        assert!(!acted);
        assert_eq!(reason, ActedReason::NotActed);
    }

    #[test]
    fn near_zero_residual_is_flat() {
        let normalizer = TickerNormalizer::new();
        let ledger = TradeLedger::from_records(vec![
            record("NVDA", date(2024, 1, 1), TradeDirection::Buy, 100.0),
            record("NVDA", date(2024, 1, 5), TradeDirection::Sell, 99.995),
        ]);
        let (acted, reason) = ledger.is_acted_on(
            &normalizer,
            "NVDA",
            date(2024, 6, 1),
            DEFAULT_PRE_DAYS,
            DEFAULT_POST_DAYS,
        );
        assert!(!acted);
        assert_eq!(reason, ActedReason::NotActed);
    }

    #[test]
    fn ledger_aliases_match_renamed_tickers() {
        let normalizer = TickerNormalizer::new();
        // Ledger still says SQ; the canonical symbol is XYZ after the rename.
        let ledger = TradeLedger::from_records(vec![record(
            "SQ",
            date(2024, 1, 1),
            TradeDirection::Buy,
            50.0,
        )]);
        let (acted, reason) = ledger.is_acted_on(
            &normalizer,
            "XYZ",
            date(2024, 2, 1),
            DEFAULT_PRE_DAYS,
            DEFAULT_POST_DAYS,
        );
        assert!(acted);
        assert_eq!(reason, ActedReason::Held);
        assert_eq!(
            ledger.position_shares(&normalizer, "XYZ", date(2024, 2, 1)),
            50.0
        );
    }

    #[test]
    fn hk_candidates_find_ledger_spellings() {
        let normalizer = TickerNormalizer::new();
        let ledger = TradeLedger::from_records(vec![record(
            "690D",
            date(2024, 1, 1),
            TradeDirection::Buy,
            200.0,
        )]);
        assert_eq!(
            ledger.position_shares(&normalizer, "0690.HK", date(2024, 1, 2)),
            200.0
        );
    }

    #[test]
    fn loads_wrapped_ledger_and_filters_non_stock_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.json");
        std::fs::write(
            &path,
            r#"{"trades": [
                {"ticker": "NVDA", "asset_type": "STK", "direction": "BUY",
                 "quantity": 10, "entry_date": "2024-01-02", "exit_price": 500.0},
                {"ticker": "SPY 240119C00480000", "asset_type": "OPT",
                 "direction": "BUY", "quantity": 1, "entry_date": "2024-01-02"},
                {"ticker": "", "direction": "BUY", "quantity": 5, "entry_date": "2024-01-02"},
                {"ticker": "AMD", "direction": "HOLD", "quantity": 5, "entry_date": "2024-01-02"}
            ]}"#,
        )
        .unwrap();

        let ledger = TradeLedger::load(&path).unwrap();
        assert_eq!(ledger.trade_count(), 1);
        let trades = ledger.trades_in_window(
            &TickerNormalizer::new(),
            "NVDA",
            date(2024, 1, 2),
            0,
            0,
        );
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].fill_price, Some(500.0));
    }
}
