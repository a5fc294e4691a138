use crate::aggregate::{mean, median};
use crate::analysis::{AnalysisError, AnalysisResult};
use crate::ledger::TradeLedger;
use crate::models::{Pick, Sentiment, TradeDirection};
use crate::normalizer::TickerNormalizer;
use chrono::NaiveDate;
use serde::Serialize;

/// Ledger search window around the meeting date: fills up to 30 days
/// before (position building ahead of the meeting) and 90 days after.
const SEARCH_PRE_DAYS: i64 = 30;
const SEARCH_POST_DAYS: i64 = 90;
const MIN_PAIRS_FOR_CORRELATION: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct MatchedTrade {
    pub ticker: String,
    pub meeting_date: NaiveDate,
    pub backtest_return: f64,
    pub actual_return: Option<f64>,
    /// Actual minus backtest, when both legs priced.
    pub diff: Option<f64>,
    pub avg_buy_price: Option<f64>,
    pub avg_sell_price: Option<f64>,
    pub backtest_base_price: Option<f64>,
    /// Actual entry vs the backtest's assumed close.
    pub slippage: Option<f64>,
    pub commission_bps: f64,
    pub n_buys: usize,
    pub n_sells: usize,
    pub first_buy_date: Option<NaiveDate>,
    pub last_sell_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnmatchedPick {
    pub ticker: String,
    pub meeting_date: NaiveDate,
    pub backtest_return: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PnlReconciliation {
    pub n_matched: usize,
    pub n_with_both_returns: usize,
    pub n_unmatched: usize,
    pub mean_backtest_return: Option<f64>,
    pub mean_actual_return: Option<f64>,
    pub mean_diff: Option<f64>,
    pub median_diff: Option<f64>,
    pub mean_slippage: Option<f64>,
    pub mean_commission_bps: Option<f64>,
    /// Pearson correlation between theoretical and realized returns,
    /// reported from five comparable pairs up.
    pub correlation: Option<f64>,
    pub matched: Vec<MatchedTrade>,
    pub unmatched: Vec<UnmatchedPick>,
}

/// Compare each Bullish+Acted pick's theoretical return against the
/// fills actually booked in the ledger: quantity-weighted average entry
/// and exit, realized return, entry slippage and commission drag.
pub fn reconcile(
    picks: &[Pick],
    ledger: &TradeLedger,
    normalizer: &TickerNormalizer,
    window: u32,
) -> AnalysisResult<PnlReconciliation> {
    let bullish_acted: Vec<&Pick> = picks
        .iter()
        .filter(|p| p.sentiment == Sentiment::Bullish && p.acted_on && p.ret(window).is_some())
        .collect();

    if bullish_acted.is_empty() {
        return Err(AnalysisError::Insufficient(
            "no bullish+acted picks with priced returns".to_string(),
        ));
    }

    let mut matched = Vec::new();
    let mut unmatched = Vec::new();

    for pick in &bullish_acted {
        let backtest_return = pick.ret(window).expect("filtered above");
        let fills = ledger.trades_in_window(
            normalizer,
            &pick.ticker,
            pick.meeting_date,
            SEARCH_PRE_DAYS,
            SEARCH_POST_DAYS,
        );
        if fills.is_empty() {
            unmatched.push(UnmatchedPick {
                ticker: pick.ticker.clone(),
                meeting_date: pick.meeting_date,
                backtest_return,
            });
            continue;
        }

        let buys: Vec<_> = fills
            .iter()
            .filter(|t| t.direction == TradeDirection::Buy)
            .collect();
        let sells: Vec<_> = fills
            .iter()
            .filter(|t| t.direction == TradeDirection::Sell)
            .collect();

        let buy_qty: f64 = buys.iter().map(|t| t.quantity).sum();
        let sell_qty: f64 = sells.iter().map(|t| t.quantity).sum();
        let buy_cost: f64 = buys
            .iter()
            .filter_map(|t| t.fill_price.map(|p| p * t.quantity))
            .sum();
        let sell_proceeds: f64 = sells
            .iter()
            .filter_map(|t| t.fill_price.map(|p| p * t.quantity))
            .sum();

        let avg_buy_price = if buy_qty > 0.0 && buy_cost > 0.0 {
            Some(buy_cost / buy_qty)
        } else {
            None
        };
        let avg_sell_price = if sell_qty > 0.0 && sell_proceeds > 0.0 {
            Some(sell_proceeds / sell_qty)
        } else {
            None
        };

        let actual_return = match (avg_buy_price, avg_sell_price) {
            (Some(buy), Some(sell)) if buy > 0.0 => Some((sell - buy) / buy),
            _ => None,
        };

        let total_commission: f64 = fills.iter().filter_map(|t| t.commission.map(f64::abs)).sum();
        let commission_bps = if buy_cost > 0.0 {
            total_commission / buy_cost * 10_000.0
        } else {
            0.0
        };

        let slippage = match (avg_buy_price, pick.base_price) {
            (Some(fill), Some(base)) if base > 0.0 => Some((fill - base) / base),
            _ => None,
        };

        matched.push(MatchedTrade {
            ticker: pick.ticker.clone(),
            meeting_date: pick.meeting_date,
            backtest_return,
            actual_return,
            diff: actual_return.map(|a| a - backtest_return),
            avg_buy_price,
            avg_sell_price,
            backtest_base_price: pick.base_price,
            slippage,
            commission_bps,
            n_buys: buys.len(),
            n_sells: sells.len(),
            first_buy_date: buys.first().map(|t| t.date),
            last_sell_date: sells.last().map(|t| t.date),
        });
    }

    let mut backtest_returns = Vec::new();
    let mut actual_returns = Vec::new();
    let mut diffs = Vec::new();
    for m in matched.iter().filter(|m| m.actual_return.is_some()) {
        backtest_returns.push(m.backtest_return);
        actual_returns.push(m.actual_return.expect("filtered above"));
        if let Some(diff) = m.diff {
            diffs.push(diff);
        }
    }
    let n_with_both = backtest_returns.len();
    let slippages: Vec<f64> = matched.iter().filter_map(|m| m.slippage).collect();
    let commissions: Vec<f64> = matched.iter().map(|m| m.commission_bps).collect();

    let correlation = if n_with_both >= MIN_PAIRS_FOR_CORRELATION {
        pearson(&actual_returns, &backtest_returns)
    } else {
        None
    };

    // Largest discrepancies first, for the report detail table.
    matched.sort_by(|a, b| {
        let a_diff = a.diff.map(f64::abs).unwrap_or(0.0);
        let b_diff = b.diff.map(f64::abs).unwrap_or(0.0);
        b_diff.partial_cmp(&a_diff).unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(PnlReconciliation {
        n_matched: matched.len(),
        n_with_both_returns: n_with_both,
        n_unmatched: unmatched.len(),
        mean_backtest_return: mean(&backtest_returns),
        mean_actual_return: mean(&actual_returns),
        mean_diff: mean(&diffs),
        median_diff: median(&diffs),
        mean_slippage: mean(&slippages),
        mean_commission_bps: mean(&commissions),
        correlation,
        matched,
        unmatched,
    })
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}
