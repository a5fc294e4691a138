use crate::aggregate::{mean, median};
use crate::analysis::{group_by_meeting, AnalysisError, AnalysisResult};
use crate::models::{Pick, Sentiment};
use chrono::NaiveDate;
use serde::Serialize;

const MIN_BASKETS: usize = 3;

/// One equal-weight bet: all bullish picks of a single meeting, held for
/// the configured horizon.
#[derive(Debug, Clone, Serialize)]
pub struct BasketReturn {
    pub date: NaiveDate,
    pub mean_return: f64,
    pub mean_excess: Option<f64>,
    pub n_picks: usize,
}

/// Portfolio-level statistics over the chronological basket sequence,
/// compounded as non-overlapping sequential trades.
#[derive(Debug, Clone, Serialize)]
pub struct RollingPortfolio {
    pub baskets: Vec<BasketReturn>,
    pub total_return: f64,
    pub total_excess: f64,
    pub ann_return: f64,
    pub ann_vol: f64,
    pub sharpe: f64,
    pub excess_sharpe: Option<f64>,
    pub max_drawdown: f64,
    pub max_drawdown_excess: f64,
    pub win_rate: f64,
    pub mean_basket_return: f64,
    pub median_basket_return: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
    pub avg_picks_per_basket: f64,
    pub years: f64,
}

/// Simulate the rolling equal-weight portfolio: one basket per meeting
/// date from its bullish picks, holding `hold_days`. Needs at least three
/// baskets with priced returns.
pub fn rolling_portfolio(picks: &[Pick], hold_days: u32) -> AnalysisResult<RollingPortfolio> {
    let meetings = group_by_meeting(picks, |p| p.sentiment == Sentiment::Bullish);
    if meetings.is_empty() {
        return Err(AnalysisError::Insufficient("no bullish picks".to_string()));
    }

    let mut baskets: Vec<BasketReturn> = Vec::new();
    for (date, members) in &meetings {
        let rets: Vec<f64> = members.iter().filter_map(|p| p.ret(hold_days)).collect();
        let excess: Vec<f64> = members.iter().filter_map(|p| p.excess(hold_days)).collect();
        if let Some(mean_return) = mean(&rets) {
            baskets.push(BasketReturn {
                date: *date,
                mean_return,
                mean_excess: mean(&excess),
                n_picks: rets.len(),
            });
        }
    }

    if baskets.len() < MIN_BASKETS {
        return Err(AnalysisError::Insufficient(format!(
            "only {} baskets with priced returns, need >= {}",
            baskets.len(),
            MIN_BASKETS
        )));
    }

    let rets: Vec<f64> = baskets.iter().map(|b| b.mean_return).collect();
    let excess: Vec<f64> = baskets.iter().filter_map(|b| b.mean_excess).collect();

    // Compounded equity curve with peak-to-trough drawdown, raw and excess.
    let mut cum = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut max_dd = 0.0_f64;
    let mut cum_excess = 1.0_f64;
    let mut peak_excess = 1.0_f64;
    let mut max_dd_excess = 0.0_f64;
    for basket in &baskets {
        cum *= 1.0 + basket.mean_return;
        peak = peak.max(cum);
        max_dd = max_dd.min((cum - peak) / peak);

        if let Some(e) = basket.mean_excess {
            cum_excess *= 1.0 + e;
            peak_excess = peak_excess.max(cum_excess);
            max_dd_excess = max_dd_excess.min((cum_excess - peak_excess) / peak_excess);
        }
    }
    let total_return = cum - 1.0;
    let total_excess = cum_excess - 1.0;

    let first = baskets.first().map(|b| b.date).expect("non-empty");
    let last = baskets.last().map(|b| b.date).expect("non-empty");
    let years = ((last - first).num_days() as f64 / 365.25).max(0.1);
    let baskets_per_year = rets.len() as f64 / years;

    let mean_ret = mean(&rets).expect("non-empty");
    let std_ret =
        (rets.iter().map(|r| (r - mean_ret).powi(2)).sum::<f64>() / rets.len() as f64).sqrt();

    let ann_return = (1.0 + total_return).powf(1.0 / years) - 1.0;
    let ann_vol = std_ret * baskets_per_year.sqrt();
    let sharpe = if ann_vol > 0.0 { ann_return / ann_vol } else { 0.0 };

    let excess_sharpe = if excess.is_empty() {
        None
    } else {
        let mean_excess = mean(&excess).expect("non-empty");
        let std_excess = (excess.iter().map(|e| (e - mean_excess).powi(2)).sum::<f64>()
            / excess.len() as f64)
            .sqrt();
        let ann_excess_vol = std_excess * baskets_per_year.sqrt();
        let ann_excess = (1.0 + total_excess).powf(1.0 / years) - 1.0;
        if ann_excess_vol > 0.0 {
            Some(ann_excess / ann_excess_vol)
        } else {
            Some(0.0)
        }
    };

    let (skewness, excess_kurtosis) = if rets.len() > 2 && std_ret > 0.0 {
        let n = rets.len() as f64;
        let skew = rets.iter().map(|r| (r - mean_ret).powi(3)).sum::<f64>()
            / (n * std_ret.powi(3));
        let kurt = rets.iter().map(|r| (r - mean_ret).powi(4)).sum::<f64>()
            / (n * std_ret.powi(4))
            - 3.0;
        (skew, kurt)
    } else {
        (0.0, 0.0)
    };

    let win_rate = rets.iter().filter(|r| **r > 0.0).count() as f64 / rets.len() as f64;
    let avg_picks_per_basket =
        baskets.iter().map(|b| b.n_picks as f64).sum::<f64>() / baskets.len() as f64;

    Ok(RollingPortfolio {
        total_return,
        total_excess,
        ann_return,
        ann_vol,
        sharpe,
        excess_sharpe,
        max_drawdown: max_dd,
        max_drawdown_excess: max_dd_excess,
        win_rate,
        mean_basket_return: mean_ret,
        median_basket_return: median(&rets).expect("non-empty"),
        skewness,
        excess_kurtosis,
        avg_picks_per_basket,
        years,
        baskets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bullish(d: NaiveDate, ret30: f64, excess30: f64) -> Pick {
        let mut p = Pick::new("T", "T", d, Sentiment::Bullish, "");
        p.returns.insert(30, Some(ret30));
        p.excess_returns.insert(30, Some(excess30));
        p
    }

    #[test]
    fn needs_at_least_three_baskets() {
        let picks = vec![
            bullish(date(2024, 1, 1), 0.1, 0.05),
            bullish(date(2024, 2, 1), 0.1, 0.05),
        ];
        let err = rolling_portfolio(&picks, 30).unwrap_err();
        assert!(err.to_string().contains("insufficient data"));
    }

    #[test]
    fn single_bullish_basket_is_insufficient() {
        // Two picks but one meeting date: still one basket.
        let picks = vec![
            bullish(date(2024, 1, 1), 0.1, 0.05),
            bullish(date(2024, 1, 1), 0.2, 0.15),
        ];
        assert!(rolling_portfolio(&picks, 30).is_err());
    }

    #[test]
    fn compounds_baskets_multiplicatively() {
        let picks = vec![
            bullish(date(2024, 1, 1), 0.10, 0.05),
            bullish(date(2024, 2, 1), 0.20, 0.10),
            bullish(date(2024, 3, 1), -0.10, -0.05),
        ];
        let result = rolling_portfolio(&picks, 30).unwrap();
        let expected = 1.10_f64 * 1.20 * 0.90 - 1.0;
        assert!((result.total_return - expected).abs() < 1e-12);
        assert_eq!(result.baskets.len(), 3);
        assert!((result.win_rate - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn drawdown_is_peak_to_trough_on_compounded_curve() {
        let picks = vec![
            bullish(date(2024, 1, 1), 0.10, 0.0),
            bullish(date(2024, 2, 1), -0.20, 0.0),
            bullish(date(2024, 3, 1), 0.05, 0.0),
        ];
        let result = rolling_portfolio(&picks, 30).unwrap();
        assert!((result.max_drawdown - (-0.20)).abs() < 1e-12);
    }

    #[test]
    fn equal_weights_within_a_meeting() {
        let mut picks = vec![
            bullish(date(2024, 1, 1), 0.10, 0.0),
            bullish(date(2024, 1, 1), 0.30, 0.0),
            bullish(date(2024, 2, 1), 0.0, 0.0),
            bullish(date(2024, 3, 1), 0.0, 0.0),
        ];
        // A null-return pick in the basket must not drag the mean.
        let mut null_pick = bullish(date(2024, 1, 1), 0.0, 0.0);
        null_pick.returns.insert(30, None);
        null_pick.excess_returns.insert(30, None);
        picks.push(null_pick);

        let result = rolling_portfolio(&picks, 30).unwrap();
        let first = &result.baskets[0];
        assert_eq!(first.n_picks, 2);
        assert!((first.mean_return - 0.20).abs() < 1e-12);
    }

    #[test]
    fn bearish_picks_never_enter_baskets() {
        let mut bearish = Pick::new("T", "T", date(2024, 1, 1), Sentiment::Bearish, "");
        bearish.returns.insert(30, Some(-0.5));
        let picks = vec![
            bearish,
            bullish(date(2024, 2, 1), 0.1, 0.0),
            bullish(date(2024, 3, 1), 0.1, 0.0),
            bullish(date(2024, 4, 1), 0.1, 0.0),
        ];
        let result = rolling_portfolio(&picks, 30).unwrap();
        assert_eq!(result.baskets.len(), 3);
        assert!(result.baskets.iter().all(|b| b.mean_return > 0.0));
    }
}
