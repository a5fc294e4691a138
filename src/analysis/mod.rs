pub mod audit;
pub mod bootstrap;
pub mod concentration;
pub mod costs;
pub mod factors;
pub mod newey_west;
pub mod pnl;
pub mod portfolio;
pub mod regime;

use crate::models::{Pick, Sentiment};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;

/// Every sub-analysis checks its own minimum-sample precondition and
/// returns this instead of a statistic computed on too few points.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("insufficient data: {0}")]
    Insufficient(String),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Bullish picks that were acted on and have an excess return at the
/// given horizon: the headline population for the robustness suite.
pub fn bullish_acted_with_excess(picks: &[Pick], window: u32) -> Vec<&Pick> {
    picks
        .iter()
        .filter(|p| p.sentiment == Sentiment::Bullish && p.acted_on && p.excess(window).is_some())
        .collect()
}

/// Group picks by meeting date, keeping only those the filter accepts.
pub fn group_by_meeting<'a, F>(picks: &'a [Pick], keep: F) -> BTreeMap<NaiveDate, Vec<&'a Pick>>
where
    F: Fn(&Pick) -> bool,
{
    let mut groups: BTreeMap<NaiveDate, Vec<&Pick>> = BTreeMap::new();
    for pick in picks.iter().filter(|p| keep(p)) {
        groups.entry(pick.meeting_date).or_default().push(pick);
    }
    groups
}

/// Empirical percentile of a value within a sorted sample, in percent.
pub fn percentile_rank(sorted: &[f64], value: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let below = sorted.iter().filter(|v| **v < value).count();
    below as f64 / sorted.len() as f64 * 100.0
}

/// Value at a percentile of a sorted sample (nearest-rank with linear
/// interpolation between neighbors).
pub fn percentile_value(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let weight = rank - lo as f64;
    sorted[lo] * (1.0 - weight) + sorted[hi] * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pick(date: NaiveDate, sentiment: Sentiment, acted: bool, excess30: Option<f64>) -> Pick {
        let mut p = Pick::new("T", "T", date, sentiment, "");
        p.acted_on = acted;
        p.excess_returns.insert(30, excess30);
        p
    }

    #[test]
    fn headline_population_filters_sentiment_action_and_nulls() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let picks = vec![
            pick(d, Sentiment::Bullish, true, Some(0.1)),
            pick(d, Sentiment::Bullish, true, None),
            pick(d, Sentiment::Bullish, false, Some(0.1)),
            pick(d, Sentiment::Bearish, true, Some(0.1)),
        ];
        assert_eq!(bullish_acted_with_excess(&picks, 30).len(), 1);
    }

    #[test]
    fn percentile_value_interpolates() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile_value(&sorted, 0.0), 1.0);
        assert_eq!(percentile_value(&sorted, 100.0), 5.0);
        assert_eq!(percentile_value(&sorted, 50.0), 3.0);
        assert!((percentile_value(&sorted, 25.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn percentile_rank_counts_strictly_below() {
        let sorted = vec![-0.1, 0.0, 0.1, 0.2];
        assert_eq!(percentile_rank(&sorted, 0.15), 75.0);
        assert_eq!(percentile_rank(&sorted, -1.0), 0.0);
    }
}
