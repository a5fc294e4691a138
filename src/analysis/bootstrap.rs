use crate::analysis::{
    group_by_meeting, percentile_rank, percentile_value, AnalysisError, AnalysisResult,
};
use crate::models::{Pick, Sentiment};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

const MIN_MEETINGS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct BlockBootstrap {
    pub actual_excess: f64,
    pub n_meetings: usize,
    pub n_picks: usize,
    pub n_iterations: usize,
    /// Meeting-level resampling, respecting within-meeting correlation.
    pub block_ci_90: (f64, f64),
    pub block_ci_95: (f64, f64),
    pub block_se: f64,
    pub block_percentile: f64,
    /// Pick-level resampling shown side by side; its CI understates the
    /// uncertainty whenever picks within a meeting co-move.
    pub naive_ci_95: (f64, f64),
    pub naive_se: f64,
    pub ci_width_ratio: Option<f64>,
    pub zero_in_ci_90: bool,
    pub zero_in_ci_95: bool,
}

/// Resample whole meetings with replacement and recompute the
/// Bullish+Acted mean excess each iteration. Individual picks from one
/// meeting share market conditions and analyst state, so meeting dates are
/// the independent sampling unit, not picks.
pub fn block_bootstrap(
    picks: &[Pick],
    window: u32,
    iterations: usize,
    seed: u64,
) -> AnalysisResult<BlockBootstrap> {
    let meetings = group_by_meeting(picks, |p| {
        p.sentiment == Sentiment::Bullish && p.acted_on && p.excess(window).is_some()
    });
    let n_meetings = meetings.len();
    if n_meetings < MIN_MEETINGS {
        return Err(AnalysisError::Insufficient(format!(
            "only {} meetings with bullish+acted picks, need >= {}",
            n_meetings, MIN_MEETINGS
        )));
    }

    let meeting_excess: Vec<Vec<f64>> = meetings
        .values()
        .map(|members| members.iter().filter_map(|p| p.excess(window)).collect())
        .collect();
    let all_excess: Vec<f64> = meeting_excess.iter().flatten().copied().collect();
    let n_picks = all_excess.len();
    let actual_excess = all_excess.iter().sum::<f64>() / n_picks as f64;

    let mut rng = StdRng::seed_from_u64(seed);

    let mut block_means = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        let mut sum = 0.0;
        let mut count = 0usize;
        for _ in 0..n_meetings {
            let sampled = &meeting_excess[rng.gen_range(0..n_meetings)];
            sum += sampled.iter().sum::<f64>();
            count += sampled.len();
        }
        if count > 0 {
            block_means.push(sum / count as f64);
        }
    }
    block_means.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut naive_means = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        let mut sum = 0.0;
        for _ in 0..n_picks {
            sum += all_excess[rng.gen_range(0..n_picks)];
        }
        naive_means.push(sum / n_picks as f64);
    }
    naive_means.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let block_ci_95 = (
        percentile_value(&block_means, 2.5),
        percentile_value(&block_means, 97.5),
    );
    let block_ci_90 = (
        percentile_value(&block_means, 5.0),
        percentile_value(&block_means, 95.0),
    );
    let naive_ci_95 = (
        percentile_value(&naive_means, 2.5),
        percentile_value(&naive_means, 97.5),
    );

    let block_width = block_ci_95.1 - block_ci_95.0;
    let naive_width = naive_ci_95.1 - naive_ci_95.0;
    let ci_width_ratio = if naive_width > 0.0 {
        Some(block_width / naive_width)
    } else {
        None
    };

    Ok(BlockBootstrap {
        actual_excess,
        n_meetings,
        n_picks,
        n_iterations: iterations,
        block_ci_90,
        block_ci_95,
        block_se: sample_std(&block_means),
        block_percentile: percentile_rank(&block_means, actual_excess),
        naive_ci_95,
        naive_se: sample_std(&naive_means),
        ci_width_ratio,
        zero_in_ci_90: block_ci_90.0 <= 0.0 && 0.0 <= block_ci_90.1,
        zero_in_ci_95: block_ci_95.0 <= 0.0 && 0.0 <= block_ci_95.1,
    })
}

/// Percentile of an observed bucket mean within means of random samples of
/// the same size drawn from the whole pick pool. Used by the concentration
/// stress test to show how exclusions move the placebo ranking.
pub fn placebo_percentile(
    pool: &[f64],
    sample_size: usize,
    actual: f64,
    iterations: usize,
    seed: u64,
) -> Option<f64> {
    if pool.is_empty() || sample_size == 0 {
        return None;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut means = Vec::with_capacity(iterations);
    for _ in 0..iterations {
        let mut sum = 0.0;
        for _ in 0..sample_size {
            sum += pool[rng.gen_range(0..pool.len())];
        }
        means.push(sum / sample_size as f64);
    }
    means.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(percentile_rank(&means, actual))
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn pick(date: NaiveDate, excess30: f64) -> Pick {
        let mut p = Pick::new("T", "T", date, Sentiment::Bullish, "");
        p.acted_on = true;
        p.excess_returns.insert(30, Some(excess30));
        p
    }

    /// Synthetic dataset where picks within a meeting are perfectly
    /// correlated (identical excess) but meetings are independent.
    fn clustered_picks() -> Vec<Pick> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let meeting_levels = [0.08, -0.05, 0.12, 0.02, -0.09, 0.15, 0.01, -0.03];
        let mut picks = Vec::new();
        for (i, level) in meeting_levels.iter().enumerate() {
            let date = start + Duration::days(7 * i as i64);
            for _ in 0..6 {
                picks.push(pick(date, *level));
            }
        }
        picks
    }

    #[test]
    fn requires_five_meetings() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let picks: Vec<Pick> = (0..4)
            .map(|i| pick(start + Duration::days(7 * i), 0.01))
            .collect();
        assert!(block_bootstrap(&picks, 30, 200, 42).is_err());
    }

    #[test]
    fn block_ci_is_wider_than_naive_on_clustered_data() {
        let picks = clustered_picks();
        let result = block_bootstrap(&picks, 30, 1000, 42).unwrap();

        let block_width = result.block_ci_95.1 - result.block_ci_95.0;
        let naive_width = result.naive_ci_95.1 - result.naive_ci_95.0;
        assert!(
            block_width > naive_width,
            "block CI [{:.4}, {:.4}] should be wider than naive [{:.4}, {:.4}]",
            result.block_ci_95.0,
            result.block_ci_95.1,
            result.naive_ci_95.0,
            result.naive_ci_95.1
        );
        assert!(result.ci_width_ratio.unwrap() > 1.0);
        assert!(result.block_se > result.naive_se);
    }

    #[test]
    fn deterministic_under_fixed_seed() {
        let picks = clustered_picks();
        let a = block_bootstrap(&picks, 30, 500, 7).unwrap();
        let b = block_bootstrap(&picks, 30, 500, 7).unwrap();
        assert_eq!(a.block_ci_95, b.block_ci_95);
        assert_eq!(a.naive_ci_95, b.naive_ci_95);
        assert_eq!(a.block_percentile, b.block_percentile);
    }

    #[test]
    fn actual_mean_matches_pooled_mean() {
        let picks = clustered_picks();
        let result = block_bootstrap(&picks, 30, 200, 42).unwrap();
        let expected = [0.08, -0.05, 0.12, 0.02, -0.09, 0.15, 0.01, -0.03]
            .iter()
            .sum::<f64>()
            / 8.0;
        assert!((result.actual_excess - expected).abs() < 1e-12);
        assert_eq!(result.n_picks, 48);
        assert_eq!(result.n_meetings, 8);
    }

    #[test]
    fn placebo_percentile_ranks_strong_results_high() {
        let pool: Vec<f64> = (0..200).map(|i| (i as f64 - 100.0) / 1000.0).collect();
        let high = placebo_percentile(&pool, 20, 0.08, 500, 42).unwrap();
        let low = placebo_percentile(&pool, 20, -0.08, 500, 42).unwrap();
        assert!(high > 95.0);
        assert!(low < 5.0);
        assert_eq!(placebo_percentile(&[], 5, 0.0, 100, 42), None);
    }
}
