use crate::analysis::{group_by_meeting, AnalysisError, AnalysisResult};
use crate::models::{Pick, Sentiment};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::BTreeMap;

const MIN_MEETINGS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct NeweyWest {
    pub mean_excess: f64,
    pub n_meetings: usize,
    pub bandwidth: usize,
    pub ols_se: f64,
    pub nw_se: f64,
    pub se_inflation: Option<f64>,
    pub t_ols: f64,
    pub t_nw: f64,
    pub p_ols: f64,
    pub p_nw: f64,
    pub significant_5pct_ols: bool,
    pub significant_5pct_nw: bool,
    pub significant_10pct_nw: bool,
    /// Residual autocorrelations at lags 1..=min(L, 5).
    pub autocorrelations: BTreeMap<usize, f64>,
}

/// Autocorrelation-robust standard error for the mean per-meeting excess
/// return. Repeated same-direction calls make consecutive meetings
/// correlated, which a plain OLS standard error understates; the Bartlett
/// kernel weights autocovariances up to lag L = floor(N^(1/3)).
pub fn newey_west(picks: &[Pick], window: u32) -> AnalysisResult<NeweyWest> {
    let meetings = group_by_meeting(picks, |p| {
        p.sentiment == Sentiment::Bullish && p.acted_on && p.excess(window).is_some()
    });
    let n = meetings.len();
    if n < MIN_MEETINGS {
        return Err(AnalysisError::Insufficient(format!(
            "only {} meetings with bullish+acted excess returns, need >= {}",
            n, MIN_MEETINGS
        )));
    }

    // Per-meeting mean excess, in date order (BTreeMap keys are sorted).
    let y: Vec<f64> = meetings
        .values()
        .map(|members| {
            let excess: Vec<f64> = members.iter().filter_map(|p| p.excess(window)).collect();
            excess.iter().sum::<f64>() / excess.len() as f64
        })
        .collect();

    let n_f = n as f64;
    let y_bar = y.iter().sum::<f64>() / n_f;
    let residuals: Vec<f64> = y.iter().map(|v| v - y_bar).collect();

    let bandwidth = n_f.cbrt().floor() as usize;

    // gamma(j) = mean of lag-j residual products.
    let mut gamma = vec![0.0; bandwidth + 1];
    for (j, g) in gamma.iter_mut().enumerate() {
        if j < n {
            *g = residuals[..n - j]
                .iter()
                .zip(&residuals[j..])
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / n_f;
        }
    }

    let mut nw_var = gamma[0];
    for j in 1..=bandwidth {
        let weight = 1.0 - j as f64 / (bandwidth as f64 + 1.0); // Bartlett kernel
        nw_var += 2.0 * weight * gamma[j];
    }
    // Clustering can push the plug-in variance negative on tiny samples.
    let nw_se = (nw_var.max(0.0) / n_f).sqrt();

    let sample_var = residuals.iter().map(|r| r * r).sum::<f64>() / (n_f - 1.0);
    let ols_se = (sample_var / n_f).sqrt();

    let t_ols = if ols_se > 0.0 { y_bar / ols_se } else { 0.0 };
    let t_nw = if nw_se > 0.0 { y_bar / nw_se } else { 0.0 };

    let normal = Normal::new(0.0, 1.0).expect("unit normal");
    let p_ols = 2.0 * (1.0 - normal.cdf(t_ols.abs()));
    let p_nw = 2.0 * (1.0 - normal.cdf(t_nw.abs()));

    let mut autocorrelations = BTreeMap::new();
    if gamma[0] > 0.0 {
        for (j, g) in gamma.iter().enumerate().take(bandwidth.min(5) + 1).skip(1) {
            autocorrelations.insert(j, g / gamma[0]);
        }
    }

    Ok(NeweyWest {
        mean_excess: y_bar,
        n_meetings: n,
        bandwidth,
        ols_se,
        nw_se,
        se_inflation: if ols_se > 0.0 { Some(nw_se / ols_se) } else { None },
        t_ols,
        t_nw,
        p_ols,
        p_nw,
        significant_5pct_ols: t_ols.abs() > 1.96,
        significant_5pct_nw: t_nw.abs() > 1.96,
        significant_10pct_nw: t_nw.abs() > 1.645,
        autocorrelations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn picks_from_series(values: &[f64]) -> Vec<Pick> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut p = Pick::new(
                    "T",
                    "T",
                    start + Duration::days(7 * i as i64),
                    Sentiment::Bullish,
                    "",
                );
                p.acted_on = true;
                p.excess_returns.insert(30, Some(*v));
                p
            })
            .collect()
    }

    #[test]
    fn requires_five_meetings() {
        let picks = picks_from_series(&[0.01, 0.02, 0.03, 0.04]);
        assert!(newey_west(&picks, 30).is_err());
    }

    #[test]
    fn bandwidth_is_cube_root_floor() {
        let picks = picks_from_series(&[0.01; 27]);
        // Zero variance: SEs are zero but the bandwidth is still reported.
        let result = newey_west(&picks, 30).unwrap();
        assert_eq!(result.bandwidth, 3);
        let picks8 = picks_from_series(&[0.01, 0.02, 0.01, 0.03, 0.02, 0.01, 0.02, 0.03]);
        assert_eq!(newey_west(&picks8, 30).unwrap().bandwidth, 2);
    }

    #[test]
    fn iid_series_keeps_se_close_to_ols() {
        // Alternating residuals have negative lag-1 autocovariance, so the
        // NW variance shrinks below OLS; either way both stay positive.
        let values = [0.03, -0.01, 0.03, -0.01, 0.03, -0.01, 0.03, -0.01, 0.03];
        let result = newey_west(&picks_from_series(&values), 30).unwrap();
        assert!(result.ols_se > 0.0);
        assert!(result.nw_se >= 0.0);
        assert!(result.nw_se < result.ols_se);
    }

    #[test]
    fn persistent_series_inflates_se() {
        // Strong positive serial correlation: long runs of same-sign
        // residuals. The robust SE must exceed the naive one.
        let values = [
            0.05, 0.05, 0.05, 0.05, 0.05, 0.05, -0.05, -0.05, -0.05, -0.05, -0.05, -0.05, 0.05,
            0.05, 0.05, 0.05, 0.05, 0.05, -0.05, -0.05, -0.05, -0.05, -0.05, -0.05, 0.05, 0.05,
            0.05,
        ];
        let result = newey_west(&picks_from_series(&values), 30).unwrap();
        assert!(
            result.nw_se > result.ols_se,
            "nw_se {} should exceed ols_se {}",
            result.nw_se,
            result.ols_se
        );
        assert!(result.se_inflation.unwrap() > 1.0);
        assert!(result.autocorrelations[&1] > 0.5);
    }

    #[test]
    fn t_stat_and_p_value_are_consistent() {
        let values = [0.02, 0.03, 0.025, 0.018, 0.032, 0.027, 0.022, 0.03];
        let result = newey_west(&picks_from_series(&values), 30).unwrap();
        assert!(result.t_ols > 0.0);
        assert!(result.p_ols < 0.05);
        assert!(result.significant_5pct_ols);
        // p shrinks as |t| grows.
        assert!(result.p_nw <= 1.0 && result.p_nw >= 0.0);
    }

    #[test]
    fn per_meeting_mean_is_used_not_per_pick() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut picks = Vec::new();
        // Five meetings; the first has two picks averaging 0.03.
        for (i, v) in [0.02, 0.01, 0.02, 0.03, 0.02].iter().enumerate() {
            let mut p = Pick::new("A", "A", start + Duration::days(7 * i as i64), Sentiment::Bullish, "");
            p.acted_on = true;
            p.excess_returns.insert(30, Some(*v));
            picks.push(p);
        }
        let mut extra = Pick::new("B", "B", start, Sentiment::Bullish, "");
        extra.acted_on = true;
        extra.excess_returns.insert(30, Some(0.04));
        picks.push(extra);

        let result = newey_west(&picks, 30).unwrap();
        assert_eq!(result.n_meetings, 5);
        let expected = (0.03 + 0.01 + 0.02 + 0.03 + 0.02) / 5.0;
        assert!((result.mean_excess - expected).abs() < 1e-12);
    }
}
