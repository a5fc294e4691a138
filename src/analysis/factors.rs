use crate::aggregate::mean;
use crate::analysis::{group_by_meeting, AnalysisError, AnalysisResult};
use crate::config::RunConfig;
use crate::models::{Pick, Sentiment};
use crate::prices::nearest_price;
use crate::provider::PriceSeries;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

const MIN_OBSERVATIONS: usize = 10;
const FACTOR_NAMES: [&str; 5] = ["Alpha", "MKT", "SMB", "HML", "UMD"];

#[derive(Debug, Clone, Serialize)]
pub struct FactorLoading {
    pub name: String,
    pub coef: f64,
    pub se: f64,
    pub t_stat: f64,
    pub significant_5pct: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FactorRegression {
    pub n_observations: usize,
    pub loadings: Vec<FactorLoading>,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub ann_alpha: f64,
    pub residual_std: f64,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

impl FactorRegression {
    pub fn loading(&self, name: &str) -> Option<&FactorLoading> {
        self.loadings.iter().find(|l| l.name == name)
    }
}

/// Regress basket-level 30-day portfolio returns on ETF-proxy factors:
/// MKT (benchmark), SMB (small-cap ETF minus benchmark), HML (value ETF
/// minus growth ETF), UMD (momentum ETF minus benchmark). The intercept is
/// the per-period alpha left after factor exposures.
pub fn factor_regression(
    picks: &[Pick],
    etf_series: &HashMap<String, PriceSeries>,
    config: &RunConfig,
) -> AnalysisResult<FactorRegression> {
    let meetings = group_by_meeting(picks, |p| {
        p.sentiment == Sentiment::Bullish && p.acted_on && p.ret(config.hold_days).is_some()
    });
    if meetings.len() < MIN_OBSERVATIONS {
        return Err(AnalysisError::Insufficient(format!(
            "only {} meetings with bullish+acted returns, need >= {}",
            meetings.len(),
            MIN_OBSERVATIONS
        )));
    }

    let forward = |symbol: &str, base: NaiveDate| -> Option<f64> {
        let series = etf_series.get(symbol)?;
        let base_price = nearest_price(series, base, config.price_lookup_max_days)?;
        let future = nearest_price(
            series,
            base + Duration::days(config.hold_days as i64),
            config.price_lookup_max_days,
        )?;
        if base_price > 0.0 {
            Some((future - base_price) / base_price)
        } else {
            None
        }
    };

    let mut y = Vec::new();
    let mut rows: Vec<[f64; 5]> = Vec::new();
    let mut dates = Vec::new();
    for (date, members) in &meetings {
        let rets: Vec<f64> = members
            .iter()
            .filter_map(|p| p.ret(config.hold_days))
            .collect();
        let Some(portfolio_ret) = mean(&rets) else {
            continue;
        };

        let mkt = forward(&config.factor_market, *date);
        let small = forward(&config.factor_small, *date);
        let value = forward(&config.factor_value, *date);
        let growth = forward(&config.factor_growth, *date);
        let momentum = forward(&config.factor_momentum, *date);
        let (Some(mkt), Some(small), Some(value), Some(growth), Some(momentum)) =
            (mkt, small, value, growth, momentum)
        else {
            continue;
        };

        y.push(portfolio_ret);
        rows.push([1.0, mkt, small - mkt, value - growth, momentum - mkt]);
        dates.push(*date);
    }

    let n = y.len();
    if n < MIN_OBSERVATIONS {
        return Err(AnalysisError::Insufficient(format!(
            "only {} joint portfolio/factor observations, need >= {}",
            n, MIN_OBSERVATIONS
        )));
    }

    let k = 5usize;
    // Normal equations: (X'X) beta = X'y.
    let mut xtx = [[0.0f64; 5]; 5];
    let mut xty = [0.0f64; 5];
    for (row, &target) in rows.iter().zip(&y) {
        for i in 0..k {
            xty[i] += row[i] * target;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    let xtx_inv = invert(&xtx).ok_or_else(|| {
        AnalysisError::Insufficient("singular factor design matrix".to_string())
    })?;
    let mut beta = [0.0f64; 5];
    for i in 0..k {
        for j in 0..k {
            beta[i] += xtx_inv[i][j] * xty[j];
        }
    }

    let residuals: Vec<f64> = rows
        .iter()
        .zip(&y)
        .map(|(row, &target)| {
            let fitted: f64 = row.iter().zip(&beta).map(|(x, b)| x * b).sum();
            target - fitted
        })
        .collect();

    let ss_res: f64 = residuals.iter().map(|r| r * r).sum();
    let y_mean = y.iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
    let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };
    let adj_r_squared = if n > k {
        1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / (n - k) as f64
    } else {
        0.0
    };

    let mse = if n > k { ss_res / (n - k) as f64 } else { 0.0 };
    let mut loadings = Vec::with_capacity(k);
    for i in 0..k {
        let se = (mse * xtx_inv[i][i]).max(0.0).sqrt();
        let t_stat = if se > 0.0 { beta[i] / se } else { 0.0 };
        loadings.push(FactorLoading {
            name: FACTOR_NAMES[i].to_string(),
            coef: beta[i],
            se,
            t_stat,
            significant_5pct: t_stat.abs() > 2.0,
        });
    }

    let periods_per_year = 365.25 / config.hold_days as f64;
    let residual_std =
        (residuals.iter().map(|r| r * r).sum::<f64>() / n as f64).sqrt();

    Ok(FactorRegression {
        n_observations: n,
        ann_alpha: beta[0] * periods_per_year,
        loadings,
        r_squared,
        adj_r_squared,
        residual_std,
        first_date: *dates.first().expect("non-empty"),
        last_date: *dates.last().expect("non-empty"),
    })
}

/// Gauss-Jordan inverse with partial pivoting. Returns None when the
/// matrix is singular to working precision.
fn invert(matrix: &[[f64; 5]; 5]) -> Option<[[f64; 5]; 5]> {
    const N: usize = 5;
    let mut a = *matrix;
    let mut inv = [[0.0f64; N]; N];
    for (i, row) in inv.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for col in 0..N {
        let mut pivot = col;
        for row in col + 1..N {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        inv.swap(col, pivot);

        let scale = a[col][col];
        for j in 0..N {
            a[col][j] /= scale;
            inv[col][j] /= scale;
        }
        for row in 0..N {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..N {
                a[row][j] -= factor * a[col][j];
                inv[row][j] -= factor * inv[col][j];
            }
        }
    }
    Some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn flat_config() -> RunConfig {
        RunConfig {
            as_of: date(2025, 12, 31),
            ..RunConfig::default()
        }
    }

    /// Price path with a sine wiggle so 30-day forward returns vary by
    /// date, keeping the factor design matrix well conditioned.
    fn wiggly_series(start: NaiveDate, days: i64, base: f64, amp: f64, phase: f64) -> PriceSeries {
        (0..days)
            .map(|i| {
                let t = i as f64;
                let price = base * (1.0 + 0.0005 * t) + amp * (t / 17.0 + phase).sin();
                (start + Duration::days(i), price)
            })
            .collect()
    }

    fn bullish_acted(d: NaiveDate, ret30: f64) -> Pick {
        let mut p = Pick::new("T", "T", d, Sentiment::Bullish, "");
        p.acted_on = true;
        p.returns.insert(30, Some(ret30));
        p
    }

    fn etf_universe(start: NaiveDate, days: i64) -> HashMap<String, PriceSeries> {
        let mut etfs = HashMap::new();
        etfs.insert("SPY".to_string(), wiggly_series(start, days, 400.0, 12.0, 0.0));
        etfs.insert("IWM".to_string(), wiggly_series(start, days, 200.0, 9.0, 1.3));
        etfs.insert("IWD".to_string(), wiggly_series(start, days, 150.0, 6.0, 2.1));
        etfs.insert("IWF".to_string(), wiggly_series(start, days, 300.0, 8.0, 3.4));
        etfs.insert("MTUM".to_string(), wiggly_series(start, days, 180.0, 7.0, 4.7));
        etfs
    }

    fn forward_30d(series: &PriceSeries, base: NaiveDate) -> f64 {
        let b = nearest_price(series, base, 5).unwrap();
        let f = nearest_price(series, base + Duration::days(30), 5).unwrap();
        (f - b) / b
    }

    #[test]
    fn invert_recovers_identity() {
        let mut m = [[0.0; 5]; 5];
        for (i, row) in m.iter_mut().enumerate() {
            row[i] = 2.0;
        }
        let inv = invert(&m).unwrap();
        for (i, row) in inv.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                let expected = if i == j { 0.5 } else { 0.0 };
                assert!((v - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let m = [[1.0; 5]; 5];
        assert!(invert(&m).is_none());
    }

    #[test]
    fn requires_ten_joint_observations() {
        let start = date(2024, 1, 1);
        let etfs = etf_universe(start - Duration::days(10), 400);
        let picks: Vec<Pick> = (0..6)
            .map(|i| bullish_acted(start + Duration::days(7 * i), 0.03))
            .collect();
        assert!(factor_regression(&picks, &etfs, &flat_config()).is_err());
    }

    #[test]
    fn pure_market_exposure_recovers_beta_one_and_the_alpha() {
        let start = date(2024, 1, 1);
        let series_start = start - Duration::days(10);
        let etfs = etf_universe(series_start, 400);

        // Portfolio return = market return + 3% every period: the solver
        // must load MKT at ~1 and put the 3% into the intercept.
        let spy = etfs.get("SPY").unwrap().clone();
        let picks: Vec<Pick> = (0..16)
            .map(|i| {
                let d = start + Duration::days(7 * i);
                bullish_acted(d, forward_30d(&spy, d) + 0.03)
            })
            .collect();

        let result = factor_regression(&picks, &etfs, &flat_config()).unwrap();
        assert_eq!(result.n_observations, 16);
        let alpha = result.loading("Alpha").unwrap();
        let mkt = result.loading("MKT").unwrap();
        assert!((alpha.coef - 0.03).abs() < 1e-6, "alpha {}", alpha.coef);
        assert!((mkt.coef - 1.0).abs() < 1e-5, "beta {}", mkt.coef);
        assert!(result.r_squared > 0.999);
        let expected_ann = 0.03 * 365.25 / 30.0;
        assert!((result.ann_alpha - expected_ann).abs() < 1e-4);
    }

    #[test]
    fn missing_factor_leg_drops_the_observation() {
        let start = date(2024, 1, 1);
        let mut etfs = etf_universe(start - Duration::days(10), 400);
        etfs.remove("MTUM");
        let picks: Vec<Pick> = (0..12)
            .map(|i| bullish_acted(start + Duration::days(7 * i), 0.05))
            .collect();
        let err = factor_regression(&picks, &etfs, &flat_config()).unwrap_err();
        assert!(err.to_string().contains("insufficient data"));
    }
}
