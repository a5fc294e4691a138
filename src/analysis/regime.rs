use crate::aggregate::{mean, median, win_rate};
use crate::analysis::{AnalysisError, AnalysisResult};
use crate::models::{Pick, Sentiment};
use crate::provider::PriceSeries;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

const MA_PERIOD: usize = 50;
/// How far back to look for the latest trading day at a meeting date.
const LOOKBACK_DAYS: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Regime {
    BenchAboveMa,
    BenchBelowMa,
    VolLow,
    VolHigh,
}

impl Regime {
    pub const ALL: [Regime; 4] = [
        Regime::BenchAboveMa,
        Regime::BenchBelowMa,
        Regime::VolLow,
        Regime::VolHigh,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Regime::BenchAboveMa => "Benchmark > 50D MA",
            Regime::BenchBelowMa => "Benchmark < 50D MA",
            Regime::VolLow => "Vol Low",
            Regime::VolHigh => "Vol High",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegimeRow {
    pub regime: Regime,
    pub total_picks: usize,
    pub bullish_n: usize,
    pub bearish_n: usize,
    pub bullish_excess: Option<f64>,
    pub bullish_win_rate: Option<f64>,
    pub bearish_excess: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegimeAnalysis {
    pub rows: Vec<RegimeRow>,
    pub vol_median: Option<f64>,
}

/// Condition 30-day excess returns on the market environment at each
/// meeting: benchmark above/below its 50-trading-day moving average, and
/// the volatility index above/below its period median. Alpha that only
/// shows up in one regime reads as leveraged beta, not selection skill.
pub fn regime_analysis(
    picks: &[Pick],
    bench: &PriceSeries,
    vol: &PriceSeries,
    window: u32,
) -> AnalysisResult<RegimeAnalysis> {
    if picks.is_empty() {
        return Err(AnalysisError::Insufficient("no picks".to_string()));
    }
    if bench.is_empty() {
        return Err(AnalysisError::Insufficient(
            "no benchmark prices for regime classification".to_string(),
        ));
    }

    let ma = trailing_moving_average(bench, MA_PERIOD);
    let vol_values: Vec<f64> = vol.values().copied().collect();
    let vol_median = median(&vol_values);

    let meeting_dates: Vec<NaiveDate> = {
        let mut dates: Vec<NaiveDate> = picks.iter().map(|p| p.meeting_date).collect();
        dates.sort();
        dates.dedup();
        dates
    };

    let mut above_ma: BTreeMap<NaiveDate, bool> = BTreeMap::new();
    let mut vol_high: BTreeMap<NaiveDate, bool> = BTreeMap::new();
    for &date in &meeting_dates {
        for offset in 0..=LOOKBACK_DAYS {
            let check = date - Duration::days(offset);
            if let (Some(close), Some(ma_value)) = (bench.get(&check), ma.get(&check)) {
                above_ma.insert(date, close > ma_value);
                break;
            }
        }
        if let Some(median_vol) = vol_median {
            for offset in 0..=LOOKBACK_DAYS {
                let check = date - Duration::days(offset);
                if let Some(level) = vol.get(&check) {
                    vol_high.insert(date, *level > median_vol);
                    break;
                }
            }
        }
    }

    let mut rows = Vec::new();
    for regime in Regime::ALL {
        let in_regime = |date: &NaiveDate| -> bool {
            match regime {
                Regime::BenchAboveMa => above_ma.get(date) == Some(&true),
                Regime::BenchBelowMa => above_ma.get(date) == Some(&false),
                Regime::VolLow => vol_high.get(date) == Some(&false),
                Regime::VolHigh => vol_high.get(date) == Some(&true),
            }
        };

        let members: Vec<&Pick> = picks.iter().filter(|p| in_regime(&p.meeting_date)).collect();
        let bullish: Vec<&&Pick> = members
            .iter()
            .filter(|p| p.sentiment == Sentiment::Bullish)
            .collect();
        let bearish: Vec<&&Pick> = members
            .iter()
            .filter(|p| p.sentiment == Sentiment::Bearish)
            .collect();

        let bull_excess: Vec<f64> = bullish.iter().filter_map(|p| p.excess(window)).collect();
        let bear_excess: Vec<f64> = bearish.iter().filter_map(|p| p.excess(window)).collect();

        rows.push(RegimeRow {
            regime,
            total_picks: members.len(),
            bullish_n: bullish.len(),
            bearish_n: bearish.len(),
            bullish_excess: mean(&bull_excess),
            bullish_win_rate: win_rate(&bull_excess),
            bearish_excess: mean(&bear_excess),
        });
    }

    Ok(RegimeAnalysis { rows, vol_median })
}

/// Trailing simple moving average over a sparse daily series, keyed by the
/// date each window completes. Entries appear only once `period` closes
/// have been seen.
fn trailing_moving_average(series: &PriceSeries, period: usize) -> BTreeMap<NaiveDate, f64> {
    let mut out = BTreeMap::new();
    if period == 0 {
        return out;
    }
    let mut window: Vec<f64> = Vec::with_capacity(period);
    let mut sum = 0.0;
    for (date, close) in series {
        window.push(*close);
        sum += *close;
        if window.len() > period {
            sum -= window.remove(0);
        }
        if window.len() == period {
            out.insert(*date, sum / period as f64);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn series_linear(start: NaiveDate, days: i64, base: f64, step: f64) -> PriceSeries {
        (0..days)
            .map(|i| (start + Duration::days(i), base + step * i as f64))
            .collect()
    }

    fn pick(d: NaiveDate, sentiment: Sentiment, excess30: f64) -> Pick {
        let mut p = Pick::new("T", "T", d, sentiment, "");
        p.excess_returns.insert(30, Some(excess30));
        p
    }

    #[test]
    fn moving_average_appears_after_full_window() {
        let series = series_linear(date(2024, 1, 1), 60, 100.0, 1.0);
        let ma = trailing_moving_average(&series, 50);
        assert!(ma.get(&date(2024, 1, 31)).is_none());
        // Window completes on day 50 (index 49).
        let first = ma.get(&date(2024, 2, 19)).copied().unwrap();
        // Mean of 100..=149.
        assert!((first - 124.5).abs() < 1e-9);
    }

    #[test]
    fn rising_market_classifies_above_ma() {
        let start = date(2024, 1, 1);
        let bench = series_linear(start, 200, 100.0, 1.0);
        let vol = series_linear(start, 200, 15.0, 0.05);

        let meeting = start + Duration::days(150);
        let picks = vec![
            pick(meeting, Sentiment::Bullish, 0.05),
            pick(meeting, Sentiment::Bearish, -0.02),
        ];

        let result = regime_analysis(&picks, &bench, &vol, 30).unwrap();
        let above = result
            .rows
            .iter()
            .find(|r| r.regime == Regime::BenchAboveMa)
            .unwrap();
        assert_eq!(above.total_picks, 2);
        assert_eq!(above.bullish_n, 1);
        assert!((above.bullish_excess.unwrap() - 0.05).abs() < 1e-12);

        let below = result
            .rows
            .iter()
            .find(|r| r.regime == Regime::BenchBelowMa)
            .unwrap();
        assert_eq!(below.total_picks, 0);
        assert_eq!(below.bullish_excess, None);
    }

    #[test]
    fn vol_split_uses_period_median() {
        let start = date(2024, 1, 1);
        let bench = series_linear(start, 300, 100.0, 1.0);
        // Vol rises steadily, so late meetings are in the high half.
        let vol = series_linear(start, 300, 10.0, 0.1);

        let early = pick(start + Duration::days(100), Sentiment::Bullish, 0.01);
        let late = pick(start + Duration::days(250), Sentiment::Bullish, 0.09);
        let result = regime_analysis(&[early, late], &bench, &vol, 30).unwrap();

        let low = result
            .rows
            .iter()
            .find(|r| r.regime == Regime::VolLow)
            .unwrap();
        let high = result
            .rows
            .iter()
            .find(|r| r.regime == Regime::VolHigh)
            .unwrap();
        assert_eq!(low.bullish_n, 1);
        assert_eq!(high.bullish_n, 1);
        assert!((low.bullish_excess.unwrap() - 0.01).abs() < 1e-12);
        assert!((high.bullish_excess.unwrap() - 0.09).abs() < 1e-12);
    }

    #[test]
    fn missing_benchmark_is_insufficient() {
        let picks = vec![pick(date(2024, 1, 1), Sentiment::Bullish, 0.0)];
        assert!(regime_analysis(&picks, &PriceSeries::new(), &PriceSeries::new(), 30).is_err());
    }
}
