use crate::models::{Bucket, Pick};
use serde::Serialize;
use std::collections::BTreeMap;

/// Mean, median and win rate over the non-null samples of one horizon.
/// All None when the bucket has no priceable sample for that horizon, so
/// "no data" stays distinguishable from "zero average".
#[derive(Debug, Clone, Default, Serialize)]
pub struct WindowStats {
    pub n: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub win_rate: Option<f64>,
    pub excess_mean: Option<f64>,
    pub excess_median: Option<f64>,
    pub excess_win_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OffsetStats {
    pub mean: Option<f64>,
    pub median: Option<f64>,
}

/// Per-bucket summary statistics across all requested horizons.
#[derive(Debug, Clone, Serialize)]
pub struct BucketStats {
    pub bucket: Bucket,
    pub count: usize,
    pub windows: BTreeMap<u32, WindowStats>,
    pub entry_offsets: BTreeMap<u32, OffsetStats>,
}

/// Deterministically bucket every pick and compute per-bucket stats.
/// Pure: no I/O, no mutation of the picks.
pub fn aggregate(picks: &[Pick], windows: &[u32], entry_offsets: &[u32]) -> BTreeMap<Bucket, BucketStats> {
    let mut grouped: BTreeMap<Bucket, Vec<&Pick>> = BTreeMap::new();
    for bucket in Bucket::ALL {
        grouped.insert(bucket, Vec::new());
    }
    for pick in picks {
        grouped
            .entry(Bucket::classify(pick))
            .or_default()
            .push(pick);
    }

    let mut stats = BTreeMap::new();
    for (bucket, members) in grouped {
        let mut window_stats = BTreeMap::new();
        for &window in windows {
            let returns: Vec<f64> = members.iter().filter_map(|p| p.ret(window)).collect();
            let excess: Vec<f64> = members.iter().filter_map(|p| p.excess(window)).collect();
            window_stats.insert(
                window,
                WindowStats {
                    n: returns.len(),
                    mean: mean(&returns),
                    median: median(&returns),
                    win_rate: win_rate(&returns),
                    excess_mean: mean(&excess),
                    excess_median: median(&excess),
                    excess_win_rate: win_rate(&excess),
                },
            );
        }

        let mut offset_stats = BTreeMap::new();
        for &offset in entry_offsets {
            let rets: Vec<f64> = members
                .iter()
                .filter_map(|p| p.entry_offset_ret(offset))
                .collect();
            offset_stats.insert(
                offset,
                OffsetStats {
                    mean: mean(&rets),
                    median: median(&rets),
                },
            );
        }

        stats.insert(
            bucket,
            BucketStats {
                bucket,
                count: members.len(),
                windows: window_stats,
                entry_offsets: offset_stats,
            },
        );
    }
    stats
}

/// Group picks by bucket, preserving input order within each bucket.
pub fn bucketize(picks: &[Pick]) -> BTreeMap<Bucket, Vec<&Pick>> {
    let mut grouped: BTreeMap<Bucket, Vec<&Pick>> = BTreeMap::new();
    for pick in picks {
        grouped
            .entry(Bucket::classify(pick))
            .or_default()
            .push(pick);
    }
    grouped
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn win_rate(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().filter(|v| **v > 0.0).count() as f64 / values.len() as f64)
}

/// Population standard deviation; None below two samples.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sentiment;
    use chrono::NaiveDate;

    fn pick(sentiment: Sentiment, acted: bool, ret30: Option<f64>, excess30: Option<f64>) -> Pick {
        let mut p = Pick::new(
            "T",
            "T",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            sentiment,
            "",
        );
        p.acted_on = acted;
        p.returns.insert(30, ret30);
        p.excess_returns.insert(30, excess30);
        p
    }

    #[test]
    fn every_bucket_is_reported_even_when_empty() {
        let stats = aggregate(&[], &[30], &[0]);
        assert_eq!(stats.len(), 5);
        for bucket_stats in stats.values() {
            assert_eq!(bucket_stats.count, 0);
            let w = &bucket_stats.windows[&30];
            assert_eq!(w.n, 0);
            assert_eq!(w.mean, None);
            assert_eq!(w.win_rate, None);
        }
    }

    #[test]
    fn stats_cover_only_non_null_samples() {
        let picks = vec![
            pick(Sentiment::Bullish, true, Some(0.10), Some(0.05)),
            pick(Sentiment::Bullish, true, Some(-0.02), Some(-0.03)),
            pick(Sentiment::Bullish, true, None, None),
        ];
        let stats = aggregate(&picks, &[30], &[0]);
        let ba = &stats[&Bucket::BullishActed];
        assert_eq!(ba.count, 3);
        let w = &ba.windows[&30];
        assert_eq!(w.n, 2);
        assert!((w.mean.unwrap() - 0.04).abs() < 1e-12);
        assert!((w.win_rate.unwrap() - 0.5).abs() < 1e-12);
        assert!((w.excess_mean.unwrap() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn all_null_bucket_reports_none_not_zero() {
        let picks = vec![
            pick(Sentiment::Bearish, false, None, None),
            pick(Sentiment::Bearish, false, None, None),
        ];
        let stats = aggregate(&picks, &[30], &[0]);
        let bd = &stats[&Bucket::BearishDiscussed];
        assert_eq!(bd.count, 2);
        let w = &bd.windows[&30];
        assert_eq!(w.n, 0);
        assert_eq!(w.mean, None);
        assert_eq!(w.excess_mean, None);
    }

    #[test]
    fn bucketize_partitions_without_loss() {
        let picks = vec![
            pick(Sentiment::Bullish, true, Some(0.1), None),
            pick(Sentiment::Bearish, false, Some(-0.1), None),
            pick(Sentiment::Unknown, false, None, None),
        ];
        let grouped = bucketize(&picks);
        let total: usize = grouped.values().map(Vec::len).sum();
        assert_eq!(total, picks.len());
    }

    #[test]
    fn median_handles_even_and_odd_counts() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }
}
