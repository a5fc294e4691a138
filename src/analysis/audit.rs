use crate::aggregate::{mean, median};
use crate::analysis::{AnalysisError, AnalysisResult};
use crate::models::{Pick, Sentiment};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;

const AUDIT_HORIZON: u32 = 90;
const DISCREPANCY_THRESHOLD: f64 = 0.001;
const MAX_DISCREPANCIES: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct PoolSummary {
    pub n: usize,
    pub mean_excess: Option<f64>,
    pub median_excess: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Discrepancy {
    pub ticker: String,
    pub meeting_date: NaiveDate,
    pub decay_excess: f64,
    pub sim_excess: f64,
    pub diff: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineAudit {
    /// All bullish+acted picks with a priced 90d excess return.
    pub decay_pool: PoolSummary,
    /// Checkpoint-exit simulation over the 30d-filtered pool.
    pub sim_pool: PoolSummary,
    pub sim_input_n: usize,
    pub only_in_decay: usize,
    pub only_in_sim: usize,
    pub common: usize,
    pub discrepancies: Vec<Discrepancy>,
    pub root_cause: String,
}

/// Reconcile the 90-day excess return as seen by the decay curve against
/// the same figure produced by a checkpoint-exit simulation. The two
/// modules filter different pools and price the benchmark leg differently,
/// so their headline numbers legitimately diverge; this audit quantifies
/// by how much and for which picks.
pub fn pipeline_audit(picks: &[Pick], checkpoints: &[u32]) -> AnalysisResult<PipelineAudit> {
    let bullish_acted: Vec<&Pick> = picks
        .iter()
        .filter(|p| p.sentiment == Sentiment::Bullish && p.acted_on)
        .collect();
    if bullish_acted.is_empty() {
        return Err(AnalysisError::Insufficient(
            "no bullish+acted picks".to_string(),
        ));
    }

    let decay_pool: Vec<&&Pick> = bullish_acted
        .iter()
        .filter(|p| p.excess(AUDIT_HORIZON).is_some())
        .collect();
    let decay_values: Vec<f64> = decay_pool
        .iter()
        .filter_map(|p| p.excess(AUDIT_HORIZON))
        .collect();

    let sim_input: Vec<&&Pick> = bullish_acted
        .iter()
        .filter(|p| p.ret(30).is_some())
        .collect();

    let mut sorted_checkpoints: Vec<u32> = checkpoints.to_vec();
    sorted_checkpoints.sort_unstable();

    // Time-stop exit at the first checkpoint past the audit horizon, else
    // the last priced checkpoint before it. The benchmark leg always uses
    // the 90d benchmark return, as the decay curve does on its side.
    let mut sim_exits: Vec<(&Pick, f64)> = Vec::new();
    for pick in &sim_input {
        let mut exit_return = None;
        for &day in &sorted_checkpoints {
            if day >= AUDIT_HORIZON {
                if let Some(r) = pick.ret(day) {
                    exit_return = Some(r);
                    break;
                }
            }
        }
        if exit_return.is_none() {
            for &day in sorted_checkpoints.iter().rev() {
                if day <= AUDIT_HORIZON {
                    if let Some(r) = pick.ret(day) {
                        exit_return = Some(r);
                        break;
                    }
                }
            }
        }
        if let Some(r) = exit_return {
            let bench = pick.bench_ret(AUDIT_HORIZON).unwrap_or(0.0);
            sim_exits.push((**pick, r - bench));
        }
    }
    let sim_values: Vec<f64> = sim_exits.iter().map(|(_, e)| *e).collect();

    let decay_keys: BTreeSet<(String, NaiveDate)> = decay_pool
        .iter()
        .map(|p| (p.ticker.clone(), p.meeting_date))
        .collect();
    let sim_keys: BTreeSet<(String, NaiveDate)> = sim_input
        .iter()
        .map(|p| (p.ticker.clone(), p.meeting_date))
        .collect();
    let common: Vec<&(String, NaiveDate)> = decay_keys.intersection(&sim_keys).collect();

    let mut discrepancies = Vec::new();
    for pick in &decay_pool {
        let key = (pick.ticker.clone(), pick.meeting_date);
        if !sim_keys.contains(&key) {
            continue;
        }
        let Some((_, sim_excess)) = sim_exits
            .iter()
            .find(|(p, _)| p.ticker == pick.ticker && p.meeting_date == pick.meeting_date)
        else {
            continue;
        };
        let decay_excess = pick.excess(AUDIT_HORIZON).expect("filtered above");
        let diff = decay_excess - sim_excess;
        if diff.abs() > DISCREPANCY_THRESHOLD {
            discrepancies.push(Discrepancy {
                ticker: pick.ticker.clone(),
                meeting_date: pick.meeting_date,
                decay_excess,
                sim_excess: *sim_excess,
                diff,
            });
        }
    }
    discrepancies.sort_by(|a, b| {
        b.diff
            .abs()
            .partial_cmp(&a.diff.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    discrepancies.truncate(MAX_DISCREPANCIES);

    Ok(PipelineAudit {
        decay_pool: PoolSummary {
            n: decay_pool.len(),
            mean_excess: mean(&decay_values),
            median_excess: median(&decay_values),
        },
        sim_pool: PoolSummary {
            n: sim_exits.len(),
            mean_excess: mean(&sim_values),
            median_excess: median(&sim_values),
        },
        sim_input_n: sim_input.len(),
        only_in_decay: decay_keys.difference(&sim_keys).count(),
        only_in_sim: sim_keys.difference(&decay_keys).count(),
        common: common.len(),
        discrepancies,
        root_cause: "The simulation filters to picks with a priced 30d return and exits at \
                     the first checkpoint at or past 90d, falling back to the last priced \
                     checkpoint before it; the decay curve requires a priced 90d excess. \
                     Different pools plus a benchmark leg fixed at the 90d horizon while \
                     exits may land elsewhere account for the divergence."
            .to_string(),
    })
}
