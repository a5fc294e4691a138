use crate::aggregate::{mean, win_rate};
use crate::analysis::bootstrap::placebo_percentile;
use crate::analysis::portfolio::rolling_portfolio;
use crate::analysis::{AnalysisError, AnalysisResult};
use crate::config::RunConfig;
use crate::models::{Pick, Sentiment};
use serde::Serialize;

const PLACEBO_ITERATIONS: usize = 500;
const MIN_BULLISH_ACTED: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioMetrics {
    pub name: String,
    pub excluded: Vec<String>,
    pub n_bullish_acted: usize,
    pub ba_excess_30: Option<f64>,
    pub ba_win_rate_30: Option<f64>,
    pub ba_excess_90: Option<f64>,
    pub bd_excess_30: Option<f64>,
    pub bootstrap_percentile: Option<f64>,
    pub sharpe: Option<f64>,
    pub excess_sharpe: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConcentrationStress {
    pub scenarios: Vec<ScenarioMetrics>,
    pub top_contributors: Vec<String>,
    /// True when some exclusion kills most of the baseline excess: the
    /// aggregate alpha then rests on a handful of outsized winners.
    pub fragile: bool,
}

/// Recompute the headline Bullish+Acted statistics after excluding the
/// single largest contributor, each configured whale name, the first two
/// whales jointly, and the top-3 contributors as a group.
pub fn stress_test(picks: &[Pick], config: &RunConfig) -> AnalysisResult<ConcentrationStress> {
    let baseline = compute_metrics("Baseline", &[], picks, config);
    if baseline.n_bullish_acted < MIN_BULLISH_ACTED {
        return Err(AnalysisError::Insufficient(format!(
            "only {} bullish+acted picks, need >= {}",
            baseline.n_bullish_acted, MIN_BULLISH_ACTED
        )));
    }

    // Top contributors by 30d excess, deduplicated by ticker.
    let mut ranked: Vec<&Pick> = picks
        .iter()
        .filter(|p| p.sentiment == Sentiment::Bullish && p.acted_on && p.excess(30).is_some())
        .collect();
    ranked.sort_by(|a, b| {
        b.excess(30)
            .partial_cmp(&a.excess(30))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut top_contributors: Vec<String> = Vec::new();
    for pick in &ranked {
        if !top_contributors.contains(&pick.ticker) {
            top_contributors.push(pick.ticker.clone());
        }
        if top_contributors.len() == 3 {
            break;
        }
    }

    let mut scenarios = vec![baseline];

    if let Some(largest) = top_contributors.first() {
        scenarios.push(exclusion_scenario(
            &format!("Ex-{}", largest),
            std::slice::from_ref(largest),
            picks,
            config,
        ));
    }

    for whale in &config.whales {
        if scenarios.iter().any(|s| s.excluded == [whale.clone()]) {
            continue;
        }
        scenarios.push(exclusion_scenario(
            &format!("Ex-{}", whale),
            std::slice::from_ref(whale),
            picks,
            config,
        ));
    }

    if config.whales.len() >= 2 {
        let pair = &config.whales[..2];
        scenarios.push(exclusion_scenario(
            &format!("Ex-{}+{}", pair[0], pair[1]),
            pair,
            picks,
            config,
        ));
    }

    if !top_contributors.is_empty() {
        scenarios.push(exclusion_scenario(
            &format!("Ex-Top3 ({})", top_contributors.join(",")),
            &top_contributors,
            picks,
            config,
        ));
    }

    let baseline_excess = scenarios[0].ba_excess_30.unwrap_or(0.0);
    let fragile = baseline_excess > 0.0
        && scenarios.iter().skip(1).any(|s| {
            s.ba_excess_30
                .map(|e| e < 0.0 || e < baseline_excess * 0.3)
                .unwrap_or(false)
        });

    Ok(ConcentrationStress {
        scenarios,
        top_contributors,
        fragile,
    })
}

fn exclusion_scenario(
    name: &str,
    excluded: &[String],
    picks: &[Pick],
    config: &RunConfig,
) -> ScenarioMetrics {
    let filtered: Vec<Pick> = picks
        .iter()
        .filter(|p| !excluded.contains(&p.ticker))
        .cloned()
        .collect();
    compute_metrics(name, excluded, &filtered, config)
}

fn compute_metrics(
    name: &str,
    excluded: &[String],
    picks: &[Pick],
    config: &RunConfig,
) -> ScenarioMetrics {
    let bullish_acted: Vec<&Pick> = picks
        .iter()
        .filter(|p| p.sentiment == Sentiment::Bullish && p.acted_on)
        .collect();
    let bullish_discussed: Vec<&Pick> = picks
        .iter()
        .filter(|p| p.sentiment == Sentiment::Bullish && !p.acted_on)
        .collect();

    let ba_excess_30: Vec<f64> = bullish_acted.iter().filter_map(|p| p.excess(30)).collect();
    let ba_excess_90: Vec<f64> = bullish_acted.iter().filter_map(|p| p.excess(90)).collect();
    let bd_excess_30: Vec<f64> = bullish_discussed
        .iter()
        .filter_map(|p| p.excess(30))
        .collect();

    let bootstrap_percentile = if ba_excess_30.len() >= MIN_BULLISH_ACTED {
        let pool: Vec<f64> = picks.iter().filter_map(|p| p.excess(30)).collect();
        mean(&ba_excess_30).and_then(|actual| {
            placebo_percentile(
                &pool,
                ba_excess_30.len(),
                actual,
                PLACEBO_ITERATIONS,
                config.bootstrap_seed,
            )
        })
    } else {
        None
    };

    let (sharpe, excess_sharpe) = match rolling_portfolio(picks, config.hold_days) {
        Ok(portfolio) => (Some(portfolio.sharpe), portfolio.excess_sharpe),
        Err(_) => (None, None),
    };

    ScenarioMetrics {
        name: name.to_string(),
        excluded: excluded.to_vec(),
        n_bullish_acted: bullish_acted.len(),
        ba_excess_30: mean(&ba_excess_30),
        ba_win_rate_30: win_rate(&ba_excess_30),
        ba_excess_90: mean(&ba_excess_90),
        bd_excess_30: mean(&bd_excess_30),
        bootstrap_percentile,
        sharpe,
        excess_sharpe,
    }
}
