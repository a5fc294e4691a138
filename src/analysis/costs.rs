use crate::aggregate::{mean, std_dev, win_rate};
use crate::analysis::{bullish_acted_with_excess, AnalysisError, AnalysisResult};
use crate::models::Pick;
use serde::Serialize;
use std::collections::BTreeMap;

const MIN_PICKS: usize = 5;
const BREAKEVEN_SEARCH_MAX_BPS: f64 = 200.0;
const BREAKEVEN_SEARCH_ITERATIONS: usize = 50;

/// Round-trip cost scenarios in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CostScenario {
    Flat10,
    Flat20,
    Flat30,
    Tiered,
}

impl CostScenario {
    pub const ALL: [CostScenario; 4] = [
        CostScenario::Flat10,
        CostScenario::Flat20,
        CostScenario::Flat30,
        CostScenario::Tiered,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CostScenario::Flat10 => "Flat 10bp",
            CostScenario::Flat20 => "Flat 20bp",
            CostScenario::Flat30 => "Flat 30bp",
            CostScenario::Tiered => "Tiered (large 5 / mid 15 / non-US 30 / other 20)",
        }
    }
}

/// Liquid US large caps: tightest spreads, cheapest to trade round trip.
const LARGE_CAP: &[&str] = &[
    "AAPL", "MSFT", "AMZN", "GOOGL", "META", "NVDA", "TSLA", "JPM", "V", "MA", "AVGO", "LLY",
    "WMT", "PG", "HD", "COST", "ORCL", "NFLX", "CRM", "BAC", "INTC", "QCOM", "AMD", "MU", "ASML",
    "TSM", "BABA", "PDD", "NVO", "PM", "PEP", "DIS", "CMCSA", "SBUX", "NKE", "BKNG", "CMG",
    "LULU", "WFC", "AXP", "PYPL", "SCHW", "SPY",
];

const MID_CAP: &[&str] = &[
    "HOOD", "SNAP", "PINS", "COIN", "DECK", "ONON", "RH", "BLDR", "FND", "IBKR", "FUTU", "EXPE",
    "ABNB", "HLT", "POOL", "EL", "STZ", "TJX", "ROST", "DLTR", "LOW", "EFX", "FICO", "MCO",
    "MSCI", "JD", "BIDU", "TCOM", "NTES", "BEKE", "HTHT", "RACE",
];

const NON_US_SUFFIXES: &[&str] = &[".HK", ".T", ".PA", ".L", ".SW", ".SZ", ".SS", ".DE"];

/// Round-trip cost in basis points for a ticker under a scenario.
pub fn cost_bps(ticker: &str, scenario: CostScenario) -> f64 {
    match scenario {
        CostScenario::Flat10 => 10.0,
        CostScenario::Flat20 => 20.0,
        CostScenario::Flat30 => 30.0,
        CostScenario::Tiered => {
            if LARGE_CAP.contains(&ticker) {
                5.0
            } else if MID_CAP.contains(&ticker) {
                15.0
            } else if NON_US_SUFFIXES
                .iter()
                .any(|s| ticker.to_uppercase().ends_with(s))
            {
                30.0
            } else {
                20.0
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub scenario: CostScenario,
    pub n: usize,
    pub mean_excess: Option<f64>,
    pub win_rate: Option<f64>,
    pub sharpe: Option<f64>,
    pub excess_reduction: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostSensitivity {
    pub n: usize,
    pub baseline_mean_excess: f64,
    pub baseline_win_rate: f64,
    pub scenarios: Vec<ScenarioResult>,
    /// Flat round-trip cost at which the mean adjusted excess crosses
    /// zero. Zero when the excess is already non-positive before costs.
    pub breakeven_bps: f64,
    /// Pick counts by tiered cost level.
    pub tiered_distribution: BTreeMap<u32, usize>,
}

/// Apply round-trip cost scenarios to every Bullish+Acted pick's excess
/// return and bisect for the breakeven flat cost.
pub fn cost_sensitivity(picks: &[Pick], window: u32) -> AnalysisResult<CostSensitivity> {
    let bullish_acted: Vec<&Pick> = bullish_acted_with_excess(picks, window);

    if bullish_acted.len() < MIN_PICKS {
        return Err(AnalysisError::Insufficient(format!(
            "only {} bullish+acted picks with excess returns, need >= {}",
            bullish_acted.len(),
            MIN_PICKS
        )));
    }

    let baseline: Vec<f64> = bullish_acted.iter().filter_map(|p| p.excess(window)).collect();
    let baseline_mean = mean(&baseline).expect("non-empty");
    let baseline_wr = win_rate(&baseline).expect("non-empty");

    let mut scenarios = Vec::new();
    for scenario in CostScenario::ALL {
        let adjusted: Vec<f64> = bullish_acted
            .iter()
            .filter_map(|p| {
                p.excess(window)
                    .map(|e| e - cost_bps(&p.ticker, scenario) / 10_000.0)
            })
            .collect();
        let adj_mean = mean(&adjusted);
        let sharpe = match (adj_mean, std_dev(&adjusted)) {
            (Some(m), Some(s)) if s > 0.0 => Some(m / s),
            _ => None,
        };
        scenarios.push(ScenarioResult {
            scenario,
            n: adjusted.len(),
            mean_excess: adj_mean,
            win_rate: win_rate(&adjusted),
            sharpe,
            excess_reduction: adj_mean.map(|m| baseline_mean - m),
        });
    }

    // Bisect the flat cost at which the mean adjusted excess crosses zero.
    // Mean adjustment is linear in the cost, so the crossing is unique.
    let breakeven_bps = if baseline_mean > 0.0 {
        let mut lo = 0.0f64;
        let mut hi = BREAKEVEN_SEARCH_MAX_BPS;
        for _ in 0..BREAKEVEN_SEARCH_ITERATIONS {
            let mid = (lo + hi) / 2.0;
            if baseline_mean - mid / 10_000.0 > 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        (lo + hi) / 2.0
    } else {
        0.0
    };

    let mut tiered_distribution: BTreeMap<u32, usize> = BTreeMap::new();
    for pick in &bullish_acted {
        let bps = cost_bps(&pick.ticker, CostScenario::Tiered) as u32;
        *tiered_distribution.entry(bps).or_default() += 1;
    }

    Ok(CostSensitivity {
        n: bullish_acted.len(),
        baseline_mean_excess: baseline_mean,
        baseline_win_rate: baseline_wr,
        scenarios,
        breakeven_bps,
        tiered_distribution,
    })
}
