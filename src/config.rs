use anyhow::{anyhow, Result};
use chrono::NaiveDate;

/// All tunables for one backtest run, grouped the way the pipeline
/// consumes them. `Default` mirrors the documented production settings.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Horizons (calendar days) priced for every pick.
    pub all_windows: Vec<u32>,
    /// Horizons rendered in the report summary tables.
    pub main_windows: Vec<u32>,
    /// Holding horizon for basket-level analyses.
    pub hold_days: u32,
    /// Acted-on window around the meeting date.
    pub pre_days: i64,
    pub post_days: i64,
    /// Entry offsets (calendar days) for the entry-sensitivity check.
    pub entry_offsets: Vec<u32>,
    /// Bounded nearest-price search radius in calendar days.
    pub price_lookup_max_days: i64,
    /// Benchmark and volatility-index symbols for excess returns and
    /// regime conditioning.
    pub benchmark: String,
    pub vol_symbol: String,
    /// Factor-proxy ETFs: market, small-cap, value, growth, momentum.
    pub factor_market: String,
    pub factor_small: String,
    pub factor_value: String,
    pub factor_growth: String,
    pub factor_momentum: String,
    /// Single names stress-tested individually for concentration risk.
    pub whales: Vec<String>,
    pub bootstrap_iterations: usize,
    pub bootstrap_seed: u64,
    /// Upper bound of the price data range; normally today.
    pub as_of: NaiveDate,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            all_windows: vec![1, 3, 7, 14, 21, 30, 45, 60, 90, 180],
            main_windows: vec![7, 30, 90],
            hold_days: 30,
            pre_days: 3,
            post_days: 7,
            entry_offsets: vec![0, 1, 2],
            price_lookup_max_days: 5,
            benchmark: "SPY".to_string(),
            vol_symbol: "^VIX".to_string(),
            factor_market: "SPY".to_string(),
            factor_small: "IWM".to_string(),
            factor_value: "IWD".to_string(),
            factor_growth: "IWF".to_string(),
            factor_momentum: "MTUM".to_string(),
            whales: vec!["PDD".to_string(), "HOOD".to_string(), "META".to_string()],
            bootstrap_iterations: 2000,
            bootstrap_seed: 42,
            as_of: chrono::Utc::now().date_naive(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.all_windows.is_empty() {
            return Err(anyhow!("all_windows must contain at least one horizon"));
        }
        for w in &self.main_windows {
            if !self.all_windows.contains(w) {
                return Err(anyhow!(
                    "main window {}d is not in the priced horizon set",
                    w
                ));
            }
        }
        if !self.all_windows.contains(&self.hold_days) {
            return Err(anyhow!(
                "hold_days {} is not in the priced horizon set",
                self.hold_days
            ));
        }
        if self.pre_days < 0 || self.post_days < 0 {
            return Err(anyhow!("acted-on window days must be non-negative"));
        }
        if self.bootstrap_iterations == 0 {
            return Err(anyhow!("bootstrap_iterations must be positive"));
        }
        if self.benchmark.trim().is_empty() {
            return Err(anyhow!("benchmark symbol must not be empty"));
        }
        Ok(())
    }

    pub fn max_window(&self) -> u32 {
        self.all_windows.iter().copied().max().unwrap_or(0)
    }

    pub fn factor_symbols(&self) -> Vec<String> {
        vec![
            self.factor_market.clone(),
            self.factor_small.clone(),
            self.factor_value.clone(),
            self.factor_growth.clone(),
            self.factor_momentum.clone(),
        ]
    }
}
