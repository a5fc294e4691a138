use crate::analysis::{audit, bootstrap, concentration, costs, factors, newey_west, pnl};
use crate::commands::{build_picks, fetch_factor_series, price_picks, PipelineOptions};
use crate::ledger::TradeLedger;
use crate::normalizer::TickerNormalizer;
use crate::prices::ReturnFetcher;
use crate::report::{render_robustness, RobustnessAnalyses};
use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;

/// Run the robustness suite over the same enriched pick list and write
/// the follow-up report. Returns the report path.
pub fn run(options: &PipelineOptions) -> Result<PathBuf> {
    options.config.validate()?;
    let normalizer = TickerNormalizer::new();
    let ledger = TradeLedger::load(&options.ledger_path)?;

    let (mut picks, meetings_count) = build_picks(options, &normalizer, &ledger)?;

    let provider = options.provider()?;
    let mut fetcher = ReturnFetcher::new(provider.as_ref(), options.open_cache(), &normalizer);
    price_picks(&mut fetcher, &mut picks, &options.config)?;

    let etf_series = fetch_factor_series(&mut fetcher, &picks, &options.config);

    let config = &options.config;
    let analyses = RobustnessAnalyses {
        audit: audit::pipeline_audit(&picks, &config.all_windows),
        concentration: concentration::stress_test(&picks, config),
        bootstrap: bootstrap::block_bootstrap(
            &picks,
            config.hold_days,
            config.bootstrap_iterations,
            config.bootstrap_seed,
        ),
        newey_west: newey_west::newey_west(&picks, config.hold_days),
        factors: factors::factor_regression(&picks, &etf_series, config),
        costs: costs::cost_sensitivity(&picks, config.hold_days),
        pnl: pnl::reconcile(&picks, &ledger, &normalizer, config.hold_days),
    };

    let report = render_robustness(&picks, meetings_count, &analyses, config);

    fs::create_dir_all(&options.out_dir).with_context(|| {
        format!(
            "failed to create report directory {}",
            options.out_dir.display()
        )
    })?;
    let path = options.out_dir.join(format!(
        "{}_meeting_backtest_robustness.md",
        config.as_of
    ));
    fs::write(&path, report)
        .with_context(|| format!("failed to write report {}", path.display()))?;
    info!("Robustness report written to {}", path.display());
    Ok(path)
}
