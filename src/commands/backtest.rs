use crate::aggregate::aggregate;
use crate::analysis::{bootstrap, newey_west, portfolio, regime};
use crate::commands::{
    build_picks, fetch_regime_series, price_picks, PipelineOptions,
};
use crate::ledger::TradeLedger;
use crate::normalizer::TickerNormalizer;
use crate::prices::ReturnFetcher;
use crate::report::{render_backtest, BacktestAnalyses};
use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;

/// Run the full backtest pipeline and write the Markdown report.
/// Returns the report path.
pub fn run(options: &PipelineOptions) -> Result<PathBuf> {
    options.config.validate()?;
    let normalizer = TickerNormalizer::new();
    let ledger = TradeLedger::load(&options.ledger_path)?;

    let (mut picks, meetings_count) = build_picks(options, &normalizer, &ledger)?;

    let provider = options.provider()?;
    let mut fetcher = ReturnFetcher::new(provider.as_ref(), options.open_cache(), &normalizer);
    price_picks(&mut fetcher, &mut picks, &options.config)?;

    let stats = aggregate(&picks, &options.config.all_windows, &options.config.entry_offsets);

    let (bench_series, vol_series) = fetch_regime_series(&mut fetcher, &picks, &options.config);
    let analyses = BacktestAnalyses {
        portfolio: portfolio::rolling_portfolio(&picks, options.config.hold_days),
        regime: regime::regime_analysis(
            &picks,
            &bench_series,
            &vol_series,
            options.config.hold_days,
        ),
        bootstrap: bootstrap::block_bootstrap(
            &picks,
            options.config.hold_days,
            options.config.bootstrap_iterations,
            options.config.bootstrap_seed,
        ),
        newey_west: newey_west::newey_west(&picks, options.config.hold_days),
    };

    let report = render_backtest(&stats, &picks, meetings_count, &analyses, &options.config);

    fs::create_dir_all(&options.out_dir).with_context(|| {
        format!(
            "failed to create report directory {}",
            options.out_dir.display()
        )
    })?;
    let path = options
        .out_dir
        .join(format!("{}_meeting_backtest.md", options.config.as_of));
    fs::write(&path, report)
        .with_context(|| format!("failed to write report {}", path.display()))?;
    info!("Report written to {}", path.display());
    Ok(path)
}
