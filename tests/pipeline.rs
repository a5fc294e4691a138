use anyhow::Result;
use chrono::{Duration, NaiveDate};
use pickaudit::aggregate::aggregate;
use pickaudit::analysis::portfolio::rolling_portfolio;
use pickaudit::commands::{backtest, build_picks, robustness, PipelineOptions};
use pickaudit::config::RunConfig;
use pickaudit::ledger::TradeLedger;
use pickaudit::models::{ActedReason, Bucket, Sentiment};
use pickaudit::normalizer::TickerNormalizer;
use pickaudit::prices::{PriceCache, ReturnFetcher};
use pickaudit::provider::StaticPriceProvider;
use std::fs;
use std::path::Path;
use std::sync::Once;
use tempfile::TempDir;

fn ensure_test_env() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn write_note(dir: &Path, name: &str, created: &str, ticker: &str, hint: &str) {
    let text = format!(
        "---\ncreated: {created}\ntickers: [{ticker}]\n---\n\n## ${ticker}\n\n### Action Hints\n\n{hint}\n"
    );
    fs::write(dir.join(name), text).unwrap();
}

fn write_ledger(path: &Path, rows: &str) {
    fs::write(path, format!("{{\"trades\": [{rows}]}}")).unwrap();
}

struct Workspace {
    _tmp: TempDir,
    options: PipelineOptions,
}

fn two_meeting_workspace() -> Workspace {
    ensure_test_env();
    let tmp = TempDir::new().unwrap();
    let notes_dir = tmp.path().join("notes");
    fs::create_dir_all(&notes_dir).unwrap();

    // Meeting A: bullish on XYZ while holding it. Meeting B a month
    // later: bearish on the same name, flat and untraded.
    write_note(
        &notes_dir,
        "meeting 2024-01-01.md",
        "2024-01-01",
        "XYZ",
        "Plan to accumulate, still undervalued.",
    );
    write_note(
        &notes_dir,
        "meeting 2024-02-01.md",
        "2024-02-01",
        "XYZ",
        "Now overvalued, avoid adding.",
    );

    let ledger_path = tmp.path().join("trades.json");
    write_ledger(
        &ledger_path,
        r#"{"ticker": "XYZ", "direction": "BUY", "quantity": 100, "entry_date": "2023-06-01", "exit_price": 48.0},
           {"ticker": "XYZ", "direction": "SELL", "quantity": 100, "entry_date": "2024-01-10", "exit_price": 55.0}"#,
    );

    let options = PipelineOptions {
        notes_dir,
        ledger_path,
        cache_path: None,
        out_dir: tmp.path().join("reports"),
        use_cache: true,
        offline: true,
        config: RunConfig {
            as_of: date(2024, 12, 31),
            ..RunConfig::default()
        },
    };
    Workspace { _tmp: tmp, options }
}

/// Prices backing the two-meeting scenario: XYZ at 50 on the first
/// meeting, 60 thirty days later, 54 thirty days after the second
/// meeting; benchmark flat so excess equals the raw return.
fn scenario_provider() -> StaticPriceProvider {
    let mut provider = StaticPriceProvider::new();
    provider.insert("XYZ", date(2024, 1, 1), 50.0);
    provider.insert("XYZ", date(2024, 1, 31), 60.0);
    provider.insert("XYZ", date(2024, 2, 1), 60.0);
    provider.insert("XYZ", date(2024, 3, 2), 54.0);
    for offset in 0..430 {
        provider.insert("SPY", date(2023, 11, 1) + Duration::days(offset), 400.0);
    }
    provider
}

#[test]
fn two_meeting_scenario_buckets_and_returns() -> Result<()> {
    let ws = two_meeting_workspace();
    let normalizer = TickerNormalizer::new();
    let ledger = TradeLedger::load(&ws.options.ledger_path)?;

    let (mut picks, meetings) = build_picks(&ws.options, &normalizer, &ledger)?;
    assert_eq!(meetings, 2);
    assert_eq!(picks.len(), 2);

    let provider = scenario_provider();
    let mut fetcher = ReturnFetcher::new(&provider, PriceCache::ephemeral(), &normalizer);
    fetcher.batch_fetch(&mut picks, &ws.options.config)?;

    let pick_a = picks
        .iter()
        .find(|p| p.meeting_date == date(2024, 1, 1))
        .unwrap();
    assert_eq!(pick_a.sentiment, Sentiment::Bullish);
    assert!(pick_a.acted_on);
    assert_eq!(pick_a.acted_reason, ActedReason::Held);
    assert_eq!(pick_a.position_shares, 100.0);
    assert_eq!(Bucket::classify(pick_a), Bucket::BullishActed);
    assert!((pick_a.ret(30).unwrap() - 0.20).abs() < 1e-12);
    // Benchmark is flat, so the excess equals the raw return.
    assert!((pick_a.excess(30).unwrap() - 0.20).abs() < 1e-12);

    let pick_b = picks
        .iter()
        .find(|p| p.meeting_date == date(2024, 2, 1))
        .unwrap();
    assert_eq!(pick_b.sentiment, Sentiment::Bearish);
    assert!(!pick_b.acted_on);
    assert_eq!(pick_b.acted_reason, ActedReason::NotActed);
    assert_eq!(Bucket::classify(pick_b), Bucket::BearishDiscussed);
    assert!((pick_b.ret(30).unwrap() - (-0.10)).abs() < 1e-12);

    // One bullish basket only: the rolling portfolio must refuse to
    // report rather than print a degenerate Sharpe.
    let portfolio = rolling_portfolio(&picks, ws.options.config.hold_days);
    assert!(portfolio.is_err());

    let stats = aggregate(
        &picks,
        &ws.options.config.main_windows,
        &ws.options.config.entry_offsets,
    );
    let ba = &stats[&Bucket::BullishActed];
    assert_eq!(ba.count, 1);
    assert!((ba.windows[&30].mean.unwrap() - 0.20).abs() < 1e-12);
    let bd = &stats[&Bucket::BearishDiscussed];
    assert_eq!(bd.count, 1);
    assert!((bd.windows[&30].mean.unwrap() - (-0.10)).abs() < 1e-12);
    // The three untouched buckets stay empty.
    assert_eq!(stats[&Bucket::BullishDiscussed].count, 0);
    assert_eq!(stats[&Bucket::BearishActed].count, 0);
    assert_eq!(stats[&Bucket::NeutralUnknown].count, 0);
    Ok(())
}

#[test]
fn offline_run_without_prices_still_writes_a_full_report() -> Result<()> {
    let ws = two_meeting_workspace();
    let path = backtest::run(&ws.options)?;
    let report = fs::read_to_string(&path)?;

    // Every section is present even though nothing could be priced.
    for heading in [
        "## Summary",
        "## Rolling Portfolio Simulation",
        "## Cluster-Robust Bootstrap",
        "## Newey-West Standard Errors",
        "## Missing Data",
        "## Full Detail",
    ] {
        assert!(report.contains(heading), "missing {heading}");
    }
    assert!(report.contains("insufficient data"));
    // Both picks surface as unpriced rather than silently vanishing.
    assert!(report.contains("2 mentions could not be priced"));
    Ok(())
}

/// Pre-warm the on-disk cache, then run the full pipeline offline: the
/// cache is the only price source, which also proves the cache-first
/// path end to end.
fn warm_cache(cache_path: &Path, symbols: &[(&str, f64)]) {
    let mut cache = PriceCache::load(cache_path);
    let start = date(2023, 6, 1);
    let end = date(2025, 6, 1);
    for (symbol, base) in symbols {
        let mut series = pickaudit::provider::PriceSeries::new();
        for offset in 0..=(end - start).num_days() {
            let d = start + Duration::days(offset);
            // Gentle drift so returns differ across meetings.
            let price = base * (1.0 + 0.0004 * offset as f64);
            series.insert(d, price);
        }
        cache.store_series(symbol, series, start, end);
    }
    cache.save().unwrap();
}

fn many_meeting_workspace() -> Workspace {
    ensure_test_env();
    let tmp = TempDir::new().unwrap();
    let notes_dir = tmp.path().join("notes");
    fs::create_dir_all(&notes_dir).unwrap();

    let tickers = ["AAPL", "MSFT", "NVDA", "AMD", "HOOD", "PDD"];
    let mut ledger_rows = Vec::new();
    for i in 0..8 {
        let meeting = date(2024, 1, 8) + Duration::days(14 * i);
        let ticker = tickers[i as usize % tickers.len()];
        write_note(
            &notes_dir,
            &format!("meeting {meeting}.md"),
            &meeting.to_string(),
            ticker,
            "Plan to accumulate, still undervalued.",
        );
        ledger_rows.push(format!(
            r#"{{"ticker": "{ticker}", "direction": "BUY", "quantity": 50, "entry_date": "{}", "exit_price": 100.0, "commission": 1.0}}"#,
            meeting + Duration::days(2)
        ));
    }

    let ledger_path = tmp.path().join("trades.json");
    write_ledger(&ledger_path, &ledger_rows.join(",\n"));

    let cache_path = tmp.path().join("price_cache.json");
    warm_cache(
        &cache_path,
        &[
            ("AAPL", 180.0),
            ("MSFT", 400.0),
            ("NVDA", 600.0),
            ("AMD", 150.0),
            ("HOOD", 12.0),
            ("PDD", 120.0),
            ("SPY", 480.0),
            ("^VIX", 15.0),
            ("IWM", 200.0),
            ("IWD", 160.0),
            ("IWF", 310.0),
            ("MTUM", 180.0),
        ],
    );

    let options = PipelineOptions {
        notes_dir,
        ledger_path,
        cache_path: Some(cache_path),
        out_dir: tmp.path().join("reports"),
        use_cache: true,
        offline: true,
        config: RunConfig {
            as_of: date(2025, 6, 1),
            bootstrap_iterations: 300,
            ..RunConfig::default()
        },
    };
    Workspace { _tmp: tmp, options }
}

#[test]
fn cached_offline_backtest_prices_every_pick() -> Result<()> {
    let ws = many_meeting_workspace();
    let path = backtest::run(&ws.options)?;
    let report = fs::read_to_string(&path)?;

    assert!(report.contains("All picks were priced at every summary window."));
    // Eight bullish baskets clear the rolling-portfolio minimum.
    assert!(report.contains("### Baskets"));
    // Every pick was bought within the window while flat, so the whole
    // population lands in Bullish + Acted On.
    assert!(report.contains("| Bullish + Acted On | 8 |"));
    Ok(())
}

#[test]
fn robustness_report_runs_from_the_same_workspace() -> Result<()> {
    let ws = many_meeting_workspace();
    let path = robustness::run(&ws.options)?;
    let report = fs::read_to_string(&path)?;

    for heading in [
        "## Executive Summary",
        "## Pipeline Audit",
        "## Concentration Stress Test",
        "## Transaction Cost Sensitivity",
        "## Real P&L Reconciliation",
        "## Scorecard",
    ] {
        assert!(report.contains(heading), "missing {heading}");
    }
    // Drifting prices produce a positive excess over the slower-drifting
    // benchmark is not guaranteed; but the cost section must always show
    // a concrete breakeven figure.
    assert!(report.contains("### Breakeven:"));
    // All eight picks were matched to ledger fills.
    assert!(report.contains("- Matched to fills: **8**"));
    Ok(())
}

#[test]
fn repeat_run_reuses_the_cache_file() -> Result<()> {
    let ws = many_meeting_workspace();
    backtest::run(&ws.options)?;
    let cache_path = ws.options.cache_path.as_ref().unwrap();
    let before = fs::metadata(cache_path)?.len();

    // Second run is served from the cache; the file stays intact.
    backtest::run(&ws.options)?;
    let after = fs::metadata(cache_path)?.len();
    assert_eq!(before, after);
    Ok(())
}
