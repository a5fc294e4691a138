pub mod backtest;
pub mod robustness;

use crate::config::RunConfig;
use crate::ledger::TradeLedger;
use crate::models::Pick;
use crate::normalizer::TickerNormalizer;
use crate::parser::NotesParser;
use crate::prices::{PriceCache, ReturnFetcher};
use crate::provider::{HttpPriceProvider, PriceProvider, PriceSeries, StaticPriceProvider};
use crate::sentiment::KeywordClassifier;
use anyhow::Result;
use chrono::Duration;
use log::info;
use std::collections::HashMap;
use std::path::PathBuf;

/// Lookback for the benchmark moving average ahead of the first meeting.
const REGIME_WARMUP_DAYS: i64 = 120;

/// Everything a pipeline run needs from the outside world.
pub struct PipelineOptions {
    pub notes_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub cache_path: Option<PathBuf>,
    pub out_dir: PathBuf,
    /// false drops the on-disk cache before fetching.
    pub use_cache: bool,
    /// true skips all network calls; unpriced legs surface as missing data.
    pub offline: bool,
    pub config: RunConfig,
}

impl PipelineOptions {
    pub fn provider(&self) -> Result<Box<dyn PriceProvider>> {
        if self.offline {
            info!("Offline run: price lookups limited to the local cache");
            Ok(Box::new(StaticPriceProvider::new()))
        } else {
            Ok(Box::new(HttpPriceProvider::new()?))
        }
    }

    pub fn open_cache(&self) -> PriceCache {
        let mut cache = match &self.cache_path {
            Some(path) => PriceCache::load(path),
            None => PriceCache::ephemeral(),
        };
        if !self.use_cache {
            cache.invalidate();
        }
        cache
    }
}

/// Parse every meeting document, normalize tickers, and tag each pick
/// with its acted-on status from the ledger. Returns the enriched picks
/// and the number of meetings seen.
pub fn build_picks(
    options: &PipelineOptions,
    normalizer: &TickerNormalizer,
    ledger: &TradeLedger,
) -> Result<(Vec<Pick>, usize)> {
    let classifier = KeywordClassifier::new();
    let parser = NotesParser::new(normalizer, &classifier);
    let documents = NotesParser::load_documents(&options.notes_dir)?;
    info!("Parsed {} meeting documents", documents.len());

    let mut picks = Vec::new();
    for doc in &documents {
        for mut pick in parser.parse(doc) {
            let (acted, reason) = ledger.is_acted_on(
                normalizer,
                &pick.ticker,
                pick.meeting_date,
                options.config.pre_days,
                options.config.post_days,
            );
            pick.acted_on = acted;
            pick.acted_reason = reason;
            pick.position_shares = if acted {
                ledger.position_shares(normalizer, &pick.ticker, pick.meeting_date)
            } else {
                0.0
            };
            picks.push(pick);
        }
    }

    let acted = picks.iter().filter(|p| p.acted_on).count();
    info!(
        "{} picks from {} meetings, {} acted on",
        picks.len(),
        documents.len(),
        acted
    );
    Ok((picks, documents.len()))
}

/// Price every pick through the shared fetcher.
pub fn price_picks(
    fetcher: &mut ReturnFetcher<'_>,
    picks: &mut [Pick],
    config: &RunConfig,
) -> Result<()> {
    fetcher.batch_fetch(picks, config)?;
    let priced = picks
        .iter()
        .filter(|p| config.main_windows.iter().any(|w| p.ret(*w).is_some()))
        .count();
    info!("Priced {}/{} picks", priced, picks.len());
    Ok(())
}

/// Benchmark and vol-index closes spanning the meetings plus MA warmup.
pub fn fetch_regime_series(
    fetcher: &mut ReturnFetcher<'_>,
    picks: &[Pick],
    config: &RunConfig,
) -> (PriceSeries, PriceSeries) {
    let Some(min_date) = picks.iter().map(|p| p.meeting_date).min() else {
        return (Default::default(), Default::default());
    };
    let max_date = picks
        .iter()
        .map(|p| p.meeting_date)
        .max()
        .expect("non-empty");
    let start = min_date - Duration::days(REGIME_WARMUP_DAYS);
    let end = (max_date + Duration::days(7)).min(config.as_of);

    let symbols = vec![config.benchmark.clone(), config.vol_symbol.clone()];
    let mut series = fetcher.fetch_series(&symbols, start, end);
    (
        series.remove(&config.benchmark).unwrap_or_default(),
        series.remove(&config.vol_symbol).unwrap_or_default(),
    )
}

/// Factor-ETF closes spanning the meetings plus the holding horizon.
pub fn fetch_factor_series(
    fetcher: &mut ReturnFetcher<'_>,
    picks: &[Pick],
    config: &RunConfig,
) -> HashMap<String, PriceSeries> {
    let Some(min_date) = picks.iter().map(|p| p.meeting_date).min() else {
        return Default::default();
    };
    let max_date = picks
        .iter()
        .map(|p| p.meeting_date)
        .max()
        .expect("non-empty");
    let start = min_date - Duration::days(7);
    let end = (max_date + Duration::days(config.hold_days as i64 + 15)).min(config.as_of);

    fetcher.fetch_series(&config.factor_symbols(), start, end)
}
