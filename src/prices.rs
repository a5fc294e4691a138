use crate::config::RunConfig;
use crate::models::Pick;
use crate::normalizer::TickerNormalizer;
use crate::provider::{PriceProvider, PriceSeries};
use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Find the close nearest to a date: forward first (a trader cannot act
/// before the meeting), then backward, both bounded. None when nothing is
/// within reach; callers must propagate the gap, not substitute zero.
pub fn nearest_price(series: &PriceSeries, target: NaiveDate, max_days: i64) -> Option<f64> {
    for offset in 0..=max_days {
        if let Some(price) = series.get(&(target + Duration::days(offset))) {
            return Some(*price);
        }
    }
    for offset in 1..=max_days {
        if let Some(price) = series.get(&(target - Duration::days(offset))) {
            return Some(*price);
        }
    }
    None
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    series: BTreeMap<String, BTreeMap<NaiveDate, f64>>,
    ranges: BTreeMap<String, CachedRange>,
}

/// Persistent close-price cache keyed by symbol and date, with per-symbol
/// fetched-range bookkeeping so coverage checks are explicit. Owned by the
/// fetcher; lifetime and invalidation are caller-visible operations.
pub struct PriceCache {
    path: Option<PathBuf>,
    data: CacheFile,
}

impl PriceCache {
    /// In-memory cache with no backing file.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            data: CacheFile::default(),
        }
    }

    /// Load the cache from disk; a missing or unreadable file starts empty.
    pub fn load(path: &Path) -> Self {
        let data = fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self {
            path: Some(path.to_path_buf()),
            data,
        }
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create cache directory {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(&self.data)?;
        fs::write(path, text)
            .with_context(|| format!("failed to write price cache {}", path.display()))
    }

    pub fn invalidate(&mut self) {
        self.data = CacheFile::default();
    }

    pub fn series(&self, symbol: &str) -> Option<&PriceSeries> {
        self.data.series.get(symbol)
    }

    /// Whether the cached range for a symbol covers the requested span.
    pub fn covers(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> bool {
        self.data
            .ranges
            .get(symbol)
            .map(|r| r.start <= start && r.end >= end)
            .unwrap_or(false)
    }

    pub fn store_series(
        &mut self,
        symbol: &str,
        series: PriceSeries,
        start: NaiveDate,
        end: NaiveDate,
    ) {
        let entry = self.data.series.entry(symbol.to_string()).or_default();
        for (date, price) in series {
            entry.insert(date, price);
        }
        let range = self
            .data
            .ranges
            .entry(symbol.to_string())
            .or_insert(CachedRange { start, end });
        range.start = range.start.min(start);
        range.end = range.end.max(end);
    }

    pub fn insert(&mut self, symbol: &str, date: NaiveDate, price: f64) {
        self.data
            .series
            .entry(symbol.to_string())
            .or_default()
            .insert(date, price);
    }

    pub fn symbol_count(&self) -> usize {
        self.data.series.len()
    }
}

/// Batch price retrieval plus forward-return computation over the
/// enriched pick list. One spanning request per symbol per run; the cache
/// is consulted before any network call and written back after.
pub struct ReturnFetcher<'a> {
    provider: &'a dyn PriceProvider,
    cache: PriceCache,
    normalizer: &'a TickerNormalizer,
}

impl<'a> ReturnFetcher<'a> {
    pub fn new(
        provider: &'a dyn PriceProvider,
        cache: PriceCache,
        normalizer: &'a TickerNormalizer,
    ) -> Self {
        Self {
            provider,
            cache,
            normalizer,
        }
    }

    /// Download closes for every pick symbol plus the benchmark, then fill
    /// each pick's per-window returns, benchmark returns, excess returns,
    /// base price and entry-sensitivity legs. Provider failures degrade to
    /// missing data for the affected symbol.
    pub fn batch_fetch(&mut self, picks: &mut [Pick], config: &RunConfig) -> Result<()> {
        if picks.is_empty() {
            return Ok(());
        }

        let mut symbols: HashSet<String> = picks.iter().map(|p| p.ticker.clone()).collect();
        symbols.insert(config.benchmark.clone());

        let min_date = picks.iter().map(|p| p.meeting_date).min().expect("non-empty");
        let max_date = picks.iter().map(|p| p.meeting_date).max().expect("non-empty");
        let start = min_date - Duration::days(7);
        let end = (max_date + Duration::days(config.max_window() as i64 + 7)).min(config.as_of);

        let mut ordered: Vec<String> = symbols.into_iter().collect();
        ordered.sort();
        self.fetch_symbols(&ordered, start, end);

        let bench_series = self
            .cache
            .series(&config.benchmark)
            .cloned()
            .unwrap_or_default();

        for pick in picks.iter_mut() {
            let series = self.cache.series(&pick.ticker).cloned().unwrap_or_default();
            compute_pick_returns(pick, &series, &bench_series, config);
        }

        self.cache.save()?;
        Ok(())
    }

    /// Fetch closes for arbitrary extra symbols (regime and factor
    /// proxies) over an explicit range, cache-first.
    pub fn fetch_series(
        &mut self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> HashMap<String, PriceSeries> {
        self.fetch_symbols(symbols, start, end);
        let mut out = HashMap::new();
        for symbol in symbols {
            if let Some(series) = self.cache.series(symbol) {
                out.insert(symbol.clone(), series.clone());
            }
        }
        if let Err(e) = self.cache.save() {
            warn!("Failed to persist price cache: {:#}", e);
        }
        out
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    fn fetch_symbols(&mut self, symbols: &[String], start: NaiveDate, end: NaiveDate) {
        let missing: Vec<&String> = symbols
            .iter()
            .filter(|s| !self.cache.covers(s, start, end))
            .collect();
        if missing.is_empty() {
            info!("Price cache covers all {} symbols", symbols.len());
        } else {
            info!(
                "Fetching prices for {} symbols ({} to {})",
                missing.len(),
                start,
                end
            );
        }

        let bar = ProgressBar::new(missing.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("  {bar:30} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        for symbol in missing {
            bar.set_message(symbol.clone());
            match self.provider.daily_closes(symbol, start, end) {
                Ok(series) => {
                    self.cache.store_series(symbol, series, start, end);
                }
                Err(e) => {
                    warn!("No price data for {}: {}", symbol, e);
                    // Record the attempt so privatized backfill still applies
                    // and repeat runs do not hammer a dead symbol.
                    self.cache.store_series(symbol, PriceSeries::new(), start, end);
                }
            }
            self.inject_privatized(symbol, start, end);
            bar.inc(1);
        }
        bar.finish_and_clear();
    }

    /// Freeze privatized symbols at their deal price from the delist date
    /// forward. When the provider returned nothing at all, the whole range
    /// is filled at the deal price.
    fn inject_privatized(&mut self, symbol: &str, start: NaiveDate, end: NaiveDate) {
        let Some(info) = self.normalizer.privatized(symbol) else {
            return;
        };
        let have_any = self
            .cache
            .series(symbol)
            .map(|s| !s.is_empty())
            .unwrap_or(false);

        let fill_from = if have_any { info.delist_date } else { start };
        let mut date = fill_from;
        while date <= end {
            let already = self
                .cache
                .series(symbol)
                .map(|s| s.contains_key(&date))
                .unwrap_or(false);
            if !already {
                self.cache.insert(symbol, date, info.final_price);
            }
            date += Duration::days(1);
        }
        info!(
            "{}: frozen at {:.2} from {} (privatized)",
            symbol, info.final_price, fill_from
        );
    }
}

/// Fill one pick's return fields from its price series and the benchmark
/// series. Any unpriceable leg stays None.
pub fn compute_pick_returns(
    pick: &mut Pick,
    series: &PriceSeries,
    bench: &PriceSeries,
    config: &RunConfig,
) {
    let max_days = config.price_lookup_max_days;
    let base_price = nearest_price(series, pick.meeting_date, max_days);
    let bench_base = nearest_price(bench, pick.meeting_date, max_days);
    pick.base_price = base_price;

    for &window in &config.all_windows {
        let target = pick.meeting_date + Duration::days(window as i64);
        let future = nearest_price(series, target, max_days);
        let bench_future = nearest_price(bench, target, max_days);

        let ret = match (base_price, future) {
            (Some(base), Some(future)) if base > 0.0 => Some((future - base) / base),
            _ => None,
        };
        let bench_ret = match (bench_base, bench_future) {
            (Some(base), Some(future)) if base > 0.0 => Some((future - base) / base),
            _ => None,
        };
        let excess = match (ret, bench_ret) {
            (Some(r), Some(b)) => Some(r - b),
            _ => None,
        };

        pick.returns.insert(window, ret);
        pick.bench_returns.insert(window, bench_ret);
        pick.excess_returns.insert(window, excess);
    }

    // Entry sensitivity: the 30-day return with the entry booked 0/1/2
    // days after the meeting. A large offset-0 edge suggests the backtest
    // is riding prices that had already moved by the time anyone could fill.
    for &offset in &config.entry_offsets {
        let entry_date = pick.meeting_date + Duration::days(offset as i64);
        let entry = nearest_price(series, entry_date, max_days);
        let exit = nearest_price(
            series,
            entry_date + Duration::days(config.hold_days as i64),
            max_days,
        );
        let ret = match (entry, exit) {
            (Some(base), Some(future)) if base > 0.0 => Some((future - base) / base),
            _ => None,
        };
        pick.entry_sensitivity.insert(offset, ret);
    }
}
