use chrono::{Duration, NaiveDate};
use log::debug;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::thread;
use std::time::Duration as StdDuration;
use thiserror::Error;

/// Sparse adjusted-close series for one symbol.
pub type PriceSeries = BTreeMap<NaiveDate, f64>;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned status {status} for {symbol}")]
    Status {
        symbol: String,
        status: reqwest::StatusCode,
    },
    #[error("no price data returned for {0}")]
    NoData(String),
    #[error("malformed provider response for {symbol}: {detail}")]
    Malformed { symbol: String, detail: String },
}

/// Daily-close retrieval boundary. Consumers must treat an error as
/// missing data for the affected symbol, never abort the run.
pub trait PriceProvider {
    fn daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, FetchError>;
}

const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_RETRIES: usize = 3;
const BASE_DELAY_MS: u64 = 1000;
const MAX_DELAY_MS: u64 = 10_000;

/// Daily chart endpoint client. Fetches adjusted closes over a date range
/// with a bounded timeout and retry-with-backoff.
pub struct HttpPriceProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    adjclose: Vec<AdjCloseBlock>,
    #[serde(default)]
    quote: Vec<QuoteBlock>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseBlock {
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

impl HttpPriceProvider {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url("https://query1.finance.yahoo.com")
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(StdDuration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("pickaudit/0.1")
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn fetch_once(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, FetchError> {
        let period1 = to_unix(start);
        // The range end is exclusive on the provider side.
        let period2 = to_unix(end + Duration::days(1));
        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=div%2Csplit",
            self.base_url, symbol, period1, period2
        );

        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                symbol: symbol.to_string(),
                status: response.status(),
            });
        }

        let envelope: ChartEnvelope = response.json()?;
        let result = envelope
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or_else(|| FetchError::NoData(symbol.to_string()))?;

        let timestamps = result
            .timestamp
            .ok_or_else(|| FetchError::NoData(symbol.to_string()))?;
        let closes: &[Option<f64>] = if let Some(block) = result.indicators.adjclose.first() {
            &block.adjclose
        } else if let Some(block) = result.indicators.quote.first() {
            &block.close
        } else {
            return Err(FetchError::Malformed {
                symbol: symbol.to_string(),
                detail: "no close series in indicators".to_string(),
            });
        };
        if closes.len() != timestamps.len() {
            return Err(FetchError::Malformed {
                symbol: symbol.to_string(),
                detail: format!(
                    "{} timestamps vs {} closes",
                    timestamps.len(),
                    closes.len()
                ),
            });
        }

        let mut series = PriceSeries::new();
        for (ts, close) in timestamps.iter().zip(closes.iter()) {
            let Some(close) = close else { continue };
            if !close.is_finite() || *close <= 0.0 {
                continue;
            }
            if let Some(date) = chrono::DateTime::from_timestamp(*ts, 0).map(|dt| dt.date_naive()) {
                series.insert(date, *close);
            }
        }

        if series.is_empty() {
            return Err(FetchError::NoData(symbol.to_string()));
        }
        Ok(series)
    }
}

impl PriceProvider for HttpPriceProvider {
    fn daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, FetchError> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            match self.fetch_once(symbol, start, end) {
                Ok(series) => return Ok(series),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < MAX_RETRIES {
                        let delay_ms =
                            (BASE_DELAY_MS * 2_u64.pow(attempt as u32)).min(MAX_DELAY_MS);
                        let jitter_range = (delay_ms as f64 * 0.25) as u64;
                        let jitter = fastrand::u64(0..=jitter_range * 2);
                        let final_delay =
                            delay_ms.saturating_sub(jitter_range).saturating_add(jitter);
                        debug!(
                            "Fetch attempt {} for {} failed, retrying in {}ms",
                            attempt + 1,
                            symbol,
                            final_delay
                        );
                        thread::sleep(StdDuration::from_millis(final_delay));
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::NoData(symbol.to_string())))
    }
}

fn to_unix(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

/// In-memory provider for tests and offline runs.
#[derive(Default, Clone)]
pub struct StaticPriceProvider {
    series: HashMap<String, PriceSeries>,
}

impl StaticPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: &str, series: PriceSeries) -> Self {
        self.series.insert(symbol.to_string(), series);
        self
    }

    pub fn insert(&mut self, symbol: &str, date: NaiveDate, close: f64) {
        self.series
            .entry(symbol.to_string())
            .or_default()
            .insert(date, close);
    }
}

impl PriceProvider for StaticPriceProvider {
    fn daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, FetchError> {
        let series = self
            .series
            .get(symbol)
            .ok_or_else(|| FetchError::NoData(symbol.to_string()))?;
        let slice: PriceSeries = series
            .range(start..=end)
            .map(|(d, p)| (*d, *p))
            .collect();
        if slice.is_empty() {
            return Err(FetchError::NoData(symbol.to_string()));
        }
        Ok(slice)
    }
}
