use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Sentiment assigned to one ticker mention in one meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
    Unknown,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Bullish => "bullish",
            Sentiment::Bearish => "bearish",
            Sentiment::Neutral => "neutral",
            Sentiment::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a pick counts as acted on. Held wins over Traded when both apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActedReason {
    Held,
    Traded,
    NotActed,
}

impl ActedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActedReason::Held => "held",
            ActedReason::Traded => "traded",
            ActedReason::NotActed => "",
        }
    }
}

/// One ticker mention in one meeting, enriched in place by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pick {
    pub ticker_raw: String,
    /// Canonical price-provider symbol used for all downstream lookups.
    pub ticker: String,
    pub meeting_date: NaiveDate,
    pub sentiment: Sentiment,
    /// Verbatim excerpt supporting the sentiment call, capped at 200 chars.
    pub evidence: String,
    #[serde(default)]
    pub acted_on: bool,
    #[serde(default = "default_acted_reason")]
    pub acted_reason: ActedReason,
    #[serde(default)]
    pub position_shares: f64,
    /// Forward returns keyed by horizon in calendar days. None = unpriceable leg.
    #[serde(default)]
    pub returns: BTreeMap<u32, Option<f64>>,
    #[serde(default)]
    pub bench_returns: BTreeMap<u32, Option<f64>>,
    #[serde(default)]
    pub excess_returns: BTreeMap<u32, Option<f64>>,
    #[serde(default)]
    pub base_price: Option<f64>,
    /// 30-day return with the entry price shifted by 0/1/2 calendar days.
    #[serde(default)]
    pub entry_sensitivity: BTreeMap<u32, Option<f64>>,
}

fn default_acted_reason() -> ActedReason {
    ActedReason::NotActed
}

impl Pick {
    pub fn new(
        ticker_raw: &str,
        ticker: &str,
        meeting_date: NaiveDate,
        sentiment: Sentiment,
        evidence: &str,
    ) -> Self {
        Self {
            ticker_raw: ticker_raw.to_string(),
            ticker: ticker.to_string(),
            meeting_date,
            sentiment,
            evidence: truncate_evidence(evidence, 200),
            acted_on: false,
            acted_reason: ActedReason::NotActed,
            position_shares: 0.0,
            returns: BTreeMap::new(),
            bench_returns: BTreeMap::new(),
            excess_returns: BTreeMap::new(),
            base_price: None,
            entry_sensitivity: BTreeMap::new(),
        }
    }

    pub fn ret(&self, window: u32) -> Option<f64> {
        self.returns.get(&window).copied().flatten()
    }

    pub fn bench_ret(&self, window: u32) -> Option<f64> {
        self.bench_returns.get(&window).copied().flatten()
    }

    pub fn excess(&self, window: u32) -> Option<f64> {
        self.excess_returns.get(&window).copied().flatten()
    }

    pub fn entry_offset_ret(&self, offset: u32) -> Option<f64> {
        self.entry_sensitivity.get(&offset).copied().flatten()
    }
}

/// Cap an evidence excerpt without splitting a multi-byte character.
pub fn truncate_evidence(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let mut out = String::new();
    for (count, ch) in trimmed.chars().enumerate() {
        if count >= max_chars {
            break;
        }
        out.push(ch);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "BUY",
            TradeDirection::Sell => "SELL",
        }
    }
}

impl FromStr for TradeDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(TradeDirection::Buy),
            "SELL" => Ok(TradeDirection::Sell),
            other => Err(anyhow!("Unknown trade direction '{}'", other)),
        }
    }
}

/// One fill from the trade ledger. Ledger tickers may use a different
/// spelling vocabulary than the picks; the normalizer reconciles them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub ticker: String,
    pub date: NaiveDate,
    pub direction: TradeDirection,
    pub quantity: f64,
    #[serde(default)]
    pub fill_price: Option<f64>,
    #[serde(default)]
    pub commission: Option<f64>,
}

impl TradeRecord {
    pub fn signed_quantity(&self) -> f64 {
        match self.direction {
            TradeDirection::Buy => self.quantity,
            TradeDirection::Sell => -self.quantity,
        }
    }
}

/// One meeting document: a date plus free text with per-ticker sections.
#[derive(Debug, Clone)]
pub struct NoteDocument {
    pub date: NaiveDate,
    pub source: String,
    pub tickers: Vec<String>,
    pub body: String,
}

/// The five mutually exclusive sentiment x acted-on groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Bucket {
    BullishActed,
    BullishDiscussed,
    BearishActed,
    BearishDiscussed,
    NeutralUnknown,
}

impl Bucket {
    pub const ALL: [Bucket; 5] = [
        Bucket::BullishActed,
        Bucket::BullishDiscussed,
        Bucket::BearishActed,
        Bucket::BearishDiscussed,
        Bucket::NeutralUnknown,
    ];

    pub fn classify(pick: &Pick) -> Bucket {
        match (pick.sentiment, pick.acted_on) {
            (Sentiment::Bullish, true) => Bucket::BullishActed,
            (Sentiment::Bullish, false) => Bucket::BullishDiscussed,
            (Sentiment::Bearish, true) => Bucket::BearishActed,
            (Sentiment::Bearish, false) => Bucket::BearishDiscussed,
            _ => Bucket::NeutralUnknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Bucket::BullishActed => "Bullish + Acted On",
            Bucket::BullishDiscussed => "Bullish + Discussed Only",
            Bucket::BearishActed => "Bearish + Acted On",
            Bucket::BearishDiscussed => "Bearish + Discussed Only",
            Bucket::NeutralUnknown => "Neutral / Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pick(sentiment: Sentiment, acted: bool) -> Pick {
        let mut p = Pick::new(
            "NVDA",
            "NVDA",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            sentiment,
            "context",
        );
        p.acted_on = acted;
        p
    }

    #[test]
    fn bucket_partition_is_total_and_exclusive() {
        let picks = vec![
            pick(Sentiment::Bullish, true),
            pick(Sentiment::Bullish, false),
            pick(Sentiment::Bearish, true),
            pick(Sentiment::Bearish, false),
            pick(Sentiment::Neutral, true),
            pick(Sentiment::Neutral, false),
            pick(Sentiment::Unknown, true),
            pick(Sentiment::Unknown, false),
        ];

        let mut counts: BTreeMap<Bucket, usize> = BTreeMap::new();
        for p in &picks {
            *counts.entry(Bucket::classify(p)).or_default() += 1;
        }
        let total: usize = counts.values().sum();
        assert_eq!(total, picks.len());
        assert_eq!(counts.get(&Bucket::BullishActed), Some(&1));
        assert_eq!(counts.get(&Bucket::BullishDiscussed), Some(&1));
        assert_eq!(counts.get(&Bucket::BearishActed), Some(&1));
        assert_eq!(counts.get(&Bucket::BearishDiscussed), Some(&1));
        assert_eq!(counts.get(&Bucket::NeutralUnknown), Some(&4));
    }

    #[test]
    fn evidence_is_capped_at_200_chars() {
        let long = "x".repeat(500);
        let p = Pick::new(
            "AAPL",
            "AAPL",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            Sentiment::Bullish,
            &long,
        );
        assert_eq!(p.evidence.chars().count(), 200);
    }

    #[test]
    fn missing_returns_read_as_none() {
        let mut p = pick(Sentiment::Bullish, true);
        p.returns.insert(30, Some(0.1));
        p.returns.insert(90, None);
        assert_eq!(p.ret(30), Some(0.1));
        assert_eq!(p.ret(90), None);
        assert_eq!(p.ret(7), None);
    }

    #[test]
    fn trade_direction_parses_and_signs() {
        assert_eq!(
            "buy".parse::<TradeDirection>().unwrap(),
            TradeDirection::Buy
        );
        let sell = TradeRecord {
            ticker: "NVDA".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            direction: TradeDirection::Sell,
            quantity: 25.0,
            fill_price: None,
            commission: None,
        };
        assert_eq!(sell.signed_quantity(), -25.0);
    }
}
