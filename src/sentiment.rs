use crate::models::Sentiment;

/// Pluggable sentiment classification over free meeting text.
pub trait Classifier {
    fn classify(&self, text: &str) -> Sentiment;
}

/// Keyword-table classifier. Compound phrases are checked first in order
/// (a hedged phrase like "neutral leaning cautious" must not be counted as
/// plain neutral), then bullish vs bearish keywords by majority, then
/// neutral keywords, else Unknown.
pub struct KeywordClassifier {
    compound: Vec<(String, Sentiment)>,
    bullish: Vec<String>,
    bearish: Vec<String>,
    neutral: Vec<String>,
}

const COMPOUND_RULES: &[(&str, Sentiment)] = &[
    ("中性偏多", Sentiment::Bullish),
    ("中性偏谨慎", Sentiment::Bearish),
    ("中性偏空", Sentiment::Bearish),
    ("中性偏乐观", Sentiment::Bullish),
    ("偏乐观", Sentiment::Bullish),
    ("偏悲观", Sentiment::Bearish),
    ("不太看好", Sentiment::Bearish),
    ("比较看好", Sentiment::Bullish),
    ("相对看好", Sentiment::Bullish),
    ("整体偏多", Sentiment::Bullish),
    ("整体偏空", Sentiment::Bearish),
    ("neutral leaning bullish", Sentiment::Bullish),
    ("neutral leaning bearish", Sentiment::Bearish),
    ("cautiously optimistic", Sentiment::Bullish),
];

const BULLISH_KEYWORDS: &[&str] = &[
    "偏多", "加仓", "建仓", "买入", "逢低", "布局", "逐步加", "小仓位", "试探性",
    "维持偏高仓位", "重新纳入", "择机", "考虑配置", "看好", "增持", "利好", "反弹",
    "吸纳", "上行", "低估", "accumulate", "add on dips", "overweight", "undervalued",
    "initiate position",
];

const BEARISH_KEYWORDS: &[&str] = &[
    "偏空", "减仓", "回避", "卖出", "已卖", "偏谨慎", "不加仓", "不买", "减少预期",
    "小幅减仓", "看空", "悲观", "承压", "下行", "高估", "泡沫", "利空", "估值偏高",
    "不建议", "止损", "清仓", "avoid", "trim", "underweight", "overvalued",
    "take profits",
];

const NEUTRAL_KEYWORDS: &[&str] = &["中性", "观察", "观望", "hold and watch", "no change"];

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            compound: COMPOUND_RULES
                .iter()
                .map(|(kw, s)| (kw.to_string(), *s))
                .collect(),
            bullish: BULLISH_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            bearish: BEARISH_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            neutral: NEUTRAL_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a classifier with a caller-supplied keyword table.
    pub fn with_tables(
        compound: Vec<(String, Sentiment)>,
        bullish: Vec<String>,
        bearish: Vec<String>,
        neutral: Vec<String>,
    ) -> Self {
        Self {
            compound,
            bullish,
            bearish,
            neutral,
        }
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Sentiment {
        if text.trim().is_empty() {
            return Sentiment::Unknown;
        }
        let haystack = text.to_lowercase();

        for (phrase, sentiment) in &self.compound {
            if haystack.contains(phrase.as_str()) {
                return *sentiment;
            }
        }

        let bull_count = self
            .bullish
            .iter()
            .filter(|kw| haystack.contains(kw.as_str()))
            .count();
        let bear_count = self
            .bearish
            .iter()
            .filter(|kw| haystack.contains(kw.as_str()))
            .count();

        if bull_count > 0 && bull_count > bear_count {
            return Sentiment::Bullish;
        }
        if bear_count > 0 && bear_count > bull_count {
            return Sentiment::Bearish;
        }

        if self
            .neutral
            .iter()
            .any(|kw| haystack.contains(kw.as_str()))
        {
            return Sentiment::Neutral;
        }

        Sentiment::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_unknown() {
        let c = KeywordClassifier::new();
        assert_eq!(c.classify(""), Sentiment::Unknown);
        assert_eq!(c.classify("   "), Sentiment::Unknown);
    }

    #[test]
    fn compound_rules_win_over_neutral_keyword() {
        let c = KeywordClassifier::new();
        // Contains the neutral keyword but the compound phrase decides.
        assert_eq!(c.classify("整体中性偏多，继续观察"), Sentiment::Bullish);
        assert_eq!(c.classify("中性偏谨慎"), Sentiment::Bearish);
    }

    #[test]
    fn keyword_majority_decides() {
        let c = KeywordClassifier::new();
        assert_eq!(c.classify("逢低加仓，长期看好"), Sentiment::Bullish);
        assert_eq!(c.classify("估值偏高，建议减仓回避"), Sentiment::Bearish);
        assert_eq!(c.classify("Plan to accumulate, still undervalued"), Sentiment::Bullish);
    }

    #[test]
    fn tied_signals_fall_through_to_neutral_or_unknown() {
        let c = KeywordClassifier::new();
        // One bullish and one bearish keyword each: no majority.
        assert_eq!(c.classify("买入还是卖出待定，先观望"), Sentiment::Neutral);
        assert_eq!(c.classify("nothing actionable here"), Sentiment::Unknown);
    }

    #[test]
    fn custom_table_is_honored() {
        let c = KeywordClassifier::with_tables(
            vec![],
            vec!["moon".to_string()],
            vec!["rug".to_string()],
            vec![],
        );
        assert_eq!(c.classify("to the moon"), Sentiment::Bullish);
        assert_eq!(c.classify("total rug"), Sentiment::Bearish);
        assert_eq!(c.classify("看好"), Sentiment::Unknown);
    }
}
