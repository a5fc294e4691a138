use chrono::NaiveDate;
use std::collections::HashMap;

/// Three-way symbol mapping between meeting-note spellings, trade-ledger
/// spellings, and the canonical price-provider vocabulary.
///
/// Unknown tickers pass through unchanged; normalization never fails.
pub struct TickerNormalizer {
    overrides: HashMap<&'static str, &'static str>,
    ledger_aliases: HashMap<&'static str, &'static [&'static str]>,
    privatized: HashMap<&'static str, Privatized>,
}

/// A symbol that stopped trading at a known deal price. After the delist
/// date its value is frozen at that price rather than reported as missing.
#[derive(Debug, Clone, Copy)]
pub struct Privatized {
    pub final_price: f64,
    pub delist_date: NaiveDate,
}

/// Note/company-name spellings to canonical provider symbols. Includes
/// renames, typo fixes and non-English company names.
const OVERRIDES: &[(&str, &str)] = &[
    ("BRK.B", "BRK-B"),
    ("BRK B", "BRK-B"),
    ("BRKB", "BRK-B"),
    ("BF.B", "BF-B"),
    ("ANTA.HK", "2020.HK"),
    // Company names
    ("BURBERRY", "BRBY.L"),
    ("LVMH", "MC.PA"),
    ("HERMÈS", "RMS.PA"),
    ("HERMES", "RMS.PA"),
    ("RICHEMONT", "CFR.SW"),
    ("KUAISHOU", "1024.HK"),
    ("JT", "2914.T"),
    // Renamed or delisted
    ("SQ", "XYZ"),
    ("PARA", "PSKY"),
    ("ATAD", "ATAT"),
    // Exchange corrections
    ("EXPN", "EXPN.L"),
    ("WOSG", "WOSG.L"),
    ("ICBC", "1398.HK"),
    ("CFR.PA", "CFR.SW"),
    // A-share codes that need an explicit suffix
    ("600519", "600519.SS"),
    ("600887", "600887.SS"),
    ("002594", "002594.SZ"),
    ("000333", "000333.SZ"),
    ("000858", "000858.SZ"),
    ("000568", "000568.SZ"),
    // Chinese company names
    ("海尔智家", "6690.HK"),
    ("美的集团", "000333.SZ"),
    ("格力电器", "000651.SZ"),
    ("安踏体育", "2020.HK"),
    ("快手", "1024.HK"),
    ("茅台", "600519.SS"),
    ("五粮液", "000858.SZ"),
    ("泸州老窖", "000568.SZ"),
    ("洋河", "002304.SZ"),
    ("阿里巴巴", "BABA"),
    ("京东", "JD"),
    ("拼多多", "PDD"),
    ("腾讯", "0700.HK"),
    ("百度", "BIDU"),
    ("比亚迪", "002594.SZ"),
    ("日本烟草", "2914.T"),
];

/// Canonical symbol to extra ledger spellings left over from renames.
const LEDGER_ALIASES: &[(&str, &[&str])] = &[("XYZ", &["SQ"]), ("PSKY", &["PARA"])];

const EUROPEAN_SUFFIXES: &[&str] = &[".PA", ".L", ".DE", ".AS", ".MI", ".SW"];

impl Default for TickerNormalizer {
    fn default() -> Self {
        let mut privatized = HashMap::new();
        privatized.insert(
            "SKX",
            Privatized {
                final_price: 63.0,
                delist_date: NaiveDate::from_ymd_opt(2025, 5, 15).expect("valid date"),
            },
        );
        Self {
            overrides: OVERRIDES.iter().copied().collect(),
            ledger_aliases: LEDGER_ALIASES.iter().copied().collect(),
            privatized,
        }
    }
}

impl TickerNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a meeting-note spelling to the canonical provider symbol.
    pub fn note_to_canonical(&self, raw: &str) -> String {
        let original = raw.trim();
        let mut ticker = original.to_uppercase();

        if let Some(stripped) = ticker.strip_prefix('$') {
            ticker = stripped.to_string();
        }

        // Overrides checked against both spellings so company names hit.
        if let Some(mapped) = self.overrides.get(ticker.as_str()) {
            return (*mapped).to_string();
        }
        if let Some(mapped) = self.overrides.get(original) {
            return (*mapped).to_string();
        }

        if let Some(code) = ticker.strip_suffix(".SH") {
            return format!("{}.SS", code);
        }

        if has_recognized_suffix(&ticker) {
            return ticker;
        }

        if ticker.len() == 6 && is_all_digits(&ticker) {
            // A-share: 6xxxxx lists in Shanghai, the rest in Shenzhen.
            if ticker.starts_with('6') {
                return format!("{}.SS", ticker);
            }
            return format!("{}.SZ", ticker);
        }
        if (4..=5).contains(&ticker.len()) && is_all_digits(&ticker) {
            return format!("{}.HK", ticker);
        }

        ticker
    }

    /// Convert a trade-ledger spelling to the canonical provider symbol.
    pub fn ledger_to_canonical(&self, raw: &str) -> String {
        let ticker = raw.trim().to_string();

        // HK stocks recorded as e.g. 690D
        if let Some(num) = ticker.strip_suffix('D') {
            if !num.is_empty() && is_all_digits(num) {
                return format!("{:0>4}.HK", num);
            }
        }

        if (3..=5).contains(&ticker.len()) && is_all_digits(&ticker) {
            return format!("{}.HK", ticker);
        }

        if ticker.contains('.') {
            if let Some(code) = ticker.strip_suffix(".SH") {
                return format!("{}.SS", code);
            }
            return ticker;
        }

        if ticker == "BRK B" {
            return "BRK-B".to_string();
        }

        ticker
    }

    /// Plausible ledger spellings for a canonical symbol. One-to-many
    /// because ledgers may keep legacy tickers after renames.
    pub fn ledger_candidates(&self, canonical: &str) -> Vec<String> {
        let symbol = canonical.trim().to_uppercase();
        let mut candidates = Vec::new();

        if let Some(num) = symbol.strip_suffix(".HK") {
            if is_all_digits(num) {
                let trimmed = num.trim_start_matches('0');
                candidates.push(format!("{}D", trimmed));
                candidates.push(num.to_string());
                candidates.push(trimmed.to_string());
                return candidates;
            }
        }

        for suffix in [".SS", ".SZ"] {
            if let Some(num) = symbol.strip_suffix(suffix) {
                if is_all_digits(num) {
                    candidates.push(num.to_string());
                    return candidates;
                }
            }
        }

        if symbol.ends_with(".T") {
            candidates.push(symbol);
            return candidates;
        }

        if symbol.contains('-') {
            candidates.push(symbol.replace('-', " "));
            candidates.push(symbol);
            return candidates;
        }

        candidates.push(symbol.clone());
        if let Some(aliases) = self.ledger_aliases.get(symbol.as_str()) {
            candidates.extend(aliases.iter().map(|a| a.to_string()));
        }
        candidates
    }

    /// Resolve a company-name spelling (section header text) to a canonical
    /// symbol via the override table. Returns None for unrecognized names.
    pub fn resolve_name(&self, name: &str) -> Option<String> {
        let trimmed = name.trim();
        if let Some(mapped) = self.overrides.get(trimmed) {
            return Some((*mapped).to_string());
        }
        let upper = trimmed.to_uppercase();
        self.overrides.get(upper.as_str()).map(|m| (*m).to_string())
    }

    pub fn privatized(&self, symbol: &str) -> Option<Privatized> {
        self.privatized.get(symbol).copied()
    }
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn has_recognized_suffix(ticker: &str) -> bool {
    if let Some(code) = ticker.strip_suffix(".HK") {
        return is_all_digits(code);
    }
    for suffix in [".SZ", ".SS", ".T"] {
        if let Some(code) = ticker.strip_suffix(suffix) {
            return is_all_digits(code);
        }
    }
    for suffix in EUROPEAN_SUFFIXES {
        if let Some(code) = ticker.strip_suffix(suffix) {
            return !code.is_empty() && code.chars().all(|c| c.is_ascii_uppercase());
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_dollar_sigil_and_uppercases() {
        let n = TickerNormalizer::new();
        assert_eq!(n.note_to_canonical("$nvda"), "NVDA");
        assert_eq!(n.note_to_canonical(" NVDA "), "NVDA");
    }

    #[test]
    fn applies_override_table() {
        let n = TickerNormalizer::new();
        assert_eq!(n.note_to_canonical("BRK.B"), "BRK-B");
        assert_eq!(n.note_to_canonical("$SQ"), "XYZ");
        assert_eq!(n.note_to_canonical("LVMH"), "MC.PA");
        assert_eq!(n.note_to_canonical("快手"), "1024.HK");
    }

    #[test]
    fn normalizes_shanghai_suffix() {
        let n = TickerNormalizer::new();
        assert_eq!(n.note_to_canonical("600000.SH"), "600000.SS");
    }

    #[test]
    fn keeps_recognized_exchange_suffixes() {
        let n = TickerNormalizer::new();
        assert_eq!(n.note_to_canonical("0700.HK"), "0700.HK");
        assert_eq!(n.note_to_canonical("7974.T"), "7974.T");
        assert_eq!(n.note_to_canonical("MC.PA"), "MC.PA");
    }

    #[test]
    fn maps_bare_numeric_codes_by_digit_heuristics() {
        let n = TickerNormalizer::new();
        assert_eq!(n.note_to_canonical("601318"), "601318.SS");
        assert_eq!(n.note_to_canonical("300750"), "300750.SZ");
        assert_eq!(n.note_to_canonical("9988"), "9988.HK");
        assert_eq!(n.note_to_canonical("00700"), "00700.HK");
    }

    #[test]
    fn unknown_tickers_pass_through() {
        let n = TickerNormalizer::new();
        assert_eq!(n.note_to_canonical("TOTALLYFAKE"), "TOTALLYFAKE");
    }

    #[test]
    fn ledger_spellings_normalize() {
        let n = TickerNormalizer::new();
        assert_eq!(n.ledger_to_canonical("690D"), "0690.HK");
        assert_eq!(n.ledger_to_canonical("9988"), "9988.HK");
        assert_eq!(n.ledger_to_canonical("600519.SH"), "600519.SS");
        assert_eq!(n.ledger_to_canonical("BRK B"), "BRK-B");
        assert_eq!(n.ledger_to_canonical("NVDA"), "NVDA");
    }

    #[test]
    fn ledger_candidates_cover_hk_variants() {
        let n = TickerNormalizer::new();
        assert_eq!(n.ledger_candidates("0690.HK"), vec!["690D", "0690", "690"]);
    }

    #[test]
    fn ledger_candidates_include_rename_aliases() {
        let n = TickerNormalizer::new();
        assert_eq!(n.ledger_candidates("XYZ"), vec!["XYZ", "SQ"]);
        assert_eq!(n.ledger_candidates("PSKY"), vec!["PSKY", "PARA"]);
    }

    #[test]
    fn ledger_candidates_for_dashed_and_ashare() {
        let n = TickerNormalizer::new();
        assert_eq!(n.ledger_candidates("BRK-B"), vec!["BRK B", "BRK-B"]);
        assert_eq!(n.ledger_candidates("600519.SS"), vec!["600519"]);
        assert_eq!(n.ledger_candidates("7974.T"), vec!["7974.T"]);
    }

    #[test]
    fn privatized_lookup() {
        let n = TickerNormalizer::new();
        let p = n.privatized("SKX").unwrap();
        assert_eq!(p.final_price, 63.0);
        assert_eq!(p.delist_date, NaiveDate::from_ymd_opt(2025, 5, 15).unwrap());
        assert!(n.privatized("NVDA").is_none());
    }
}
