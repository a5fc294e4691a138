use crate::models::{truncate_evidence, NoteDocument, Pick, Sentiment};
use crate::normalizer::TickerNormalizer;
use crate::sentiment::Classifier;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{debug, warn};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Markers for the subsections scanned inside each ticker section, and for
/// the document-level fallbacks. Kept as data so vaults with different
/// templates can re-point them.
#[derive(Debug, Clone)]
pub struct SectionMarkers {
    pub action_hint: Vec<String>,
    pub core_summary: Vec<String>,
    pub summary_table: Vec<String>,
    pub meeting_summary: Vec<String>,
}

impl Default for SectionMarkers {
    fn default() -> Self {
        Self {
            action_hint: vec!["潜在行动提示".to_string(), "Action Hints".to_string()],
            core_summary: vec!["核心观点摘要".to_string(), "Key Takeaways".to_string()],
            summary_table: vec!["一句话汇报摘要".to_string(), "One-line Summary".to_string()],
            meeting_summary: vec!["会议摘要".to_string(), "Meeting Summary".to_string()],
        }
    }
}

/// Parses meeting documents into sentiment-tagged picks. Output picks carry
/// sentiment and evidence only; action and price fields are filled later.
pub struct NotesParser<'a> {
    normalizer: &'a TickerNormalizer,
    classifier: &'a dyn Classifier,
    markers: SectionMarkers,
}

impl<'a> NotesParser<'a> {
    pub fn new(normalizer: &'a TickerNormalizer, classifier: &'a dyn Classifier) -> Self {
        Self {
            normalizer,
            classifier,
            markers: SectionMarkers::default(),
        }
    }

    pub fn with_markers(mut self, markers: SectionMarkers) -> Self {
        self.markers = markers;
        self
    }

    /// Load all meeting documents from a directory, sorted by file name.
    pub fn load_documents(dir: &Path) -> Result<Vec<NoteDocument>> {
        let mut paths: Vec<_> = fs::read_dir(dir)
            .with_context(|| format!("failed to read notes directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|e| e == "md").unwrap_or(false))
            .collect();
        paths.sort();

        let mut documents = Vec::new();
        for path in paths {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            match parse_document(&path, &text) {
                Some(doc) => documents.push(doc),
                None => warn!(
                    "Skipping {}: missing or invalid frontmatter date",
                    path.display()
                ),
            }
        }
        Ok(documents)
    }

    /// Extract one pick per canonical ticker mentioned in the document.
    pub fn parse(&self, doc: &NoteDocument) -> Vec<Pick> {
        let mut picks = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let sections = split_sections(&doc.body);

        // Pass 1: sections headed by an explicit $TICKER.
        for section in &sections {
            let Some(raw_ticker) = section.dollar_ticker() else {
                continue;
            };
            let canonical = self.normalizer.note_to_canonical(&raw_ticker);
            let (sentiment, evidence) = self.classify_section(section);
            picks.push(Pick::new(
                &raw_ticker,
                &canonical,
                doc.date,
                sentiment,
                &evidence,
            ));
            seen.insert(raw_ticker.to_uppercase());
            seen.insert(canonical.to_uppercase());
        }

        // Pass 2: sections headed by a known company name.
        for section in &sections {
            if section.dollar_ticker().is_some() {
                continue;
            }
            let Some(canonical) = self.normalizer.resolve_name(&section.name) else {
                continue;
            };
            if seen.contains(&canonical.to_uppercase()) {
                continue;
            }
            let (sentiment, evidence) = self.classify_section(section);
            picks.push(Pick::new(
                &section.name,
                &canonical,
                doc.date,
                sentiment,
                &evidence,
            ));
            seen.insert(canonical.to_uppercase());
        }

        // Pass 3: frontmatter tickers without a dedicated section.
        for raw in &doc.tickers {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let canonical = self.normalizer.note_to_canonical(raw);
            if seen.contains(&raw.to_uppercase()) || seen.contains(&canonical.to_uppercase()) {
                continue;
            }

            let mut evidence = self.summary_table_entry(&doc.body, raw);
            let mut sentiment = evidence
                .as_deref()
                .map(|text| self.classifier.classify(text))
                .unwrap_or(Sentiment::Unknown);

            if sentiment == Sentiment::Unknown {
                if let Some((s, context)) = self.summary_context(&doc.body, raw) {
                    sentiment = s;
                    if evidence.is_none() {
                        evidence = Some(context);
                    }
                }
            }

            debug!(
                "Frontmatter-only ticker {} in {} classified {}",
                raw, doc.source, sentiment
            );
            picks.push(Pick::new(
                raw,
                &canonical,
                doc.date,
                sentiment,
                evidence.as_deref().unwrap_or(""),
            ));
            seen.insert(raw.to_uppercase());
            seen.insert(canonical.to_uppercase());
        }

        picks
    }

    /// Classify a section: action hint first, then the core summary, then
    /// the whole section text as a last resort.
    fn classify_section(&self, section: &Section) -> (Sentiment, String) {
        let hint = section.subsection(&self.markers.action_hint);
        if let Some(hint) = &hint {
            let sentiment = self.classifier.classify(hint);
            if sentiment != Sentiment::Unknown {
                return (sentiment, hint.clone());
            }
        }

        if let Some(summary) = section.subsection(&self.markers.core_summary) {
            let sentiment = self.classifier.classify(&summary);
            if sentiment != Sentiment::Unknown {
                return (sentiment, hint.unwrap_or(summary));
            }
        }

        let full = section.body_text(2000);
        let sentiment = self.classifier.classify(&full);
        (sentiment, hint.unwrap_or_else(|| truncate_evidence(&full, 200)))
    }

    /// Look up a ticker's row in the one-line summary table: the cell after
    /// the cell containing the ticker.
    fn summary_table_entry(&self, body: &str, ticker: &str) -> Option<String> {
        let table_start = self
            .markers
            .summary_table
            .iter()
            .find_map(|marker| body.find(marker.as_str()))?;
        let needle = ticker.to_uppercase();

        for line in body[table_start..].lines() {
            if !line.trim_start().starts_with('|') {
                continue;
            }
            let cells: Vec<&str> = line.split('|').map(str::trim).collect();
            let Some(hit) = cells
                .iter()
                .position(|cell| cell.to_uppercase().contains(&needle))
            else {
                continue;
            };
            if let Some(next) = cells.get(hit + 1) {
                if !next.is_empty() && !next.starts_with("---") {
                    return Some(next.to_string());
                }
            }
        }
        None
    }

    /// Classify a ticker from its surrounding context in the meeting
    /// summary paragraph.
    fn summary_context(&self, body: &str, ticker: &str) -> Option<(Sentiment, String)> {
        let start = self
            .markers
            .meeting_summary
            .iter()
            .find_map(|marker| body.find(marker.as_str()))?;
        let summary: String = body[start..]
            .lines()
            .take_while(|line| !line.starts_with("##") && !line.starts_with("---"))
            .collect::<Vec<_>>()
            .join("\n");

        let chars: Vec<char> = summary.chars().collect();
        let upper: String = summary.to_uppercase();
        let needle = ticker.to_uppercase();
        let byte_pos = upper.find(&needle)?;
        let char_pos = upper[..byte_pos].chars().count();

        let from = char_pos.saturating_sub(20);
        let to = (char_pos + needle.chars().count() + 100).min(chars.len());
        let context: String = chars[from..to].iter().collect();

        let sentiment = self.classifier.classify(&context);
        if sentiment == Sentiment::Unknown {
            return None;
        }
        Some((sentiment, context))
    }
}

/// One `## `-headed section of a document.
struct Section {
    name: String,
    lines: Vec<String>,
}

impl Section {
    /// The ticker when the header reads `## $TICKER`, stripped of any
    /// trailing parenthetical.
    fn dollar_ticker(&self) -> Option<String> {
        let name = self.name.strip_prefix('$')?;
        let symbol: String = name
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '.')
            .collect();
        if symbol.is_empty() {
            return None;
        }
        Some(symbol)
    }

    /// Text under a `### ` subsection whose header contains one of the
    /// markers, up to the next subsection header. Capped at 500 chars.
    fn subsection(&self, markers: &[String]) -> Option<String> {
        let start = self.lines.iter().position(|line| {
            let trimmed = line.trim_start();
            trimmed.starts_with("###") && markers.iter().any(|m| trimmed.contains(m.as_str()))
        })?;

        let mut collected = Vec::new();
        for line in &self.lines[start + 1..] {
            if line.trim_start().starts_with("##") {
                break;
            }
            collected.push(line.as_str());
        }
        let text = collected.join("\n").trim().to_string();
        if text.is_empty() {
            return None;
        }
        Some(truncate_evidence(&text, 500))
    }

    fn body_text(&self, max_chars: usize) -> String {
        truncate_evidence(&self.lines.join("\n"), max_chars)
    }
}

/// Split a document body into `## ` sections. The section name is the
/// header text before any parenthetical.
fn split_sections(body: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    for line in body.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("## ") {
            let name = rest
                .split(['（', '('])
                .next()
                .unwrap_or(rest)
                .trim()
                .to_string();
            sections.push(Section {
                name,
                lines: Vec::new(),
            });
        } else if let Some(section) = sections.last_mut() {
            section.lines.push(line.to_string());
        }
    }
    sections
}

/// Parse one markdown document: frontmatter date plus optional tickers
/// list, body after the closing delimiter.
fn parse_document(path: &Path, text: &str) -> Option<NoteDocument> {
    let mut lines = text.lines();
    if lines.next()?.trim() != "---" {
        return None;
    }

    let mut date: Option<NaiveDate> = None;
    let mut tickers: Vec<String> = Vec::new();
    let mut in_tickers = false;
    let mut frontmatter_len = 1usize;

    for line in lines.by_ref() {
        frontmatter_len += 1;
        let trimmed = line.trim();
        if trimmed == "---" {
            break;
        }

        if let Some(value) = trimmed
            .strip_prefix("created:")
            .or_else(|| trimmed.strip_prefix("date:"))
        {
            date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok();
            in_tickers = false;
        } else if let Some(value) = trimmed.strip_prefix("tickers:") {
            let inline = value.trim();
            if let Some(list) = inline.strip_prefix('[') {
                tickers = list
                    .trim_end_matches(']')
                    .split(',')
                    .map(|t| t.trim().trim_matches('"').to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
                in_tickers = false;
            } else {
                in_tickers = true;
            }
        } else if in_tickers {
            if let Some(item) = trimmed.strip_prefix("- ") {
                tickers.push(item.trim().trim_matches('"').to_string());
            } else if !trimmed.is_empty() {
                in_tickers = false;
            }
        }
    }

    let body: String = text
        .lines()
        .skip(frontmatter_len)
        .collect::<Vec<_>>()
        .join("\n");

    Some(NoteDocument {
        date: date?,
        source: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        tickers,
        body,
    })
}
