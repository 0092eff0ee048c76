// src/parser.rs
//! Tolerant extraction of labeled fields from the model's free-text reply.
//!
//! Replies come in several shapes depending on the prompt: pipe separated
//! (`SINAL: COMPRA | ATIVO: EUR/USD | ...`), one label per line (optionally
//! with markdown bullets or bold), or the short spoken live-mode phrase
//! (`Sinal de VENDA no GBP/JPY. Motivo: PAVIO.`). Every field is extracted
//! independently; anything missing falls back to a fixed placeholder.

use chrono::{DateTime, Utc};

use crate::signal::{AnalysisResult, DEFAULT_ASSET, DEFAULT_CONFIDENCE, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Signal,
    Asset,
    Confidence,
    Reason,
}

const LABELS: &[(&str, Field)] = &[
    ("SINAL", Field::Signal),
    ("SIGNAL", Field::Signal),
    ("ATIVO", Field::Asset),
    ("ASSET", Field::Asset),
    ("PAR", Field::Asset),
    ("PAIR", Field::Asset),
    ("ASSERTIVIDADE", Field::Confidence),
    ("CONFIDENCE", Field::Confidence),
    ("CONFIANCA", Field::Confidence),
    ("CONFIANÇA", Field::Confidence),
    ("MOTIVO", Field::Reason),
    ("REASON", Field::Reason),
];

#[derive(Debug, Default)]
struct Fields {
    signal: Option<String>,
    asset: Option<String>,
    confidence: Option<String>,
    reason: Option<String>,
}

impl Fields {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Signal => &mut self.signal,
            Field::Asset => &mut self.asset,
            Field::Confidence => &mut self.confidence,
            Field::Reason => &mut self.reason,
        }
    }

    fn is_missing(&self, field: Field) -> bool {
        match field {
            Field::Signal => self.signal.is_none(),
            Field::Asset => self.asset.is_none(),
            Field::Confidence => self.confidence.is_none(),
            Field::Reason => self.reason.is_none(),
        }
    }

    /// First non-empty value wins.
    fn offer(&mut self, field: Field, value: &str) {
        let value = clean_value(value);
        if value.is_empty() {
            return;
        }
        let slot = self.slot(field);
        if slot.is_none() {
            *slot = Some(value);
        }
    }
}

/// Parses a model reply into an [`AnalysisResult`] stamped with `at`.
///
/// Pure: the same `(text, at)` always yields the same result.
pub fn parse_response(text: &str, at: DateTime<Utc>) -> AnalysisResult {
    let mut fields = Fields::default();

    for segment in text.split(['|', '\n', '\r']) {
        if let Some((field, value)) = labeled_segment(segment) {
            // another label on the same segment ends this value
            let end = label_hits(value).first().map_or(value.len(), |h| h.start);
            fields.offer(field, &value[..end]);
        }
    }
    inline_labels(text, &mut fields);
    spoken_phrase(text, &mut fields);

    let raw = text.trim();
    let signal = fields
        .signal
        .as_deref()
        .map(|v| Signal::from_token(signal_token(v)))
        .unwrap_or(Signal::Error);

    AnalysisResult {
        signal,
        timestamp: at,
        reason: fields.reason.unwrap_or_else(|| inconclusive(raw)),
        asset: fields.asset.unwrap_or_else(|| DEFAULT_ASSET.to_string()),
        confidence: fields
            .confidence
            .unwrap_or_else(|| DEFAULT_CONFIDENCE.to_string()),
        raw_reply: raw.to_string(),
    }
}

fn inconclusive(raw: &str) -> String {
    if raw.is_empty() {
        "Inconclusive analysis. Model reply was empty.".to_string()
    } else {
        format!("Inconclusive analysis. Model reply: {}", raw)
    }
}

/// `LABEL: value` at the start of a segment, ignoring markdown decoration.
fn labeled_segment(segment: &str) -> Option<(Field, &str)> {
    let segment = segment.trim_start_matches(|c: char| {
        c.is_whitespace() || matches!(c, '*' | '-' | '#' | '>' | '•' | '"' | '\'' | '`')
    });
    let (label, value) = segment.split_once(':')?;
    let label = label.trim().trim_matches('*').trim().to_uppercase();
    LABELS
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, field)| (*field, value))
}

#[derive(Debug)]
struct LabelHit {
    start: usize,
    value_start: usize,
    field: Field,
}

/// Labels appearing anywhere in the text, e.g. several on one line.
/// A value runs until the next label, pipe or line break.
fn inline_labels(text: &str, fields: &mut Fields) {
    let hits = label_hits(text);
    for (i, hit) in hits.iter().enumerate() {
        if !fields.is_missing(hit.field) {
            continue;
        }
        let next = hits.get(i + 1).map_or(text.len(), |h| h.start);
        if next < hit.value_start {
            continue;
        }
        let tail = &text[hit.value_start..next];
        let end = tail.find(['|', '\n', '\r']).unwrap_or(tail.len());
        fields.offer(hit.field, &tail[..end]);
    }
}

fn label_hits(text: &str) -> Vec<LabelHit> {
    let bytes = text.as_bytes();
    let mut hits = Vec::new();

    for (label, field) in LABELS {
        let mut from = 0;
        while let Some(start) = find_ignore_ascii_case(text, label, from) {
            from = start + 1;
            let word_start = start == 0 || !is_word_byte(bytes[start - 1]);
            if !word_start {
                continue;
            }
            // allow `**LABEL**:` and `LABEL :`
            let mut pos = start + label.len();
            while pos < bytes.len() && (bytes[pos] == b'*' || bytes[pos] == b' ') {
                pos += 1;
            }
            if pos < bytes.len() && bytes[pos] == b':' {
                hits.push(LabelHit {
                    start,
                    value_start: pos + 1,
                    field: *field,
                });
            }
        }
    }

    hits.sort_by_key(|h| h.start);
    hits
}

/// `Sinal de COMPRA no EUR/USD.` as produced by the live prompt.
fn spoken_phrase(text: &str, fields: &mut Fields) {
    if !fields.is_missing(Field::Signal) {
        return;
    }
    let Some(start) = find_ignore_ascii_case(text, "sinal de ", 0) else {
        return;
    };
    let rest = &text[start + "sinal de ".len()..];
    let token = signal_token(rest);
    if token.is_empty() {
        return;
    }
    fields.offer(Field::Signal, token);

    let lead = rest.len() - rest.trim_start_matches(|c: char| !c.is_alphabetic()).len();
    let after = rest[lead + token.len()..].trim_start();
    for prep in ["no ", "na ", "em ", "on ", "in "] {
        if after.len() >= prep.len()
            && after.is_char_boundary(prep.len())
            && after[..prep.len()].eq_ignore_ascii_case(prep)
        {
            let asset = &after[prep.len()..];
            let end = sentence_end(asset);
            fields.offer(Field::Asset, &asset[..end]);
            break;
        }
    }
}

/// Index of the first `|`, `,`, line break, or full stop that ends a sentence.
fn sentence_end(s: &str) -> usize {
    let bytes = s.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'|' | b',' | b'\n' | b'\r' => return i,
            b'.' if i + 1 == bytes.len() || bytes[i + 1].is_ascii_whitespace() => return i,
            _ => {}
        }
    }
    bytes.len()
}

/// Leading alphabetic word of a signal value: `[COMPRA / CALL]` -> `COMPRA`.
fn signal_token(value: &str) -> &str {
    let value = value.trim_start_matches(|c: char| !c.is_alphabetic());
    let end = value
        .char_indices()
        .find(|(_, c)| !c.is_alphabetic())
        .map_or(value.len(), |(i, _)| i);
    &value[..end]
}

fn clean_value(value: &str) -> String {
    value
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '"' | '`'))
        .to_string()
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn find_ignore_ascii_case(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (from..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}
