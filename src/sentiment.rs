//! Sentiment percentages recovered from free-text model output.
//!
//! Extraction tries a fixed list of phrasings per label, then a window of text
//! around the label, then gives 0. A zero total is replaced with a lexical
//! estimate over the raw records; an implausible total is rescaled toward 100.

use tracing::{debug, warn};

use crate::lexicon::{count_tokens, regex_cached, NEGATIVE_MARKERS, POSITIVE_MARKERS};
use crate::models::{SentimentDistribution, Stage};

/// Characters searched on either side of a label when no phrasing matched.
pub const DEFAULT_WINDOW: usize = 50;

const NUM: &str = r"(\d+(?:\.\d+)?)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub const ALL: [SentimentLabel; 3] = [Self::Positive, Self::Negative, Self::Neutral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "Positive",
            Self::Negative => "Negative",
            Self::Neutral => "Neutral",
        }
    }
}

fn patterns(label: &str) -> [String; 6] {
    [
        format!(r"(?i){label}\s*:\s*{NUM}\s*%"),
        format!(r"(?i){label}\s*-\s*{NUM}\s*%"),
        format!(r"(?i){label}\s*=\s*{NUM}\s*%"),
        format!(r"(?i){label}\s+is\s+{NUM}\s*%"),
        format!(r"(?i){NUM}\s*%\s*{label}"),
        format!(r"(?i){label}\D{{0,30}}?{NUM}\s*%"),
    ]
}

fn to_percent(raw: &str) -> Option<u32> {
    let v: f64 = raw.parse().ok()?;
    Some(v.round().clamp(0.0, 100.0) as u32)
}

/// Percentage for `label` in `text`, 0 when none can be found.
pub fn extract_percentage(text: &str, label: SentimentLabel, window: usize) -> u32 {
    let name = label.as_str();
    for pat in patterns(name) {
        let Some(re) = regex_cached(&pat) else { continue };
        if let Some(v) = re.captures(text).and_then(|c| c.get(1)).and_then(|m| to_percent(m.as_str())) {
            return v;
        }
    }
    window_search(text, name, window).unwrap_or(0)
}

fn window_search(text: &str, label: &str, window: usize) -> Option<u32> {
    let label_re = regex_cached(&format!("(?i){}", regex::escape(label)))?;
    let pct_re = regex_cached(&format!(r"{NUM}\s*%"))?;
    let hit = label_re.find(text)?;

    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let first = chars.iter().position(|(b, _)| *b == hit.start())?;
    let last = chars.iter().position(|(b, _)| *b >= hit.end()).unwrap_or(chars.len());
    let from = chars[first.saturating_sub(window)].0;
    let to = chars.get(last + window).map(|(b, _)| *b).unwrap_or(text.len());

    let caps = pct_re.captures(&text[from..to])?;
    to_percent(caps.get(1)?.as_str())
}

/// Lexical estimate from marker-word counts per record.
///
/// Each record is positive, negative or neutral by which marker set it hits
/// more often. Positive is floored at 10 and negative at 5; neutral takes the
/// remainder of 100.
pub fn lexical_fallback(records: &[String]) -> SentimentDistribution {
    let (mut pos, mut neg) = (0usize, 0usize);
    for r in records {
        let p = count_tokens(r, POSITIVE_MARKERS);
        let n = count_tokens(r, NEGATIVE_MARKERS);
        if p > n {
            pos += 1;
        } else if n > p {
            neg += 1;
        }
    }
    let total = records.len().max(1) as f64;
    let share = |c: usize| ((c as f64 * 100.0) / total).round() as u32;

    let mut positive = share(pos).max(10);
    let mut negative = share(neg).max(5);
    if positive + negative > 100 {
        if positive >= negative {
            positive = 100 - negative;
        } else {
            negative = 100 - positive;
        }
    }
    SentimentDistribution {
        positive,
        negative,
        neutral: 100 - positive - negative,
    }
}

/// Rescale by `100 / sum` when the sum lies outside `[80, 120]`.
pub fn normalize_distribution(d: SentimentDistribution) -> SentimentDistribution {
    let sum = d.sum();
    if sum == 0 || (80..=120).contains(&sum) {
        return d;
    }
    let scale = |v: u32| ((v as f64 * 100.0) / sum as f64).round() as u32;
    debug!("Rescaling sentiment - raw_sum={}", sum);
    SentimentDistribution {
        positive: scale(d.positive),
        negative: scale(d.negative),
        neutral: scale(d.neutral),
    }
}

/// Distribution from backend text, or the lexical fallback when the text
/// carries no usable percentages (or there is no text).
pub fn estimate_sentiment(text: Option<&str>, records: &[String], window: usize) -> Stage<SentimentDistribution> {
    let raw = match text {
        Some(t) => SentimentDistribution {
            positive: extract_percentage(t, SentimentLabel::Positive, window),
            negative: extract_percentage(t, SentimentLabel::Negative, window),
            neutral: extract_percentage(t, SentimentLabel::Neutral, window),
        },
        None => SentimentDistribution::default(),
    };
    if raw.sum() == 0 {
        warn!("Sentiment extraction found nothing, using lexical estimate - records={}", records.len());
        return Stage::Fallback(lexical_fallback(records));
    }
    Stage::Ok(normalize_distribution(raw))
}
