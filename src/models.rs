use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// One raw feedback string. Its position in the batch is its only identity.
pub type Record = String;

/// Ranked theme label → salience score.
///
/// Entries are kept sorted by descending score; equal scores are ordered by
/// label (byte-wise ascending). Serialises as a JSON object in rank order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThemeMap {
    entries: Vec<(String, u32)>,
}

impl ThemeMap {
    /// Rank `entries` and keep the first `cap`. Later duplicates of a label are dropped.
    pub fn ranked(entries: impl IntoIterator<Item = (String, u32)>, cap: usize) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut entries: Vec<(String, u32)> = entries
            .into_iter()
            .filter(|(label, _)| seen.insert(label.clone()))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(cap);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, score)| *score)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(l, s)| (l.as_str(), *s))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn top_labels(&self, n: usize) -> Vec<&str> {
        self.labels().take(n).collect()
    }
}

impl Serialize for ThemeMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, score) in &self.entries {
            map.serialize_entry(label, score)?;
        }
        map.end()
    }
}

/// Percentages; approximately (not exactly) 100 in total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SentimentDistribution {
    pub positive: u32,
    pub negative: u32,
    pub neutral: u32,
}

impl SentimentDistribution {
    pub fn sum(&self) -> u32 {
        self.positive + self.negative + self.neutral
    }
}

/// Records grouped under one dense label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub label: usize,
    pub members: Vec<usize>, // record indices, ascending
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn records<'a>(&self, records: &'a [Record]) -> Vec<&'a str> {
        self.members.iter().map(|&i| records[i].as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterNarrative {
    pub cluster_id: usize,
    pub summary: String,
    pub size: usize,
    pub sample_feedback: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterInfo {
    pub n_clusters: usize,
    pub clusters: Vec<ClusterNarrative>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_responses: usize,
    pub positive_count: usize,
    pub negative_count: usize,
    pub neutral_count: usize,
    pub clusters_found: usize,
    pub themes_identified: usize,
}

impl Statistics {
    pub fn new(
        total: usize,
        sentiment: &SentimentDistribution,
        clusters_found: usize,
        themes_identified: usize,
    ) -> Self {
        let share = |pct: u32| ((pct as f64 * total as f64) / 100.0).round() as usize;
        Self {
            total_responses: total,
            positive_count: share(sentiment.positive),
            negative_count: share(sentiment.negative),
            neutral_count: share(sentiment.neutral),
            clusters_found,
            themes_identified,
        }
    }
}

/// Terminal output of one analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisReport {
    pub summary: String,
    pub key_themes: ThemeMap,
    pub sentiment_distribution: SentimentDistribution,
    pub statistics: Statistics,
    pub suggestions: Vec<String>,
    pub cluster_info: ClusterInfo,
}

impl AnalysisReport {
    /// Placeholder report for an empty batch.
    pub fn empty() -> Self {
        Self {
            summary: "No feedback data to analyze".to_string(),
            key_themes: ThemeMap::default(),
            sentiment_distribution: SentimentDistribution::default(),
            statistics: Statistics::default(),
            suggestions: vec!["No suggestions available".to_string()],
            cluster_info: ClusterInfo::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statistics.total_responses == 0
    }

    /// Pretty JSON with `key_themes` in rank order. Every numeric leaf is a
    /// plain JSON integer.
    ///
    /// Serialises straight to text: a `serde_json::Value` object would re-sort
    /// the theme keys alphabetically.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Result of a stage that may degrade to a deterministic substitute.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage<T> {
    Ok(T),
    Fallback(T),
}

impl<T> Stage<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Stage::Fallback(_))
    }

    pub fn value(&self) -> &T {
        match self {
            Stage::Ok(v) | Stage::Fallback(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Stage::Ok(v) | Stage::Fallback(v) => v,
        }
    }
}

/// Names of the stages that fell back during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageTrace {
    pub fallbacks: Vec<String>,
}

impl StageTrace {
    pub fn record<T>(&mut self, stage: &str, outcome: &Stage<T>) {
        if outcome.is_fallback() {
            self.fallbacks.push(stage.to_string());
        }
    }

    pub fn degraded(&self, stage: &str) -> bool {
        self.fallbacks.iter().any(|s| s == stage)
    }
}
