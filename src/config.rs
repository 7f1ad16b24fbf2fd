use serde::{Deserialize, Serialize};

use crate::cluster::ClusterParams;

/// Algorithm constants for one pipeline. Any field may be omitted from a
/// config file; missing fields take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub seed: u64,
    pub n_init: usize,
    pub max_iter: usize,
    pub max_clusters: usize,
    pub semantic_top_n: usize,      // keyphrases kept per record
    pub semantic_cap: usize,        // aggregated semantic themes
    pub tfidf_max_features: usize,
    pub tfidf_top_n: usize,
    pub theme_cap: usize,
    pub cluster_prompt_cap: usize,  // records per narration prompt
    pub narrative_token_cap: usize, // narrative lines in aggregate prompts
    pub suggestion_cap: usize,
    pub sentiment_sample: usize,    // records in the sentiment prompt
    pub sentiment_window: usize,    // chars around a label
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            n_init: 10,
            max_iter: 300,
            max_clusters: 10,
            semantic_top_n: 3,
            semantic_cap: 15,
            tfidf_max_features: 30,
            tfidf_top_n: 10,
            theme_cap: 10,
            cluster_prompt_cap: 20,
            narrative_token_cap: 2_000,
            suggestion_cap: 5,
            sentiment_sample: 50,
            sentiment_window: 50,
        }
    }
}

impl PipelineConfig {
    pub fn cluster_params(&self) -> ClusterParams {
        ClusterParams {
            seed: self.seed,
            n_init: self.n_init,
            max_iter: self.max_iter,
            max_clusters: self.max_clusters,
        }
    }

    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
