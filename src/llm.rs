use anyhow::{anyhow, Result};
use async_trait::async_trait;
use awful_aj::{api::ask, config::AwfulJadeConfig, template::ChatTemplate};
use tracing::{debug, info};

/// Text generation used for narratives, summaries, suggestions and sentiment.
///
/// Callers treat an error and an empty answer the same way: as a failure that
/// selects the stage's deterministic fallback.
#[async_trait]
pub trait NarrativeBackend: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String>;
}

/// Chat-completions backend configured through `awful_aj`.
pub struct AwfulJadeBackend {
    cfg: AwfulJadeConfig,
    tpl: ChatTemplate,
}

impl AwfulJadeBackend {
    pub fn new(cfg: AwfulJadeConfig, tpl: ChatTemplate) -> Self {
        Self { cfg, tpl }
    }
}

#[async_trait]
impl NarrativeBackend for AwfulJadeBackend {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let start = std::time::Instant::now();

        debug!("LLM call starting - prompt_length={} chars", prompt.len());

        // Map Box<dyn StdError> -> anyhow::Error *before* `?`
        let answer = ask(&self.cfg, prompt.to_string(), &self.tpl, None, None, false)
            .await
            .map_err(|e| anyhow!(e.to_string()))?;

        info!(
            "LLM API call completed - duration={:.2}s, response_length={} chars",
            start.elapsed().as_secs_f32(),
            answer.len()
        );

        Ok(answer)
    }
}

/// Backend that never produces text; every narrative stage falls back.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentBackend;

#[async_trait]
impl NarrativeBackend for SilentBackend {
    async fn generate_text(&self, _prompt: &str) -> Result<String> {
        Ok(String::new())
    }
}

/// Run one backend call, collapsing errors and blank answers to `None`.
pub async fn generate_or_none(backend: &dyn NarrativeBackend, stage: &str, prompt: &str) -> Option<String> {
    match backend.generate_text(prompt).await {
        Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(_) => {
            debug!("Backend returned empty text - stage={}", stage);
            None
        }
        Err(e) => {
            debug!("Backend call failed - stage={}, error={}", stage, e);
            None
        }
    }
}
