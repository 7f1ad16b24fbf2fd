//! Test doubles shared by the module tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embed::Embedder;
use crate::llm::NarrativeBackend;

/// Thirteen short event-feedback records: praise and complaints about sound,
/// speaker and lighting.
pub const EVENT_FEEDBACK: [&str; 13] = [
    "The sound system had a terrible echo in the main hall",
    "Audio was too loud and the microphone kept cutting out",
    "Great speaker, very engaging and clear presentation",
    "The speaker was excellent and answered every question",
    "Lighting on stage was too dim to see the slides",
    "Stage lighting was harsh and distracting",
    "Loved the keynote speaker, really informative talk",
    "The sound quality was poor at the back of the room",
    "Bright lights made it hard to read the screen",
    "Speaker seemed nervous but the content was good",
    "Microphone feedback noise was annoying during the panel",
    "Excellent presentation, the speaker knew the topic well",
    "The lighting and sound both need improvement next time",
];

pub fn event_feedback() -> Vec<String> {
    EVENT_FEEDBACK.iter().map(|s| s.to_string()).collect()
}

/// Answers with the response of the first rule whose needle occurs in the
/// prompt, or empty text when none does. Counts calls.
#[derive(Default)]
pub struct ScriptedBackend {
    rules: Vec<(String, String)>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: &str, response: &str) -> Self {
        self.rules.push((needle.to_string(), response.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NarrativeBackend for ScriptedBackend {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_default())
    }
}

/// Backend whose every call errors.
pub struct BrokenBackend;

#[async_trait]
impl NarrativeBackend for BrokenBackend {
    async fn generate_text(&self, _prompt: &str) -> Result<String> {
        bail!("backend unreachable")
    }
}

/// Embedder that is always unavailable.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("embedding model unavailable")
    }

    fn name(&self) -> &str {
        "failing"
    }
}
