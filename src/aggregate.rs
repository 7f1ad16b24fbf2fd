//! Executive summary and recommendations built over every cluster narrative.

use tracing::{info, warn};

use crate::budget::cap_text;
use crate::lexicon::{count_tokens, mentions_any};
use crate::llm::{generate_or_none, NarrativeBackend};
use crate::models::{ClusterNarrative, Stage, ThemeMap};
use crate::prompts::{narrative_lines, user_executive_summary, user_suggestions};

/// Blocks shorter than this (chars) are not recommendations.
const MIN_RECOMMENDATION_LEN: usize = 10;

const MONITORING: &str = "📊 Implement Continuous Feedback Monitoring\n\
Set up weekly feedback review sessions to identify emerging issues early before they escalate.\n\
Use trend analysis dashboards to proactively address concerns before they become widespread problems.";

/// Shared prompt inputs: capped narrative lines and the top five themes.
pub struct AggregateInputs<'a> {
    pub narratives: &'a [ClusterNarrative],
    pub themes: &'a ThemeMap,
    pub total: usize,
    pub narrative_token_cap: usize,
}

impl AggregateInputs<'_> {
    fn cluster_lines(&self) -> String {
        cap_text(&narrative_lines(self.narratives), self.narrative_token_cap)
    }

    fn top_themes(&self) -> String {
        self.themes.top_labels(5).join(", ")
    }
}

pub async fn executive_summary(backend: &dyn NarrativeBackend, inputs: &AggregateInputs<'_>) -> Stage<String> {
    let start = std::time::Instant::now();
    let prompt = user_executive_summary(
        inputs.total,
        inputs.narratives.len(),
        &inputs.cluster_lines(),
        &inputs.top_themes(),
    );
    match generate_or_none(backend, "executive_summary", &prompt).await {
        Some(summary) => {
            info!("Executive summary completed - duration={:.2}s", start.elapsed().as_secs_f32());
            Stage::Ok(summary)
        }
        None => {
            warn!("Executive summary fell back to template");
            Stage::Fallback(fallback_summary(inputs.narratives, inputs.themes, inputs.total))
        }
    }
}

/// Templated summary: counts, a coarse tone read off the narratives, the top
/// themes and the top theme as the primary recommendation.
pub fn fallback_summary(narratives: &[ClusterNarrative], themes: &ThemeMap, total: usize) -> String {
    let text = narratives
        .iter()
        .map(|n| n.summary.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    let tone = if mentions_any(&text, &["positive", "praise", "excellent"]) {
        "generally positive with some areas for improvement"
    } else if mentions_any(&text, &["negative", "complaint", "poor"]) {
        "mixed with significant concerns noted"
    } else {
        "varied across different aspects"
    };

    let top = themes.top_labels(3);
    let key_themes = if top.is_empty() {
        "no single dominant topic".to_string()
    } else {
        top.join(", ")
    };
    let spread = if narratives.len() > 5 {
        "The diverse range of topics indicates customers focus on multiple aspects of the experience."
    } else {
        "Feedback is concentrated around a few specific areas requiring attention."
    };
    let primary = themes
        .labels()
        .next()
        .map(str::to_lowercase)
        .unwrap_or_else(|| "identified issues".to_string());

    format!(
        "Analyzed {total} customer feedbacks across {groups} thematic groups. \
The overall feedback is {tone}. \
Key themes include {key_themes}, which appear most frequently across responses. \
{spread} \
Primary recommendation: Address the most frequently mentioned theme ({primary}) to improve customer satisfaction. \
Regular monitoring of feedback trends is advised for continuous improvement.",
        groups = narratives.len(),
    )
}

/// Recommendations from the backend, or the rule table when nothing parses.
pub async fn suggestions(backend: &dyn NarrativeBackend, inputs: &AggregateInputs<'_>, cap: usize) -> Stage<Vec<String>> {
    let prompt = user_suggestions(&inputs.cluster_lines(), &inputs.top_themes());
    let parsed = generate_or_none(backend, "suggestions", &prompt)
        .await
        .map(|text| parse_recommendations(&text))
        .unwrap_or_default();

    if parsed.is_empty() {
        warn!("Suggestions fell back to rule table");
        let mut rules = fallback_suggestions(inputs.themes, inputs.narratives);
        rules.truncate(cap.max(1));
        return Stage::Fallback(rules);
    }
    info!("Suggestions parsed - count={}", parsed.len().min(cap));
    Stage::Ok(parsed.into_iter().take(cap.max(1)).collect())
}

/// Split on blank lines; strip enumeration from each line; drop short blocks.
pub fn parse_recommendations(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    let mut flush = |current: &mut Vec<&str>| {
        if !current.is_empty() {
            let block = current.join("\n");
            if block.chars().count() >= MIN_RECOMMENDATION_LEN {
                out.push(block);
            }
            current.clear();
        }
    };

    for line in text.trim().lines() {
        let line = line.trim();
        if line.is_empty() {
            flush(&mut current);
        } else {
            current.push(line.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ' '));
        }
    }
    flush(&mut current);
    out
}

struct Rule {
    triggers: &'static [&'static str],
    variants: &'static [(&'static [&'static str], &'static str)],
    default: &'static str,
}

static RULES: &[Rule] = &[
    Rule {
        triggers: &["food", "taste", "quality", "dish", "dishes", "meal", "meals"],
        variants: &[
            (&["salt", "seasoning"], "🍽️ Refine Food Seasoning\n\
Review and standardize salt and seasoning levels across all dishes to ensure consistency.\n\
Conduct regular taste tests and train kitchen staff on proper seasoning ratios to maintain quality."),
            (&["fresh", "stale"], "🥬 Improve Ingredient Freshness\n\
Source ingredients from reliable suppliers and implement daily freshness checks for all perishables.\n\
Reduce inventory holding time to ensure peak freshness in all meals served to customers."),
        ],
        default: "👨‍🍳 Enhance Food Quality Standards\n\
Establish strict quality control checkpoints in the kitchen and monitor dish consistency.\n\
Provide regular chef training and recipe standardization to maintain high culinary standards.",
    },
    Rule {
        triggers: &["service", "staff", "waiter", "waiters"],
        variants: &[
            (&["rude", "unfriendly"], "😊 Improve Staff Courtesy Training\n\
Implement customer service workshops focusing on greeting, communication, and empathy.\n\
Set clear expectations and recognise staff who receive positive feedback."),
            (&["slow", "wait"], "⏱️ Reduce Service Wait Times\n\
Optimize the kitchen-to-table workflow and add staff during identified peak hours.\n\
Track table waiting times so delays are spotted and fixed quickly."),
        ],
        default: "🤝 Strengthen Customer Service Excellence\n\
Conduct regular service quality audits and gather immediate feedback at the point of service.\n\
Empower frontline staff to resolve common issues on the spot without manager approval.",
    },
    Rule {
        triggers: &["place", "room", "rooms", "atmosphere", "venue", "hall"],
        variants: &[(&["clean", "hygiene"], "🧹 Enhance Cleanliness Standards\n\
Increase cleaning frequency and run hourly hygiene checks in all public areas and restrooms.\n\
Publish visible cleaning schedules to build customer trust.")],
        default: "🏠 Upgrade Ambiance and Comfort\n\
Improve lighting, seating comfort, and temperature control based on direct customer feedback.\n\
Small touches like plants, art, or music make the space more welcoming and memorable.",
    },
    Rule {
        triggers: &["sound", "audio", "microphone", "microphones", "mic", "mics", "echo"],
        variants: &[],
        default: "🎤 Fix Audio and Sound Quality\n\
Run a full sound check before each session and keep a technician on hand for microphone issues.\n\
Clear audio is the first thing attendees notice and the easiest complaint to prevent.",
    },
    Rule {
        triggers: &["light", "lights", "lighting", "screen", "screens", "slide", "slides"],
        variants: &[],
        default: "💡 Adjust Stage Lighting and Visibility\n\
Test lighting levels from the back rows and balance stage light against projected screens.\n\
Attendees who cannot see the slides disengage from otherwise strong content.",
    },
    Rule {
        triggers: &["session", "sessions", "schedule", "timing", "agenda"],
        variants: &[],
        default: "⏰ Tighten Session Timing\n\
Publish a realistic agenda and keep each session to its slot with visible time cues.\n\
Overruns compress breaks and Q&A, which attendees consistently value.",
    },
];

/// Rule-based recommendations: up to four matched categories, then monitoring.
///
/// Categories are triggered by whole words in the theme labels; the variant
/// within a category is picked from the narrative text.
pub fn fallback_suggestions(themes: &ThemeMap, narratives: &[ClusterNarrative]) -> Vec<String> {
    let theme_text = themes.labels().map(str::to_lowercase).collect::<Vec<_>>().join(" ");
    let summaries = narratives
        .iter()
        .map(|n| n.summary.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    let mut out: Vec<String> = RULES
        .iter()
        .filter(|rule| count_tokens(&theme_text, rule.triggers) > 0)
        .map(|rule| {
            rule.variants
                .iter()
                .find(|(keys, _)| mentions_any(&summaries, keys))
                .map(|(_, text)| *text)
                .unwrap_or(rule.default)
                .to_string()
        })
        .take(4)
        .collect();
    out.push(MONITORING.to_string());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::SilentBackend;
    use crate::testing::{BrokenBackend, ScriptedBackend};

    fn narrative(id: usize, summary: &str) -> ClusterNarrative {
        ClusterNarrative {
            cluster_id: id,
            summary: summary.to_string(),
            size: 3,
            sample_feedback: "x".to_string(),
        }
    }

    fn themes(labels: &[&str]) -> ThemeMap {
        ThemeMap::ranked(
            labels.iter().enumerate().map(|(i, l)| (l.to_string(), (100 - i) as u32)),
            10,
        )
    }

    #[test]
    fn parse_splits_blocks_and_strips_numbering() {
        let text = "1. 🎤 Fix the audio\nRun a sound check.\nKeep a tech nearby.\n\n\n2. 💡 Lights\nDim less.\n\nok\n";
        let recs = parse_recommendations(text);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0], "🎤 Fix the audio\nRun a sound check.\nKeep a tech nearby.");
        assert!(recs[1].starts_with("💡 Lights"));
    }

    #[tokio::test]
    async fn suggestions_are_capped_at_five() {
        let many = (1..=8)
            .map(|i| format!("{i}. Recommendation number {i}\nDo the thing.\nBecause it helps."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let backend = ScriptedBackend::new().on("ACTIONABLE", &many);
        let t = themes(&["Sound"]);
        let n = vec![narrative(0, "Audio issues")];
        let inputs = AggregateInputs { narratives: &n, themes: &t, total: 10, narrative_token_cap: 500 };
        let out = suggestions(&backend, &inputs, 5).await;
        assert!(!out.is_fallback());
        assert_eq!(out.value().len(), 5);
    }

    #[tokio::test]
    async fn unusable_suggestions_fall_back_with_monitoring_last() {
        let backend = ScriptedBackend::new().on("ACTIONABLE", "ok\n\nno");
        let t = themes(&["Sound System", "Staff", "Food", "Lighting", "Room", "Session"]);
        let n = vec![narrative(0, "Staff were rude and the food too salty")];
        let inputs = AggregateInputs { narratives: &n, themes: &t, total: 10, narrative_token_cap: 500 };
        let out = suggestions(&backend, &inputs, 5).await;
        assert!(out.is_fallback());
        let s = out.into_inner();
        assert_eq!(s.len(), 5);
        assert!(s[0].starts_with("🍽️ Refine Food Seasoning"));
        assert!(s[1].starts_with("😊 Improve Staff Courtesy"));
        assert!(s[4].starts_with("📊 Implement Continuous Feedback Monitoring"));
    }

    #[test]
    fn triggers_need_whole_words_in_theme_labels() {
        let t = themes(&["Delightful", "Dynamic Speaker", "Challenge", "Broom Closet"]);
        let s = fallback_suggestions(&t, &[]);
        assert_eq!(s.len(), 1);
        assert!(s[0].contains("Continuous Feedback Monitoring"));

        let s = fallback_suggestions(&themes(&["Stage Lights", "Mic"]), &[]);
        assert_eq!(s.len(), 3);
        assert!(s[0].starts_with("🎤 Fix Audio"));
        assert!(s[1].starts_with("💡 Adjust Stage Lighting"));
    }

    #[test]
    fn fallback_suggestions_never_empty() {
        let s = fallback_suggestions(&ThemeMap::default(), &[]);
        assert_eq!(s.len(), 1);
        assert!(s[0].contains("Continuous Feedback Monitoring"));
    }

    #[test]
    fn fallback_summary_tone_classes() {
        let t = themes(&["Sound", "Speaker", "Lighting", "Slides"]);
        let pos = fallback_summary(&[narrative(0, "Excellent talk")], &t, 13);
        assert!(pos.contains("generally positive with some areas for improvement"));
        assert!(pos.contains("Key themes include Sound, Speaker, Lighting,"));
        assert!(pos.contains("(sound)"));
        assert!(pos.starts_with("Analyzed 13 customer feedbacks across 1 thematic groups."));

        let neg = fallback_summary(&[narrative(0, "Poor acoustics")], &t, 13);
        assert!(neg.contains("mixed with significant concerns noted"));

        let neutral = fallback_summary(&[narrative(0, "Group of 3 related feedback items")], &ThemeMap::default(), 3);
        assert!(neutral.contains("varied across different aspects"));
        assert!(neutral.contains("(identified issues)"));
    }

    #[tokio::test]
    async fn summary_falls_back_on_silence_and_errors() {
        let t = themes(&["Sound"]);
        let n = vec![narrative(0, "Group of 3 related feedback items")];
        let inputs = AggregateInputs { narratives: &n, themes: &t, total: 3, narrative_token_cap: 500 };
        assert!(executive_summary(&SilentBackend, &inputs).await.is_fallback());
        assert!(executive_summary(&BrokenBackend, &inputs).await.is_fallback());

        let backend = ScriptedBackend::new().on("executive summary", "All good.");
        assert_eq!(executive_summary(&backend, &inputs).await, Stage::Ok("All good.".to_string()));
    }
}
