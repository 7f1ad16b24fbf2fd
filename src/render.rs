// src/render.rs
use crate::models::AnalysisReport;

pub fn render_markdown(r: &AnalysisReport) -> String {
    let mut md = String::new();
    md.push_str("# Feedback Analysis\n\n");

    md.push_str("## Executive Summary\n");
    md.push_str(&format!("{}\n\n", r.summary.trim()));

    md.push_str("## Statistics\n");
    let s = &r.statistics;
    md.push_str(&format!("- Responses: {}\n", s.total_responses));
    md.push_str(&format!("- Groups found: {}\n", s.clusters_found));
    md.push_str(&format!("- Themes identified: {}\n\n", s.themes_identified));

    md.push_str("## Sentiment\n");
    let d = &r.sentiment_distribution;
    md.push_str(&format!("- Positive: {}% ({})\n", d.positive, s.positive_count));
    md.push_str(&format!("- Negative: {}% ({})\n", d.negative, s.negative_count));
    md.push_str(&format!("- Neutral: {}% ({})\n\n", d.neutral, s.neutral_count));

    if !r.key_themes.is_empty() {
        md.push_str("## Key Themes\n");
        md.push_str("| Theme | Score |\n|---|---|\n");
        for (label, score) in r.key_themes.iter() {
            md.push_str(&format!("| {} | {} |\n", label, score));
        }
        md.push('\n');
    }

    if !r.cluster_info.clusters.is_empty() {
        md.push_str("## Feedback Groups\n");
        for c in &r.cluster_info.clusters {
            md.push_str(&format!("### Group {} ({} items)\n", c.cluster_id + 1, c.size));
            md.push_str(&format!("{}\n\n", c.summary.trim()));
            if !c.sample_feedback.is_empty() {
                md.push_str(&format!("> {}\n\n", c.sample_feedback.trim()));
            }
        }
    }

    md.push_str("## Recommendations\n");
    for (i, rec) in r.suggestions.iter().enumerate() {
        let mut lines = rec.lines();
        if let Some(title) = lines.next() {
            md.push_str(&format!("{}. **{}**\n", i + 1, title.trim()));
        }
        for line in lines {
            md.push_str(&format!("   {}\n", line.trim()));
        }
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClusterInfo, ClusterNarrative, SentimentDistribution, Statistics, ThemeMap};

    #[test]
    fn renders_every_section() {
        let sentiment = SentimentDistribution { positive: 50, negative: 30, neutral: 20 };
        let r = AnalysisReport {
            summary: "Mostly fine.".into(),
            key_themes: ThemeMap::ranked(vec![("Sound".into(), 12)], 10),
            sentiment_distribution: sentiment,
            statistics: Statistics::new(10, &sentiment, 1, 1),
            suggestions: vec!["🎤 Fix audio\nRun a sound check.".into()],
            cluster_info: ClusterInfo {
                n_clusters: 1,
                clusters: vec![ClusterNarrative {
                    cluster_id: 0,
                    summary: "Audio issues.".into(),
                    size: 10,
                    sample_feedback: "echo".into(),
                }],
            },
        };
        let md = render_markdown(&r);
        assert!(md.contains("## Executive Summary\nMostly fine."));
        assert!(md.contains("| Sound | 12 |"));
        assert!(md.contains("- Positive: 50% (5)"));
        assert!(md.contains("### Group 1 (10 items)"));
        assert!(md.contains("1. **🎤 Fix audio**\n   Run a sound check."));
    }

    #[test]
    fn empty_report_still_renders() {
        let md = render_markdown(&AnalysisReport::empty());
        assert!(md.contains("No feedback data to analyze"));
        assert!(!md.contains("## Key Themes"));
        assert!(md.contains("1. **No suggestions available**"));
    }
}
