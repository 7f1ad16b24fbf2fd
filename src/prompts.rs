use crate::models::ClusterNarrative;

/// Narratives as `Group N (size feedbacks): summary` lines, one per cluster.
pub fn narrative_lines(narratives: &[ClusterNarrative]) -> String {
    narratives
        .iter()
        .map(|n| format!("Group {} ({} feedbacks): {}", n.cluster_id + 1, n.size, n.summary.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn user_cluster_summary(records: &[&str]) -> String {
    let combined = records
        .iter()
        .map(|r| format!("- {}", r.trim()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(r#"Analyze this group of similar customer feedback and provide a brief summary:

{combined}

Provide a 2-3 sentence summary covering:
1. Main theme/topic of this group
2. Key points mentioned
3. Overall tone (positive/negative/neutral/mixed)

Keep it concise and factual."#, combined = combined)
}

pub fn user_executive_summary(total: usize, n_clusters: usize, cluster_lines: &str, top_themes: &str) -> String {
    format!(r#"Based on analyzing {total} customer feedbacks grouped into {n_clusters} semantic clusters:

Cluster insights:
<{clusters}>

Top themes: {themes}

Provide a CONCISE executive summary in exactly 7-8 lines (NOT MORE).
Focus on:
- Overall sentiment/trend (1-2 lines)
- Top 2-3 key findings (3-4 lines)
- Primary recommendation (1-2 lines)

Write in paragraph format, NOT bullet points. Keep it brief, professional, and actionable."#,
        total = total, n_clusters = n_clusters, clusters = cluster_lines, themes = top_themes)
}

pub fn user_suggestions(cluster_lines: &str, top_themes: &str) -> String {
    format!(r#"Based on customer feedback analysis with these insights:

<{clusters}>

Top themes mentioned: {themes}

Generate 4-5 SPECIFIC, ACTIONABLE recommendations. Each recommendation must:
1. Start with an emoji icon relevant to the action
2. Have a clear title (what to improve)
3. Include 2 lines explaining SPECIFICALLY what to do and why

Format EXACTLY as:
[Emoji] [Title]
[Line 1: Specific action to take]
[Line 2: Why it matters or additional detail]

Prefer concrete actions ("reduce salt levels", "train staff on greeting customers") over generic advice ("improve food quality").

Separate recommendations with one blank line."#, clusters = cluster_lines, themes = top_themes)
}

pub fn user_sentiment(records: &[&str]) -> String {
    let combined = records
        .iter()
        .map(|r| format!("- {}", r.trim()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(r#"Classify the overall sentiment of the following customer feedback.

FEEDBACK:
<{combined}>

Answer with exactly three lines and nothing else:
Positive: NN%
Negative: NN%
Neutral: NN%

The three percentages should add up to 100."#, combined = combined)
}
