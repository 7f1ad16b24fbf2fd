use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::aggregate::{executive_summary, suggestions, AggregateInputs};
use crate::cluster::{cluster_embeddings, Clustering};
use crate::config::PipelineConfig;
use crate::embed::Embedder;
use crate::error::{AnalysisError, AnalysisResult};
use crate::fetch::FeedbackSource;
use crate::keywords::{collect_candidates, merge_themes, semantic_keywords, tfidf_keywords};
use crate::llm::{generate_or_none, NarrativeBackend};
use crate::models::{AnalysisReport, ClusterInfo, Record, Stage, StageTrace, Statistics, ThemeMap};
use crate::narrate::narrate_clusters;
use crate::normalize::normalize_batch;
use crate::prompts::user_sentiment;
use crate::sentiment::estimate_sentiment;

/// Models and settings shared read-only by every request.
#[derive(Clone)]
pub struct PipelineContext {
    pub embedder: Arc<dyn Embedder>,
    pub backend: Arc<dyn NarrativeBackend>,
    pub config: PipelineConfig,
}

impl PipelineContext {
    pub fn new(embedder: Arc<dyn Embedder>, backend: Arc<dyn NarrativeBackend>, config: PipelineConfig) -> Self {
        Self { embedder, backend, config }
    }
}

/// A finished report plus the stages that degraded while producing it.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub report: AnalysisReport,
    pub trace: StageTrace,
}

fn check_vectors(vectors: &[Vec<f32>], expected: usize) -> AnalysisResult<()> {
    if vectors.len() != expected {
        return Err(AnalysisError::Embedding(format!(
            "got {} vectors for {} inputs",
            vectors.len(),
            expected
        )));
    }
    let dim = vectors.first().map(Vec::len).unwrap_or(0);
    if expected > 0 && (dim == 0 || vectors.iter().any(|v| v.len() != dim)) {
        return Err(AnalysisError::Embedding("vectors have inconsistent dimensions".to_string()));
    }
    Ok(())
}

/// Embed keyphrase candidates in one call. Failure only costs the semantic themes.
async fn semantic_themes(
    ctx: &PipelineContext,
    records: &[Record],
    record_vectors: &[Vec<f32>],
) -> Stage<ThemeMap> {
    let cfg = &ctx.config;
    let candidates = collect_candidates(records);
    if candidates.unique.is_empty() {
        return Stage::Ok(ThemeMap::default());
    }
    let phrase_vectors = match ctx.embedder.embed(&candidates.unique).await {
        Ok(v) if check_vectors(&v, candidates.unique.len()).is_ok() => v,
        Ok(_) => {
            warn!("Keyphrase embeddings unusable, skipping semantic themes");
            return Stage::Fallback(ThemeMap::default());
        }
        Err(e) => {
            warn!("Keyphrase embedding failed, skipping semantic themes - error={}", e);
            return Stage::Fallback(ThemeMap::default());
        }
    };
    debug!("Keyphrase candidates embedded - unique={}", candidates.unique.len());
    Stage::Ok(semantic_keywords(
        &candidates,
        record_vectors,
        &phrase_vectors,
        cfg.semantic_top_n,
        cfg.semantic_cap,
    ))
}

/// Run the full pipeline over one batch.
///
/// Only an embedding failure is fatal. Every other stage that degrades is
/// listed in the returned trace.
pub async fn run_analysis(ctx: &PipelineContext, records: &[Record]) -> AnalysisResult<Analysis> {
    let pipeline_start = std::time::Instant::now();
    let mut trace = StageTrace::default();
    if records.is_empty() {
        info!("Empty batch, returning placeholder report");
        return Ok(Analysis { report: AnalysisReport::empty(), trace });
    }
    let cfg = &ctx.config;
    let total = records.len();
    info!("Pipeline started - records={}, embedder={}", total, ctx.embedder.name());

    // 1) normalize + embed
    let embed_start = std::time::Instant::now();
    let normalized = normalize_batch(records);
    let vectors = ctx.embedder.embed(&normalized).await.map_err(|e| {
        error!("Embedding failed - error={}", e);
        AnalysisError::Embedding(e.to_string())
    })?;
    check_vectors(&vectors, total)?;
    info!(
        "Embedding completed - duration={:.2}s, records={}, dim={}",
        embed_start.elapsed().as_secs_f32(),
        total,
        vectors[0].len()
    );

    // 2) themes and clusters are independent
    let semantic = semantic_themes(ctx, records, &vectors).await;
    let cpu_start = std::time::Instant::now();
    let params = cfg.cluster_params();
    let (max_features, top_n) = (cfg.tfidf_max_features, cfg.tfidf_top_n);
    let owned_records = records.to_vec();
    // k-means with the silhouette search is CPU bound; keep it off the async workers
    let (corpus, clustering) = tokio::task::spawn_blocking(move || {
        rayon::join(
            || tfidf_keywords(&owned_records, max_features, top_n),
            || cluster_embeddings(&vectors, &params),
        )
    })
    .await?;
    trace.record("semantic_keywords", &semantic);
    trace.record("clustering", &clustering);
    let themes = merge_themes(semantic.value(), &corpus, cfg.theme_cap);
    let clustering: Clustering = clustering.into_inner();
    info!(
        "Themes and clusters completed - duration={:.2}s, themes={}, clusters={}",
        cpu_start.elapsed().as_secs_f32(),
        themes.len(),
        clustering.n_clusters()
    );

    // 3) per-cluster narration
    let backend = ctx.backend.as_ref();
    info!(
        "Narration starting - clusters={}, total_llm_calls={}",
        clustering.n_clusters(),
        clustering.n_clusters() + 3
    );
    let narratives = narrate_clusters(backend, records, &clustering.clusters, cfg.cluster_prompt_cap).await;
    trace.record("cluster_narration", &narratives);
    let narratives = narratives.into_inner();

    // 4) summary, suggestions and sentiment text in parallel
    let inputs = AggregateInputs {
        narratives: &narratives,
        themes: &themes,
        total,
        narrative_token_cap: cfg.narrative_token_cap,
    };
    let sample: Vec<&str> = records.iter().take(cfg.sentiment_sample).map(String::as_str).collect();
    let sentiment_prompt = user_sentiment(&sample);
    let (summary, recommendations, sentiment_text) = tokio::join!(
        executive_summary(backend, &inputs),
        suggestions(backend, &inputs, cfg.suggestion_cap),
        generate_or_none(backend, "sentiment", &sentiment_prompt),
    );
    let sentiment = estimate_sentiment(sentiment_text.as_deref(), records, cfg.sentiment_window);
    trace.record("executive_summary", &summary);
    trace.record("suggestions", &recommendations);
    trace.record("sentiment", &sentiment);

    let sentiment = sentiment.into_inner();
    let report = AnalysisReport {
        summary: summary.into_inner(),
        statistics: Statistics::new(total, &sentiment, clustering.n_clusters(), themes.len()),
        key_themes: themes,
        sentiment_distribution: sentiment,
        suggestions: recommendations.into_inner(),
        cluster_info: ClusterInfo {
            n_clusters: clustering.n_clusters(),
            clusters: narratives,
        },
    };

    info!(
        "Pipeline completed - total_duration={:.2}s, records={}, clusters={}, degraded={:?}",
        pipeline_start.elapsed().as_secs_f32(),
        total,
        report.cluster_info.n_clusters,
        trace.fallbacks
    );
    Ok(Analysis { report, trace })
}

/// Fetch from `source` and analyse. Fetch failures are fatal.
pub async fn analyze_source(
    ctx: &PipelineContext,
    source: &dyn FeedbackSource,
    source_ref: &str,
) -> AnalysisResult<(Vec<Record>, Analysis)> {
    let fetch_start = std::time::Instant::now();
    let records = source.fetch(source_ref).await.map_err(|e| {
        error!("Feedback fetch failed - source={}, error={}", source_ref, e);
        AnalysisError::from(e)
    })?;
    info!(
        "Feedback fetch completed - duration={:.2}s, records={}",
        fetch_start.elapsed().as_secs_f32(),
        records.len()
    );
    let analysis = run_analysis(ctx, &records).await?;
    Ok((records, analysis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::fallback_summary;
    use crate::embed::HashingEmbedder;
    use crate::error::FetchError;
    use crate::llm::SilentBackend;
    use crate::narrate::fallback_summary as narrative_template;
    use crate::testing::{event_feedback, FailingEmbedder, ScriptedBackend};
    use async_trait::async_trait;

    fn ctx(backend: Arc<dyn NarrativeBackend>) -> PipelineContext {
        PipelineContext::new(Arc::new(HashingEmbedder::default()), backend, PipelineConfig::default())
    }

    fn assert_partition(report: &AnalysisReport, total: usize) {
        let sizes: usize = report.cluster_info.clusters.iter().map(|c| c.size).sum();
        assert_eq!(sizes, total);
        assert_eq!(report.cluster_info.clusters.len(), report.cluster_info.n_clusters);
        for (i, c) in report.cluster_info.clusters.iter().enumerate() {
            assert_eq!(c.cluster_id, i);
            assert!(c.size > 0);
        }
    }

    #[tokio::test]
    async fn event_feedback_end_to_end() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on("brief summary", "Attendees discuss the event.")
                .on("executive summary", "Mostly positive with audio concerns.")
                .on("ACTIONABLE", "🎤 Fix audio\nRun a sound check.\nKeep a tech nearby.\n\n💡 Fix lights\nBrighten the stage.\nTest from the back.")
                .on("Classify the overall sentiment", "Positive: 46%\nNegative: 38%\nNeutral: 16%"),
        );
        let records = event_feedback();
        let out = run_analysis(&ctx(backend.clone()), &records).await.unwrap();
        let r = &out.report;

        assert_eq!(r.statistics.total_responses, 13);
        assert!((2..=8).contains(&r.statistics.clusters_found));
        assert!(!r.key_themes.is_empty());
        assert_eq!(r.statistics.themes_identified, r.key_themes.len());
        assert_partition(r, 13);
        assert_eq!(r.summary, "Mostly positive with audio concerns.");
        assert_eq!(r.suggestions.len(), 2);
        assert_eq!(r.sentiment_distribution.positive, 46);
        assert_eq!(r.statistics.positive_count, 6);
        assert_eq!(backend.calls(), r.cluster_info.n_clusters + 3);
        assert!(!out.trace.degraded("executive_summary"));
        assert!(!out.trace.degraded("sentiment"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn concurrent_requests_share_a_single_worker() {
        let ctx = ctx(Arc::new(SilentBackend));
        let records = event_feedback();
        let ticker = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            true
        });
        let (a, b) = tokio::join!(run_analysis(&ctx, &records), run_analysis(&ctx, &records));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(ticker.await.unwrap());
        assert_eq!(a.report, b.report);
        assert_partition(&a.report, 13);
    }

    #[tokio::test]
    async fn empty_batch_yields_placeholder_report() {
        let backend = Arc::new(ScriptedBackend::new());
        let out = run_analysis(&ctx(backend.clone()), &[]).await.unwrap();
        assert!(out.report.is_empty());
        assert_eq!(out.report.statistics, Statistics::default());
        assert!(!out.report.summary.is_empty());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn silent_backend_degrades_every_narrative_stage() {
        let records = event_feedback();
        let out = run_analysis(&ctx(Arc::new(SilentBackend)), &records).await.unwrap();
        let r = &out.report;

        for c in &r.cluster_info.clusters {
            assert_eq!(c.summary, narrative_template(c.size));
        }
        assert_eq!(r.summary, fallback_summary(&r.cluster_info.clusters, &r.key_themes, 13));
        assert!(r.summary.starts_with("Analyzed 13 customer feedbacks"));
        assert!(!r.suggestions.is_empty() && r.suggestions.len() <= 5);
        assert!(r.sentiment_distribution.positive >= 10);
        assert!(r.sentiment_distribution.negative >= 5);
        assert_partition(r, 13);
        for stage in ["cluster_narration", "executive_summary", "suggestions", "sentiment"] {
            assert!(out.trace.degraded(stage), "{stage}");
        }
    }

    #[tokio::test]
    async fn embedding_failure_is_fatal() {
        let ctx = PipelineContext::new(Arc::new(FailingEmbedder), Arc::new(SilentBackend), PipelineConfig::default());
        let err = run_analysis(&ctx, &event_feedback()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Embedding(_)));
    }

    /// Embeds records, then fails on the keyphrase batch.
    struct RecordsOnlyEmbedder(HashingEmbedder, std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl Embedder for RecordsOnlyEmbedder {
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            if self.1.fetch_add(1, std::sync::atomic::Ordering::SeqCst) > 0 {
                anyhow::bail!("quota exhausted");
            }
            self.0.embed(texts).await
        }

        fn name(&self) -> &str {
            "records-only"
        }
    }

    #[tokio::test]
    async fn keyphrase_embedding_failure_only_drops_semantic_themes() {
        let embedder = RecordsOnlyEmbedder(HashingEmbedder::default(), Default::default());
        let ctx = PipelineContext::new(Arc::new(embedder), Arc::new(SilentBackend), PipelineConfig::default());
        let out = run_analysis(&ctx, &event_feedback()).await.unwrap();
        assert!(out.trace.degraded("semantic_keywords"));
        assert!(!out.report.key_themes.is_empty());
    }

    struct MissingSheet;

    #[async_trait]
    impl FeedbackSource for MissingSheet {
        async fn fetch(&self, source_ref: &str) -> Result<Vec<Record>, FetchError> {
            Err(FetchError::NotFound(source_ref.to_string()))
        }
    }

    #[tokio::test]
    async fn fetch_failure_is_fatal() {
        let err = analyze_source(&ctx(Arc::new(SilentBackend)), &MissingSheet, "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Fetch(FetchError::NotFound(_))));
    }
}
