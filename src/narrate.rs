use futures::future::join_all;
use tracing::{info, warn};

use crate::llm::{generate_or_none, NarrativeBackend};
use crate::models::{Cluster, ClusterNarrative, Record, Stage};
use crate::prompts::user_cluster_summary;

/// Concurrent backend calls per batch.
pub const BATCH_SIZE: usize = 12;

pub fn fallback_summary(size: usize) -> String {
    format!("Group of {} related feedback items", size)
}

/// One narrative per cluster, in cluster order.
///
/// A cluster whose call fails or comes back blank gets the templated summary;
/// the others are unaffected. The whole stage reports `Fallback` when any
/// cluster fell back.
pub async fn narrate_clusters(
    backend: &dyn NarrativeBackend,
    records: &[Record],
    clusters: &[Cluster],
    prompt_cap: usize,
) -> Stage<Vec<ClusterNarrative>> {
    let start = std::time::Instant::now();
    let total = clusters.len();
    let mut narratives = Vec::with_capacity(total);
    let mut fallbacks = 0usize;

    for (batch_no, batch) in clusters.chunks(BATCH_SIZE).enumerate() {
        let prompts: Vec<String> = batch
            .iter()
            .map(|c| {
                let members = c.records(records);
                user_cluster_summary(&members[..members.len().min(prompt_cap)])
            })
            .collect();

        let tasks = prompts.iter().map(|p| generate_or_none(backend, "cluster_narration", p));
        let results = join_all(tasks).await;

        for (cluster, answer) in batch.iter().zip(results) {
            let summary = answer.unwrap_or_else(|| {
                fallbacks += 1;
                warn!("Cluster narration fell back - cluster={}, size={}", cluster.label, cluster.size());
                fallback_summary(cluster.size())
            });
            narratives.push(ClusterNarrative {
                cluster_id: cluster.label,
                summary,
                size: cluster.size(),
                sample_feedback: cluster
                    .members
                    .first()
                    .map(|&i| records[i].clone())
                    .unwrap_or_default(),
            });
        }
        info!(
            "Narration progress: {}/{} | batch={}",
            narratives.len(),
            total,
            batch_no + 1
        );
    }

    info!(
        "Cluster narration completed - duration={:.2}s, clusters={}, fallbacks={}",
        start.elapsed().as_secs_f32(),
        total,
        fallbacks
    );
    if fallbacks > 0 {
        Stage::Fallback(narratives)
    } else {
        Stage::Ok(narratives)
    }
}
