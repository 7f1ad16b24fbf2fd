//! Theme extraction: per-record semantic keyphrases, corpus TF-IDF, and the merge.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use tracing::debug;

use crate::lexicon::{is_stopword, regex_cached, title_case};
use crate::models::ThemeMap;
use crate::similarity::cosine_similarity;

/// Records shorter than this (trimmed chars) yield no semantic keyphrases.
pub const MIN_KEYPHRASE_TEXT_LEN: usize = 5;

/// Lowercased word tokens of two or more word characters, stopwords removed.
pub fn content_tokens(text: &str) -> Vec<String> {
    let Some(re) = regex_cached(r"\b\w\w+\b") else {
        return Vec::new();
    };
    let lowered = text.to_lowercase();
    re.find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .filter(|t| !is_stopword(t))
        .collect()
}

/// Unigrams followed by bigrams over the stopword-free token stream.
pub fn ngrams(tokens: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tokens.to_vec();
    out.extend(tokens.windows(2).map(|w| format!("{} {}", w[0], w[1])));
    out
}

/// Candidate keyphrases for every record plus the deduplicated union.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub per_record: Vec<Vec<String>>,
    pub unique: Vec<String>,
}

pub fn collect_candidates(records: &[String]) -> CandidateSet {
    let per_record: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            if r.trim().chars().count() < MIN_KEYPHRASE_TEXT_LEN {
                return Vec::new();
            }
            ngrams(&content_tokens(r)).into_iter().unique().collect()
        })
        .collect();
    let unique = per_record.iter().flatten().cloned().unique().collect();
    CandidateSet { per_record, unique }
}

/// Semantic keyphrase themes.
///
/// For each record the `top_n` candidates closest (cosine) to the record's own
/// embedding are kept; phrases are then counted across records. `phrase_vectors`
/// is aligned with `candidates.unique`.
pub fn semantic_keywords(
    candidates: &CandidateSet,
    record_vectors: &[Vec<f32>],
    phrase_vectors: &[Vec<f32>],
    top_n: usize,
    cap: usize,
) -> ThemeMap {
    if candidates.per_record.len() < 2 || phrase_vectors.len() != candidates.unique.len() {
        return ThemeMap::default();
    }
    let lookup: HashMap<&str, &[f32]> = candidates
        .unique
        .iter()
        .map(String::as_str)
        .zip(phrase_vectors.iter().map(Vec::as_slice))
        .collect();

    let mut counts: HashMap<String, u32> = HashMap::new();
    for (phrases, doc_vec) in candidates.per_record.iter().zip(record_vectors) {
        let picked = phrases
            .iter()
            .filter_map(|p| lookup.get(p.as_str()).map(|v| (p, cosine_similarity(doc_vec, v))))
            .sorted_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)))
            .take(top_n);
        for (phrase, _) in picked {
            *counts.entry(title_case(phrase)).or_insert(0) += 1;
        }
    }
    debug!("Semantic keyphrases - unique={}", counts.len());
    ThemeMap::ranked(counts, cap)
}

/// Corpus TF-IDF themes.
///
/// Vocabulary: the `max_features` most frequent unigrams/bigrams across the
/// corpus. Weights use smoothed idf `ln((1+n)/(1+df)) + 1` on raw counts with
/// per-record L2 normalisation; a term's score is its mean weight × 100,
/// truncated. Returns the top `top_n` terms with a non-zero score, title-cased.
pub fn tfidf_keywords(records: &[String], max_features: usize, top_n: usize) -> ThemeMap {
    if records.len() < 2 {
        return ThemeMap::default();
    }
    let docs: Vec<Vec<String>> = records.iter().map(|r| ngrams(&content_tokens(r))).collect();

    let mut corpus_tf: HashMap<&str, usize> = HashMap::new();
    let mut df: HashMap<&str, usize> = HashMap::new();
    for doc in &docs {
        let mut seen = HashSet::new();
        for term in doc {
            *corpus_tf.entry(term.as_str()).or_insert(0) += 1;
            if seen.insert(term.as_str()) {
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }
    }
    if corpus_tf.is_empty() {
        return ThemeMap::default();
    }

    let vocab: Vec<&str> = corpus_tf
        .iter()
        .sorted_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)))
        .take(max_features)
        .map(|(t, _)| *t)
        .collect();

    let n = docs.len() as f64;
    let idf: Vec<f64> = vocab
        .iter()
        .map(|t| ((1.0 + n) / (1.0 + df[t] as f64)).ln() + 1.0)
        .collect();

    let mut totals = vec![0.0f64; vocab.len()];
    for doc in &docs {
        let counts = doc.iter().counts_by(|t| t.as_str());
        let mut row: Vec<f64> = vocab
            .iter()
            .zip(&idf)
            .map(|(t, w)| counts.get(t).copied().unwrap_or(0) as f64 * w)
            .collect();
        let norm = row.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            row.iter_mut().for_each(|x| *x /= norm);
        }
        totals.iter_mut().zip(row).for_each(|(acc, x)| *acc += x);
    }

    let scored = vocab
        .iter()
        .zip(totals)
        .map(|(t, total)| (*t, total / n))
        .sorted_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)))
        .take(top_n)
        .map(|(t, mean)| (title_case(t), (mean * 100.0) as u32))
        .filter(|(_, score)| *score > 0);

    ThemeMap::ranked(scored, top_n)
}

/// Union of both theme maps.
///
/// A label found in both gets the floored average of its two scores. The result
/// is ranked (score descending, label ascending on ties) and capped.
pub fn merge_themes(semantic: &ThemeMap, corpus: &ThemeMap, cap: usize) -> ThemeMap {
    let mut merged: Vec<(String, u32)> =
        semantic.iter().map(|(l, s)| (l.to_string(), s)).collect();
    for (label, score) in corpus.iter() {
        match merged.iter_mut().find(|(l, _)| l == label) {
            Some(entry) => entry.1 = (entry.1 + score) / 2,
            None => merged.push((label.to_string(), score)),
        }
    }
    ThemeMap::ranked(merged, cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn records(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn candidates_skip_short_records_and_stopwords() {
        let c = collect_candidates(&records(&["ok", "The sound was loud"]));
        assert!(c.per_record[0].is_empty());
        assert_eq!(c.per_record[1], vec!["sound", "loud", "sound loud"]);
        assert_eq!(c.unique.len(), 3);
    }

    #[test]
    fn tfidf_empty_and_single_inputs_yield_nothing() {
        assert!(tfidf_keywords(&[], 30, 10).is_empty());
        assert!(tfidf_keywords(&records(&["great sound"]), 30, 10).is_empty());
        assert!(tfidf_keywords(&records(&["the and", "of a"]), 30, 10).is_empty());
    }

    #[test]
    fn tfidf_ranks_recurring_terms_title_cased() {
        let docs = records(&[
            "sound system echo",
            "sound was too loud",
            "great speaker",
            "speaker was nervous, sound fine",
        ]);
        let themes = tfidf_keywords(&docs, 30, 10);
        assert!(themes.len() <= 10);
        assert!(themes.get("Sound").is_some());
        let scores: Vec<u32> = themes.iter().map(|(_, s)| s).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert!(scores.iter().all(|s| *s > 0));
    }

    #[test]
    fn semantic_counts_closest_phrases() {
        let cands = CandidateSet {
            per_record: vec![
                vec!["sound".into(), "slides".into()],
                vec!["sound".into(), "room".into()],
            ],
            unique: vec!["sound".into(), "slides".into(), "room".into()],
        };
        let docs = vec![vec![1.0, 0.0], vec![1.0, 0.1]];
        let phrases = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.2, 1.0]];
        let themes = semantic_keywords(&cands, &docs, &phrases, 1, 15);
        assert_eq!(themes.get("Sound"), Some(2));
        assert_eq!(themes.len(), 1);
    }

    #[test]
    fn semantic_single_record_is_empty() {
        let cands = CandidateSet {
            per_record: vec![vec!["sound".into()]],
            unique: vec!["sound".into()],
        };
        assert!(semantic_keywords(&cands, &[vec![1.0]], &[vec![1.0]], 3, 15).is_empty());
    }

    #[test]
    fn merge_averages_shared_labels_with_floor() {
        let a = ThemeMap::ranked(vec![("Sound".into(), 3), ("Speaker".into(), 2)], 15);
        let b = ThemeMap::ranked(vec![("Sound".into(), 8), ("Lighting".into(), 5)], 10);
        let m = merge_themes(&a, &b, 10);
        assert_eq!(m.get("Sound"), Some(5));
        assert_eq!(m.get("Speaker"), Some(2));
        assert_eq!(m.get("Lighting"), Some(5));
        // tie on 5 broken by label
        assert_eq!(m.top_labels(2), vec!["Lighting", "Sound"]);
    }

    fn theme_entries() -> impl Strategy<Value = Vec<(String, u32)>> {
        prop::collection::vec(("[a-h]{1,2}", 0u32..50), 0..12)
    }

    proptest! {
        #[test]
        fn merge_properties(a in theme_entries(), b in theme_entries()) {
            let sa = ThemeMap::ranked(a, 15);
            let sb = ThemeMap::ranked(b, 10);
            let m = merge_themes(&sa, &sb, 10);

            let union: HashSet<&str> = sa.labels().chain(sb.labels()).collect();
            prop_assert!(m.len() <= 10);
            prop_assert_eq!(m.len(), union.len().min(10));

            let scores: Vec<u32> = m.iter().map(|(_, s)| s).collect();
            prop_assert!(scores.windows(2).all(|w| w[0] >= w[1]));

            for (label, score) in m.iter() {
                let expected = match (sa.get(label), sb.get(label)) {
                    (Some(x), Some(y)) => (x + y) / 2,
                    (Some(x), None) => x,
                    (None, Some(y)) => y,
                    (None, None) => unreachable!(),
                };
                prop_assert_eq!(score, expected);
            }
        }
    }
}
