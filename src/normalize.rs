//! Record normalisation: lowercase, letters only, stopwords out, nouns lemmatised.

use once_cell::sync::Lazy;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use unicode_normalization::UnicodeNormalization;

use crate::lexicon::is_stopword;

const MIN_TOKEN_LEN: usize = 3;

/// Normalise one record.
///
/// Never returns an empty string for non-empty input: when nothing survives
/// cleaning, the lowercased input comes back unchanged.
pub fn normalize(record: &str) -> String {
    let lowered = record.to_lowercase();

    // NFKD splits accented letters into base + combining mark; the mark is dropped below.
    let letters: String = lowered
        .nfkd()
        .filter(|c| c.is_ascii_lowercase() || c.is_whitespace())
        .collect();

    let cleaned = letters
        .split_whitespace()
        .filter(|w| w.len() >= MIN_TOKEN_LEN && !is_stopword(w))
        .map(lemmatize)
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.is_empty() {
        lowered
    } else {
        cleaned
    }
}

pub fn normalize_batch(records: &[String]) -> Vec<String> {
    records.par_iter().map(|r| normalize(r)).collect()
}

static IRREGULAR_PLURALS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("children", "child"),
        ("men", "man"),
        ("women", "woman"),
        ("people", "person"),
        ("feet", "foot"),
        ("teeth", "tooth"),
        ("mice", "mouse"),
        ("geese", "goose"),
        ("criteria", "criterion"),
        ("phenomena", "phenomenon"),
        ("analyses", "analysis"),
        ("crises", "crisis"),
        ("theses", "thesis"),
        ("leaves", "leaf"),
        ("knives", "knife"),
        ("lives", "life"),
        ("wives", "wife"),
        ("shelves", "shelf"),
        ("halves", "half"),
        ("loaves", "loaf"),
        ("thieves", "thief"),
    ]
    .into_iter()
    .collect()
});

// Words that end in "s" without being plurals.
static INVARIANT: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "always", "perhaps", "sometimes", "towards", "afterwards", "besides", "nowadays",
        "news", "series", "species", "lens", "gas", "yes", "plus", "thus", "bus", "chaos",
        "canvas", "atlas", "bias", "alias", "christmas", "whereas", "various", "mathematics",
        "physics", "economics", "politics", "ethics", "logistics", "analytics", "diabetes",
    ]
    .into_iter()
    .collect()
});

// Singular nouns ending in "ie"/"che" whose plural would otherwise be over-stripped.
static E_ENDING_NOUNS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "movie", "cookie", "pie", "tie", "lie", "calorie", "smoothie", "selfie", "rookie",
        "zombie", "brownie", "freebie", "veggie", "goalie", "genie", "prairie", "niche",
        "cache", "ache", "headache", "moustache", "avalanche", "psyche", "cliche", "shoe",
        "toe", "canoe", "oboe", "foe", "horseshoe",
    ]
    .into_iter()
    .collect()
});

/// Reduce a token to its noun base form.
///
/// Applies single reduction steps until a fixed point; a step whose result is
/// a stopword or shorter than three letters is rejected, so the output is
/// always itself a fixed point.
pub(crate) fn lemmatize(token: &str) -> String {
    let mut current = token.to_string();
    // every accepted step shortens the token or lands on an irregular base form
    for _ in 0..token.len() {
        match lemma_step(&current) {
            Some(next) if next != current && next.len() >= MIN_TOKEN_LEN && !is_stopword(&next) => {
                current = next;
            }
            _ => break,
        }
    }
    current
}

fn lemma_step(w: &str) -> Option<String> {
    if let Some(base) = IRREGULAR_PLURALS.get(w) {
        return Some(base.to_string());
    }
    if !w.ends_with('s') || INVARIANT.contains(w) {
        return None;
    }
    if w.ends_with("ss") || w.ends_with("us") || w.ends_with("is") {
        return None;
    }
    let without_s = &w[..w.len() - 1];
    if E_ENDING_NOUNS.contains(without_s) {
        return Some(without_s.to_string());
    }
    if let Some(stem) = w.strip_suffix("ies") {
        return Some(format!("{stem}y"));
    }
    if let Some(stem) = w.strip_suffix("es") {
        if stem.ends_with('x')
            || stem.ends_with("ch")
            || stem.ends_with("sh")
            || stem.ends_with("ss")
            || stem.ends_with("zz")
            || stem.ends_with('o')
        {
            return Some(stem.to_string());
        }
    }
    Some(without_s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn cleans_and_lemmatises() {
        assert_eq!(
            normalize("The speakers were GREAT, 10/10 presentations!"),
            "speaker great presentation"
        );
        assert_eq!(normalize("Boxes of cookies and churches"), "box cookie church");
        assert_eq!(normalize("Stories from parties"), "story party");
    }

    #[test]
    fn accents_fold_to_base_letters() {
        assert_eq!(normalize("Café décor"), "cafe decor");
    }

    #[test]
    fn all_noise_returns_lowercased_input() {
        assert_eq!(normalize("123 !!! 456"), "123 !!! 456");
        assert_eq!(normalize("It IS the"), "it is the");
    }

    #[test]
    fn invariant_words_keep_their_s() {
        assert_eq!(lemmatize("glass"), "glass");
        assert_eq!(lemmatize("glasses"), "glass");
        assert_eq!(lemmatize("always"), "always");
        assert_eq!(lemmatize("focus"), "focus");
        assert_eq!(lemmatize("analysis"), "analysis");
    }

    #[test]
    fn lemma_never_becomes_stopword_or_short() {
        // "wills" would reduce to the stopword "will"
        assert_eq!(lemmatize("wills"), "wills");
        assert_eq!(lemmatize("ids"), "ids");
    }

    #[test]
    fn irregular_reached_through_regular_step_is_stable() {
        assert_eq!(lemmatize("peoples"), "person");
        assert_eq!(lemmatize("person"), "person");
    }

    #[test]
    fn batch_preserves_order() {
        let out = normalize_batch(&["Loud echoes".into(), "Dim lights".into()]);
        assert_eq!(out, vec!["loud echo".to_string(), "dim light".to_string()]);
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "\\PC{0,80}") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once.clone());
        }

        #[test]
        fn non_empty_input_never_normalises_to_empty(s in "\\PC{1,60}") {
            prop_assert!(!normalize(&s).is_empty());
        }
    }
}
