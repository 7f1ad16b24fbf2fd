// src/lexicon.rs
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// NLTK english stopword list.
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "i","me","my","myself","we","our","ours","ourselves","you","you're","you've","you'll",
        "you'd","your","yours","yourself","yourselves","he","him","his","himself","she","she's",
        "her","hers","herself","it","it's","its","itself","they","them","their","theirs",
        "themselves","what","which","who","whom","this","that","that'll","these","those","am",
        "is","are","was","were","be","been","being","have","has","had","having","do","does",
        "did","doing","a","an","the","and","but","if","or","because","as","until","while","of",
        "at","by","for","with","about","against","between","into","through","during","before",
        "after","above","below","to","from","up","down","in","out","on","off","over","under",
        "again","further","then","once","here","there","when","where","why","how","all","any",
        "both","each","few","more","most","other","some","such","no","nor","not","only","own",
        "same","so","than","too","very","s","t","can","will","just","don","don't","should",
        "should've","now","d","ll","m","o","re","ve","y","ain","aren","aren't","couldn",
        "couldn't","didn","didn't","doesn","doesn't","hadn","hadn't","hasn","hasn't","haven",
        "haven't","isn","isn't","ma","mightn","mightn't","mustn","mustn't","needn","needn't",
        "shan","shan't","shouldn","shouldn't","wasn","wasn't","weren","weren't","won","won't",
        "wouldn","wouldn't",
    ]
    .into_iter()
    .collect()
});

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(word)
}

/// Words that mark a feedback item as favourable.
pub static POSITIVE_MARKERS: &[&str] = &[
    "good", "great", "excellent", "outstanding", "amazing", "awesome", "love", "loved",
    "helpful", "informative", "engaging", "clear", "well", "best", "fantastic", "wonderful",
    "enjoyed", "perfect", "friendly", "nice", "useful", "impressive", "positive", "praise",
];

/// Words that mark a feedback item as unfavourable.
pub static NEGATIVE_MARKERS: &[&str] = &[
    "bad", "poor", "terrible", "awful", "worst", "slow", "rude", "dirty", "boring",
    "annoying", "distracting", "disappointing", "disappointed", "problem", "issue", "issues",
    "complaint", "needs", "lacking", "too", "nervous", "hate", "negative", "broken", "noisy",
];

/// Count occurrences of `tokens` in `text` at word boundaries.
pub fn count_tokens(text: &str, tokens: &[&str]) -> usize {
    if tokens.is_empty() {
        return 0;
    }
    let pattern = tokens
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    match regex_cached(&format!(r"(?i)\b(?:{})\b", pattern)) {
        Some(re) => re.find_iter(text).count(),
        None => 0,
    }
}

/// Case-insensitive substring test against several needles.
pub fn mentions_any(haystack_lower: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack_lower.contains(n))
}

/// "sound system" → "Sound System".
pub fn title_case(phrase: &str) -> String {
    phrase
        .split(' ')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Thread-safe regex cache (clone-on-read). `None` when the pattern does not compile.
pub fn regex_cached(pat: &str) -> Option<Regex> {
    static REGEX_CACHE: Lazy<RwLock<HashMap<String, Regex>>> =
        Lazy::new(|| RwLock::new(HashMap::new()));

    if let Ok(cache) = REGEX_CACHE.read() {
        if let Some(r) = cache.get(pat) {
            return Some(r.clone());
        }
    }
    let compiled = Regex::new(pat).ok()?;
    if let Ok(mut w) = REGEX_CACHE.write() {
        w.insert(pat.to_string(), compiled.clone());
    }
    Some(compiled)
}
