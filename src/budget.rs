pub fn approx_tokens(s: &str) -> usize {
    // heuristic ~4 chars/token
    (s.chars().count() + 3) / 4
}

/// Trim `s` at a char boundary until it fits `max_tokens`.
pub fn cap_text(s: &str, max_tokens: usize) -> String {
    if approx_tokens(s) <= max_tokens {
        return s.to_string();
    }
    let keep = max_tokens * 4;
    s.chars().take(keep).collect::<String>().trim_end().to_string()
}
