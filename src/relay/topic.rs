//! Topic-exchange routing key matching.
//!
//! Keys and patterns are dot-separated words. In a pattern `*` matches exactly
//! one word and `#` matches zero or more words.

/// Whether `routing_key` is selected by the binding `pattern`.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_from(&pattern, &key)
}

fn matches_from(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.first(), key.first()) {
        (None, None) => true,
        (Some(&"#"), _) => {
            // `#` swallows zero words, or one word and stays active.
            matches_from(&pattern[1..], key) || (!key.is_empty() && matches_from(pattern, &key[1..]))
        }
        (Some(&"*"), Some(_)) => matches_from(&pattern[1..], &key[1..]),
        (Some(word), Some(segment)) if word == segment => matches_from(&pattern[1..], &key[1..]),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_exactly_one_word() {
        assert!(topic_matches("match.*", "match.started"));
        assert!(topic_matches("match.*", "match.guess_executed"));
        assert!(!topic_matches("match.*", "match"));
        assert!(!topic_matches("match.*", "match.started.extra"));
        assert!(!topic_matches("match.*", "lobby.started"));
    }

    #[test]
    fn hash_matches_any_number_of_words() {
        assert!(topic_matches("match.#", "match"));
        assert!(topic_matches("match.#", "match.a.b.c"));
        assert!(topic_matches("#", "anything.at.all"));
        assert!(topic_matches("#.ended", "match.ended"));
        assert!(!topic_matches("#.ended", "match.started"));
    }

    #[test]
    fn literal_patterns_need_exact_keys() {
        assert!(topic_matches("match.ended", "match.ended"));
        assert!(!topic_matches("match.ended", "match.end"));
    }
}
