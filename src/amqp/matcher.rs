//! Topic pattern matching
//!
//! Implements the same routing rules a topic exchange applies to binding keys:
//! words are separated by `.`, `*` stands for exactly one word and `#` for zero
//! or more words. Matching is case-sensitive and anchored at both ends.

const SEPARATOR: char = '.';
const SINGLE_WORD: &str = "*";
const MULTI_WORD: &str = "#";

/// Decide whether `routing_key` is delivered to a queue bound with `pattern`
pub fn matches(routing_key: &str, pattern: &str) -> bool {
    if routing_key == pattern {
        return true;
    }

    let key: Vec<&str> = routing_key.split(SEPARATOR).collect();
    let words: Vec<&str> = pattern.split(SEPARATOR).collect();

    match_words(&key, &words)
}

/// Whether the pattern uses `*` or `#` anywhere
pub fn has_wildcards(pattern: &str) -> bool {
    pattern
        .split(SEPARATOR)
        .any(|word| word == SINGLE_WORD || word == MULTI_WORD)
}

/// Walk the pattern left to right keeping the set of key positions that are
/// still reachable. A `#` widens the set to every later position, so several
/// `#` segments in one pattern cost O(key * pattern) rather than backtracking.
fn match_words(key: &[&str], pattern: &[&str]) -> bool {
    // reachable[i]: key[..i] is fully consumed by the pattern prefix seen so far
    let mut reachable = vec![false; key.len() + 1];
    reachable[0] = true;

    for &word in pattern {
        let mut next = vec![false; key.len() + 1];

        match word {
            MULTI_WORD => {
                if let Some(first) = reachable.iter().position(|&r| r) {
                    next[first..].iter_mut().for_each(|slot| *slot = true);
                }
            }
            SINGLE_WORD => {
                for i in 0..key.len() {
                    if reachable[i] {
                        next[i + 1] = true;
                    }
                }
            }
            literal => {
                for i in 0..key.len() {
                    if reachable[i] && key[i] == literal {
                        next[i + 1] = true;
                    }
                }
            }
        }

        if !next.iter().any(|&r| r) {
            return false;
        }
        reachable = next;
    }

    reachable[key.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exact_match() {
        assert!(matches("match.created", "match.created"));
        assert!(!matches("match.created", "match.deleted"));
        assert!(!matches("match.created", "Match.created"));
        assert!(!matches("match.created.v2", "match.created"));
        assert!(!matches("match", "match.created"));
    }

    #[test]
    fn test_single_word_wildcard() {
        assert!(matches("match.created", "match.*"));
        assert!(!matches("match.created.v2", "match.*"));
        assert!(!matches("match", "match.*"));
        assert!(matches("match.created.v1", "match.*.v1"));
        assert!(!matches("match.v1", "match.*.v1"));
        assert!(!matches("match.created.v2", "match.*.v1"));
        assert!(matches("tournament.finished", "*.finished"));
        assert!(matches("season.finished", "*.*"));
    }

    #[test]
    fn test_multi_word_wildcard_trailing() {
        assert!(matches("match.created", "match.#"));
        assert!(matches("match", "match.#"));
        assert!(matches("match.created.v1.extra", "match.#"));
        assert!(!matches("tournament.created", "match.#"));
        assert!(!matches("matches.created", "match.#"));
    }

    #[test]
    fn test_multi_word_wildcard_middle() {
        assert!(matches("match.created.v1", "match.#.v1"));
        assert!(matches("match.v1", "match.#.v1"));
        assert!(matches("match.a.b.c.v1", "match.#.v1"));
        assert!(!matches("match.v1.extra", "match.#.v1"));
    }

    #[test]
    fn test_multi_word_wildcard_leading() {
        assert!(matches("event.match.created", "#.created"));
        assert!(matches("created", "#.created"));
        assert!(!matches("created.not", "#.created"));
    }

    #[test]
    fn test_hash_alone_matches_everything() {
        for key in ["match.created", "rankings.updated", "a", "a.b.c.d.e", ""] {
            assert!(matches(key, "#"), "'#' should match '{}'", key);
        }
    }

    #[test]
    fn test_multiple_hash_segments() {
        assert!(matches("match", "match.#.#"));
        assert!(matches("a.b.c", "#.b.#"));
        assert!(matches("b", "#.b.#"));
        assert!(!matches("a.c", "#.b.#"));
        assert!(matches("a.x.b.y.c", "a.#.b.#.c"));
        assert!(matches("a.b.c", "a.#.b.#.c"));
        assert!(!matches("a.c.b", "a.#.b.#.c"));
        assert!(matches("a.b", "#.#"));
    }

    #[test]
    fn test_mixed_wildcards() {
        assert!(matches("match.created.v1", "*.#"));
        assert!(!matches("", "*.#.v1"));
        assert!(matches("a.b.c", "#.*"));
        assert!(!matches("a.b", "*.*.#.*"));
        assert!(matches("a.b.c", "*.*.#.*"));
    }

    #[test]
    fn test_has_wildcards() {
        assert!(has_wildcards("match.*"));
        assert!(has_wildcards("#"));
        assert!(!has_wildcards("match.created"));
        assert!(!has_wildcards("match.*created"));
    }

    proptest! {
        #[test]
        fn prop_literal_patterns_match_only_themselves(
            key in "[a-z]{1,6}(\\.[a-z]{1,6}){0,4}",
            pattern in "[a-z]{1,6}(\\.[a-z]{1,6}){0,4}",
        ) {
            prop_assert_eq!(matches(&key, &pattern), key == pattern);
        }

        #[test]
        fn prop_hash_matches_any_key(key in "[a-z]{1,6}(\\.[a-z]{1,6}){0,6}") {
            prop_assert!(matches(&key, "#"));
        }

        #[test]
        fn prop_trailing_hash_accepts_extensions(
            prefix in "[a-z]{1,6}(\\.[a-z]{1,6}){0,3}",
            suffix in "(\\.[a-z]{1,6}){0,3}",
        ) {
            let key = format!("{}{}", prefix, suffix);
            let pattern = format!("{}.#", prefix);
            prop_assert!(matches(&key, &pattern));
        }
    }
}
