//! Term-frequency ranking over a batch of free-text responses.

use std::collections::HashMap;

use log::debug;

use crate::config::{AggregationRules, TermCount, TieBreakMode};

/// Common English function words that carry no signal in a ranking.
pub const STOP_WORDS: [&str; 89] = [
    "a", "an", "the", "and", "but", "or", "for", "nor", "on", "at", "to", "by", "is", "are", "was",
    "were", "be", "been", "being", "have", "has", "had", "i", "you", "he", "she", "it", "we",
    "they", "my", "your", "his", "her", "its", "our", "their", "this", "that", "these", "those",
    "of", "in", "with", "about", "against", "between", "into", "through", "during", "before",
    "after", "above", "below", "from", "up", "down", "out", "off", "over", "under", "again",
    "further", "then", "once", "here", "there", "when", "where", "why", "how", "all", "any",
    "both", "each", "few", "more", "most", "other", "some", "such", "no", "not", "only", "own",
    "same", "so", "than", "too", "very",
];

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Lowercases the text, removes punctuation and returns the tokens that
/// survive the length and stop-word filters, in reading order.
pub fn tokenize(text: &str, rules: &AggregationRules) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| is_word_char(*c) || c.is_whitespace())
        .collect();
    cleaned
        .split_whitespace()
        .filter(|tok| tok.chars().count() >= rules.min_token_chars && !is_stop_word(tok))
        .map(|tok| tok.to_string())
        .collect()
}

/// Ranks the terms used across all the texts.
///
/// Only the terms appearing at least `rules.min_count` times are kept. The result is
/// sorted by decreasing count and holds at most `rules.max_terms` entries. An empty
/// input gives an empty ranking.
pub fn aggregate_responses<S: AsRef<str>>(texts: &[S], rules: &AggregationRules) -> Vec<TermCount> {
    let joined = texts
        .iter()
        .map(|t| t.as_ref())
        .collect::<Vec<&str>>()
        .join(" ");
    let tokens = tokenize(&joined, rules);

    // term -> (count, position of the first occurrence)
    let mut counts: HashMap<&str, (u64, usize)> = HashMap::new();
    for (pos, tok) in tokens.iter().enumerate() {
        let e = counts.entry(tok.as_str()).or_insert((0, pos));
        e.0 += 1;
    }
    debug!(
        "aggregate_responses: {} texts, {} tokens, {} distinct terms",
        texts.len(),
        tokens.len(),
        counts.len()
    );

    let mut ranked: Vec<(&str, u64, usize)> = counts
        .into_iter()
        .filter(|(_, (count, _))| *count >= rules.min_count)
        .map(|(term, (count, first_seen))| (term, count, first_seen))
        .collect();

    match rules.tiebreak_mode {
        TieBreakMode::Alphabetical => {
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        }
        TieBreakMode::FirstSeen => {
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.2.cmp(&b.2)));
        }
    }
    ranked.truncate(rules.max_terms);

    ranked
        .into_iter()
        .map(|(term, count, _)| TermCount::new(term, count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn pairs(res: &[TermCount]) -> Vec<(&str, u64)> {
        res.iter().map(|tc| (tc.term.as_str(), tc.count)).collect()
    }

    #[test]
    fn empty_input() {
        init();
        let texts: Vec<String> = vec![];
        assert!(aggregate_responses(&texts, &AggregationRules::DEFAULT_RULES).is_empty());
    }

    #[test]
    fn only_stop_words_and_short_tokens() {
        init();
        let res = aggregate_responses(&["the a an", "to by at"], &AggregationRules::DEFAULT_RULES);
        assert!(res.is_empty());
    }

    #[test]
    fn single_response_has_no_repeated_terms() {
        let res = aggregate_responses(&["Blue is great"], &AggregationRules::DEFAULT_RULES);
        assert!(res.is_empty());
    }

    #[test]
    fn stop_word_table() {
        assert!(is_stop_word("the"));
        assert!(is_stop_word("between"));
        assert!(is_stop_word("very"));
        assert!(!is_stop_word("blue"));
        let distinct: std::collections::HashSet<&str> = STOP_WORDS.iter().cloned().collect();
        assert_eq!(distinct.len(), STOP_WORDS.len());
    }

    #[test]
    fn punctuation_and_case_are_ignored() {
        let res = aggregate_responses(
            &["Blue! Blue, and more BLUE.", "green? green", "red"],
            &AggregationRules::DEFAULT_RULES,
        );
        assert_eq!(pairs(&res), vec![("blue", 3), ("green", 2)]);
    }

    #[test]
    fn apostrophes_are_removed_not_split() {
        let res = aggregate_responses(&["don't stop", "dont worry"], &AggregationRules::DEFAULT_RULES);
        assert_eq!(pairs(&res), vec![("dont", 2)]);
    }

    #[test]
    fn word_characters_survive() {
        let res = aggregate_responses(
            &["snake_case 2024 café", "snake_case 2024 café"],
            &AggregationRules::DEFAULT_RULES,
        );
        assert_eq!(pairs(&res), vec![("2024", 2), ("café", 2), ("snake_case", 2)]);
    }

    #[test]
    fn ranking_is_descending() {
        let res = aggregate_responses(
            &[
                "coffee coffee coffee tea",
                "tea coffee water",
                "water juice juice",
            ],
            &AggregationRules::DEFAULT_RULES,
        );
        assert_eq!(
            pairs(&res),
            vec![("coffee", 4), ("juice", 2), ("tea", 2), ("water", 2)]
        );
    }

    #[test]
    fn first_seen_tiebreak() {
        let rules = AggregationRules {
            tiebreak_mode: TieBreakMode::FirstSeen,
            ..AggregationRules::DEFAULT_RULES
        };
        let res = aggregate_responses(&["water tea", "tea water juice juice"], &rules);
        assert_eq!(pairs(&res), vec![("water", 2), ("tea", 2), ("juice", 2)]);
    }

    #[test]
    fn order_independent() {
        let texts = vec![
            "Pizza is the best food",
            "I like pizza and pasta",
            "pasta pasta everywhere",
            "best pizza in town",
            "food trucks",
        ];
        let expected = aggregate_responses(&texts, &AggregationRules::DEFAULT_RULES);
        let mut reversed = texts.clone();
        reversed.reverse();
        assert_eq!(
            aggregate_responses(&reversed, &AggregationRules::DEFAULT_RULES),
            expected
        );
        let rotated: Vec<&str> = texts[2..].iter().chain(texts[..2].iter()).cloned().collect();
        assert_eq!(
            aggregate_responses(&rotated, &AggregationRules::DEFAULT_RULES),
            expected
        );
    }

    #[test]
    fn capped_and_thresholded() {
        // 60 distinct terms, each repeated a different number of times (2..=61).
        let texts: Vec<String> = (0..60)
            .map(|i| vec![format!("term{:03}", i); i + 2].join(" "))
            .collect();
        let res = aggregate_responses(&texts, &AggregationRules::DEFAULT_RULES);
        assert_eq!(res.len(), 50);
        assert!(res.iter().all(|tc| tc.count >= 2));
        assert!(res.windows(2).all(|w| w[0].count >= w[1].count));
        assert_eq!(res[0], TermCount::new("term059", 61));
        assert_eq!(res[49], TermCount::new("term010", 12));
    }

    #[test]
    fn configurable_threshold() {
        let rules = AggregationRules {
            min_count: 1,
            ..AggregationRules::DEFAULT_RULES
        };
        let res = aggregate_responses(&["Blue is great"], &rules);
        assert_eq!(pairs(&res), vec![("blue", 1), ("great", 1)]);
    }
}
