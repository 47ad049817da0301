//! Fuzzy scheme-name matching.
//!
//! Mutual fund names arrive with inconsistent casing, punctuation and plan
//! suffixes ("- Direct Growth", "Regular -Growth"). Names are reduced to a
//! set of significant tokens; a feed row is a candidate when its token set
//! contains every query token, and candidates closest in total token length
//! win. Everything here is pure: no I/O, no feed fetching.

use std::collections::BTreeSet;

/// Plan/option boiler-plate that says nothing about which scheme is meant.
pub const BOILERPLATE_TOKENS: &[&str] = &["DIRECT", "REGULAR", "GROWTH", "PLAN", "OPTION"];

/// Uppercase, replace punctuation with spaces, drop boiler-plate tokens and
/// collapse whitespace. Idempotent.
///
/// ```
/// use pricekeep::market_data::normalize_scheme_name;
///
/// assert_eq!(
///     normalize_scheme_name("Parag Parikh Flexi Cap Fund - Direct Plan – Growth"),
///     "PARAG PARIKH FLEXI CAP FUND"
/// );
/// ```
pub fn normalize_scheme_name(raw: &str) -> String {
    tokenize(raw).collect::<Vec<_>>().join(" ")
}

fn tokenize(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_uppercase)
        // Uppercasing can expand a char into non-alphanumeric marks; split again.
        .flat_map(|part| {
            part.split(|c: char| !c.is_alphanumeric())
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|token| !BOILERPLATE_TOKENS.contains(&token.as_str()))
}

/// The significant tokens of a name plus their total length.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenSet {
    tokens: BTreeSet<String>,
    weight: usize,
}

impl TokenSet {
    pub fn from_name(raw: &str) -> Self {
        let tokens: BTreeSet<String> = tokenize(raw).collect();
        let weight = tokens.iter().map(|t| t.chars().count()).sum();
        Self { tokens, weight }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains_all(&self, other: &TokenSet) -> bool {
        other.tokens.is_subset(&self.tokens)
    }

    /// Distance used to rank a candidate for `query`, or `None` if the
    /// candidate is missing any query token.
    pub fn distance_from(&self, query: &TokenSet) -> Option<usize> {
        if query.is_empty() || !self.contains_all(query) {
            return None;
        }
        Some(self.weight.abs_diff(query.weight))
    }
}

/// Rows sharing the best (smallest) distance from `query`.
///
/// An empty result means nothing contains the query; more than one result
/// means the best candidates are indistinguishable and must not be picked
/// automatically.
pub fn best_candidates<'a, T>(
    query: &TokenSet,
    rows: &'a [T],
    tokens_of: impl Fn(&T) -> &TokenSet,
) -> Vec<&'a T> {
    let mut best: Option<usize> = None;
    let mut winners = Vec::new();

    for row in rows {
        let Some(distance) = tokens_of(row).distance_from(query) else {
            continue;
        };
        match best {
            Some(current) if distance > current => {}
            Some(current) if distance == current => winners.push(row),
            _ => {
                best = Some(distance);
                winners.clear();
                winners.push(row);
            }
        }
    }

    winners
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names_to_sets(names: &[&str]) -> Vec<(String, TokenSet)> {
        names
            .iter()
            .map(|n| (n.to_string(), TokenSet::from_name(n)))
            .collect()
    }

    fn best<'a>(query: &str, rows: &'a [(String, TokenSet)]) -> Vec<&'a str> {
        best_candidates(&TokenSet::from_name(query), rows, |(_, t)| t)
            .into_iter()
            .map(|(name, _)| name.as_str())
            .collect()
    }

    #[test]
    fn strips_punctuation_and_plan_tokens() {
        assert_eq!(
            normalize_scheme_name("HDFC  Mid-Cap Opportunities Fund -Regular -Growth"),
            "HDFC MID CAP OPPORTUNITIES FUND"
        );
        assert_eq!(normalize_scheme_name("  Direct  Plan "), "");
    }

    #[test]
    fn unique_superset_wins() {
        let rows = names_to_sets(&[
            "Parag Parikh Flexi Cap Fund - Direct Plan - Growth",
            "Parag Parikh Liquid Fund - Direct Plan - Daily IDCW",
            "Quant Flexi Cap Fund - Growth",
        ]);
        assert_eq!(
            best("Parag Parikh Flexi Cap Fund - Growth", &rows),
            vec!["Parag Parikh Flexi Cap Fund - Direct Plan - Growth"]
        );
    }

    #[test]
    fn closer_length_breaks_ties() {
        let rows = names_to_sets(&[
            "Axis Bluechip Fund - Direct Plan - IDCW Payout",
            "Axis Bluechip Fund - Direct Plan - Growth",
        ]);
        assert_eq!(
            best("Axis Bluechip Fund", &rows),
            vec!["Axis Bluechip Fund - Direct Plan - Growth"]
        );
    }

    #[test]
    fn identical_normalized_names_are_both_returned() {
        let rows = names_to_sets(&[
            "Axis Bluechip Fund - Direct Plan - Growth",
            "Axis Bluechip Fund - Regular Plan - Growth",
        ]);
        assert_eq!(best("axis bluechip", &rows).len(), 2);
    }

    #[test]
    fn missing_token_excludes_row() {
        let rows = names_to_sets(&["SBI Small Cap Fund - Growth"]);
        assert!(best("SBI Contra Fund", &rows).is_empty());
        assert!(best("Growth", &rows).is_empty());
    }

    fn word() -> impl Strategy<Value = String> {
        prop_oneof![
            "[A-Za-z]{1,8}",
            Just("Direct".to_string()),
            Just("Growth".to_string()),
            Just("-".to_string()),
            Just("–".to_string()),
            Just("(G)".to_string()),
        ]
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(raw in "[A-Za-z0-9 ._()&'/–-]{0,60}") {
            let once = normalize_scheme_name(&raw);
            prop_assert_eq!(normalize_scheme_name(&once), once);
        }

        #[test]
        fn normalization_is_idempotent_for_any_text(raw in "\\PC{0,40}") {
            let once = normalize_scheme_name(&raw);
            prop_assert_eq!(normalize_scheme_name(&once), once);
        }

        #[test]
        fn matching_ignores_word_order(
            (words, shuffled) in proptest::collection::vec(word(), 1..6)
                .prop_flat_map(|words| (Just(words.clone()), Just(words).prop_shuffle())),
            feed in proptest::collection::vec(proptest::collection::vec(word(), 1..8), 0..8),
        ) {
            let feed_names: Vec<String> = feed.iter().map(|w| w.join(" ")).collect();
            let feed_refs: Vec<&str> = feed_names.iter().map(String::as_str).collect();
            let rows = names_to_sets(&feed_refs);

            prop_assert_eq!(best(&words.join(" "), &rows), best(&shuffled.join(" "), &rows));
        }

        #[test]
        fn feed_row_order_does_not_change_the_winners(
            words in proptest::collection::vec(word(), 1..4),
            feed in proptest::collection::vec(proptest::collection::vec(word(), 1..6), 0..8),
        ) {
            let feed_names: Vec<String> = feed.iter().map(|w| w.join(" ")).collect();
            let feed_refs: Vec<&str> = feed_names.iter().map(String::as_str).collect();
            let rows = names_to_sets(&feed_refs);
            let mut reversed_rows = rows.clone();
            reversed_rows.reverse();

            let query = words.join(" ");
            let mut forward = best(&query, &rows);
            let mut backward = best(&query, &reversed_rows);
            forward.sort_unstable();
            backward.sort_unstable();
            prop_assert_eq!(forward, backward);
        }
    }
}
