//! Keyword-overlap matching against the knowledge base.
//!
//! A message is tokenized by lowercasing and splitting on whitespace into a
//! set of unique tokens. Each FAQ entry scores `|tokens ∩ keywords|`.
//!
//! - [`find_best_match`] returns a single entry only for a *strong* match
//!   (score ≥ [`STRONG_MATCH_THRESHOLD`]). Such matches are answered
//!   verbatim without consulting the language model.
//! - [`find_relevant`] returns up to `top_n` entries with any overlap,
//!   used as context for the language-model fallback.
//!
//! Ties on the maximum score go to the entry that appears first in store
//! order: later entries only replace the current best on a strictly
//! greater score.

use std::collections::HashSet;

use crate::models::FaqEntry;

/// Minimum overlap for a match that bypasses the language model.
pub const STRONG_MATCH_THRESHOLD: usize = 2;

/// Minimum overlap for an entry to count as relevant context or as a topic.
pub const RELEVANT_MATCH_THRESHOLD: usize = 1;

/// Lowercase the message and split on whitespace into unique tokens.
pub fn tokenize(message: &str) -> HashSet<String> {
    message
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// FAQ entries paired with their parsed keyword sets.
///
/// Building the index parses each entry's keyword field once, so scoring
/// many messages against the same knowledge base (as analytics does) does
/// not re-split keywords per message.
pub struct KeywordIndex<'a> {
    entries: Vec<(&'a FaqEntry, HashSet<String>)>,
}

impl<'a> KeywordIndex<'a> {
    pub fn new(entries: &'a [FaqEntry]) -> Self {
        Self {
            entries: entries.iter().map(|e| (e, e.keyword_set())).collect(),
        }
    }

    /// Score of every entry against the tokens, in store order.
    fn scores<'s>(
        &'s self,
        tokens: &'s HashSet<String>,
    ) -> impl Iterator<Item = (&'a FaqEntry, usize)> + 's {
        self.entries
            .iter()
            .map(move |(entry, keywords)| (*entry, keywords.intersection(tokens).count()))
    }

    /// Highest-scoring entry if its score reaches `threshold`.
    ///
    /// Strict `>` keeps the first entry to reach the maximum.
    pub fn best(&self, tokens: &HashSet<String>, threshold: usize) -> Option<&'a FaqEntry> {
        let mut best: Option<&'a FaqEntry> = None;
        let mut best_score = 0;
        for (entry, score) in self.scores(tokens) {
            if score > best_score {
                best_score = score;
                best = Some(entry);
            }
        }
        if best_score >= threshold {
            best
        } else {
            None
        }
    }

    /// Entries with a non-zero score, descending by score, at most `top_n`.
    pub fn relevant(&self, tokens: &HashSet<String>, top_n: usize) -> Vec<&'a FaqEntry> {
        let mut scored: Vec<(usize, &'a FaqEntry)> = self
            .scores(tokens)
            .filter(|(_, score)| *score > 0)
            .map(|(entry, score)| (score, entry))
            .collect();
        // sort_by is stable: equal scores keep store order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(top_n).map(|(_, e)| e).collect()
    }
}

/// The single strong match for `message`, if any.
pub fn find_best_match<'a>(message: &str, entries: &'a [FaqEntry]) -> Option<&'a FaqEntry> {
    KeywordIndex::new(entries).best(&tokenize(message), STRONG_MATCH_THRESHOLD)
}

/// Up to `top_n` entries sharing at least one keyword with `message`.
pub fn find_relevant<'a>(message: &str, entries: &'a [FaqEntry], top_n: usize) -> Vec<&'a FaqEntry> {
    KeywordIndex::new(entries).relevant(&tokenize(message), top_n)
}

/// Category of the best entry at the given threshold.
pub fn best_category<'a>(
    message: &str,
    entries: &'a [FaqEntry],
    threshold: usize,
) -> Option<&'a str> {
    KeywordIndex::new(entries)
        .best(&tokenize(message), threshold)
        .map(|e| e.category.as_str())
}
