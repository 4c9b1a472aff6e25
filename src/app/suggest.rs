//! Closest-match ranking for mistyped dataset, field and value names
//!
//! Similarity is the normalized Levenshtein ratio over lowercase strings:
//! `1 - distance / max(len_a, len_b)`, so identical strings score 1.0 and
//! strings with nothing in common score 0.0.

use std::cmp::Ordering;

use crate::constants::suggest;

/// One ranked candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub candidate: String,
    pub score: f64,
}

/// Ranks candidates by similarity to a query
#[derive(Debug, Clone, Copy)]
pub struct SuggestionEngine {
    top_k: usize,
}

impl Default for SuggestionEngine {
    fn default() -> Self {
        Self::new(suggest::DEFAULT_TOP_K)
    }
}

impl SuggestionEngine {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Candidates ordered by descending similarity, ties in input order, at most `top_k`
    pub fn rank<S: AsRef<str>>(&self, query: &str, candidates: &[S]) -> Vec<Suggestion> {
        let mut scored: Vec<Suggestion> = candidates
            .iter()
            .map(|c| Suggestion {
                candidate: c.as_ref().to_string(),
                score: similarity(query, c.as_ref()),
            })
            .collect();

        // sort_by is stable, equal scores keep their input order
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(self.top_k);
        scored
    }

    /// Ranked candidate names only
    pub fn suggest<S: AsRef<str>>(&self, query: &str, candidates: &[S]) -> Vec<String> {
        self.rank(query, candidates)
            .into_iter()
            .map(|s| s.candidate)
            .collect()
    }

    /// Rank items that answer to several names, scoring each by its best name
    ///
    /// Returns indices into `items`.
    pub fn rank_by<T, F>(&self, query: &str, items: &[T], names: F) -> Vec<usize>
    where
        F: Fn(&T) -> Vec<&str>,
    {
        let mut scored: Vec<(usize, f64)> = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let best = names(item)
                    .into_iter()
                    .map(|name| similarity(query, name))
                    .fold(0.0_f64, f64::max);
                (index, best)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(self.top_k);
        scored.into_iter().map(|(index, _)| index).collect()
    }
}

/// Normalized Levenshtein similarity in [0, 1], case-insensitive
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
