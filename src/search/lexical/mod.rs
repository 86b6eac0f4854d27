#[cfg(test)]
mod tests;

use std::collections::HashSet;

/// Words carrying no lexical signal on their own.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "in",
    "is", "it", "its", "not", "of", "on", "or", "that", "the", "their", "this", "to", "was",
    "were", "will", "with",
];

/// Lowercased alphanumeric tokens with stopwords removed.
#[inline]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .filter(|word| !STOPWORDS.contains(&word.as_str()))
        .collect()
}

/// Keyword match score in [0, 1]: the fraction of distinct query terms
/// present in `text`.
///
/// Pure function of its inputs. Coverage, not frequency, drives the score:
/// a chunk containing every query term once scores 1.0, and repeating a
/// term does not outrank covering another. Queries with no scorable terms
/// (empty, all stopwords) score 0 against everything.
#[inline]
pub fn lexical_score(query: &str, text: &str) -> f32 {
    let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
    if query_terms.is_empty() {
        return 0.0;
    }
    let text_terms: HashSet<String> = tokenize(text).into_iter().collect();
    let matched = query_terms
        .iter()
        .filter(|term| text_terms.contains(*term))
        .count();
    matched as f32 / query_terms.len() as f32
}
