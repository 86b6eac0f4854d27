use super::*;

#[test]
fn tokenize_lowercases_and_splits() {
    assert_eq!(
        tokenize("Being-in-the-World, according to Heidegger"),
        vec!["being", "world", "according", "heidegger"]
    );
}

#[test]
fn tokenize_drops_stopwords() {
    assert_eq!(tokenize("the cat and the dog"), vec!["cat", "dog"]);
}

#[test]
fn full_match_scores_one() {
    let score = lexical_score("eternal recurrence", "The eternal recurrence of the same.");
    assert_eq!(score, 1.0);
}

#[test]
fn partial_match_scores_fractionally() {
    let score = lexical_score("eternal recurrence", "An eternal flame burns.");
    assert!((score - 0.5).abs() < 1e-6);
}

#[test]
fn no_match_scores_zero() {
    assert_eq!(lexical_score("dialectic", "Nothing related here."), 0.0);
}

#[test]
fn repeated_terms_do_not_outrank_coverage() {
    let repeated = lexical_score("force power", "force force force force");
    let covering = lexical_score("force power", "force and power");
    assert!((repeated - 0.5).abs() < 1e-6);
    assert_eq!(covering, 1.0);
}

#[test]
fn empty_or_stopword_queries_score_zero() {
    assert_eq!(lexical_score("", "anything"), 0.0);
    assert_eq!(lexical_score("the and of", "the and of"), 0.0);
}

#[test]
fn scoring_is_case_insensitive() {
    assert_eq!(lexical_score("GEIST", "The geist appears."), 1.0);
}
