//! Fuzzy prompt lookup over name, description and template text.

use crate::models::Prompt;

/// A best hit scoring at least this much is taken as the answer.
pub const CONFIDENT_SCORE: f64 = 0.8;

/// How many candidates to offer when no hit is confident.
pub const CANDIDATE_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Similarity in `0.0..=1.0`.
    pub score: f64,
    pub prompt: Prompt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Confident(SearchHit),
    /// Best-first, at most [`CANDIDATE_COUNT`] entries.
    Candidates(Vec<SearchHit>),
}

fn searchable_text(prompt: &Prompt) -> String {
    [
        prompt.name.as_str(),
        prompt.description.as_deref().unwrap_or(""),
        prompt.template.as_str(),
    ]
    .join(" ")
}

/// Case-insensitive bigram similarity between `query` and a prompt's text.
pub fn score(query: &str, prompt: &Prompt) -> f64 {
    strsim::sorensen_dice(
        &query.to_lowercase(),
        &searchable_text(prompt).to_lowercase(),
    )
}

/// Score every prompt against `query`, best first. Ties keep input order.
pub fn rank(query: &str, prompts: impl IntoIterator<Item = Prompt>) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = prompts
        .into_iter()
        .map(|prompt| SearchHit {
            score: score(query, &prompt),
            prompt,
        })
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits
}

/// The confident best match, or the top candidates. `None` if there is
/// nothing to search.
pub fn find(query: &str, prompts: impl IntoIterator<Item = Prompt>) -> Option<SearchOutcome> {
    let mut hits = rank(query, prompts);
    let best = hits.first()?;
    if best.score >= CONFIDENT_SCORE {
        return Some(SearchOutcome::Confident(hits.swap_remove(0)));
    }
    hits.truncate(CANDIDATE_COUNT);
    Some(SearchOutcome::Candidates(hits))
}
