use async_trait::async_trait;
use common::error::AppError;
use unicode_normalization::UnicodeNormalization;

use crate::pipeline::{
    chat_manage::ChatManage,
    stage::{Stage, StageKind},
};

/// Normalizes the effective query (post-rewrite) and extracts candidate
/// entity mentions for `entity_search` to seed graph expansion from. Entity
/// extraction is a cheap capitalized-run heuristic, not an NLP model —
/// `entity_search` only uses it to look up existing `graph_entity` rows by
/// name, so false positives just fail to match rather than pollute results.
pub struct PreprocessQuery;

#[async_trait]
impl Stage for PreprocessQuery {
    fn kind(&self) -> StageKind {
        StageKind::PreprocessQuery
    }

    async fn run(&self, ctx: &mut ChatManage) -> Result<(), AppError> {
        let source = ctx.rewrite_query.clone().unwrap_or_else(|| ctx.query.clone());
        let normalized: String = source.nfc().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ");
        ctx.processed_query = normalized;
        ctx.entity = extract_candidate_entities(&ctx.processed_query);
        Ok(())
    }
}

fn extract_candidate_entities(text: &str) -> Vec<String> {
    let mut entities = Vec::new();
    let mut run: Vec<&str> = Vec::new();

    for word in text.split_whitespace() {
        let starts_upper = word.chars().next().is_some_and(char::is_uppercase);
        if starts_upper {
            run.push(word);
        } else if !run.is_empty() {
            entities.push(run.join(" "));
            run.clear();
        }
    }
    if !run.is_empty() {
        entities.push(run.join(" "));
    }

    entities.sort();
    entities.dedup();
    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_candidate_entities_joins_adjacent_capitalized_words() {
        let entities = extract_candidate_entities("ask Ada Lovelace about the Analytical Engine");
        assert_eq!(entities, vec!["Ada Lovelace", "Analytical Engine"]);
    }

    #[test]
    fn extract_candidate_entities_handles_no_matches() {
        assert!(extract_candidate_entities("what time is it").is_empty());
    }
}
