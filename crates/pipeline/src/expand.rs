//! Multi-query expansion.
//!
//! One question becomes several retrieval queries with varied vocabulary,
//! so a question phrased in everyday terms can still hit policy text
//! written in insurance jargon. Expansion only ever adds recall: the
//! original question is always the first member of the set, and any
//! backend failure degrades to the singleton set.

use crate::types::ExpandedQuery;
use coverqa_llm::{LlmClient, LlmRequest};
use coverqa_prompt::render_expansion;
use std::sync::Arc;

const EXPANSION_TEMPERATURE: f32 = 0.4;

/// Expands questions into retrieval query sets via the generation backend.
pub struct QueryExpander {
    client: Arc<dyn LlmClient>,
    model: String,
    variants: usize,
    max_variant_chars: usize,
}

impl QueryExpander {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        variants: usize,
        max_variant_chars: usize,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            variants,
            max_variant_chars,
        }
    }

    /// Expand a question. Never fails: any backend or parse problem falls
    /// back to the singleton set containing only the original question.
    pub async fn expand(&self, question: &str) -> ExpandedQuery {
        let prompt = match render_expansion(question, self.variants) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Failed to render expansion prompt: {}", e);
                return ExpandedQuery::singleton(question);
            }
        };

        let request =
            LlmRequest::new(prompt.user, &self.model).with_temperature(EXPANSION_TEMPERATURE);

        let raw = match self.client.complete(&request).await {
            Ok(response) => response.content,
            Err(e) => {
                tracing::warn!("Query expansion call failed: {} (using original only)", e);
                return ExpandedQuery::singleton(question);
            }
        };

        match self.parse_variants(question, &raw) {
            Some(queries) => {
                tracing::debug!("Expanded question into {} queries", queries.len());
                ExpandedQuery {
                    question: question.to_string(),
                    queries,
                }
            }
            None => {
                tracing::warn!("Unusable expansion output (using original only)");
                ExpandedQuery::singleton(question)
            }
        }
    }

    /// Parse the backend reply into a deduplicated query list headed by
    /// the original question. `None` means nothing usable came back.
    fn parse_variants(&self, question: &str, raw: &str) -> Option<Vec<String>> {
        let cleaned = strip_fences(raw);

        let parsed: Vec<serde_json::Value> = serde_json::from_str(cleaned).ok()?;

        let mut queries = vec![question.to_string()];
        let mut seen = vec![normalize(question)];

        for value in parsed.into_iter().take(self.variants) {
            let variant = match value {
                serde_json::Value::String(s) => s,
                _ => continue,
            };
            let variant = variant.trim();
            if variant.is_empty() || variant.chars().count() > self.max_variant_chars {
                continue;
            }

            let key = normalize(variant);
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            queries.push(variant.to_string());
        }

        if queries.len() > 1 {
            Some(queries)
        } else {
            None
        }
    }
}

/// Case- and whitespace-insensitive form used for deduplication.
fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Drop surrounding markdown code fences, if any.
fn strip_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Skip an optional language tag line
        s = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use coverqa_llm::providers::{ScriptedClient, ScriptedReply};

    fn expander(replies: Vec<ScriptedReply>) -> QueryExpander {
        QueryExpander::new(Arc::new(ScriptedClient::new(replies)), "test-model", 3, 300)
    }

    #[tokio::test]
    async fn test_expansion_includes_original_first() {
        let e = expander(vec![ScriptedReply::Text(
            r#"["knee replacement surgery inpatient", "orthopedic procedure coverage", "joint surgery exclusions waiting period"]"#
                .to_string(),
        )]);

        let expanded = e.expand("Is knee surgery covered?").await;
        assert_eq!(expanded.queries.len(), 4);
        assert_eq!(expanded.queries[0], "Is knee surgery covered?");
    }

    #[tokio::test]
    async fn test_expansion_strips_fences() {
        let e = expander(vec![ScriptedReply::Text(
            "```json\n[\"variant one\", \"variant two\"]\n```".to_string(),
        )]);

        let expanded = e.expand("original").await;
        assert_eq!(
            expanded.queries,
            vec!["original", "variant one", "variant two"]
        );
    }

    #[tokio::test]
    async fn test_expansion_dedups_against_original() {
        let e = expander(vec![ScriptedReply::Text(
            r#"["IS KNEE SURGERY   COVERED?", "knee surgery exclusions"]"#.to_string(),
        )]);

        let expanded = e.expand("Is knee surgery covered?").await;
        assert_eq!(
            expanded.queries,
            vec!["Is knee surgery covered?", "knee surgery exclusions"]
        );
    }

    #[tokio::test]
    async fn test_backend_failure_falls_back_to_singleton() {
        let e = expander(vec![ScriptedReply::Error("timeout".to_string())]);
        let expanded = e.expand("Is dental covered?").await;
        assert_eq!(expanded.queries, vec!["Is dental covered?"]);
    }

    #[tokio::test]
    async fn test_garbage_output_falls_back_to_singleton() {
        let e = expander(vec![ScriptedReply::Text(
            "Sure! Here are some queries you could try.".to_string(),
        )]);
        let expanded = e.expand("Is dental covered?").await;
        assert_eq!(expanded.queries, vec!["Is dental covered?"]);
    }

    #[tokio::test]
    async fn test_oversized_and_empty_variants_dropped() {
        let long = "x".repeat(500);
        let e = expander(vec![ScriptedReply::Text(format!(
            r#"["", "{}", "usable variant"]"#,
            long
        ))]);

        let expanded = e.expand("question").await;
        assert_eq!(expanded.queries, vec!["question", "usable variant"]);
    }
}
