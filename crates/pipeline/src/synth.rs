//! Grounded answer synthesis.
//!
//! Builds the grounding prompt from the ranked chunks, obtains a
//! structured reply from the generation backend, validates it against the
//! answer schema with a bounded corrective retry, verifies every claimed
//! citation against the supplied chunk text, and blends the backend's
//! self-reported confidence with the verification rate and retrieval
//! strength. There is no fatal path: every failure mode degrades to a
//! well-formed "Unknown" answer.

use crate::types::{Citation, ScoredChunk, Verdict};
use crate::verify::verify_citation;
use coverqa_core::config::SynthesisSettings;
use coverqa_llm::{LlmClient, LlmRequest};
use coverqa_prompt::{render_grounding, render_retry};
use serde::Deserialize;
use std::sync::Arc;

const GENERATION_TEMPERATURE: f32 = 0.2;

/// Weights for the final confidence blend.
const WEIGHT_SELF_REPORTED: f32 = 0.5;
const WEIGHT_VERIFIED_RATE: f32 = 0.3;
const WEIGHT_RETRIEVAL: f32 = 0.2;

/// Backend reply before validation. Fields default leniently; the verdict
/// string is the one thing that must parse.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAnswer {
    answer: String,

    #[serde(default)]
    explanation: String,

    #[serde(default)]
    confidence: f32,

    #[serde(default)]
    citations: Vec<RawCitation>,

    #[serde(default)]
    caveats: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCitation {
    #[serde(default)]
    filename: String,

    /// Models emit this as a number or a string; coerced after parsing
    #[serde(default)]
    page: serde_json::Value,

    #[serde(default)]
    section: String,

    #[serde(default)]
    quote: String,
}

/// Classified result of one generation attempt.
#[derive(Debug)]
pub enum SynthesisOutcome {
    Valid(Box<RawAnswer>),
    SchemaError { message: String },
    BackendError(String),
}

/// The synthesized answer minus timing metadata, which the pipeline adds.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub verdict: Verdict,
    pub explanation: String,
    pub confidence: f32,
    pub citations: Vec<Citation>,
    pub caveats: Vec<String>,
}

/// Answer synthesizer over a generation backend.
pub struct Synthesizer {
    client: Arc<dyn LlmClient>,
    model: String,
    settings: SynthesisSettings,
}

impl Synthesizer {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        settings: SynthesisSettings,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            settings,
        }
    }

    /// Synthesize an answer from the retrieved chunks. Never fails.
    pub async fn synthesize(&self, question: &str, chunks: &[ScoredChunk]) -> Synthesis {
        if chunks.is_empty() {
            return Self::no_evidence();
        }

        let context = build_context(chunks, self.settings.max_context_chars);
        let prompt = match render_grounding(question, &context) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("Failed to render grounding prompt: {}", e);
                return Self::degraded(format!("Answer synthesis failed: {}", e));
            }
        };
        let system = prompt.system.unwrap_or_default();

        let mut last_schema_error: Option<String> = None;
        let attempts = self.settings.max_retries + 1;

        for attempt in 0..attempts {
            let mut user = prompt.user.clone();
            if let Some(ref error) = last_schema_error {
                if let Ok(suffix) = render_retry(error) {
                    user.push_str(&suffix);
                }
            }

            let request = LlmRequest::new(user, &self.model)
                .with_system(&system)
                .with_temperature(GENERATION_TEMPERATURE)
                .with_json_mode();

            let outcome = match self.client.complete(&request).await {
                Ok(response) => parse_response(&response.content),
                Err(e) => SynthesisOutcome::BackendError(e.to_string()),
            };

            match outcome {
                SynthesisOutcome::Valid(raw) => {
                    return self.ground(*raw, chunks);
                }
                SynthesisOutcome::SchemaError { message } => {
                    tracing::warn!(
                        "Schema validation failed (attempt {}/{}): {}",
                        attempt + 1,
                        attempts,
                        message
                    );
                    last_schema_error = Some(message);
                }
                SynthesisOutcome::BackendError(message) => {
                    tracing::error!("Generation call failed: {}", message);
                    return Self::degraded(format!("Answer synthesis failed: {}", message));
                }
            }
        }

        Self::degraded(format!(
            "Answer synthesis failed: backend did not produce a valid structured answer after {} attempts",
            attempts
        ))
    }

    /// Verify citations, force the verdict when evidence evaporates, and
    /// blend the final confidence.
    fn ground(&self, raw: RawAnswer, chunks: &[ScoredChunk]) -> Synthesis {
        let claimed = raw.citations.len();
        let mut citations = Vec::new();

        for raw_citation in &raw.citations {
            let candidate = Citation {
                filename: raw_citation.filename.clone(),
                page: coerce_page(&raw_citation.page),
                section: raw_citation.section.clone(),
                quote: raw_citation.quote.clone(),
            };
            match verify_citation(&candidate, chunks) {
                Some(verified) => citations.push(verified),
                None => {
                    tracing::warn!(
                        "Dropping unverifiable citation from '{}' p.{}",
                        candidate.filename,
                        candidate.page
                    );
                }
            }
        }

        let verified_rate = if claimed == 0 {
            0.0
        } else {
            citations.len() as f32 / claimed as f32
        };
        let best_score = chunks
            .iter()
            .map(|c| c.score)
            .fold(0.0f32, f32::max)
            .clamp(0.0, 1.0);

        // An answer is only as trustworthy as its surviving evidence.
        let verdict = if citations.is_empty() {
            if Verdict::parse(&raw.answer) != Some(Verdict::Unknown) {
                tracing::warn!("No citations survived verification; forcing verdict to Unknown");
            }
            Verdict::Unknown
        } else {
            Verdict::parse(&raw.answer).unwrap_or(Verdict::Unknown)
        };

        let self_reported = if raw.confidence.is_finite() {
            raw.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let confidence = (WEIGHT_SELF_REPORTED * self_reported
            + WEIGHT_VERIFIED_RATE * verified_rate
            + WEIGHT_RETRIEVAL * best_score)
            .clamp(0.0, 1.0);

        let mut caveats = raw.caveats;
        if caveats.len() > self.settings.max_caveats {
            caveats.truncate(self.settings.max_caveats);
        }

        Synthesis {
            verdict,
            explanation: raw.explanation,
            confidence,
            citations,
            caveats,
        }
    }

    fn no_evidence() -> Synthesis {
        Synthesis {
            verdict: Verdict::Unknown,
            explanation: "No relevant policy excerpts found.".to_string(),
            confidence: 0.0,
            citations: vec![],
            caveats: vec![],
        }
    }

    fn degraded(explanation: String) -> Synthesis {
        Synthesis {
            verdict: Verdict::Unknown,
            explanation,
            confidence: 0.0,
            citations: vec![],
            caveats: vec![],
        }
    }
}

/// Format the ranked chunks into a numbered excerpt block, truncated to
/// the character budget.
pub fn build_context(chunks: &[ScoredChunk], max_chars: usize) -> String {
    const TRUNCATION_MARKER: &str = "\n...[truncated]";

    let mut parts: Vec<String> = Vec::new();
    let mut total = 0;

    for (i, scored) in chunks.iter().enumerate() {
        let c = &scored.chunk;
        let block = format!(
            "[Excerpt {}]  File: {}  |  Page: {}-{}  |  Section: {}\n{}\n",
            i + 1,
            c.filename,
            c.page_start,
            c.page_end,
            c.section,
            c.text
        );

        // The final join inserts one newline before every block after the
        // first; that byte counts against the budget too.
        let sep = if parts.is_empty() { 0 } else { 1 };
        if total + sep + block.len() > max_chars {
            let budget = max_chars.saturating_sub(total + sep + TRUNCATION_MARKER.len());
            if budget > 200 {
                let mut cut = budget.min(block.len());
                while cut > 0 && !block.is_char_boundary(cut) {
                    cut -= 1;
                }
                parts.push(format!("{}{}", &block[..cut], TRUNCATION_MARKER));
            }
            break;
        }

        total += sep + block.len();
        parts.push(block);
    }

    parts.join("\n")
}

/// Parse and schema-validate a backend reply, leniently extracting the
/// JSON object from fences or surrounding prose first.
pub fn parse_response(raw: &str) -> SynthesisOutcome {
    let mut cleaned = raw.trim();

    if cleaned.contains("```") {
        if let Some(start) = cleaned.find("```") {
            let after = &cleaned[start + 3..];
            let after = after.split_once('\n').map(|(_, b)| b).unwrap_or(after);
            cleaned = match after.rfind("```") {
                Some(end) => &after[..end],
                None => after,
            };
        }
    }

    let start = cleaned.find('{');
    let end = cleaned.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &cleaned[s..=e],
        _ => {
            return SynthesisOutcome::SchemaError {
                message: "reply contains no JSON object".to_string(),
            }
        }
    };

    let parsed: RawAnswer = match serde_json::from_str(json) {
        Ok(p) => p,
        Err(e) => {
            return SynthesisOutcome::SchemaError {
                message: format!("invalid JSON: {}", e),
            }
        }
    };

    if Verdict::parse(&parsed.answer).is_none() {
        return SynthesisOutcome::SchemaError {
            message: format!(
                "verdict must be one of Yes/No/Partial/Unknown, got '{}'",
                parsed.answer
            ),
        };
    }

    SynthesisOutcome::Valid(Box::new(parsed))
}

/// Page numbers arrive as integers or strings depending on the model.
fn coerce_page(value: &serde_json::Value) -> u32 {
    match value {
        serde_json::Value::Number(n) => n.as_u64().unwrap_or(0) as u32,
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkRecord;
    use coverqa_llm::providers::{ScriptedClient, ScriptedReply};

    const CHUNK_TEXT: &str =
        "Knee arthroscopy is covered after a 12-month waiting period, see Section 4.";

    fn chunks() -> Vec<ScoredChunk> {
        vec![ScoredChunk {
            chunk: ChunkRecord {
                chunk_id: "c1".to_string(),
                document_id: "d1".to_string(),
                filename: "policy.pdf".to_string(),
                page_start: 5,
                page_end: 5,
                section: "Benefits".to_string(),
                text: CHUNK_TEXT.to_string(),
                token_count: 20,
                position: 0,
            },
            score: 0.8,
            matched_queries: vec!["knee surgery".to_string()],
        }]
    }

    fn settings() -> SynthesisSettings {
        SynthesisSettings {
            max_context_chars: 12_000,
            max_retries: 2,
            max_caveats: 6,
        }
    }

    fn synthesizer(replies: Vec<ScriptedReply>) -> (Synthesizer, Arc<ScriptedClient>) {
        let client = Arc::new(ScriptedClient::new(replies));
        let synth = Synthesizer::new(client.clone(), "test-model", settings());
        (synth, client)
    }

    fn valid_reply(quote: &str) -> String {
        format!(
            r#"{{"answer": "Partial", "explanation": "Knee surgery is covered after a waiting period.",
                "confidence": 0.9,
                "citations": [{{"filename": "policy.pdf", "page": 5, "section": "Benefits", "quote": "{}"}}],
                "caveats": ["12-month waiting period applies"]}}"#,
            quote
        )
    }

    #[tokio::test]
    async fn test_valid_answer_with_verified_citation() {
        let (synth, client) = synthesizer(vec![ScriptedReply::Text(valid_reply(
            "Knee arthroscopy is covered after a 12-month waiting period",
        ))]);

        let result = synth.synthesize("Is knee surgery covered?", &chunks()).await;

        assert_eq!(result.verdict, Verdict::Partial);
        assert_eq!(result.citations.len(), 1);
        assert_eq!(result.citations[0].page, 5);
        assert_eq!(result.caveats, vec!["12-month waiting period applies"]);
        // 0.5*0.9 + 0.3*1.0 + 0.2*0.8 = 0.91
        assert!((result.confidence - 0.91).abs() < 0.01);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_fabricated_quote_forces_unknown() {
        let (synth, _) = synthesizer(vec![ScriptedReply::Text(valid_reply(
            "Cosmetic knee reshaping is fully covered with no waiting period",
        ))]);

        let result = synth.synthesize("Is knee surgery covered?", &chunks()).await;

        assert_eq!(result.verdict, Verdict::Unknown);
        assert!(result.citations.is_empty());
        // 0.5*0.9 + 0.3*0.0 + 0.2*0.8 = 0.61, well below the verified case
        assert!(result.confidence < 0.65);
    }

    #[tokio::test]
    async fn test_schema_error_retries_with_corrective_instruction() {
        let (synth, client) = synthesizer(vec![
            ScriptedReply::Text("I think knee surgery is covered!".to_string()),
            ScriptedReply::Text(valid_reply(
                "Knee arthroscopy is covered after a 12-month waiting period",
            )),
        ]);

        let result = synth.synthesize("Is knee surgery covered?", &chunks()).await;

        assert_eq!(result.verdict, Verdict::Partial);
        assert_eq!(client.calls(), 2);
        let prompts = client.prompts();
        assert!(!prompts[0].contains("previous reply was rejected"));
        assert!(prompts[1].contains("previous reply was rejected"));
    }

    #[tokio::test]
    async fn test_retries_exhausted_degrades_to_unknown() {
        let (synth, client) = synthesizer(vec![
            ScriptedReply::Text("not json".to_string()),
            ScriptedReply::Text("still not json".to_string()),
            ScriptedReply::Text(r#"{"answer": "Maybe"}"#.to_string()),
        ]);

        let result = synth.synthesize("Is knee surgery covered?", &chunks()).await;

        assert_eq!(result.verdict, Verdict::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(result.explanation.contains("synthesis failed"));
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_backend_error_degrades_without_retry() {
        let (synth, client) =
            synthesizer(vec![ScriptedReply::Error("connection refused".to_string())]);

        let result = synth.synthesize("Is knee surgery covered?", &chunks()).await;

        assert_eq!(result.verdict, Verdict::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_chunks_short_circuits() {
        let (synth, client) = synthesizer(vec![]);

        let result = synth.synthesize("Is anything covered?", &[]).await;

        assert_eq!(result.verdict, Verdict::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(result.citations.is_empty());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_caveats_truncated() {
        let caveats: Vec<String> = (0..10).map(|i| format!("\"caveat {}\"", i)).collect();
        let reply = format!(
            r#"{{"answer": "Yes", "explanation": "Covered.", "confidence": 0.9,
                "citations": [{{"filename": "policy.pdf", "page": "5", "section": "Benefits",
                                "quote": "Knee arthroscopy is covered after a 12-month waiting period"}}],
                "caveats": [{}]}}"#,
            caveats.join(", ")
        );
        let (synth, _) = synthesizer(vec![ScriptedReply::Text(reply)]);

        let result = synth.synthesize("Is knee surgery covered?", &chunks()).await;
        assert_eq!(result.caveats.len(), 6);
        // String page numbers are coerced
        assert_eq!(result.citations[0].page, 5);
    }

    #[tokio::test]
    async fn test_fenced_json_accepted() {
        let reply = format!(
            "```json\n{}\n```",
            valid_reply("Knee arthroscopy is covered after a 12-month waiting period")
        );
        let (synth, _) = synthesizer(vec![ScriptedReply::Text(reply)]);

        let result = synth.synthesize("Is knee surgery covered?", &chunks()).await;
        assert_eq!(result.verdict, Verdict::Partial);
    }

    #[test]
    fn test_build_context_truncates() {
        let mut many = Vec::new();
        for i in 0..50 {
            let mut sc = chunks().remove(0);
            sc.chunk.chunk_id = format!("c{}", i);
            sc.chunk.text = "Policy text. ".repeat(50);
            many.push(sc);
        }

        let context = build_context(&many, 2_000);
        assert!(context.len() <= 2_000, "context exceeds character budget");
        assert!(context.contains("[Excerpt 1]"));
        assert!(context.ends_with("...[truncated]"));
    }

    #[test]
    fn test_build_context_budget_covers_separators() {
        let mut many = Vec::new();
        for i in 0..20 {
            let mut sc = chunks().remove(0);
            sc.chunk.chunk_id = format!("c{}", i);
            sc.chunk.text = "Policy text. ".repeat(10);
            many.push(sc);
        }

        // Sweep budgets that land on and around block boundaries; the
        // output must never exceed the budget by even one separator byte.
        for max_chars in (200..1_200).step_by(7) {
            let context = build_context(&many, max_chars);
            assert!(
                context.len() <= max_chars,
                "budget {} produced {} chars",
                max_chars,
                context.len()
            );
        }
    }
}
