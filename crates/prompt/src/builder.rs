//! Prompt builder rendering the fixed templates with Handlebars.

use crate::templates;
use coverqa_core::{AppError, AppResult};
use handlebars::Handlebars;
use serde_json::json;

/// A rendered prompt ready for LLM execution.
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    /// Optional system message
    pub system: Option<String>,

    /// User message
    pub user: String,
}

/// Render the query-expansion prompt for a question.
///
/// `variants` is how many alternative queries the model is asked for.
pub fn render_expansion(question: &str, variants: usize) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building expansion prompt ({} variants)", variants);

    let user = render_template(
        templates::EXPANSION_TEMPLATE,
        &json!({ "question": question, "variants": variants }),
    )?;

    Ok(BuiltPrompt { system: None, user })
}

/// Render the grounded-answer prompt from a question and assembled context.
pub fn render_grounding(question: &str, context: &str) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building grounding prompt ({} context chars)", context.len());

    let user = render_template(
        templates::GROUNDING_USER_TEMPLATE,
        &json!({ "question": question, "context": context }),
    )?;

    Ok(BuiltPrompt {
        system: Some(templates::GROUNDING_SYSTEM.to_string()),
        user,
    })
}

/// Render the corrective suffix appended on a schema-validation retry.
pub fn render_retry(error: &str) -> AppResult<String> {
    render_template(templates::RETRY_SUFFIX_TEMPLATE, &json!({ "error": error }))
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &serde_json::Value) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Disable HTML escaping for plain text
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    let rendered = handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))?;

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_expansion() {
        let built = render_expansion("Is knee surgery covered?", 3).unwrap();
        assert!(built.system.is_none());
        assert!(built.user.contains("exactly 3 alternative"));
        assert!(built.user.contains("USER QUESTION: Is knee surgery covered?"));
        assert!(built.user.contains("JSON array of 3 strings"));
    }

    #[test]
    fn test_render_grounding() {
        let built = render_grounding(
            "Is cataract surgery covered?",
            "[1] policy.pdf p.5 (Benefits)\nCataract surgery is covered.",
        )
        .unwrap();

        let system = built.system.expect("grounding prompt has a system message");
        assert!(system.contains("policy analyst"));
        assert!(system.contains("CITATIONS ARE REQUIRED"));

        assert!(built.user.starts_with("QUESTION: Is cataract surgery covered?"));
        assert!(built.user.contains("Cataract surgery is covered."));
        // Question is repeated in the closing instruction
        assert!(built
            .user
            .contains("directly answer \"Is cataract surgery covered?\""));
    }

    #[test]
    fn test_render_retry() {
        let suffix = render_retry("missing field `explanation`").unwrap();
        assert!(suffix.contains("missing field `explanation`"));
        assert!(suffix.contains("ONLY the JSON object"));
    }

    #[test]
    fn test_no_html_escaping() {
        let built = render_grounding("Covers <2 years & \"pre-existing\"?", "ctx").unwrap();
        assert!(built.user.contains("<2 years & \"pre-existing\"?"));
    }
}
