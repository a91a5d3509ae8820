//! Prompt construction for query expansion and grounded answering.
//!
//! All prompts are built from fixed Handlebars templates; callers supply
//! only the question and the retrieved context. Keeping the templates in
//! one crate makes prompt changes reviewable in one place.

pub mod builder;
pub mod templates;

pub use builder::{render_expansion, render_grounding, render_retry, BuiltPrompt};
