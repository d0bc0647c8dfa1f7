//! Prompt Template System
//!
//! Loads and renders the `.pmt` role prompts for the four pipeline stages.
//!
//! Template loading chain:
//! 1. `{prompts-dir}/{name}.pmt` (configured override)
//! 2. Embedded fallback in code
//!
//! User messages are short Handlebars templates rendered with the
//! questionnaire, brief, draft and review as raw JSON or Markdown.

pub mod embedded;
mod loader;

pub use loader::{JSON_ONLY_SUFFIX, PlanPart, PromptLoader};
