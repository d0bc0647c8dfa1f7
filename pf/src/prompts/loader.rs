//! Prompt Loader
//!
//! Loads role prompts from an override directory or falls back to embedded
//! defaults, and renders the user messages sent alongside them.

use std::path::PathBuf;

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::embedded;

/// Appended to a system prompt when a JSON stage falls back to the long-form
/// model, which has no provider-enforced JSON mode
pub const JSON_ONLY_SUFFIX: &str = "\n\nIMPORTANTE: Responde APENAS com JSON válido.";

const ANALYST_USER: &str =
    "Analisa o seguinte negócio e pesquisa o contexto de mercado:\n\n{{{questionnaire}}}";

const STRATEGIST_PART1_USER: &str = "Gera as primeiras 5 secções do plano de marketing.\n\n## Respostas do Utilizador\n{{{questionnaire}}}\n\n## Brief do Analista de Mercado\n{{{brief}}}";

const STRATEGIST_PART2_USER: &str = "Gera as secções 6 a 10 do plano de marketing. Começa directamente em ## SECÇÃO 6.\n\n## Contexto do Negócio\n{{{questionnaire}}}\n\n## Dados de Mercado (do Analista)\n{{{brief}}}";

const REVIEWER_USER: &str = "Revê criticamente o plano de marketing.\n\n## Respostas do Utilizador\n{{{questionnaire}}}\n\n## Brief do Analista\n{{{brief}}}\n\n## Plano de Marketing\n{{{draft}}}";

const FINALIZER_USER: &str = "Incorpora as melhorias e produz o plano final completo com todas as 10 secções.\n\n## Plano a Melhorar\n{{{draft}}}\n\n## Revisão do Revisor\n{{{review}}}";

const FINALIZER_SYSTEM_PART1_SUFFIX: &str =
    "\n\nGera as SECÇÕES 1 a 5 do plano final. Incorpora TODAS as melhorias identificadas na revisão.";

const FINALIZER_SYSTEM_PART2_SUFFIX: &str =
    "\n\nGera as SECÇÕES 6 a 10 do plano final. Começa directamente em ## SECÇÃO 6.";

const FINALIZER_USER_PART1_SUFFIX: &str = "\n\nGera apenas as Secções 1-5.";

const FINALIZER_USER_PART2_SUFFIX: &str = "\n\nGera apenas as Secções 6-10. Começa em ## SECÇÃO 6.";

/// Which half of the ten-section plan a split stage is producing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanPart {
    /// Sections 1 to 5
    First,
    /// Sections 6 to 10
    Second,
}

impl PlanPart {
    /// Get the strategist template name for this part
    pub fn template_name(&self) -> &'static str {
        match self {
            Self::First => "strategist-part1",
            Self::Second => "strategist-part2",
        }
    }
}

/// Loads role prompts and renders user messages
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// Override directory (e.g. `prompts-dir` from the config)
    override_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a new prompt loader with an optional override directory
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        let override_dir = override_dir.filter(|dir| {
            let exists = dir.exists();
            debug!(?dir, %exists, "PromptLoader::new: checking override directory");
            exists
        });
        let mut hbs = Handlebars::new();
        // Rendered values are JSON and Markdown, not HTML
        hbs.register_escape_fn(handlebars::no_escape);
        Self { hbs, override_dir }
    }

    /// Create a loader that only uses embedded prompts (for testing)
    pub fn embedded_only() -> Self {
        Self::new(None)
    }

    /// Load a role prompt by name
    ///
    /// Checks in order:
    /// 1. Override directory: `{override_dir}/{name}.pmt`
    /// 2. Embedded fallback
    fn load_template(&self, name: &str) -> Result<String> {
        if let Some(ref override_dir) = self.override_dir {
            let path = override_dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
        }
        if let Some(content) = embedded::get_embedded(name) {
            debug!(%name, "PromptLoader::load_template: using embedded");
            return Ok(content.to_string());
        }
        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Get the analyst role prompt
    pub fn analyst_system(&self) -> Result<String> {
        self.load_template("analyst")
    }

    /// Get the strategist role prompt for the given part
    pub fn strategist_system(&self, part: PlanPart) -> Result<String> {
        self.load_template(part.template_name())
    }

    /// Get the reviewer role prompt
    pub fn reviewer_system(&self) -> Result<String> {
        self.load_template("reviewer")
    }

    /// Get the finalizer role prompt with the per-part section directive
    pub fn finalizer_system(&self, part: PlanPart) -> Result<String> {
        let base = self.load_template("finalizer")?;
        let suffix = match part {
            PlanPart::First => FINALIZER_SYSTEM_PART1_SUFFIX,
            PlanPart::Second => FINALIZER_SYSTEM_PART2_SUFFIX,
        };
        Ok(format!("{}{}", base, suffix))
    }

    /// Render the analyst user message
    pub fn analyst_user(&self, questionnaire: &Value) -> Result<String> {
        let context = AnalystContext {
            questionnaire: pretty(questionnaire)?,
        };
        self.render(ANALYST_USER, &context)
    }

    /// Render the strategist user message for the given part
    pub fn strategist_user(
        &self,
        part: PlanPart,
        questionnaire: &Value,
        brief: &Value,
    ) -> Result<String> {
        let template = match part {
            PlanPart::First => STRATEGIST_PART1_USER,
            PlanPart::Second => STRATEGIST_PART2_USER,
        };
        let context = StrategistContext {
            questionnaire: pretty(questionnaire)?,
            brief: pretty(brief)?,
        };
        self.render(template, &context)
    }

    /// Render the reviewer user message
    pub fn reviewer_user(&self, questionnaire: &Value, brief: &Value, draft: &str) -> Result<String> {
        let context = ReviewerContext {
            questionnaire: pretty(questionnaire)?,
            brief: pretty(brief)?,
            draft: draft.to_string(),
        };
        self.render(REVIEWER_USER, &context)
    }

    /// Render the finalizer user message with the per-part section directive
    pub fn finalizer_user(&self, part: PlanPart, draft: &str, review: &Value) -> Result<String> {
        let context = FinalizerContext {
            draft: draft.to_string(),
            review: pretty(review)?,
        };
        let rendered = self.render(FINALIZER_USER, &context)?;
        let suffix = match part {
            PlanPart::First => FINALIZER_USER_PART1_SUFFIX,
            PlanPart::Second => FINALIZER_USER_PART2_SUFFIX,
        };
        Ok(format!("{}{}", rendered, suffix))
    }

    fn render(&self, template: &str, context: &impl Serialize) -> Result<String> {
        self.hbs
            .render_template(template, context)
            .map_err(|e| eyre!("Failed to render user message: {}", e))
    }
}

#[derive(Debug, Serialize)]
struct AnalystContext {
    questionnaire: String,
}

#[derive(Debug, Serialize)]
struct StrategistContext {
    questionnaire: String,
    brief: String,
}

#[derive(Debug, Serialize)]
struct ReviewerContext {
    questionnaire: String,
    brief: String,
    draft: String,
}

#[derive(Debug, Serialize)]
struct FinalizerContext {
    draft: String,
    review: String,
}

fn pretty(value: &Value) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to serialize context: {}", e))
}
