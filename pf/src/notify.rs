//! Completion notification
//!
//! When a plan completes, the contact on record gets an email with a link
//! to the finished document. Delivery goes through a Brevo-compatible
//! transactional API. Notification is strictly best-effort: the caller
//! logs failures and the plan state never depends on delivery.

use async_trait::async_trait;
use eyre::{Result, eyre};
use planstore::Plan;
use serde_json::json;
use tracing::{debug, info};

use crate::config::NotifyConfig;

/// Channel for telling a plan's contact their document is ready
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn plan_completed(&self, plan: &Plan) -> Result<()>;
}

/// Sends the completion email through a Brevo-compatible JSON API
pub struct EmailNotifier {
    api_url: String,
    api_key: String,
    sender_name: String,
    sender_email: String,
    app_base_url: String,
    http: reqwest::Client,
}

impl EmailNotifier {
    /// Build from config; `None` when the API key env var is unset,
    /// which disables notification entirely
    pub fn from_config(config: &NotifyConfig) -> Option<Self> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.is_empty() => key,
            _ => {
                debug!(
                    env = %config.api_key_env,
                    "Notification API key not set, email disabled"
                );
                return None;
            }
        };
        Some(Self {
            api_url: config.api_url.clone(),
            api_key,
            sender_name: config.sender_name.clone(),
            sender_email: config.sender_email.clone(),
            app_base_url: config.app_base_url.clone(),
            http: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn plan_completed(&self, plan: &Plan) -> Result<()> {
        let Some(contact) = &plan.contact else {
            debug!(plan_id = %plan.id, "Plan has no contact, skipping notification");
            return Ok(());
        };

        let recipient_name = first_name(contact.name.as_deref());
        let body = json!({
            "sender": {"name": self.sender_name, "email": self.sender_email},
            "to": [{"email": contact.email, "name": recipient_name}],
            "subject": subject_for(plan),
            "htmlContent": html_content(plan, &recipient_name, &self.app_base_url),
        });

        let response = self
            .http
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(eyre!("notification API {}: {}", status, detail));
        }

        info!(plan_id = %plan.id, email = %contact.email, "Completion email sent");
        Ok(())
    }
}

/// First word of the contact name, with a generic fallback
fn first_name(name: Option<&str>) -> String {
    name.unwrap_or("empreendedor")
        .split_whitespace()
        .next()
        .unwrap_or("empreendedor")
        .to_string()
}

/// Business name from questionnaire answer `1_nome`, with a generic fallback
fn business_name(plan: &Plan) -> &str {
    plan.questionnaire
        .pointer("/respostas/1_nome")
        .and_then(|v| v.as_str())
        .unwrap_or("o teu negócio")
}

fn subject_for(plan: &Plan) -> String {
    format!(
        "O teu plano de marketing para {} está pronto! 🎯",
        business_name(plan)
    )
}

fn html_content(plan: &Plan, recipient_name: &str, app_base_url: &str) -> String {
    let document_url = format!("{}/api/plans/{}/document", app_base_url, plan.id);
    format!(
        r#"<html>
<body style="font-family: Arial, sans-serif; color: #1a1a2e; max-width: 600px; margin: 0 auto; padding: 24px;">
  <h1 style="font-size: 22px;">Olá {recipient_name}!</h1>
  <p>O teu plano de marketing para <strong>{business}</strong> está pronto.</p>
  <p>São 10 secções completas: diagnóstico, SWOT, objetivos, posicionamento,
  marketing-mix, plano de ações com orçamento e KPIs para acompanhares os resultados.</p>
  <p style="margin: 32px 0;">
    <a href="{document_url}" style="background: #16213e; color: #ffffff; padding: 12px 24px; text-decoration: none; border-radius: 6px;">Ver o meu plano</a>
  </p>
  <p style="color: #666; font-size: 13px;">Se o botão não funcionar, copia este endereço para o navegador:<br>{document_url}</p>
</body>
</html>"#,
        recipient_name = recipient_name,
        business = business_name(plan),
        document_url = document_url,
    )
}
