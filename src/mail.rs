use serde::Serialize;

use crate::config::MailConfig;

/// Outgoing message in the shape the mail API expects
#[derive(Debug, Serialize)]
pub struct OutgoingEmail<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub text: String,
}

/// Sends transactional mail through an HTTP email API
#[derive(Clone)]
pub struct Mailer {
    config: MailConfig,
    http_client: reqwest::Client,
}

impl Mailer {
    pub fn new(config: MailConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_url.is_some()
    }

    pub async fn send_password_reset(&self, to: &str, reset_url: &str) -> anyhow::Result<()> {
        let email = OutgoingEmail {
            from: &self.config.from,
            to,
            subject: "Reset your Compyy password",
            text: password_reset_body(reset_url),
        };
        self.send(&email).await
    }

    async fn send(&self, email: &OutgoingEmail<'_>) -> anyhow::Result<()> {
        let Some(api_url) = self.config.api_url.as_deref() else {
            tracing::info!(
                "Mail API not configured; would send '{}' to {}:\n{}",
                email.subject,
                email.to,
                email.text
            );
            return Ok(());
        };

        let mut request = self.http_client.post(api_url).json(email);
        if let Some(key) = self.config.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Mail API request failed: {} - {}", status, error_text);
            anyhow::bail!("Mail API request failed with status {}", status);
        }

        tracing::debug!("Sent '{}' to {}", email.subject, email.to);
        Ok(())
    }
}

fn password_reset_body(reset_url: &str) -> String {
    format!(
        "Someone asked to reset the password for your Compyy account.\n\n\
         Open this link to choose a new password:\n{}\n\n\
         The link works once and expires in one hour. \
         If you did not ask for this, you can ignore this email.\n",
        reset_url
    )
}
