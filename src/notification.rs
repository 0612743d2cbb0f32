use crate::error::CoreError;
use async_trait::async_trait;

/// An escalation event to relay out-of-band when a session transitions to
/// `pending_handoff`.
#[derive(Debug, Clone)]
pub struct EscalationAlert {
    pub session_id: String,
    pub user_id: String,
    pub latest_query: String,
    pub assistant_answer: String,
    pub reason: String,
}

/// Capability contract for escalation notifications (§6). Fire-and-forget:
/// the driver dispatches this without blocking the turn on its result.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_escalation(&self, alert: &EscalationAlert) -> Result<(), CoreError>;
}

fn format_message(alert: &EscalationAlert) -> String {
    format!(
        "*Customer escalation alert*\n\
         • User: `{}`\n\
         • Session: `{}`\n\
         • Latest query: {}\n\
         • Assistant response: {}\n\
         • Reason: {}",
        alert.user_id, alert.session_id, alert.latest_query, alert.assistant_answer, alert.reason,
    )
}

/// Webhook-or-bot-token notification sink, grounded on the source's Slack
/// integration: prefers a plain incoming webhook, falls back to the bot
/// token + channel id API call, and is a no-op when neither is configured.
pub struct WebhookNotificationSink {
    client: reqwest::Client,
    webhook_url: Option<String>,
    bot_token: Option<String>,
    channel_id: Option<String>,
}

impl WebhookNotificationSink {
    pub fn new(
        webhook_url: Option<String>,
        bot_token: Option<String>,
        channel_id: Option<String>,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::builder().timeout(timeout).build().unwrap_or_else(|_| reqwest::Client::new()),
            webhook_url,
            bot_token,
            channel_id,
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn notify_escalation(&self, alert: &EscalationAlert) -> Result<(), CoreError> {
        let text = format_message(alert);

        if let Some(webhook) = &self.webhook_url {
            let response = self
                .client
                .post(webhook)
                .json(&serde_json::json!({ "text": text }))
                .send()
                .await
                .map_err(|e| CoreError::NotificationFailure(e.to_string()))?;

            if !response.status().is_success() {
                return Err(CoreError::NotificationFailure(format!(
                    "webhook returned {}",
                    response.status()
                )));
            }
            return Ok(());
        }

        if let (Some(token), Some(channel)) = (&self.bot_token, &self.channel_id) {
            let response = self
                .client
                .post("https://slack.com/api/chat.postMessage")
                .bearer_auth(token)
                .json(&serde_json::json!({ "channel": channel, "text": text }))
                .send()
                .await
                .map_err(|e| CoreError::NotificationFailure(e.to_string()))?;

            if !response.status().is_success() {
                return Err(CoreError::NotificationFailure(format!(
                    "bot API returned {}",
                    response.status()
                )));
            }

            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| CoreError::NotificationFailure(e.to_string()))?;
            if !body["ok"].as_bool().unwrap_or(false) {
                return Err(CoreError::NotificationFailure(format!("bot API error response: {}", body)));
            }
            return Ok(());
        }

        tracing::debug!("notification credentials missing; skipping escalation alert");
        Ok(())
    }
}
