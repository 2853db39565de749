//! Webhook notifications and the restart-warning schedule.
//!
//! Messages are posted to a Discord-style webhook as a single embed. Sending
//! is best effort from the caller's point of view, but every failure is
//! reported so the caller can decide whether it matters.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::NotifierConfig;
use crate::error::{ApiError, NotifyError, NotifyResult};
use crate::health::HealthCheck;
use crate::mods::USER_AGENT;
use crate::retry::RetryPolicy;
use crate::services::Notifier;

const COLOR_SUCCESS: u32 = 0x00FF00;
const COLOR_ERROR: u32 = 0xFF0000;
const COLOR_WARNING: u32 = 0xFFA500;

/// Embed descriptions longer than this are cut and end in `...`.
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

const WEBHOOK_PREFIX: &str = "https://discord.com/api/webhooks/";

/// Warning intervals in the order they fire: longest first, duplicates
/// removed.
pub fn warning_schedule(intervals: &[u64]) -> Vec<u64> {
    let mut schedule = intervals.to_vec();
    schedule.sort_unstable_by(|a, b| b.cmp(a));
    schedule.dedup();
    schedule
}

/// Substitutes `{minutes}` in the warning template.
pub fn render_warning(template: &str, minutes: u64) -> String {
    template.replace("{minutes}", &minutes.to_string())
}

fn truncate_description(message: &str) -> String {
    if message.chars().count() <= MAX_DESCRIPTION_CHARS {
        return message.to_string();
    }
    let mut cut: String = message.chars().take(MAX_DESCRIPTION_CHARS - 3).collect();
    cut.push_str("...");
    cut
}

fn embed_payload(title: &str, message: &str, color: u32) -> Value {
    json!({
        "embeds": [{
            "title": title,
            "description": truncate_description(message),
            "color": color,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "footer": {"text": "CraftOps"},
        }]
    })
}

/// Sends notifications to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    config: NotifierConfig,
    http: Client,
    retry: RetryPolicy,
}

impl WebhookNotifier {
    pub fn new(config: NotifierConfig) -> NotifyResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| NotifyError::Http {
                url: config.webhook_url.clone().unwrap_or_default(),
                source,
            })?;
        let retry = RetryPolicy::new(config.max_retries, config.retry_delay);
        Ok(Self {
            config,
            http,
            retry,
        })
    }

    pub async fn send_success(&self, message: &str, cancel: &CancellationToken) -> NotifyResult<()> {
        if !self.config.success_notifications {
            return Ok(());
        }
        self.send("Success", message, COLOR_SUCCESS, cancel).await
    }

    pub async fn send_error(&self, message: &str, cancel: &CancellationToken) -> NotifyResult<()> {
        if !self.config.error_notifications {
            return Ok(());
        }
        self.send("Error", message, COLOR_ERROR, cancel).await
    }

    /// Sends one warning per configured interval, longest first, waiting
    /// `current - next` interval units between consecutive warnings.
    ///
    /// The wait is cancellable; the first failed send aborts the sequence.
    pub async fn send_restart_warnings(&self, cancel: &CancellationToken) -> NotifyResult<()> {
        let schedule = warning_schedule(&self.config.warning_intervals);
        if schedule.is_empty() {
            return Ok(());
        }
        info!(intervals = ?schedule, "Sending restart warnings");

        for (i, &minutes) in schedule.iter().enumerate() {
            let message = render_warning(&self.config.warning_message, minutes);
            self.send("Server Restart Warning", &message, COLOR_WARNING, cancel)
                .await?;

            let Some(&next) = schedule.get(i + 1) else {
                break;
            };
            let wait = self
                .config
                .interval_unit
                .saturating_mul(u32::try_from(minutes - next).unwrap_or(u32::MAX));
            info!(?wait, "Waiting before next warning");

            tokio::select! {
                _ = cancel.cancelled() => return Err(NotifyError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
        Ok(())
    }

    async fn send(
        &self,
        title: &str,
        message: &str,
        color: u32,
        cancel: &CancellationToken,
    ) -> NotifyResult<()> {
        let Some(url) = self.config.webhook_url.as_deref().filter(|u| !u.is_empty()) else {
            debug!(title, "Webhook not configured, skipping notification");
            return Ok(());
        };

        if self.config.dry_run {
            info!(title, "Dry run: would send notification");
            return Ok(());
        }

        let payload = embed_payload(title, message, color);
        self.retry
            .run(cancel, |_| self.post(url, &payload, cancel))
            .await?;
        debug!(title, "Notification sent");
        Ok(())
    }

    async fn post(&self, url: &str, payload: &Value, cancel: &CancellationToken) -> NotifyResult<()> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(NotifyError::Cancelled),
            sent = self.http.post(url).json(payload).send() => sent.map_err(|source| NotifyError::Http {
                url: url.to_string(),
                source,
            })?,
        };

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ApiError::new(url, status.as_u16(), "webhook error").into())
        }
    }

    pub fn health_check(&self) -> Vec<HealthCheck> {
        let webhook = match self.config.webhook_url.as_deref() {
            None | Some("") => HealthCheck::warn("Discord webhook", "Not configured"),
            Some(url) if !url.starts_with(WEBHOOK_PREFIX) => {
                HealthCheck::error("Discord webhook", "Invalid URL format")
            }
            Some(_) => HealthCheck::ok("Discord webhook", "Configured"),
        };

        let settings = if !self.config.success_notifications && !self.config.error_notifications {
            HealthCheck::warn("Notification settings", "All disabled")
        } else {
            HealthCheck::ok("Notification settings", "Configured")
        };

        vec![webhook, settings]
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_success(&self, message: &str, cancel: &CancellationToken) -> NotifyResult<()> {
        WebhookNotifier::send_success(self, message, cancel).await
    }

    async fn send_error(&self, message: &str, cancel: &CancellationToken) -> NotifyResult<()> {
        WebhookNotifier::send_error(self, message, cancel).await
    }

    async fn send_restart_warnings(&self, cancel: &CancellationToken) -> NotifyResult<()> {
        WebhookNotifier::send_restart_warnings(self, cancel).await
    }

    async fn health_check(&self) -> Vec<HealthCheck> {
        WebhookNotifier::health_check(self)
    }
}
