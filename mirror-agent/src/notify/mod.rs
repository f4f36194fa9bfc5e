//! Webhook notifications.
//!
//! One status card per run, posted as an adaptive-card message. Delivery
//! problems are logged and reported back to the caller but never change the
//! run's exit status.

use crate::config::NotifyConfig;
use crate::report::RunStatus;
use crate::utils::errors::Result;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const DEFAULT_SERVER_URL: &str = "https://github.com";

/// Where the run is executing, if a CI environment says so.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunContext {
    pub repository: Option<String>,
    pub run_id: Option<String>,
    pub server_url: Option<String>,
}

impl RunContext {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            repository: non_empty("GITHUB_REPOSITORY"),
            run_id: non_empty("GITHUB_RUN_ID"),
            server_url: non_empty("GITHUB_SERVER_URL"),
        }
    }

    /// `<server>/<repo>/actions/runs/<id>`, when both repo and run id are known.
    pub fn workflow_url(&self) -> Option<String> {
        let repository = self.repository.as_deref()?;
        let run_id = self.run_id.as_deref()?;
        let server = self
            .server_url
            .as_deref()
            .unwrap_or(DEFAULT_SERVER_URL)
            .trim_end_matches('/');
        Some(format!("{}/{}/actions/runs/{}", server, repository, run_id))
    }
}

/// What gets reported for a run.
#[derive(Debug, Clone)]
pub struct Notification {
    pub status: RunStatus,
    pub message: String,
    pub successful_repos: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(status: RunStatus, message: impl Into<String>, successful_repos: Vec<String>) -> Self {
        Self {
            status,
            message: message.into(),
            successful_repos,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// No webhook configured
    Skipped,
    RateLimited,
    Delivered(u16),
    Failed(String),
}

pub struct Notifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
    context: RunContext,
    min_interval: Duration,
    last_sent: Option<Instant>,
}

impl Notifier {
    pub fn new(config: &NotifyConfig, context: RunContext) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .build()?;

        Ok(Self {
            webhook_url: config
                .webhook_url
                .clone()
                .filter(|url| !url.trim().is_empty()),
            client,
            context,
            min_interval: Duration::from_secs(config.min_interval_secs),
            last_sent: None,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Post the card. Never returns an error; the outcome is for logging and tests.
    pub async fn notify(&mut self, notification: &Notification) -> NotifyOutcome {
        let Some(url) = self.webhook_url.clone() else {
            info!("No webhook URL configured, skipping notification");
            return NotifyOutcome::Skipped;
        };

        if let Some(last) = self.last_sent {
            if last.elapsed() < self.min_interval {
                warn!("Rate limiting webhook notifications");
                return NotifyOutcome::RateLimited;
            }
        }
        self.last_sent = Some(Instant::now());

        let payload = render_card(notification, &self.context);

        let response = match self.client.post(&url).json(&payload).send().await {
            Ok(response) => response,
            Err(e) => {
                // reqwest errors embed the URL, and the webhook URL is a secret
                let e = e.without_url();
                warn!(error = %e, "Failed to send webhook");
                return NotifyOutcome::Failed(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status_code = status.as_u16(), "Webhook returned non-success status");
            return NotifyOutcome::Failed(format!("HTTP {}", status.as_u16()));
        }

        info!(status = %notification.status, "Webhook notification sent");
        NotifyOutcome::Delivered(status.as_u16())
    }
}

fn title_and_color(status: RunStatus) -> (&'static str, &'static str) {
    match status {
        RunStatus::Success => ("✅ Repository Backup Successful", "Good"),
        RunStatus::Failure => ("❌ Repository Backup Failed", "Attention"),
        RunStatus::Crashed => ("💥 Repository Backup Crashed", "Attention"),
    }
}

/// Adaptive card: title block, message block, optional workflow link, facts.
pub fn render_card(notification: &Notification, context: &RunContext) -> Value {
    let (title, color) = title_and_color(notification.status);

    let mut body = vec![
        json!({
            "type": "TextBlock",
            "text": title,
            "weight": "Bolder",
            "size": "Large",
            "color": color,
        }),
        json!({
            "type": "TextBlock",
            "text": format!(
                "{} on {}",
                notification.message,
                notification.timestamp.format("%Y-%m-%d")
            ),
            "wrap": true,
        }),
    ];

    if let Some(url) = context.workflow_url() {
        body.push(json!({
            "type": "TextBlock",
            "text": format!("[View Workflow]({})", url),
        }));
    }

    let mut facts = vec![
        fact(
            "Timestamp:",
            notification.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        ),
        fact("Status:", notification.status.to_string()),
    ];
    if let Some(repository) = &context.repository {
        facts.push(fact("Repository:", repository.clone()));
    }
    if let Some(run_id) = &context.run_id {
        facts.push(fact("Workflow Run ID:", run_id.clone()));
    }
    if !notification.successful_repos.is_empty() {
        facts.push(fact("Successful Repos:", notification.successful_repos.join(", ")));
    }

    body.push(json!({ "type": "FactSet", "facts": facts }));

    json!({
        "type": "message",
        "attachments": [{
            "contentType": "application/vnd.microsoft.card.adaptive",
            "content": {
                "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
                "type": "AdaptiveCard",
                "version": "1.3",
                "body": body,
            },
        }],
    })
}

fn fact(title: &str, value: String) -> Value {
    json!({ "title": title, "value": value })
}
