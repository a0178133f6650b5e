//! Renders a run's results into an HTML report file persisted at
//! `$HOME/.privateer/reports/`, and delivers a short summary to Discord
//! when configured. `Tera` is the Jinja2-style renderer, used here with
//! `Tera::one_off` since the report has a single, fixed shape rather than
//! a directory of `.j2` files to discover.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DiscordWebhookConfig;
use crate::gitops::{GitOpsResult, GitOpsSummary};
use crate::migration::{MigrationResult, MigrationSummary};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to render report template: {0}")]
    Render(String),

    #[error("failed to write report to {path}: {raw_error_message}")]
    Write { path: String, raw_error_message: String },

    #[error("failed to deliver discord webhook: {0}")]
    Webhook(String),
}

#[derive(Debug, Serialize)]
pub struct ReportData<'a> {
    pub generated_at: String,
    pub dry_run: bool,
    pub migration_summary: Option<&'a MigrationSummary>,
    pub migration_results: &'a [MigrationResult],
    pub gitops_summary: Option<&'a GitOpsSummary>,
    pub gitops_results: &'a [GitOpsResult],
}

const REPORT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>privateer report — {{ generated_at }}</title>
  <style>
    body { font-family: -apple-system, sans-serif; margin: 2rem; color: #1a1a1a; }
    table { border-collapse: collapse; width: 100%; margin-bottom: 2rem; }
    th, td { border: 1px solid #ddd; padding: 0.4rem 0.6rem; text-align: left; font-size: 0.9rem; }
    th { background: #f4f4f4; }
    .success { color: #1a7f37; }
    .failure { color: #b22222; }
    .skipped { color: #9a6700; }
  </style>
</head>
<body>
  <h1>privateer report</h1>
  <p>Generated {{ generated_at }}{% if dry_run %} (dry run){% endif %}</p>

  {% if migration_summary %}
  <h2>Migration</h2>
  <p>total={{ migration_summary.total }} success={{ migration_summary.success }}
     skipped={{ migration_summary.skipped }} failure={{ migration_summary.failure }}</p>
  <table>
    <tr><th>Image</th><th>Registry</th><th>Target</th><th>Status</th><th>Detail</th></tr>
    {% for r in migration_results %}
    <tr>
      <td>{{ r.usage.image }}</td>
      <td>{{ r.registry_name }}</td>
      <td>{{ r.target_image }}</td>
      <td class="{% if r.success %}success{% elif r.skipped %}skipped{% else %}failure{% endif %}">
        {% if r.success %}success{% elif r.skipped %}skipped{% else %}failure{% endif %}
      </td>
      <td>{{ r.reason }}{{ r.error }}</td>
    </tr>
    {% endfor %}
  </table>
  {% endif %}

  {% if gitops_summary %}
  <h2>GitOps</h2>
  <p>total={{ gitops_summary.total }} success={{ gitops_summary.success }}
     failure={{ gitops_summary.failure }} prs_opened={{ gitops_summary.pull_requests_opened }}</p>
  <table>
    <tr><th>Repository</th><th>Branch</th><th>Pull request</th><th>Files changed</th><th>Status</th></tr>
    {% for r in gitops_results %}
    <tr>
      <td>{{ r.repository }}</td>
      <td>{{ r.branch }}</td>
      <td>{% if r.pull_request %}<a href="{{ r.pull_request.url }}">#{{ r.pull_request.number }}</a>{% endif %}</td>
      <td>{{ r.files_changed | length }}</td>
      <td class="{% if r.success %}success{% else %}failure{% endif %}">
        {% if r.success %}success{% else %}{{ r.error }}{% endif %}
      </td>
    </tr>
    {% endfor %}
  </table>
  {% endif %}
</body>
</html>
"#;

/// Renders `data` into the fixed HTML report shape.
pub fn render_html(data: &ReportData) -> Result<String, ReportError> {
    let context = Context::from_serialize(data).map_err(|err| ReportError::Render(err.to_string()))?;
    Tera::one_off(REPORT_TEMPLATE, &context, true).map_err(|err| ReportError::Render(err.to_string()))
}

/// Writes the rendered report under `reports_dir`, named
/// `privateer-{report|dryrun}-YYYY-MM-DD_HH-MM-SS.html`.
pub fn write_report(reports_dir: &Path, dry_run: bool, html: &str) -> Result<PathBuf, ReportError> {
    fs::create_dir_all(reports_dir).map_err(|err| ReportError::Write {
        path: reports_dir.display().to_string(),
        raw_error_message: err.to_string(),
    })?;

    let kind = if dry_run { "dryrun" } else { "report" };
    let file_name = format!("privateer-{kind}-{}.html", Utc::now().format("%Y-%m-%d_%H-%M-%S"));
    let path = reports_dir.join(file_name);

    fs::write(&path, html).map_err(|err| ReportError::Write {
        path: path.display().to_string(),
        raw_error_message: err.to_string(),
    })?;

    info!(path = %path.display(), "wrote html report");
    Ok(path)
}

/// Posts a short run summary to a Discord incoming webhook, best-effort:
/// callers should log and continue on error rather than fail the run over
/// a notification.
pub struct DiscordNotifier {
    client: reqwest::blocking::Client,
    config: DiscordWebhookConfig,
}

impl DiscordNotifier {
    pub fn new(config: DiscordWebhookConfig) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            config,
        }
    }

    pub fn notify(&self, content: &str) -> Result<(), ReportError> {
        if !self.config.enabled {
            return Ok(());
        }

        let mut body = serde_json::json!({ "content": content });
        if !self.config.name.is_empty() {
            body["username"] = serde_json::Value::String(self.config.name.clone());
        }
        if !self.config.avatar.is_empty() {
            body["avatar_url"] = serde_json::Value::String(self.config.avatar.clone());
        }

        let response = self
            .client
            .post(&self.config.url)
            .json(&body)
            .send()
            .map_err(|err| ReportError::Webhook(err.to_string()))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "discord webhook returned a non success status");
        }

        Ok(())
    }
}

pub fn summary_line(migration: Option<&MigrationSummary>, gitops: Option<&GitOpsSummary>) -> String {
    let mut parts = Vec::new();
    if let Some(m) = migration {
        parts.push(format!("migration: {} success, {} skipped, {} failed", m.success, m.skipped, m.failure));
    }
    if let Some(g) = gitops {
        parts.push(format!("gitops: {} repos, {} prs opened", g.total, g.pull_requests_opened));
    }
    if parts.is_empty() {
        "nothing to report".to_string()
    } else {
        parts.join(" | ")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn renders_empty_report_without_panicking() {
        let data = ReportData {
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            dry_run: false,
            migration_summary: None,
            migration_results: &[],
            gitops_summary: None,
            gitops_results: &[],
        };
        let html = render_html(&data).unwrap();
        assert!(html.contains("privateer report"));
    }

    #[test]
    fn summary_line_handles_both_sections_present() {
        let migration = MigrationSummary {
            total: 2,
            success: 1,
            skipped: 1,
            failure: 0,
            errors: vec![],
        };
        let gitops = GitOpsSummary {
            total: 1,
            success: 1,
            failure: 0,
            files_changed: 2,
            images_changed: 2,
            pull_requests_opened: 1,
            errors: vec![],
        };
        let line = summary_line(Some(&migration), Some(&gitops));
        assert!(line.contains("migration:"));
        assert!(line.contains("gitops:"));
    }

    #[test]
    fn disabled_webhook_is_a_no_op() {
        let notifier = DiscordNotifier::new(DiscordWebhookConfig {
            enabled: false,
            url: String::new(),
            name: String::new(),
            avatar: String::new(),
        });
        assert!(notifier.notify("test").is_ok());
    }
}
