use std::time::Duration;

use anyhow::{bail, Context, Result};
use prlink_jira::transport_helpers::{
    parse_retry_after, truncate_for_error, RetryPolicy, RetrySchedule,
};
use serde_json::json;

use crate::event_context::RepoRef;

pub const SECTION_START: &str = "<!-- prlink:start -->";
pub const SECTION_END: &str = "<!-- prlink:end -->";
const ERROR_BODY_MAX_CHARS: usize = 800;

pub fn build_jira_section(keys: &[String], jira_base_url: &str) -> String {
    let base = jira_base_url.trim_end_matches('/');
    let links = keys
        .iter()
        .map(|key| format!("- [{key}]({base}/browse/{key})"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{SECTION_START}\n## Jira\n\n{links}\n{SECTION_END}")
}

/// Replaces an existing marked section in place, or appends the section after
/// the trimmed body separated by a blank line.
pub fn merge_jira_section(current_body: &str, section: &str) -> String {
    if let (Some(start), Some(end)) = (
        current_body.find(SECTION_START),
        current_body.find(SECTION_END),
    ) {
        if start <= end {
            let tail = &current_body[end + SECTION_END.len()..];
            return format!("{}{section}{tail}", &current_body[..start]);
        }
    }
    format!("{}\n\n{section}", current_body.trim_end())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkBackOutcome {
    Updated,
    Unchanged,
}

#[derive(Clone)]
pub struct GithubPullClient {
    http: reqwest::Client,
    api_base: String,
    retry: RetrySchedule,
}

impl GithubPullClient {
    pub fn new(
        api_base: &str,
        token: &str,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("prlink"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid github authorization header")?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            retry: RetrySchedule::new(retry_max_attempts, retry_base_delay_ms),
        })
    }

    pub async fn update_pull_body(&self, repo: &RepoRef, number: u64, body: &str) -> Result<()> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{number}",
            self.api_base, repo.owner, repo.name
        );
        let payload = json!({ "body": body });
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            match self.http.patch(&url).json(&payload).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if self.retry.has_attempts_after(attempt)
                        && RetryPolicy::Idempotent.retries_status(status.as_u16())
                    {
                        tokio::time::sleep(self.retry.delay_after(attempt, retry_after)).await;
                        continue;
                    }
                    bail!(
                        "github api update pull request failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, ERROR_BODY_MAX_CHARS)
                    );
                }
                Err(error) => {
                    if self.retry.has_attempts_after(attempt)
                        && RetryPolicy::Idempotent.retries_transport_error(&error)
                    {
                        tokio::time::sleep(self.retry.delay_after(attempt, None)).await;
                        continue;
                    }
                    return Err(error).context("github api update pull request request failed");
                }
            }
        }
    }
}

/// Writes the Jira link section into the PR body unless it is already current.
pub async fn append_jira_links_to_pr(
    client: &GithubPullClient,
    repo: &RepoRef,
    pull_number: u64,
    current_body: &str,
    keys: &[String],
    jira_base_url: &str,
) -> Result<LinkBackOutcome> {
    let section = build_jira_section(keys, jira_base_url);
    let new_body = merge_jira_section(current_body, &section);
    if new_body == current_body {
        tracing::info!("PR body already has correct Jira links, skipping update");
        return Ok(LinkBackOutcome::Unchanged);
    }
    client
        .update_pull_body(repo, pull_number, &new_body)
        .await?;
    tracing::info!("Appended Jira links to PR #{pull_number}");
    Ok(LinkBackOutcome::Updated)
}
