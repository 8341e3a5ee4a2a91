use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::json;
use thiserror::Error;

use crate::transport_helpers::{parse_retry_after, truncate_for_error, RetryPolicy, RetrySchedule};

const JIRA_API_PREFIX: [&str; 3] = ["rest", "api", "2"];
const COMMENT_PAGE_SIZE: u64 = 100;
const ERROR_BODY_MAX_CHARS: usize = 800;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Jira site and credentials used for every tracker call in a run.
pub struct JiraConfig {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
}

impl JiraConfig {
    pub fn normalized_base_url(&self) -> String {
        self.base_url.trim().trim_end_matches('/').to_string()
    }

    pub fn is_complete(&self) -> bool {
        !self.base_url.trim().is_empty()
            && !self.email.trim().is_empty()
            && !self.api_token.trim().is_empty()
    }

    /// `Basic base64(email:token)`.
    pub fn basic_auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.email.trim(), self.api_token.trim());
        format!("Basic {}", BASE64_STANDARD.encode(credentials))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JiraClientOptions {
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for JiraClientOptions {
    fn default() -> Self {
        Self {
            request_timeout_ms: 15_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum JiraError {
    #[error("invalid jira configuration: {0}")]
    Config(String),
    #[error("jira api {operation} request failed: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("jira api {operation} failed with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("failed to decode jira {operation}: {source}")]
    Decode {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JiraComment {
    #[serde(deserialize_with = "deserialize_comment_id")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_nullable_text")]
    pub body: String,
}

#[derive(Debug, Deserialize)]
struct JiraCommentPage {
    #[serde(default)]
    comments: Vec<JiraComment>,
    #[serde(default)]
    total: Option<u64>,
}

fn deserialize_comment_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(id) => Ok(id),
        serde_json::Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "unsupported comment id: {other}"
        ))),
    }
}

fn deserialize_nullable_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone)]
pub struct JiraApiClient {
    http: reqwest::Client,
    base_url: Url,
    retry: RetrySchedule,
}

impl JiraApiClient {
    pub fn new(config: &JiraConfig, options: JiraClientOptions) -> Result<Self, JiraError> {
        let normalized = config.normalized_base_url();
        let base_url = Url::parse(&normalized)
            .map_err(|error| JiraError::Config(format!("invalid base url '{normalized}': {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(JiraError::Config(format!(
                "base url '{normalized}' cannot carry api paths"
            )));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("prlink-jira-bridge"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let mut auth_value = reqwest::header::HeaderValue::from_str(&config.basic_auth_header())
            .map_err(|_| JiraError::Config("invalid jira authorization header".to_string()))?;
        auth_value.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth_value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(options.request_timeout_ms.max(1)))
            .build()
            .map_err(|source| JiraError::Transport {
                operation: "client setup".to_string(),
                source,
            })?;
        Ok(Self {
            http,
            base_url,
            retry: RetrySchedule::new(options.retry_max_attempts, options.retry_base_delay_ms),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, JiraError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| JiraError::Config("base url cannot carry api paths".to_string()))?;
            path.pop_if_empty().extend(JIRA_API_PREFIX).extend(segments);
        }
        Ok(url)
    }

    /// Lists every comment on the issue, following `startAt` pagination.
    pub async fn list_comments(&self, issue_key: &str) -> Result<Vec<JiraComment>, JiraError> {
        let url = self.endpoint(&["issue", issue_key, "comment"])?;
        let mut start_at = 0_u64;
        let mut rows = Vec::new();
        loop {
            let start_value = start_at.to_string();
            let page_size = COMMENT_PAGE_SIZE.to_string();
            let page: JiraCommentPage = self
                .request_json("list comments", || {
                    self.http.get(url.clone()).query(&[
                        ("startAt", start_value.as_str()),
                        ("maxResults", page_size.as_str()),
                    ])
                })
                .await?;
            let count = page.comments.len() as u64;
            rows.extend(page.comments);
            let next_start = start_at.saturating_add(count);
            let exhausted = match page.total {
                Some(total) => next_start >= total,
                None => count < COMMENT_PAGE_SIZE,
            };
            if count == 0 || exhausted {
                break;
            }
            start_at = next_start;
        }
        Ok(rows)
    }

    /// Id of the first comment whose body contains `needle`.
    pub async fn find_comment_containing(
        &self,
        issue_key: &str,
        needle: &str,
    ) -> Result<Option<String>, JiraError> {
        let comments = self.list_comments(issue_key).await?;
        Ok(comments
            .into_iter()
            .find(|comment| comment.body.contains(needle))
            .map(|comment| comment.id))
    }

    pub async fn create_comment(&self, issue_key: &str, body: &str) -> Result<(), JiraError> {
        let url = self.endpoint(&["issue", issue_key, "comment"])?;
        let payload = json!({ "body": body });
        self.send_with_retry("create comment", RetryPolicy::Unaccepted, || {
            self.http.post(url.clone()).json(&payload)
        })
        .await?;
        Ok(())
    }

    pub async fn update_comment(
        &self,
        issue_key: &str,
        comment_id: &str,
        body: &str,
    ) -> Result<(), JiraError> {
        let url = self.endpoint(&["issue", issue_key, "comment", comment_id])?;
        let payload = json!({ "body": body });
        self.send_with_retry("update comment", RetryPolicy::Idempotent, || {
            self.http.put(url.clone()).json(&payload)
        })
        .await?;
        Ok(())
    }

    /// Uploads one attachment. A non-success response is logged and reported as
    /// `Ok(false)`; only transport failures are returned as errors.
    pub async fn upload_attachment(
        &self,
        issue_key: &str,
        filename: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<bool, JiraError> {
        let url = self.endpoint(&["issue", issue_key, "attachments"])?;
        let form = Form::new().part("file", attachment_part(filename, bytes, content_type));
        let response = self
            .http
            .post(url)
            .header("X-Atlassian-Token", "no-check")
            .multipart(form)
            .send()
            .await
            .map_err(|source| JiraError::Transport {
                operation: "upload attachment".to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::info!("Uploaded {filename} to {issue_key}");
            return Ok(true);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(
            "Failed to upload {filename} to {issue_key}: status {}: {}",
            status.as_u16(),
            truncate_for_error(&body, ERROR_BODY_MAX_CHARS)
        );
        Ok(false)
    }

    async fn request_json<T, F>(&self, operation: &str, request_builder: F) -> Result<T, JiraError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let response = self
            .send_with_retry(operation, RetryPolicy::Idempotent, request_builder)
            .await?;
        response
            .json::<T>()
            .await
            .map_err(|source| JiraError::Decode {
                operation: operation.to_string(),
                source,
            })
    }

    async fn send_with_retry<F>(
        &self,
        operation: &str,
        policy: RetryPolicy,
        mut request_builder: F,
    ) -> Result<reqwest::Response, JiraError>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            match request_builder().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if self.retry.has_attempts_after(attempt)
                        && policy.retries_status(status.as_u16())
                    {
                        tracing::debug!(
                            "retrying jira {operation} after status {} (attempt {attempt})",
                            status.as_u16()
                        );
                        tokio::time::sleep(self.retry.delay_after(attempt, retry_after)).await;
                        continue;
                    }

                    return Err(JiraError::Status {
                        operation: operation.to_string(),
                        status: status.as_u16(),
                        body: truncate_for_error(&body, ERROR_BODY_MAX_CHARS),
                    });
                }
                Err(error) => {
                    if self.retry.has_attempts_after(attempt)
                        && policy.retries_transport_error(&error)
                    {
                        tracing::debug!("retrying jira {operation} after {error} (attempt {attempt})");
                        tokio::time::sleep(self.retry.delay_after(attempt, None)).await;
                        continue;
                    }
                    return Err(JiraError::Transport {
                        operation: operation.to_string(),
                        source: error,
                    });
                }
            }
        }
    }
}

fn attachment_part(filename: &str, bytes: &[u8], content_type: &str) -> Part {
    let part = Part::bytes(bytes.to_vec()).file_name(filename.to_string());
    match part.mime_str(content_type) {
        Ok(part) => part,
        Err(_) => Part::bytes(bytes.to_vec()).file_name(filename.to_string()),
    }
}
