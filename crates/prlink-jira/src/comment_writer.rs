use prlink_markdown::markdown_to_jira;
use thiserror::Error;

use crate::change_request::{ChangeRequest, CommentMode, TriggerAction};
use crate::jira_api_client::{JiraApiClient, JiraError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentWriteOutcome {
    Created,
    Updated { comment_id: String },
    CreatedMinimal,
}

impl CommentWriteOutcome {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated { .. } => "updated",
            Self::CreatedMinimal => "created_minimal",
        }
    }
}

#[derive(Debug, Error)]
#[error("comment write on {issue_key} failed: {source}")]
/// Lookup, create, or update failure for one issue. These are the only
/// failures the orchestrator may escalate.
pub struct CommentWriteError {
    pub issue_key: String,
    #[source]
    pub source: JiraError,
}

#[derive(Debug, Clone, Copy)]
pub struct CommentRequest<'a> {
    pub issue_key: &'a str,
    pub change_request: &'a ChangeRequest,
    /// Markdown description with image references already rewritten for this issue.
    pub description: &'a str,
    pub mode: CommentMode,
    pub action: &'a TriggerAction,
}

pub fn render_pr_link(change_request: &ChangeRequest) -> String {
    format!("[{}|{}]", change_request.title, change_request.url)
}

/// Heading linking the PR, then the description converted to Jira wiki markup.
pub fn render_full_comment(change_request: &ChangeRequest, description: &str) -> String {
    let wiki_body = markdown_to_jira(description);
    format!("h3. {}\n\n{}", render_pr_link(change_request), wiki_body)
        .trim_end()
        .to_string()
}

pub fn render_minimal_comment(change_request: &ChangeRequest) -> String {
    format!("PR updated: {}", render_pr_link(change_request))
}

/// Creates or updates the PR comment on one issue according to `request.mode`.
///
/// `update` skips the lookup on the first occurrence and otherwise updates the
/// first comment containing the PR URL. `new` always creates. `minimal`
/// creates the full body on the first occurrence and a one-line note afterwards.
pub async fn write_issue_comment(
    client: &JiraApiClient,
    request: CommentRequest<'_>,
) -> Result<CommentWriteOutcome, CommentWriteError> {
    let issue_key = request.issue_key;
    let wrap = |source: JiraError| CommentWriteError {
        issue_key: issue_key.to_string(),
        source,
    };
    let first_occurrence = request.action.is_first_occurrence();

    let outcome = match request.mode {
        CommentMode::Update if !first_occurrence => {
            let body = render_full_comment(request.change_request, request.description);
            let existing = client
                .find_comment_containing(issue_key, &request.change_request.url)
                .await
                .map_err(wrap)?;
            match existing {
                Some(comment_id) => {
                    client
                        .update_comment(issue_key, &comment_id, &body)
                        .await
                        .map_err(wrap)?;
                    CommentWriteOutcome::Updated { comment_id }
                }
                None => {
                    client.create_comment(issue_key, &body).await.map_err(wrap)?;
                    CommentWriteOutcome::Created
                }
            }
        }
        CommentMode::Minimal if !first_occurrence => {
            let body = render_minimal_comment(request.change_request);
            client.create_comment(issue_key, &body).await.map_err(wrap)?;
            CommentWriteOutcome::CreatedMinimal
        }
        CommentMode::Update | CommentMode::New | CommentMode::Minimal => {
            let body = render_full_comment(request.change_request, request.description);
            client.create_comment(issue_key, &body).await.map_err(wrap)?;
            CommentWriteOutcome::Created
        }
    };

    match &outcome {
        CommentWriteOutcome::Created => tracing::info!("Created comment on {issue_key}"),
        CommentWriteOutcome::Updated { .. } => tracing::info!("Updated comment on {issue_key}"),
        CommentWriteOutcome::CreatedMinimal => {
            tracing::info!("Created minimal comment on {issue_key}")
        }
    }
    Ok(outcome)
}
