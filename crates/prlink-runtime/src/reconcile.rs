use std::collections::{HashMap, HashSet};

use prlink_jira::{
    write_issue_comment, ChangeRequest, CommentMode, CommentRequest, CommentWriteError,
    JiraApiClient, JiraError, TriggerAction,
};
use prlink_markdown::{extract_image_references, rewrite_image_references};
use prlink_media::{deduplicate_filenames, AttachmentNameEntry, FetchedImage, ImageSource};
use thiserror::Error;

use crate::issue_report::{IssueOutcomeStatus, IssueReport, ReconcileReport};

#[derive(Debug, Clone, Copy)]
pub struct ReconcileRequest<'a> {
    pub issue_keys: &'a [String],
    pub change_request: &'a ChangeRequest,
    pub mode: CommentMode,
    pub action: &'a TriggerAction,
    /// Abort the batch on the first per-issue failure instead of continuing.
    pub fail_fast: bool,
}

#[derive(Debug, Error)]
pub enum IssueSyncError {
    #[error("attachment upload of {filename} failed: {source}")]
    Upload {
        filename: String,
        #[source]
        source: JiraError,
    },
    #[error(transparent)]
    Comment(#[from] CommentWriteError),
}

#[derive(Debug, Error)]
#[error("Failed to post to {issue_key}: {source}")]
pub struct ReconcileError {
    pub issue_key: String,
    #[source]
    pub source: IssueSyncError,
    /// Issues processed before the abort.
    pub partial: ReconcileReport,
}

/// Downloads every distinct image referenced by `description`, in first
/// appearance order, and assigns collision-free attachment filenames.
///
/// Returns the number of references found and the images that could be fetched.
pub async fn fetch_unique_images(
    images: &dyn ImageSource,
    description: &str,
) -> (usize, Vec<FetchedImage>) {
    let references = extract_image_references(description);
    if references.is_empty() {
        return (0, Vec::new());
    }
    tracing::info!("Found {} image(s) in PR body", references.len());

    let mut attempted = HashSet::new();
    let mut fetched = Vec::new();
    for reference in &references {
        if !attempted.insert(reference.source_url.as_str()) {
            continue;
        }
        if let Some(mut image) = images.fetch_image(&reference.source_url).await {
            // Rewrites are keyed by the URL exactly as written in the markdown.
            image.source_url = reference.source_url.clone();
            fetched.push(image);
        }
    }

    let entries = fetched
        .iter()
        .map(|image| AttachmentNameEntry {
            url: image.source_url.clone(),
            filename: image.filename.clone(),
        })
        .collect::<Vec<_>>();
    let unique_names = deduplicate_filenames(&entries);
    for image in &mut fetched {
        if let Some(name) = unique_names.get(&image.source_url) {
            image.filename = name.clone();
        }
    }
    (references.len(), fetched)
}

/// Syncs one pull request onto every issue in `request.issue_keys`.
///
/// Images are fetched once per run and uploaded to each issue. The comment for
/// an issue points only at attachments that issue accepted; references whose
/// upload failed keep their original URL. Per-issue failures are logged and
/// recorded unless `fail_fast` is set, in which case the first one aborts.
pub async fn reconcile(
    jira: &JiraApiClient,
    images: &dyn ImageSource,
    request: ReconcileRequest<'_>,
) -> Result<ReconcileReport, ReconcileError> {
    let (images_found, fetched) = fetch_unique_images(images, &request.change_request.body).await;
    let mut report = ReconcileReport {
        images_found,
        images_fetched: fetched.len(),
        issues: Vec::new(),
    };

    for raw_key in request.issue_keys {
        let issue_key = raw_key.trim();
        if issue_key.is_empty() {
            tracing::warn!("Skipping empty issue key");
            continue;
        }
        match sync_issue(jira, issue_key, &fetched, &request).await {
            Ok(issue_report) => report.issues.push(issue_report),
            Err(source) if request.fail_fast => {
                tracing::error!("Failed to post to {issue_key}: {source}");
                return Err(ReconcileError {
                    issue_key: issue_key.to_string(),
                    source,
                    partial: report,
                });
            }
            Err(source) => {
                tracing::warn!("Failed to post to {issue_key}: {source}");
                report
                    .issues
                    .push(IssueReport::failed(issue_key, source.to_string()));
            }
        }
    }

    tracing::debug!("reconcile finished: {}", report.render_summary());
    Ok(report)
}

async fn sync_issue(
    jira: &JiraApiClient,
    issue_key: &str,
    images: &[FetchedImage],
    request: &ReconcileRequest<'_>,
) -> Result<IssueReport, IssueSyncError> {
    let mut url_to_filename = HashMap::new();
    let mut uploaded_files = Vec::new();
    let mut failed_uploads = Vec::new();

    for image in images {
        let accepted = jira
            .upload_attachment(issue_key, &image.filename, &image.bytes, &image.content_type)
            .await
            .map_err(|source| IssueSyncError::Upload {
                filename: image.filename.clone(),
                source,
            })?;
        if accepted {
            url_to_filename.insert(image.source_url.clone(), image.filename.clone());
            uploaded_files.push(image.filename.clone());
        } else {
            failed_uploads.push(image.filename.clone());
        }
    }

    let description = rewrite_image_references(&request.change_request.body, &url_to_filename);
    let outcome = write_issue_comment(
        jira,
        CommentRequest {
            issue_key,
            change_request: request.change_request,
            description: &description,
            mode: request.mode,
            action: request.action,
        },
    )
    .await?;

    let status = if failed_uploads.is_empty() {
        IssueOutcomeStatus::Succeeded
    } else {
        IssueOutcomeStatus::Warned
    };
    Ok(IssueReport {
        issue_key: issue_key.to_string(),
        status,
        comment: Some(outcome.describe()),
        uploaded_files,
        failed_uploads,
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use httpmock::prelude::*;
    use prlink_jira::{
        ChangeRequest, CommentMode, JiraApiClient, JiraClientOptions, JiraConfig, TriggerAction,
    };
    use prlink_media::{FetchedImage, ImageSource};

    use super::{fetch_unique_images, reconcile, ReconcileRequest};
    use crate::IssueOutcomeStatus;

    const PR_URL: &str = "https://github.com/org/repo/pull/7";

    #[derive(Default)]
    struct StaticImageSource {
        images: HashMap<String, FetchedImage>,
        calls: Mutex<Vec<String>>,
    }

    impl StaticImageSource {
        fn with_image(mut self, url: &str, filename: &str) -> Self {
            self.images.insert(
                url.to_string(),
                FetchedImage {
                    source_url: url.to_string(),
                    bytes: vec![0x89, 0x50, 0x4e, 0x47],
                    filename: filename.to_string(),
                    content_type: "image/png".to_string(),
                },
            );
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl ImageSource for StaticImageSource {
        async fn fetch_image(&self, url: &str) -> Option<FetchedImage> {
            self.calls.lock().expect("calls lock").push(url.to_string());
            self.images.get(url).cloned()
        }
    }

    fn jira(server: &MockServer) -> JiraApiClient {
        JiraApiClient::new(
            &JiraConfig {
                base_url: format!("{}/", server.base_url()),
                email: "user@example.com".to_string(),
                api_token: "test-token".to_string(),
            },
            JiraClientOptions {
                request_timeout_ms: 2_000,
                retry_max_attempts: 1,
                retry_base_delay_ms: 1,
            },
        )
        .expect("jira client")
    }

    fn change_request(body: &str) -> ChangeRequest {
        ChangeRequest {
            number: 7,
            title: "PROJ-1 Ship it".to_string(),
            body: body.to_string(),
            url: PR_URL.to_string(),
        }
    }

    fn keys(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|key| key.to_string()).collect()
    }

    #[tokio::test]
    async fn unit_fetch_unique_images_fetches_each_url_once_and_dedupes_names() {
        let source = StaticImageSource::default()
            .with_image("https://a.example.com/x/shot.png", "shot.png")
            .with_image("https://b.example.com/y/shot.png", "shot.png");
        let body = "![one](https://a.example.com/x/shot.png)\n\
                    ![two](https://b.example.com/y/shot.png)\n\
                    ![again](https://a.example.com/x/shot.png)";

        let (found, images) = fetch_unique_images(&source, body).await;
        assert_eq!(found, 3);
        assert_eq!(source.calls().len(), 2);
        let names = images
            .iter()
            .map(|image| image.filename.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["shot-1.png", "shot-2.png"]);
    }

    #[tokio::test]
    async fn functional_opened_without_images_creates_one_comment() {
        let server = MockServer::start();
        let lookup = server.mock(|when, then| {
            when.method(GET).path("/rest/api/2/issue/PROJ-1/comment");
            then.status(200).json_body(serde_json::json!({ "comments": [] }));
        });
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/rest/api/2/issue/PROJ-1/comment")
                .body_includes("h2. Summary");
            then.status(201);
        });
        let source = StaticImageSource::default();
        let change_request = change_request("## Summary\n\nAdded a new feature.");
        let issue_keys = keys(&["PROJ-1"]);
        let action = TriggerAction::opened();

        let report = reconcile(
            &jira(&server),
            &source,
            ReconcileRequest {
                issue_keys: &issue_keys,
                change_request: &change_request,
                mode: CommentMode::Update,
                action: &action,
                fail_fast: false,
            },
        )
        .await
        .expect("reconcile");

        lookup.assert_calls(0);
        create.assert_calls(1);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].status, IssueOutcomeStatus::Succeeded);
        assert_eq!(report.issues[0].comment, Some("created"));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn functional_repeated_image_is_fetched_and_uploaded_once() {
        let server = MockServer::start();
        let upload = server.mock(|when, then| {
            when.method(POST).path("/rest/api/2/issue/PROJ-1/attachments");
            then.status(200).json_body(serde_json::json!([{ "id": "1" }]));
        });
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/rest/api/2/issue/PROJ-1/comment")
                .body_includes("!img.png! !img.png!");
            then.status(201);
        });
        let source =
            StaticImageSource::default().with_image("https://example.com/img.png", "img.png");
        let change_request = change_request(
            "![a](https://example.com/img.png) ![b](https://example.com/img.png)",
        );
        let issue_keys = keys(&["PROJ-1"]);
        let action = TriggerAction::opened();

        let report = reconcile(
            &jira(&server),
            &source,
            ReconcileRequest {
                issue_keys: &issue_keys,
                change_request: &change_request,
                mode: CommentMode::New,
                action: &action,
                fail_fast: false,
            },
        )
        .await
        .expect("reconcile");

        assert_eq!(source.calls(), vec!["https://example.com/img.png".to_string()]);
        upload.assert_calls(1);
        create.assert_calls(1);
        assert_eq!(report.images_found, 2);
        assert_eq!(report.images_fetched, 1);
        assert_eq!(report.issues[0].uploaded_files, vec!["img.png".to_string()]);
    }

    #[tokio::test]
    async fn functional_failed_upload_keeps_original_url_and_warns() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/rest/api/2/issue/PROJ-1/attachments");
            then.status(413).body("too large");
        });
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/rest/api/2/issue/PROJ-1/comment")
                .body_includes("!https://example.com/img.png!");
            then.status(201);
        });
        let source =
            StaticImageSource::default().with_image("https://example.com/img.png", "img.png");
        let change_request = change_request("![a](https://example.com/img.png)");
        let issue_keys = keys(&["PROJ-1"]);
        let action = TriggerAction::opened();

        let report = reconcile(
            &jira(&server),
            &source,
            ReconcileRequest {
                issue_keys: &issue_keys,
                change_request: &change_request,
                mode: CommentMode::Update,
                action: &action,
                fail_fast: false,
            },
        )
        .await
        .expect("reconcile");

        create.assert_calls(1);
        assert_eq!(report.issues[0].status, IssueOutcomeStatus::Warned);
        assert_eq!(report.issues[0].failed_uploads, vec!["img.png".to_string()]);
    }

    #[tokio::test]
    async fn functional_unfetchable_image_is_not_uploaded() {
        let server = MockServer::start();
        let upload = server.mock(|when, then| {
            when.method(POST).path("/rest/api/2/issue/PROJ-1/attachments");
            then.status(200);
        });
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/rest/api/2/issue/PROJ-1/comment")
                .body_includes("!https://example.com/missing.png!");
            then.status(201);
        });
        let source = StaticImageSource::default();
        let change_request = change_request("![gone](https://example.com/missing.png)");
        let issue_keys = keys(&["PROJ-1"]);
        let action = TriggerAction::opened();

        let report = reconcile(
            &jira(&server),
            &source,
            ReconcileRequest {
                issue_keys: &issue_keys,
                change_request: &change_request,
                mode: CommentMode::Update,
                action: &action,
                fail_fast: false,
            },
        )
        .await
        .expect("reconcile");

        upload.assert_calls(0);
        create.assert_calls(1);
        assert_eq!(report.images_fetched, 0);
        assert_eq!(report.issues[0].status, IssueOutcomeStatus::Succeeded);
    }

    #[tokio::test]
    async fn regression_comment_failure_does_not_stop_later_issues() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(POST).path("/rest/api/2/issue/PROJ-1/comment");
            then.status(404).body("Issue does not exist");
        });
        let second = server.mock(|when, then| {
            when.method(POST).path("/rest/api/2/issue/PROJ-2/comment");
            then.status(201);
        });
        let source = StaticImageSource::default();
        let change_request = change_request("Body");
        let issue_keys = keys(&["PROJ-1", " ", "PROJ-2"]);
        let action = TriggerAction::opened();

        let report = reconcile(
            &jira(&server),
            &source,
            ReconcileRequest {
                issue_keys: &issue_keys,
                change_request: &change_request,
                mode: CommentMode::Update,
                action: &action,
                fail_fast: false,
            },
        )
        .await
        .expect("reconcile");

        first.assert_calls(1);
        second.assert_calls(1);
        assert_eq!(report.processed_keys(), vec!["PROJ-1", "PROJ-2"]);
        assert_eq!(report.issues[0].status, IssueOutcomeStatus::Failed);
        assert!(report.issues[0]
            .error
            .as_deref()
            .is_some_and(|error| error.contains("status 404")));
        assert_eq!(report.issues[1].status, IssueOutcomeStatus::Succeeded);
    }

    #[tokio::test]
    async fn regression_fail_fast_aborts_on_first_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/rest/api/2/issue/PROJ-1/comment");
            then.status(404).body("Issue does not exist");
        });
        let second = server.mock(|when, then| {
            when.method(POST).path("/rest/api/2/issue/PROJ-2/comment");
            then.status(201);
        });
        let source = StaticImageSource::default();
        let change_request = change_request("Body");
        let issue_keys = keys(&["PROJ-1", "PROJ-2"]);
        let action = TriggerAction::opened();

        let error = reconcile(
            &jira(&server),
            &source,
            ReconcileRequest {
                issue_keys: &issue_keys,
                change_request: &change_request,
                mode: CommentMode::Update,
                action: &action,
                fail_fast: true,
            },
        )
        .await
        .expect_err("fail fast should abort");

        second.assert_calls(0);
        assert_eq!(error.issue_key, "PROJ-1");
        assert!(error.partial.issues.is_empty());
        assert!(error.to_string().starts_with("Failed to post to PROJ-1"));
    }
}
