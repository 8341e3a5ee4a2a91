use std::collections::HashMap;

use async_trait::async_trait;
use httpmock::prelude::*;
use prlink_github::{
    collect_source_texts, EventContext, EventPayload, HeadRef, PullRequestPayload, Source,
};
use prlink_jira::{ChangeRequest, CommentMode, JiraApiClient, JiraClientOptions, JiraConfig};
use prlink_keys::{default_blocklist, extract_keys_from_texts, KeyPattern};
use prlink_media::{FetchedImage, ImageSource};
use prlink_runtime::{reconcile, IssueOutcomeStatus, ReconcileRequest};
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;

const PR_URL: &str = "https://github.com/org/repo/pull/42";

struct ScriptedImageSource {
    images: HashMap<String, FetchedImage>,
    requests: AsyncMutex<Vec<String>>,
}

impl ScriptedImageSource {
    fn new(entries: &[(&str, &str)]) -> Self {
        let images = entries
            .iter()
            .map(|(url, filename)| {
                (
                    url.to_string(),
                    FetchedImage {
                        source_url: url.to_string(),
                        bytes: b"\x89PNG\r\n".to_vec(),
                        filename: filename.to_string(),
                        content_type: "image/png".to_string(),
                    },
                )
            })
            .collect();
        Self {
            images,
            requests: AsyncMutex::new(Vec::new()),
        }
    }

    async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl ImageSource for ScriptedImageSource {
    async fn fetch_image(&self, url: &str) -> Option<FetchedImage> {
        self.requests.lock().await.push(url.to_string());
        self.images.get(url).cloned()
    }
}

fn pull_request_context(action: &str, title: &str, body: &str) -> EventContext {
    EventContext {
        event_name: "pull_request".to_string(),
        git_ref: "refs/pull/42/merge".to_string(),
        payload: EventPayload {
            action: Some(action.to_string()),
            pull_request: Some(PullRequestPayload {
                number: 42,
                title: Some(title.to_string()),
                body: Some(body.to_string()),
                html_url: Some(PR_URL.to_string()),
                head: Some(HeadRef {
                    ref_name: Some("feature/screens".to_string()),
                }),
            }),
            commits: None,
        },
    }
}

fn issue_keys(context: &EventContext) -> Vec<String> {
    let texts = collect_source_texts(context, &[Source::Branch, Source::Title, Source::Body])
        .into_texts();
    let pattern = KeyPattern::default_pattern().expect("default pattern");
    extract_keys_from_texts(&texts, &[], &default_blocklist(), &pattern)
}

fn jira(server: &MockServer) -> JiraApiClient {
    JiraApiClient::new(
        &JiraConfig {
            base_url: format!("{}//", server.base_url()),
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

fn change_request(context: &EventContext) -> ChangeRequest {
    context.change_request().expect("change request")
}

#[tokio::test]
async fn integration_images_are_fetched_once_and_rewritten_per_issue() {
    let body = "## Screens\n\n\
                ![before](https://cdn.example.com/a/shot.png)\n\n\
                ![after](https://cdn.example.com/b/shot.png)\n\n\
                ![before again](https://cdn.example.com/a/shot.png)";
    let context = pull_request_context("opened", "PROJ-2 PROJ-1 Screens", body);
    let keys = issue_keys(&context);
    assert_eq!(keys, vec!["PROJ-1".to_string(), "PROJ-2".to_string()]);

    let server = MockServer::start();
    let first_uploads = server.mock(|when, then| {
        when.method(POST)
            .path("/rest/api/2/issue/PROJ-1/attachments")
            .header("x-atlassian-token", "no-check");
        then.status(200).json_body(json!([{ "id": "1" }]));
    });
    let second_uploads = server.mock(|when, then| {
        when.method(POST).path("/rest/api/2/issue/PROJ-2/attachments");
        then.status(500).body("attachment storage unavailable");
    });
    let first_comment = server.mock(|when, then| {
        when.method(POST)
            .path("/rest/api/2/issue/PROJ-1/comment")
            .body_includes("h2. Screens")
            .body_includes("!shot-1.png!")
            .body_includes("!shot-2.png!");
        then.status(201);
    });
    let second_comment = server.mock(|when, then| {
        when.method(POST)
            .path("/rest/api/2/issue/PROJ-2/comment")
            .body_includes("!https://cdn.example.com/a/shot.png!")
            .body_includes("!https://cdn.example.com/b/shot.png!");
        then.status(201);
    });

    let images = ScriptedImageSource::new(&[
        ("https://cdn.example.com/a/shot.png", "shot.png"),
        ("https://cdn.example.com/b/shot.png", "shot.png"),
    ]);
    let change_request = change_request(&context);
    let action = context.trigger_action();
    let report = reconcile(
        &jira(&server),
        &images,
        ReconcileRequest {
            issue_keys: &keys,
            change_request: &change_request,
            mode: CommentMode::Update,
            action: &action,
            fail_fast: false,
        },
    )
    .await
    .expect("reconcile");

    assert_eq!(images.request_count().await, 2);
    first_uploads.assert_calls(2);
    second_uploads.assert_calls(2);
    first_comment.assert_calls(1);
    second_comment.assert_calls(1);
    assert_eq!(report.images_found, 3);
    assert_eq!(report.images_fetched, 2);
    assert_eq!(report.issues[0].status, IssueOutcomeStatus::Succeeded);
    assert_eq!(
        report.issues[0].uploaded_files,
        vec!["shot-1.png".to_string(), "shot-2.png".to_string()]
    );
    assert_eq!(report.issues[1].status, IssueOutcomeStatus::Warned);
    assert_eq!(report.issues[1].failed_uploads.len(), 2);
}

#[tokio::test]
async fn integration_synchronize_updates_existing_comment_and_creates_missing_one() {
    let context = pull_request_context("synchronize", "PROJ-1 OPS-4 Refresh", "Refreshed copy.");
    let keys = issue_keys(&context);
    assert_eq!(keys, vec!["OPS-4".to_string(), "PROJ-1".to_string()]);

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/rest/api/2/issue/OPS-4/comment");
        then.status(200).json_body(json!({
            "startAt": 0,
            "maxResults": 100,
            "total": 1,
            "comments": [{ "id": 501, "body": "unrelated" }]
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/rest/api/2/issue/PROJ-1/comment");
        then.status(200).json_body(json!({
            "startAt": 0,
            "maxResults": 100,
            "total": 1,
            "comments": [{ "id": "777", "body": format!("h3. [Old|{PR_URL}]") }]
        }));
    });
    let ops_create = server.mock(|when, then| {
        when.method(POST).path("/rest/api/2/issue/OPS-4/comment");
        then.status(201);
    });
    let proj_update = server.mock(|when, then| {
        when.method(PUT)
            .path("/rest/api/2/issue/PROJ-1/comment/777")
            .body_includes("Refreshed copy.");
        then.status(200);
    });
    let proj_create = server.mock(|when, then| {
        when.method(POST).path("/rest/api/2/issue/PROJ-1/comment");
        then.status(201);
    });

    let images = ScriptedImageSource::new(&[]);
    let change_request = change_request(&context);
    let action = context.trigger_action();
    let report = reconcile(
        &jira(&server),
        &images,
        ReconcileRequest {
            issue_keys: &keys,
            change_request: &change_request,
            mode: CommentMode::Update,
            action: &action,
            fail_fast: true,
        },
    )
    .await
    .expect("reconcile");

    ops_create.assert_calls(1);
    proj_update.assert_calls(1);
    proj_create.assert_calls(0);
    assert_eq!(report.issues[0].comment, Some("created"));
    assert_eq!(report.issues[1].comment, Some("updated"));
}

#[tokio::test]
async fn integration_minimal_mode_posts_one_line_after_open_and_still_attaches_images() {
    let body = "Details with ![diagram](https://cdn.example.com/diagram.png)";
    let context = pull_request_context("edited", "PROJ-5 Docs", body);
    let keys = issue_keys(&context);

    let server = MockServer::start();
    let uploads = server.mock(|when, then| {
        when.method(POST).path("/rest/api/2/issue/PROJ-5/attachments");
        then.status(200);
    });
    let minimal = server.mock(|when, then| {
        when.method(POST)
            .path("/rest/api/2/issue/PROJ-5/comment")
            .json_body(json!({ "body": format!("PR updated: [PROJ-5 Docs|{PR_URL}]") }));
        then.status(201);
    });

    let images = ScriptedImageSource::new(&[("https://cdn.example.com/diagram.png", "diagram.png")]);
    let change_request = change_request(&context);
    let action = context.trigger_action();
    let report = reconcile(
        &jira(&server),
        &images,
        ReconcileRequest {
            issue_keys: &keys,
            change_request: &change_request,
            mode: CommentMode::Minimal,
            action: &action,
            fail_fast: false,
        },
    )
    .await
    .expect("reconcile");

    minimal.assert_calls(1);
    uploads.assert_calls(1);
    assert_eq!(report.issues[0].comment, Some("created_minimal"));
}
