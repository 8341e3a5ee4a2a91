use std::path::{Path, PathBuf};

use prlink_jira::{ChangeRequest, TriggerAction};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventPayloadError {
    #[error("failed to read event payload {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse event payload {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct HeadRef {
    #[serde(rename = "ref", default)]
    pub ref_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PullRequestPayload {
    #[serde(default)]
    pub number: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub head: Option<HeadRef>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PushCommit {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
/// The subset of the webhook payload prlink reads.
pub struct EventPayload {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub pull_request: Option<PullRequestPayload>,
    #[serde(default)]
    pub commits: Option<Vec<PushCommit>>,
}

pub fn load_event_payload(path: &Path) -> Result<EventPayload, EventPayloadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| EventPayloadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| EventPayloadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Parses `owner/repo` as found in `GITHUB_REPOSITORY`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (owner, name) = raw.trim().split_once('/')?;
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn as_slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Runner context for one workflow run.
pub struct EventContext {
    pub event_name: String,
    /// `GITHUB_REF`, e.g. `refs/heads/feature/PROJ-1`.
    pub git_ref: String,
    pub payload: EventPayload,
}

impl EventContext {
    /// Reads the payload from `event_path`; a missing path yields an empty payload.
    pub fn load(
        event_name: &str,
        git_ref: &str,
        event_path: Option<&Path>,
    ) -> Result<Self, EventPayloadError> {
        let payload = match event_path {
            Some(path) if !path.as_os_str().is_empty() => load_event_payload(path)?,
            _ => EventPayload::default(),
        };
        Ok(Self {
            event_name: event_name.trim().to_string(),
            git_ref: git_ref.trim().to_string(),
            payload,
        })
    }

    pub fn is_pull_request_event(&self) -> bool {
        matches!(
            self.event_name.as_str(),
            "pull_request" | "pull_request_target"
        )
    }

    pub fn is_push_event(&self) -> bool {
        self.event_name == "push"
    }

    pub fn pull_request(&self) -> Option<&PullRequestPayload> {
        if !self.is_pull_request_event() {
            return None;
        }
        self.payload.pull_request.as_ref()
    }

    pub fn change_request(&self) -> Option<ChangeRequest> {
        let pull_request = self.pull_request()?;
        Some(ChangeRequest {
            number: pull_request.number,
            title: pull_request.title.clone().unwrap_or_default(),
            body: pull_request.body.clone().unwrap_or_default(),
            url: pull_request.html_url.clone().unwrap_or_default(),
        })
    }

    pub fn trigger_action(&self) -> TriggerAction {
        TriggerAction::new(self.payload.action.clone().unwrap_or_default())
    }
}
