use std::fmt;

use crate::event_context::EventContext;

pub const DEFAULT_SOURCES: &str = "branch,title,commits";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Branch,
    Title,
    Commits,
    Body,
}

impl Source {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "branch" => Some(Self::Branch),
            "title" => Some(Self::Title),
            "commits" => Some(Self::Commits),
            "body" => Some(Self::Body),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Branch => "branch",
            Self::Title => "title",
            Self::Commits => "commits",
            Self::Body => "body",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the comma-separated `from` input. Empty input selects
/// [`DEFAULT_SOURCES`]; unknown names are dropped with a warning.
pub fn parse_sources(raw: &str) -> Vec<Source> {
    let raw = if raw.trim().is_empty() {
        DEFAULT_SOURCES
    } else {
        raw
    };
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter_map(|name| {
            let source = Source::parse(name);
            if source.is_none() {
                tracing::warn!("ignoring unknown source '{name}'");
            }
            source
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceTexts {
    pub branch: Option<String>,
    pub title: Option<String>,
    pub commits: Option<Vec<String>>,
    pub body: Option<String>,
}

impl SourceTexts {
    /// Flattens to branch, title, commits, body; empty strings are skipped.
    pub fn into_texts(self) -> Vec<String> {
        self.branch
            .into_iter()
            .chain(self.title)
            .chain(self.commits.into_iter().flatten())
            .chain(self.body)
            .filter(|text| !text.is_empty())
            .collect()
    }
}

pub fn collect_source_texts(context: &EventContext, requested: &[Source]) -> SourceTexts {
    let mut texts = SourceTexts::default();
    for source in requested {
        match source {
            Source::Branch => texts.branch = branch_text(context),
            Source::Title => texts.title = title_text(context),
            Source::Commits => texts.commits = commit_texts(context),
            Source::Body => texts.body = body_text(context),
        }
    }
    texts
}

fn branch_text(context: &EventContext) -> Option<String> {
    if context.is_pull_request_event() {
        let head_ref = context
            .payload
            .pull_request
            .as_ref()
            .and_then(|pull_request| pull_request.head.as_ref())
            .and_then(|head| head.ref_name.clone())
            .filter(|name| !name.is_empty());
        if head_ref.is_some() {
            return head_ref;
        }
    }
    if context.is_push_event() && !context.git_ref.is_empty() {
        let branch = context
            .git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&context.git_ref);
        return Some(branch.to_string());
    }
    tracing::debug!("No branch source for event: {}", context.event_name);
    None
}

fn title_text(context: &EventContext) -> Option<String> {
    if context.is_pull_request_event() {
        return context
            .payload
            .pull_request
            .as_ref()
            .and_then(|pull_request| pull_request.title.clone());
    }
    tracing::debug!("Title source not available for event: {}", context.event_name);
    None
}

fn commit_texts(context: &EventContext) -> Option<Vec<String>> {
    if context.is_push_event() {
        return context.payload.commits.as_ref().map(|commits| {
            commits
                .iter()
                .map(|commit| commit.message.clone())
                .collect()
        });
    }
    if context.is_pull_request_event() {
        tracing::info!(
            "Commits source is not read for pull_request events; use branch, title, or body instead"
        );
    }
    None
}

fn body_text(context: &EventContext) -> Option<String> {
    if context.is_pull_request_event() {
        return context
            .payload
            .pull_request
            .as_ref()
            .and_then(|pull_request| pull_request.body.clone());
    }
    tracing::debug!("Body source not available for event: {}", context.event_name);
    None
}
