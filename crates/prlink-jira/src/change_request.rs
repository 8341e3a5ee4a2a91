use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
/// The pull request whose title, URL, and description drive comment content.
pub struct ChangeRequest {
    pub number: u64,
    pub title: String,
    pub body: String,
    /// Canonical URL; existing comments are matched by containing it.
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentMode {
    /// Update the comment that mentions the PR URL, or create one.
    #[default]
    Update,
    /// Always create a full comment.
    New,
    /// Full comment when the PR opens, a one-line note afterwards.
    Minimal,
}

impl CommentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::New => "new",
            Self::Minimal => "minimal",
        }
    }

    /// Parses a configured mode; unknown or empty values fall back to `update`.
    pub fn parse_or_default(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "new" => Self::New,
            "minimal" => Self::Minimal,
            _ => Self::Update,
        }
    }
}

impl fmt::Display for CommentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Lifecycle event that triggered the run, e.g. `opened` or `synchronize`.
pub struct TriggerAction(String);

impl TriggerAction {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self("opened".to_string())
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn opened() -> Self {
        Self("opened".to_string())
    }

    /// True when no earlier run can have commented for this PR.
    pub fn is_first_occurrence(&self) -> bool {
        self.0 == "opened"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TriggerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
