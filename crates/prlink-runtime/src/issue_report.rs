use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueOutcomeStatus {
    Succeeded,
    /// Comment written but at least one image upload was rejected.
    Warned,
    Failed,
}

impl IssueOutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Warned => "warned",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueReport {
    pub issue_key: String,
    pub status: IssueOutcomeStatus,
    pub comment: Option<&'static str>,
    pub uploaded_files: Vec<String>,
    pub failed_uploads: Vec<String>,
    pub error: Option<String>,
}

impl IssueReport {
    pub fn failed(issue_key: &str, error: String) -> Self {
        Self {
            issue_key: issue_key.to_string(),
            status: IssueOutcomeStatus::Failed,
            comment: None,
            uploaded_files: Vec::new(),
            failed_uploads: Vec::new(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
/// Per-run result handed to logging and to the PR link-back step.
pub struct ReconcileReport {
    pub images_found: usize,
    pub images_fetched: usize,
    pub issues: Vec<IssueReport>,
}

impl ReconcileReport {
    pub fn processed_keys(&self) -> Vec<&str> {
        self.issues
            .iter()
            .map(|issue| issue.issue_key.as_str())
            .collect()
    }

    pub fn count(&self, status: IssueOutcomeStatus) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.status == status)
            .count()
    }

    pub fn render_summary(&self) -> String {
        format!(
            "issues={} succeeded={} warned={} failed={} images_found={} images_fetched={}",
            self.issues.len(),
            self.count(IssueOutcomeStatus::Succeeded),
            self.count(IssueOutcomeStatus::Warned),
            self.count(IssueOutcomeStatus::Failed),
            self.images_found,
            self.images_fetched
        )
    }
}
