use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};
use prlink_jira::{CommentMode, JiraClientOptions, JiraConfig};
use prlink_media::{ImageFetcherConfig, MAX_IMAGE_BYTES};

/// GitHub Actions passes unset inputs as empty strings; only `true` enables a flag.
fn parse_action_bool(value: &str) -> Result<bool, String> {
    Ok(value.trim().eq_ignore_ascii_case("true"))
}

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .trim()
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .trim()
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Parser)]
#[command(
    name = "prlink",
    about = "Extract Jira issue keys from a GitHub event and sync the pull request onto Jira",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "INPUT_PROJECTS",
        default_value = "",
        help = "Comma-separated Jira project prefixes to keep; empty keeps every project"
    )]
    pub(crate) projects: String,

    #[arg(
        long,
        env = "INPUT_FROM",
        default_value = "branch,title,commits",
        help = "Comma-separated sources to scan: branch, title, commits, body"
    )]
    pub(crate) from: String,

    #[arg(
        long = "fail-on-missing",
        env = "INPUT_FAIL_ON_MISSING",
        default_value = "false",
        action = ArgAction::Set,
        value_parser = parse_action_bool,
        help = "Fail the run when no issue key is found"
    )]
    pub(crate) fail_on_missing: bool,

    #[arg(
        long,
        env = "INPUT_BLOCKLIST",
        default_value = "",
        help = "Comma-separated prefixes to ignore; 'none' disables, empty uses the built-in list"
    )]
    pub(crate) blocklist: String,

    #[arg(
        long = "issue-pattern",
        env = "INPUT_ISSUE_PATTERN",
        default_value = "",
        help = "Custom issue key regex; whole matches are keys"
    )]
    pub(crate) issue_pattern: String,

    #[arg(
        long = "post-to-jira",
        env = "INPUT_POST_TO_JIRA",
        default_value = "false",
        action = ArgAction::Set,
        value_parser = parse_action_bool,
        help = "Post the pull request description to every found issue"
    )]
    pub(crate) post_to_jira: bool,

    #[arg(long = "jira-base-url", env = "INPUT_JIRA_BASE_URL")]
    pub(crate) jira_base_url: Option<String>,

    #[arg(long = "jira-email", env = "INPUT_JIRA_EMAIL")]
    pub(crate) jira_email: Option<String>,

    #[arg(long = "jira-api-token", env = "INPUT_JIRA_API_TOKEN", hide_env_values = true)]
    pub(crate) jira_api_token: Option<String>,

    #[arg(
        long = "jira-comment-mode",
        env = "INPUT_JIRA_COMMENT_MODE",
        default_value = "update",
        help = "update, new, or minimal; unknown values fall back to update"
    )]
    pub(crate) jira_comment_mode: String,

    #[arg(
        long = "jira-fail-on-error",
        env = "INPUT_JIRA_FAIL_ON_ERROR",
        default_value = "false",
        action = ArgAction::Set,
        value_parser = parse_action_bool,
        help = "Treat Jira and link-back failures as run failures"
    )]
    pub(crate) jira_fail_on_error: bool,

    #[arg(
        long = "image-allowed-hosts",
        env = "INPUT_IMAGE_ALLOWED_HOSTS",
        value_delimiter = ',',
        help = "Hosts that bypass the internal-address image check"
    )]
    pub(crate) image_allowed_hosts: Vec<String>,

    #[arg(long = "github-token", env = "INPUT_GITHUB_TOKEN", hide_env_values = true)]
    pub(crate) github_token: Option<String>,

    #[arg(long = "runner-github-token", env = "GITHUB_TOKEN", hide = true, hide_env_values = true)]
    pub(crate) runner_github_token: Option<String>,

    #[arg(
        long = "add-pr-links",
        env = "INPUT_ADD_PR_LINKS",
        default_value = "false",
        action = ArgAction::Set,
        value_parser = parse_action_bool,
        help = "Add a Jira links section to the pull request body"
    )]
    pub(crate) add_pr_links: bool,

    #[arg(
        long = "request-timeout-ms",
        env = "INPUT_REQUEST_TIMEOUT_MS",
        default_value_t = 15_000,
        value_parser = parse_positive_u64
    )]
    pub(crate) request_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        env = "INPUT_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = parse_positive_usize
    )]
    pub(crate) retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        env = "INPUT_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64
    )]
    pub(crate) retry_base_delay_ms: u64,

    #[arg(long = "event-name", env = "GITHUB_EVENT_NAME", default_value = "")]
    pub(crate) event_name: String,

    #[arg(long = "event-path", env = "GITHUB_EVENT_PATH")]
    pub(crate) event_path: Option<PathBuf>,

    #[arg(long = "git-ref", env = "GITHUB_REF", default_value = "")]
    pub(crate) git_ref: String,

    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub(crate) repository: Option<String>,

    #[arg(long = "api-url", env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    pub(crate) api_url: String,

    #[arg(long = "output-path", env = "GITHUB_OUTPUT")]
    pub(crate) output_path: Option<PathBuf>,
}

impl Cli {
    pub(crate) fn comment_mode(&self) -> CommentMode {
        CommentMode::parse_or_default(&self.jira_comment_mode)
    }

    pub(crate) fn jira_config(&self) -> JiraConfig {
        JiraConfig {
            base_url: self.jira_base_url.clone().unwrap_or_default(),
            email: self.jira_email.clone().unwrap_or_default(),
            api_token: self.jira_api_token.clone().unwrap_or_default(),
        }
    }

    pub(crate) fn jira_client_options(&self) -> JiraClientOptions {
        JiraClientOptions {
            request_timeout_ms: self.request_timeout_ms,
            retry_max_attempts: self.retry_max_attempts,
            retry_base_delay_ms: self.retry_base_delay_ms,
        }
    }

    /// The explicit input wins over the runner token.
    pub(crate) fn github_token(&self) -> Option<String> {
        non_empty(self.github_token.as_deref())
            .or_else(|| non_empty(self.runner_github_token.as_deref()))
    }

    pub(crate) fn image_fetcher_config(&self) -> ImageFetcherConfig {
        ImageFetcherConfig {
            auth_token: self.github_token(),
            allowed_hosts: self
                .image_allowed_hosts
                .iter()
                .map(|host| host.trim().to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
            max_bytes: MAX_IMAGE_BYTES,
            request_timeout_ms: self.request_timeout_ms,
        }
    }

    pub(crate) fn output_path(&self) -> Option<&Path> {
        self.output_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }
}
