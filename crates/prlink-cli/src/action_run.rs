use anyhow::{bail, Context, Result};
use prlink_github::{
    append_jira_links_to_pr, collect_source_texts, parse_sources, EventContext, GithubPullClient,
    RepoRef,
};
use prlink_jira::JiraApiClient;
use prlink_keys::{extract_keys_from_texts, parse_blocklist, parse_projects, KeyPattern};
use prlink_media::HttpImageFetcher;
use prlink_runtime::{reconcile, IssueOutcomeStatus, ReconcileRequest};

use crate::action_outputs::{write_action_outputs, ActionOutputs};
use crate::cli_args::Cli;

const NO_KEYS_MESSAGE: &str = "No Jira issue keys found";

pub(crate) async fn run_action(cli: &Cli) -> Result<()> {
    let sources = parse_sources(&cli.from);
    let projects = parse_projects(&cli.projects);
    let blocklist = parse_blocklist(&cli.blocklist);
    let pattern = KeyPattern::from_input(&cli.issue_pattern)?;

    let source_names = sources
        .iter()
        .map(|source| source.as_str())
        .collect::<Vec<_>>();
    tracing::info!("Looking for keys from: {}", source_names.join(", "));
    if !projects.is_empty() {
        tracing::info!("Filtering to projects: {}", projects.join(", "));
    }

    let context = EventContext::load(&cli.event_name, &cli.git_ref, cli.event_path.as_deref())?;
    let texts = collect_source_texts(&context, &sources).into_texts();
    tracing::debug!("Collected {} text(s) to scan", texts.len());
    for text in &texts {
        tracing::debug!("  -> {text:?}");
    }

    let keys = extract_keys_from_texts(&texts, &projects, &blocklist, &pattern);
    write_action_outputs(cli.output_path(), &ActionOutputs::from_keys(&keys)?)?;

    if keys.is_empty() {
        if cli.fail_on_missing {
            bail!(NO_KEYS_MESSAGE);
        }
        tracing::info!("{NO_KEYS_MESSAGE}");
        return Ok(());
    }
    tracing::info!("Found keys: {}", keys.join(", "));

    if cli.post_to_jira {
        post_to_jira(cli, &context, &keys).await?;
    }
    if cli.add_pr_links {
        add_pr_links(cli, &context, &keys).await?;
    }
    Ok(())
}

/// Fails the run when `jira_fail_on_error` is set, otherwise logs a warning.
fn soft_failure(cli: &Cli, message: &str) -> Result<()> {
    if cli.jira_fail_on_error {
        bail!("{message}");
    }
    tracing::warn!("{message}");
    Ok(())
}

async fn post_to_jira(cli: &Cli, context: &EventContext, keys: &[String]) -> Result<()> {
    if !context.is_pull_request_event() {
        tracing::info!("post_to_jira is enabled but event is not a pull_request, skipping");
        return Ok(());
    }
    let Some(change_request) = context.change_request() else {
        tracing::warn!("post_to_jira is enabled but the event payload has no pull_request");
        return Ok(());
    };

    let config = cli.jira_config();
    if !config.is_complete() {
        return soft_failure(
            cli,
            "post_to_jira is enabled but jira_base_url, jira_email, or jira_api_token is missing",
        );
    }

    let jira = JiraApiClient::new(&config, cli.jira_client_options())?;
    let images = HttpImageFetcher::new(cli.image_fetcher_config())
        .context("failed to create image fetcher")?;
    let action = context.trigger_action();
    let report = reconcile(
        &jira,
        &images,
        ReconcileRequest {
            issue_keys: keys,
            change_request: &change_request,
            mode: cli.comment_mode(),
            action: &action,
            fail_fast: cli.jira_fail_on_error,
        },
    )
    .await?;

    for issue in &report.issues {
        match issue.status {
            IssueOutcomeStatus::Failed => tracing::warn!(
                "{}: {} ({})",
                issue.issue_key,
                issue.status.as_str(),
                issue.error.as_deref().unwrap_or("unknown error")
            ),
            _ => tracing::info!(
                "{}: {} comment={} uploaded={}",
                issue.issue_key,
                issue.status.as_str(),
                issue.comment.unwrap_or("none"),
                issue.uploaded_files.len()
            ),
        }
    }
    tracing::info!("Jira sync summary: {}", report.render_summary());
    Ok(())
}

async fn add_pr_links(cli: &Cli, context: &EventContext, keys: &[String]) -> Result<()> {
    let Some(pull_request) = context.pull_request() else {
        tracing::info!("add_pr_links is enabled but event is not a pull_request, skipping");
        return Ok(());
    };
    let Some(jira_base_url) = cli
        .jira_base_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
    else {
        return soft_failure(cli, "add_pr_links is enabled but jira_base_url is missing");
    };
    let Some(token) = cli.github_token() else {
        return soft_failure(cli, "add_pr_links is enabled but github_token is missing");
    };
    let Some(repo) = cli.repository.as_deref().and_then(RepoRef::parse) else {
        return soft_failure(cli, "add_pr_links is enabled but GITHUB_REPOSITORY is missing or invalid");
    };

    let client = GithubPullClient::new(
        &cli.api_url,
        &token,
        cli.request_timeout_ms,
        cli.retry_max_attempts,
        cli.retry_base_delay_ms,
    )?;
    let result = append_jira_links_to_pr(
        &client,
        &repo,
        pull_request.number,
        pull_request.body.as_deref().unwrap_or_default(),
        keys,
        jira_base_url,
    )
    .await;
    if let Err(error) = result {
        return soft_failure(cli, &format!("Failed to add Jira links to PR: {error:#}"));
    }
    Ok(())
}
