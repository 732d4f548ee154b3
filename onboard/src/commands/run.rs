//! Run command - Reconcile the onboarding board for one new hire

use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bridge::{forward, ForwardSummary, TerminalSink};
use crate::config::loader::load_workflow_spec;
use crate::config::paths::resolve_config_path;
use crate::tracker::{GitHubClient, InMemoryTracker, TrackerClient};
use crate::types::WorkflowSpec;
use crate::workflow::{resolve_identity, run_workflow, WorkflowOptions};

/// Login used for dry runs when no `--user` is given.
const DRY_RUN_IDENTITY: &str = "new-hire";

pub struct RunArgs<'a> {
    pub config: Option<&'a str>,
    pub token: Option<&'a str>,
    pub api_url: Option<&'a str>,
    pub web_url: &'a str,
    pub user: Option<&'a str>,
    pub dry_run: bool,
    pub json: bool,
}

pub fn run(args: RunArgs<'_>) -> anyhow::Result<()> {
    let location = resolve_config_path(args.config);
    let (_, spec) = load_workflow_spec(&location.config_path)
        .with_context(|| format!("Failed to load {}", location.config_path))?;
    info!(
        config = %location.config_path,
        source = ?location.source,
        repository = %spec.slug(),
        tasks = spec.tasks.len(),
        "loaded task file"
    );

    let client = build_client(&args, &spec)?;

    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(execute(client, spec, &args))?;

    if args.dry_run && !args.json {
        eprintln!("{}", "(dry run: nothing was written to GitHub)".dimmed());
    }

    if !summary.succeeded() {
        eprintln!(
            "{}",
            format!(
                "Run ended {} after {} event(s)",
                summary.state, summary.delivered
            )
            .red()
        );
        std::process::exit(1);
    }

    Ok(())
}

fn build_client(args: &RunArgs<'_>, spec: &WorkflowSpec) -> anyhow::Result<Arc<dyn TrackerClient>> {
    if args.dry_run {
        let identity = args.user.unwrap_or(DRY_RUN_IDENTITY);
        let tracker = InMemoryTracker::new()
            .with_identity(identity)
            .with_repository(&spec.organization, &spec.repository);
        return Ok(Arc::new(tracker));
    }

    let client = GitHubClient::new(args.token.unwrap_or_default(), args.api_url)?;
    Ok(Arc::new(client))
}

async fn execute(
    client: Arc<dyn TrackerClient>,
    spec: WorkflowSpec,
    args: &RunArgs<'_>,
) -> anyhow::Result<ForwardSummary> {
    let identity = resolve_identity(client.as_ref(), args.user).await?;

    let handle = run_workflow(
        Arc::new(spec),
        identity.login,
        client,
        WorkflowOptions {
            web_url: args.web_url.to_string(),
        },
        CancellationToken::new(),
    );

    let mut sink = TerminalSink::new(std::io::stdout(), args.json);
    Ok(forward(handle, &mut sink, interrupted()).await)
}

/// Resolves on Ctrl-C; never resolves if the signal handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::TrackerError;

    fn spec() -> WorkflowSpec {
        WorkflowSpec::new("acme", "onboarding", Vec::new())
    }

    fn args(dry_run: bool) -> RunArgs<'static> {
        RunArgs {
            config: None,
            token: Some("ghp_test"),
            api_url: None,
            web_url: "https://github.com",
            user: Some("ada"),
            dry_run,
            json: true,
        }
    }

    #[tokio::test]
    async fn test_dry_run_client_knows_repository_and_identity() {
        let client = build_client(&args(true), &spec()).unwrap();

        let repo = client.get_repository("acme", "onboarding").await.unwrap();
        assert_eq!(repo.slug(), "acme/onboarding");
        let me = client.authenticated_user().await.unwrap();
        assert_eq!(me.login, "ada");
    }

    #[test]
    fn test_live_client_needs_token() {
        let mut live = args(false);
        live.token = Some("   ");
        assert!(build_client(&live, &spec()).is_err());

        live.token = None;
        let err = build_client(&live, &spec()).err().expect("expected an error");
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::MissingToken)
        ));
    }

    #[tokio::test]
    async fn test_execute_dry_run_completes() {
        let args = args(true);
        let client = build_client(&args, &spec()).unwrap();

        let summary = execute(client, spec(), &args).await.unwrap();
        assert!(summary.succeeded());
    }
}
