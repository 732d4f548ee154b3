//! The onboarding run: reconcile milestone, board, issues and cards for one
//! new hire while streaming progress events to a single consumer.
//!
//! A run is spawned on its own tokio task. Events go through a one-slot
//! channel, so the runner advances at most one event ahead of the consumer.
//! Every emission also watches the run's [`CancellationToken`]; once it
//! fires, or the receiver is dropped, the runner stops and the stream
//! closes. A run that was not cancelled always ends with exactly one
//! `complete` or terminating `error` event.

use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::due_date::milestone_due_date_from_now;
use crate::reconcile::RepositoryHandle;
use crate::tracker::{TrackerClient, TrackerError};
use crate::types::{Column, Event, EventKind, Project, RunId, RunState, User, WorkflowSpec};

/// Columns of a freshly created onboarding board, left to right.
pub const BOARD_COLUMNS: [&str; 4] = ["Backlog", "In Progress", "Review", "Done"];

/// Column new issue cards are placed in.
pub const STARTING_COLUMN: &str = "Backlog";

pub const DEFAULT_WEB_URL: &str = "https://github.com";

/// Errors raised before a run can start.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Failed to resolve GitHub user '{username}': {source}")]
    IdentityResolution {
        username: String,
        #[source]
        source: TrackerError,
    },
}

#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    /// Web root used to build the board link in the `complete` event.
    pub web_url: String,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            web_url: DEFAULT_WEB_URL.to_string(),
        }
    }
}

/// Resolve the login the run acts for: `requested` when given, otherwise the
/// owner of the credential.
pub async fn resolve_identity(
    client: &dyn TrackerClient,
    requested: Option<&str>,
) -> Result<User, WorkflowError> {
    let result = match requested {
        Some(username) => client.get_user(username).await,
        None => client.authenticated_user().await,
    };
    result.map_err(|source| WorkflowError::IdentityResolution {
        username: requested.unwrap_or("<authenticated user>").to_string(),
        source,
    })
}

/// Link to the project board in the tracker's web UI.
pub fn board_url(web_url: &str, spec: &WorkflowSpec, project: &Project) -> String {
    format!(
        "{}/{}/{}/projects/{}",
        web_url.trim_end_matches('/'),
        spec.organization,
        spec.repository,
        project.number
    )
}

/// Consumer side of a spawned run.
pub struct RunHandle {
    run_id: RunId,
    events: mpsc::Receiver<Event>,
    state: watch::Receiver<RunState>,
    task: JoinHandle<RunState>,
    cancel: CancellationToken,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Current lifecycle state as last published by the runner.
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Next event, or `None` once the run has finished and the stream closed.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// The remaining events as a stream.
    pub fn events(&mut self) -> impl Stream<Item = Event> + '_ {
        futures::stream::poll_fn(move |cx| self.events.poll_recv(cx))
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop consuming and wait for the runner to exit. Any events not yet
    /// read are discarded; a run still in progress ends up `Cancelled`.
    pub async fn wait(self) -> RunState {
        let RunHandle {
            run_id,
            events,
            task,
            ..
        } = self;
        drop(events);
        join_run(run_id, task).await
    }

    /// Drain every event, then return them with the final state.
    pub async fn collect(mut self) -> (Vec<Event>, RunState) {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        let state = join_run(self.run_id, self.task).await;
        (events, state)
    }
}

async fn join_run(run_id: RunId, task: JoinHandle<RunState>) -> RunState {
    match task.await {
        Ok(state) => state,
        Err(err) => {
            warn!(%run_id, "run task did not finish cleanly: {err}");
            if err.is_cancelled() {
                RunState::Cancelled
            } else {
                RunState::Failed
            }
        }
    }
}

/// Spawn an onboarding run for `identity` over `spec`.
///
/// Must be called from within a tokio runtime.
pub fn run_workflow(
    spec: Arc<WorkflowSpec>,
    identity: String,
    client: Arc<dyn TrackerClient>,
    options: WorkflowOptions,
    cancel: CancellationToken,
) -> RunHandle {
    let run_id = RunId::new();
    let (tx, rx) = mpsc::channel(1);
    let (state_tx, state_rx) = watch::channel(RunState::NotStarted);

    let runner = Runner {
        run_id,
        tx,
        cancel: cancel.clone(),
    };

    let task = tokio::spawn(async move {
        state_tx.send_replace(RunState::Running);
        info!(%run_id, repository = %spec.slug(), identity = %identity, "run started");

        let state = match runner.execute(&spec, &identity, client, &options).await {
            Ok(()) => RunState::Completed,
            Err(Halt::Failed) => RunState::Failed,
            Err(Halt::Abandoned) => RunState::Cancelled,
        };

        info!(%run_id, %state, "run finished");
        state_tx.send_replace(state);
        state
    });

    RunHandle {
        run_id,
        events: rx,
        state: state_rx,
        task,
        cancel,
    }
}

/// Why a run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    /// A terminating `error` event was delivered.
    Failed,
    /// Cancelled, or nobody is listening any more.
    Abandoned,
}

struct Runner {
    run_id: RunId,
    tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
}

impl Runner {
    async fn emit(&self, event: Event) -> Result<(), Halt> {
        debug!(run_id = %self.run_id, kind = %event.kind, message = %event.message, "emit");
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Halt::Abandoned),
            sent = self.tx.send(event) => sent.map_err(|_| Halt::Abandoned),
        }
    }

    /// Emitted once per task.
    async fn progress(&self, message: String) -> Result<(), Halt> {
        self.emit(Event::new(self.run_id, EventKind::Progress, message))
            .await
    }

    /// Await one reconciliation step, turning its failure into a
    /// terminating `error` event.
    async fn step<T>(
        &self,
        operation: impl std::future::Future<Output = Result<T, TrackerError>>,
        failure_message: impl FnOnce() -> String,
    ) -> Result<T, Halt> {
        match operation.await {
            Ok(value) => Ok(value),
            Err(err) => {
                let message = failure_message();
                warn!(run_id = %self.run_id, "{message}: {err}");
                self.emit(Event::error(self.run_id, message, err.to_string()))
                    .await?;
                Err(Halt::Failed)
            }
        }
    }

    async fn execute(
        &self,
        spec: &WorkflowSpec,
        identity: &str,
        client: Arc<dyn TrackerClient>,
        options: &WorkflowOptions,
    ) -> Result<(), Halt> {
        self.emit(Event::new(
            self.run_id,
            EventKind::Start,
            format!("Starting project generation as {identity}"),
        ))
        .await?;

        let repo = self
            .step(
                RepositoryHandle::resolve(client, &spec.organization, &spec.repository),
                || format!("Failed to resolve repository - {}", spec.slug()),
            )
            .await?;

        let title = format!("Welcome @{identity}!");
        let description =
            format!("Let's setup up @{identity} for success. Here's what we need to cover...");
        let due_on = milestone_due_date_from_now();

        info!(run_id = %self.run_id, "Creating Milestone - {title}");
        let milestone = self
            .step(
                repo.create_or_update_milestone(&title, &description, due_on),
                || format!("Failed to create milestone - {title}"),
            )
            .await?;

        info!(run_id = %self.run_id, "Creating Project - {title}");
        let project = self
            .step(
                repo.create_or_update_project(&title, &description, &BOARD_COLUMNS),
                || format!("Failed to create project - {title}"),
            )
            .await?;

        let columns = self
            .step(repo.fetch_columns_by_name(&project), || {
                "Failed to fetch project columns".to_string()
            })
            .await?;

        let start_column: Option<Column> = match columns.get(STARTING_COLUMN) {
            Some(column) => Some(column.clone()),
            None => {
                warn!(
                    project = project.number,
                    "no '{STARTING_COLUMN}' column, using the first column"
                );
                self.step(repo.first_column(&project), || {
                    "Failed to fetch project columns".to_string()
                })
                .await?
            }
        };

        for task in &spec.tasks {
            self.progress(format!("Preparing Issue - {}", task.title))
                .await?;
            let issue = self
                .step(
                    repo.create_or_update_issue(
                        task.assignee(),
                        &task.title,
                        &task.description,
                        milestone.number,
                    ),
                    || format!("Failed to create issue - {}", task.title),
                )
                .await?;

            let Some(column) = &start_column else {
                self.emit(Event::error(
                    self.run_id,
                    format!("Error creating card - {}", task.title),
                    "project has no columns",
                ))
                .await?;
                continue;
            };

            if let Err(err) = repo.create_card_for_issue(&issue, column).await {
                let message = if err.is_duplicate_card() {
                    format!("Card already exists - {}", task.title)
                } else {
                    format!("Error creating card - {}", task.title)
                };
                warn!(run_id = %self.run_id, "{message}: {err}");
                self.emit(Event::error(self.run_id, message, err.to_string()))
                    .await?;
            }
        }

        let url = board_url(&options.web_url, spec, &project);
        self.emit(Event::new(
            self.run_id,
            EventKind::Complete,
            format!("Successfully created project @ {url}"),
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::memory::{InMemoryTracker, Operation};
    use crate::types::TaskEntry;
    use futures::StreamExt;

    const ORG: &str = "acme";
    const REPO: &str = "onboarding";

    fn tracker() -> Arc<InMemoryTracker> {
        Arc::new(
            InMemoryTracker::new()
                .with_identity("octocat")
                .with_user("ada")
                .with_repository(ORG, REPO),
        )
    }

    fn spec(tasks: Vec<TaskEntry>) -> Arc<WorkflowSpec> {
        Arc::new(WorkflowSpec::new(ORG, REPO, tasks))
    }

    fn task(title: &str) -> TaskEntry {
        TaskEntry::new(title, format!("Do {title}"), "ada")
    }

    fn start(tracker: &Arc<InMemoryTracker>, spec: Arc<WorkflowSpec>) -> RunHandle {
        let client: Arc<dyn TrackerClient> = tracker.clone();
        run_workflow(
            spec,
            "ada".to_string(),
            client,
            WorkflowOptions::default(),
            CancellationToken::new(),
        )
    }

    fn messages(events: &[Event], kind: EventKind) -> Vec<String> {
        events
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.message.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_full_run_event_sequence() {
        let tracker = tracker();
        let handle = start(&tracker, spec(vec![task("Laptop"), task("Handbook")]));

        let (events, state) = handle.collect().await;

        assert_eq!(state, RunState::Completed);
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Start,
                EventKind::Progress,
                EventKind::Progress,
                EventKind::Complete,
            ]
        );
        assert_eq!(events[0].message, "Starting project generation as ada");
        assert_eq!(events[1].message, "Preparing Issue - Laptop");
        assert_eq!(events[2].message, "Preparing Issue - Handbook");

        let project = &tracker.projects(ORG, REPO)[0];
        assert_eq!(project.title, "Welcome @ada!");
        assert_eq!(tracker.milestones(ORG, REPO)[0].title, "Welcome @ada!");
        assert_eq!(
            events[3].message,
            format!(
                "Successfully created project @ https://github.com/acme/onboarding/projects/{}",
                project.number
            )
        );
        assert_eq!(tracker.cards().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_task_reuses_issue_and_completes() {
        let tracker = tracker();
        let handle = start(
            &tracker,
            spec(vec![task("A"), task("B"), task("A"), task("C")]),
        );

        let (events, state) = handle.collect().await;

        assert_eq!(state, RunState::Completed);
        assert_eq!(tracker.issues(ORG, REPO).len(), 3);
        assert_eq!(messages(&events, EventKind::Progress).len(), 4);
        assert_eq!(messages(&events, EventKind::Error), vec!["Card already exists - A"]);
        assert_eq!(events.last().map(|e| e.kind), Some(EventKind::Complete));
    }

    #[tokio::test]
    async fn test_card_failure_does_not_stop_the_run() {
        let tracker = tracker();
        tracker.fail_nth(Operation::CreateCard, 2);
        let handle = start(&tracker, spec(vec![task("A"), task("B"), task("C")]));

        let (events, state) = handle.collect().await;

        assert_eq!(state, RunState::Completed);
        assert_eq!(messages(&events, EventKind::Error), vec!["Error creating card - B"]);
        assert_eq!(tracker.issues(ORG, REPO).len(), 3);
        assert_eq!(tracker.cards().len(), 2);
        assert_eq!(events.last().map(|e| e.kind), Some(EventKind::Complete));
    }

    #[tokio::test]
    async fn test_milestone_failure_stops_before_issues() {
        let tracker = tracker();
        tracker.fail_on(Operation::CreateMilestone);
        let handle = start(&tracker, spec(vec![task("A")]));

        let (events, state) = handle.collect().await;

        assert_eq!(state, RunState::Failed);
        let last = events.last().unwrap();
        assert_eq!(last.kind, EventKind::Error);
        assert_eq!(last.message, "Failed to create milestone - Welcome @ada!");
        assert!(last.error.as_deref().unwrap().contains("injected failure"));
        assert_eq!(tracker.calls(Operation::ListIssues), 0);
        assert_eq!(tracker.calls(Operation::CreateIssue), 0);
        assert!(messages(&events, EventKind::Complete).is_empty());
    }

    #[tokio::test]
    async fn test_project_failure_stops_before_issues() {
        let tracker = tracker();
        tracker.fail_on(Operation::CreateProject);
        let handle = start(&tracker, spec(vec![task("A")]));

        let (events, state) = handle.collect().await;

        assert_eq!(state, RunState::Failed);
        let last = events.last().unwrap();
        assert_eq!(last.kind, EventKind::Error);
        assert_eq!(last.message, "Failed to create project - Welcome @ada!");
        assert_eq!(tracker.calls(Operation::CreateMilestone), 1);
        assert_eq!(tracker.calls(Operation::ListIssues), 0);
        assert!(messages(&events, EventKind::Complete).is_empty());
    }

    #[tokio::test]
    async fn test_column_fetch_failure_stops_before_issues() {
        let tracker = tracker();
        tracker.fail_on(Operation::ListColumns);
        let handle = start(&tracker, spec(vec![task("A")]));

        let (events, state) = handle.collect().await;

        assert_eq!(state, RunState::Failed);
        let last = events.last().unwrap();
        assert_eq!(last.kind, EventKind::Error);
        assert_eq!(last.message, "Failed to fetch project columns");
        assert_eq!(tracker.projects(ORG, REPO).len(), 1);
        assert_eq!(tracker.calls(Operation::ListIssues), 0);
        assert!(messages(&events, EventKind::Complete).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_repository_fails_the_run() {
        let tracker = tracker();
        let client: Arc<dyn TrackerClient> = tracker.clone();
        let handle = run_workflow(
            Arc::new(WorkflowSpec::new(ORG, "missing", vec![task("A")])),
            "ada".to_string(),
            client,
            WorkflowOptions::default(),
            CancellationToken::new(),
        );

        let (events, state) = handle.collect().await;

        assert_eq!(state, RunState::Failed);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].message, "Failed to resolve repository - acme/missing");
    }

    #[tokio::test]
    async fn test_issue_failure_terminates_the_run() {
        let tracker = tracker();
        tracker.fail_nth(Operation::CreateIssue, 2);
        let handle = start(&tracker, spec(vec![task("A"), task("B"), task("C")]));

        let (events, state) = handle.collect().await;

        assert_eq!(state, RunState::Failed);
        assert_eq!(events.last().unwrap().message, "Failed to create issue - B");
        assert_eq!(tracker.calls(Operation::CreateIssue), 2);
    }

    #[tokio::test]
    async fn test_missing_backlog_falls_back_to_first_column() {
        let tracker = tracker();
        let project = tracker.seed_project(
            ORG,
            REPO,
            "Welcome @ada!",
            "Let's setup up @ada for success. Here's what we need to cover...",
        );
        let todo = tracker.seed_column(project.id, "To do");
        tracker.seed_column(project.id, "Done");

        let (_, state) = start(&tracker, spec(vec![task("A")])).collect().await;

        assert_eq!(state, RunState::Completed);
        let cards = tracker.cards();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].column_id, todo.id);
        assert_eq!(tracker.calls(Operation::UpdateProject), 0);
    }

    #[tokio::test]
    async fn test_rerun_creates_nothing_new() {
        let tracker = tracker();
        let tasks = vec![task("A"), task("B")];

        let (_, first) = start(&tracker, spec(tasks.clone())).collect().await;
        let (events, second) = start(&tracker, spec(tasks)).collect().await;

        assert_eq!(first, RunState::Completed);
        assert_eq!(second, RunState::Completed);
        assert_eq!(tracker.calls(Operation::CreateMilestone), 1);
        assert_eq!(tracker.calls(Operation::CreateProject), 1);
        assert_eq!(tracker.calls(Operation::CreateIssue), 2);
        assert_eq!(messages(&events, EventKind::Error).len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_emits_nothing() {
        let tracker = tracker();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let client: Arc<dyn TrackerClient> = tracker.clone();
        let handle = run_workflow(
            spec(vec![task("A")]),
            "ada".to_string(),
            client,
            WorkflowOptions::default(),
            cancel,
        );

        let (events, state) = handle.collect().await;
        assert!(events.is_empty());
        assert_eq!(state, RunState::Cancelled);
        assert_eq!(tracker.calls(Operation::GetRepository), 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_the_run() {
        let tracker = tracker();
        let mut handle = start(&tracker, spec(vec![task("A"), task("B"), task("C")]));

        let first = handle.next_event().await.unwrap();
        assert_eq!(first.kind, EventKind::Start);
        handle.cancel();

        let (events, state) = handle.collect().await;
        assert_eq!(state, RunState::Cancelled);
        assert!(events.iter().all(|e| e.kind != EventKind::Complete));
        assert!(tracker.calls(Operation::CreateIssue) <= 1);
    }

    #[tokio::test]
    async fn test_dropped_consumer_cancels_the_run() {
        let tracker = tracker();
        let mut handle = start(&tracker, spec(vec![task("A"), task("B"), task("C")]));
        handle.next_event().await.unwrap();

        assert_eq!(handle.wait().await, RunState::Cancelled);
        assert!(tracker.calls(Operation::CreateIssue) <= 1);
    }

    #[tokio::test]
    async fn test_events_stream_ends_after_terminal_event() {
        let tracker = tracker();
        let mut handle = start(&tracker, spec(vec![task("A")]));

        let kinds: Vec<EventKind> = handle.events().map(|e| e.kind).collect().await;
        assert_eq!(kinds.last(), Some(&EventKind::Complete));
        assert!(handle.is_finished());
        assert_eq!(handle.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn test_resolve_identity() {
        let tracker = tracker();

        let me = resolve_identity(tracker.as_ref(), None).await.unwrap();
        assert_eq!(me.login, "octocat");

        let ada = resolve_identity(tracker.as_ref(), Some("ada")).await.unwrap();
        assert_eq!(ada.login, "ada");

        let err = resolve_identity(tracker.as_ref(), Some("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            WorkflowError::IdentityResolution { username, .. } if username == "ghost"
        ));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_board_url_trims_trailing_slash() {
        let project = Project {
            id: 1,
            number: 4,
            title: "Welcome".to_string(),
            description: String::new(),
        };
        let url = board_url("https://github.example.com/", &WorkflowSpec::new("acme", "x", vec![]), &project);
        assert_eq!(url, "https://github.example.com/acme/x/projects/4");
    }
}
