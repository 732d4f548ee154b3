//! In-memory tracker used by `--dry-run` and by tests.
//!
//! Mirrors the GitHub listing semantics the workflow relies on (filters,
//! 1-based pages with a next-page cursor, duplicate-card rejection) and adds
//! call counters plus failure injection.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{IssuesApi, ProjectsApi, RepositoriesApi, TrackerError, UsersApi};
use crate::types::{
    AssigneeFilter, Card, Column, Issue, IssueListOptions, IssueRequest, Milestone,
    MilestoneFilter, NewMilestone, Page, Project, ProjectOptions, Repository, User,
};

const DEFAULT_PAGE_SIZE: usize = 30;

/// Tracker operations, for counting calls and injecting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AuthenticatedUser,
    GetUser,
    GetRepository,
    ListMilestones,
    CreateMilestone,
    ListIssues,
    CreateIssue,
    EditIssue,
    ListProjects,
    CreateProject,
    UpdateProject,
    ListColumns,
    CreateColumn,
    ListCards,
    CreateCard,
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Always,
    /// Fail only the nth call (1-based).
    Nth(usize),
}

type BodyNormalizer = Box<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Debug, Default)]
struct RepoState {
    repository: Option<Repository>,
    milestones: Vec<Milestone>,
    issues: Vec<Issue>,
    projects: Vec<Project>,
}

#[derive(Default)]
struct State {
    identity: Option<User>,
    users: HashMap<String, User>,
    repos: HashMap<(String, String), RepoState>,
    /// project id -> columns in creation order
    columns: HashMap<u64, Vec<Column>>,
    /// column id -> owning project id
    column_projects: HashMap<u64, u64>,
    cards: Vec<Card>,
    next_id: u64,
    next_project_number: u64,
    calls: HashMap<Operation, usize>,
    failures: HashMap<Operation, Failure>,
}

impl State {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Record a call and return the injected failure, if any.
    fn record(&mut self, op: Operation) -> Result<(), TrackerError> {
        let count = self.calls.entry(op).or_insert(0);
        *count += 1;
        let count = *count;

        let failed = match self.failures.get(&op) {
            Some(Failure::Always) => true,
            Some(Failure::Nth(n)) => *n == count,
            None => false,
        };
        if failed {
            Err(TrackerError::HttpError {
                status: 500,
                message: "injected failure".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn repo(&mut self, owner: &str, name: &str) -> Result<&mut RepoState, TrackerError> {
        self.repos
            .get_mut(&(owner.to_string(), name.to_string()))
            .ok_or_else(|| TrackerError::NotFound(format!("repos/{owner}/{name}")))
    }
}

/// Tracker fake holding all state in memory.
pub struct InMemoryTracker {
    state: Mutex<State>,
    page_size: usize,
    body_normalizer: Option<BodyNormalizer>,
}

impl std::fmt::Debug for InMemoryTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTracker")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: DEFAULT_PAGE_SIZE,
            body_normalizer: None,
        }
    }

    /// Serve listings `size` items at a time.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Rewrite issue bodies on create, the way a server might normalize markdown.
    pub fn with_body_normalizer(
        mut self,
        normalizer: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.body_normalizer = Some(Box::new(normalizer));
        self
    }

    /// Register the user the credential belongs to.
    pub fn with_identity(self, login: &str) -> Self {
        {
            let mut state = self.lock();
            let user = User {
                login: login.to_string(),
                name: None,
            };
            state.users.insert(login.to_string(), user.clone());
            state.identity = Some(user);
        }
        self
    }

    pub fn with_user(self, login: &str) -> Self {
        self.lock().users.insert(
            login.to_string(),
            User {
                login: login.to_string(),
                name: None,
            },
        );
        self
    }

    pub fn with_repository(self, owner: &str, name: &str) -> Self {
        {
            let mut state = self.lock();
            let id = state.allocate_id();
            state.repos.insert(
                (owner.to_string(), name.to_string()),
                RepoState {
                    repository: Some(Repository {
                        id,
                        owner: owner.to_string(),
                        name: name.to_string(),
                    }),
                    ..RepoState::default()
                },
            );
        }
        self
    }

    /// Make every call to `op` fail.
    pub fn fail_on(&self, op: Operation) {
        self.lock().failures.insert(op, Failure::Always);
    }

    /// Make only the nth (1-based) call to `op` fail.
    pub fn fail_nth(&self, op: Operation, n: usize) {
        self.lock().failures.insert(op, Failure::Nth(n));
    }

    pub fn calls(&self, op: Operation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Seeding and inspection
    // -----------------------------------------------------------------------

    pub fn seed_milestone(&self, owner: &str, repo: &str, title: &str, description: &str) -> Milestone {
        let mut state = self.lock();
        let repo = state
            .repos
            .entry((owner.to_string(), repo.to_string()))
            .or_default();
        let milestone = Milestone {
            number: repo.milestones.len() as u64 + 1,
            title: title.to_string(),
            description: description.to_string(),
            due_on: None,
        };
        repo.milestones.push(milestone.clone());
        milestone
    }

    pub fn seed_project(&self, owner: &str, repo: &str, title: &str, description: &str) -> Project {
        let number = {
            let mut state = self.lock();
            state.next_project_number += 1;
            state.next_project_number
        };
        self.seed_project_with_number(owner, repo, title, description, number)
    }

    /// Seed a project with an explicit number; `0` stands in for a board the
    /// API returned without a usable number.
    pub fn seed_project_with_number(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        description: &str,
        number: u64,
    ) -> Project {
        let mut state = self.lock();
        let id = state.allocate_id();
        let project = Project {
            id,
            number,
            title: title.to_string(),
            description: description.to_string(),
        };
        state
            .repos
            .entry((owner.to_string(), repo.to_string()))
            .or_default()
            .projects
            .push(project.clone());
        state.columns.entry(id).or_default();
        project
    }

    pub fn seed_column(&self, project_id: u64, name: &str) -> Column {
        let mut state = self.lock();
        insert_column(&mut state, project_id, name)
    }

    pub fn issues(&self, owner: &str, repo: &str) -> Vec<Issue> {
        self.lock()
            .repos
            .get(&(owner.to_string(), repo.to_string()))
            .map(|r| r.issues.clone())
            .unwrap_or_default()
    }

    pub fn milestones(&self, owner: &str, repo: &str) -> Vec<Milestone> {
        self.lock()
            .repos
            .get(&(owner.to_string(), repo.to_string()))
            .map(|r| r.milestones.clone())
            .unwrap_or_default()
    }

    pub fn projects(&self, owner: &str, repo: &str) -> Vec<Project> {
        self.lock()
            .repos
            .get(&(owner.to_string(), repo.to_string()))
            .map(|r| r.projects.clone())
            .unwrap_or_default()
    }

    pub fn columns(&self, project_id: u64) -> Vec<Column> {
        self.lock()
            .columns
            .get(&project_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn cards(&self) -> Vec<Card> {
        self.lock().cards.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn paginate<T: Clone>(&self, items: &[T], page: u32) -> Page<T> {
        let index = page.max(1) as usize - 1;
        let start = index * self.page_size;
        let end = (start + self.page_size).min(items.len());
        let slice = if start < items.len() {
            items[start..end].to_vec()
        } else {
            Vec::new()
        };
        let next_page = if end < items.len() { index as u32 + 2 } else { 0 };
        Page {
            items: slice,
            next_page,
        }
    }
}

fn insert_column(state: &mut State, project_id: u64, name: &str) -> Column {
    let id = state.allocate_id();
    let column = Column {
        id,
        name: name.to_string(),
    };
    state
        .columns
        .entry(project_id)
        .or_default()
        .push(column.clone());
    state.column_projects.insert(id, project_id);
    column
}

fn issue_matches(issue: &Issue, options: &IssueListOptions) -> bool {
    let assignee_ok = match &options.assignee {
        AssigneeFilter::Any => true,
        AssigneeFilter::Unassigned => issue.assignees.is_empty(),
        AssigneeFilter::User(login) => issue.assignees.iter().any(|a| a == login),
    };
    let milestone_ok = match options.milestone {
        MilestoneFilter::Any => true,
        MilestoneFilter::Unassigned => issue.milestone.is_none(),
        MilestoneFilter::Number(number) => issue.milestone == Some(number),
    };
    assignee_ok && milestone_ok
}

#[async_trait]
impl UsersApi for InMemoryTracker {
    async fn authenticated_user(&self) -> Result<User, TrackerError> {
        let mut state = self.lock();
        state.record(Operation::AuthenticatedUser)?;
        state.identity.clone().ok_or(TrackerError::AuthFailed)
    }

    async fn get_user(&self, username: &str) -> Result<User, TrackerError> {
        let mut state = self.lock();
        state.record(Operation::GetUser)?;
        state
            .users
            .get(username)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(format!("users/{username}")))
    }
}

#[async_trait]
impl IssuesApi for InMemoryTracker {
    async fn list_milestones(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
    ) -> Result<Page<Milestone>, TrackerError> {
        let mut state = self.lock();
        state.record(Operation::ListMilestones)?;
        let mut milestones = state.repo(owner, repo)?.milestones.clone();
        // due date descending, milestones without a date last
        milestones.sort_by(|a, b| b.due_on.cmp(&a.due_on));
        Ok(self.paginate(&milestones, page))
    }

    async fn create_milestone(
        &self,
        owner: &str,
        repo: &str,
        milestone: &NewMilestone,
    ) -> Result<Milestone, TrackerError> {
        let mut state = self.lock();
        state.record(Operation::CreateMilestone)?;
        let repo = state.repo(owner, repo)?;
        if repo.milestones.iter().any(|m| m.title == milestone.title) {
            return Err(TrackerError::Unprocessable(
                "Validation Failed: already_exists".to_string(),
            ));
        }
        let created = Milestone {
            number: repo.milestones.len() as u64 + 1,
            title: milestone.title.clone(),
            description: milestone.description.clone(),
            due_on: milestone.due_on,
        };
        repo.milestones.push(created.clone());
        Ok(created)
    }

    async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        options: &IssueListOptions,
        page: u32,
    ) -> Result<Page<Issue>, TrackerError> {
        let mut state = self.lock();
        state.record(Operation::ListIssues)?;
        let matching: Vec<Issue> = state
            .repo(owner, repo)?
            .issues
            .iter()
            .filter(|issue| issue_matches(issue, options))
            .cloned()
            .collect();
        Ok(self.paginate(&matching, page))
    }

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        request: &IssueRequest,
    ) -> Result<Issue, TrackerError> {
        let mut state = self.lock();
        state.record(Operation::CreateIssue)?;
        let id = state.allocate_id();
        let body = match &self.body_normalizer {
            Some(normalize) => normalize(&request.body),
            None => request.body.clone(),
        };
        let repo = state.repo(owner, repo)?;
        let issue = Issue {
            id,
            number: repo.issues.len() as u64 + 1,
            title: request.title.clone(),
            body,
            milestone: request.milestone.filter(|n| *n > 0),
            assignees: request.assignees.clone(),
        };
        repo.issues.push(issue.clone());
        Ok(issue)
    }

    async fn edit_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        request: &IssueRequest,
    ) -> Result<Issue, TrackerError> {
        let mut state = self.lock();
        state.record(Operation::EditIssue)?;
        let repo = state.repo(owner, repo)?;
        let issue = repo
            .issues
            .iter_mut()
            .find(|issue| issue.number == number)
            .ok_or_else(|| TrackerError::NotFound(format!("issues/{number}")))?;
        issue.title = request.title.clone();
        issue.body = request.body.clone();
        issue.assignees = request.assignees.clone();
        issue.milestone = request.milestone.filter(|n| *n > 0);
        Ok(issue.clone())
    }
}

#[async_trait]
impl RepositoriesApi for InMemoryTracker {
    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, TrackerError> {
        let mut state = self.lock();
        state.record(Operation::GetRepository)?;
        state
            .repo(owner, repo)?
            .repository
            .clone()
            .ok_or_else(|| TrackerError::NotFound(format!("repos/{owner}/{repo}")))
    }

    async fn list_projects(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
    ) -> Result<Page<Project>, TrackerError> {
        let mut state = self.lock();
        state.record(Operation::ListProjects)?;
        let projects = state.repo(owner, repo)?.projects.clone();
        Ok(self.paginate(&projects, page))
    }

    async fn create_project(
        &self,
        owner: &str,
        repo: &str,
        options: &ProjectOptions,
    ) -> Result<Project, TrackerError> {
        let mut state = self.lock();
        state.record(Operation::CreateProject)?;
        state.repo(owner, repo)?;
        let id = state.allocate_id();
        state.next_project_number += 1;
        let project = Project {
            id,
            number: state.next_project_number,
            title: options.name.clone(),
            description: options.body.clone(),
        };
        state.repo(owner, repo)?.projects.push(project.clone());
        state.columns.entry(id).or_default();
        Ok(project)
    }
}

#[async_trait]
impl ProjectsApi for InMemoryTracker {
    async fn update_project(
        &self,
        project_id: u64,
        options: &ProjectOptions,
    ) -> Result<Project, TrackerError> {
        let mut state = self.lock();
        state.record(Operation::UpdateProject)?;
        let project = state
            .repos
            .values_mut()
            .flat_map(|repo| repo.projects.iter_mut())
            .find(|project| project.id == project_id)
            .ok_or_else(|| TrackerError::NotFound(format!("projects/{project_id}")))?;
        project.title = options.name.clone();
        project.description = options.body.clone();
        Ok(project.clone())
    }

    async fn list_columns(
        &self,
        project_id: u64,
        page: u32,
    ) -> Result<Page<Column>, TrackerError> {
        let mut state = self.lock();
        state.record(Operation::ListColumns)?;
        let columns = state
            .columns
            .get(&project_id)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(format!("projects/{project_id}/columns")))?;
        Ok(self.paginate(&columns, page))
    }

    async fn create_column(&self, project_id: u64, name: &str) -> Result<Column, TrackerError> {
        let mut state = self.lock();
        state.record(Operation::CreateColumn)?;
        if !state.columns.contains_key(&project_id) {
            return Err(TrackerError::NotFound(format!("projects/{project_id}")));
        }
        Ok(insert_column(&mut state, project_id, name))
    }

    async fn list_cards(&self, column_id: u64, page: u32) -> Result<Page<Card>, TrackerError> {
        let mut state = self.lock();
        state.record(Operation::ListCards)?;
        if !state.column_projects.contains_key(&column_id) {
            return Err(TrackerError::NotFound(format!(
                "projects/columns/{column_id}"
            )));
        }
        let cards: Vec<Card> = state
            .cards
            .iter()
            .filter(|card| card.column_id == column_id)
            .cloned()
            .collect();
        Ok(self.paginate(&cards, page))
    }

    async fn create_card(&self, column_id: u64, issue_id: u64) -> Result<Card, TrackerError> {
        let mut state = self.lock();
        state.record(Operation::CreateCard)?;
        let project_id = *state.column_projects.get(&column_id).ok_or_else(|| {
            TrackerError::NotFound(format!("projects/columns/{column_id}"))
        })?;

        let issue_number = state
            .repos
            .values()
            .flat_map(|repo| repo.issues.iter())
            .find(|issue| issue.id == issue_id)
            .map(|issue| issue.number)
            .ok_or_else(|| TrackerError::Unprocessable(format!("Issue {issue_id} not found")))?;

        let already_on_board = state.cards.iter().any(|card| {
            card.issue_number == Some(issue_number)
                && state.column_projects.get(&card.column_id) == Some(&project_id)
        });
        if already_on_board {
            return Err(TrackerError::Unprocessable(
                "Validation Failed: Project already has the associated issue".to_string(),
            ));
        }

        let card = Card {
            id: state.allocate_id(),
            column_id,
            issue_number: Some(issue_number),
        };
        state.cards.push(card.clone());
        Ok(card)
    }
}
