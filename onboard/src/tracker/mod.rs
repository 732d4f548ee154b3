//! Capability interface over the remote issue tracker.
//!
//! The reconciliation engine only talks to [`TrackerClient`]. Two
//! implementations exist: [`github::GitHubClient`] for the real API and
//! [`memory::InMemoryTracker`] for dry runs and tests. Every list operation
//! takes a page cursor and returns one [`Page`].

pub mod error;
pub mod github;
pub mod memory;

use async_trait::async_trait;

use crate::types::{
    Card, Column, Issue, IssueListOptions, IssueRequest, Milestone, NewMilestone, Page, Project,
    ProjectOptions, Repository, User,
};

pub use error::TrackerError;
pub use github::GitHubClient;
pub use memory::InMemoryTracker;

#[async_trait]
pub trait UsersApi: Send + Sync {
    /// The user the credential belongs to.
    async fn authenticated_user(&self) -> Result<User, TrackerError>;

    async fn get_user(&self, username: &str) -> Result<User, TrackerError>;
}

#[async_trait]
pub trait IssuesApi: Send + Sync {
    async fn list_milestones(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
    ) -> Result<Page<Milestone>, TrackerError>;

    async fn create_milestone(
        &self,
        owner: &str,
        repo: &str,
        milestone: &NewMilestone,
    ) -> Result<Milestone, TrackerError>;

    async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        options: &IssueListOptions,
        page: u32,
    ) -> Result<Page<Issue>, TrackerError>;

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        request: &IssueRequest,
    ) -> Result<Issue, TrackerError>;

    async fn edit_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        request: &IssueRequest,
    ) -> Result<Issue, TrackerError>;
}

#[async_trait]
pub trait RepositoriesApi: Send + Sync {
    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, TrackerError>;

    async fn list_projects(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
    ) -> Result<Page<Project>, TrackerError>;

    async fn create_project(
        &self,
        owner: &str,
        repo: &str,
        options: &ProjectOptions,
    ) -> Result<Project, TrackerError>;
}

#[async_trait]
pub trait ProjectsApi: Send + Sync {
    async fn update_project(
        &self,
        project_id: u64,
        options: &ProjectOptions,
    ) -> Result<Project, TrackerError>;

    async fn list_columns(&self, project_id: u64, page: u32)
        -> Result<Page<Column>, TrackerError>;

    async fn create_column(&self, project_id: u64, name: &str) -> Result<Column, TrackerError>;

    async fn list_cards(&self, column_id: u64, page: u32) -> Result<Page<Card>, TrackerError>;

    /// Place an issue on a board column.
    async fn create_card(&self, column_id: u64, issue_id: u64) -> Result<Card, TrackerError>;
}

/// Everything the onboarding workflow needs from a tracker.
pub trait TrackerClient: UsersApi + IssuesApi + RepositoriesApi + ProjectsApi {}

impl<T> TrackerClient for T where T: UsersApi + IssuesApi + RepositoriesApi + ProjectsApi + ?Sized {}
