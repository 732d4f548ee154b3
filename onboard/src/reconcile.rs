//! Create-or-update reconciliation against one repository.
//!
//! Every operation lists the remote state in full, matches by title (or
//! name), and only writes when nothing matches. Nothing here retries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::pagination::fetch_all_pages;
use crate::tracker::{TrackerClient, TrackerError};
use crate::types::{
    AssigneeFilter, Card, Column, Issue, IssueListOptions, IssueQuery, IssueRequest, Milestone,
    MilestoneFilter, NewMilestone, Project, ProjectOptions, Repository, FILTER_NONE,
};

/// A tracker client bound to one repository.
#[derive(Clone)]
pub struct RepositoryHandle {
    client: Arc<dyn TrackerClient>,
    repository: Repository,
}

impl std::fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

impl RepositoryHandle {
    /// Look the repository up and bind the client to it.
    pub async fn resolve(
        client: Arc<dyn TrackerClient>,
        owner: &str,
        name: &str,
    ) -> Result<Self, TrackerError> {
        let repository = client.get_repository(owner, name).await?;
        debug!(repository = %repository.slug(), "resolved repository");
        Ok(Self { client, repository })
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    fn owner(&self) -> &str {
        &self.repository.owner
    }

    fn name(&self) -> &str {
        &self.repository.name
    }

    // -----------------------------------------------------------------------
    // Milestones
    // -----------------------------------------------------------------------

    /// Return the first milestone titled `title`, creating it when absent.
    /// An existing milestone is returned untouched.
    pub async fn create_or_update_milestone(
        &self,
        title: &str,
        description: &str,
        due_on: DateTime<Utc>,
    ) -> Result<Milestone, TrackerError> {
        let milestones = fetch_all_pages(move |page| {
            self.client.list_milestones(self.owner(), self.name(), page)
        })
        .await?;

        if let Some(existing) = milestones.into_iter().find(|m| m.title == title) {
            debug!(number = existing.number, title, "milestone already exists");
            return Ok(existing);
        }

        let created = self
            .client
            .create_milestone(
                self.owner(),
                self.name(),
                &NewMilestone {
                    title: title.to_string(),
                    description: description.to_string(),
                    due_on: Some(due_on),
                },
            )
            .await?;
        info!(number = created.number, title, "created milestone");
        Ok(created)
    }

    // -----------------------------------------------------------------------
    // Projects and columns
    // -----------------------------------------------------------------------

    /// Find the project titled `title`. An existing project only gets its
    /// description synced; a new one is created along with `column_names`
    /// (blank names skipped). A failing column aborts without cleanup.
    pub async fn create_or_update_project(
        &self,
        title: &str,
        description: &str,
        column_names: &[&str],
    ) -> Result<Project, TrackerError> {
        let projects = fetch_all_pages(move |page| {
            self.client.list_projects(self.owner(), self.name(), page)
        })
        .await?;

        let options = ProjectOptions {
            name: title.to_string(),
            body: description.to_string(),
        };

        match projects.into_iter().find(|p| p.title == title) {
            Some(existing) if existing.number > 0 => {
                if existing.description == description {
                    debug!(number = existing.number, title, "project up to date");
                    return Ok(existing);
                }
                let updated = self.client.update_project(existing.id, &options).await?;
                info!(number = updated.number, title, "updated project description");
                Ok(updated)
            }
            _ => {
                let created = self
                    .client
                    .create_project(self.owner(), self.name(), &options)
                    .await?;
                info!(number = created.number, title, "created project");

                for name in column_names.iter().filter(|n| !n.trim().is_empty()) {
                    let column = self.client.create_column(created.id, name).await?;
                    debug!(column_id = column.id, name, "created column");
                }
                Ok(created)
            }
        }
    }

    async fn fetch_columns(&self, project: &Project) -> Result<Vec<Column>, TrackerError> {
        let project_id = project.id;
        fetch_all_pages(move |page| self.client.list_columns(project_id, page)).await
    }

    /// All columns of `project` keyed by name; on duplicate names the last wins.
    pub async fn fetch_columns_by_name(
        &self,
        project: &Project,
    ) -> Result<HashMap<String, Column>, TrackerError> {
        let columns = self.fetch_columns(project).await?;
        Ok(columns.into_iter().map(|c| (c.name.clone(), c)).collect())
    }

    /// True when every name in `required` is a column of `project`.
    pub async fn columns_present(
        &self,
        project: &Project,
        required: &[&str],
    ) -> Result<bool, TrackerError> {
        let columns = self.fetch_columns(project).await?;
        let present: HashSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        Ok(required.iter().all(|name| present.contains(name)))
    }

    /// The first column created on `project` (lowest id).
    pub async fn first_column(&self, project: &Project) -> Result<Option<Column>, TrackerError> {
        let columns = self.fetch_columns(project).await?;
        Ok(columns.into_iter().min_by_key(|c| c.id))
    }

    // -----------------------------------------------------------------------
    // Issues and cards
    // -----------------------------------------------------------------------

    /// List issues matching `query`. Assignee filtering is done server side
    /// only for a single user or an explicit `"none"`; the title is matched
    /// exactly on the client.
    pub async fn find_issues_by_filter(&self, query: &IssueQuery) -> Result<Vec<Issue>, TrackerError> {
        let options = IssueListOptions {
            assignee: assignee_filter(&query.assignees),
            milestone: match query.milestone {
                MilestoneFilter::Number(0) => MilestoneFilter::Any,
                other => other,
            },
        };
        debug!(
            assignee = options.assignee.as_query_value(),
            milestone = %options.milestone.as_query_value(),
            "listing issues"
        );

        let options = &options;
        let issues = fetch_all_pages(move |page| {
            self.client
                .list_issues(self.owner(), self.name(), options, page)
        })
        .await?;

        Ok(match &query.title {
            Some(title) => issues.into_iter().filter(|i| &i.title == title).collect(),
            None => issues,
        })
    }

    /// Return the issue matching (title, milestone, assignee), creating it
    /// when absent. A created issue whose body came back altered is edited
    /// once to restore the requested body.
    pub async fn create_or_update_issue(
        &self,
        assignee: Option<&str>,
        title: &str,
        body: &str,
        milestone: u64,
    ) -> Result<Issue, TrackerError> {
        let assignees: Vec<String> = assignee.map(str::to_string).into_iter().collect();
        let query = IssueQuery {
            title: Some(title.to_string()),
            milestone: MilestoneFilter::Number(milestone),
            assignees: if assignees.is_empty() {
                vec![FILTER_NONE.to_string()]
            } else {
                assignees.clone()
            },
        };

        if let Some(existing) = self.find_issues_by_filter(&query).await?.into_iter().next() {
            debug!(number = existing.number, title, "issue already exists");
            return Ok(existing);
        }

        let request = IssueRequest {
            title: title.to_string(),
            body: body.to_string(),
            assignees,
            milestone: (milestone > 0).then_some(milestone),
        };
        let created = self
            .client
            .create_issue(self.owner(), self.name(), &request)
            .await?;
        info!(number = created.number, title, "created issue");

        if created.body == body {
            return Ok(created);
        }
        debug!(number = created.number, "issue body differs from request, editing");
        self.client
            .edit_issue(self.owner(), self.name(), created.number, &request)
            .await
    }

    /// Put `issue` on `column`. No lookup is made first; an issue already on
    /// the board fails with an error for which
    /// [`TrackerError::is_duplicate_card`] holds.
    pub async fn create_card_for_issue(
        &self,
        issue: &Issue,
        column: &Column,
    ) -> Result<Card, TrackerError> {
        let card = self.client.create_card(column.id, issue.id).await?;
        debug!(card_id = card.id, issue = issue.number, column = %column.name, "created card");
        Ok(card)
    }

    pub async fn fetch_cards(&self, column: &Column) -> Result<Vec<Card>, TrackerError> {
        let column_id = column.id;
        fetch_all_pages(move |page| self.client.list_cards(column_id, page)).await
    }
}

fn assignee_filter(assignees: &[String]) -> AssigneeFilter {
    match assignees {
        [only] if only == FILTER_NONE => AssigneeFilter::Unassigned,
        [only] => AssigneeFilter::User(only.clone()),
        _ => AssigneeFilter::Any,
    }
}
