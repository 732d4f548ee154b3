use serde::{Deserialize, Serialize};

/// A single onboarding task, turned into one issue on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub title: String,
    pub description: String,
    pub assignee_username: String,
}

impl TaskEntry {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        assignee_username: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            assignee_username: assignee_username.into(),
        }
    }

    /// Assignee to filter and assign by, `None` when the task has no owner.
    pub fn assignee(&self) -> Option<&str> {
        let trimmed = self.assignee_username.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// Everything a run needs to know about the target repository and its tasks.
///
/// Built once by the config loader and shared read-only with the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub organization: String,
    pub repository: String,
    pub tasks: Vec<TaskEntry>,
}

impl WorkflowSpec {
    pub fn new(
        organization: impl Into<String>,
        repository: impl Into<String>,
        tasks: Vec<TaskEntry>,
    ) -> Self {
        Self {
            organization: organization.into(),
            repository: repository.into(),
            tasks,
        }
    }

    /// `owner/name` slug used in log lines.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.organization, self.repository)
    }
}
