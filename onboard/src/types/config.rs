use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::workflow::{TaskEntry, WorkflowSpec};

/// Indirection used by the task file so owners can be declared once under
/// `task_owners` and referenced through YAML anchors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssigneeRef {
    #[serde(default)]
    pub github_username: String,
}

/// One task as written in the task file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub title: String,
    #[serde(default)]
    pub assignee: AssigneeRef,
    #[serde(default)]
    pub description: String,
}

/// The whole onboarding task file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupScheme {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub github_organization: String,
    #[serde(default)]
    pub github_repository: String,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
    #[serde(default, rename = "task_owners")]
    pub task_owners: BTreeMap<String, AssigneeRef>,
}

impl SetupScheme {
    /// Project the file into the immutable spec consumed by the runner.
    pub fn to_workflow_spec(&self) -> WorkflowSpec {
        let tasks = self
            .tasks
            .iter()
            .map(|task| {
                TaskEntry::new(
                    task.title.trim(),
                    task.description.clone(),
                    task.assignee.github_username.trim(),
                )
            })
            .collect();

        WorkflowSpec::new(
            self.github_organization.trim(),
            self.github_repository.trim(),
            tasks,
        )
    }
}
