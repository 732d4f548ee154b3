pub mod config;
pub mod entities;
pub mod enums;
pub mod event;
pub mod workflow;

// Re-export commonly used types for convenience
pub use config::{AssigneeRef, SetupScheme, TaskConfig};
pub use entities::{
    AssigneeFilter, Card, Column, Issue, IssueListOptions, IssueQuery, IssueRequest, Milestone,
    MilestoneFilter, NewMilestone, Page, Project, ProjectOptions, Repository, User, FILTER_NONE,
};
pub use enums::{EventKind, LogFormat, RunState};
pub use event::{Event, RunId};
pub use workflow::{TaskEntry, WorkflowSpec};
