//! Tracker entities as seen by the reconciliation engine.
//!
//! These are the domain shapes; the wire formats of a concrete tracker stay
//! private to its client module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filter value meaning "any value" in tracker list queries.
pub const FILTER_ANY: &str = "*";

/// Filter value meaning "no value set" in tracker list queries.
pub const FILTER_NONE: &str = "none";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub number: u64,
    pub title: String,
    pub description: String,
    pub due_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub milestone: Option<u64>,
    pub assignees: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: u64,
    pub column_id: u64,
    /// Number of the issue the card points at; `None` for free-form note cards.
    pub issue_number: Option<u64>,
}

/// One page of a listing plus the cursor of the following page (0 when exhausted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: u32,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMilestone {
    pub title: String,
    pub description: String,
    pub due_on: Option<DateTime<Utc>>,
}

/// Fields sent when creating or editing an issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueRequest {
    pub title: String,
    pub body: String,
    pub assignees: Vec<String>,
    pub milestone: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectOptions {
    pub name: String,
    pub body: String,
}

// ---------------------------------------------------------------------------
// Issue filtering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AssigneeFilter {
    #[default]
    Any,
    Unassigned,
    User(String),
}

impl AssigneeFilter {
    pub fn as_query_value(&self) -> &str {
        match self {
            AssigneeFilter::Any => FILTER_ANY,
            AssigneeFilter::Unassigned => FILTER_NONE,
            AssigneeFilter::User(login) => login,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MilestoneFilter {
    #[default]
    Any,
    Unassigned,
    Number(u64),
}

impl MilestoneFilter {
    pub fn as_query_value(&self) -> String {
        match self {
            MilestoneFilter::Any => FILTER_ANY.to_string(),
            MilestoneFilter::Unassigned => FILTER_NONE.to_string(),
            MilestoneFilter::Number(number) => number.to_string(),
        }
    }
}

/// Server-side filter for an issue listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueListOptions {
    pub assignee: AssigneeFilter,
    pub milestone: MilestoneFilter,
}

/// What the caller is looking for; translated into [`IssueListOptions`]
/// plus a client-side title match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueQuery {
    pub title: Option<String>,
    pub milestone: MilestoneFilter,
    /// Requested assignees. A single `"none"` entry asks for unassigned issues.
    pub assignees: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignee_filter_query_values() {
        assert_eq!(AssigneeFilter::Any.as_query_value(), "*");
        assert_eq!(AssigneeFilter::Unassigned.as_query_value(), "none");
        assert_eq!(
            AssigneeFilter::User("octocat".to_string()).as_query_value(),
            "octocat"
        );
    }

    #[test]
    fn test_milestone_filter_query_values() {
        assert_eq!(MilestoneFilter::Any.as_query_value(), "*");
        assert_eq!(MilestoneFilter::Unassigned.as_query_value(), "none");
        assert_eq!(MilestoneFilter::Number(7).as_query_value(), "7");
    }

    #[test]
    fn test_page_last_has_no_cursor() {
        let page = Page::last(vec![1, 2, 3]);
        assert_eq!(page.next_page, 0);
        assert_eq!(page.items.len(), 3);
    }
}
