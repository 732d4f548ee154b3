//! GitHub REST API v3 client
//!
//! Covers only the calls the onboarding workflow makes: users, milestones,
//! issues, repositories and classic projects (columns and cards).
//!
//! The token is an OAuth or personal access token. The API root defaults to
//! `https://api.github.com`; pass another for GitHub Enterprise. The `run`
//! command fills both from `--token`/`GITHUB_TOKEN` and
//! `--api-url`/`GITHUB_API_URL`.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use reqwest::header::{ACCEPT, LINK};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{IssuesApi, ProjectsApi, RepositoriesApi, TrackerError, UsersApi};
use crate::types::{
    Card, Column, Issue, IssueListOptions, IssueRequest, Milestone, NewMilestone, Page, Project,
    ProjectOptions, Repository, User,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Classic projects still require the inertia preview media type.
const ACCEPT_HEADER: &str = "application/vnd.github.inertia-preview+json";

const USER_AGENT: &str = concat!("onboard/", env!("CARGO_PKG_VERSION"));

const PER_PAGE: &str = "100";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn next_page_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<[^>]*[?&]page=(\d+)[^>]*>;\s*rel="next""#).expect("valid regex")
    })
}

fn issue_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/issues/(\d+)$").expect("valid regex"))
}

// ---------------------------------------------------------------------------
// Internal GitHub API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AccountRef {
    login: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepositoryResponse {
    id: u64,
    name: String,
    owner: AccountRef,
}

#[derive(Debug, Deserialize)]
struct MilestoneResponse {
    number: u64,
    title: String,
    description: Option<String>,
    due_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct MilestoneRef {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    id: u64,
    number: u64,
    title: String,
    body: Option<String>,
    milestone: Option<MilestoneRef>,
    #[serde(default)]
    assignees: Vec<AccountRef>,
    /// Present when the "issue" is really a pull request.
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    id: u64,
    number: u64,
    name: String,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ColumnResponse {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CardResponse {
    id: u64,
    content_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct MilestoneBody<'a> {
    title: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_on: Option<String>,
}

#[derive(Debug, Serialize)]
struct IssueBody<'a> {
    title: &'a str,
    body: &'a str,
    assignees: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    milestone: Option<u64>,
}

#[derive(Debug, Serialize)]
struct CardBody<'a> {
    content_id: u64,
    content_type: &'a str,
}

impl From<UserResponse> for User {
    fn from(resp: UserResponse) -> Self {
        User {
            login: resp.login,
            name: resp.name,
        }
    }
}

impl From<RepositoryResponse> for Repository {
    fn from(resp: RepositoryResponse) -> Self {
        Repository {
            id: resp.id,
            owner: resp.owner.login,
            name: resp.name,
        }
    }
}

impl From<MilestoneResponse> for Milestone {
    fn from(resp: MilestoneResponse) -> Self {
        Milestone {
            number: resp.number,
            title: resp.title,
            description: resp.description.unwrap_or_default(),
            due_on: resp.due_on,
        }
    }
}

impl From<IssueResponse> for Issue {
    fn from(resp: IssueResponse) -> Self {
        Issue {
            id: resp.id,
            number: resp.number,
            title: resp.title,
            body: resp.body.unwrap_or_default(),
            milestone: resp.milestone.map(|m| m.number),
            assignees: resp.assignees.into_iter().map(|a| a.login).collect(),
        }
    }
}

impl From<ProjectResponse> for Project {
    fn from(resp: ProjectResponse) -> Self {
        Project {
            id: resp.id,
            number: resp.number,
            title: resp.name,
            description: resp.body.unwrap_or_default(),
        }
    }
}

impl From<ColumnResponse> for Column {
    fn from(resp: ColumnResponse) -> Self {
        Column {
            id: resp.id,
            name: resp.name,
        }
    }
}

fn card_from_response(resp: CardResponse, column_id: u64) -> Card {
    Card {
        id: resp.id,
        column_id,
        issue_number: resp.content_url.as_deref().and_then(issue_number_from_url),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// GitHub REST API client bound to one credential.
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Build a tracker client from an opaque bearer credential.
pub fn authenticated_client(credential: &str) -> Result<GitHubClient, TrackerError> {
    GitHubClient::new(credential, None)
}

impl GitHubClient {
    pub fn new(token: &str, api_url: Option<&str>) -> Result<Self, TrackerError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TrackerError::MissingToken);
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: normalize_api_url(api_url.unwrap_or(DEFAULT_API_URL)),
            token: token.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // Generic HTTP helpers
    // -----------------------------------------------------------------------

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .header(ACCEPT, ACCEPT_HEADER)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, TrackerError> {
        let resp = self.request(reqwest::Method::GET, path).send().await?;
        self.handle_response(resp, path).await
    }

    /// GET one page of a listing. Page 0 and page 1 both mean the first page.
    async fn get_page<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        page: u32,
    ) -> Result<Page<T>, TrackerError> {
        let mut params: Vec<(&str, String)> = query.to_vec();
        params.push(("per_page", PER_PAGE.to_string()));
        if page > 0 {
            params.push(("page", page.to_string()));
        }

        let resp = self
            .request(reqwest::Method::GET, path)
            .query(&params)
            .send()
            .await?;

        let next_page = parse_next_page(
            resp.headers()
                .get(LINK)
                .and_then(|value| value.to_str().ok()),
        );
        let items = self.handle_response(resp, path).await?;

        debug!(path, page, next_page, "fetched page");
        Ok(Page { items, next_page })
    }

    async fn send_json<T: serde::de::DeserializeOwned, B: Serialize>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
    ) -> Result<T, TrackerError> {
        let resp = self.request(method, path).json(body).send().await?;
        self.handle_response(resp, path).await
    }

    async fn post<T: serde::de::DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TrackerError> {
        self.send_json(reqwest::Method::POST, path, body).await
    }

    async fn patch<T: serde::de::DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TrackerError> {
        self.send_json(reqwest::Method::PATCH, path, body).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        resp: reqwest::Response,
        path: &str,
    ) -> Result<T, TrackerError> {
        let status = resp.status();
        if status.is_success() {
            let parsed = resp
                .json::<T>()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to parse GitHub response for {path}: {e}"))?;
            Ok(parsed)
        } else {
            let body_text = resp.text().await.unwrap_or_default();
            warn!(
                "GitHub API error: HTTP {} on {}: {}",
                status.as_u16(),
                path,
                body_text
            );
            Err(TrackerError::from_status(status, path, &body_text))
        }
    }
}

// ---------------------------------------------------------------------------
// Capability implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl UsersApi for GitHubClient {
    async fn authenticated_user(&self) -> Result<User, TrackerError> {
        let resp: UserResponse = self.get("user").await?;
        Ok(resp.into())
    }

    async fn get_user(&self, username: &str) -> Result<User, TrackerError> {
        let resp: UserResponse = self.get(&format!("users/{username}")).await?;
        Ok(resp.into())
    }
}

#[async_trait]
impl IssuesApi for GitHubClient {
    async fn list_milestones(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
    ) -> Result<Page<Milestone>, TrackerError> {
        let query = [
            ("state", "all".to_string()),
            ("sort", "due_on".to_string()),
            ("direction", "desc".to_string()),
        ];
        let resp: Page<MilestoneResponse> = self
            .get_page(&format!("repos/{owner}/{repo}/milestones"), &query, page)
            .await?;
        Ok(map_page(resp, Milestone::from))
    }

    async fn create_milestone(
        &self,
        owner: &str,
        repo: &str,
        milestone: &NewMilestone,
    ) -> Result<Milestone, TrackerError> {
        let body = MilestoneBody {
            title: &milestone.title,
            description: &milestone.description,
            due_on: milestone.due_on.map(format_due_on),
        };
        let resp: MilestoneResponse = self
            .post(&format!("repos/{owner}/{repo}/milestones"), &body)
            .await?;
        Ok(resp.into())
    }

    async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        options: &IssueListOptions,
        page: u32,
    ) -> Result<Page<Issue>, TrackerError> {
        let query = [
            ("state", "all".to_string()),
            ("assignee", options.assignee.as_query_value().to_string()),
            ("milestone", options.milestone.as_query_value()),
        ];
        let resp: Page<IssueResponse> = self
            .get_page(&format!("repos/{owner}/{repo}/issues"), &query, page)
            .await?;

        Ok(Page {
            items: resp
                .items
                .into_iter()
                .filter(|issue| issue.pull_request.is_none())
                .map(Issue::from)
                .collect(),
            next_page: resp.next_page,
        })
    }

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        request: &IssueRequest,
    ) -> Result<Issue, TrackerError> {
        let resp: IssueResponse = self
            .post(
                &format!("repos/{owner}/{repo}/issues"),
                &issue_body(request),
            )
            .await?;
        Ok(resp.into())
    }

    async fn edit_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        request: &IssueRequest,
    ) -> Result<Issue, TrackerError> {
        let resp: IssueResponse = self
            .patch(
                &format!("repos/{owner}/{repo}/issues/{number}"),
                &issue_body(request),
            )
            .await?;
        Ok(resp.into())
    }
}

#[async_trait]
impl RepositoriesApi for GitHubClient {
    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, TrackerError> {
        let resp: RepositoryResponse = self.get(&format!("repos/{owner}/{repo}")).await?;
        Ok(resp.into())
    }

    async fn list_projects(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
    ) -> Result<Page<Project>, TrackerError> {
        let query = [("state", "all".to_string())];
        let resp: Page<ProjectResponse> = self
            .get_page(&format!("repos/{owner}/{repo}/projects"), &query, page)
            .await?;
        Ok(map_page(resp, Project::from))
    }

    async fn create_project(
        &self,
        owner: &str,
        repo: &str,
        options: &ProjectOptions,
    ) -> Result<Project, TrackerError> {
        let resp: ProjectResponse = self
            .post(&format!("repos/{owner}/{repo}/projects"), options)
            .await?;
        Ok(resp.into())
    }
}

#[async_trait]
impl ProjectsApi for GitHubClient {
    async fn update_project(
        &self,
        project_id: u64,
        options: &ProjectOptions,
    ) -> Result<Project, TrackerError> {
        let resp: ProjectResponse = self
            .patch(&format!("projects/{project_id}"), options)
            .await?;
        Ok(resp.into())
    }

    async fn list_columns(
        &self,
        project_id: u64,
        page: u32,
    ) -> Result<Page<Column>, TrackerError> {
        let resp: Page<ColumnResponse> = self
            .get_page(&format!("projects/{project_id}/columns"), &[], page)
            .await?;
        Ok(map_page(resp, Column::from))
    }

    async fn create_column(&self, project_id: u64, name: &str) -> Result<Column, TrackerError> {
        let body = serde_json::json!({ "name": name });
        let resp: ColumnResponse = self
            .post(&format!("projects/{project_id}/columns"), &body)
            .await?;
        Ok(resp.into())
    }

    async fn list_cards(&self, column_id: u64, page: u32) -> Result<Page<Card>, TrackerError> {
        let resp: Page<CardResponse> = self
            .get_page(&format!("projects/columns/{column_id}/cards"), &[], page)
            .await?;
        Ok(map_page(resp, |card| card_from_response(card, column_id)))
    }

    async fn create_card(&self, column_id: u64, issue_id: u64) -> Result<Card, TrackerError> {
        let body = CardBody {
            content_id: issue_id,
            content_type: "Issue",
        };
        let resp: CardResponse = self
            .post(&format!("projects/columns/{column_id}/cards"), &body)
            .await?;
        Ok(card_from_response(resp, column_id))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Ensure the API root has a scheme and no trailing slash.
fn normalize_api_url(url: &str) -> String {
    let url = url.trim();
    let with_scheme = if url.starts_with("https://") || url.starts_with("http://") {
        url.to_string()
    } else {
        format!("https://{url}")
    };
    with_scheme.trim_end_matches('/').to_string()
}

/// Extract the `rel="next"` page number from a `Link` header; 0 when absent.
fn parse_next_page(link: Option<&str>) -> u32 {
    link.into_iter()
        .flat_map(|header| header.split(','))
        .find_map(|part| {
            next_page_regex()
                .captures(part)
                .and_then(|caps| caps.get(1))
                .and_then(|page| page.as_str().parse().ok())
        })
        .unwrap_or(0)
}

fn issue_number_from_url(url: &str) -> Option<u64> {
    issue_url_regex()
        .captures(url)
        .and_then(|caps| caps.get(1))
        .and_then(|number| number.as_str().parse().ok())
}

fn format_due_on(due_on: DateTime<Utc>) -> String {
    due_on.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn issue_body(request: &IssueRequest) -> IssueBody<'_> {
    IssueBody {
        title: &request.title,
        body: &request.body,
        assignees: &request.assignees,
        milestone: request.milestone.filter(|number| *number > 0),
    }
}

fn map_page<T, U>(page: Page<T>, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
        items: page.items.into_iter().map(f).collect(),
        next_page: page.next_page,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_client_normalizes_api_url() {
        let client = GitHubClient::new("token", Some("github.example.com/api/v3/")).unwrap();
        assert_eq!(client.base_url(), "https://github.example.com/api/v3");

        let client = GitHubClient::new("token", None).unwrap();
        assert_eq!(client.base_url(), "https://api.github.com");
    }

    #[test]
    fn test_client_rejects_blank_token() {
        let result = authenticated_client("   ");
        assert!(matches!(result.unwrap_err(), TrackerError::MissingToken));
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = authenticated_client("ghp_secret").unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("ghp_secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_parse_next_page_from_link_header() {
        let link = r#"<https://api.github.com/repositories/1/issues?per_page=100&page=2>; rel="next", <https://api.github.com/repositories/1/issues?per_page=100&page=5>; rel="last""#;
        assert_eq!(parse_next_page(Some(link)), 2);
    }

    #[test]
    fn test_parse_next_page_on_last_page() {
        let link = r#"<https://api.github.com/repositories/1/issues?page=4>; rel="prev", <https://api.github.com/repositories/1/issues?page=1>; rel="first""#;
        assert_eq!(parse_next_page(Some(link)), 0);
        assert_eq!(parse_next_page(None), 0);
    }

    #[test]
    fn test_issue_number_from_content_url() {
        assert_eq!(
            issue_number_from_url("https://api.github.com/repos/acme/onboarding/issues/42"),
            Some(42)
        );
        assert_eq!(issue_number_from_url("https://api.github.com/repos/acme/x"), None);
    }

    #[test]
    fn test_due_on_is_formatted_without_fraction() {
        let due = Utc.with_ymd_and_hms(2017, 7, 14, 0, 0, 0).unwrap();
        assert_eq!(format_due_on(due), "2017-07-14T00:00:00Z");
    }

    #[test]
    fn test_issue_body_drops_zero_milestone() {
        let request = IssueRequest {
            title: "Set up laptop".to_string(),
            body: "Install things".to_string(),
            assignees: vec!["octocat".to_string()],
            milestone: Some(0),
        };
        let json = serde_json::to_value(issue_body(&request)).unwrap();
        assert!(json.get("milestone").is_none());
        assert_eq!(json["assignees"][0], "octocat");
    }

    #[test]
    fn test_issue_response_conversion() {
        let raw = serde_json::json!({
            "id": 1001,
            "number": 7,
            "title": "Read the handbook",
            "body": null,
            "milestone": { "number": 3 },
            "assignees": [{ "login": "octocat" }],
        });
        let issue: Issue = serde_json::from_value::<IssueResponse>(raw).unwrap().into();

        assert_eq!(issue.number, 7);
        assert_eq!(issue.body, "");
        assert_eq!(issue.milestone, Some(3));
        assert_eq!(issue.assignees, vec!["octocat".to_string()]);
    }

    #[test]
    fn test_project_response_maps_name_and_body() {
        let raw = serde_json::json!({ "id": 9, "number": 2, "name": "Welcome @octocat!", "body": "Hi" });
        let project: Project = serde_json::from_value::<ProjectResponse>(raw).unwrap().into();
        assert_eq!(project.title, "Welcome @octocat!");
        assert_eq!(project.description, "Hi");
    }

    #[test]
    fn test_card_response_keeps_column() {
        let raw = serde_json::json!({ "id": 5, "content_url": "https://api.github.com/repos/a/b/issues/3" });
        let card = card_from_response(serde_json::from_value(raw).unwrap(), 77);
        assert_eq!(card.column_id, 77);
        assert_eq!(card.issue_number, Some(3));
    }
}
