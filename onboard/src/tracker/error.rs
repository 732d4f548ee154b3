use reqwest::StatusCode;

/// Message fragment GitHub returns when an issue already sits on a board.
const DUPLICATE_CARD_MARKER: &str = "already has the associated issue";

/// Errors returned by tracker clients.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("GitHub token is not set. Pass --token or set GITHUB_TOKEN")]
    MissingToken,
    #[error("Authentication failed (401). Check the GitHub token")]
    AuthFailed,
    #[error("Permission denied (403): {0}")]
    PermissionDenied(String),
    #[error("Resource not found (404): {0}")]
    NotFound(String),
    #[error("Validation failed (422): {0}")]
    Unprocessable(String),
    #[error("GitHub API error (HTTP {status}): {message}")]
    HttpError { status: u16, message: String },
    #[error("Pagination stalled: server returned page {0} again")]
    PaginationStalled(u32),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrackerError {
    /// Map a non-success HTTP status and its body to an error.
    pub fn from_status(status: StatusCode, path: &str, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => TrackerError::AuthFailed,
            StatusCode::FORBIDDEN => TrackerError::PermissionDenied(api_message(body)),
            StatusCode::NOT_FOUND => TrackerError::NotFound(path.to_string()),
            StatusCode::UNPROCESSABLE_ENTITY => TrackerError::Unprocessable(api_message(body)),
            _ => TrackerError::HttpError {
                status: status.as_u16(),
                message: api_message(body),
            },
        }
    }

    /// The remote rejected a card because the issue is already on the board.
    ///
    /// This is the one rejection the workflow treats as expected.
    pub fn is_duplicate_card(&self) -> bool {
        matches!(self, TrackerError::Unprocessable(msg) if msg.to_lowercase().contains(DUPLICATE_CARD_MARKER))
    }
}

/// Flatten a GitHub error body (`{"message": ..., "errors": [{"message": ...}]}`)
/// into one line, falling back to the raw text.
fn api_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };

    let mut parts: Vec<String> = Vec::new();
    if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
        parts.push(message.to_string());
    }
    if let Some(errors) = value.get("errors").and_then(|e| e.as_array()) {
        for detail in errors {
            let text = detail
                .get("message")
                .and_then(|m| m.as_str())
                .or_else(|| detail.get("code").and_then(|c| c.as_str()));
            if let Some(text) = text {
                parts.push(text.to_string());
            }
        }
    }

    if parts.is_empty() {
        body.trim().to_string()
    } else {
        parts.join(": ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_maps_known_codes() {
        assert!(matches!(
            TrackerError::from_status(StatusCode::UNAUTHORIZED, "user", ""),
            TrackerError::AuthFailed
        ));
        assert!(matches!(
            TrackerError::from_status(StatusCode::NOT_FOUND, "repos/acme/x", ""),
            TrackerError::NotFound(path) if path == "repos/acme/x"
        ));
        assert!(matches!(
            TrackerError::from_status(StatusCode::BAD_GATEWAY, "user", "upstream"),
            TrackerError::HttpError { status: 502, .. }
        ));
    }

    #[test]
    fn test_duplicate_card_is_classified() {
        let body = r#"{"message":"Validation Failed","errors":[{"resource":"ProjectCard","code":"unprocessable","field":"data","message":"Project already has the associated issue"}]}"#;
        let err = TrackerError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "cards", body);

        assert!(err.is_duplicate_card());
        assert_eq!(
            err.to_string(),
            "Validation failed (422): Validation Failed: Project already has the associated issue"
        );
    }

    #[test]
    fn test_other_validation_errors_are_not_duplicates() {
        let body = r#"{"message":"Validation Failed","errors":[{"code":"already_exists","field":"title"}]}"#;
        let err = TrackerError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "milestones", body);

        assert!(!err.is_duplicate_card());
        assert!(err.to_string().contains("already_exists"));
    }

    #[test]
    fn test_api_message_falls_back_to_raw_body() {
        assert_eq!(api_message("  gateway timeout \n"), "gateway timeout");
        assert_eq!(api_message("{}"), "{}");
    }

    #[test]
    fn test_error_display_auth_failed() {
        let err = TrackerError::AuthFailed;
        assert!(err.to_string().contains("401"));
    }
}
