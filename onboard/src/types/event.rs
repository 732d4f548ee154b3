use std::fmt;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::enums::EventKind;

/// Identifier shared by every event of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A progress event emitted by the workflow runner.
///
/// Serialized as `{kind, timestamp, message, error?}`; the run id stays on
/// the producer side and is only used for correlation in logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    #[serde(skip)]
    pub run_id: RunId,
    pub kind: EventKind,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Event {
    pub fn new(run_id: RunId, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            run_id,
            kind,
            timestamp: Utc::now().timestamp(),
            message: message.into(),
            error: None,
        }
    }

    pub fn error(run_id: RunId, message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error: Some(detail.into()),
            ..Self::new(run_id, EventKind::Error, message)
        }
    }
}
