//! Pumps a run's events to a consumer and turns a consumer disconnect into
//! cancellation of the run.

use std::future::Future;
use std::io::Write;

use async_trait::async_trait;
use colored::Colorize;
use tracing::{debug, warn};

use crate::types::{Event, EventKind, RunState};
use crate::workflow::RunHandle;

/// The consumer went away; no further events can be delivered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event consumer closed: {0}")]
pub struct SinkClosed(pub String);

/// Destination for run events (a terminal, a socket, a test buffer).
#[async_trait]
pub trait EventSink: Send {
    async fn deliver(&mut self, event: &Event) -> Result<(), SinkClosed>;
}

/// What happened on the consumer side of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSummary {
    pub delivered: usize,
    pub last_kind: Option<EventKind>,
    pub state: RunState,
}

impl ForwardSummary {
    /// The run completed and the consumer saw it complete.
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Completed && self.last_kind == Some(EventKind::Complete)
    }
}

/// Forward every event of `handle` to `sink` until the stream closes.
///
/// When `disconnect` resolves first, or the sink rejects an event, the run
/// is cancelled and the remaining events are dropped.
pub async fn forward<S, D>(mut handle: RunHandle, sink: &mut S, disconnect: D) -> ForwardSummary
where
    S: EventSink + ?Sized,
    D: Future<Output = ()>,
{
    tokio::pin!(disconnect);
    let run_id = handle.run_id();
    let mut delivered = 0;
    let mut last_kind = None;

    loop {
        tokio::select! {
            biased;
            () = &mut disconnect => {
                debug!(%run_id, "consumer disconnected, cancelling run");
                handle.cancel();
                break;
            }
            event = handle.next_event() => {
                let Some(event) = event else { break };
                if let Err(err) = sink.deliver(&event).await {
                    warn!(%run_id, "{err}, cancelling run");
                    handle.cancel();
                    break;
                }
                delivered += 1;
                last_kind = Some(event.kind);
            }
        }
    }

    let state = handle.wait().await;
    ForwardSummary {
        delivered,
        last_kind,
        state,
    }
}

/// Writes events to a terminal (or any writer) as coloured lines or JSON lines.
pub struct TerminalSink<W: Write + Send> {
    out: W,
    json: bool,
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W, json: bool) -> Self {
        Self { out, json }
    }

    fn render(&self, event: &Event) -> Result<String, SinkClosed> {
        if self.json {
            return serde_json::to_string(event).map_err(|e| SinkClosed(e.to_string()));
        }

        let line = match event.kind {
            EventKind::Start => format!("{} {}", "▶".cyan(), event.message.bold()),
            EventKind::Progress => format!("{} {}", "•".blue(), event.message),
            EventKind::Complete => format!("{} {}", "✓".green(), event.message.green()),
            EventKind::Error => match &event.error {
                Some(detail) => format!(
                    "{} {} {}",
                    "✗".red(),
                    event.message.red(),
                    format!("({detail})").dimmed()
                ),
                None => format!("{} {}", "✗".red(), event.message.red()),
            },
        };
        Ok(line)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[async_trait]
impl<W: Write + Send> EventSink for TerminalSink<W> {
    async fn deliver(&mut self, event: &Event) -> Result<(), SinkClosed> {
        let line = self.render(event)?;
        writeln!(self.out, "{line}")
            .and_then(|()| self.out.flush())
            .map_err(|e| SinkClosed(e.to_string()))
    }
}

/// Keeps delivered events in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct VecSink {
    pub events: Vec<Event>,
    /// Reject the event after this many have been accepted.
    pub close_after: Option<usize>,
}

#[cfg(test)]
#[async_trait]
impl EventSink for VecSink {
    async fn deliver(&mut self, event: &Event) -> Result<(), SinkClosed> {
        if self.close_after.is_some_and(|limit| self.events.len() >= limit) {
            return Err(SinkClosed("buffer closed".to_string()));
        }
        self.events.push(event.clone());
        Ok(())
    }
}
