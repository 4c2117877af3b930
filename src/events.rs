//! Status event fan-out for running executions.
//!
//! Each run owns a [`StatusHub`] wrapping a `tokio::sync::broadcast`
//! channel. Any number of consumers can [`StatusHub::subscribe`]; a slow
//! consumer lags and loses its oldest buffered events without ever blocking
//! the execution loop. Missed events are counted on the hub for diagnostics.
//!
//! A [`StatusStream`] is finite: after it yields the run-level terminal
//! event (`ExecutionFinished`) it reports end-of-stream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::{self, Receiver, Sender};
use tokio::time::timeout;

use crate::types::{ExecutionStatus, StepStatus};

/// One observable state change in a run. Ordering per subscriber matches
/// publish order; payloads are self-contained descriptions of the change.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    ExecutionStarted {
        execution_id: String,
        workflow_id: String,
        timestamp: DateTime<Utc>,
    },
    ExecutionStatusChanged {
        execution_id: String,
        status: ExecutionStatus,
        timestamp: DateTime<Utc>,
    },
    StepStatusChanged {
        execution_id: String,
        node_id: String,
        status: StepStatus,
        timestamp: DateTime<Utc>,
    },
    StepFailed {
        execution_id: String,
        node_id: String,
        error: String,
        critical: bool,
        timestamp: DateTime<Utc>,
    },
    StepCompleted {
        execution_id: String,
        node_id: String,
        result: Value,
        timestamp: DateTime<Utc>,
    },
    /// Terminal event; exactly one per run, always last.
    ExecutionFinished {
        execution_id: String,
        status: ExecutionStatus,
        timestamp: DateTime<Utc>,
    },
}

impl StatusEvent {
    /// Whether this is the run-level terminal event.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ExecutionFinished { .. })
    }
}

/// Broadcast hub for one run's status events.
#[derive(Debug)]
pub struct StatusHub {
    sender: Sender<StatusEvent>,
    dropped_events: AtomicUsize,
    capacity: usize,
}

impl StatusHub {
    pub fn new(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Arc::new(Self {
            sender,
            dropped_events: AtomicUsize::new(0),
            capacity,
        })
    }

    /// Publish to all current subscribers. With no subscribers the event is
    /// dropped silently; publishing is never an error for the run loop.
    pub fn publish(&self, event: StatusEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(self: &Arc<Self>) -> StatusStream {
        StatusStream {
            receiver: self.sender.subscribe(),
            hub: Arc::clone(self),
            finished: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events lost to lagging subscribers since the hub was created.
    pub fn dropped(&self) -> usize {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

/// One subscriber's view of a run's events.
///
/// `next` skips over lag gaps (after counting them on the hub) and returns
/// `None` once the terminal event has been delivered or the hub is gone.
#[derive(Debug)]
pub struct StatusStream {
    receiver: Receiver<StatusEvent>,
    hub: Arc<StatusHub>,
    finished: bool,
}

impl StatusStream {
    pub async fn next(&mut self) -> Option<StatusEvent> {
        if self.finished {
            return None;
        }
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if event.is_terminal() {
                        self.finished = true;
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    self.hub
                        .dropped_events
                        .fetch_add(missed as usize, Ordering::Relaxed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// Like [`next`](Self::next) but gives up after `duration`.
    pub async fn next_timeout(&mut self, duration: Duration) -> Option<StatusEvent> {
        match timeout(duration, self.next()).await {
            Ok(event) => event,
            Err(_) => None,
        }
    }

    /// Adapt into a `futures_util::Stream` for combinator-style consumers.
    pub fn into_async_stream(self) -> impl futures_util::stream::Stream<Item = StatusEvent> {
        stream::unfold(self, |mut s| async move {
            s.next().await.map(|event| (event, s))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(execution_id: &str) -> StatusEvent {
        StatusEvent::ExecutionStarted {
            execution_id: execution_id.to_string(),
            workflow_id: "wf".to_string(),
            timestamp: Utc::now(),
        }
    }

    fn finished(execution_id: &str) -> StatusEvent {
        StatusEvent::ExecutionFinished {
            execution_id: execution_id.to_string(),
            status: ExecutionStatus::Completed,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscribers_see_publish_order() {
        let hub = StatusHub::new(8);
        let mut stream = hub.subscribe();
        hub.publish(started("e1"));
        hub.publish(finished("e1"));

        assert!(matches!(
            stream.next().await,
            Some(StatusEvent::ExecutionStarted { .. })
        ));
        assert!(matches!(
            stream.next().await,
            Some(StatusEvent::ExecutionFinished { .. })
        ));
    }

    #[tokio::test]
    async fn stream_ends_after_terminal_event() {
        let hub = StatusHub::new(8);
        let mut stream = hub.subscribe();
        hub.publish(finished("e1"));
        hub.publish(started("e1"));

        assert!(stream.next().await.is_some_and(|e| e.is_terminal()));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn lagged_subscriber_skips_and_counts_drops() {
        let hub = StatusHub::new(2);
        let mut stream = hub.subscribe();
        for _ in 0..5 {
            hub.publish(started("e1"));
        }
        hub.publish(finished("e1"));

        // Buffer holds only the last two events; the rest were dropped.
        let mut seen = 0;
        while let Some(event) = stream.next_timeout(Duration::from_millis(100)).await {
            seen += 1;
            if event.is_terminal() {
                break;
            }
        }
        assert_eq!(seen, 2);
        assert_eq!(hub.dropped(), 4);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let hub = StatusHub::new(4);
        hub.publish(started("e1"));
        assert_eq!(hub.dropped(), 0);
    }
}
