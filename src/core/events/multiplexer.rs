//! Event multiplexer.
//!
//! Every normalized relay event is published once and copied into a private
//! queue per observer. Observers drain their own queue at their own pace, so
//! a slow client socket never delays the trace sink or the other way round.

use base64::prelude::*;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::core::realtime::TranscriptRole;
use crate::core::session::SessionState;
use crate::utils::queue::{MonitoredReceiver, MonitoredSender, monitored_channel};

fn serialize_base64<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64_STANDARD.encode(data))
}

/// Normalized event sent to relay observers.
///
/// Serializes to the client wire format, for example
/// `{"type":"tool_start","call_id":"c1","name":"knowledge_base_search"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// Agent audio, base64 PCM16 on the wire
    Audio {
        #[serde(serialize_with = "serialize_base64")]
        data: Bytes,
        sample_rate: u32,
        sequence: u64,
    },
    Transcript {
        text: String,
        role: TranscriptRole,
    },
    ToolStart {
        call_id: String,
        name: String,
    },
    ToolEnd {
        call_id: String,
        name: String,
        success: bool,
    },
    Error {
        code: String,
        message: String,
    },
    State {
        state: SessionState,
    },
    /// Terminal event, published exactly once per session
    Closed {
        reason: String,
    },
}

impl RelayEvent {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        RelayEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayEvent::Audio { .. } => "audio",
            RelayEvent::Transcript { .. } => "transcript",
            RelayEvent::ToolStart { .. } => "tool_start",
            RelayEvent::ToolEnd { .. } => "tool_end",
            RelayEvent::Error { .. } => "error",
            RelayEvent::State { .. } => "state",
            RelayEvent::Closed { .. } => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayEvent::Closed { .. })
    }
}

/// Receiving end of one observer queue.
pub type EventReceiver = MonitoredReceiver<RelayEvent>;

struct Observer {
    name: String,
    tx: MonitoredSender<RelayEvent>,
}

/// Fans relay events out to independent observer queues.
pub struct EventMultiplexer {
    session_id: String,
    warn_depth: usize,
    observers: Mutex<Vec<Observer>>,
}

impl EventMultiplexer {
    pub fn new(session_id: impl Into<String>, warn_depth: usize) -> Self {
        Self {
            session_id: session_id.into(),
            warn_depth,
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Register an observer. It receives every event published from now on.
    pub fn subscribe(&self, name: &str) -> EventReceiver {
        let (tx, rx) = monitored_channel(
            format!("events:{}:{}", self.session_id, name),
            self.warn_depth,
        );
        self.observers.lock().push(Observer {
            name: name.to_string(),
            tx,
        });
        rx
    }

    /// Deliver `event` to every live observer in publish order.
    ///
    /// Observers whose receiver was dropped are removed.
    pub fn publish(&self, event: RelayEvent) {
        let mut observers = self.observers.lock();
        observers.retain(|observer| {
            if observer.tx.send(event.clone()).is_err() {
                debug!(
                    session_id = %self.session_id,
                    observer = %observer.name,
                    "Observer gone, removing"
                );
                return false;
            }
            true
        });
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Drop all observer senders. Receivers end after draining what they hold.
    pub fn close(&self) {
        self.observers.lock().clear();
    }
}

/// Attach an observer that writes every event to `tracing` at debug level.
///
/// The task ends when the multiplexer is closed.
pub fn spawn_trace_sink(mux: &EventMultiplexer) -> JoinHandle<()> {
    let mut rx = mux.subscribe("trace");
    let session_id = mux.session_id.clone();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match &event {
                RelayEvent::Audio {
                    data, sequence, ..
                } => debug!(
                    session_id = %session_id,
                    kind = "audio",
                    bytes = data.len(),
                    sequence,
                    "relay event"
                ),
                other => debug!(
                    session_id = %session_id,
                    kind = other.kind(),
                    event = ?other,
                    "relay event"
                ),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transcript(text: &str) -> RelayEvent {
        RelayEvent::Transcript {
            text: text.into(),
            role: TranscriptRole::Assistant,
        }
    }

    #[tokio::test]
    async fn test_every_observer_sees_events_in_order() {
        let mux = EventMultiplexer::new("s1", 0);
        let mut a = mux.subscribe("client");
        let mut b = mux.subscribe("trace");

        mux.publish(transcript("one"));
        mux.publish(transcript("two"));

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.recv().await, Some(transcript("one")));
            assert_eq!(rx.recv().await, Some(transcript("two")));
        }
    }

    #[tokio::test]
    async fn test_slow_observer_does_not_block_others() {
        let mux = EventMultiplexer::new("s1", 0);
        let slow = mux.subscribe("slow");
        let mut fast = mux.subscribe("fast");

        for i in 0..100 {
            mux.publish(transcript(&i.to_string()));
        }
        for i in 0..100 {
            assert_eq!(fast.recv().await, Some(transcript(&i.to_string())));
        }
        assert_eq!(slow.depth(), 100);
    }

    #[test]
    fn test_dropped_observer_is_pruned() {
        let mux = EventMultiplexer::new("s1", 0);
        let rx = mux.subscribe("client");
        let _keep = mux.subscribe("trace");
        drop(rx);

        mux.publish(transcript("x"));
        assert_eq!(mux.observer_count(), 1);
    }

    #[tokio::test]
    async fn test_close_ends_receivers() {
        let mux = EventMultiplexer::new("s1", 0);
        let mut rx = mux.subscribe("client");
        mux.publish(RelayEvent::Closed {
            reason: "stopped".into(),
        });
        mux.close();

        assert!(rx.recv().await.is_some_and(|e| e.is_terminal()));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_trace_sink_exits_on_close() {
        let mux = EventMultiplexer::new("s1", 0);
        let sink = spawn_trace_sink(&mux);
        mux.publish(transcript("hello"));
        mux.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), sink)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_wire_format() {
        let audio = RelayEvent::Audio {
            data: Bytes::from_static(&[1, 2, 3]),
            sample_rate: 24000,
            sequence: 7,
        };
        assert_eq!(
            serde_json::to_value(&audio).unwrap(),
            json!({"type": "audio", "data": "AQID", "sample_rate": 24000, "sequence": 7})
        );

        let end = RelayEvent::ToolEnd {
            call_id: "c1".into(),
            name: "knowledge_base_search".into(),
            success: true,
        };
        assert_eq!(
            serde_json::to_value(&end).unwrap(),
            json!({"type": "tool_end", "call_id": "c1", "name": "knowledge_base_search", "success": true})
        );

        assert_eq!(
            serde_json::to_value(RelayEvent::State {
                state: SessionState::Active
            })
            .unwrap(),
            json!({"type": "state", "state": "active"})
        );
        assert_eq!(
            serde_json::to_value(transcript("hi")).unwrap(),
            json!({"type": "transcript", "text": "hi", "role": "assistant"})
        );
    }
}
