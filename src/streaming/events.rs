//! Notifications emitted while splitting.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Observable progress of a split run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SplitEvent {
    /// A shard was created. Fired before any byte is written to it.
    FileCreated { file_name: String },
    /// The source is exhausted and the last write completed. Fired once.
    Complete { file_count: u64 },
}

/// Optional event channel. Events sent to a dropped receiver are discarded.
#[derive(Debug, Clone, Default)]
pub struct EventEmitter {
    tx: Option<UnboundedSender<SplitEvent>>,
}

impl EventEmitter {
    pub fn new(tx: UnboundedSender<SplitEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// An emitter that drops every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: SplitEvent) {
        if let Some(ref tx) = self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_events_serialize_with_tag() {
        let json = serde_json::to_value(SplitEvent::FileCreated {
            file_name: "data_0.txt".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "file_created");
        assert_eq!(json["file_name"], "data_0.txt");

        let json = serde_json::to_value(SplitEvent::Complete { file_count: 3 }).unwrap();
        assert_eq!(json["event"], "complete");
        assert_eq!(json["file_count"], 3);
    }

    #[test]
    fn test_emit_delivers_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = EventEmitter::new(tx);
        emitter.emit(SplitEvent::FileCreated {
            file_name: "a_0".into(),
        });
        emitter.emit(SplitEvent::Complete { file_count: 1 });

        assert_eq!(
            rx.try_recv().unwrap(),
            SplitEvent::FileCreated {
                file_name: "a_0".into()
            }
        );
        assert_eq!(rx.try_recv().unwrap(), SplitEvent::Complete { file_count: 1 });
    }

    #[test]
    fn test_emit_ignores_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        EventEmitter::new(tx).emit(SplitEvent::Complete { file_count: 0 });
        EventEmitter::disabled().emit(SplitEvent::Complete { file_count: 0 });
    }
}
