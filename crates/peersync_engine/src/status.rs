//! Progress events published while a run is in flight.

use crate::error::FailureKind;
use crate::mapping::EntityId;
use crate::report::RunStatus;
use parking_lot::Mutex;
use peersync_protocol::{ChangeKind, Classification};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Something that happened to one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberEvent {
    /// The backend connection is open.
    Connected,
    /// The change scan finished and reported `count` changes.
    SentChanges {
        /// Reported changes.
        count: usize,
    },
    /// The commit batch is done.
    Committed {
        /// Records written.
        count: usize,
        /// Records that failed.
        errors: usize,
    },
    /// The backend was finalized.
    Finalized,
    /// The backend connection is closed.
    Disconnected,
    /// The session failed.
    Failed(FailureKind),
    /// An identity slot changed; the scan is a slow-sync.
    SlowSync {
        /// Slot that changed.
        field: String,
    },
}

/// Something that happened to one record of a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// The scan reported the record.
    Received {
        /// Change kind.
        kind: ChangeKind,
    },
    /// The record was written to the member.
    Written {
        /// Change kind.
        kind: ChangeKind,
    },
    /// Writing the record failed.
    WriteError {
        /// Backend error description.
        message: String,
    },
}

/// Coordinator checkpoints of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// Every live session reported its changes.
    ChangesReported,
    /// Every live session received its commit batch.
    BatchesDispatched,
    /// Every session ended.
    SessionsJoined,
}

/// Something that happened to the run as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A checkpoint was passed.
    PhaseComplete(EnginePhase),
    /// Reported versions of an entity diverge.
    Conflict {
        /// Entity in conflict.
        entity: EntityId,
        /// Worst pairwise classification.
        classification: Classification,
    },
    /// The run ended.
    Finished(RunStatus),
}

/// A published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Member lifecycle.
    Member {
        /// Member id.
        member: String,
        /// Event.
        event: MemberEvent,
    },
    /// Record lifecycle.
    Change {
        /// Member id.
        member: String,
        /// Member-local uid.
        uid: String,
        /// Event.
        event: ChangeEvent,
    },
    /// Run lifecycle.
    Engine(EngineEvent),
}

/// Fan-out of [`SyncEvent`]s to any number of subscribers.
///
/// Publishing never blocks. Subscribers whose receiver was dropped are
/// pruned on the next publish.
#[derive(Debug, Clone, Default)]
pub struct StatusFeed {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<SyncEvent>>>>,
}

impl StatusFeed {
    /// Creates a feed with no subscriber.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SyncEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().push(sender);
        receiver
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().iter().filter(|s| !s.is_closed()).count()
    }

    /// Publishes an event to every subscriber.
    pub fn publish(&self, event: SyncEvent) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        subscribers.retain(|s| s.send(event.clone()).is_ok());
    }

    pub(crate) fn member(&self, member: &str, event: MemberEvent) {
        self.publish(SyncEvent::Member {
            member: member.to_owned(),
            event,
        });
    }

    pub(crate) fn change(&self, member: &str, uid: &str, event: ChangeEvent) {
        self.publish(SyncEvent::Change {
            member: member.to_owned(),
            uid: uid.to_owned(),
            event,
        });
    }

    pub(crate) fn engine(&self, event: EngineEvent) {
        self.publish(SyncEvent::Engine(event));
    }
}
