//! Observable sync status.
//!
//! The orchestrator is the only writer of [`SyncStatus`]; everyone else
//! observes it through [`StatusBus`] subscriptions. Callbacks are cloned
//! out of the lock before they are invoked, so a subscriber may
//! unsubscribe (drop its [`Subscription`]) or re-subscribe from inside a
//! notification without deadlocking.

use crate::attachments::AttachmentProgress;
use chrono::{DateTime, Utc};
use mindwtr_core::SyncOutcome;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Step the current cycle is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStep {
    /// No cycle running.
    #[default]
    Idle,
    /// Fetching the remote snapshot.
    Fetching,
    /// Running the three-way merge.
    Merging,
    /// Pushing the merged snapshot.
    Pushing,
    /// Reconciling attachment content.
    SyncingAttachments,
}

/// Process-wide sync status, mutated only by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// True while a cycle is running.
    pub in_flight: bool,
    /// True when a rerun is queued behind the in-flight cycle.
    pub queued: bool,
    /// Current step of the in-flight cycle.
    pub step: SyncStep,
    /// Outcome of the last completed cycle.
    pub last_result: Option<SyncOutcome>,
    /// When the last cycle completed.
    pub last_result_at: Option<DateTime<Utc>>,
}

/// Events published by the sync engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// The sync status changed.
    StatusChanged {
        /// The new status.
        status: SyncStatus,
    },
    /// An attachment transfer made progress.
    AttachmentProgress {
        /// Attachment id the progress belongs to.
        id: String,
        /// Current transfer progress.
        progress: AttachmentProgress,
    },
}

/// Subscription handle that unsubscribes automatically when dropped.
pub struct Subscription {
    bus: Weak<StatusBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// Publish/subscribe bus for [`SyncEvent`]s.
#[derive(Default)]
pub struct StatusBus {
    listeners: RwLock<Vec<(usize, Listener)>>,
    next_id: AtomicUsize,
}

impl StatusBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to events. Hold the returned handle to keep receiving;
    /// drop it to unsubscribe.
    pub fn subscribe(
        self: &Arc<Self>,
        listener: impl Fn(&SyncEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, Arc::new(listener)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    /// Publishes an event to every current subscriber.
    pub fn publish(&self, event: &SyncEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    /// Removes every subscriber. Used by `resetForTests`.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    fn unsubscribe(&self, id: usize) {
        self.listeners.write().retain(|(lid, _)| *lid != id);
    }
}

/// Injectable wall-clock source.
///
/// The orchestrator stamps `last_result_at` and compares tombstone ages
/// through this trait so tests can use a fixed clock.
pub trait Clock: Send + Sync {
    /// Returns the current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn subscribers_receive_events() {
        let bus = Arc::new(StatusBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        let _sub = bus.subscribe(move |event| {
            if let SyncEvent::StatusChanged { status } = event {
                seen_clone.lock().push(status.step);
            }
        });

        bus.publish(&SyncEvent::StatusChanged {
            status: SyncStatus {
                step: SyncStep::Fetching,
                in_flight: true,
                ..Default::default()
            },
        });

        assert_eq!(seen.lock().as_slice(), &[SyncStep::Fetching]);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus = Arc::new(StatusBus::new());
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = Arc::clone(&count);
        let sub = bus.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&SyncEvent::StatusChanged {
            status: SyncStatus::default(),
        });
        drop(sub);
        bus.publish(&SyncEvent::StatusChanged {
            status: SyncStatus::default(),
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_during_notify_is_safe() {
        let bus = Arc::new(StatusBus::new());
        let held: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let held_clone = Arc::clone(&held);
        let sub = bus.subscribe(move |_| {
            // Dropping our own subscription mid-notify must not deadlock.
            held_clone.lock().take();
        });
        *held.lock() = Some(sub);

        bus.publish(&SyncEvent::StatusChanged {
            status: SyncStatus::default(),
        });
        bus.publish(&SyncEvent::StatusChanged {
            status: SyncStatus::default(),
        });
    }
}
