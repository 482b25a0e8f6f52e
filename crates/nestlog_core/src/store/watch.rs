//! Live subscriptions over store documents and queries.
//!
//! # Responsibility
//! - Track subscribers per watch target and fan committed changes out to them.
//! - Hand out cancellation handles (`Subscription`).
//!
//! # Invariants
//! - Callbacks of one subscription never run concurrently.
//! - A subscriber sees snapshots with strictly increasing revisions.
//! - Writes issued from inside a callback are coalesced and delivered after
//!   that callback returns.
//! - Once `unsubscribe` (or drop) returns outside any callback, no callback
//!   of that subscription runs again: one in flight on another thread is
//!   waited for.
//! - Called from inside a callback (of any subscription), `unsubscribe` does
//!   not wait. No new delivery starts, but a callback already running on
//!   another thread may still finish. Two threads can therefore cancel each
//!   other's subscriptions from their callbacks without deadlocking.

use crate::model::baby::{Baby, BabyId};
use crate::model::event::CareEvent;
use crate::model::invite::Invite;
use crate::store::{StoreError, StoreResult};
use log::debug;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::cell::Cell;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError, Weak};

pub type SnapshotCallback = Box<dyn FnMut(Snapshot) + Send>;
pub type ErrorCallback = Box<dyn FnMut(&StoreError) + Send>;

/// What a subscriber is watching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchTarget {
    /// One baby document, including members and the active session.
    Baby(BabyId),
    /// One baby's event feed, newest first.
    Events(BabyId),
    /// Pending invites addressed to one normalized email.
    PendingInvites(String),
}

/// Document or query touched by a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Baby(BabyId),
    Events(BabyId),
    /// `None` when the affected addresses are unknown (cascade deletes).
    Invites(Option<String>),
}

impl WatchTarget {
    pub fn is_affected_by(&self, change: &Change) -> bool {
        match (self, change) {
            (Self::Baby(watched), Change::Baby(changed)) => watched == changed,
            (Self::Events(watched), Change::Events(changed)) => watched == changed,
            (Self::PendingInvites(_), Change::Invites(None)) => true,
            (Self::PendingInvites(watched), Change::Invites(Some(changed))) => watched == changed,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotData {
    /// `None` once the baby has been deleted.
    Baby(Option<Baby>),
    Events(Vec<CareEvent>),
    Invites(Vec<Invite>),
}

/// Latest state of a watch target as of store revision `revision`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub revision: u64,
    pub data: SnapshotData,
}

thread_local! {
    static CALLBACK_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Marks the current thread as running a subscriber callback.
struct CallbackScope;

impl CallbackScope {
    fn enter() -> Self {
        CALLBACK_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for CallbackScope {
    fn drop(&mut self) {
        CALLBACK_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

fn in_callback() -> bool {
    CALLBACK_DEPTH.with(|depth| depth.get() > 0)
}

struct Sink {
    on_snapshot: SnapshotCallback,
    on_error: ErrorCallback,
    last_revision: Option<u64>,
}

/// Registered subscriber; shared between the hub and its handle.
pub struct Subscriber {
    target: WatchTarget,
    active: AtomicBool,
    dirty: AtomicBool,
    sink: Mutex<Sink>,
}

impl Subscriber {
    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    /// Runs pending deliveries unless another caller is already delivering,
    /// in which case that caller picks the pending mark up.
    pub fn deliver(&self, load: &dyn Fn(&WatchTarget) -> StoreResult<Snapshot>) {
        self.dirty.store(true, Ordering::SeqCst);
        loop {
            let mut sink = match self.sink.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => return,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            };
            while self.dirty.swap(false, Ordering::SeqCst) {
                if !self.active.load(Ordering::SeqCst) {
                    break;
                }
                match load(&self.target) {
                    Ok(snapshot) => offer(&mut sink, &self.active, snapshot),
                    Err(err) => {
                        if self.active.load(Ordering::SeqCst) {
                            let _scope = CallbackScope::enter();
                            (sink.on_error)(&err);
                        }
                    }
                }
            }
            drop(sink);
            if !self.active.load(Ordering::SeqCst) || !self.dirty.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    /// Blocks until a callback running on another thread has returned.
    /// Inside a callback this returns immediately.
    fn wait_for_delivery(&self) {
        if in_callback() {
            return;
        }
        drop(self.sink.lock());
    }
}

fn offer(sink: &mut Sink, active: &AtomicBool, snapshot: Snapshot) {
    if sink
        .last_revision
        .is_some_and(|last| snapshot.revision <= last)
    {
        return;
    }
    if !active.load(Ordering::SeqCst) {
        return;
    }
    sink.last_revision = Some(snapshot.revision);
    let _scope = CallbackScope::enter();
    (sink.on_snapshot)(snapshot);
}

/// Subscriber registry shared by a store and its subscription handles.
#[derive(Default)]
pub struct WatchHub {
    next_id: AtomicU64,
    subscribers: Mutex<BTreeMap<u64, Arc<Subscriber>>>,
}

impl WatchHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a subscriber. The caller is expected to `deliver` the
    /// initial snapshot right away.
    pub fn register(
        self: &Arc<Self>,
        target: WatchTarget,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> (Subscription, Arc<Subscriber>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let subscriber = Arc::new(Subscriber {
            target,
            active: AtomicBool::new(true),
            dirty: AtomicBool::new(false),
            sink: Mutex::new(Sink {
                on_snapshot,
                on_error,
                last_revision: None,
            }),
        });
        self.lock_subscribers().insert(id, Arc::clone(&subscriber));
        debug!(
            "event=watch_subscribe module=watch status=ok subscription_id={id} target={:?}",
            subscriber.target
        );

        let handle = Subscription {
            id,
            hub: Arc::downgrade(self),
            subscriber: Arc::clone(&subscriber),
            released: false,
        };
        (handle, subscriber)
    }

    /// Delivers fresh snapshots to every subscriber affected by `changes`.
    pub fn publish(&self, changes: &[Change], load: &dyn Fn(&WatchTarget) -> StoreResult<Snapshot>) {
        if changes.is_empty() {
            return;
        }
        let affected: Vec<Arc<Subscriber>> = self
            .lock_subscribers()
            .values()
            .filter(|subscriber| {
                changes
                    .iter()
                    .any(|change| subscriber.target.is_affected_by(change))
            })
            .cloned()
            .collect();

        for subscriber in affected {
            subscriber.deliver(load);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    fn remove(&self, id: u64) {
        self.lock_subscribers().remove(&id);
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, BTreeMap<u64, Arc<Subscriber>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cancellation handle for one live subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    hub: Weak<WatchHub>,
    subscriber: Arc<Subscriber>,
    released: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.subscriber.active.load(Ordering::SeqCst)
    }

    /// Stops the subscription and unregisters it from the hub.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.subscriber.active.store(false, Ordering::SeqCst);
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
        self.subscriber.wait_for_delivery();
        debug!(
            "event=watch_unsubscribe module=watch status=ok subscription_id={}",
            self.id
        );
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("target", &self.subscriber.target)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Change, Snapshot, SnapshotData, Subscription, WatchHub, WatchTarget};
    use crate::store::{StoreError, StoreResult};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Barrier, Mutex};
    use uuid::Uuid;

    fn invites_snapshot(revision: u64) -> Snapshot {
        Snapshot {
            revision,
            data: SnapshotData::Invites(Vec::new()),
        }
    }

    #[test]
    fn targets_match_only_their_changes() {
        let baby = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert!(WatchTarget::Baby(baby).is_affected_by(&Change::Baby(baby)));
        assert!(!WatchTarget::Baby(baby).is_affected_by(&Change::Baby(other)));
        assert!(!WatchTarget::Baby(baby).is_affected_by(&Change::Events(baby)));
        let inbox = WatchTarget::PendingInvites("a@x.com".to_string());
        assert!(inbox.is_affected_by(&Change::Invites(None)));
        assert!(inbox.is_affected_by(&Change::Invites(Some("a@x.com".to_string()))));
        assert!(!inbox.is_affected_by(&Change::Invites(Some("b@x.com".to_string()))));
    }

    #[test]
    fn publish_skips_stale_revisions_and_stops_after_unsubscribe() {
        let hub = WatchHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_cb = Arc::clone(&seen);
        let (subscription, subscriber) = hub.register(
            WatchTarget::PendingInvites("a@x.com".to_string()),
            Box::new(move |snapshot: Snapshot| {
                seen_in_cb.lock().unwrap().push(snapshot.revision)
            }),
            Box::new(|_: &StoreError| {}),
        );

        let revision = AtomicU64::new(1);
        let load = |_: &WatchTarget| -> StoreResult<Snapshot> {
            Ok(invites_snapshot(revision.load(Ordering::SeqCst)))
        };
        subscriber.deliver(&load);
        hub.publish(&[Change::Invites(None)], &load);
        revision.store(3, Ordering::SeqCst);
        hub.publish(&[Change::Invites(None)], &load);
        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);

        subscription.unsubscribe();
        assert_eq!(hub.subscriber_count(), 0);
        revision.store(4, Ordering::SeqCst);
        subscriber.deliver(&load);
        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
    }

    #[test]
    fn load_errors_reach_error_callback() {
        let hub = WatchHub::new();
        let errors = Arc::new(Mutex::new(0));
        let errors_in_cb = Arc::clone(&errors);
        let (_subscription, subscriber) = hub.register(
            WatchTarget::Events(Uuid::new_v4()),
            Box::new(|_: Snapshot| panic!("no snapshot expected")),
            Box::new(move |_: &StoreError| *errors_in_cb.lock().unwrap() += 1),
        );
        subscriber.deliver(&|_: &WatchTarget| -> StoreResult<Snapshot> {
            Err(StoreError::Unavailable("offline".to_string()))
        });
        assert_eq!(*errors.lock().unwrap(), 1);
    }

    #[test]
    fn dropping_handle_unregisters() {
        let hub = WatchHub::new();
        let (subscription, _subscriber) = hub.register(
            WatchTarget::Baby(Uuid::new_v4()),
            Box::new(|_: Snapshot| {}),
            Box::new(|_: &StoreError| {}),
        );
        assert_eq!(hub.subscriber_count(), 1);
        drop(subscription);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn callbacks_on_two_threads_can_cancel_each_other() {
        let hub = WatchHub::new();
        let barrier = Arc::new(Barrier::new(2));
        let handles: Arc<Mutex<Vec<Option<Subscription>>>> =
            Arc::new(Mutex::new(vec![None, None]));

        let mut subscribers = Vec::new();
        for other in [1usize, 0] {
            let barrier = Arc::clone(&barrier);
            let handles_in_cb = Arc::clone(&handles);
            let (subscription, subscriber) = hub.register(
                WatchTarget::Baby(Uuid::new_v4()),
                Box::new(move |_: Snapshot| {
                    barrier.wait();
                    let taken = handles_in_cb.lock().unwrap()[other].take();
                    if let Some(subscription) = taken {
                        subscription.unsubscribe();
                    }
                }),
                Box::new(|_: &StoreError| {}),
            );
            handles.lock().unwrap()[1 - other] = Some(subscription);
            subscribers.push(subscriber);
        }

        let load = |_: &WatchTarget| -> StoreResult<Snapshot> { Ok(invites_snapshot(1)) };
        std::thread::scope(|scope| {
            for subscriber in &subscribers {
                let load = &load;
                scope.spawn(move || subscriber.deliver(load));
            }
        });

        assert_eq!(hub.subscriber_count(), 0);
        assert!(subscribers
            .iter()
            .all(|subscriber| !subscriber.active.load(Ordering::SeqCst)));
    }
}
