//! State holder with an explicit subscriber list.
//!
//! A [`StateChannel`] owns the current [`SessionState`] and fans every change
//! out to two kinds of consumers:
//!
//! - callback observers registered with [`StateChannel::subscribe`], invoked
//!   synchronously on the publishing task, and
//! - async receivers from [`StateChannel::watch`].
//!
//! A new observer is called once with the current snapshot on subscribe and
//! afterwards only when the state actually changes. Registration and
//! publication share one lock, so an observer can never miss the update that
//! raced with its registration.
//!
//! Observers must not publish or subscribe from inside the callback; reading
//! the snapshot is fine.

use smartcare_types::SessionState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tracing::trace;

type Observer = Arc<dyn Fn(&SessionState) + Send + Sync>;

#[derive(Default)]
struct ObserverList {
    next_id: u64,
    entries: Vec<(u64, Observer)>,
}

/// Owned session state plus its subscribers.
pub struct StateChannel {
    tx: watch::Sender<SessionState>,
    observers: Arc<Mutex<ObserverList>>,
    publish: Mutex<()>,
}

impl StateChannel {
    pub fn new(initial: SessionState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            tx,
            observers: Arc::new(Mutex::new(ObserverList::default())),
            publish: Mutex::new(()),
        }
    }

    /// Synchronous snapshot of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    /// Async receiver; the current value counts as already seen.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Register a callback. It is invoked immediately with the current
    /// snapshot, then on every change until the returned handle is dropped
    /// or [`Subscription::unsubscribe`] is called.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        let observer: Observer = Arc::new(observer);
        let _publishing = lock(&self.publish);

        let id = {
            let mut list = lock(&self.observers);
            list.next_id += 1;
            let id = list.next_id;
            list.entries.push((id, observer.clone()));
            id
        };

        let current = self.snapshot();
        observer(&current);

        Subscription {
            id,
            observers: Arc::downgrade(&self.observers),
        }
    }

    /// Number of registered callback observers.
    pub fn observer_count(&self) -> usize {
        lock(&self.observers).entries.len()
    }

    /// Replace the state and notify subscribers. Returns `false` (and notifies
    /// nobody) when `next` equals the current state.
    pub(crate) fn publish(&self, next: SessionState) -> bool {
        let _publishing = lock(&self.publish);

        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        });
        if !changed {
            trace!(status = %next.status(), "state unchanged; nothing published");
            return false;
        }

        let observers: Vec<Observer> = lock(&self.observers)
            .entries
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        trace!(status = %next.status(), observers = observers.len(), "publishing state");
        for observer in observers {
            observer(&next);
        }
        true
    }
}

/// Cancellation handle for a callback observer.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    observers: Weak<Mutex<ObserverList>>,
}

impl Subscription {
    /// Stop receiving notifications.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }

    fn release(&self) {
        if let Some(observers) = self.observers.upgrade() {
            lock(&observers).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartcare_types::{Identity, SessionStatus};

    fn recorder(channel: &StateChannel) -> (Arc<Mutex<Vec<SessionStatus>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = channel.subscribe(move |state| sink.lock().unwrap().push(state.status()));
        (seen, sub)
    }

    #[test]
    fn test_subscriber_gets_snapshot_then_changes() {
        let channel = StateChannel::new(SessionState::Loading);
        let (seen, _sub) = recorder(&channel);

        assert!(channel.publish(SessionState::Unauthenticated));
        assert!(!channel.publish(SessionState::Unauthenticated));
        assert!(channel.publish(SessionState::AuthenticatedNoProfile {
            identity: Identity::new("u-1", "a@b.com"),
        }));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                SessionStatus::Loading,
                SessionStatus::Unauthenticated,
                SessionStatus::AuthenticatedNoProfile,
            ]
        );
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let channel = StateChannel::new(SessionState::Loading);
        let (seen, sub) = recorder(&channel);
        assert_eq!(channel.observer_count(), 1);

        sub.unsubscribe();
        assert_eq!(channel.observer_count(), 0);

        channel.publish(SessionState::Unauthenticated);
        assert_eq!(*seen.lock().unwrap(), vec![SessionStatus::Loading]);
    }

    #[test]
    fn test_subscription_outliving_channel_is_harmless() {
        let channel = StateChannel::new(SessionState::Loading);
        let (_seen, sub) = recorder(&channel);
        drop(channel);
        drop(sub);
    }

    #[tokio::test]
    async fn test_watch_receiver_sees_latest() {
        let channel = StateChannel::new(SessionState::Loading);
        let mut rx = channel.watch();
        assert!(!rx.has_changed().unwrap());

        channel.publish(SessionState::Unauthenticated);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), SessionState::Unauthenticated);
    }
}
