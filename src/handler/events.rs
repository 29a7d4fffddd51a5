// src/handler/events.rs
// One-shot broadcast events for cross-task coordination

use std::sync::Arc;
use tokio::sync::watch;

/// A level-triggered, set-once event with any number of waiters.
///
/// Backed by a watch channel so waiters suspend instead of polling.
/// `set` is monotone for the events that start unset; `connection_alive`
/// uses the inverse direction (starts set, cleared once on disconnect).
#[derive(Clone, Debug)]
pub struct Event {
    tx: Arc<watch::Sender<bool>>,
}

impl Event {
    pub fn new() -> Self {
        Self::with_value(false)
    }

    /// An event that starts in the set state (used for connection liveness).
    pub fn new_set() -> Self {
        Self::with_value(true)
    }

    fn with_value(value: bool) -> Self {
        let (tx, _rx) = watch::channel(value);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    /// Transition to the unset state. Only meaningful for `new_set` events.
    pub fn clear(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the event is set. Returns immediately if already set.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as self, so `changed` cannot fail here.
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Wait until the event is cleared. Used by tasks that watch for
    /// connection loss.
    pub async fn wait_cleared(&self) {
        let mut rx = self.tx.subscribe();
        while *rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn set_wakes_waiters() {
        let event = Event::new();
        assert!(!event.is_set());

        let waiter = {
            let event = event.clone();
            tokio::spawn(async move { event.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        event.set();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should complete")
            .unwrap();
        assert!(event.is_set());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_already_set() {
        let event = Event::new();
        event.set();
        tokio::time::timeout(Duration::from_millis(50), event.wait())
            .await
            .expect("wait should not block");
    }

    #[tokio::test]
    async fn clear_once_semantics() {
        let alive = Event::new_set();
        assert!(alive.is_set());
        alive.clear();
        assert!(!alive.is_set());
        tokio::time::timeout(Duration::from_millis(50), alive.wait_cleared())
            .await
            .expect("wait_cleared should not block after clear");
    }
}
