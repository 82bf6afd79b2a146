//! Reconnection supervisor.
//!
//! When a conversation opens while the delivery channel is still
//! connecting, the push subscription has to wait. The supervisor holds at
//! most one such wait: it watches the channel's connection state, runs the
//! subscribe callback on the first connected observation and disarms. If
//! the channel does not come up within the timeout it gives up silently;
//! the conversation still works, only without live updates.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arming {
    /// The channel was connected; the callback already ran.
    Immediate,
    /// A wait was armed.
    Armed,
    /// A wait was already armed; this call changed nothing.
    AlreadyArmed,
}

pub struct ReconnectionSupervisor {
    timeout: Duration,
    armed: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectionSupervisor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            armed: Mutex::new(None),
        }
    }

    /// Run `on_connected` now if the channel is up, otherwise once it comes
    /// up (bounded by the timeout).
    pub fn ensure_subscribed<F>(&self, mut connection: watch::Receiver<bool>, on_connected: F) -> Arming
    where
        F: FnOnce() + Send + 'static,
    {
        if *connection.borrow_and_update() {
            on_connected();
            return Arming::Immediate;
        }

        let Ok(mut armed) = self.armed.lock() else {
            return Arming::AlreadyArmed;
        };
        if armed.as_ref().is_some_and(|h| !h.is_finished()) {
            return Arming::AlreadyArmed;
        }

        let timeout = self.timeout;
        *armed = Some(tokio::spawn(async move {
            match tokio::time::timeout(timeout, connection.wait_for(|up| *up)).await {
                Ok(Ok(_)) => on_connected(),
                Ok(Err(_)) => debug!("Delivery channel dropped while waiting"),
                Err(_) => debug!(?timeout, "Gave up waiting for delivery channel"),
            }
        }));
        Arming::Armed
    }

    pub fn is_armed(&self) -> bool {
        self.armed
            .lock()
            .map(|armed| armed.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Cancel a pending wait, if any.
    pub fn disarm(&self) {
        if let Ok(mut armed) = self.armed.lock() {
            if let Some(handle) = armed.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for ReconnectionSupervisor {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let make = move || {
            let c = c.clone();
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>
        };
        (count, make)
    }

    #[tokio::test]
    async fn test_connected_runs_immediately() {
        let (_tx, rx) = watch::channel(true);
        let supervisor = ReconnectionSupervisor::new(Duration::from_secs(10));
        let (count, make) = counter();

        assert_eq!(supervisor.ensure_subscribed(rx, make()), Arming::Immediate);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!supervisor.is_armed());
    }

    #[tokio::test]
    async fn test_fires_once_on_connect() {
        let (tx, rx) = watch::channel(false);
        let supervisor = ReconnectionSupervisor::new(Duration::from_secs(10));
        let (count, make) = counter();

        assert_eq!(supervisor.ensure_subscribed(rx.clone(), make()), Arming::Armed);
        assert_eq!(supervisor.ensure_subscribed(rx, make()), Arming::AlreadyArmed);
        assert!(supervisor.is_armed());

        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), async {
            while count.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        // Flapping after the first connect does not fire again.
        tx.send_replace(false);
        tx.send_replace(true);
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_timeout() {
        let (tx, rx) = watch::channel(false);
        let supervisor = ReconnectionSupervisor::new(Duration::from_millis(50));
        let (count, make) = counter();

        supervisor.ensure_subscribed(rx, make());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!supervisor.is_armed());

        tx.send_replace(true);
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disarm_cancels_wait() {
        let (tx, rx) = watch::channel(false);
        let supervisor = ReconnectionSupervisor::new(Duration::from_secs(10));
        let (count, make) = counter();

        supervisor.ensure_subscribed(rx, make());
        supervisor.disarm();
        assert!(!supervisor.is_armed());

        tx.send_replace(true);
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
