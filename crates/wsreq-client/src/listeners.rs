//! One-shot event listeners.
//!
//! A listener fires at most once and is detached when its [`ListenerGuard`]
//! drops, whichever of {event, timeout} wins. Events that arrive while no
//! listener is attached are dropped; there is no buffering.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use wsreq_core::ListenerId;

#[derive(Default)]
struct Inner {
    by_event: HashMap<String, Vec<(ListenerId, oneshot::Sender<Value>)>>,
    closed: bool,
}

/// Pending one-shot listeners of one connection.
#[derive(Default)]
pub struct ListenerSet {
    inner: Mutex<Inner>,
}

impl ListenerSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a one-shot listener for `event`.
    ///
    /// On a closed set the receiver resolves immediately with an error.
    pub fn once(self: &Arc<Self>, event: &str) -> (ListenerGuard, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        let id = ListenerId::new();
        {
            let mut inner = self.inner.lock();
            if !inner.closed {
                inner
                    .by_event
                    .entry(event.to_owned())
                    .or_default()
                    .push((id.clone(), tx));
            }
        }
        let guard = ListenerGuard {
            set: Arc::clone(self),
            event: event.to_owned(),
            id,
        };
        (guard, rx)
    }

    /// Deliver `data` to every listener waiting on `event`, detaching them.
    ///
    /// Returns how many listeners received it.
    pub fn dispatch(&self, event: &str, data: Value) -> usize {
        let waiters = self.inner.lock().by_event.remove(event).unwrap_or_default();
        let mut delivered = 0;
        for (_, tx) in waiters {
            if tx.send(data.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Drop every pending listener and refuse new ones.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.by_event.clear();
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of attached listeners.
    pub fn len(&self) -> usize {
        self.inner.lock().by_event.values().map(Vec::len).sum()
    }

    /// Whether no listener is attached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn detach(&self, event: &str, id: &ListenerId) {
        let mut inner = self.inner.lock();
        if let Some(list) = inner.by_event.get_mut(event) {
            list.retain(|(lid, _)| lid != id);
            if list.is_empty() {
                let _ = inner.by_event.remove(event);
            }
        }
    }
}

/// Detaches its listener on drop.
pub struct ListenerGuard {
    set: Arc<ListenerSet>,
    event: String,
    id: ListenerId,
}

impl ListenerGuard {
    /// Event this guard listens on.
    pub fn event(&self) -> &str {
        &self.event
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.set.detach(&self.event, &self.id);
    }
}
