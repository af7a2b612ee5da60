/// Cancellation handles and the process-wide registry of pending timers and
/// in-flight upstream requests.
///
/// Every sleep and every upstream call of a poll task is tracked here while it
/// is pending. Teardown fires the tracked handles, which makes the pending
/// future resolve as cancelled instead of producing a late result.
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::models::InstanceId;

/// Creates a connected handle/token pair
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Fires a cancellation; consumed on use so it can only fire once
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(self) {
        self.tx.send_replace(true);
    }
}

/// Observes a [`CancelHandle`]
///
/// Dropping the handle without firing it leaves the token uncancelled forever.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the handle fires
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Runs `fut` to completion unless the handle fires first
    ///
    /// An already-fired token never polls `fut`.
    pub async fn run_until_cancelled<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = fut => Some(output),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Timer,
    Request,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntryKey {
    instance_id: InstanceId,
    seq: u64,
}

type Entries = HashMap<EntryKey, CancelHandle>;

/// Number of handles fired by a teardown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancelSummary {
    pub timers: usize,
    pub requests: usize,
}

/// Pending timers and in-flight requests of every instance in the process
///
/// Instances only add and remove their own entries; teardown drains entries
/// out of the maps before firing them, so each handle fires at most once.
#[derive(Debug, Default)]
pub struct Registry {
    timers: Mutex<Entries>,
    requests: Mutex<Entries>,
    next_seq: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new pending entry; it is removed again when the returned
    /// guard is dropped, whether or not the guarded work succeeded.
    pub fn track(self: &Arc<Self>, kind: EntryKind, instance_id: &InstanceId) -> Tracked {
        let (handle, token) = cancel_pair();
        let key = EntryKey {
            instance_id: instance_id.clone(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };

        self.entries(kind).insert(key.clone(), handle);

        Tracked {
            registry: Arc::clone(self),
            kind,
            key,
            token,
        }
    }

    pub fn pending(&self, kind: EntryKind) -> usize {
        self.entries(kind).len()
    }

    /// Fires and removes every entry belonging to one instance
    pub fn cancel_instance(&self, instance_id: &InstanceId) -> CancelSummary {
        let drain = |kind: EntryKind| -> Vec<CancelHandle> {
            let mut entries = self.entries(kind);
            let keys: Vec<EntryKey> = entries
                .keys()
                .filter(|key| &key.instance_id == instance_id)
                .cloned()
                .collect();
            keys.iter().filter_map(|key| entries.remove(key)).collect()
        };

        fire(drain(EntryKind::Timer), drain(EntryKind::Request))
    }

    /// Fires every entry of every instance and clears both registries
    pub fn cancel_all(&self) -> CancelSummary {
        let timers: Vec<CancelHandle> =
            self.entries(EntryKind::Timer).drain().map(|(_, h)| h).collect();
        let requests: Vec<CancelHandle> =
            self.entries(EntryKind::Request).drain().map(|(_, h)| h).collect();

        fire(timers, requests)
    }

    fn entries(&self, kind: EntryKind) -> MutexGuard<'_, Entries> {
        let entries = match kind {
            EntryKind::Timer => &self.timers,
            EntryKind::Request => &self.requests,
        };
        entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn fire(timers: Vec<CancelHandle>, requests: Vec<CancelHandle>) -> CancelSummary {
    let summary = CancelSummary {
        timers: timers.len(),
        requests: requests.len(),
    };

    for handle in timers.into_iter().chain(requests) {
        handle.cancel();
    }

    summary
}

/// Registration guard for one pending timer or request
#[derive(Debug)]
pub struct Tracked {
    registry: Arc<Registry>,
    kind: EntryKind,
    key: EntryKey,
    token: CancelToken,
}

impl Tracked {
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.registry.entries(self.kind).remove(&self.key);
    }
}
