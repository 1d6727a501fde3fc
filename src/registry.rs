//! The watcher registry (spec §4.5, §5): the process-wide
//! `accountId → Watcher` map. All mutation is routed through this
//! single owner so attach/detach/start/stop/delete never race each
//! other directly on the map (spec §9: "avoid ad-hoc locking per
//! field; prefer the Watcher owns its state, interactions are
//! messages").

use crate::config::MasterKey;
use crate::error::Result;
use crate::store::AccountStore;
use crate::watcher::{self, PushEvent, Subscriber, WatcherHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

/// Shared handle to the registry, cloned into every HTTP handler.
#[derive(Clone)]
pub struct Registry {
    watchers: Arc<Mutex<HashMap<String, WatcherHandle>>>,
    // Per-account async guards serializing `ensure_started` (spec §5:
    // "serialize mutations -- either by per-key locking or by routing
    // all mutations through a single owner task"; invariant I1: at
    // most one Watcher per accountId).
    start_locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
    store: Arc<dyn AccountStore>,
    master: MasterKey,
}

impl Registry {
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>, master: MasterKey) -> Self {
        Self {
            watchers: Arc::new(Mutex::new(HashMap::new())),
            start_locks: Arc::new(Mutex::new(HashMap::new())),
            store,
            master,
        }
    }

    /// Ensure a Watcher is running for `account_id`, spawning one from
    /// the account's decrypted IMAP settings if none exists yet (spec
    /// §4.5 `attach`, and the explicit `watch/start` endpoint).
    ///
    /// The check-spawn-insert sequence is serialized per account: two
    /// concurrent callers for the same account (e.g. two clients both
    /// opening the SSE stream) must never both spawn a Watcher.
    pub async fn ensure_started(&self, account_id: &str) -> Result<WatcherHandle> {
        if let Some(handle) = self.handle_for(account_id) {
            return Ok(handle);
        }

        let start_lock = self.start_lock_for(account_id);
        let _guard = start_lock.lock().await;

        // Re-check now that we hold the per-account guard: another
        // caller may have finished starting the Watcher while we were
        // waiting for the lock.
        if let Some(handle) = self.handle_for(account_id) {
            return Ok(handle);
        }

        let (secret, _tenant_id) = self.store.load_secret(account_id, &self.master).await?;

        let watchers = Arc::clone(&self.watchers);
        let spawned_id = account_id.to_string();
        let handle = watcher::spawn(account_id.to_string(), secret.imap, move |id| {
            info!(account = %id, "watcher task stopped, removing from registry");
            watchers.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(id);
        });

        self.watchers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(spawned_id, handle.clone());
        Ok(handle)
    }

    fn handle_for(&self, account_id: &str) -> Option<WatcherHandle> {
        self.watchers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(account_id)
            .cloned()
    }

    fn start_lock_for(&self, account_id: &str) -> Arc<AsyncMutex<()>> {
        self.start_locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Attach a subscriber, starting the Watcher if needed (spec §4.5
    /// `attach`: ensure Watcher, add handle, cancel any pending idle
    /// tear-down, send `SSEReady` to the new handle synchronously,
    /// before the handler task yields further (spec §5)).
    pub async fn attach(&self, account_id: &str, subscriber: Subscriber) -> Result<()> {
        let handle = self.ensure_started(account_id).await?;
        let _ = subscriber.tx.send(PushEvent::SseReady {
            account_id: account_id.to_string(),
        });
        handle.attach(subscriber);
        Ok(())
    }

    /// Detach a subscriber by id; a no-op if no Watcher is running.
    pub fn detach(&self, account_id: &str, subscriber_id: u64) {
        if let Some(handle) = self.handle_for(account_id) {
            handle.detach(subscriber_id);
        }
    }

    /// Explicit `watch/stop`: ask the Watcher to tear itself down. The
    /// registry entry is removed by the Watcher's own `on_stopped`
    /// callback once teardown completes, not here.
    pub fn stop(&self, account_id: &str) {
        if let Some(handle) = self.handle_for(account_id) {
            handle.stop();
        }
    }

    /// Account delete cancels any running Watcher before the caller
    /// removes the record (spec §5).
    pub fn stop_and_forget(&self, account_id: &str) {
        self.stop(account_id);
    }
}
