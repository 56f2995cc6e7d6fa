//! Analysis lifecycle state.
//!
//! Single source of truth, shared by every surface in the client, for "is an
//! analysis currently running, and for what resource" — independent of any
//! in-flight network request. The store is an explicit object (constructed
//! per embedder, per test) rather than a process-wide singleton; surfaces
//! observe it through [`AnalysisStore::subscribe`] and reference-equal
//! snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::constants::{ANALYSIS_STATE_KEY, ANALYSIS_TOAST_KEY, FIRST_ANALYSIS_KEY};
use crate::storage::{SharedMedium, UserScope};

/// Persisted per-user analysis record.
///
/// Idle is all-empty; Active carries both `triggered_at` (epoch millis) and
/// `resource_id` — the two are set and cleared together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisState {
    pub is_analyzing: bool,
    pub triggered_at: Option<i64>,
    pub resource_id: Option<String>,
}

impl AnalysisState {
    fn coherent(&self) -> bool {
        self.is_analyzing == self.triggered_at.is_some()
            && self.triggered_at.is_some() == self.resource_id.is_some()
    }
}

type Listener = Box<dyn Fn(&AnalysisState) + Send + Sync>;
type ListenerList = Mutex<Vec<(u64, Listener)>>;

/// Unsubscribes its listener when dropped.
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

pub struct AnalysisStore {
    snapshot: RwLock<Arc<AnalysisState>>,
    listeners: Arc<ListenerList>,
    next_listener_id: AtomicU64,
    scope: Arc<UserScope>,
    medium: SharedMedium,
}

impl AnalysisStore {
    /// Loads the current user's persisted record, defaulting to idle.
    pub fn new(scope: Arc<UserScope>, medium: SharedMedium) -> Self {
        let store = Self {
            snapshot: RwLock::new(Arc::new(AnalysisState::default())),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(0),
            scope,
            medium,
        };
        *store.snapshot.write() = Arc::new(store.load_persisted());
        store
    }

    // ===== Read Access =====

    /// The current state. The returned `Arc` stays the same object until the
    /// next mutation, so consumers can change-detect by reference equality.
    pub fn snapshot(&self) -> Arc<AnalysisState> {
        self.snapshot.read().clone()
    }

    /// True when nothing is recorded to be stale against, or when `timestamp`
    /// strictly postdates the recorded trigger.
    pub fn is_newer_than(&self, timestamp: i64) -> bool {
        match self.snapshot.read().triggered_at {
            None => true,
            Some(triggered_at) => timestamp > triggered_at,
        }
    }

    /// Registers a listener called on every state change. Dropping the
    /// returned [`Subscription`] unregisters it. Listener call order across
    /// subscribers is unspecified.
    pub fn subscribe(&self, listener: impl Fn(&AnalysisState) + Send + Sync + 'static) -> Subscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Box::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    // ===== Lifecycle Transitions =====

    /// Idle → Active. Repeated calls simply overwrite the trigger timestamp
    /// and resource.
    pub fn start_analysis(&self, resource_id: &str) {
        let state = AnalysisState {
            is_analyzing: true,
            triggered_at: Some(Utc::now().timestamp_millis()),
            resource_id: Some(resource_id.to_string()),
        };
        self.persist(&state);
        // A fresh run must be announced again when it completes.
        self.medium.remove(&self.scope.scoped_key(ANALYSIS_TOAST_KEY, None));
        self.replace(state);
    }

    /// Active → Idle, normal success path. A no-op on an already-idle store.
    pub fn complete_analysis(&self) {
        let state = AnalysisState::default();
        self.persist(&state);
        self.replace(state);
    }

    /// Explicit reset (logout cleanup, stale-state recovery): drops the
    /// persisted record entirely instead of persisting an idle one.
    pub fn clear_analysis_state(&self) {
        self.medium.remove(&self.scope.scoped_key(ANALYSIS_STATE_KEY, None));
        self.replace(AnalysisState::default());
    }

    // ===== Re-scoping =====

    /// Login hook: re-scopes the store to `user_id` and reloads that user's
    /// persisted record, so a genuinely in-flight analysis resumes across a
    /// logout/login cycle on the same machine.
    pub fn set_user_id(&self, user_id: &str) {
        self.scope.set_current(user_id);
        let state = self.load_persisted();
        self.replace(state);
    }

    /// Logout hook: resets the in-memory state to idle without touching the
    /// persisted record, which stays resumable for the next login.
    pub fn clear_user_id(&self) {
        self.scope.clear_current();
        self.replace(AnalysisState::default());
    }

    // ===== Per-user Flags =====

    /// Seeds the "user has not yet watched the pipeline screen" flag.
    pub fn set_first_analysis(&self, pending: bool) {
        let key = self.scope.scoped_key(FIRST_ANALYSIS_KEY, None);
        self.medium.set(&key, if pending { "1" } else { "0" });
    }

    pub fn first_analysis_pending(&self) -> bool {
        let key = self.scope.scoped_key(FIRST_ANALYSIS_KEY, None);
        self.medium.get(&key).as_deref() == Some("1")
    }

    /// Permanently flips the flag once the pipeline screen has been viewed.
    pub fn mark_pipeline_viewed(&self) {
        let key = self.scope.scoped_key(FIRST_ANALYSIS_KEY, None);
        self.medium.set(&key, "0");
    }

    /// Whether the completion of the current run has already been announced.
    /// Cleared by [`start_analysis`](Self::start_analysis).
    pub fn completion_announced(&self) -> bool {
        let key = self.scope.scoped_key(ANALYSIS_TOAST_KEY, None);
        self.medium.get(&key).is_some()
    }

    pub fn mark_completion_announced(&self) {
        let key = self.scope.scoped_key(ANALYSIS_TOAST_KEY, None);
        self.medium.set(&key, "1");
    }

    // ===== Persistence =====

    fn persist(&self, state: &AnalysisState) {
        let key = self.scope.scoped_key(ANALYSIS_STATE_KEY, None);
        if let Ok(json) = serde_json::to_string(state) {
            self.medium.set(&key, &json);
        }
    }

    fn load_persisted(&self) -> AnalysisState {
        let key = self.scope.scoped_key(ANALYSIS_STATE_KEY, None);
        let Some(raw) = self.medium.get(&key) else {
            return AnalysisState::default();
        };
        match serde_json::from_str::<AnalysisState>(&raw) {
            Ok(state) if state.coherent() => state,
            Ok(_) => {
                tracing::info!(%key, "persisted analysis record is incoherent, resetting to idle");
                AnalysisState::default()
            }
            Err(error) => {
                tracing::info!(%key, %error, "discarding malformed persisted analysis record");
                AnalysisState::default()
            }
        }
    }

    fn replace(&self, next: AnalysisState) {
        let snapshot = Arc::new(next);
        *self.snapshot.write() = snapshot.clone();
        for (_, listener) in self.listeners.lock().iter() {
            listener(&snapshot);
        }
    }
}
