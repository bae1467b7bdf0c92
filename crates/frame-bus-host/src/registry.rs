//! Connection registry of attached sub-application frames.

use std::{
    collections::HashMap,
    sync::RwLock,
    time::{SystemTime, UNIX_EPOCH},
};

use frame_bus_core::FrameHandle;

/// One attached sub-application instance.
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    /// Handle for posting messages to the child frame.
    pub frame: FrameHandle,
    /// Identifying key of the sub-application.
    pub app_key: String,
    /// Attach timestamp (Unix epoch seconds).
    pub attached_at: i64,
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Registry of currently attached child frames, keyed by `appKey`.
///
/// One live instance per key: a repeated attach refreshes the entry.
/// Mutated only by the owning host agent.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<String, ConnectionEntry>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a frame under `app_key`, replacing any previous entry.
    pub fn attach(&self, app_key: impl Into<String>, frame: FrameHandle) {
        let app_key = app_key.into();
        let entry = ConnectionEntry {
            frame,
            app_key: app_key.clone(),
            attached_at: now(),
        };
        self.entries.write().unwrap().insert(app_key, entry);
    }

    /// Remove the entry for `app_key`; removal of an unknown key is not an
    /// error. Returns whether an entry existed.
    pub fn detach(&self, app_key: &str) -> bool {
        self.entries.write().unwrap().remove(app_key).is_some()
    }

    #[must_use]
    pub fn contains(&self, app_key: &str) -> bool {
        self.entries.read().unwrap().contains_key(app_key)
    }

    /// Look up the entry for `app_key`.
    #[must_use]
    pub fn get(&self, app_key: &str) -> Option<ConnectionEntry> {
        self.entries.read().unwrap().get(app_key).cloned()
    }

    /// Handles of all attached frames, dropping entries whose frame has
    /// become permanently unreachable.
    #[must_use]
    pub fn handles(&self) -> Vec<FrameHandle> {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|app_key, entry| {
            let open = entry.frame.is_open();
            if !open {
                tracing::debug!(app_key, "pruning unreachable frame");
            }
            open
        });
        entries.values().map(|e| e.frame.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}
