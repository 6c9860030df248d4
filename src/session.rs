//! Per-session turn serialization, shared by both engines.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Keyed lock map: one async mutex per session id.
///
/// No ambient "current session": every lookup is keyed by the session
/// id the caller passes in.
#[derive(Default)]
pub(crate) struct SessionLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    /// The lock guarding `session_id`; created on first use.
    pub(crate) fn for_session(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|poisoned| {
            // A panic while holding the map lock cannot corrupt the map
            // itself (insert-only); recover the guard.
            poisoned.into_inner()
        });
        Arc::clone(
            map.entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}
