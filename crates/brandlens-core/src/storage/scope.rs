//! Per-user namespacing of storage keys.
//!
//! The underlying media are shared by every account that ever logs in on
//! this machine; suffixing keys with the user id is the only thing keeping
//! their records apart.

use parking_lot::RwLock;

use super::medium::SharedMedium;
use crate::constants::legacy;

/// Resolves the active scoping identity and derives per-user storage keys.
pub struct UserScope {
    current: RwLock<Option<String>>,
    persistent: SharedMedium,
}

impl UserScope {
    pub fn new(persistent: SharedMedium) -> Self {
        Self {
            current: RwLock::new(None),
            persistent,
        }
    }

    pub fn set_current(&self, user_id: &str) {
        *self.current.write() = Some(user_id.to_string());
    }

    pub fn clear_current(&self) {
        *self.current.write() = None;
    }

    /// The active scoping identity: the in-memory current user, else the
    /// legacy plaintext `user_id` entry still sitting in persistent storage
    /// (pre-migration bootstrap). Empty string when neither resolves.
    pub fn current_user_id(&self) -> String {
        if let Some(id) = self.current.read().as_ref() {
            if !id.is_empty() {
                return id.clone();
            }
        }
        self.persistent.get(legacy::USER_ID).unwrap_or_default()
    }

    /// `{base}_{id}` when a user id resolves (an explicit argument wins over
    /// the ambient identity), the unscoped base key otherwise. Pure and
    /// infallible; anonymous/bootstrap callers get the unscoped form.
    pub fn scoped_key(&self, base: &str, explicit: Option<&str>) -> String {
        let id = match explicit {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.current_user_id(),
        };
        if id.is_empty() {
            base.to_string()
        } else {
            format!("{base}_{id}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::medium::{MemoryMedium, StorageMedium};
    use std::sync::Arc;

    fn scope() -> (UserScope, SharedMedium) {
        let medium: SharedMedium = Arc::new(MemoryMedium::new());
        (UserScope::new(medium.clone()), medium)
    }

    #[test]
    fn test_unscoped_when_no_user_resolves() {
        let (scope, _) = scope();
        assert_eq!(scope.scoped_key("analysis_state", None), "analysis_state");
        assert_eq!(scope.current_user_id(), "");
    }

    #[test]
    fn test_explicit_id_wins_over_current() {
        let (scope, _) = scope();
        scope.set_current("u1");
        assert_eq!(scope.scoped_key("k", Some("u2")), "k_u2");
        assert_eq!(scope.scoped_key("k", None), "k_u1");
    }

    #[test]
    fn test_falls_back_to_legacy_persistent_entry() {
        let (scope, medium) = scope();
        medium.set(legacy::USER_ID, "u9");
        assert_eq!(scope.current_user_id(), "u9");
        assert_eq!(scope.scoped_key("k", None), "k_u9");
        // In-memory current takes priority once set.
        scope.set_current("u1");
        assert_eq!(scope.scoped_key("k", None), "k_u1");
        scope.clear_current();
        assert_eq!(scope.scoped_key("k", None), "k_u9");
    }

    #[test]
    fn test_distinct_users_never_collide() {
        let (scope, _) = scope();
        assert_ne!(scope.scoped_key("k", Some("a")), scope.scoped_key("k", Some("b")));
    }
}
