use std::sync::Arc;

use shared::domain::{Family, FamilyId, Identity};
use tokio::sync::watch;

/// Snapshot of who is signed in and which family they are looking at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub current_identity: Option<Identity>,
    pub current_family: Option<FamilyId>,
    /// Most recently created first.
    pub visible_families: Vec<Family>,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.current_identity.is_some()
    }

    pub fn contains_family(&self, id: &FamilyId) -> bool {
        self.visible_families.iter().any(|family| &family.id == id)
    }

    pub fn selected_family(&self) -> Option<&Family> {
        let id = self.current_family.as_ref()?;
        self.visible_families.iter().find(|family| &family.id == id)
    }
}

/// Holder of the shared [`SessionState`].
///
/// Readers take snapshots or subscribe; every mutation publishes the whole new
/// state at once, so a subscriber can never observe a half-applied change.
/// Mutators are crate-private: only the manager writes here.
#[derive(Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<SessionState>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    /// Dropping the receiver is the unsubscribe.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// A different identity invalidates the family list it was loaded for,
    /// and the selection with it.
    pub(crate) fn set_identity(&self, identity: Option<Identity>) {
        self.tx.send_modify(|state| {
            if state.current_identity != identity {
                state.visible_families.clear();
                state.current_family = None;
            }
            state.current_identity = identity;
        });
    }

    pub(crate) fn set_current_family(&self, family: Option<FamilyId>) {
        self.tx.send_modify(|state| state.current_family = family);
    }

    pub(crate) fn replace_families(&self, families: Vec<Family>, selection: Option<FamilyId>) {
        self.tx.send_modify(|state| {
            state.visible_families = families;
            state.current_family = selection;
        });
    }

    pub(crate) fn reset(&self) {
        self.tx.send_replace(SessionState::default());
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
