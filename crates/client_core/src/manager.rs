use std::sync::{Arc, Weak};

use futures::StreamExt;
use shared::domain::{Credentials, Family, FamilyId, Identity};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, info, warn};

use crate::{
    backend::{FamilyBackend, Mode, Registration, SessionChange, SessionGrant, SignUpOutcome},
    error::SessionError,
    store::{SessionState, SessionStore},
    Notice,
};

/// Owns the session-change feed task; aborting it stops any further
/// notification from reaching the store.
pub struct SessionWatch {
    task: JoinHandle<()>,
}

impl SessionWatch {
    pub fn dispose(self) {
        self.task.abort();
    }
}

impl Drop for SessionWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct ManagerState {
    /// Bumped by sign-out, signed-out notifications and shutdown.
    session_generation: u64,
    /// Bumped whenever the identity in the store changes.
    identity_generation: u64,
    closed: bool,
    watch: Option<SessionWatch>,
}

/// Identity and family orchestration on top of one [`FamilyBackend`].
///
/// Store writes happen only while `inner` is held, so a result computed
/// against an older generation is detected and dropped instead of applied.
pub struct FamilyManager {
    backend: Arc<dyn FamilyBackend>,
    store: SessionStore,
    notices: broadcast::Sender<Notice>,
    inner: Mutex<ManagerState>,
}

impl FamilyManager {
    pub fn new(store: SessionStore, backend: Arc<dyn FamilyBackend>) -> Arc<Self> {
        let (notices, _) = broadcast::channel(64);
        Arc::new(Self {
            backend,
            store,
            notices,
            inner: Mutex::new(ManagerState {
                session_generation: 0,
                identity_generation: 0,
                closed: false,
                watch: None,
            }),
        })
    }

    pub fn mode(&self) -> Mode {
        self.backend.mode()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn notice_sender(&self) -> broadcast::Sender<Notice> {
        self.notices.clone()
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    async fn session_generation(&self) -> Result<u64, SessionError> {
        let inner = self.inner.lock().await;
        if inner.closed {
            return Err(SessionError::Precondition("session manager is shut down".into()));
        }
        Ok(inner.session_generation)
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Identity, SessionError> {
        let session_generation = self.session_generation().await?;
        info!(mode = %self.mode(), email = %credentials.email, "session: signing in");

        let grant = self.backend.sign_in(credentials).await.inspect_err(|err| {
            warn!(mode = %self.mode(), error = %err, "session: sign in failed");
        })?;

        let identity = grant.identity.clone();
        if self
            .adopt_identity(identity.clone(), session_generation, Some(grant))
            .await
        {
            info!(user_id = %identity, "session: signed in");
        }
        Ok(identity)
    }

    /// Never authenticates by itself; a session the service issues on
    /// sign-up is activated in the backend and arrives through the
    /// session-change feed.
    pub async fn sign_up(&self, credentials: &Credentials) -> Result<SignUpOutcome, SessionError> {
        let session_generation = self.session_generation().await?;
        let registration = self.backend.sign_up(credentials).await.inspect_err(|err| {
            warn!(error = %err, "session: sign up failed");
        })?;

        Ok(match registration {
            Registration::Session(grant) => {
                let identity = grant.identity.clone();
                if self.activate_if_current(grant, session_generation).await {
                    info!(user_id = %identity, "session: registered");
                } else {
                    debug!(user_id = %identity, "session: discarding stale registration");
                }
                SignUpOutcome::Registered(identity)
            }
            Registration::PendingConfirmation { email } => {
                info!(email = %email, "session: registration awaiting confirmation");
                self.notify(Notice::SignUpPending {
                    email: email.clone(),
                });
                SignUpOutcome::PendingConfirmation { email }
            }
            Registration::Unsupported => {
                self.notify(Notice::SignUpUnsupported);
                SignUpOutcome::Unsupported
            }
        })
    }

    /// Local state is torn down even when the service call fails. The lock
    /// is held until the remote session is gone, so a sign-in resolving
    /// meanwhile cannot be activated and then logged out.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        self.reset_session(&mut inner);
        info!(mode = %self.mode(), "session: signed out");
        self.backend.sign_out().await.inspect_err(|err| {
            warn!(error = %err, "session: remote sign out failed");
        })
    }

    /// Applies an already established session, if the backend holds one.
    pub async fn restore_session(&self) -> Result<Option<Identity>, SessionError> {
        let session_generation = self.session_generation().await?;
        let Some(identity) = self.backend.current_session().await? else {
            return Ok(None);
        };
        if self
            .adopt_identity(identity.clone(), session_generation, None)
            .await
        {
            info!(user_id = %identity, "session: restored");
        }
        Ok(Some(identity))
    }

    /// Errors are reported as a notice and yield an empty list; the store
    /// keeps its previous families.
    pub async fn list_families(&self) -> Vec<Family> {
        let identity_generation = self.inner.lock().await.identity_generation;
        self.reload_families(identity_generation, None)
            .await
            .unwrap_or_default()
    }

    pub async fn create_family(&self, name: &str) -> Result<Family, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::Validation(
                "family name must not be empty".into(),
            ));
        }

        let (identity, identity_generation) = {
            let inner = self.inner.lock().await;
            if inner.closed {
                return Err(SessionError::Precondition("session manager is shut down".into()));
            }
            (
                self.store.snapshot().current_identity,
                inner.identity_generation,
            )
        };

        let family = self
            .backend
            .create_family(identity.as_ref(), name)
            .await
            .inspect_err(|err| warn!(error = %err, "families: create failed"))?;
        info!(family_id = %family.id, name = %family.name, "families: created");

        if let Err(err) = self
            .reload_families(identity_generation, Some(family.clone()))
            .await
        {
            debug!(family_id = %family.id, error = %err, "families: showing created family without reload");
        }
        Ok(family)
    }

    /// Unknown ids are ignored. Returns whether the selection was applied.
    pub async fn select_family(&self, id: &FamilyId) -> bool {
        let _inner = self.inner.lock().await;
        if !self.store.snapshot().contains_family(id) {
            debug!(family_id = %id, "families: ignoring selection of unknown family");
            return false;
        }
        self.store.set_current_family(Some(id.clone()));
        true
    }

    /// Starts applying the backend's session-change feed. Returns `false`
    /// when the backend has no feed.
    pub async fn observe_session_changes(self: &Arc<Self>) -> bool {
        let Some(changes) = self.backend.observe_session_changes() else {
            return false;
        };
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return false;
        }

        let manager = Arc::downgrade(self);
        let task = tokio::spawn(watch_session_changes(manager, changes));
        if let Some(previous) = inner.watch.replace(SessionWatch { task }) {
            previous.dispose();
        }
        true
    }

    pub async fn is_observing(&self) -> bool {
        self.inner.lock().await.watch.is_some()
    }

    /// Stops the session feed and discards every response still in flight.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        inner.session_generation += 1;
        inner.identity_generation += 1;
        if let Some(watch) = inner.watch.take() {
            watch.dispose();
        }
        info!("session: manager shut down");
    }

    /// Notifications are hints: each one is checked against the backend's
    /// active session, so a notification overtaken by a later sign-in or
    /// sign-out is dropped.
    async fn apply_session_change(&self, change: SessionChange) {
        let Some(identity) = change.identity().cloned() else {
            let mut inner = self.inner.lock().await;
            if inner.closed || self.backend.active_identity().await.is_some() {
                debug!("session: ignoring superseded sign-out notification");
                return;
            }
            if self.store.snapshot() != SessionState::default() {
                self.reset_session(&mut inner);
                info!("session: signed out by service");
            }
            return;
        };

        let session_generation = {
            let inner = self.inner.lock().await;
            if inner.closed || self.store.snapshot().current_identity.as_ref() == Some(&identity) {
                return;
            }
            inner.session_generation
        };
        info!(user_id = %identity, "session: identity changed by service");
        self.adopt_identity(identity, session_generation, None).await;
    }

    fn reset_session(&self, inner: &mut ManagerState) {
        inner.session_generation += 1;
        inner.identity_generation += 1;
        self.store.reset();
    }

    async fn activate_if_current(&self, grant: SessionGrant, session_generation: u64) -> bool {
        let inner = self.inner.lock().await;
        if inner.closed || inner.session_generation != session_generation {
            return false;
        }
        self.backend.activate_session(grant).await;
        true
    }

    /// Store the identity, then reload its families. A `grant` is activated
    /// in the backend in the same critical section; without one the identity
    /// must already be the backend's active session. Returns `false` when the
    /// session moved on while the identity was being resolved.
    async fn adopt_identity(
        &self,
        identity: Identity,
        session_generation: u64,
        grant: Option<SessionGrant>,
    ) -> bool {
        let identity_generation = {
            let mut inner = self.inner.lock().await;
            if inner.closed || inner.session_generation != session_generation {
                debug!(user_id = %identity, "session: discarding stale identity");
                return false;
            }
            match grant {
                Some(grant) => self.backend.activate_session(grant).await,
                None => {
                    if self.backend.active_identity().await.as_ref() != Some(&identity) {
                        debug!(user_id = %identity, "session: discarding superseded identity");
                        return false;
                    }
                }
            }
            if self.store.snapshot().current_identity.as_ref() != Some(&identity) {
                inner.identity_generation += 1;
                self.store.set_identity(Some(identity));
            }
            inner.identity_generation
        };

        if let Err(err) = self.reload_families(identity_generation, None).await {
            debug!(error = %err, "session: identity applied without families");
        }
        true
    }

    /// Fetches the family list and applies it with the selection rule:
    /// `pin` if given, else the current family if still listed, else the
    /// most recent one.
    async fn reload_families(
        &self,
        identity_generation: u64,
        pin: Option<Family>,
    ) -> Result<Vec<Family>, SessionError> {
        let fetched = self.backend.list_families().await;

        let inner = self.inner.lock().await;
        let stale = inner.closed || inner.identity_generation != identity_generation;

        let mut families = match fetched {
            Ok(families) => families,
            Err(err) => {
                warn!(error = %err, "families: reload failed");
                if !stale {
                    self.notify(Notice::error(&err));
                    if let Some(pinned) = pin {
                        let mut families = self.store.snapshot().visible_families;
                        families.retain(|family| family.id != pinned.id);
                        families.insert(0, pinned.clone());
                        self.store.replace_families(families, Some(pinned.id));
                    }
                }
                return Err(err);
            }
        };

        if stale {
            debug!(count = families.len(), "families: reload discarded");
            return Ok(families);
        }

        if let Some(pinned) = &pin {
            if !families.iter().any(|family| family.id == pinned.id) {
                families.insert(0, pinned.clone());
            }
        }

        let current = self.store.snapshot().current_family;
        let listed = |id: &FamilyId| families.iter().any(|family| &family.id == id);
        let selection = pin
            .map(|family| family.id)
            .or_else(|| current.filter(|id| listed(id)))
            .or_else(|| families.first().map(|family| family.id.clone()));

        debug!(count = families.len(), selected = ?selection, "families: reloaded");
        self.store.replace_families(families.clone(), selection);
        Ok(families)
    }
}

async fn watch_session_changes(
    manager: Weak<FamilyManager>,
    changes: broadcast::Receiver<SessionChange>,
) {
    let mut changes = BroadcastStream::new(changes);
    while let Some(change) = changes.next().await {
        let Some(manager) = manager.upgrade() else {
            return;
        };
        match change {
            Ok(change) => manager.apply_session_change(change).await,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "session: change feed lagged");
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/manager_tests.rs"]
mod tests;
