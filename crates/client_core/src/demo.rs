use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use shared::domain::{Credentials, Family, FamilyId, Identity};
use tokio::sync::{broadcast, Mutex};
use tracing::info;

use crate::{
    backend::{FamilyBackend, Mode, Registration, SessionChange, SessionGrant},
    error::SessionError,
};

const DEMO_FAMILY_NAME: &str = "My Family";

/// In-memory backend used when no identity service is configured.
///
/// Every sign-in succeeds with a fresh synthetic identity. Families live for
/// the lifetime of the backend and are shared by all demo identities.
/// The family seeded on the first activated sign-in is a placeholder: the
/// first family the visitor creates takes its place.
pub struct DemoBackend {
    sign_ins: AtomicU64,
    active: Mutex<Option<Identity>>,
    families: Mutex<DemoFamilies>,
}

#[derive(Default)]
struct DemoFamilies {
    listed: Vec<Family>,
    placeholder: Option<FamilyId>,
}

impl Default for DemoBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoBackend {
    pub fn new() -> Self {
        Self {
            sign_ins: AtomicU64::new(0),
            active: Mutex::new(None),
            families: Mutex::new(DemoFamilies::default()),
        }
    }

    fn next_identity(&self) -> Identity {
        let seq = self.sign_ins.fetch_add(1, Ordering::Relaxed) + 1;
        Identity::new(format!("demo-{}-{seq}", Utc::now().timestamp_millis()))
    }
}

#[async_trait]
impl FamilyBackend for DemoBackend {
    fn mode(&self) -> Mode {
        Mode::Demo
    }

    async fn sign_in(&self, _credentials: &Credentials) -> Result<SessionGrant, SessionError> {
        Ok(SessionGrant::new(self.next_identity()))
    }

    async fn sign_up(&self, _credentials: &Credentials) -> Result<Registration, SessionError> {
        Ok(Registration::Unsupported)
    }

    async fn activate_session(&self, grant: SessionGrant) {
        {
            let mut families = self.families.lock().await;
            if families.listed.is_empty() {
                let family = Family::new(FamilyId::random(), DEMO_FAMILY_NAME);
                info!(family_id = %family.id, "demo: synthesized starter family");
                families.placeholder = Some(family.id.clone());
                families.listed.push(family);
            }
        }
        *self.active.lock().await = Some(grant.identity);
    }

    async fn active_identity(&self) -> Option<Identity> {
        self.active.lock().await.clone()
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        *self.active.lock().await = None;
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Identity>, SessionError> {
        Ok(self.active_identity().await)
    }

    async fn list_families(&self) -> Result<Vec<Family>, SessionError> {
        Ok(self.families.lock().await.listed.clone())
    }

    async fn create_family(
        &self,
        _creator: Option<&Identity>,
        name: &str,
    ) -> Result<Family, SessionError> {
        let family = Family::new(FamilyId::random(), name);
        let mut families = self.families.lock().await;
        if let Some(placeholder) = families.placeholder.take() {
            families.listed.retain(|listed| listed.id != placeholder);
        }
        families.listed.insert(0, family.clone());
        Ok(family)
    }

    fn observe_session_changes(&self) -> Option<broadcast::Receiver<SessionChange>> {
        None
    }
}

#[cfg(test)]
#[path = "tests/demo_tests.rs"]
mod tests;
