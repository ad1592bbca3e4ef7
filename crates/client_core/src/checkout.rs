use std::sync::Arc;

use reqwest::Client;
use shared::{
    domain::{find_plan, FamilyId, Identity, PlanId},
    protocol::{CheckoutRequest, CheckoutResponse},
};
use tokio::sync::broadcast;
use tracing::{info, warn};
use url::Url;

use crate::{error::CheckoutError, store::SessionState, Notice};

/// Whatever the presentation layer uses to leave the site.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &Url);
}

/// Hands the chosen plan to the checkout endpoint and follows its redirect.
/// It reads session state but never writes it.
pub struct CheckoutInitiator {
    http: Client,
    endpoint: Url,
    navigator: Arc<dyn Navigator>,
    notices: broadcast::Sender<Notice>,
}

impl CheckoutInitiator {
    pub fn new(
        endpoint: Url,
        navigator: Arc<dyn Navigator>,
        notices: broadcast::Sender<Notice>,
    ) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            navigator,
            notices,
        }
    }

    pub async fn start_for(
        &self,
        plan: &PlanId,
        state: &SessionState,
    ) -> Result<Url, CheckoutError> {
        self.start(
            plan,
            state.current_identity.as_ref(),
            state.current_family.as_ref(),
        )
        .await
    }

    /// Navigates on success; on failure posts a notice and stays put.
    pub async fn start(
        &self,
        plan: &PlanId,
        identity: Option<&Identity>,
        family: Option<&FamilyId>,
    ) -> Result<Url, CheckoutError> {
        match self.request_session(plan, identity, family).await {
            Ok(target) => {
                info!(plan = %plan, target = %target, "checkout: redirecting");
                self.navigator.navigate(&target);
                Ok(target)
            }
            Err(err) => {
                warn!(plan = %plan, error = %err, "checkout: failed");
                let _ = self.notices.send(Notice::CheckoutFailed {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn request_session(
        &self,
        plan: &PlanId,
        identity: Option<&Identity>,
        family: Option<&FamilyId>,
    ) -> Result<Url, CheckoutError> {
        if find_plan(plan).is_none() {
            return Err(CheckoutError::UnknownPlan(plan.to_string()));
        }
        let identity = identity.ok_or(CheckoutError::MissingIdentity)?;
        let family = family.ok_or(CheckoutError::MissingFamily)?;

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&CheckoutRequest {
                plan: plan.to_string(),
                user_id: identity.to_string(),
                family_id: family.to_string(),
            })
            .send()
            .await?;
        let status = response.status();
        let raw = response.text().await?;

        match serde_json::from_str::<CheckoutResponse>(&raw) {
            Ok(CheckoutResponse::Redirect { url }) if status.is_success() => Url::parse(&url)
                .map_err(|_| CheckoutError::UnexpectedResponse(format!("invalid redirect '{url}'"))),
            Ok(CheckoutResponse::Rejected { error }) => Err(CheckoutError::Rejected(error)),
            _ => Err(CheckoutError::UnexpectedResponse(format!(
                "status {status}"
            ))),
        }
    }
}

#[cfg(test)]
#[path = "tests/checkout_tests.rs"]
mod tests;
