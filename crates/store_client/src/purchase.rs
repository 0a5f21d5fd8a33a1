use std::{sync::Arc, time::Duration};

use reqwest::Client;
use shared::{
    domain::{OrderId, Session, Sku},
    protocol::{PurchaseRequest, PurchaseToken},
};
use tracing::{error, info};

use crate::{config::StoreSettings, error::StoreError, PurchaseUiLauncher};

const TOKEN_FUNCTION: &str = "getXsollaPaymentToken";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseSettings {
    pub token_endpoint_base: String,
    pub return_url: String,
    pub sandbox: bool,
    pub request_timeout: Option<Duration>,
}

impl From<&StoreSettings> for PurchaseSettings {
    fn from(settings: &StoreSettings) -> Self {
        Self {
            token_endpoint_base: settings.token_endpoint_base.clone(),
            return_url: settings.return_url.clone(),
            sandbox: settings.sandbox,
            request_timeout: settings.token_request_timeout(),
        }
    }
}

pub struct PurchaseInitiator {
    http: Client,
    endpoint: String,
    return_url: String,
    sandbox: bool,
    launcher: Arc<dyn PurchaseUiLauncher>,
}

impl PurchaseInitiator {
    pub fn new(
        settings: PurchaseSettings,
        launcher: Arc<dyn PurchaseUiLauncher>,
    ) -> Result<Self, StoreError> {
        let mut builder = Client::builder();
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|err| StoreError::Config(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}/{TOKEN_FUNCTION}",
                settings.token_endpoint_base.trim_end_matches('/')
            ),
            return_url: settings.return_url,
            sandbox: settings.sandbox,
            launcher,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn build_request(&self, session: &Session, sku: &Sku) -> Result<PurchaseRequest, StoreError> {
        match (&session.user_id, session.is_signed_in) {
            (Some(user_id), true) => Ok(PurchaseRequest::new(
                user_id.clone(),
                session.email.clone(),
                sku.clone(),
                self.return_url.clone(),
            )),
            _ => Err(StoreError::NotSignedIn),
        }
    }

    /// One POST, no retry. The token only goes to the launcher.
    pub async fn request_purchase(&self, session: &Session, sku: &Sku) -> Result<OrderId, StoreError> {
        let request = match self.build_request(session, sku) {
            Ok(request) => request,
            Err(err) => {
                error!(%sku, %err, "cannot request payment token");
                return Err(err);
            }
        };

        let token = match self.fetch_token(&request).await {
            Ok(token) => token,
            Err(err) => {
                error!(%sku, endpoint = %self.endpoint, %err, "payment token request failed");
                return Err(err);
            }
        };

        if let Err(err) = self.launcher.open_checkout(&token.token, self.sandbox).await {
            error!(%sku, order_id = token.order_id.0, %err, "failed to open checkout");
            return Err(err);
        }

        info!(
            %sku,
            order_id = token.order_id.0,
            sandbox = self.sandbox,
            "checkout opened"
        );
        Ok(token.order_id)
    }

    async fn fetch_token(&self, request: &PurchaseRequest) -> Result<PurchaseToken, StoreError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        serde_json::from_str::<PurchaseToken>(&body)
            .map_err(|err| StoreError::Transport(format!("malformed token response: {err}")))
    }
}

#[cfg(test)]
#[path = "tests/purchase_tests.rs"]
mod tests;
