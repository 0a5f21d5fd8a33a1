use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{Identity, UserId},
    protocol::DependencyStatus,
};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use url::Url;

use crate::{config::StoreSettings, error::StoreError, IdentityProvider};

const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

struct FirebaseCredential {
    identity: Identity,
    id_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordAuthRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordAuthResponse {
    local_id: String,
    email: String,
    #[serde(default)]
    display_name: Option<String>,
    id_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FirebaseErrorEnvelope {
    error: FirebaseErrorBody,
}

#[derive(Debug, Deserialize)]
struct FirebaseErrorBody {
    message: String,
}

pub struct FirebaseIdentityProvider {
    http: Client,
    auth_base: String,
    api_key: Option<String>,
    current: RwLock<Option<FirebaseCredential>>,
    state_changes: broadcast::Sender<Option<Identity>>,
}

impl FirebaseIdentityProvider {
    pub fn new(http: Client, auth_base: impl Into<String>, api_key: Option<String>) -> Self {
        let (state_changes, _) = broadcast::channel(16);
        Self {
            http,
            auth_base: auth_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            current: RwLock::new(None),
            state_changes,
        }
    }

    pub fn from_settings(http: Client, settings: &StoreSettings) -> Self {
        Self::new(
            http,
            settings.firebase_auth_base.clone(),
            settings.firebase_api_key.clone(),
        )
    }

    pub async fn id_token(&self) -> Option<String> {
        let guard = self.current.read().await;
        guard
            .as_ref()
            .filter(|credential| credential.expires_at > Utc::now())
            .map(|credential| credential.id_token.clone())
    }

    async fn authenticate(
        &self,
        operation: &'static str,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<Identity, StoreError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(StoreError::DependencyUnavailable(
                DependencyStatus::UnavailableMissing,
            ))?;

        let res = self
            .http
            .post(format!("{}/accounts:{endpoint}", self.auth_base))
            .query(&[("key", api_key)])
            .json(&PasswordAuthRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(|err| request_error(operation, err))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            let message = serde_json::from_str::<FirebaseErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| format!("http status {status}"));
            return Err(StoreError::AuthFaulted { operation, message });
        }

        let body: PasswordAuthResponse = res
            .json()
            .await
            .map_err(|err| request_error(operation, err))?;
        let identity = Identity {
            user_id: UserId(body.local_id),
            email: body.email,
            display_name: body.display_name.filter(|name| !name.is_empty()),
        };

        self.store_credential(FirebaseCredential {
            identity: identity.clone(),
            id_token: body.id_token,
            expires_at: token_expiry(Utc::now(), body.expires_in.as_deref()),
        })
        .await;
        Ok(identity)
    }

    async fn store_credential(&self, credential: FirebaseCredential) {
        let identity = credential.identity.clone();
        let previous = {
            let mut guard = self.current.write().await;
            guard.replace(credential)
        };
        let changed = previous
            .as_ref()
            .map_or(true, |previous| !previous.identity.same_account(&identity));
        if changed {
            debug!(user_id = %identity.user_id, "firebase identity changed");
            let _ = self.state_changes.send(Some(identity));
        }
    }
}

// Unparseable or out-of-range lifetimes fall back to the default.
fn token_expiry(now: DateTime<Utc>, expires_in: Option<&str>) -> DateTime<Utc> {
    expires_in
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .and_then(TimeDelta::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(now + TimeDelta::seconds(DEFAULT_TOKEN_TTL_SECS))
}

fn request_error(operation: &'static str, err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::AuthCanceled { operation }
    } else {
        StoreError::AuthFaulted {
            operation,
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    async fn check_dependencies(&self) -> DependencyStatus {
        if self.api_key.is_none() {
            return DependencyStatus::UnavailableMissing;
        }
        match Url::parse(&self.auth_base) {
            Ok(_) => DependencyStatus::Available,
            Err(_) => DependencyStatus::UnavailableOther,
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, StoreError> {
        self.authenticate("sign_up", "signUp", email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, StoreError> {
        self.authenticate("sign_in", "signInWithPassword", email, password)
            .await
    }

    async fn sign_out(&self) {
        let previous = self.current.write().await.take();
        if let Some(previous) = previous {
            debug!(user_id = %previous.identity.user_id, "firebase identity cleared");
            let _ = self.state_changes.send(None);
        }
    }

    async fn current_identity(&self) -> Option<Identity> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|credential| credential.identity.clone())
    }

    fn subscribe_state_changes(&self) -> broadcast::Receiver<Option<Identity>> {
        self.state_changes.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/firebase_tests.rs"]
mod tests;
