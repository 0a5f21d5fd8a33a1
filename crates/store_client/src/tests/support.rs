use std::{collections::HashMap, str::FromStr, sync::Arc};

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::{
    domain::{CatalogItem, Identity, Price, Sku, UserId},
    protocol::DependencyStatus,
};
use tokio::sync::{broadcast, Mutex};

use crate::{CatalogService, Icon, IdentityProvider, ImageLoader, PurchaseUiLauncher, StoreError};

pub(crate) fn identity(uid: &str, email: &str) -> Identity {
    Identity {
        user_id: UserId::from(uid),
        email: email.to_string(),
        display_name: None,
    }
}

pub(crate) fn item(sku: &str, name: &str, price: Option<(&str, &str)>) -> CatalogItem {
    CatalogItem {
        sku: Sku::from(sku),
        name: name.to_string(),
        description: format!("{name} description"),
        price: price.map(|(amount, currency)| Price {
            amount: Decimal::from_str(amount).expect("decimal"),
            currency: currency.to_string(),
        }),
        image_url: None,
    }
}

pub(crate) fn icon(shade: u8) -> Icon {
    Icon {
        width: 1,
        height: 1,
        rgba: vec![shade, shade, shade, 255],
    }
}

struct FakeAccount {
    password: String,
    identity: Identity,
}

pub(crate) struct FakeIdentityProvider {
    status: DependencyStatus,
    cancel_requests: bool,
    closed_notifications: bool,
    accounts: Mutex<HashMap<String, FakeAccount>>,
    current: Mutex<Option<Identity>>,
    state_changes: broadcast::Sender<Option<Identity>>,
    pub sign_out_calls: Arc<Mutex<u32>>,
}

impl FakeIdentityProvider {
    pub(crate) fn available() -> Self {
        let (state_changes, _) = broadcast::channel(16);
        Self {
            status: DependencyStatus::Available,
            cancel_requests: false,
            closed_notifications: false,
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            state_changes,
            sign_out_calls: Arc::new(Mutex::new(0)),
        }
    }

    pub(crate) fn unavailable(status: DependencyStatus) -> Self {
        let mut provider = Self::available();
        provider.status = status;
        provider
    }

    /// Hands out subscriptions whose sender is already gone.
    pub(crate) fn closed_notifications() -> Self {
        let mut provider = Self::available();
        provider.closed_notifications = true;
        provider
    }

    pub(crate) fn canceling() -> Self {
        let mut provider = Self::available();
        provider.cancel_requests = true;
        provider
    }

    pub(crate) async fn with_account(self, email: &str, password: &str, uid: &str) -> Self {
        self.accounts.lock().await.insert(
            email.to_string(),
            FakeAccount {
                password: password.to_string(),
                identity: identity(uid, email),
            },
        );
        self
    }

    /// Pushes a raw notification, as the provider would after an external change.
    pub(crate) async fn emit(&self, current: Option<Identity>) {
        *self.current.lock().await = current.clone();
        let _ = self.state_changes.send(current);
    }

    async fn become_current(&self, identity: &Identity) {
        let mut current = self.current.lock().await;
        let changed = current
            .as_ref()
            .map_or(true, |existing| !existing.same_account(identity));
        *current = Some(identity.clone());
        if changed {
            let _ = self.state_changes.send(Some(identity.clone()));
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn check_dependencies(&self) -> DependencyStatus {
        self.status
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, StoreError> {
        if self.cancel_requests {
            return Err(StoreError::AuthCanceled {
                operation: "sign_up",
            });
        }
        let identity = {
            let mut accounts = self.accounts.lock().await;
            if accounts.contains_key(email) {
                return Err(StoreError::AuthFaulted {
                    operation: "sign_up",
                    message: "EMAIL_EXISTS".to_string(),
                });
            }
            let identity = identity(&format!("uid-{}", accounts.len() + 1), email);
            accounts.insert(
                email.to_string(),
                FakeAccount {
                    password: password.to_string(),
                    identity: identity.clone(),
                },
            );
            identity
        };
        self.become_current(&identity).await;
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, StoreError> {
        if self.cancel_requests {
            return Err(StoreError::AuthCanceled {
                operation: "sign_in",
            });
        }
        let identity = {
            let accounts = self.accounts.lock().await;
            match accounts.get(email) {
                Some(account) if account.password == password => account.identity.clone(),
                _ => {
                    return Err(StoreError::AuthFaulted {
                        operation: "sign_in",
                        message: "INVALID_LOGIN_CREDENTIALS".to_string(),
                    })
                }
            }
        };
        self.become_current(&identity).await;
        Ok(identity)
    }

    async fn sign_out(&self) {
        *self.sign_out_calls.lock().await += 1;
        if self.current.lock().await.take().is_some() {
            let _ = self.state_changes.send(None);
        }
    }

    async fn current_identity(&self) -> Option<Identity> {
        self.current.lock().await.clone()
    }

    fn subscribe_state_changes(&self) -> broadcast::Receiver<Option<Identity>> {
        if self.closed_notifications {
            return broadcast::channel(1).1;
        }
        self.state_changes.subscribe()
    }
}

pub(crate) struct FakeCatalog {
    items: Vec<CatalogItem>,
    fail_with: Option<String>,
    pub calls: Arc<Mutex<u32>>,
}

impl FakeCatalog {
    pub(crate) fn with_items(items: Vec<CatalogItem>) -> Self {
        Self {
            items,
            fail_with: None,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            items: Vec::new(),
            fail_with: Some(message.to_string()),
            calls: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl CatalogService for FakeCatalog {
    async fn get_catalog(&self) -> Result<Vec<CatalogItem>, StoreError> {
        *self.calls.lock().await += 1;
        if let Some(message) = &self.fail_with {
            return Err(StoreError::CatalogFetch(message.clone()));
        }
        Ok(self.items.clone())
    }
}

#[derive(Clone)]
pub(crate) enum FakeImage {
    Ready(Icon),
    Fail,
    Hang,
}

#[derive(Default)]
pub(crate) struct FakeImageLoader {
    images: HashMap<String, FakeImage>,
    pub requested: Arc<Mutex<Vec<String>>>,
}

impl FakeImageLoader {
    pub(crate) fn with(mut self, url: &str, image: FakeImage) -> Self {
        self.images.insert(url.to_string(), image);
        self
    }
}

#[async_trait]
impl ImageLoader for FakeImageLoader {
    async fn load_image(&self, url: &str) -> Result<Icon, StoreError> {
        self.requested.lock().await.push(url.to_string());
        match self.images.get(url).cloned() {
            Some(FakeImage::Ready(icon)) => Ok(icon),
            Some(FakeImage::Hang) => std::future::pending().await,
            Some(FakeImage::Fail) | None => {
                Err(StoreError::Transport(format!("no image at {url}")))
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingLauncher {
    pub opened: Arc<Mutex<Vec<(String, bool)>>>,
}

#[async_trait]
impl PurchaseUiLauncher for RecordingLauncher {
    async fn open_checkout(&self, token: &str, sandbox: bool) -> Result<(), StoreError> {
        self.opened.lock().await.push((token.to_string(), sandbox));
        Ok(())
    }
}
