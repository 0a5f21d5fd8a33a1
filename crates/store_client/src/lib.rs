use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{CatalogItem, Identity},
    protocol::DependencyStatus,
};
use tokio::sync::broadcast;

pub mod catalog_renderer;
pub mod config;
pub mod error;
pub mod firebase;
pub mod page;
pub mod purchase;
pub mod session_manager;
pub mod xsolla;

pub use catalog_renderer::{BuyBinding, CatalogRenderer, StoreItemWidget, WidgetId};
pub use config::{load_settings, StoreSettings};
pub use error::StoreError;
pub use page::{PageCommand, PageController, PageEvent, PageView, RenderedWidget};
pub use purchase::{PurchaseInitiator, PurchaseSettings};
pub use session_manager::{IdentitySessionManager, SessionChanged, SessionState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Authentication backend. Implementations broadcast the current identity
/// every time it differs from the one they last reported, sign-out included.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn check_dependencies(&self) -> DependencyStatus;
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, StoreError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, StoreError>;
    async fn sign_out(&self);
    async fn current_identity(&self) -> Option<Identity>;
    fn subscribe_state_changes(&self) -> broadcast::Receiver<Option<Identity>>;
}

pub struct MissingIdentityProvider;

#[async_trait]
impl IdentityProvider for MissingIdentityProvider {
    async fn check_dependencies(&self) -> DependencyStatus {
        DependencyStatus::UnavailableOther
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> Result<Identity, StoreError> {
        Err(StoreError::DependencyUnavailable(
            DependencyStatus::UnavailableOther,
        ))
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<Identity, StoreError> {
        Err(StoreError::DependencyUnavailable(
            DependencyStatus::UnavailableOther,
        ))
    }

    async fn sign_out(&self) {}

    async fn current_identity(&self) -> Option<Identity> {
        None
    }

    fn subscribe_state_changes(&self) -> broadcast::Receiver<Option<Identity>> {
        let (_closed, rx) = broadcast::channel(1);
        rx
    }
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn get_catalog(&self) -> Result<Vec<CatalogItem>, StoreError>;
}

pub struct MissingCatalogService;

#[async_trait]
impl CatalogService for MissingCatalogService {
    async fn get_catalog(&self) -> Result<Vec<CatalogItem>, StoreError> {
        Err(StoreError::CatalogFetch(
            "catalog service is unavailable".to_string(),
        ))
    }
}

#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load_image(&self, url: &str) -> Result<Icon, StoreError>;
}

pub struct MissingImageLoader;

#[async_trait]
impl ImageLoader for MissingImageLoader {
    async fn load_image(&self, url: &str) -> Result<Icon, StoreError> {
        Err(StoreError::Transport(format!(
            "image loader is unavailable for {url}"
        )))
    }
}

#[async_trait]
pub trait PurchaseUiLauncher: Send + Sync {
    async fn open_checkout(&self, token: &str, sandbox: bool) -> Result<(), StoreError>;
}

pub struct MissingPurchaseUiLauncher;

#[async_trait]
impl PurchaseUiLauncher for MissingPurchaseUiLauncher {
    async fn open_checkout(&self, _token: &str, _sandbox: bool) -> Result<(), StoreError> {
        Err(StoreError::CheckoutLaunch(
            "purchase UI launcher is unavailable".to_string(),
        ))
    }
}

#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub catalog: Arc<dyn CatalogService>,
    pub images: Arc<dyn ImageLoader>,
    pub launcher: Arc<dyn PurchaseUiLauncher>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            identity: Arc::new(MissingIdentityProvider),
            catalog: Arc::new(MissingCatalogService),
            images: Arc::new(MissingImageLoader),
            launcher: Arc::new(MissingPurchaseUiLauncher),
        }
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
