use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::domain::{CatalogItem, Price, Sku};
use tracing::debug;
use url::Url;

use crate::{
    config::StoreSettings, error::StoreError, CatalogService, Icon, ImageLoader,
    PurchaseUiLauncher,
};

const ICON_MAX_EDGE: u32 = 256;
const PAYSTATION_SANDBOX: &str = "https://sandbox-secure.xsolla.com/paystation4/";
const PAYSTATION_PRODUCTION: &str = "https://secure.xsolla.com/paystation4/";

#[derive(Debug, Deserialize)]
struct VirtualItemsResponse {
    items: Vec<VirtualItem>,
}

#[derive(Debug, Deserialize)]
struct VirtualItem {
    sku: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    price: Option<VirtualItemPrice>,
    #[serde(default)]
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VirtualItemPrice {
    amount: Decimal,
    currency: String,
}

impl From<VirtualItem> for CatalogItem {
    fn from(item: VirtualItem) -> Self {
        Self {
            sku: Sku(item.sku),
            name: item.name.unwrap_or_default(),
            description: item.description.unwrap_or_default(),
            price: item.price.map(|price| Price {
                amount: price.amount,
                currency: price.currency,
            }),
            image_url: item.image_url.filter(|url| !url.is_empty()),
        }
    }
}

pub struct XsollaCatalogClient {
    http: Client,
    items_url: String,
    limit: u32,
}

impl XsollaCatalogClient {
    pub fn new(http: Client, store_api: &str, project_id: &str, limit: u32) -> Self {
        Self {
            http,
            items_url: format!(
                "{}/api/v2/project/{project_id}/items/virtual_items",
                store_api.trim_end_matches('/')
            ),
            limit,
        }
    }

    pub fn from_settings(http: Client, settings: &StoreSettings) -> Result<Self, StoreError> {
        let project_id = settings
            .xsolla_project_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| StoreError::Config("xsolla_project_id is not set".into()))?;
        Ok(Self::new(
            http,
            &settings.xsolla_store_api,
            project_id,
            settings.catalog_limit,
        ))
    }
}

#[async_trait]
impl CatalogService for XsollaCatalogClient {
    async fn get_catalog(&self) -> Result<Vec<CatalogItem>, StoreError> {
        let response: VirtualItemsResponse = self
            .http
            .get(&self.items_url)
            .query(&[("limit", self.limit), ("offset", 0)])
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| StoreError::CatalogFetch(err.to_string()))?
            .json()
            .await
            .map_err(|err| StoreError::CatalogFetch(format!("invalid catalog response: {err}")))?;
        debug!(items = response.items.len(), "catalog fetched");
        Ok(response.items.into_iter().map(CatalogItem::from).collect())
    }
}

pub struct HttpImageLoader {
    http: Client,
}

impl HttpImageLoader {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load_image(&self, url: &str) -> Result<Icon, StoreError> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| StoreError::Transport(err.to_string()))?
            .bytes()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;

        tokio::task::spawn_blocking(move || decode_icon(&bytes))
            .await
            .map_err(|err| StoreError::Transport(format!("icon decode task failed: {err}")))?
    }
}

fn decode_icon(bytes: &[u8]) -> Result<Icon, StoreError> {
    let dynamic = image::load_from_memory(bytes)
        .map_err(|err| StoreError::Transport(format!("undecodable image: {err}")))?;
    // `thumbnail` also scales up, so small artwork is kept as is.
    let rgba = if dynamic.width() > ICON_MAX_EDGE || dynamic.height() > ICON_MAX_EDGE {
        dynamic.thumbnail(ICON_MAX_EDGE, ICON_MAX_EDGE).to_rgba8()
    } else {
        dynamic.to_rgba8()
    };
    Ok(Icon {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}

pub struct PayStationLauncher;

impl PayStationLauncher {
    pub fn checkout_url(token: &str, sandbox: bool) -> Result<Url, StoreError> {
        let base = if sandbox {
            PAYSTATION_SANDBOX
        } else {
            PAYSTATION_PRODUCTION
        };
        Url::parse_with_params(base, &[("token", token)])
            .map_err(|err| StoreError::CheckoutLaunch(err.to_string()))
    }
}

#[async_trait]
impl PurchaseUiLauncher for PayStationLauncher {
    async fn open_checkout(&self, token: &str, sandbox: bool) -> Result<(), StoreError> {
        let url = Self::checkout_url(token, sandbox)?;
        tokio::task::spawn_blocking(move || open::that(url.as_str()))
            .await
            .map_err(|err| StoreError::CheckoutLaunch(err.to_string()))?
            .map_err(|err| StoreError::CheckoutLaunch(err.to_string()))
    }
}

#[cfg(test)]
#[path = "tests/xsolla_tests.rs"]
mod tests;
