use std::{collections::HashMap, sync::Arc};

use shared::domain::{CatalogItem, Session, Sku};
use tokio::{sync::watch, task::AbortHandle};
use tracing::{debug, error, warn};

use crate::{error::StoreError, CatalogService, Icon, ImageLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyBinding {
    sku: Sku,
}

impl BuyBinding {
    pub fn sku(&self) -> &Sku {
        &self.sku
    }
}

pub struct StoreItemWidget {
    id: WidgetId,
    pub name_text: String,
    pub description_text: String,
    pub price_text: String,
    icon: watch::Receiver<Option<Arc<Icon>>>,
    buy: BuyBinding,
}

impl StoreItemWidget {
    pub fn id(&self) -> WidgetId {
        self.id
    }

    pub fn buy_binding(&self) -> &BuyBinding {
        &self.buy
    }

    pub fn icon(&self) -> Option<Arc<Icon>> {
        self.icon.borrow().clone()
    }

    pub async fn icon_resolved(&mut self) -> Option<Arc<Icon>> {
        match self.icon.wait_for(Option::is_some).await {
            Ok(icon) => icon.clone(),
            Err(_) => None,
        }
    }
}

pub struct CatalogRenderer {
    catalog: Arc<dyn CatalogService>,
    images: Arc<dyn ImageLoader>,
    price_placeholder: String,
    widgets: Vec<StoreItemWidget>,
    image_tasks: HashMap<WidgetId, AbortHandle>,
    next_widget_id: u64,
}

impl CatalogRenderer {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        images: Arc<dyn ImageLoader>,
        price_placeholder: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            images,
            price_placeholder: price_placeholder.into(),
            widgets: Vec::new(),
            image_tasks: HashMap::new(),
            next_widget_id: 1,
        }
    }

    pub fn widgets(&self) -> &[StoreItemWidget] {
        &self.widgets
    }

    pub fn widget(&self, id: WidgetId) -> Option<&StoreItemWidget> {
        self.widgets.iter().find(|widget| widget.id == id)
    }

    pub fn widget_mut(&mut self, id: WidgetId) -> Option<&mut StoreItemWidget> {
        self.widgets.iter_mut().find(|widget| widget.id == id)
    }

    pub async fn load_catalog(&mut self, session: &Session) -> Result<usize, StoreError> {
        if !session.is_signed_in {
            warn!("refusing to render catalog without a signed-in session");
            return Err(StoreError::NotSignedIn);
        }

        let items = match self.catalog.get_catalog().await {
            Ok(items) => items,
            Err(err) => {
                error!(%err, "catalog request failed");
                return Err(err);
            }
        };

        self.clear();
        for item in items {
            self.render_item(item);
        }
        debug!(widgets = self.widgets.len(), "catalog rendered");
        Ok(self.widgets.len())
    }

    pub fn clear(&mut self) {
        for (_, task) in self.image_tasks.drain() {
            task.abort();
        }
        self.widgets.clear();
    }

    pub fn price_text(&self, item: &CatalogItem) -> String {
        match &item.price {
            Some(price) => price.to_string(),
            None => self.price_placeholder.clone(),
        }
    }

    fn render_item(&mut self, item: CatalogItem) {
        let id = WidgetId(self.next_widget_id);
        self.next_widget_id += 1;

        let (icon_tx, icon_rx) = watch::channel(None);
        // The task only holds this widget's sender.
        if let Some(url) = item.image_url.clone() {
            let images = Arc::clone(&self.images);
            let task = tokio::spawn(async move {
                match images.load_image(&url).await {
                    Ok(icon) => {
                        let _ = icon_tx.send(Some(Arc::new(icon)));
                    }
                    Err(err) => warn!(widget_id = id.0, %url, %err, "icon load abandoned"),
                }
            });
            self.image_tasks.insert(id, task.abort_handle());
        }

        let price_text = self.price_text(&item);
        self.widgets.push(StoreItemWidget {
            id,
            price_text,
            name_text: item.name,
            description_text: item.description,
            icon: icon_rx,
            buy: BuyBinding { sku: item.sku },
        });
    }
}

impl Drop for CatalogRenderer {
    fn drop(&mut self) {
        for task in self.image_tasks.values() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/catalog_renderer_tests.rs"]
mod tests;
