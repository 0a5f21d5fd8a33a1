use std::ops::ControlFlow;

use shared::{
    domain::{Identity, OrderId, Sku},
    error::ErrorReport,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::{
    catalog_renderer::{CatalogRenderer, WidgetId},
    config::StoreSettings,
    error::StoreError,
    purchase::{PurchaseInitiator, PurchaseSettings},
    session_manager::{IdentitySessionManager, SessionChanged},
    Collaborators,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageView {
    pub login_visible: bool,
    pub store_visible: bool,
}

impl PageView {
    const LOGIN: Self = Self {
        login_visible: true,
        store_visible: false,
    };
    const STORE: Self = Self {
        login_visible: false,
        store_visible: true,
    };
}

#[derive(Debug, Clone)]
pub enum PageCommand {
    SetEmail(String),
    SetPassword(String),
    Register,
    Login,
    SignOut,
    Buy(WidgetId),
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedWidget {
    pub id: WidgetId,
    pub sku: Sku,
    pub name: String,
    pub price_text: String,
}

#[derive(Debug, Clone)]
pub enum PageEvent {
    ViewChanged(PageView),
    CatalogRendered { widgets: Vec<RenderedWidget> },
    CheckoutOpened { sku: Sku, order_id: OrderId },
    Error(ErrorReport),
}

pub struct PageController {
    identity: IdentitySessionManager,
    catalog: CatalogRenderer,
    purchase: PurchaseInitiator,
    view: PageView,
    email_input: String,
    password_input: String,
    events: broadcast::Sender<PageEvent>,
    disposed: bool,
}

impl PageController {
    pub fn new(
        identity: IdentitySessionManager,
        catalog: CatalogRenderer,
        purchase: PurchaseInitiator,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            identity,
            catalog,
            purchase,
            view: PageView::LOGIN,
            email_input: String::new(),
            password_input: String::new(),
            events,
            disposed: false,
        }
    }

    pub fn from_settings(
        settings: &StoreSettings,
        collaborators: Collaborators,
    ) -> Result<Self, StoreError> {
        let purchase =
            PurchaseInitiator::new(PurchaseSettings::from(settings), collaborators.launcher)?;
        Ok(Self::new(
            IdentitySessionManager::new(collaborators.identity),
            CatalogRenderer::new(
                collaborators.catalog,
                collaborators.images,
                settings.price_placeholder.clone(),
            ),
            purchase,
        ))
    }

    pub fn view(&self) -> PageView {
        self.view
    }

    pub fn identity(&self) -> &IdentitySessionManager {
        &self.identity
    }

    pub fn catalog(&self) -> &CatalogRenderer {
        &self.catalog
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    pub async fn start(&mut self) -> Result<(), StoreError> {
        if let Err(err) = self.identity.initialize().await {
            self.report(&err);
            return Err(err);
        }
        self.set_view(PageView::LOGIN);
        Ok(())
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<PageCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if self.handle_command(command).await.is_break() {
                        break;
                    }
                }
                Some(current) = self.identity.next_state_change(), if self.identity.is_attached() => {
                    self.handle_identity_change(current).await;
                }
            }
        }
        self.dispose().await;
    }

    pub async fn handle_command(&mut self, command: PageCommand) -> ControlFlow<()> {
        match command {
            PageCommand::SetEmail(email) => self.email_input = email,
            PageCommand::SetPassword(password) => self.password_input = password,
            PageCommand::Register => {
                debug!("register clicked");
                if let Err(err) = self
                    .identity
                    .sign_up(&self.email_input, &self.password_input)
                    .await
                {
                    self.report(&err);
                }
            }
            PageCommand::Login => {
                debug!("login clicked");
                if let Err(err) = self
                    .identity
                    .sign_in(&self.email_input, &self.password_input)
                    .await
                {
                    self.report(&err);
                }
            }
            PageCommand::SignOut => {
                if let Some(transition) = self.identity.sign_out().await {
                    self.apply_transition(transition).await;
                }
            }
            PageCommand::Buy(widget_id) => self.buy(widget_id).await,
            PageCommand::Close => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    pub async fn handle_identity_change(&mut self, current: Option<Identity>) {
        if let Some(transition) = self.identity.handle_state_changed(current) {
            self.apply_transition(transition).await;
        }
    }

    pub async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.identity.dispose().await;
        self.catalog.clear();
    }

    async fn apply_transition(&mut self, transition: SessionChanged) {
        match transition {
            SessionChanged::SignedIn(session) => {
                self.set_view(PageView::STORE);
                match self.catalog.load_catalog(&session).await {
                    Ok(_) => {
                        let widgets = self
                            .catalog
                            .widgets()
                            .iter()
                            .map(|widget| RenderedWidget {
                                id: widget.id(),
                                sku: widget.buy_binding().sku().clone(),
                                name: widget.name_text.clone(),
                                price_text: widget.price_text.clone(),
                            })
                            .collect();
                        let _ = self.events.send(PageEvent::CatalogRendered { widgets });
                    }
                    Err(err) => self.report(&err),
                }
            }
            SessionChanged::SignedOut { .. } => {
                self.catalog.clear();
                self.set_view(PageView::LOGIN);
            }
        }
    }

    async fn buy(&self, widget_id: WidgetId) {
        let Some(sku) = self
            .catalog
            .widget(widget_id)
            .map(|widget| widget.buy_binding().sku().clone())
        else {
            warn!(widget_id = widget_id.0, "buy clicked on unknown widget");
            return;
        };

        match self
            .purchase
            .request_purchase(self.identity.session(), &sku)
            .await
        {
            Ok(order_id) => {
                let _ = self
                    .events
                    .send(PageEvent::CheckoutOpened { sku, order_id });
            }
            Err(err) => self.report(&err),
        }
    }

    fn set_view(&mut self, view: PageView) {
        self.view = view;
        let _ = self.events.send(PageEvent::ViewChanged(view));
    }

    fn report(&self, err: &StoreError) {
        let _ = self.events.send(PageEvent::Error(err.report()));
    }
}

#[cfg(test)]
#[path = "tests/page_tests.rs"]
mod tests;
