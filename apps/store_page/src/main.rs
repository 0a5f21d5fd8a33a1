use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use reqwest::Client;
use store_client::{
    firebase::FirebaseIdentityProvider,
    load_settings,
    xsolla::{HttpImageLoader, PayStationLauncher, XsollaCatalogClient},
    Collaborators, PageCommand, PageController, PageEvent,
};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{info, warn};

/// Signs in, lists the catalog and optionally opens checkout for one item.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "store.toml")]
    config: PathBuf,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
    /// Create the account instead of signing in.
    #[arg(long)]
    register: bool,
    #[arg(long, value_name = "SKU")]
    buy: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let settings = load_settings(&args.config)?;
    let http = Client::new();
    let collaborators = Collaborators {
        identity: Arc::new(FirebaseIdentityProvider::from_settings(http.clone(), &settings)),
        catalog: Arc::new(XsollaCatalogClient::from_settings(http.clone(), &settings)?),
        images: Arc::new(HttpImageLoader::new(http)),
        launcher: Arc::new(PayStationLauncher),
    };

    let mut page = PageController::from_settings(&settings, collaborators)?;
    let mut events = page.subscribe();
    page.start().await.context("identity provider is not available")?;

    let (commands, rx) = mpsc::channel(32);
    let running = tokio::spawn(page.run(rx));

    let submit = if args.register {
        PageCommand::Register
    } else {
        PageCommand::Login
    };
    for command in [
        PageCommand::SetEmail(args.email),
        PageCommand::SetPassword(args.password),
        submit,
    ] {
        dispatch(&commands, command).await?;
    }

    let mut failure: Option<anyhow::Error> = None;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "page events lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            PageEvent::ViewChanged(view) => info!(
                login = view.login_visible,
                store = view.store_visible,
                "view changed"
            ),
            PageEvent::CatalogRendered { widgets } => {
                for widget in &widgets {
                    println!(
                        "{:<24} {:<32} {}",
                        widget.sku.as_str(),
                        widget.name,
                        widget.price_text
                    );
                }
                let Some(wanted) = args.buy.as_deref() else {
                    break;
                };
                match widgets.iter().find(|widget| widget.sku.as_str() == wanted) {
                    Some(widget) => dispatch(&commands, PageCommand::Buy(widget.id)).await?,
                    None => {
                        failure = Some(anyhow!("sku {wanted} is not in the catalog"));
                        break;
                    }
                }
            }
            PageEvent::CheckoutOpened { sku, order_id } => {
                println!("Checkout opened for {sku}, order_id={}", order_id.0);
                break;
            }
            PageEvent::Error(report) => {
                failure = Some(anyhow!(report));
                break;
            }
        }
    }

    dispatch(&commands, PageCommand::Close).await?;
    running.await.context("page loop panicked")?;

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn dispatch(commands: &mpsc::Sender<PageCommand>, command: PageCommand) -> Result<()> {
    commands
        .send(command)
        .await
        .map_err(|_| anyhow!("page loop stopped"))
}
