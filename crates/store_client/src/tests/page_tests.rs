use super::*;
use crate::test_support::{item, FakeCatalog, FakeIdentityProvider, FakeImageLoader, RecordingLauncher};
use std::{sync::Arc, time::Duration};

use axum::{routing::post, Json, Router};
use shared::error::ErrorCode;
use tokio::net::TcpListener;

async fn spawn_token_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route(
        "/getXsollaPaymentToken",
        post(|| async { Json(serde_json::json!({"token": "abc", "order_id": 7})) }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

struct Harness {
    page: PageController,
    provider: Arc<FakeIdentityProvider>,
    catalog_calls: Arc<tokio::sync::Mutex<u32>>,
    opened: Arc<tokio::sync::Mutex<Vec<(String, bool)>>>,
}

async fn harness(provider: FakeIdentityProvider, token_base: String) -> Harness {
    let provider = Arc::new(provider);
    let catalog = FakeCatalog::with_items(vec![
        item("item_42", "Sword", Some(("10", "USD"))),
        item("item_43", "Shield", None),
    ]);
    let catalog_calls = catalog.calls.clone();
    let launcher = RecordingLauncher::default();
    let opened = launcher.opened.clone();

    let settings = StoreSettings {
        token_endpoint_base: token_base,
        token_request_timeout_secs: Some(5),
        ..StoreSettings::default()
    };
    let page = PageController::from_settings(
        &settings,
        Collaborators {
            identity: provider.clone(),
            catalog: Arc::new(catalog),
            images: Arc::new(FakeImageLoader::default()),
            launcher: Arc::new(launcher),
        },
    )
    .expect("page");

    Harness {
        page,
        provider,
        catalog_calls,
        opened,
    }
}

async fn known_user() -> FakeIdentityProvider {
    FakeIdentityProvider::available()
        .with_account("a@b.com", "pw", "u1")
        .await
}

async fn log_in(page: &mut PageController) {
    page.handle_command(PageCommand::SetEmail("a@b.com".into())).await;
    page.handle_command(PageCommand::SetPassword("pw".into())).await;
    page.handle_command(PageCommand::Login).await;
    // Earlier sign-outs may still have their echo queued ahead of the sign-in.
    loop {
        let current = page
            .identity
            .next_state_change()
            .await
            .expect("notification");
        let signed_in = current.is_some();
        page.handle_identity_change(current).await;
        if signed_in {
            break;
        }
    }
}

#[tokio::test]
async fn start_shows_login_and_hides_store() {
    let mut h = harness(known_user().await, "http://127.0.0.1:9".into()).await;
    h.page.start().await.expect("start");

    assert_eq!(h.page.view(), PageView::LOGIN);
    assert!(h.page.identity().is_attached());
}

#[tokio::test]
async fn failed_start_reports_dependency_error() {
    let mut h = harness(
        FakeIdentityProvider::unavailable(shared::protocol::DependencyStatus::UnavailableOther),
        "http://127.0.0.1:9".into(),
    )
    .await;
    let mut events = h.page.subscribe();

    assert!(h.page.start().await.is_err());
    match events.try_recv() {
        Ok(PageEvent::Error(report)) => assert_eq!(report.code, ErrorCode::DependencyUnavailable),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn sign_in_switches_view_and_loads_catalog_once() {
    let mut h = harness(known_user().await, "http://127.0.0.1:9".into()).await;
    h.page.start().await.expect("start");
    log_in(&mut h.page).await;

    assert_eq!(h.page.view(), PageView::STORE);
    assert_eq!(*h.catalog_calls.lock().await, 1);
    assert_eq!(h.page.catalog().widgets().len(), 2);
    assert_eq!(h.page.catalog().widgets()[0].price_text, "10 USD");

    h.page.handle_identity_change(Some(crate::test_support::identity("u1", "a@b.com"))).await;
    assert_eq!(*h.catalog_calls.lock().await, 1);
}

#[tokio::test]
async fn sign_out_never_loads_catalog() {
    let mut h = harness(known_user().await, "http://127.0.0.1:9".into()).await;
    h.page.start().await.expect("start");
    log_in(&mut h.page).await;

    h.page.handle_command(PageCommand::SignOut).await;
    assert_eq!(h.page.view(), PageView::LOGIN);
    assert!(h.page.catalog().widgets().is_empty());
    assert_eq!(*h.catalog_calls.lock().await, 1);

    log_in(&mut h.page).await;
    assert_eq!(*h.catalog_calls.lock().await, 2);
}

#[tokio::test]
async fn rejected_registration_is_reported_and_changes_nothing() {
    let mut h = harness(known_user().await, "http://127.0.0.1:9".into()).await;
    h.page.start().await.expect("start");
    let mut events = h.page.subscribe();

    h.page.handle_command(PageCommand::SetEmail("a@b.com".into())).await;
    h.page.handle_command(PageCommand::SetPassword("pw".into())).await;
    h.page.handle_command(PageCommand::Register).await;

    match events.try_recv() {
        Ok(PageEvent::Error(report)) => {
            assert_eq!(report.code, ErrorCode::AuthFaulted);
            assert!(report.message.contains("EMAIL_EXISTS"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(h.page.view(), PageView::LOGIN);
    assert_eq!(*h.catalog_calls.lock().await, 0);
}

#[tokio::test]
async fn buy_uses_sku_bound_to_widget() {
    let base = spawn_token_server().await;
    let mut h = harness(known_user().await, base).await;
    h.page.start().await.expect("start");
    log_in(&mut h.page).await;
    let mut events = h.page.subscribe();

    let widget_id = h.page.catalog().widgets()[0].id();
    h.page.handle_command(PageCommand::Buy(widget_id)).await;

    match events.try_recv() {
        Ok(PageEvent::CheckoutOpened { sku, order_id }) => {
            assert_eq!(sku.as_str(), "item_42");
            assert_eq!(order_id, OrderId(7));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(
        h.opened.lock().await.as_slice(),
        &[("abc".to_string(), true)]
    );
}

#[tokio::test]
async fn buy_on_unknown_widget_is_ignored() {
    let mut h = harness(known_user().await, "http://127.0.0.1:9".into()).await;
    h.page.start().await.expect("start");
    log_in(&mut h.page).await;

    h.page.handle_command(PageCommand::Buy(WidgetId(999))).await;
    assert!(h.opened.lock().await.is_empty());
}

#[tokio::test]
async fn dispose_twice_signs_out_once() {
    let mut h = harness(known_user().await, "http://127.0.0.1:9".into()).await;
    h.page.start().await.expect("start");
    log_in(&mut h.page).await;

    h.page.dispose().await;
    h.page.dispose().await;

    assert_eq!(*h.provider.sign_out_calls.lock().await, 1);
    assert!(!h.page.identity().is_attached());
    assert!(h.page.catalog().widgets().is_empty());
}

#[tokio::test]
async fn run_loop_reacts_to_provider_notifications_until_closed() {
    let mut h = harness(known_user().await, "http://127.0.0.1:9".into()).await;
    h.page.start().await.expect("start");
    let mut events = h.page.subscribe();

    let (tx, rx) = mpsc::channel(16);
    let provider = h.provider.clone();
    let running = tokio::spawn(h.page.run(rx));

    tx.send(PageCommand::SetEmail("a@b.com".into())).await.expect("send");
    tx.send(PageCommand::SetPassword("pw".into())).await.expect("send");
    tx.send(PageCommand::Login).await.expect("send");

    let rendered = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(PageEvent::CatalogRendered { widgets }) = events.recv().await {
                return widgets;
            }
        }
    })
    .await
    .expect("catalog rendered");
    let skus: Vec<&str> = rendered.iter().map(|widget| widget.sku.as_str()).collect();
    assert_eq!(skus, ["item_42", "item_43"]);
    assert_eq!(rendered[0].price_text, "10 USD");

    tx.send(PageCommand::Close).await.expect("send");
    running.await.expect("page loop");
    assert_eq!(*provider.sign_out_calls.lock().await, 1);
    assert_eq!(*h.catalog_calls.lock().await, 1);
}

#[tokio::test]
async fn provider_side_sign_out_returns_to_login_without_loading() {
    let mut h = harness(known_user().await, "http://127.0.0.1:9".into()).await;
    h.page.start().await.expect("start");
    log_in(&mut h.page).await;
    assert_eq!(*h.catalog_calls.lock().await, 1);

    h.provider.emit(None).await;
    let current = h
        .page
        .identity
        .next_state_change()
        .await
        .expect("notification");
    assert_eq!(current, None);
    h.page.handle_identity_change(current).await;

    assert_eq!(h.page.view(), PageView::LOGIN);
    assert!(h.page.catalog().widgets().is_empty());
    assert!(!h.page.identity().session().is_signed_in);
    assert_eq!(*h.catalog_calls.lock().await, 1);
}

#[tokio::test]
async fn run_loop_handles_provider_side_sign_out() {
    let mut h = harness(known_user().await, "http://127.0.0.1:9".into()).await;
    h.page.start().await.expect("start");
    let mut events = h.page.subscribe();

    let (tx, rx) = mpsc::channel(16);
    let provider = h.provider.clone();
    let running = tokio::spawn(h.page.run(rx));

    tx.send(PageCommand::SetEmail("a@b.com".into())).await.expect("send");
    tx.send(PageCommand::SetPassword("pw".into())).await.expect("send");
    tx.send(PageCommand::Login).await.expect("send");

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(PageEvent::CatalogRendered { .. }) = events.recv().await {
                break;
            }
        }
    })
    .await
    .expect("catalog rendered");

    provider.emit(None).await;
    let view = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(PageEvent::ViewChanged(view)) = events.recv().await {
                return view;
            }
        }
    })
    .await
    .expect("view changed");
    assert_eq!(view, PageView::LOGIN);

    tx.send(PageCommand::Close).await.expect("send");
    running.await.expect("page loop");
    assert_eq!(*h.catalog_calls.lock().await, 1);
}
