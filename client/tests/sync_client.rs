//! Sync client against a real server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use bakery_orders::{
    InMemoryPromoCatalog, LineItem, Money, Order, OrderEnvironment, OrderId, OrderStatus,
    OrderStoreState, ShippingDetails, ShippingSettings, SyncStatus,
};
use bakery_sync_client::{ClientConfig, SyncClient};
use bakery_sync_core::environment::Clock;
use bakery_sync_runtime::retry::RetryPolicy;
use bakery_sync_testing::{test_clock, SequentialOrderIds};
use bakery_sync_web::{AppState, Config};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const WAIT: Duration = Duration::from_secs(3);

fn order(id: u64) -> Order {
    Order {
        id: OrderId::new(id),
        date: test_clock().now(),
        items: vec![LineItem::new(3, "Chocolate Cake", Money::from_major(18), 1)],
        total: Money::from_major(18),
        status: OrderStatus::Preparing,
        shipping_details: ShippingDetails {
            name: "Anika".into(),
            phone: "9000000002".into(),
            address: "7 Hill View".into(),
            city: "Pune".into(),
            zip: "411001".into(),
            ..ShippingDetails::default()
        },
        location: None,
        applied_promo: None,
        discount: Money::ZERO,
        hidden: false,
    }
}

struct Server {
    state: AppState,
    _stop: oneshot::Sender<()>,
}

async fn serve(listener: TcpListener, config: Config, orders: Vec<Order>) -> Server {
    let env = OrderEnvironment::new(
        Arc::new(test_clock()),
        Arc::new(SequentialOrderIds::default()),
        Arc::new(InMemoryPromoCatalog::new()),
        Arc::new(ShippingSettings::default()),
    );
    let state = AppState::with_environment(config, OrderStoreState::with_orders(orders), env);
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(bakery_sync_web::serve(listener, state.clone(), async move {
        let _ = stopped.await;
    }));
    Server { state, _stop: stop }
}

async fn start(config: Config, orders: Vec<Order>) -> (SocketAddr, Server) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (addr, serve(listener, config, orders).await)
}

fn client_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig::new(format!("ws://{addr}/ws")).with_reconnect(
        RetryPolicy::builder()
            .max_retries(50)
            .initial_delay(Duration::from_millis(20))
            .max_delay(Duration::from_millis(100))
            .build(),
    )
}

async fn live_client(config: ClientConfig) -> SyncClient {
    let client = SyncClient::connect(config);
    client.wait_until_live(WAIT).await.unwrap();
    client
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn clients_converge_through_the_server() {
    let (addr, server) = start(Config::default(), vec![order(100_001)]).await;
    let admin = live_client(client_config(addr)).await;
    let kitchen = live_client(client_config(addr)).await;

    admin
        .update_status(OrderId::new(100_001), OrderStatus::Baked)
        .await
        .unwrap();
    // Applied locally before the server answers
    assert_eq!(
        admin.order(OrderId::new(100_001)).await.unwrap().status,
        OrderStatus::Baked
    );
    eventually("kitchen to see the update", || async {
        kitchen.order(OrderId::new(100_001)).await.map(|o| o.status) == Some(OrderStatus::Baked)
    })
    .await;

    kitchen.place_order(order(300_001)).await.unwrap();
    eventually("admin to see the new order", || async {
        admin.order(OrderId::new(300_001)).await.is_some()
    })
    .await;

    admin.delete_order(OrderId::new(300_001)).await.unwrap();
    eventually("kitchen to see the delete", || async {
        kitchen.order(OrderId::new(300_001)).await.is_none()
    })
    .await;

    let on_server = server.state.store.state(OrderStoreState::orders_newest_first).await;
    assert_eq!(on_server, kitchen.orders().await);
    assert_eq!(on_server, admin.orders().await);

    admin.shutdown().await.unwrap();
    kitchen.shutdown().await.unwrap();
}

#[tokio::test]
async fn hides_stay_on_the_client_by_default() {
    let (addr, server) = start(Config::default(), vec![order(100_001), order(100_002)]).await;
    let viewer = live_client(client_config(addr)).await;
    let other = live_client(client_config(addr)).await;

    viewer.hide_order(OrderId::new(100_001)).await.unwrap();

    let visible: Vec<OrderId> = viewer.orders().await.iter().map(|o| o.id).collect();
    assert_eq!(visible, vec![OrderId::new(100_002)]);
    assert!(viewer.order(OrderId::new(100_001)).await.unwrap().hidden);
    assert_eq!(other.orders().await.len(), 2);
    assert!(
        !server
            .state
            .store
            .state(|s| s.get(OrderId::new(100_001)).unwrap().hidden)
            .await
    );
}

#[tokio::test]
async fn durable_hides_reach_the_server() {
    let mut config = Config::default();
    config.store.durable_hide = true;
    let (addr, server) = start(config, vec![order(100_001)]).await;
    let viewer = live_client(client_config(addr).durable(true)).await;

    viewer.hide_order(OrderId::new(100_001)).await.unwrap();

    eventually("the server to persist the hide", || async {
        server
            .state
            .store
            .state(|s| s.get(OrderId::new(100_001)).is_some_and(|o| o.hidden))
            .await
    })
    .await;

    // A new connection receives the hidden flag in its snapshot
    let late = live_client(client_config(addr)).await;
    assert!(late.orders().await.is_empty());
}

#[tokio::test]
async fn offline_mutations_are_replaced_by_the_next_snapshot() {
    // Reserve a port with nothing listening yet
    let addr = {
        let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
        reserved.local_addr().unwrap()
    };
    let client = SyncClient::connect(client_config(addr));

    client.place_order(order(300_001)).await.unwrap();
    assert_ne!(client.status().await, SyncStatus::Live);
    assert!(client.order(OrderId::new(300_001)).await.is_some());

    let listener = TcpListener::bind(addr).await.unwrap();
    let server = serve(listener, Config::default(), vec![order(100_001)]).await;
    client.wait_until_live(WAIT).await.unwrap();

    let ids: Vec<OrderId> = client.orders().await.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![OrderId::new(100_001)]);
    assert!(
        !server
            .state
            .store
            .state(|s| s.contains(OrderId::new(300_001)))
            .await
    );
}

#[tokio::test]
async fn status_changes_are_published() {
    let (addr, _server) = start(Config::default(), vec![]).await;
    let client = SyncClient::connect(client_config(addr));
    let mut changes = client.subscribe();

    client.wait_until_live(WAIT).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(action) = changes.try_recv() {
        if let bakery_orders::ProjectionAction::StatusChanged(status) = action {
            seen.push(status);
        }
    }
    assert_eq!(seen.last(), Some(&SyncStatus::Live));
}
