//! Trade-event routing integration tests, driven over a real WebSocket
//! connection: trades route only to the authenticated account they belong
//! to, never by symbol subscription.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use stream_gateway::domain::model::{Trade, TradeSide, TradeState};
use stream_gateway::gateway::auth::HmacBearerVerifier;
use stream_gateway::gateway::protocol::{ClientFrame, ServerFrame};
use stream_gateway::{router, EventDispatcher, GatewayConfig, GatewayState};

const TEST_SECRET: &[u8] = b"trade-routing-secret";

async fn spawn_server(dispatcher: Arc<EventDispatcher>) -> SocketAddr {
    let verifier = Arc::new(HmacBearerVerifier::new(TEST_SECRET.to_vec()));
    let state = GatewayState::new(dispatcher, verifier, GatewayConfig::default());
    let app = router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    addr
}

async fn recv_frame<S>(stream: &mut S) -> ServerFrame
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("frame did not parse");
        }
    }
}

fn make_trade(account_id: i64, order_id: i64) -> Trade {
    Trade {
        order_id,
        account_id,
        symbol: "EURUSD".to_string(),
        side: TradeSide::Buy,
        volume_lots: Decimal::new(10, 2),
        open_price: Decimal::new(11000, 4),
        close_price: Decimal::ZERO,
        stop_loss: Decimal::ZERO,
        take_profit: Decimal::ZERO,
        profit: Decimal::ZERO,
        state: TradeState::Open,
        broker_timestamp: Utc::now().timestamp(),
    }
}

async fn authenticate(
    client: &mut (impl SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error>
              + StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
              + Unpin),
    verifier: &HmacBearerVerifier,
    account_id: i64,
) {
    let _welcome = recv_frame(client).await;
    let token = verifier.issue(account_id, Utc::now().timestamp() + 3600);
    let auth = serde_json::to_string(&ClientFrame::Auth { token }).unwrap();
    client.send(Message::Text(auth.into())).await.unwrap();
    match recv_frame(client).await {
        ServerFrame::AuthResponse { success, .. } => assert!(success),
        other => panic!("expected auth response, got {other:?}"),
    }
}

#[tokio::test]
async fn trade_routes_only_to_its_own_account() {
    let dispatcher = Arc::new(EventDispatcher::new(64, 64));
    let addr = spawn_server(Arc::clone(&dispatcher)).await;
    let verifier = HmacBearerVerifier::new(TEST_SECRET.to_vec());

    let (mut owner, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let (mut other, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    authenticate(&mut owner, &verifier, 555).await;
    authenticate(&mut other, &verifier, 777).await;

    dispatcher.dispatch_trade(make_trade(555, 9001));

    match recv_frame(&mut owner).await {
        ServerFrame::Trade { order, login, .. } => {
            assert_eq!(order, 9001);
            assert_eq!(login, 555);
        }
        other => panic!("expected a trade frame, got {other:?}"),
    }

    let nothing = timeout(Duration::from_millis(200), other.next()).await;
    assert!(nothing.is_err(), "account 777 should not see account 555's trade");
}
