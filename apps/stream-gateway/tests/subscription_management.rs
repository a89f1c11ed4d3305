//! Subscription and authentication gating integration tests, driven over a
//! real WebSocket connection against the axum router.

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

use stream_gateway::domain::model::Quote;
use stream_gateway::gateway::auth::HmacBearerVerifier;
use stream_gateway::gateway::protocol::{ClientFrame, ServerFrame};
use stream_gateway::{router, EventDispatcher, GatewayConfig, GatewayState};

const TEST_SECRET: &[u8] = b"integration-test-secret";

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

fn make_quote(symbol: &str) -> Quote {
    Quote::new(
        symbol.to_string(),
        Decimal::new(11000, 4),
        Decimal::new(11002, 4),
        5,
        Utc::now().timestamp(),
        Utc::now(),
    )
}

#[tokio::test]
async fn quote_fan_out_respects_symbol_isolation() {
    let dispatcher = Arc::new(EventDispatcher::new(64, 64));
    let addr = spawn_server(Arc::clone(&dispatcher)).await;

    let (mut client_a, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let (mut client_b, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    assert!(matches!(recv_frame(&mut client_a).await, ServerFrame::Welcome { .. }));
    assert!(matches!(recv_frame(&mut client_b).await, ServerFrame::Welcome { .. }));

    let subscribe = |symbols: Vec<&str>| {
        serde_json::to_string(&serde_json::json!({
            "action": "subscribe",
            "symbols": symbols,
        }))
        .unwrap()
    };

    client_a
        .send(Message::Text(subscribe(vec!["EURUSD"]).into()))
        .await
        .unwrap();
    assert!(matches!(
        recv_frame(&mut client_a).await,
        ServerFrame::SubscriptionUpdate { .. }
    ));

    client_b
        .send(Message::Text(subscribe(vec!["GBPUSD"]).into()))
        .await
        .unwrap();
    assert!(matches!(
        recv_frame(&mut client_b).await,
        ServerFrame::SubscriptionUpdate { .. }
    ));

    dispatcher.dispatch_quote(make_quote("EURUSD"));

    match recv_frame(&mut client_a).await {
        ServerFrame::Quote { symbol, spread, .. } => {
            assert_eq!(symbol, "EURUSD");
            assert_eq!(spread, Decimal::new(200, 1));
        }
        other => panic!("expected a quote frame, got {other:?}"),
    }

    // Client B subscribed to a different symbol and must receive nothing.
    let nothing = timeout(Duration::from_millis(200), client_b.next()).await;
    assert!(nothing.is_err(), "client B should not have received the EURUSD quote");
}

#[tokio::test]
async fn subscribe_before_auth_is_rejected_when_auth_is_required() {
    let dispatcher = Arc::new(EventDispatcher::new(64, 64));
    let addr = spawn_server(dispatcher).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    match recv_frame(&mut client).await {
        ServerFrame::Welcome { require_auth, .. } => assert!(require_auth),
        other => panic!("expected welcome, got {other:?}"),
    }

    let subscribe = serde_json::to_string(&ClientFrame::Subscribe {
        symbols: vec!["EURUSD".to_string()],
    })
    .unwrap();
    client.send(Message::Text(subscribe.into())).await.unwrap();

    match recv_frame(&mut client).await {
        ServerFrame::Error { message } => assert_eq!(message, "Authentication required"),
        other => panic!("expected an auth-required error, got {other:?}"),
    }
}

#[tokio::test]
async fn valid_token_authenticates_and_unlocks_subscribe() {
    let dispatcher = Arc::new(EventDispatcher::new(64, 64));
    let addr = spawn_server(Arc::clone(&dispatcher)).await;

    let verifier = HmacBearerVerifier::new(TEST_SECRET.to_vec());
    let token = verifier.issue(9001, Utc::now().timestamp() + 3600);

    let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let _ = recv_frame(&mut client).await;

    let auth = serde_json::to_string(&ClientFrame::Auth { token }).unwrap();
    client.send(Message::Text(auth.into())).await.unwrap();

    match recv_frame(&mut client).await {
        ServerFrame::AuthResponse { success, user_login, .. } => {
            assert!(success);
            assert_eq!(user_login, Some(9001));
        }
        other => panic!("expected an auth response, got {other:?}"),
    }
}
