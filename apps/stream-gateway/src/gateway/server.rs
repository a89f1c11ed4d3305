//! WebSocket gateway server.
//!
//! One task pair per connection: a read loop parsing [`ClientFrame`]s and a
//! write loop draining a per-client bounded outbound mailbox. The two are
//! deliberately split so a slow client reading its socket never blocks the
//! read loop from processing new subscribe/auth/ping frames, and a
//! misbehaving client sending garbage never blocks delivery to others.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::dispatcher::aggregator::QuoteAggregator;
use crate::dispatcher::mailbox::{mailbox, MailboxSender};
use crate::dispatcher::{DispatchEvent, SharedEventDispatcher};
use crate::domain::subscription::SubscriptionManager;
use crate::liveness::{LivenessConfig, LivenessEvent, LivenessManager, LivenessState};

use super::auth::{BearerVerifier, TokenVerdict};
use super::protocol::{ClientFrame, ServerFrame, SubscriptionAction};

/// Tunables for the gateway server.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Capacity of each client's outbound mailbox.
    pub client_mailbox_capacity: usize,
    /// Whether `subscribe`/`get_quotes` require a prior successful `auth`.
    pub require_auth: bool,
    /// Liveness tuning; the client's own `ping` frames serve as the
    /// liveness signal the server waits on.
    pub liveness: LivenessConfig,
    /// Optional per-subscriber quote rate limit (updates/second/symbol).
    /// Trades are never rate-limited.
    pub max_quote_updates_per_second: Option<u32>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            client_mailbox_capacity: 256,
            require_auth: true,
            liveness: LivenessConfig::new(Duration::from_secs(30), Duration::from_secs(60)),
            max_quote_updates_per_second: None,
        }
    }
}

/// One outbound item for a client: either a relayed dispatcher event or a
/// protocol-level frame addressed directly to this client.
#[derive(Debug, Clone)]
enum Outbound {
    Dispatch(DispatchEvent),
    Frame(ServerFrame),
}

/// Shared state for all connections.
pub struct GatewayState {
    dispatcher: SharedEventDispatcher,
    subscriptions: SubscriptionManager,
    verifier: Arc<dyn BearerVerifier>,
    config: GatewayConfig,
    next_client_id: AtomicU64,
    connected_clients: AtomicU64,
}

impl GatewayState {
    /// Build shared gateway state.
    #[must_use]
    pub fn new(
        dispatcher: SharedEventDispatcher,
        verifier: Arc<dyn BearerVerifier>,
        config: GatewayConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            dispatcher,
            subscriptions: SubscriptionManager::new(),
            verifier,
            config,
            next_client_id: AtomicU64::new(1),
            connected_clients: AtomicU64::new(0),
        })
    }

    /// Number of currently connected clients.
    #[must_use]
    pub fn connected_clients(&self) -> u64 {
        self.connected_clients.load(Ordering::Relaxed)
    }
}

/// Build the axum router for the streaming gateway.
#[must_use]
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, addr))
}

async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>, addr: SocketAddr) {
    let client_id = state.next_client_id.fetch_add(1, Ordering::SeqCst);
    state.connected_clients.fetch_add(1, Ordering::SeqCst);
    tracing::info!(client_id, %addr, "client connected");

    let (socket_tx, socket_rx) = socket.split();
    let (outbound_tx, outbound_rx) = mailbox::<Outbound>(state.config.client_mailbox_capacity);
    let (subscriber_id, dispatch_rx) = state.dispatcher.register_subscriber();

    let account_id = Arc::new(AtomicI64::new(0));
    let authenticated = Arc::new(AtomicBool::new(!state.config.require_auth));
    let cancel = CancellationToken::new();
    let liveness_state = Arc::new(LivenessState::new());
    let (liveness_tx, liveness_rx) = tokio::sync::mpsc::channel::<LivenessEvent>(8);

    outbound_tx.deliver(Outbound::Frame(ServerFrame::Welcome {
        client_id,
        server_time: Utc::now(),
        require_auth: state.config.require_auth,
    }));

    let relay_handle = tokio::spawn(relay_dispatch_events(
        dispatch_rx,
        outbound_tx.clone(),
        state.config.max_quote_updates_per_second,
        cancel.clone(),
    ));
    let write_handle = tokio::spawn(write_loop(socket_tx, outbound_rx, cancel.clone()));
    let liveness_manager = LivenessManager::new(
        state.config.liveness,
        Arc::clone(&liveness_state),
        liveness_tx,
        cancel.clone(),
    );
    let liveness_handle = tokio::spawn(run_liveness(
        liveness_manager,
        Arc::clone(&liveness_state),
        liveness_rx,
        cancel.clone(),
    ));

    read_loop(
        socket_rx,
        &state,
        client_id,
        subscriber_id,
        &outbound_tx,
        &account_id,
        &authenticated,
        &liveness_state,
    )
    .await;

    cancel.cancel();
    outbound_tx.close();
    state.dispatcher.remove_subscriber(subscriber_id);
    state.subscriptions.remove_client(client_id);
    state.connected_clients.fetch_sub(1, Ordering::SeqCst);

    let _ = relay_handle.await;
    let _ = write_handle.await;
    let _ = liveness_handle.await;
    tracing::info!(client_id, "client disconnected");
}

/// Relay a subscriber's dispatcher events to its outbound mailbox. Quote
/// updates are routed through a [`QuoteAggregator`] when a rate limit is
/// configured; trade updates always pass straight through.
async fn relay_dispatch_events(
    mut dispatch_rx: crate::dispatcher::mailbox::MailboxReceiver<DispatchEvent>,
    outbound_tx: MailboxSender<Outbound>,
    max_quote_updates_per_second: Option<u32>,
    cancel: CancellationToken,
) {
    let throttled = max_quote_updates_per_second.map(|rate| {
        let (agg_tx, mut agg_rx) = mailbox::<DispatchEvent>(64);
        let aggregator = QuoteAggregator::new(rate, agg_tx);
        let admitter = aggregator.spawn_admitter(cancel.clone());
        let forward_tx = outbound_tx.clone();
        let forward = tokio::spawn(async move {
            while let Some(event) = agg_rx.recv().await {
                forward_tx.deliver(Outbound::Dispatch(event));
            }
        });
        (aggregator, admitter, forward)
    });

    while let Some(event) = dispatch_rx.recv().await {
        match (&throttled, &event) {
            (Some((aggregator, _, _)), DispatchEvent::Quote(quote)) => {
                aggregator.offer(quote.clone());
            }
            _ => outbound_tx.deliver(Outbound::Dispatch(event)),
        }
    }

    if let Some((aggregator, admitter, forward)) = throttled {
        let _ = admitter.await;
        drop(aggregator);
        let _ = forward.await;
    }
}

async fn run_liveness(
    manager: LivenessManager,
    liveness_state: Arc<LivenessState>,
    mut liveness_rx: tokio::sync::mpsc::Receiver<LivenessEvent>,
    cancel: CancellationToken,
) {
    let driver = tokio::spawn(manager.run());
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = liveness_rx.recv() => {
                match event {
                    Some(LivenessEvent::Timeout) => {
                        tracing::warn!("client liveness timeout, disconnecting");
                        cancel.cancel();
                        break;
                    }
                    Some(LivenessEvent::SendPing) => liveness_state.mark_ping_sent(),
                    None => {}
                }
            }
        }
    }
    driver.abort();
}

#[allow(clippy::too_many_arguments)]
async fn read_loop(
    mut socket_rx: futures_util::stream::SplitStream<WebSocket>,
    state: &Arc<GatewayState>,
    client_id: u64,
    subscriber_id: crate::dispatcher::SubscriberId,
    outbound_tx: &MailboxSender<Outbound>,
    account_id: &Arc<AtomicI64>,
    authenticated: &Arc<AtomicBool>,
    liveness_state: &Arc<LivenessState>,
) {
    while let Some(message) = socket_rx.next().await {
        let message = match message {
            Ok(m) => m,
            Err(err) => {
                tracing::debug!(client_id, %err, "websocket read error");
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => continue,
        };

        let frame: ClientFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(err) => {
                outbound_tx.deliver(Outbound::Frame(ServerFrame::Error {
                    message: format!("malformed frame: {err}"),
                }));
                continue;
            }
        };

        handle_client_frame(
            frame,
            state,
            client_id,
            subscriber_id,
            outbound_tx,
            account_id,
            authenticated,
            liveness_state,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_client_frame(
    frame: ClientFrame,
    state: &Arc<GatewayState>,
    client_id: u64,
    subscriber_id: crate::dispatcher::SubscriberId,
    outbound_tx: &MailboxSender<Outbound>,
    account_id: &Arc<AtomicI64>,
    authenticated: &Arc<AtomicBool>,
    liveness_state: &Arc<LivenessState>,
) {
    match frame {
        ClientFrame::Auth { token } => match state.verifier.verify(&token) {
            TokenVerdict::Valid { account_id: acct } => {
                account_id.store(acct, Ordering::SeqCst);
                authenticated.store(true, Ordering::SeqCst);
                state.dispatcher.subscribe_trades(acct, subscriber_id);
                outbound_tx.deliver(Outbound::Frame(ServerFrame::AuthResponse {
                    success: true,
                    user_login: Some(acct),
                    message: None,
                }));
            }
            TokenVerdict::Expired => {
                outbound_tx.deliver(Outbound::Frame(ServerFrame::AuthResponse {
                    success: false,
                    user_login: None,
                    message: Some("token expired".to_string()),
                }));
            }
            TokenVerdict::Invalid => {
                outbound_tx.deliver(Outbound::Frame(ServerFrame::AuthResponse {
                    success: false,
                    user_login: None,
                    message: Some("invalid token".to_string()),
                }));
            }
        },
        ClientFrame::Subscribe { symbols } => {
            if !require_auth_satisfied(state, authenticated, outbound_tx) {
                return;
            }
            if symbols.is_empty() {
                outbound_tx.deliver(Outbound::Frame(ServerFrame::Error {
                    message: "No symbols specified".to_string(),
                }));
                return;
            }
            let change = state.subscriptions.subscribe(client_id, &symbols);
            for symbol in &change.changed {
                state.dispatcher.subscribe_quotes(symbol, subscriber_id);
            }
            outbound_tx.deliver(Outbound::Frame(ServerFrame::SubscriptionUpdate {
                action: SubscriptionAction::Subscribed,
                symbols: change.changed,
                all_subscriptions: change.current,
            }));
        }
        ClientFrame::Unsubscribe { symbols } => {
            if !require_auth_satisfied(state, authenticated, outbound_tx) {
                return;
            }
            let change = state.subscriptions.unsubscribe(client_id, &symbols);
            for symbol in &change.changed {
                state.dispatcher.unsubscribe_quotes(symbol, subscriber_id);
            }
            outbound_tx.deliver(Outbound::Frame(ServerFrame::SubscriptionUpdate {
                action: SubscriptionAction::Unsubscribed,
                symbols: change.changed,
                all_subscriptions: change.current,
            }));
        }
        ClientFrame::GetQuotes { symbols } => {
            if !require_auth_satisfied(state, authenticated, outbound_tx) {
                return;
            }
            let symbols = symbols.unwrap_or_else(|| state.subscriptions.symbols_for(client_id));
            for symbol in symbols {
                if let Some(quote) = state.dispatcher.latest_quote(&symbol) {
                    outbound_tx.deliver(Outbound::Frame(ServerFrame::Quote {
                        symbol: quote.symbol,
                        bid: quote.bid,
                        ask: quote.ask,
                        spread: quote.spread,
                        time: quote.broker_timestamp,
                        server_time: quote.receive_time,
                    }));
                }
            }
        }
        ClientFrame::Ping => {
            liveness_state.record_pong();
            outbound_tx.deliver(Outbound::Frame(ServerFrame::Pong));
        }
    }
}

fn require_auth_satisfied(
    state: &Arc<GatewayState>,
    authenticated: &Arc<AtomicBool>,
    outbound_tx: &MailboxSender<Outbound>,
) -> bool {
    if !state.config.require_auth || authenticated.load(Ordering::SeqCst) {
        return true;
    }
    outbound_tx.deliver(Outbound::Frame(ServerFrame::Error {
        message: "Authentication required".to_string(),
    }));
    false
}

async fn write_loop(
    mut socket_tx: futures_util::stream::SplitSink<WebSocket, Message>,
    mut outbound_rx: crate::dispatcher::mailbox::MailboxReceiver<Outbound>,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            () = cancel.cancelled() => break,
            item = outbound_rx.recv() => item,
        };
        let Some(item) = item else { break };

        let frame = match item {
            Outbound::Frame(frame) => frame,
            Outbound::Dispatch(DispatchEvent::Quote(q)) => ServerFrame::Quote {
                symbol: q.symbol,
                bid: q.bid,
                ask: q.ask,
                spread: q.spread,
                time: q.broker_timestamp,
                server_time: q.receive_time,
            },
            Outbound::Dispatch(DispatchEvent::Trade(t)) => ServerFrame::Trade {
                order: t.order_id,
                login: t.account_id,
                symbol: t.symbol,
                cmd: format!("{:?}", t.side),
                volume: t.volume_lots,
                open_price: t.open_price,
                close_price: t.close_price,
                sl: t.stop_loss,
                tp: t.take_profit,
                profit: t.profit,
                state: format!("{:?}", t.state),
            },
        };

        let Ok(json) = serde_json::to_string(&frame) else {
            continue;
        };
        if socket_tx.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
    let _ = socket_tx.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::EventDispatcher;
    use crate::gateway::auth::HmacBearerVerifier;

    fn test_state() -> Arc<GatewayState> {
        let dispatcher = Arc::new(EventDispatcher::new(16, 100));
        let verifier = Arc::new(HmacBearerVerifier::new(b"test".to_vec()));
        GatewayState::new(dispatcher, verifier, GatewayConfig::default())
    }

    #[test]
    fn router_builds_without_panicking() {
        let state = test_state();
        let _router = router(state);
    }

    #[test]
    fn connected_clients_starts_at_zero() {
        let state = test_state();
        assert_eq!(state.connected_clients(), 0);
    }
}
