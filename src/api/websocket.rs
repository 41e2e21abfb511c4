//! WebSocket support for real-time wallet events
//!
//! Provides a broadcast channel for pushing events to connected clients.

use crate::crypto::Address;
use crate::dispatch::Ledger;
use crate::multisig::{EventRecord, FactoryEvent, WalletEvent};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Maximum number of events to buffer per subscriber
const BROADCAST_CAPACITY: usize = 100;

/// WebSocket events that can be broadcast to clients
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WsEvent {
    /// A wallet emitted an event
    Wallet {
        wallet: Address,
        record: EventRecord<WalletEvent>,
    },
    /// A factory emitted an event
    Factory {
        factory: Address,
        record: EventRecord<FactoryEvent>,
    },
    /// An account was funded
    BalanceChanged { account: Address, balance: String },
    /// Connection established
    Connected { message: String },
    /// Heartbeat to keep connection alive
    Ping,
}

/// Log positions already sent to clients
#[derive(Debug, Default)]
struct Published {
    wallets: HashMap<Address, usize>,
    factories: HashMap<Address, usize>,
}

/// Broadcaster for WebSocket events
///
/// Tracks how far each wallet and factory log has been published, so every
/// emitted event goes out exactly once and in log order, however many
/// requests publish concurrently.
#[derive(Debug)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsEvent>,
    published: Mutex<Published>,
}

impl WsBroadcaster {
    /// Create a new broadcaster
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            sender,
            published: Mutex::new(Published::default()),
        }
    }

    /// Create a broadcaster that treats everything already in `ledger` as sent
    pub fn for_ledger(ledger: &Ledger) -> Self {
        let broadcaster = Self::new();
        {
            let mut published = broadcaster.published();
            for wallet in ledger.wallets() {
                published
                    .wallets
                    .insert(wallet.address(), wallet.event_count());
            }
            for factory in ledger.factories() {
                published
                    .factories
                    .insert(factory.address(), factory.events().len());
            }
        }
        broadcaster
    }

    fn published(&self) -> MutexGuard<'_, Published> {
        self.published.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Broadcast an event to all connected clients
    pub fn broadcast(&self, event: WsEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    pub fn balance_changed(&self, account: Address, balance: u128) {
        self.broadcast(WsEvent::BalanceChanged {
            account,
            balance: balance.to_string(),
        });
    }

    /// Broadcast every wallet and factory event not yet published
    pub fn publish(&self, ledger: &Ledger) {
        let mut published = self.published();

        for wallet in ledger.wallets() {
            let position = published.wallets.entry(wallet.address()).or_insert(0);
            let records = wallet.events_since(*position);
            *position += records.len();
            for record in records {
                self.broadcast(WsEvent::Wallet {
                    wallet: wallet.address(),
                    record,
                });
            }
        }

        for factory in ledger.factories() {
            let position = published.factories.entry(factory.address()).or_insert(0);
            let records = factory.events_since(*position);
            *position += records.len();
            for record in records {
                self.broadcast(WsEvent::Factory {
                    factory: factory.address(),
                    record,
                });
            }
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<WsEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<crate::api::handlers::ApiState>,
) -> impl IntoResponse {
    let broadcaster = state.ws_broadcaster.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, broadcaster: Arc<WsBroadcaster>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe to broadcast events
    let mut rx = broadcaster.subscribe();

    // Send welcome message
    let welcome = WsEvent::Connected {
        message: "Connected to multisig event stream".to_string(),
    };
    if let Ok(json) = serde_json::to_string(&welcome) {
        let _ = sender.send(Message::Text(json.into())).await;
    }

    // Spawn task to forward broadcast events to this client
    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("WebSocket client lagged, {} events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Handle incoming messages (for ping/pong and graceful close)
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(Message::Text(text)) => {
                    log::debug!("Received text message: {}", text);
                }
                Err(e) => {
                    log::warn!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    log::info!("WebSocket connection closed");
}
