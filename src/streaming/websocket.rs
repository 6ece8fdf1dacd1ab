// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! WebSocket server for real-time streaming

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::StreamingConfig;
use crate::config::BroadcastConfig;
use crate::core::{EventBus, SnapshotEvent, SnapshotSource};

/// Topics a client can subscribe to
pub const TOPICS: [&str; 3] = ["readings", "statistics", "alerts"];

/// Commands a client may send, as `{"type": "...", ...}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientCommand {
    Ping,
    GetInitialData,
    Subscribe { topic: String },
    Unsubscribe { topic: String },
}

/// Topics one client receives. Starts with all of them; `*` stands for every topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriptions {
    topics: BTreeSet<&'static str>,
}

impl Default for Subscriptions {
    fn default() -> Self {
        Self {
            topics: TOPICS.into_iter().collect(),
        }
    }
}

impl Subscriptions {
    /// Returns false for an unknown topic
    pub fn subscribe(&mut self, topic: &str) -> bool {
        if topic == "*" {
            self.topics.extend(TOPICS);
            return true;
        }
        match known_topic(topic) {
            Some(t) => {
                self.topics.insert(t);
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe(&mut self, topic: &str) -> bool {
        if topic == "*" {
            self.topics.clear();
            return true;
        }
        match known_topic(topic) {
            Some(t) => {
                self.topics.remove(t);
                true
            }
            None => false,
        }
    }

    /// Initial data is always delivered
    pub fn wants(&self, event: &SnapshotEvent) -> bool {
        matches!(event, SnapshotEvent::InitialData(_)) || self.topics.contains(event.topic())
    }

    pub fn topics(&self) -> Vec<&'static str> {
        self.topics.iter().copied().collect()
    }
}

fn known_topic(topic: &str) -> Option<&'static str> {
    TOPICS.iter().copied().find(|t| *t == topic)
}

struct ClientHandle {
    addr: SocketAddr,
    connected_at: DateTime<Utc>,
}

type Clients = Arc<RwLock<HashMap<String, ClientHandle>>>;
type WsSender = SplitSink<WebSocketStream<TcpStream>, Message>;

#[derive(Clone)]
struct Shared {
    clients: Clients,
    bus: Arc<EventBus>,
    source: Arc<dyn SnapshotSource>,
    initial_readings: usize,
    initial_alerts: usize,
}

/// WebSocket server: relays event bus traffic to each connected client, filtered by
/// the client's subscriptions
pub struct WebSocketServer {
    addr: String,
    /// One permit per client slot, taken at accept time
    slots: Arc<Semaphore>,
    shared: Shared,
}

impl WebSocketServer {
    pub fn new(
        config: &StreamingConfig,
        broadcast: &BroadcastConfig,
        bus: Arc<EventBus>,
        source: Arc<dyn SnapshotSource>,
    ) -> Self {
        Self {
            addr: config.websocket_addr(),
            slots: Arc::new(Semaphore::new(config.websocket_max_clients)),
            shared: Shared {
                clients: Arc::new(RwLock::new(HashMap::new())),
                bus,
                source,
                initial_readings: broadcast.initial_readings,
                initial_alerts: broadcast.initial_alerts,
            },
        }
    }

    /// Bind and start accepting. Returns the bound address and the accept loop.
    pub async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(&self.addr).await?;
        let local_addr = listener.local_addr()?;

        info!("WebSocket server listening on ws://{}", local_addr);

        let shared = self.shared.clone();
        let slots = self.slots.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, addr)) => {
                                let Ok(slot) = slots.clone().try_acquire_owned() else {
                                    warn!("Max clients reached, rejecting connection from {}", addr);
                                    continue;
                                };

                                tokio::spawn(handle_connection(stream, addr, slot, shared.clone(), shutdown.resubscribe()));
                            }
                            Err(e) => {
                                error!("Accept error: {}", e);
                            }
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("WebSocket server shutting down");
                        break;
                    }
                }
            }
        });

        Ok((local_addr, handle))
    }

    pub async fn client_count(&self) -> usize {
        self.shared.clients.read().await.len()
    }
}

async fn send_json<T: Serialize>(sender: &mut WsSender, value: &T) -> Result<()> {
    let text = serde_json::to_string(value)?;
    sender.send(Message::Text(text)).await?;
    Ok(())
}

async fn send_initial_data(sender: &mut WsSender, shared: &Shared) -> Result<()> {
    let source = shared.source.clone();
    let (readings, alerts) = (shared.initial_readings, shared.initial_alerts);

    match tokio::task::spawn_blocking(move || source.initial_data(readings, alerts)).await? {
        Ok(data) => send_json(sender, &SnapshotEvent::InitialData(data)).await,
        Err(e) => {
            warn!("Initial data unavailable: {}", e);
            send_json(sender, &serde_json::json!({"type": "error", "message": e.to_string()})).await
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    _slot: OwnedSemaphorePermit,
    shared: Shared,
    mut shutdown: broadcast::Receiver<()>,
) {
    let client_id = uuid::Uuid::new_v4().to_string();

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    info!("New WebSocket connection from {} (id: {})", addr, client_id);

    // Register client
    shared.clients.write().await.insert(
        client_id.clone(),
        ClientHandle {
            addr,
            connected_at: Utc::now(),
        },
    );

    // Subscribe before the snapshot is taken so nothing published in between is lost
    let mut events = shared.bus.subscribe();
    let mut subscriptions = Subscriptions::default();
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let welcome = serde_json::json!({
        "type": "welcome",
        "clientId": client_id,
        "server": crate::NAME,
        "version": crate::VERSION,
        "topics": subscriptions.topics(),
    });
    if let Err(e) = send_json(&mut ws_sender, &welcome).await {
        warn!("Failed to send welcome: {}", e);
    }
    if let Err(e) = send_initial_data(&mut ws_sender, &shared).await {
        warn!("Failed to send initial data to {}: {}", addr, e);
    }

    loop {
        tokio::select! {
            // Incoming messages from client
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received from {}: {}", addr, text);

                        let sent = match serde_json::from_str::<ClientCommand>(&text) {
                            Ok(ClientCommand::Ping) => {
                                send_json(&mut ws_sender, &serde_json::json!({"type": "pong"})).await
                            }
                            Ok(ClientCommand::GetInitialData) => send_initial_data(&mut ws_sender, &shared).await,
                            Ok(ClientCommand::Subscribe { topic }) => {
                                let reply = if subscriptions.subscribe(&topic) {
                                    serde_json::json!({"type": "subscribed", "topics": subscriptions.topics()})
                                } else {
                                    serde_json::json!({"type": "error", "message": format!("unknown topic '{}'", topic)})
                                };
                                send_json(&mut ws_sender, &reply).await
                            }
                            Ok(ClientCommand::Unsubscribe { topic }) => {
                                let reply = if subscriptions.unsubscribe(&topic) {
                                    serde_json::json!({"type": "unsubscribed", "topics": subscriptions.topics()})
                                } else {
                                    serde_json::json!({"type": "error", "message": format!("unknown topic '{}'", topic)})
                                };
                                send_json(&mut ws_sender, &reply).await
                            }
                            Err(e) => {
                                send_json(&mut ws_sender, &serde_json::json!({"type": "error", "message": e.to_string()})).await
                            }
                        };
                        if let Err(e) = sent {
                            warn!("Failed to reply to {}: {}", addr, e);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket closed by client {}", addr);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }

            // Outgoing broadcasts
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if !subscriptions.wants(&event) {
                            continue;
                        }
                        if let Err(e) = send_json(&mut ws_sender, &event).await {
                            warn!("Failed to send to {}: {}", addr, e);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Client {} fell behind, skipped {} events", addr, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            _ = shutdown.recv() => {
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    // Remove client
    if let Some(client) = shared.clients.write().await.remove(&client_id) {
        let connected = Utc::now() - client.connected_at;
        info!(
            "WebSocket client {} disconnected after {}s",
            client.addr,
            connected.num_seconds()
        );
    }
}
