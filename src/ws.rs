//! WebSocket push channel.
//!
//! Each connection forwards `updateSensorData` events from the broadcaster and
//! accepts `changeSortOrder` / `applyFilter` events that rewrite the shared
//! view settings. The first connection starts the broadcast loop.

use crate::domain::{ClientEvent, DateFilter, ServerEvent};
use crate::server::AppState;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::select;
use tokio::sync::broadcast::error::RecvError;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let client = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    let (mut sender, mut receiver) = socket.split();

    // subscribe before starting the loop so the very first tick is not missed
    let mut events = state.broadcaster.subscribe();
    state.broadcaster.ensure_started();
    tracing::info!(client, clients = state.broadcaster.subscriber_count(), "client connected");

    loop {
        select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let json = match encode(&event) {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::error!(error = %e, "failed to serialize event");
                                continue;
                            }
                        };
                        if sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(client, skipped, "slow client skipped updates");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => apply_client_event(&state, client, &text).await,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(client, error = %e, "websocket error");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::info!(client, "client disconnected");
}

async fn apply_client_event(state: &AppState, client: u64, text: &str) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(client, error = %e, "ignoring malformed client event");
            return;
        }
    };

    match event {
        ClientEvent::ChangeSortOrder(order) => {
            state.view.write().await.sort = order;
            tracing::info!(client, %order, "sort order changed");
        }
        ClientEvent::ApplyFilter(params) => match DateFilter::parse(&params) {
            Ok(filter) => {
                state.view.write().await.filter = filter;
                tracing::info!(
                    client,
                    start = ?filter.start,
                    end = ?filter.end,
                    "filter applied"
                );
            }
            Err(e) => tracing::warn!(client, error = %e, "ignoring filter"),
        },
    }
}

fn encode(event: &ServerEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}
