use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{
    Stream, StreamExt,
    future::{self, BoxFuture},
    stream::BoxStream,
};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        push::{PAID_EVENT, PushMessage},
        sse::{HANDSHAKE_EVENT, Handshake, ServerEvent},
    },
    state::SharedState,
    timer::{PushChannel, PushError},
};

/// Subscribe to a shop's push stream.
pub fn subscribe(state: &SharedState, shop_id: Uuid) -> broadcast::Receiver<ServerEvent> {
    state.shop_hub(shop_id).subscribe()
}

fn handshake(state: &SharedState, shop_id: Uuid) -> Option<Event> {
    let payload = Handshake {
        shop_id,
        message: "push stream connected".into(),
        degraded: state.is_degraded(),
    };
    match ServerEvent::json(Some(HANDSHAKE_EVENT.to_string()), &payload) {
        Ok(event) => Some(to_event(event)),
        Err(err) => {
            warn!(%shop_id, error = %err, "failed to serialise handshake");
            None
        }
    }
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Convert a hub receiver into an SSE response, forwarding events and releasing
/// the shop hub once the client disconnects.
pub fn to_sse_stream(
    state: SharedState,
    shop_id: Uuid,
    mut receiver: broadcast::Receiver<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);
    let greeting = handshake(&state, shop_id);

    tokio::spawn(async move {
        if let Some(greeting) = greeting {
            if tx.send(Ok(greeting)).await.is_err() {
                drop(receiver);
                state.hubs().release(shop_id);
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(%shop_id, skipped, "push listener lagged; messages dropped");
                            continue;
                        }
                    }
                }
            }
        }

        drop(receiver);
        state.hubs().release(shop_id);
        info!(%shop_id, "push stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// In-process push channel for engines running next to the server.
#[derive(Clone)]
pub struct LocalPushChannel {
    state: SharedState,
}

impl LocalPushChannel {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

impl PushChannel for LocalPushChannel {
    fn subscribe(
        &self,
        shop_id: Uuid,
    ) -> BoxFuture<'static, Result<BoxStream<'static, PushMessage>, PushError>> {
        let receiver = subscribe(&self.state, shop_id);
        let stream = BroadcastStream::new(receiver)
            .filter_map(move |item| {
                future::ready(match item {
                    Ok(event) if event.event.as_deref() == Some(PAID_EVENT) => {
                        match serde_json::from_str::<PushMessage>(&event.data) {
                            Ok(message) => Some(message),
                            Err(err) => {
                                warn!(%shop_id, error = %err, "dropping malformed push message");
                                None
                            }
                        }
                    }
                    Ok(_) => None,
                    Err(err) => {
                        debug!(%shop_id, error = %err, "local push listener lagged");
                        None
                    }
                })
            })
            .boxed();
        Box::pin(async move { Ok(stream) })
    }
}
