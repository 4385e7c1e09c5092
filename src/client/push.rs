use async_stream::stream;
use futures::{
    StreamExt,
    future::BoxFuture,
    stream::BoxStream,
};
use reqwest::Method;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{api::HttpApi, error::HttpClientError};
use crate::{
    dto::push::{PAID_EVENT, PushMessage},
    timer::{PushChannel, PushError},
};

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental decoder for a `text/event-stream` body.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every frame completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend(chunk.iter().filter(|byte| **byte != b'\r'));
        let mut frames = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|pair| pair == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(frame) = parse_block(&String::from_utf8_lossy(&block[..end])) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn parse_block(block: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data: Option<String> = None;
    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value.to_owned()),
            "data" => match &mut data {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_owned()),
            },
            _ => {}
        }
    }
    data.map(|data| SseFrame { event, data })
}

/// Push channel reading `GET /shops/{shop_id}/events`.
#[derive(Clone)]
pub struct HttpPushChannel {
    api: HttpApi,
}

impl HttpPushChannel {
    pub fn new(api: HttpApi) -> Self {
        Self { api }
    }
}

impl PushChannel for HttpPushChannel {
    fn subscribe(
        &self,
        shop_id: Uuid,
    ) -> BoxFuture<'static, Result<BoxStream<'static, PushMessage>, PushError>> {
        let api = self.api.clone();
        Box::pin(async move {
            let path = format!("/shops/{shop_id}/events");
            let response = api.send(api.request(Method::GET, &path), &path).await?;
            let mut body = response.bytes_stream();

            let messages = stream! {
                let mut decoder = SseDecoder::new();
                while let Some(chunk) = body.next().await {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(source) => {
                            let err = HttpClientError::StreamRead { path: path.clone(), source };
                            warn!(%shop_id, error = %err, "push stream interrupted");
                            break;
                        }
                    };
                    for frame in decoder.push(&chunk) {
                        if frame.event.as_deref() != Some(PAID_EVENT) {
                            debug!(%shop_id, event = ?frame.event, "ignoring push frame");
                            continue;
                        }
                        match serde_json::from_str::<PushMessage>(&frame.data) {
                            Ok(message) => yield message,
                            Err(err) => warn!(%shop_id, error = %err, "dropping malformed push message"),
                        }
                    }
                }
            };
            Ok(messages.boxed())
        })
    }
}
