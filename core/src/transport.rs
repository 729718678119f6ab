//! Push transport: the SSE subscription to the chat gateway
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::sse::{SseDecoder, SseFrame};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

pub const SSE_PATH: &str = "/api/chat/sse/";

/// What a live push session yields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFrame {
    /// JSON payload of one event
    Data(String),
    /// Keepalive; carries nothing but proves the session is alive
    Heartbeat,
}

pub type FrameStream = BoxStream<'static, Result<PushFrame>>;

/// Opens push sessions. `connect` resolves once the session is open.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self) -> Result<FrameStream>;
}

/// `GET /api/chat/sse/` over reqwest
pub struct SseTransport {
    client: reqwest::Client,
    url: String,
}

impl SseTransport {
    pub fn new(config: &Config) -> Result<Self> {
        // No overall timeout: the response body is the long-lived stream
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            url: config.endpoint(SSE_PATH),
        })
    }
}

#[async_trait]
impl PushTransport for SseTransport {
    async fn connect(&self) -> Result<FrameStream> {
        let resp = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("connect to {}: {}", self.url, e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ChatError::Transport(format!(
                "push endpoint answered {}",
                status.as_u16()
            )));
        }

        Ok(decode_frames(resp.bytes_stream().boxed()))
    }
}

type ByteStream = BoxStream<'static, reqwest::Result<bytes::Bytes>>;

/// Turn a raw body stream into push frames
fn decode_frames(body: ByteStream) -> FrameStream {
    let state = (body, SseDecoder::new(), VecDeque::<PushFrame>::new(), false);
    stream::unfold(state, |(mut body, mut decoder, mut pending, done)| async move {
        loop {
            if let Some(frame) = pending.pop_front() {
                return Some((Ok(frame), (body, decoder, pending, done)));
            }
            if done {
                return None;
            }
            match body.next().await {
                Some(Ok(chunk)) => {
                    for frame in decoder.feed(&chunk) {
                        match frame {
                            SseFrame::Event { data, .. } => pending.push_back(PushFrame::Data(data)),
                            SseFrame::Heartbeat => pending.push_back(PushFrame::Heartbeat),
                            SseFrame::Retry(ms) => debug!("Ignoring server retry hint of {}ms", ms),
                        }
                    }
                }
                Some(Err(e)) => {
                    let err = ChatError::Transport(format!("push stream read: {}", e));
                    return Some((Err(err), (body, decoder, pending, true)));
                }
                None => return None,
            }
        }
    })
    .boxed()
}

/// Wrap a frame stream so that silence longer than `timeout` ends it with an error
pub fn with_idle_timeout(frames: FrameStream, timeout: Option<Duration>) -> FrameStream {
    let Some(timeout) = timeout else {
        return frames;
    };
    stream::unfold((frames, false), move |(mut frames, done)| async move {
        if done {
            return None;
        }
        match tokio::time::timeout(timeout, frames.next()).await {
            Ok(Some(item)) => {
                let failed = item.is_err();
                Some((item, (frames, failed)))
            }
            Ok(None) => None,
            Err(_) => Some((
                Err(ChatError::Transport(format!(
                    "no push traffic for {}s",
                    timeout.as_secs()
                ))),
                (frames, true),
            )),
        }
    })
    .boxed()
}
