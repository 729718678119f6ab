//! Push connection lifecycle: connect, reconnect with backoff, fallback polling
//!
//! The manager never touches the stores. Everything it learns (session open,
//! frames, failures, timer fires) is reported through a [`LinkSink`] and fed
//! back by the owner through the `handle_*` methods, tagged with a session or
//! timer generation so that reports from a superseded session are ignored.
use crate::config::Config;
use crate::timer::SingleSlotTimer;
use crate::transport::{with_idle_timeout, PushFrame, PushTransport};
use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Never connected
    Idle,
    /// Waiting for the transport to open
    Connecting,
    /// Session open and streaming
    Connected,
    /// Last session failed; a reconnect is scheduled or deferred
    Disconnected,
    /// Torn down for good
    Closed,
}

/// What the reader task and the timers report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Opened { session: u64 },
    Frame { session: u64, payload: String },
    Failed { session: u64, reason: String },
    ReconnectDue { generation: u64 },
    PollTick { generation: u64 },
}

pub type LinkSink = Arc<dyn Fn(LinkEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub state: LinkState,
    pub attempts: u32,
    pub fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOutcome {
    /// Re-fetch list and open conversation to repair missed state
    pub resync: bool,
    pub fallback_ended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    pub attempts: u32,
    pub delay: Duration,
    pub fallback_activated: bool,
    /// False while hidden: the reconnect waits for visibility
    pub reconnect_scheduled: bool,
}

/// Reconnect delay after `attempts` consecutive failures (`attempts >= 1`)
pub fn backoff_delay(attempts: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempts.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent).map_or(max, |d| d.min(max))
}

pub struct ConnectionManager {
    transport: Arc<dyn PushTransport>,
    sink: LinkSink,
    backoff_base: Duration,
    backoff_max: Duration,
    fallback_threshold: u32,
    poll_interval: Duration,
    heartbeat_timeout: Option<Duration>,

    session: u64,
    reader: Option<JoinHandle<()>>,
    state: LinkState,
    attempts: u32,
    fallback: bool,
    reconnect_timer: SingleSlotTimer,
    poll_timer: SingleSlotTimer,
    visible: bool,
    /// A reconnect is owed once the view is visible again
    deferred: bool,
    opened_once: bool,
}

impl ConnectionManager {
    pub fn new(config: &Config, transport: Arc<dyn PushTransport>, sink: LinkSink) -> Self {
        Self {
            transport,
            sink,
            backoff_base: config.backoff_base,
            backoff_max: config.backoff_max,
            fallback_threshold: config.fallback_threshold,
            poll_interval: config.poll_interval,
            heartbeat_timeout: config.heartbeat_timeout,
            session: 0,
            reader: None,
            state: LinkState::Idle,
            attempts: 0,
            fallback: false,
            reconnect_timer: SingleSlotTimer::new(),
            poll_timer: SingleSlotTimer::new(),
            visible: true,
            deferred: false,
            opened_once: false,
        }
    }

    /// Open a new push session, closing any current or pending one first
    pub fn connect(&mut self) {
        if self.state == LinkState::Closed {
            return;
        }
        self.close_session();
        self.reconnect_timer.cancel();
        self.deferred = false;

        self.session += 1;
        self.state = LinkState::Connecting;
        let session = self.session;
        debug!("Opening push session {} (attempts so far: {})", session, self.attempts);

        let transport = Arc::clone(&self.transport);
        let sink = Arc::clone(&self.sink);
        let idle = self.heartbeat_timeout;
        self.reader = Some(tokio::spawn(async move {
            let frames = match transport.connect().await {
                Ok(frames) => frames,
                Err(e) => {
                    sink(LinkEvent::Failed {
                        session,
                        reason: e.to_string(),
                    });
                    return;
                }
            };
            sink(LinkEvent::Opened { session });

            let mut frames = with_idle_timeout(frames, idle);
            while let Some(item) = frames.next().await {
                match item {
                    Ok(PushFrame::Data(payload)) => sink(LinkEvent::Frame { session, payload }),
                    Ok(PushFrame::Heartbeat) => trace!("Heartbeat on session {}", session),
                    Err(e) => {
                        sink(LinkEvent::Failed {
                            session,
                            reason: e.to_string(),
                        });
                        return;
                    }
                }
            }
            sink(LinkEvent::Failed {
                session,
                reason: "push stream ended".to_string(),
            });
        }));
    }

    pub fn is_current(&self, session: u64) -> bool {
        session == self.session && self.state != LinkState::Closed
    }

    /// The transport opened. Resets the attempt counter and ends fallback.
    pub fn handle_opened(&mut self, session: u64) -> Option<OpenOutcome> {
        if !self.is_current(session) {
            return None;
        }
        let resync = self.opened_once || self.attempts > 0;
        self.opened_once = true;
        self.state = LinkState::Connected;
        self.attempts = 0;

        let fallback_ended = self.fallback;
        if self.fallback {
            self.fallback = false;
            self.poll_timer.cancel();
            info!("Push connection restored, fallback polling stopped");
        } else {
            info!("Push connection open");
        }
        Some(OpenOutcome { resync, fallback_ended })
    }

    /// The session failed to open or dropped
    pub fn handle_failed(&mut self, session: u64, reason: &str) -> Option<FailureOutcome> {
        if !self.is_current(session) {
            return None;
        }
        self.close_session();
        self.state = LinkState::Disconnected;
        self.attempts = self.attempts.saturating_add(1);
        let delay = backoff_delay(self.attempts, self.backoff_base, self.backoff_max);
        warn!(
            "Push connection failed ({}), attempt {}; retrying in {:?}",
            reason, self.attempts, delay
        );

        let mut fallback_activated = false;
        if self.attempts >= self.fallback_threshold && !self.fallback {
            self.fallback = true;
            fallback_activated = true;
            let sink = Arc::clone(&self.sink);
            self.poll_timer.schedule_every(self.poll_interval, move |generation| {
                sink(LinkEvent::PollTick { generation })
            });
            warn!(
                "Push unavailable after {} attempts, polling every {:?}",
                self.attempts, self.poll_interval
            );
        }

        let reconnect_scheduled = self.visible;
        if self.visible {
            let sink = Arc::clone(&self.sink);
            self.reconnect_timer.schedule(delay, move |generation| {
                sink(LinkEvent::ReconnectDue { generation })
            });
        } else {
            debug!("Hidden; reconnect deferred until visible");
            self.deferred = true;
        }

        Some(FailureOutcome {
            attempts: self.attempts,
            delay,
            fallback_activated,
            reconnect_scheduled,
        })
    }

    /// Returns whether a reconnect was started
    pub fn handle_reconnect_due(&mut self, generation: u64) -> bool {
        if !self.reconnect_timer.fire(generation) {
            return false;
        }
        self.connect();
        true
    }

    /// Returns whether the tick is live and a poll should run
    pub fn handle_poll_tick(&mut self, generation: u64) -> bool {
        self.fallback && self.poll_timer.fire(generation)
    }

    /// Suspend reconnects while hidden; resume a deferred one on return.
    /// Returns whether a reconnect was started.
    pub fn set_visible(&mut self, visible: bool) -> bool {
        if self.visible == visible || self.state == LinkState::Closed {
            return false;
        }
        self.visible = visible;
        if !visible {
            if self.reconnect_timer.is_armed() {
                self.reconnect_timer.cancel();
                self.deferred = true;
            }
            return false;
        }
        if self.deferred {
            info!("Visible again, resuming push reconnect");
            self.connect();
            return true;
        }
        false
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn shutdown(&mut self) {
        self.close_session();
        self.session += 1;
        self.reconnect_timer.cancel();
        self.poll_timer.cancel();
        self.fallback = false;
        self.deferred = false;
        self.state = LinkState::Closed;
        info!("Push connection closed");
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            attempts: self.attempts,
            fallback: self.fallback,
        }
    }

    fn close_session(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close_session();
    }
}
