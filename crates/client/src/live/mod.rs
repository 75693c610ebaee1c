// Live Event Channel: push subscription with automatic reconnection.
//
// Subscriptions are remembered by topic and replayed after every (re)connect.
// Handlers are registered per event name; every handler for a delivered event
// runs, in registration order.
//
// Transport is abstracted via `LiveTransport` for testability. The websocket
// implementation lives in `ws`.

pub mod ws;

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tracing::{debug, info, warn};
use url::Url;

use strata_common::protocol::live::{ClientFrame, EventFrame, Topic};

use crate::error::ClientError;

pub use ws::WsTransport;

// ── Configuration ───────────────────────────────────────────────────

/// Reconnection parameters.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Give up after this many consecutive failed connects.
    pub max_attempts: u32,
    /// Draw each delay uniformly from `[0, backoff]`.
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            max_attempts: u32::MAX, // retry indefinitely
            jitter: true,
        }
    }
}

impl ReconnectPolicy {
    /// Exponential backoff ceiling after `failures` consecutive failures.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.min(16);
        let delay = DurationSaturatingMul::saturating_mul(self.base_delay, 1u64 << exp);
        delay.min(self.max_delay)
    }

    /// Delay before the next attempt, jittered when enabled.
    pub fn delay(&self, failures: u32) -> Duration {
        let ceiling = self.backoff(failures);
        if !self.jitter {
            return ceiling;
        }
        let ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling_ms))
    }
}

// ── Transport trait ─────────────────────────────────────────────────

/// Abstraction over the push transport for testability.
///
/// In production this is a tokio-tungstenite websocket. In tests it can be a
/// mock that records frames.
pub trait LiveTransport: Send {
    /// Open a connection, presenting the bearer credential.
    fn connect(&mut self, endpoint: &Url, token: &str) -> impl Future<Output = Result<()>> + Send;

    fn send(&mut self, frame: &ClientFrame) -> impl Future<Output = Result<()>> + Send;

    /// Next server frame. Returns None on clean close.
    fn recv(&mut self) -> impl Future<Output = Result<Option<EventFrame>>> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

// ── Connection state ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

// ── Handlers ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

type Handler = Box<dyn FnMut(&EventFrame) + Send>;

#[derive(Default)]
pub struct HandlerRegistry {
    next_id: u64,
    handlers: HashMap<String, Vec<(HandlerId, Handler)>>,
}

impl HandlerRegistry {
    pub fn on<F>(&mut self, event: &str, handler: F) -> HandlerId
    where
        F: FnMut(&EventFrame) + Send + 'static,
    {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.handlers.entry(event.to_string()).or_default().push((id, Box::new(handler)));
        id
    }

    /// Remove one handler. Returns whether it was registered for `event`.
    pub fn off(&mut self, event: &str, id: HandlerId) -> bool {
        let Some(registered) = self.handlers.get_mut(event) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|(handler_id, _)| *handler_id != id);
        let removed = registered.len() != before;
        if registered.is_empty() {
            self.handlers.remove(event);
        }
        removed
    }

    /// Run every handler registered for the frame's event. Returns how many ran.
    pub fn dispatch(&mut self, frame: &EventFrame) -> usize {
        let Some(registered) = self.handlers.get_mut(&frame.event) else {
            return 0;
        };
        for (_, handler) in registered.iter_mut() {
            handler(frame);
        }
        registered.len()
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> =
            self.handlers.iter().map(|(event, list)| (event.as_str(), list.len())).collect();
        f.debug_struct("HandlerRegistry").field("handlers", &counts).finish()
    }
}

// ── Channel ─────────────────────────────────────────────────────────

pub struct LiveChannel<T: LiveTransport> {
    endpoint: Url,
    token: String,
    transport: T,
    policy: ReconnectPolicy,
    state: ConnectionState,
    topics: BTreeSet<Topic>,
    handlers: HandlerRegistry,
    consecutive_failures: u32,
    /// Set after a dropped connection so the next attempt waits first.
    backoff_pending: bool,
    /// Set by `disconnect`; stops the receive loop.
    closed: bool,
}

impl<T: LiveTransport> LiveChannel<T> {
    pub fn new(endpoint: Url, token: impl Into<String>, transport: T) -> Self {
        Self {
            endpoint,
            token: token.into(),
            transport,
            policy: ReconnectPolicy::default(),
            state: ConnectionState::Disconnected,
            topics: BTreeSet::new(),
            handlers: HandlerRegistry::default(),
            consecutive_failures: 0,
            backoff_pending: false,
            closed: false,
        }
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn topics(&self) -> &BTreeSet<Topic> {
        &self.topics
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Open the connection and replay every remembered subscription.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        self.closed = false;
        self.state = ConnectionState::Connecting;
        debug!(endpoint = %self.endpoint, attempt = self.consecutive_failures + 1, "live connect");

        if let Err(error) = self.transport.connect(&self.endpoint, &self.token).await {
            return Err(self.connect_failed(format!("connect failed: {error:#}")));
        }
        let replay: Vec<ClientFrame> = self.topics.iter().map(ClientFrame::subscribe).collect();
        for frame in &replay {
            if let Err(error) = self.transport.send(frame).await {
                self.transport.close().await;
                return Err(self.connect_failed(format!("resubscribe failed: {error:#}")));
            }
        }

        self.state = ConnectionState::Connected;
        self.consecutive_failures = 0;
        self.backoff_pending = false;
        info!(endpoint = %self.endpoint, topics = self.topics.len(), "live channel connected");
        Ok(())
    }

    fn connect_failed(&mut self, reason: String) -> ClientError {
        self.state = ConnectionState::Disconnected;
        self.consecutive_failures += 1;
        self.backoff_pending = true;
        warn!(attempt = self.consecutive_failures, reason = %reason, "live channel connect failed");
        ClientError::Network(reason)
    }

    /// Remember a topic and subscribe now if connected. A topic added while
    /// disconnected is sent on the next connect.
    pub async fn subscribe(&mut self, topic: Topic) -> Result<(), ClientError> {
        if !self.topics.insert(topic.clone()) || self.state != ConnectionState::Connected {
            return Ok(());
        }
        self.send(ClientFrame::subscribe(&topic)).await
    }

    pub async fn unsubscribe(&mut self, topic: &Topic) -> Result<(), ClientError> {
        if !self.topics.remove(topic) || self.state != ConnectionState::Connected {
            return Ok(());
        }
        self.send(ClientFrame::unsubscribe(topic)).await
    }

    async fn send(&mut self, frame: ClientFrame) -> Result<(), ClientError> {
        if let Err(error) = self.transport.send(&frame).await {
            self.drop_connection().await;
            return Err(ClientError::Network(format!("send failed: {error:#}")));
        }
        Ok(())
    }

    pub fn on<F>(&mut self, event: &str, handler: F) -> HandlerId
    where
        F: FnMut(&EventFrame) + Send + 'static,
    {
        self.handlers.on(event, handler)
    }

    pub fn off(&mut self, event: &str, id: HandlerId) -> bool {
        self.handlers.off(event, id)
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Wait for the next event, reconnecting with backoff whenever the
    /// connection drops. Registered handlers run before the frame is
    /// returned. Returns None once `disconnect` was called or the policy's
    /// attempt limit is exhausted.
    pub async fn next_event(&mut self) -> Option<EventFrame> {
        loop {
            if self.closed {
                return None;
            }
            if self.state != ConnectionState::Connected {
                if !self.should_reconnect() {
                    warn!(attempts = self.consecutive_failures, "live channel giving up");
                    return None;
                }
                if self.backoff_pending {
                    let delay = self.reconnect_delay();
                    info!(
                        attempt = self.consecutive_failures + 1,
                        delay_ms = delay.as_millis() as u64,
                        "live channel reconnecting"
                    );
                    tokio::time::sleep(delay).await;
                }
                if self.connect().await.is_err() {
                    continue;
                }
            }

            match self.transport.recv().await {
                Ok(Some(frame)) => {
                    let ran = self.handlers.dispatch(&frame);
                    debug!(event = %frame.event, handlers = ran, "live event");
                    return Some(frame);
                }
                Ok(None) => {
                    info!("live channel closed by server");
                    self.drop_connection().await;
                }
                Err(error) => {
                    warn!(error = %format!("{error:#}"), "live channel receive failed");
                    self.drop_connection().await;
                }
            }
        }
    }

    /// Swap the credential. An open connection is dropped and re-established
    /// with the new token on the next receive.
    pub async fn set_token(&mut self, token: impl Into<String>) {
        self.token = token.into();
        if self.state == ConnectionState::Connected {
            self.transport.close().await;
            self.state = ConnectionState::Disconnected;
            self.backoff_pending = false;
        }
    }

    /// Close the connection and stop reconnecting. Subscriptions are kept
    /// for a later `connect`.
    pub async fn disconnect(&mut self) {
        self.transport.close().await;
        self.state = ConnectionState::Disconnected;
        self.closed = true;
    }

    async fn drop_connection(&mut self) {
        self.transport.close().await;
        self.state = ConnectionState::Disconnected;
        self.backoff_pending = true;
    }

    /// Compute the backoff delay for the next reconnection attempt.
    pub fn reconnect_delay(&self) -> Duration {
        self.policy.delay(self.consecutive_failures)
    }

    /// Whether we should attempt reconnection (under max_attempts).
    pub fn should_reconnect(&self) -> bool {
        self.consecutive_failures < self.policy.max_attempts
    }
}

// ── Backoff helper (for Duration::saturating_mul with u64) ──────────

trait DurationSaturatingMul {
    fn saturating_mul(self, rhs: u64) -> Self;
}

impl DurationSaturatingMul for Duration {
    fn saturating_mul(self, rhs: u64) -> Self {
        let nanos = self.as_nanos().saturating_mul(rhs as u128);
        if nanos > u64::MAX as u128 {
            Duration::from_secs(u64::MAX)
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }
}
