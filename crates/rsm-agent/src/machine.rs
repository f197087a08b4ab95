//! The agent's connection, liveness and retry state machine.
//!
//! The machine performs no I/O. The driver feeds it [`Event`]s together
//! with the current time and carries out the [`Action`]s it returns. Each
//! timer is a plain deadline; there is at most one per purpose, so
//! re-arming a timer always replaces the previous one.

use std::time::{Duration, Instant};

use rand::Rng;
use rsm_protocol::{
    parse_notice, Notice, Registration, CONNECT_TIMEOUT, REGISTRATION_ACK_TIMEOUT,
    REGISTRATION_RETRY_MAX, REGISTRATION_RETRY_MIN,
};

use crate::{AgentError, ServerAddress};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Disconnected,
    Resolving,
    Connecting,
    AwaitingRegistrationAck,
    Registered,
}

#[derive(Debug)]
pub enum Event {
    Start,
    /// Outcome of a [`Action::Resolve`] request.
    Resolved(Result<String, AgentError>),
    /// The session requested by [`Action::Connect`] is open.
    Opened,
    Frame(String),
    Pong,
    /// The session failed to open, errored or was closed by the peer.
    Closed,
    /// Time passed; expired timers fire.
    Tick,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Resolve a service-discovery name and report back with
    /// [`Event::Resolved`].
    Resolve(String),
    /// Open a session to this URL.
    Connect(String),
    /// Send a text frame on the open session.
    Send(String),
    /// Send a transport-level ping.
    Ping,
    /// Close the session gracefully.
    Close,
    /// Abandon a session that never opened.
    Terminate,
}

#[derive(Debug, Clone)]
pub struct MachineOptions {
    pub server: ServerAddress,
    pub registration: Registration,
    /// `None` disables liveness pings.
    pub ping_interval: Option<Duration>,
    /// `None` disables reconnection.
    pub reconnect_delay: Option<Duration>,
    /// Delay before a failed resolution is retried. Applies even when
    /// reconnection is disabled.
    pub resolve_retry: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegistrationTimer {
    /// No answer yet; resend when it fires.
    AckTimeout,
    /// Rejected or evicted; register again when it fires.
    Retry,
}

#[derive(Debug)]
pub struct AgentMachine {
    options: MachineOptions,
    state: AgentState,
    /// Host the maintainer last confirmed for us.
    identity: Option<String>,
    last_pong: Option<Instant>,
    connect_at: Option<Instant>,
    registration_at: Option<(Instant, RegistrationTimer)>,
    ping_at: Option<Instant>,
    reconnect_at: Option<Instant>,
    resolve_at: Option<Instant>,
}

impl AgentMachine {
    pub fn new(options: MachineOptions) -> Self {
        Self {
            options,
            state: AgentState::Disconnected,
            identity: None,
            last_pong: None,
            connect_at: None,
            registration_at: None,
            ping_at: None,
            reconnect_at: None,
            resolve_at: None,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Earliest pending timer, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.connect_at,
            self.registration_at.map(|(at, _)| at),
            self.ping_at,
            self.reconnect_at,
            self.resolve_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Disconnected with nothing left to wait for. Only reachable when
    /// reconnection is disabled.
    pub fn is_idle(&self) -> bool {
        self.state == AgentState::Disconnected && self.next_deadline().is_none()
    }

    fn is_open(&self) -> bool {
        matches!(
            self.state,
            AgentState::AwaitingRegistrationAck | AgentState::Registered
        )
    }

    pub fn handle(&mut self, event: Event, now: Instant) -> Vec<Action> {
        let mut out = Vec::new();
        match event {
            Event::Start => self.begin(now, &mut out),
            Event::Resolved(result) => self.on_resolved(result, now, &mut out),
            Event::Opened => {
                if self.state == AgentState::Connecting {
                    tracing::info!("Connected to ws");
                    self.connect_at = None;
                    // Opening counts as a pong.
                    self.last_pong = Some(now);
                    self.state = AgentState::AwaitingRegistrationAck;
                    self.send_registration(now, &mut out);
                }
            }
            Event::Frame(text) => self.on_frame(&text, now, &mut out),
            Event::Pong => {
                if self.is_open() {
                    tracing::debug!("Received pong");
                    self.last_pong = Some(now);
                }
            }
            Event::Closed => {
                if self.state == AgentState::Connecting || self.is_open() {
                    tracing::error!("Disconnected from ws");
                    self.teardown(now);
                }
            }
            Event::Tick => self.on_tick(now, &mut out),
        }
        out
    }

    fn begin(&mut self, now: Instant, out: &mut Vec<Action>) {
        match &self.options.server {
            ServerAddress::Static(url) => {
                let url = url.clone();
                self.connect(url, now, out);
            }
            ServerAddress::Srv(name) => {
                self.state = AgentState::Resolving;
                out.push(Action::Resolve(name.clone()));
            }
        }
    }

    fn connect(&mut self, url: String, now: Instant, out: &mut Vec<Action>) {
        tracing::debug!(address = %url, "Connecting to ws");
        self.reconnect_at = None;
        self.connect_at = Some(now + CONNECT_TIMEOUT);
        self.state = AgentState::Connecting;
        out.push(Action::Connect(url));
    }

    fn on_resolved(&mut self, result: Result<String, AgentError>, now: Instant, out: &mut Vec<Action>) {
        if self.state != AgentState::Resolving {
            return;
        }
        match result {
            Ok(url) => self.connect(url, now, out),
            Err(e) => {
                tracing::error!(error = %e, "Failed to resolve server address");
                self.state = AgentState::Disconnected;
                self.resolve_at = Some(now + self.options.resolve_retry);
            }
        }
    }

    fn on_frame(&mut self, text: &str, now: Instant, out: &mut Vec<Action>) {
        if !self.is_open() {
            return;
        }
        tracing::debug!(message = %text, "Received message");
        let notice = match parse_notice(text) {
            Ok(notice) => notice,
            Err(e) => {
                tracing::error!(message = %text, error = %e, "Received invalid json");
                self.close_session(now, out);
                return;
            }
        };
        match notice {
            Notice::Added(host) => {
                self.registration_at = None;
                tracing::info!(hostname = %host, "Added");
                self.identity = Some(host);
                self.state = AgentState::Registered;
                self.last_pong = Some(now);
                self.ping_at = self.options.ping_interval.map(|i| now + i);
            }
            Notice::Rejected(reason) => {
                self.registration_at = None;
                tracing::error!(error = %reason, "Failed to add");
                self.state = AgentState::AwaitingRegistrationAck;
                self.arm_retry(now);
            }
            Notice::Removed(host) => {
                if self.identity.as_deref() == Some(host.as_str()) && self.registration_at.is_none() {
                    tracing::error!(hostname = %host, "Removed from replica set");
                    self.arm_retry(now);
                }
            }
            Notice::Unrecognized => {}
        }
    }

    fn on_tick(&mut self, now: Instant, out: &mut Vec<Action>) {
        if take_due(&mut self.connect_at, now) {
            tracing::error!("Timed out waiting to connect to ws");
            out.push(Action::Terminate);
            self.teardown(now);
        }
        if take_due(&mut self.resolve_at, now) {
            self.begin(now, out);
        }
        if take_due(&mut self.reconnect_at, now) {
            self.begin(now, out);
        }
        if let Some((at, timer)) = self.registration_at {
            if at <= now {
                if timer == RegistrationTimer::AckTimeout {
                    tracing::error!("Timed out waiting for response to add");
                }
                self.send_registration(now, out);
            }
        }
        if take_due(&mut self.ping_at, now) {
            self.ping(now, out);
        }
    }

    fn send_registration(&mut self, now: Instant, out: &mut Vec<Action>) {
        self.registration_at = None;
        if !self.is_open() {
            return;
        }
        let registration = &self.options.registration;
        tracing::debug!(
            host = ?registration.host,
            hidden = registration.hidden,
            priority = registration.priority,
            votes = registration.votes,
            "Sending add"
        );
        out.push(Action::Send(registration.to_frame()));
        self.state = AgentState::AwaitingRegistrationAck;
        self.registration_at = Some((now + REGISTRATION_ACK_TIMEOUT, RegistrationTimer::AckTimeout));
    }

    fn arm_retry(&mut self, now: Instant) {
        let delay = rand::thread_rng().gen_range(REGISTRATION_RETRY_MIN..=REGISTRATION_RETRY_MAX);
        self.registration_at = Some((now + delay, RegistrationTimer::Retry));
    }

    fn ping(&mut self, now: Instant, out: &mut Vec<Action>) {
        let Some(interval) = self.options.ping_interval else {
            return;
        };
        if !self.is_open() {
            return;
        }
        self.ping_at = Some(now + interval);
        out.push(Action::Ping);
        let silent = self
            .last_pong
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default();
        if silent >= 2 * interval {
            tracing::error!(silent_ms = silent.as_millis() as u64, "Timed out waiting for pong");
            self.close_session(now, out);
        }
    }

    fn close_session(&mut self, now: Instant, out: &mut Vec<Action>) {
        out.push(Action::Close);
        self.teardown(now);
    }

    /// Drop every per-session timer and schedule a reconnect.
    fn teardown(&mut self, now: Instant) {
        self.connect_at = None;
        self.registration_at = None;
        self.ping_at = None;
        self.state = AgentState::Disconnected;
        self.reconnect(now);
    }

    fn reconnect(&mut self, now: Instant) {
        if self.reconnect_at.is_some() {
            return;
        }
        match self.options.reconnect_delay {
            Some(delay) => self.reconnect_at = Some(now + delay),
            None => tracing::info!("Reconnection disabled"),
        }
    }
}

fn take_due(timer: &mut Option<Instant>, now: Instant) -> bool {
    match *timer {
        Some(at) if at <= now => {
            *timer = None;
            true
        }
        _ => false,
    }
}
