use std::time::{Duration, Instant};

use rsm_agent::*;
use rsm_protocol::Registration;

const SECOND: Duration = Duration::from_secs(1);

fn options() -> MachineOptions {
    MachineOptions {
        server: ServerAddress::Static("ws://maintainer:27018".into()),
        registration: Registration {
            host: Some("db1:27017".into()),
            hidden: true,
            priority: 0.0,
            votes: 0,
        },
        ping_interval: Some(Duration::from_secs(1)),
        reconnect_delay: Some(Duration::from_millis(5000)),
        resolve_retry: Duration::from_millis(5000),
    }
}

/// Start a machine and open its session; returns the registration frame
/// it sent.
fn opened(m: &mut AgentMachine, t0: Instant) -> String {
    assert_eq!(
        m.handle(Event::Start, t0),
        vec![Action::Connect("ws://maintainer:27018".into())]
    );
    let actions = m.handle(Event::Opened, t0);
    assert_eq!(m.state(), AgentState::AwaitingRegistrationAck);
    match actions.as_slice() {
        [Action::Send(frame)] => frame.clone(),
        other => panic!("expected a single send, got {other:?}"),
    }
}

fn registered(m: &mut AgentMachine, t0: Instant) {
    opened(m, t0);
    m.handle(Event::Frame(r#"{"added":"db1:27017","success":true}"#.into()), t0);
    assert_eq!(m.state(), AgentState::Registered);
}

#[test]
fn test_registration_frame_carries_configured_attributes() {
    let mut m = AgentMachine::new(options());
    let frame = opened(&mut m, Instant::now());
    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(
        value,
        serde_json::json!({"cmd":"add","host":"db1:27017","hidden":true,"priority":0.0,"votes":0})
    );
}

#[test]
fn test_unanswered_registration_is_resent_once_per_cycle() {
    let mut m = AgentMachine::new(options());
    let t0 = Instant::now();
    let first = opened(&mut m, t0);

    assert!(m.handle(Event::Tick, t0 + Duration::from_millis(14_999)).is_empty());

    let t1 = t0 + 15 * SECOND;
    assert_eq!(m.handle(Event::Tick, t1), vec![Action::Send(first.clone())]);
    // A second tick in the same cycle sends nothing.
    assert!(m.handle(Event::Tick, t1).is_empty());
    assert_eq!(m.next_deadline(), Some(t1 + 15 * SECOND));

    assert_eq!(m.handle(Event::Tick, t1 + 15 * SECOND), vec![Action::Send(first)]);
}

#[test]
fn test_ack_clears_timer_and_starts_pinging() {
    let mut m = AgentMachine::new(options());
    let t0 = Instant::now();
    registered(&mut m, t0);
    assert_eq!(m.identity(), Some("db1:27017"));
    assert_eq!(m.next_deadline(), Some(t0 + SECOND));
    // No registration resend rides along with the ping.
    assert_eq!(m.handle(Event::Tick, t0 + SECOND), vec![Action::Ping]);
}

#[test]
fn test_rejection_arms_jittered_retry() {
    let mut m = AgentMachine::new(options());
    let t0 = Instant::now();
    let frame = opened(&mut m, t0);

    let t1 = t0 + 2 * SECOND;
    let actions = m.handle(
        Event::Frame(r#"{"success":false,"error":"internal error"}"#.into()),
        t1,
    );
    assert!(actions.is_empty());
    let retry = m.next_deadline().unwrap();
    assert!(retry >= t1 + 10 * SECOND && retry <= t1 + 15 * SECOND);

    assert!(m.handle(Event::Tick, t1 + Duration::from_millis(9_999)).is_empty());
    assert_eq!(m.handle(Event::Tick, retry), vec![Action::Send(frame)]);
}

#[test]
fn test_liveness_timeout_not_before_two_intervals() {
    let mut m = AgentMachine::new(options());
    let t0 = Instant::now();
    registered(&mut m, t0);

    assert_eq!(m.handle(Event::Tick, t0 + SECOND), vec![Action::Ping]);
    assert_eq!(
        m.handle(Event::Tick, t0 + 2 * SECOND),
        vec![Action::Ping, Action::Close]
    );
    assert_eq!(m.state(), AgentState::Disconnected);
    // Ping loop is gone, only the reconnect is pending.
    assert_eq!(m.next_deadline(), Some(t0 + 7 * SECOND));
}

#[test]
fn test_pong_extends_liveness() {
    let mut m = AgentMachine::new(options());
    let t0 = Instant::now();
    registered(&mut m, t0);

    m.handle(Event::Tick, t0 + SECOND);
    m.handle(Event::Pong, t0 + Duration::from_millis(1500));
    assert_eq!(m.handle(Event::Tick, t0 + 2 * SECOND), vec![Action::Ping]);
    assert_eq!(m.handle(Event::Tick, t0 + 3 * SECOND), vec![Action::Ping]);
    assert_eq!(
        m.handle(Event::Tick, t0 + 4 * SECOND),
        vec![Action::Ping, Action::Close]
    );
}

#[test]
fn test_removal_of_self_reregisters() {
    let mut m = AgentMachine::new(MachineOptions {
        ping_interval: None,
        ..options()
    });
    let t0 = Instant::now();
    registered(&mut m, t0);

    assert!(m
        .handle(Event::Frame(r#"{"removed":"other:27017"}"#.into()), t0)
        .is_empty());
    assert_eq!(m.next_deadline(), None);

    let t1 = t0 + SECOND;
    m.handle(Event::Frame(r#"{"removed":"db1:27017"}"#.into()), t1);
    let retry = m.next_deadline().unwrap();
    assert!(retry >= t1 + 10 * SECOND && retry <= t1 + 15 * SECOND);

    // A second notice does not re-arm the pending retry.
    m.handle(Event::Frame(r#"{"removed":"db1:27017"}"#.into()), t1 + SECOND);
    assert_eq!(m.next_deadline(), Some(retry));

    let actions = m.handle(Event::Tick, retry);
    assert!(matches!(actions.as_slice(), [Action::Send(_)]));
    assert_eq!(m.state(), AgentState::AwaitingRegistrationAck);
}

#[test]
fn test_removal_before_first_ack_is_ignored() {
    let mut m = AgentMachine::new(options());
    let t0 = Instant::now();
    opened(&mut m, t0);
    m.handle(Event::Frame(r#"{"removed":"db1:27017"}"#.into()), t0);
    // Only the ack timeout is pending.
    assert_eq!(m.next_deadline(), Some(t0 + 15 * SECOND));
}

#[test]
fn test_malformed_frame_closes_and_reconnects() {
    let mut m = AgentMachine::new(options());
    let t0 = Instant::now();
    opened(&mut m, t0);

    assert_eq!(m.handle(Event::Frame("{oops".into()), t0), vec![Action::Close]);
    assert_eq!(m.state(), AgentState::Disconnected);
    assert_eq!(m.next_deadline(), Some(t0 + 5 * SECOND));
    assert_eq!(
        m.handle(Event::Tick, t0 + 5 * SECOND),
        vec![Action::Connect("ws://maintainer:27018".into())]
    );
}

#[test]
fn test_connect_timeout_terminates_and_reconnects() {
    let mut m = AgentMachine::new(options());
    let t0 = Instant::now();
    m.handle(Event::Start, t0);
    assert_eq!(m.next_deadline(), Some(t0 + 15 * SECOND));

    assert_eq!(m.handle(Event::Tick, t0 + 15 * SECOND), vec![Action::Terminate]);
    assert_eq!(m.state(), AgentState::Disconnected);
    assert_eq!(m.next_deadline(), Some(t0 + 20 * SECOND));
}

#[test]
fn test_close_cancels_session_timers_and_reconnect_is_not_doubled() {
    let mut m = AgentMachine::new(options());
    let t0 = Instant::now();
    registered(&mut m, t0);

    assert!(m.handle(Event::Closed, t0 + SECOND).is_empty());
    assert_eq!(m.next_deadline(), Some(t0 + 6 * SECOND));
    // A late duplicate close leaves the pending reconnect alone.
    m.handle(Event::Closed, t0 + 3 * SECOND);
    assert_eq!(m.next_deadline(), Some(t0 + 6 * SECOND));
    // Frames from the dead session are ignored.
    assert!(m
        .handle(Event::Frame(r#"{"removed":"db1:27017"}"#.into()), t0 + 3 * SECOND)
        .is_empty());
}

#[test]
fn test_reconnection_disabled_goes_idle() {
    let mut m = AgentMachine::new(MachineOptions {
        reconnect_delay: None,
        ..options()
    });
    let t0 = Instant::now();
    registered(&mut m, t0);
    m.handle(Event::Closed, t0);
    assert_eq!(m.next_deadline(), None);
    assert!(m.is_idle());
}

#[test]
fn test_srv_resolution_failure_is_retried() {
    let mut m = AgentMachine::new(MachineOptions {
        server: ServerAddress::Srv("_rsm._tcp.example.com".into()),
        reconnect_delay: None,
        resolve_retry: Duration::from_millis(100),
        ..options()
    });
    let t0 = Instant::now();
    assert_eq!(
        m.handle(Event::Start, t0),
        vec![Action::Resolve("_rsm._tcp.example.com".into())]
    );
    assert_eq!(m.state(), AgentState::Resolving);

    let failure = AgentError::Resolve {
        name: "_rsm._tcp.example.com".into(),
        reason: "no srv records".into(),
    };
    assert!(m.handle(Event::Resolved(Err(failure)), t0).is_empty());
    // Retried even though reconnection is disabled.
    let retry = t0 + Duration::from_millis(100);
    assert_eq!(m.next_deadline(), Some(retry));
    assert!(!m.is_idle());

    assert_eq!(
        m.handle(Event::Tick, retry),
        vec![Action::Resolve("_rsm._tcp.example.com".into())]
    );
    assert_eq!(
        m.handle(Event::Resolved(Ok("ws://10.1.1.1:27018".into())), retry),
        vec![Action::Connect("ws://10.1.1.1:27018".into())]
    );
}

#[test]
fn test_srv_address_is_resolved_again_on_reconnect() {
    let mut m = AgentMachine::new(MachineOptions {
        server: ServerAddress::Srv("_rsm._tcp.example.com".into()),
        ..options()
    });
    let t0 = Instant::now();
    m.handle(Event::Start, t0);
    m.handle(Event::Resolved(Ok("ws://10.1.1.1:27018".into())), t0);
    m.handle(Event::Closed, t0);
    assert_eq!(
        m.handle(Event::Tick, t0 + 5 * SECOND),
        vec![Action::Resolve("_rsm._tcp.example.com".into())]
    );
}

#[test]
fn test_pinging_disabled() {
    let mut m = AgentMachine::new(MachineOptions {
        ping_interval: None,
        ..options()
    });
    let t0 = Instant::now();
    registered(&mut m, t0);
    assert_eq!(m.next_deadline(), None);
    assert!(!m.is_idle());
}
