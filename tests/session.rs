//! Integration tests: full session handshakes against a fake console.
//!
//! A fake console listens on an ephemeral TCP port and serves scripted
//! session-init responses; the ctrl / probe / stream channels are mock
//! implementations driving the session through its phases.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use remoteplay::{
    ConnectInfo, ControlChannel, ControllerState, CtrlContext, Event, ProbeMetrics, QuitReason,
    SenkushaProbe, Session, SessionChannels, SessionError, StopToken, StreamConnection,
    StreamContext, VideoFpsPreset, VideoProfile, VideoResolutionPreset,
};

const ZERO_NONCE_B64: &str = "AAAAAAAAAAAAAAAAAAAAAA==";

fn ok_response() -> String {
    format!("HTTP/1.1 200 OK\r\nRP-Nonce: {}\r\n\r\n", ZERO_NONCE_B64)
}

fn reason_response(reason: &str, rp_version: Option<&str>) -> String {
    let mut response = String::from("HTTP/1.1 403 Forbidden\r\n");
    response.push_str(&format!("RP-Application-Reason: {}\r\n", reason));
    if let Some(version) = rp_version {
        response.push_str(&format!("RP-Version: {}\r\n", version));
    }
    response.push_str("\r\n");
    response
}

fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Fake console: answers one scripted response per connection.
fn fake_console(replies: Vec<String>) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = requests.clone();
    thread::spawn(move || {
        for reply in replies {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let request = read_request(&mut stream);
            log.lock().push(request);
            let _ = stream.write_all(reply.as_bytes());
        }
    });
    (addr, requests)
}

/// Fake console that accepts, reads the request and never answers.
fn silent_console() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let _ = read_request(&mut stream);
        thread::sleep(Duration::from_secs(10));
    });
    addr
}

struct MockCtrl {
    /// Number of PIN requests before the session id is reported.
    pin_rounds: usize,
    fail_reason: Option<QuitReason>,
    rounds_done: AtomicUsize,
    pins: Mutex<Vec<Vec<u8>>>,
    handle: Mutex<Option<remoteplay::SessionHandle>>,
    started: AtomicBool,
    stopped: AtomicBool,
    nonce_seen: Mutex<Option<[u8; 16]>>,
    host_seen: Mutex<Option<(String, u16)>>,
}

impl MockCtrl {
    fn build(pin_rounds: usize, fail_reason: Option<QuitReason>) -> Arc<Self> {
        Arc::new(MockCtrl {
            pin_rounds,
            fail_reason,
            rounds_done: AtomicUsize::new(0),
            pins: Mutex::new(Vec::new()),
            handle: Mutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            nonce_seen: Mutex::new(None),
            host_seen: Mutex::new(None),
        })
    }

    fn new(pin_rounds: usize) -> Arc<Self> {
        MockCtrl::build(pin_rounds, None)
    }

    fn failing(reason: QuitReason) -> Arc<Self> {
        MockCtrl::build(0, Some(reason))
    }
}

impl ControlChannel for MockCtrl {
    fn start(&self, ctx: CtrlContext) -> remoteplay::Result<()> {
        self.started.store(true, Ordering::SeqCst);
        *self.nonce_seen.lock() = Some(*ctx.rpcrypt.nonce());
        *self.host_seen.lock() = Some((ctx.host.clone(), ctx.port));
        *self.handle.lock() = Some(ctx.handle.clone());

        if let Some(reason) = self.fail_reason {
            ctx.handle.set_ctrl_failed(reason);
        } else if self.pin_rounds == 0 {
            ctx.handle.set_ctrl_session_id_received();
        } else {
            ctx.handle.set_ctrl_login_pin_requested();
        }
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn join(&self) {}

    fn set_login_pin(&self, pin: &[u8]) {
        self.pins.lock().push(pin.to_vec());
        let done = self.rounds_done.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = self.handle.lock().clone().unwrap();
        if done < self.pin_rounds {
            handle.set_ctrl_login_pin_requested();
        } else {
            handle.set_ctrl_session_id_received();
        }
    }

    fn goto_bed(&self) -> remoteplay::Result<()> {
        Ok(())
    }

    fn keyboard_set_text(&self, _text: &str) -> remoteplay::Result<()> {
        Ok(())
    }

    fn keyboard_reject(&self) -> remoteplay::Result<()> {
        Ok(())
    }

    fn keyboard_accept(&self) -> remoteplay::Result<()> {
        Ok(())
    }
}

enum ProbeBehavior {
    Succeed(ProbeMetrics),
    Fail,
    Canceled,
}

struct MockProbe {
    behavior: ProbeBehavior,
}

impl SenkushaProbe for MockProbe {
    fn run(&self, _stop: &StopToken) -> remoteplay::Result<ProbeMetrics> {
        match self.behavior {
            ProbeBehavior::Succeed(metrics) => Ok(metrics),
            ProbeBehavior::Fail => Err(SessionError::Unknown),
            ProbeBehavior::Canceled => Err(SessionError::Canceled),
        }
    }
}

enum StreamBehavior {
    Complete,
    Disconnect(&'static str),
}

struct MockStream {
    behavior: StreamBehavior,
    ran: AtomicBool,
    stopped: AtomicBool,
    metrics_seen: Mutex<Option<ProbeMetrics>>,
    controller: Mutex<ControllerState>,
}

impl MockStream {
    fn new(behavior: StreamBehavior) -> Arc<Self> {
        Arc::new(MockStream {
            behavior,
            ran: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            metrics_seen: Mutex::new(None),
            controller: Mutex::new(ControllerState::idle()),
        })
    }
}

impl StreamConnection for MockStream {
    fn run(&self, ctx: StreamContext<'_>) -> remoteplay::Result<()> {
        self.ran.store(true, Ordering::SeqCst);
        *self.metrics_seen.lock() = Some(ctx.metrics);
        assert!(!ctx.ecdh.public_key().is_empty());
        match self.behavior {
            StreamBehavior::Complete => Ok(()),
            StreamBehavior::Disconnect(_) => Err(SessionError::Disconnected),
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn remote_disconnect_reason(&self) -> Option<String> {
        match self.behavior {
            StreamBehavior::Disconnect(reason) => Some(reason.to_string()),
            _ => None,
        }
    }

    fn set_controller_state(&self, state: ControllerState) {
        *self.controller.lock() = state;
    }
}

fn connect_info(addr: SocketAddr, ps5: bool) -> ConnectInfo {
    let mut regist_key = [0u8; 16];
    regist_key[..9].copy_from_slice(b"registkey");
    ConnectInfo {
        host: addr.to_string(),
        ps5,
        regist_key,
        morning: [0x22; 16],
        video_profile: VideoProfile::preset(VideoResolutionPreset::P720, VideoFpsPreset::Fps60),
        video_profile_auto_downgrade: true,
        enable_keyboard: false,
    }
}

struct Harness {
    session: Session,
    events: mpsc::Receiver<Event>,
    ctrl: Arc<MockCtrl>,
    stream: Arc<MockStream>,
}

fn start_session(
    addr: SocketAddr,
    ps5: bool,
    ctrl: Arc<MockCtrl>,
    probe: ProbeBehavior,
    stream: Arc<MockStream>,
) -> Harness {
    let (tx, rx) = mpsc::channel();
    let channels = SessionChannels {
        ctrl: ctrl.clone(),
        senkusha: Box::new(MockProbe { behavior: probe }),
        stream: stream.clone(),
    };
    let mut session = Session::new(connect_info(addr, ps5), channels, move |event: Event| {
        tx.send(event).ok();
    })
    .expect("session init");
    session.start().expect("session start");
    Harness {
        session,
        events: rx,
        ctrl,
        stream,
    }
}

fn expect_quit(events: &mpsc::Receiver<Event>) -> (QuitReason, Option<String>) {
    match events.recv_timeout(Duration::from_secs(10)).expect("quit event") {
        Event::Quit { reason, reason_str } => (reason, reason_str),
        other => panic!("expected Quit, got {:?}", other),
    }
}

#[test]
fn clean_ps5_session_reaches_stream() {
    let (addr, requests) = fake_console(vec![ok_response()]);
    let ctrl = MockCtrl::new(0);
    let stream = MockStream::new(StreamBehavior::Complete);
    let metrics = ProbeMetrics {
        mtu_in: 1400,
        mtu_out: 1396,
        rtt_us: 2500,
    };
    let mut h = start_session(addr, true, ctrl, ProbeBehavior::Succeed(metrics), stream);

    let (reason, reason_str) = expect_quit(&h.events);
    assert_eq!(reason, QuitReason::Stopped);
    assert_eq!(reason_str, None);
    h.session.join().unwrap();

    let requests = requests.lock();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("GET /sie/ps5/rp/sess/init HTTP/1.1\r\n"));
    assert!(requests[0].contains("Rp-Version: 1.0\r\n"));
    assert!(requests[0].contains("RP-Registkey: 7265676973746b6579\r\n"));

    assert!(h.ctrl.started.load(Ordering::SeqCst));
    assert_eq!(*h.ctrl.nonce_seen.lock(), Some([0u8; 16]));
    let (host, port) = h.ctrl.host_seen.lock().clone().unwrap();
    assert_eq!(host, "127.0.0.1");
    assert_eq!(port, addr.port());

    assert!(h.stream.ran.load(Ordering::SeqCst));
    assert_eq!(*h.stream.metrics_seen.lock(), Some(metrics));

    // no further events after the quit
    assert!(h.events.try_recv().is_err());
}

#[test]
fn version_renegotiation_switches_target_and_path() {
    let (addr, requests) = fake_console(vec![
        reason_response("80", Some("9.0")),
        ok_response(),
    ]);
    let ctrl = MockCtrl::new(0);
    let stream = MockStream::new(StreamBehavior::Complete);
    let mut h = start_session(
        addr,
        false,
        ctrl,
        ProbeBehavior::Succeed(ProbeMetrics::fallback()),
        stream,
    );

    let (reason, _) = expect_quit(&h.events);
    assert_eq!(reason, QuitReason::Stopped);
    h.session.join().unwrap();

    let requests = requests.lock();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].starts_with("GET /sie/ps4/rp/sess/init HTTP/1.1\r\n"));
    assert!(requests[0].contains("Rp-Version: 10.0\r\n"));
    assert!(requests[1].starts_with("GET /sce/rp/session HTTP/1.1\r\n"));
    assert!(requests[1].contains("Rp-Version: 9.0\r\n"));
}

#[test]
fn bogus_5_0_version_downgrades_to_9_0() {
    let (addr, requests) = fake_console(vec![
        reason_response("80", Some("5.0")),
        ok_response(),
    ]);
    let ctrl = MockCtrl::new(0);
    let stream = MockStream::new(StreamBehavior::Complete);
    let mut h = start_session(
        addr,
        false,
        ctrl,
        ProbeBehavior::Succeed(ProbeMetrics::fallback()),
        stream,
    );

    let (reason, _) = expect_quit(&h.events);
    assert_eq!(reason, QuitReason::Stopped);
    h.session.join().unwrap();

    let requests = requests.lock();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].starts_with("GET /sce/rp/session HTTP/1.1\r\n"));
    assert!(requests[1].contains("Rp-Version: 9.0\r\n"));
}

#[test]
fn console_in_use_quits_without_ctrl() {
    let (addr, _requests) = fake_console(vec![reason_response("0x87", None)]);
    let ctrl = MockCtrl::new(0);
    let stream = MockStream::new(StreamBehavior::Complete);
    let mut h = start_session(
        addr,
        false,
        ctrl,
        ProbeBehavior::Succeed(ProbeMetrics::fallback()),
        stream,
    );

    let (reason, _) = expect_quit(&h.events);
    assert_eq!(reason, QuitReason::SessionRequestRpInUse);
    h.session.join().unwrap();

    assert!(!h.ctrl.started.load(Ordering::SeqCst));
    assert!(!h.stream.ran.load(Ordering::SeqCst));
}

#[test]
fn login_pin_loop_retries_until_accepted() {
    let (addr, _requests) = fake_console(vec![ok_response()]);
    let ctrl = MockCtrl::new(2);
    let stream = MockStream::new(StreamBehavior::Complete);
    let mut h = start_session(
        addr,
        true,
        ctrl,
        ProbeBehavior::Succeed(ProbeMetrics::fallback()),
        stream,
    );

    match h.events.recv_timeout(Duration::from_secs(10)).unwrap() {
        Event::LoginPinRequest { pin_incorrect } => assert!(!pin_incorrect),
        other => panic!("expected first PIN request, got {:?}", other),
    }
    h.session.set_login_pin(b"1234");

    match h.events.recv_timeout(Duration::from_secs(10)).unwrap() {
        Event::LoginPinRequest { pin_incorrect } => assert!(pin_incorrect),
        other => panic!("expected second PIN request, got {:?}", other),
    }
    h.session.set_login_pin(b"5678");

    let (reason, _) = expect_quit(&h.events);
    assert_eq!(reason, QuitReason::Stopped);
    h.session.join().unwrap();

    let pins = h.ctrl.pins.lock();
    assert_eq!(pins.len(), 2);
    assert_eq!(pins[0], b"1234");
    assert_eq!(pins[1], b"5678");
    drop(pins);
    assert!(h.stream.ran.load(Ordering::SeqCst));
}

#[test]
fn stop_during_response_recv_quits_stopped() {
    let addr = silent_console();
    let ctrl = MockCtrl::new(0);
    let stream = MockStream::new(StreamBehavior::Complete);
    let mut h = start_session(
        addr,
        true,
        ctrl,
        ProbeBehavior::Succeed(ProbeMetrics::fallback()),
        stream,
    );

    thread::sleep(Duration::from_millis(200));
    let stop_started = Instant::now();
    h.session.stop();

    let (reason, _) = expect_quit(&h.events);
    assert_eq!(reason, QuitReason::Stopped);
    h.session.join().unwrap();
    assert!(stop_started.elapsed() < Duration::from_secs(3));

    assert!(!h.ctrl.started.load(Ordering::SeqCst));
    assert!(h.events.try_recv().is_err());
}

#[test]
fn probe_failure_falls_back_to_defaults() {
    let (addr, _requests) = fake_console(vec![ok_response()]);
    let ctrl = MockCtrl::new(0);
    let stream = MockStream::new(StreamBehavior::Complete);
    let mut h = start_session(addr, true, ctrl, ProbeBehavior::Fail, stream);

    let (reason, _) = expect_quit(&h.events);
    assert_eq!(reason, QuitReason::Stopped);
    h.session.join().unwrap();

    let metrics = (*h.stream.metrics_seen.lock()).unwrap();
    assert_eq!(metrics, ProbeMetrics::fallback());
    assert_eq!((metrics.mtu_in, metrics.mtu_out, metrics.rtt_us), (1454, 1454, 1000));
}

#[test]
fn probe_cancel_stops_session() {
    let (addr, _requests) = fake_console(vec![ok_response()]);
    let ctrl = MockCtrl::new(0);
    let stream = MockStream::new(StreamBehavior::Complete);
    let mut h = start_session(addr, true, ctrl, ProbeBehavior::Canceled, stream);

    let (reason, _) = expect_quit(&h.events);
    assert_eq!(reason, QuitReason::Stopped);
    h.session.join().unwrap();

    assert!(!h.stream.ran.load(Ordering::SeqCst));
    assert!(h.ctrl.stopped.load(Ordering::SeqCst));
}

#[test]
fn ctrl_failure_reports_its_reason() {
    let (addr, _requests) = fake_console(vec![ok_response()]);
    let ctrl = MockCtrl::failing(QuitReason::CtrlConnectionRefused);
    let stream = MockStream::new(StreamBehavior::Complete);
    let mut h = start_session(
        addr,
        true,
        ctrl,
        ProbeBehavior::Succeed(ProbeMetrics::fallback()),
        stream,
    );

    let (reason, _) = expect_quit(&h.events);
    assert_eq!(reason, QuitReason::CtrlConnectionRefused);
    h.session.join().unwrap();

    assert!(!h.stream.ran.load(Ordering::SeqCst));
}

#[test]
fn remote_disconnect_carries_reason_text() {
    let (addr, _requests) = fake_console(vec![ok_response()]);
    let ctrl = MockCtrl::new(0);
    let stream = MockStream::new(StreamBehavior::Disconnect("Server shutting down"));
    let mut h = start_session(
        addr,
        true,
        ctrl,
        ProbeBehavior::Succeed(ProbeMetrics::fallback()),
        stream,
    );

    let (reason, reason_str) = expect_quit(&h.events);
    assert_eq!(reason, QuitReason::StreamConnectionRemoteDisconnected);
    assert_eq!(reason_str.as_deref(), Some("Server shutting down"));
    h.session.join().unwrap();
}

#[test]
fn controller_state_is_latched_into_stream() {
    let (addr, _requests) = fake_console(vec![ok_response()]);
    let ctrl = MockCtrl::new(0);
    let stream = MockStream::new(StreamBehavior::Complete);
    let mut h = start_session(
        addr,
        true,
        ctrl,
        ProbeBehavior::Succeed(ProbeMetrics::fallback()),
        stream,
    );

    let state = ControllerState {
        buttons: 0x42,
        l2_state: 128,
        ..ControllerState::idle()
    };
    h.session.set_controller_state(state);

    let (reason, _) = expect_quit(&h.events);
    assert_eq!(reason, QuitReason::Stopped);
    h.session.join().unwrap();

    assert_eq!(*h.stream.controller.lock(), state);
}
