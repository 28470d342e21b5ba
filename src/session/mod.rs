//! Session orchestration: the authenticated-session state machine.
//!
//! A [`Session`] drives the whole Remote Play handshake on its own
//! thread:
//!
//! ```text
//! request session (with RP-Version renegotiation)
//!   -> auth key material (RP crypt from target + nonce + morning)
//!   -> start ctrl, wait for readiness
//!   -> interactive login-PIN loop (if the console asks)
//!   -> Senkusha MTU/RTT probe (fallback values on failure)
//!   -> handshake key + ECDH
//!   -> run stream connection to completion
//!   -> teardown, emit one Quit event
//! ```
//!
//! Every wait point is cancellable: [`Session::stop`] sets the stop
//! flag, wakes the condvar, trips in-progress socket polls and stops the
//! stream channel. The embedder observes the session exclusively through
//! [`Event`]s delivered on the session thread, and may call `stop`,
//! [`set_login_pin`](Session::set_login_pin) and
//! [`set_controller_state`](Session::set_controller_state) from any
//! thread between `start` and `join`.

mod request;
mod state;

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub use state::SessionHandle;

use crate::config::{ConnectInfo, DID_SIZE, SESSION_PORT, generate_did};
use crate::crypto::{Ecdh, RPCRYPT_KEY_SIZE, RpCrypt, generate_handshake_key};
use crate::ctrl::{ControlChannel, CtrlContext};
use crate::error::{Result, SessionError};
use crate::senkusha::{ProbeMetrics, SenkushaProbe};
use crate::session::request::{RequestConfig, RequestOutcome, RequestSuccess};
use crate::session::state::{Shared, pred_base, pred_ctrl_start, pred_pin};
use crate::stream::{ControllerState, StreamConnection, StreamContext};
use crate::target::Target;

/// Bounded wait for any single expected session-state transition.
pub const SESSION_EXPECT_TIMEOUT_MS: u64 = 5000;

/// Why a session ended. Carried by [`Event::Quit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitReason {
    /// No reason assigned (only observable for failures that have no
    /// classification of their own).
    None,
    /// The embedder stopped the session, or it completed normally.
    Stopped,
    SessionRequestUnknown,
    SessionRequestConnectionRefused,
    SessionRequestRpInUse,
    SessionRequestRpCrash,
    SessionRequestRpVersionMismatch,
    CtrlUnknown,
    CtrlConnectionRefused,
    CtrlConnectFailed,
    StreamConnectionUnknown,
    StreamConnectionRemoteDisconnected,
}

impl fmt::Display for QuitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            QuitReason::Stopped => "Stopped",
            QuitReason::SessionRequestUnknown => "Unknown Session Request Error",
            QuitReason::SessionRequestConnectionRefused => "Connection Refused in Session Request",
            QuitReason::SessionRequestRpInUse => "Remote Play on Console is already in use",
            QuitReason::SessionRequestRpCrash => "Remote Play on Console has crashed",
            QuitReason::SessionRequestRpVersionMismatch => "RP-Version mismatch",
            QuitReason::CtrlUnknown => "Unknown Ctrl Error",
            QuitReason::CtrlConnectionRefused => "Connection Refused in Ctrl",
            QuitReason::CtrlConnectFailed => "Ctrl failed to connect",
            QuitReason::StreamConnectionUnknown => "Unknown Error in Stream Connection",
            QuitReason::StreamConnectionRemoteDisconnected => {
                "Remote has disconnected from Stream Connection"
            }
            QuitReason::None => "Unknown",
        };
        f.write_str(text)
    }
}

/// Lifecycle events delivered to the embedder from the session thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The console asked for a login PIN. `pin_incorrect` is false on
    /// the first request and true on every repeat.
    LoginPinRequest { pin_incorrect: bool },
    /// The session ended. Emitted exactly once per started session.
    Quit {
        reason: QuitReason,
        /// Reason text supplied by the console, when it gave one.
        reason_str: Option<String>,
    },
}

/// Receiver for session [`Event`]s.
///
/// Implemented for any `FnMut(Event) + Send` closure. Invoked from the
/// session thread; implementations should hand off rather than block.
pub trait EventSink: Send {
    fn handle_event(&mut self, event: Event);
}

impl<F: FnMut(Event) + Send> EventSink for F {
    fn handle_event(&mut self, event: Event) {
        self(event)
    }
}

/// The external channel implementations a session supervises.
pub struct SessionChannels {
    pub ctrl: Arc<dyn ControlChannel>,
    pub senkusha: Box<dyn SenkushaProbe>,
    pub stream: Arc<dyn StreamConnection>,
}

/// An authenticated Remote Play session with a console.
///
/// Created with [`new`](Self::new), driven by a dedicated thread after
/// [`start`](Self::start). Dropping a running session stops and joins
/// it.
pub struct Session {
    shared: Arc<Shared>,
    ctrl: Arc<dyn ControlChannel>,
    stream: Arc<dyn StreamConnection>,
    runner: Option<Runner>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Session {
    /// Resolve the console host and prepare a session.
    ///
    /// Nothing is spawned and no connection is made yet. Fails with
    /// [`SessionError::ParseAddr`] when the host does not resolve.
    pub fn new(
        connect_info: ConnectInfo,
        channels: SessionChannels,
        sink: impl EventSink + 'static,
    ) -> Result<Self> {
        let addrs = resolve_host(&connect_info.host)?;
        let shared = Shared::new();
        let target = if connect_info.ps5 {
            Target::Ps5V1
        } else {
            Target::Ps4V10
        };

        let runner = Runner {
            shared: shared.clone(),
            ctrl: channels.ctrl.clone(),
            senkusha: channels.senkusha,
            stream: channels.stream.clone(),
            sink: Box::new(sink),
            connect_info,
            addrs,
            target,
            did: generate_did(),
            selected: None,
            hostname: None,
        };

        Ok(Session {
            shared,
            ctrl: channels.ctrl,
            stream: channels.stream,
            runner: Some(runner),
            thread: None,
        })
    }

    /// Spawn the session thread and begin the handshake.
    pub fn start(&mut self) -> Result<()> {
        let runner = self.runner.take().ok_or(SessionError::AlreadyStarted)?;
        let handle = thread::Builder::new()
            .name("remoteplay-session".into())
            .spawn(move || runner.run())?;
        self.thread = Some(handle);
        Ok(())
    }

    /// Request the session to stop.
    ///
    /// Sets the stop flag, wakes every state wait, trips in-progress
    /// socket polls and stops the stream channel. Idempotent, safe from
    /// any thread, returns immediately.
    pub fn stop(&self) {
        self.shared.state.lock().should_stop = true;
        self.shared.stop.stop();
        self.shared.signal();
        self.stream.stop();
    }

    /// Wait for the session thread to finish.
    pub fn join(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(handle) => handle.join().map_err(|_| SessionError::Unknown),
            None => Ok(()),
        }
    }

    /// Hand an entered login PIN to the session.
    ///
    /// Replaces any not-yet-consumed PIN and wakes the PIN wait.
    pub fn set_login_pin(&self, pin: &[u8]) {
        self.shared.state.lock().login_pin = Some(pin.to_vec());
        self.shared.signal();
    }

    /// Latch controller input and forward it to an active stream.
    pub fn set_controller_state(&self, state: ControllerState) {
        self.stream.set_controller_state(state);
    }

    /// Ask the console to enter rest mode.
    pub fn goto_bed(&self) -> Result<()> {
        self.ctrl.goto_bed()
    }

    pub fn keyboard_set_text(&self, text: &str) -> Result<()> {
        self.ctrl.keyboard_set_text(text)
    }

    pub fn keyboard_reject(&self) -> Result<()> {
        self.ctrl.keyboard_reject()
    }

    pub fn keyboard_accept(&self) -> Result<()> {
        self.ctrl.keyboard_accept()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
            let _ = self.join();
        }
    }
}

/// Resolve the console host into connect candidates.
///
/// A bare hostname or IP gets the canonical session port; an explicit
/// `host:port` is used as given.
fn resolve_host(host: &str) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = match host.to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(_) => (host, SESSION_PORT)
            .to_socket_addrs()
            .map_err(|_| SessionError::ParseAddr(host.to_string()))?
            .collect(),
    };
    if addrs.is_empty() {
        return Err(SessionError::ParseAddr(host.to_string()));
    }
    Ok(addrs)
}

/// State-machine side of a session, owned by the session thread.
struct Runner {
    shared: Arc<Shared>,
    ctrl: Arc<dyn ControlChannel>,
    senkusha: Box<dyn SenkushaProbe>,
    stream: Arc<dyn StreamConnection>,
    sink: Box<dyn EventSink>,
    connect_info: ConnectInfo,
    addrs: Vec<SocketAddr>,
    target: Target,
    did: [u8; DID_SIZE],
    selected: Option<SocketAddr>,
    hostname: Option<String>,
}

impl Runner {
    fn run(mut self) {
        self.machine();

        let (reason, reason_str) = {
            let mut state = self.shared.state.lock();
            (state.quit_reason, state.quit_reason_str.take())
        };
        tracing::info!(reason = %reason, "session has quit");
        self.sink.handle_event(Event::Quit { reason, reason_str });
    }

    fn machine(&mut self) {
        if self.check_stop() {
            return;
        }

        tracing::info!(
            console = if self.connect_info.ps5 { "PS5" } else { "PS4" },
            "starting session request"
        );

        let Some(nonce) = self.request_phase() else {
            return;
        };

        tracing::info!("session request successful");

        let rpcrypt = RpCrypt::new_auth(self.target, nonce, self.connect_info.morning);

        // PS4 doesn't always react right away, give it a moment.
        drop(
            self.shared
                .wait_until(Some(Duration::from_millis(10)), pred_base),
        );
        if self.check_stop() {
            return;
        }

        tracing::info!("starting ctrl");
        let ctx = CtrlContext {
            handle: self.handle(),
            target: self.target,
            host: self
                .hostname
                .clone()
                .unwrap_or_else(|| self.connect_info.host.clone()),
            port: self.selected.map_or(SESSION_PORT, |addr| addr.port()),
            did: self.did,
            rpcrypt: rpcrypt.clone(),
        };
        if let Err(e) = self.ctrl.start(ctx) {
            tracing::error!(error = %e, "ctrl failed to start");
            self.shared
                .set_quit_reason_if_none(QuitReason::CtrlConnectFailed);
            return;
        }

        self.ctrl_phase();

        self.ctrl.stop();
        self.ctrl.join();
        tracing::info!("ctrl stopped");
    }

    /// Everything between ctrl start and ctrl teardown. Returning from
    /// here always proceeds to ctrl stop/join in [`machine`](Self::machine).
    fn ctrl_phase(&mut self) {
        let timeout = Duration::from_millis(SESSION_EXPECT_TIMEOUT_MS);

        {
            let state = self.shared.wait_until(Some(timeout), pred_ctrl_start);
            if state.should_stop {
                drop(state);
                self.set_stopped();
                return;
            }
            if state.ctrl_failed {
                drop(state);
                tracing::error!("ctrl has failed while waiting for ctrl startup");
                self.ctrl_failed_quit();
                return;
            }
        }

        let mut pin_incorrect = false;
        loop {
            {
                let mut state = self.shared.state.lock();
                if !state.ctrl_login_pin_requested {
                    break;
                }
                state.ctrl_login_pin_requested = false;
            }

            if pin_incorrect {
                tracing::info!("login PIN was incorrect, requested again by ctrl");
            } else {
                tracing::info!("ctrl requested login PIN");
            }
            self.sink
                .handle_event(Event::LoginPinRequest { pin_incorrect });
            pin_incorrect = true;

            let pin = loop {
                let mut state = self.shared.wait_until(None, pred_pin);
                if state.should_stop {
                    drop(state);
                    self.set_stopped();
                    return;
                }
                if state.ctrl_failed {
                    drop(state);
                    tracing::error!("ctrl has failed while waiting for PIN entry");
                    self.ctrl_failed_quit();
                    return;
                }
                if let Some(pin) = state.login_pin.take() {
                    break pin;
                }
            };

            tracing::info!("received entered login PIN, forwarding to ctrl");
            self.ctrl.set_login_pin(&pin);

            // wait for the session id again
            let state = self.shared.wait_until(Some(timeout), pred_ctrl_start);
            if state.should_stop {
                drop(state);
                self.set_stopped();
                return;
            }
        }

        let session_id_received = self.shared.state.lock().ctrl_session_id_received;
        if !session_id_received {
            tracing::error!("ctrl did not receive session id");
            self.ctrl_failed_quit();
            return;
        }

        tracing::info!("starting senkusha");
        let metrics = match self.senkusha.run(&self.shared.stop) {
            Ok(metrics) => {
                tracing::info!(
                    mtu_in = metrics.mtu_in,
                    mtu_out = metrics.mtu_out,
                    rtt_us = metrics.rtt_us,
                    "senkusha completed successfully"
                );
                metrics
            }
            Err(SessionError::Canceled) => {
                self.shared.set_quit_reason_if_none(QuitReason::Stopped);
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "senkusha failed, continuing with fallback values");
                ProbeMetrics::fallback()
            }
        };

        let handshake_key = generate_handshake_key();
        let ecdh = match Ecdh::new() {
            Ok(ecdh) => ecdh,
            Err(e) => {
                tracing::error!(error = %e, "session failed to initialize ECDH");
                return;
            }
        };

        let ctx = StreamContext {
            handle: self.handle(),
            handshake_key,
            ecdh: &ecdh,
            metrics,
            video_profile: self.connect_info.video_profile,
            enable_keyboard: self.connect_info.enable_keyboard,
        };
        let result = self.stream.run(ctx);
        match result {
            Err(SessionError::Disconnected) => {
                tracing::error!("remote disconnected from stream connection");
                let reason_str = self.stream.remote_disconnect_reason();
                let mut state = self.shared.state.lock();
                state.quit_reason = QuitReason::StreamConnectionRemoteDisconnected;
                state.quit_reason_str = reason_str;
            }
            Ok(()) | Err(SessionError::Canceled) => {
                tracing::info!("stream connection completed");
                self.shared.set_quit_reason(QuitReason::Stopped);
            }
            Err(e) => {
                tracing::error!(error = %e, "stream connection run failed");
                self.shared
                    .set_quit_reason(QuitReason::StreamConnectionUnknown);
            }
        }
    }

    /// Linear session-request retries: one renegotiation with the
    /// server's RP-Version, then one hardened retry where a further
    /// mismatch is fatal.
    fn request_phase(&mut self) -> Option<[u8; RPCRYPT_KEY_SIZE]> {
        let mut outcome = self.request_once(true);

        if let RequestOutcome::VersionMismatch { server_target } = outcome {
            if !server_target.is_unknown() {
                tracing::info!(
                    version = %server_target,
                    "re-requesting session with the server's RP-Version"
                );
                self.target = server_target;
                outcome = self.request_once(true);

                if let RequestOutcome::VersionMismatch { server_target } = outcome {
                    if !server_target.is_unknown() {
                        tracing::info!(
                            version = %server_target,
                            "re-requesting session once more with the server's RP-Version"
                        );
                        self.target = server_target;
                        outcome = self.request_once(false);
                    }
                }
            }
        }

        match outcome {
            RequestOutcome::Success(RequestSuccess {
                nonce,
                selected,
                hostname,
            }) => {
                self.selected = Some(selected);
                self.hostname = Some(hostname);
                Some(nonce)
            }
            RequestOutcome::VersionMismatch { .. } => {
                self.shared
                    .set_quit_reason(QuitReason::SessionRequestRpVersionMismatch);
                None
            }
            RequestOutcome::Failed { reason, error } => {
                tracing::error!(error = %error, "session request failed");
                self.shared.set_quit_reason(reason);
                None
            }
        }
    }

    fn request_once(&self, want_server_target: bool) -> RequestOutcome {
        let cfg = RequestConfig {
            addrs: &self.addrs,
            regist_key: &self.connect_info.regist_key,
            target: self.target,
            ps5: self.connect_info.ps5,
            stop: &self.shared.stop,
        };
        request::request_session(&cfg, want_server_target)
    }

    fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: self.shared.clone(),
        }
    }

    /// True (and records the stop) when the embedder already stopped us.
    fn check_stop(&self) -> bool {
        let stopped = self.shared.state.lock().should_stop;
        if stopped {
            self.shared.set_quit_reason(QuitReason::Stopped);
        }
        stopped
    }

    fn set_stopped(&self) {
        self.shared.set_quit_reason(QuitReason::Stopped);
    }

    fn ctrl_failed_quit(&self) {
        tracing::error!("ctrl has failed, shutting down");
        self.shared.set_quit_reason_if_none(QuitReason::CtrlUnknown);
    }
}
