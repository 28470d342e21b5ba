//! Shared session state and the cancellable waiter.
//!
//! All cross-thread session state lives behind one `parking_lot` mutex
//! paired with one condvar. The session thread blocks exclusively in
//! [`Shared::wait_until`]; the embedder API and the ctrl channel mutate
//! flags under the mutex and signal the condvar. Every wait predicate
//! includes `should_stop`, so a stop terminates every wait.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::session::QuitReason;
use crate::sync::StopToken;

/// Session flags and slots guarded by the state mutex.
///
/// The controller-state latch is deliberately *not* here: it is guarded
/// by the stream channel's own feedback lock so that input forwarding is
/// never blocked behind session-lifecycle waits.
#[derive(Debug)]
pub(crate) struct State {
    pub should_stop: bool,
    pub ctrl_failed: bool,
    pub ctrl_session_id_received: bool,
    pub ctrl_login_pin_requested: bool,
    /// Entered login PIN, present exactly while one is pending.
    pub login_pin: Option<Vec<u8>>,
    pub quit_reason: QuitReason,
    pub quit_reason_str: Option<String>,
}

pub(crate) struct Shared {
    pub state: Mutex<State>,
    pub cond: Condvar,
    pub stop: StopToken,
}

impl Shared {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Shared {
            state: Mutex::new(State {
                should_stop: false,
                ctrl_failed: false,
                ctrl_session_id_received: false,
                ctrl_login_pin_requested: false,
                login_pin: None,
                quit_reason: QuitReason::None,
                quit_reason_str: None,
            }),
            cond: Condvar::new(),
            stop: StopToken::new(),
        })
    }

    /// Block until the predicate holds or the timeout elapses, then
    /// return the (locked) state.
    ///
    /// The state mutex is acquired inside; the caller must not already
    /// hold it. `None` waits without a deadline, which is only
    /// acceptable for predicates that include `should_stop`.
    pub(crate) fn wait_until(
        &self,
        timeout: Option<Duration>,
        mut pred: impl FnMut(&State) -> bool,
    ) -> MutexGuard<'_, State> {
        let mut state = self.state.lock();
        match timeout {
            None => {
                while !pred(&state) {
                    self.cond.wait(&mut state);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !pred(&state) {
                    if self.cond.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
        state
    }

    /// Wake all waiters so they re-evaluate their predicates.
    pub(crate) fn signal(&self) {
        self.cond.notify_all();
    }

    /// Record a quit reason only when none has been recorded yet.
    pub(crate) fn set_quit_reason_if_none(&self, reason: QuitReason) {
        let mut state = self.state.lock();
        if state.quit_reason == QuitReason::None {
            state.quit_reason = reason;
        }
    }

    pub(crate) fn set_quit_reason(&self, reason: QuitReason) {
        self.state.lock().quit_reason = reason;
    }
}

/// Base predicate: stop requested or the ctrl channel failed.
pub(crate) fn pred_base(state: &State) -> bool {
    state.should_stop || state.ctrl_failed
}

/// Ctrl-start predicate: base, or ctrl reported readiness or a PIN request.
pub(crate) fn pred_ctrl_start(state: &State) -> bool {
    pred_base(state) || state.ctrl_session_id_received || state.ctrl_login_pin_requested
}

/// PIN predicate: base, or the embedder entered a login PIN.
pub(crate) fn pred_pin(state: &State) -> bool {
    pred_base(state) || state.login_pin.is_some()
}

/// Narrow session handle held by the channel implementations.
///
/// Exposes exactly what a channel needs: the flag setters (each signals
/// the session's condvar) and a view of the stop token. Channels never
/// see the session itself and never outlive it observably, since the
/// session stops and joins its channels during teardown.
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) shared: Arc<Shared>,
}

impl SessionHandle {
    /// Mark the ctrl channel failed, recording `reason` unless a quit
    /// reason was already assigned.
    pub fn set_ctrl_failed(&self, reason: QuitReason) {
        {
            let mut state = self.shared.state.lock();
            state.ctrl_failed = true;
            if state.quit_reason == QuitReason::None {
                state.quit_reason = reason;
            }
        }
        self.shared.signal();
    }

    /// Mark that the ctrl channel received the session id.
    pub fn set_ctrl_session_id_received(&self) {
        self.shared.state.lock().ctrl_session_id_received = true;
        self.shared.signal();
    }

    /// Mark that the console requested a login PIN.
    pub fn set_ctrl_login_pin_requested(&self) {
        self.shared.state.lock().ctrl_login_pin_requested = true;
        self.shared.signal();
    }

    /// The session's stop token, for cancellable channel I/O.
    pub fn stop_token(&self) -> StopToken {
        self.shared.stop.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.is_stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wait_until_times_out() {
        let shared = Shared::new();
        let started = Instant::now();
        let state = shared.wait_until(Some(Duration::from_millis(50)), pred_base);
        assert!(!state.should_stop);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn stop_wakes_base_wait() {
        let shared = Shared::new();
        let waker = shared.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            waker.state.lock().should_stop = true;
            waker.signal();
        });
        let started = Instant::now();
        let state = shared.wait_until(Some(Duration::from_secs(10)), pred_base);
        assert!(state.should_stop);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn pin_entry_wakes_pin_wait() {
        let shared = Shared::new();
        let waker = shared.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            waker.state.lock().login_pin = Some(b"1234".to_vec());
            waker.signal();
        });
        let mut state = shared.wait_until(None, pred_pin);
        assert_eq!(state.login_pin.take().as_deref(), Some(&b"1234"[..]));
    }

    #[test]
    fn ctrl_failed_records_first_reason_only() {
        let shared = Shared::new();
        let handle = SessionHandle {
            shared: shared.clone(),
        };
        handle.set_ctrl_failed(QuitReason::CtrlConnectionRefused);
        handle.set_ctrl_failed(QuitReason::CtrlUnknown);
        let state = shared.state.lock();
        assert!(state.ctrl_failed);
        assert_eq!(state.quit_reason, QuitReason::CtrlConnectionRefused);
    }
}
