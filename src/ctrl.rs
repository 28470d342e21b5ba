//! Control-channel contract.
//!
//! The ctrl channel is the console's command connection: it runs after a
//! successful session request and reports readiness (session id), login
//! PIN requests, and failure back to the session. The protocol
//! implementation is supplied by the embedder; the session only
//! supervises its lifecycle and observes its flags.

use crate::config::DID_SIZE;
use crate::crypto::RpCrypt;
use crate::error::Result;
use crate::session::SessionHandle;
use crate::target::Target;

/// Everything a ctrl implementation needs from the session to connect.
///
/// Handed over at [`ControlChannel::start`]; the [`SessionHandle`] is
/// the only live link back to the session.
pub struct CtrlContext {
    pub handle: SessionHandle,
    pub target: Target,
    /// Numeric host the session request connected to.
    pub host: String,
    pub port: u16,
    /// Device identifier sent to the console.
    pub did: [u8; DID_SIZE],
    /// Auth crypt context derived from the session nonce.
    pub rpcrypt: RpCrypt,
}

/// Lifecycle contract of the external ctrl implementation.
///
/// Threading rules the session relies on:
///
/// - `start` returns after the channel's own thread is running; on
///   `Err` nothing was started and neither `stop` nor `join` is needed.
/// - After starting, the channel reports through the handle: exactly one
///   of [`set_ctrl_session_id_received`](SessionHandle::set_ctrl_session_id_received),
///   [`set_ctrl_login_pin_requested`](SessionHandle::set_ctrl_login_pin_requested)
///   or [`set_ctrl_failed`](SessionHandle::set_ctrl_failed) per state
///   change, each of which signals the session condvar.
/// - `stop` is idempotent, callable from any thread, and unblocks a
///   pending `start`.
/// - `set_login_pin` may be called while the channel is running.
pub trait ControlChannel: Send + Sync {
    fn start(&self, ctx: CtrlContext) -> Result<()>;

    fn stop(&self);

    /// Wait for the channel thread to exit. Only meaningful after `stop`.
    fn join(&self);

    /// Forward an entered login PIN to the console.
    fn set_login_pin(&self, pin: &[u8]);

    /// Ask the console to enter rest mode.
    fn goto_bed(&self) -> Result<()>;

    /// Replace the text of the console's on-screen keyboard.
    fn keyboard_set_text(&self, text: &str) -> Result<()>;

    /// Dismiss the on-screen keyboard without accepting.
    fn keyboard_reject(&self) -> Result<()>;

    /// Accept the current on-screen keyboard text.
    fn keyboard_accept(&self) -> Result<()>;
}
