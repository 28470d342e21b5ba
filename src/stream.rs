//! Stream-connection contract and the controller-state latch.
//!
//! The stream connection is the media-bearing channel that runs once
//! ctrl is ready and the probe and key material are prepared. The
//! session hands it the per-session secrets and probe results, runs it
//! to completion, and classifies its exit into a quit reason.

use crate::config::VideoProfile;
use crate::crypto::{Ecdh, HANDSHAKE_KEY_SIZE};
use crate::error::Result;
use crate::senkusha::ProbeMetrics;
use crate::session::SessionHandle;

/// Latched controller input, forwarded to the console while streaming.
///
/// Guarded by the stream channel's own feedback lock, never by the
/// session state mutex, so input forwarding cannot be blocked behind
/// lifecycle waits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerState {
    pub buttons: u32,
    pub l2_state: u8,
    pub r2_state: u8,
    pub left_x: i16,
    pub left_y: i16,
    pub right_x: i16,
    pub right_y: i16,
}

impl ControllerState {
    /// All buttons released, sticks centered.
    pub fn idle() -> Self {
        Self::default()
    }
}

/// Session-prepared inputs to [`StreamConnection::run`].
pub struct StreamContext<'a> {
    pub handle: SessionHandle,
    pub handshake_key: [u8; HANDSHAKE_KEY_SIZE],
    /// ECDH context for the stream key exchange, owned by the session
    /// for the duration of the run.
    pub ecdh: &'a Ecdh,
    pub metrics: ProbeMetrics,
    pub video_profile: VideoProfile,
    pub enable_keyboard: bool,
}

/// Contract of the external stream-connection implementation.
///
/// Exit classification:
///
/// - `Ok(())` — the stream ended normally.
/// - `Err(Canceled)` — `stop` tripped it; reported as a normal stop.
/// - `Err(Disconnected)` — the console ended the session;
///   [`remote_disconnect_reason`](Self::remote_disconnect_reason) then
///   carries the console's reason text until the channel is dropped.
/// - anything else — an unclassified stream failure.
pub trait StreamConnection: Send + Sync {
    /// Run the stream to completion. Blocking.
    fn run(&self, ctx: StreamContext<'_>) -> Result<()>;

    /// Interrupt a concurrent [`run`](Self::run). Idempotent, callable
    /// from any thread.
    fn stop(&self);

    /// Reason text from the console's disconnect notification, if any.
    fn remote_disconnect_reason(&self) -> Option<String>;

    /// Latch controller input under the channel's feedback lock and
    /// forward it immediately when the feedback sender is active.
    fn set_controller_state(&self, state: ControllerState);
}
