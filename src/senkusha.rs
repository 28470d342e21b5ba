//! Senkusha, the path-MTU/RTT probe stage.
//!
//! Runs between ctrl readiness and the stream connection to measure the
//! usable packet sizes and round-trip time toward the console. The probe
//! protocol is supplied by the embedder; a probe failure is non-fatal
//! and the session falls back to conservative defaults.

use crate::error::Result;
use crate::sync::StopToken;

/// MTU used when the probe fails, safe for typical home networks.
pub const FALLBACK_MTU: u32 = 1454;

/// RTT in microseconds assumed when the probe fails.
pub const FALLBACK_RTT_US: u64 = 1000;

/// Probe results fed into the stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeMetrics {
    /// Maximum transfer unit console -> client.
    pub mtu_in: u32,
    /// Maximum transfer unit client -> console.
    pub mtu_out: u32,
    /// Measured round-trip time in microseconds.
    pub rtt_us: u64,
}

impl ProbeMetrics {
    /// Conservative defaults used when the probe fails.
    pub fn fallback() -> Self {
        ProbeMetrics {
            mtu_in: FALLBACK_MTU,
            mtu_out: FALLBACK_MTU,
            rtt_us: FALLBACK_RTT_US,
        }
    }
}

/// Contract of the external probe implementation.
pub trait SenkushaProbe: Send + Sync {
    /// Run the probe to completion.
    ///
    /// Blocking; must observe `stop` at every internal wait point and
    /// return [`SessionError::Canceled`](crate::SessionError::Canceled)
    /// when it trips. Any other error makes the session continue with
    /// [`ProbeMetrics::fallback`].
    fn run(&self, stop: &StopToken) -> Result<ProbeMetrics>;
}
