//! Cancellable TCP primitives for the session-init exchange.
//!
//! Every blocking socket operation in the session is bounded and
//! interruptible: sockets run with short read/connect timeouts and the
//! loops re-check the session's [`StopToken`](crate::StopToken) between
//! polls. A stop therefore interrupts an in-progress connect or header
//! read within one poll interval.

pub mod tcp;
