//! Session-init wire protocol.
//!
//! Session init is a single HTTP/1.1 exchange over TCP port 9295: the
//! client sends a GET carrying its registration key and RP-Version, the
//! console answers with a nonce (success) or an application reason
//! (failure).
//!
//! ```text
//! GET /sie/ps5/rp/sess/init HTTP/1.1\r\n
//! Host: 192.168.1.5:9295\r\n
//! User-Agent: remoteplay Windows\r\n
//! Connection: close\r\n
//! Content-Length: 0\r\n
//! RP-Registkey: 34366535663434\r\n
//! Rp-Version: 1.0\r\n
//! \r\n
//!
//! HTTP/1.1 200 OK\r\n
//! RP-Nonce: Ka7wT2nCSH9BGUvdwcWpZg==\r\n
//! \r\n
//! ```
//!
//! Header matching on the response is part of the wire contract:
//! `RP-Nonce` and `RP-Application-Reason` match case-sensitively,
//! `RP-Version` case-insensitively, and the application reason value is
//! parsed as base-16.

pub mod request;
pub mod response;

pub use request::SessionRequest;
pub use response::{HttpResponse, SessionResponse};
