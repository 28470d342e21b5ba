//! # remoteplay — PlayStation Remote Play session orchestrator
//!
//! A Rust library that negotiates an authenticated Remote Play
//! streaming session with a PS4 or PS5 and supervises its lifecycle:
//! session-init over HTTP with RP-Version renegotiation, the control
//! channel with its interactive login-PIN loop, the Senkusha MTU/RTT
//! probe, per-session key material, and the handover to the
//! media-streaming channel.
//!
//! The deep protocol work — the ctrl wire protocol, the probe, the
//! media stream, the RP crypt cipher — is supplied by the embedder
//! through small trait seams; this crate owns the state machine that
//! drives them and keeps every wait point cancellable from any thread.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │  Embedder (UI / CLI, controller input)    │
//! ├───────────────────────────────────────────┤
//! │  Session     — public API, state machine  │
//! │  Events      — PIN requests, quit reason  │
//! ├───────────────────────────────────────────┤
//! │  Protocol    — session-init HTTP exchange │
//! │  Crypto      — RP crypt material, ECDH    │
//! ├───────────────────────────────────────────┤
//! │  Transport   — cancellable TCP primitives │
//! │  Channels    — ctrl / senkusha / stream   │
//! └───────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use remoteplay::{
//!     ConnectInfo, Event, Session, SessionChannels, VideoFpsPreset, VideoProfile,
//!     VideoResolutionPreset,
//! };
//!
//! # fn channels() -> SessionChannels { unimplemented!() }
//! let connect_info = ConnectInfo {
//!     host: "192.168.1.5".into(),
//!     ps5: true,
//!     regist_key: *b"4e6535663434\0\0\0\0",
//!     morning: [0x13; 16],
//!     video_profile: VideoProfile::preset(
//!         VideoResolutionPreset::P1080,
//!         VideoFpsPreset::Fps60,
//!     ),
//!     video_profile_auto_downgrade: true,
//!     enable_keyboard: false,
//! };
//!
//! let mut session = Session::new(connect_info, channels(), |event: Event| {
//!     println!("session event: {:?}", event);
//! })
//! .unwrap();
//! session.start().unwrap();
//! // ... session.stop() from any thread ...
//! session.join().unwrap();
//! ```
//!
//! ## Crate layout
//!
//! - [`session`] — [`Session`] public API, [`Event`]s, [`QuitReason`],
//!   the state machine and the cancellable waiter.
//! - [`protocol`] — session-init request building and response parsing.
//! - [`transport`] — cancellable TCP connect and header receive.
//! - [`crypto`] — RP crypt auth material, handshake key, ECDH context.
//! - [`ctrl`], [`senkusha`], [`stream`] — the consumed channel contracts.
//! - [`config`] — [`ConnectInfo`], [`VideoProfile`] and presets.
//! - [`target`] — console [`Target`] and RP-Version mapping.
//! - [`error`] — [`SessionError`] enum and [`Result`] alias.

pub mod config;
pub mod crypto;
pub mod ctrl;
pub mod error;
pub mod protocol;
pub mod senkusha;
pub mod session;
pub mod stream;
pub mod sync;
pub mod target;
pub mod transport;

pub use config::{
    ConnectInfo, SESSION_PORT, VideoFpsPreset, VideoProfile, VideoResolutionPreset,
};
pub use crypto::{Ecdh, HANDSHAKE_KEY_SIZE, RPCRYPT_KEY_SIZE, RpCrypt};
pub use ctrl::{ControlChannel, CtrlContext};
pub use error::{Result, SessionError};
pub use senkusha::{ProbeMetrics, SenkushaProbe};
pub use session::{
    Event, EventSink, QuitReason, SESSION_EXPECT_TIMEOUT_MS, Session, SessionChannels,
    SessionHandle,
};
pub use stream::{ControllerState, StreamConnection, StreamContext};
pub use sync::StopToken;
pub use target::Target;
