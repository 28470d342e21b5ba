//! Embedder-supplied connection configuration.
//!
//! A [`ConnectInfo`] is created once by the embedder and read-only after
//! [`Session::new`](crate::Session::new). Registration credentials
//! (`regist_key`, `morning`) come from the console pairing step, which
//! is outside this crate.

/// TCP port the console listens on for session init and ctrl.
pub const SESSION_PORT: u16 = 9295;

/// Size of the registration key and `morning` secret.
pub const REGIST_KEY_SIZE: usize = 16;

/// Size of the device identifier sent to the console.
pub const DID_SIZE: usize = 16;

const DID_PREFIX: [u8; 10] = [0x00, 0x18, 0x00, 0x00, 0x00, 0x07, 0x00, 0x40, 0x00, 0x80];
const DID_SUFFIX: [u8; 6] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Connection parameters supplied by the embedder.
#[derive(Debug, Clone)]
pub struct ConnectInfo {
    /// Console host. Either a bare hostname/IP (canonical port
    /// [`SESSION_PORT`] is used) or an explicit `host:port`.
    pub host: String,
    /// Whether the console is a PS5. Selects the initial [`Target`](crate::Target).
    pub ps5: bool,
    /// Registration key from pairing, NUL-terminated inside its buffer.
    pub regist_key: [u8; REGIST_KEY_SIZE],
    /// Per-registration secret used as RP crypt key material.
    pub morning: [u8; REGIST_KEY_SIZE],
    /// Requested video profile.
    pub video_profile: VideoProfile,
    /// Allow the console to downgrade the video profile under load.
    pub video_profile_auto_downgrade: bool,
    /// Enable the on-screen keyboard passthrough.
    pub enable_keyboard: bool,
}

/// Video stream parameters requested from the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoProfile {
    pub width: u32,
    pub height: u32,
    /// Bitrate in kbps.
    pub bitrate: u32,
    pub max_fps: u32,
}

/// Standard resolution presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoResolutionPreset {
    P360,
    P540,
    P720,
    P1080,
}

/// Standard frame rate presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFpsPreset {
    Fps30,
    Fps60,
}

impl VideoProfile {
    /// Expand a resolution/fps preset pair into a full profile.
    pub fn preset(resolution: VideoResolutionPreset, fps: VideoFpsPreset) -> Self {
        let (width, height, bitrate) = match resolution {
            VideoResolutionPreset::P360 => (640, 360, 2000),
            VideoResolutionPreset::P540 => (960, 540, 6000),
            VideoResolutionPreset::P720 => (1280, 720, 10000),
            VideoResolutionPreset::P1080 => (1920, 1080, 15000),
        };
        let max_fps = match fps {
            VideoFpsPreset::Fps30 => 30,
            VideoFpsPreset::Fps60 => 60,
        };
        VideoProfile {
            width,
            height,
            bitrate,
            max_fps,
        }
    }
}

/// Build the 16-byte device identifier sent to the console.
///
/// Layout is `prefix(10) || random middle || suffix(6)`. The prefix and
/// suffix already fill all 16 bytes, leaving the random middle empty;
/// the console expects exactly this layout.
pub(crate) fn generate_did() -> [u8; DID_SIZE] {
    let mut did = [0u8; DID_SIZE];
    did[..DID_PREFIX.len()].copy_from_slice(&DID_PREFIX);
    did[DID_SIZE - DID_SUFFIX.len()..].copy_from_slice(&DID_SUFFIX);
    did
}
