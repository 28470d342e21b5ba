//! Console target identification and RP-Version mapping.
//!
//! A [`Target`] names the (console family, Remote Play protocol version)
//! tuple the client will speak. The console advertises its version in
//! the `RP-Version` response header; during session init the client may
//! renegotiate its target to match.

use std::fmt;

/// The console family and Remote Play protocol version of a session.
///
/// The `*Unknown` variants mean "this family, version not (yet)
/// determined". A session starts at the newest known version for its
/// family and never carries an unknown target past the request phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Ps4Unknown,
    Ps4V8,
    Ps4V9,
    Ps4V10,
    Ps5Unknown,
    Ps5V1,
}

impl Target {
    /// The unknown target for a console family.
    pub fn unknown(is_ps5: bool) -> Self {
        if is_ps5 { Target::Ps5Unknown } else { Target::Ps4Unknown }
    }

    pub fn is_ps5(self) -> bool {
        matches!(self, Target::Ps5Unknown | Target::Ps5V1)
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, Target::Ps4Unknown | Target::Ps5Unknown)
    }

    /// Canonical `Rp-Version` request header value for this target.
    ///
    /// Unknown targets have no version string.
    pub fn rp_version(self) -> Option<&'static str> {
        match self {
            Target::Ps4V8 => Some("8.0"),
            Target::Ps4V9 => Some("9.0"),
            Target::Ps4V10 => Some("10.0"),
            Target::Ps5V1 => Some("1.0"),
            Target::Ps4Unknown | Target::Ps5Unknown => None,
        }
    }

    /// Parse a console-advertised RP-Version string.
    ///
    /// Version strings are namespaced per family, so the same string
    /// means different protocols on PS4 and PS5. Unrecognized strings
    /// map to the family's unknown target.
    pub fn parse_rp_version(version: &str, is_ps5: bool) -> Self {
        if is_ps5 {
            return match version {
                "1.0" => Target::Ps5V1,
                _ => Target::Ps5Unknown,
            };
        }
        match version {
            "8.0" => Target::Ps4V8,
            "9.0" => Target::Ps4V9,
            "10.0" => Target::Ps4V10,
            _ => Target::Ps4Unknown,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = if self.is_ps5() { "PS5" } else { "PS4" };
        match self.rp_version() {
            Some(version) => write!(f, "{} {}", family, version),
            None => write!(f, "{} (unknown version)", family),
        }
    }
}
