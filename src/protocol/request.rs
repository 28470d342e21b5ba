use crate::config::REGIST_KEY_SIZE;
use crate::error::{Result, SessionError};
use crate::target::Target;

/// The session-init request for one attempt.
///
/// Serializes to HTTP/1.1 text. The request path depends on the console
/// family and protocol version; the registration key is sent hex-encoded
/// up to (exclusive of) its first NUL byte.
#[must_use]
pub struct SessionRequest<'a> {
    pub host: &'a str,
    pub port: u16,
    pub regist_key: &'a [u8; REGIST_KEY_SIZE],
    pub target: Target,
}

impl SessionRequest<'_> {
    /// Request path for a target.
    ///
    /// PS4 firmware up to RP-Version 9.0 uses the legacy `/sce/` path;
    /// everything newer uses the `/sie/` init paths.
    pub fn path(target: Target) -> &'static str {
        match target {
            Target::Ps4V8 | Target::Ps4V9 => "/sce/rp/session",
            t if t.is_ps5() => "/sie/ps5/rp/sess/init",
            _ => "/sie/ps4/rp/sess/init",
        }
    }

    /// Serialize to the HTTP wire format.
    ///
    /// Fails with [`SessionError::InvalidData`] when the target has no
    /// canonical RP-Version string (unknown targets are never sent).
    pub fn serialize(&self) -> Result<String> {
        let rp_version = self
            .target
            .rp_version()
            .ok_or(SessionError::InvalidData("target has no RP-Version"))?;

        let mut request = format!(
            "GET {} HTTP/1.1\r\n",
            SessionRequest::path(self.target)
        );
        request.push_str(&format!("Host: {}:{}\r\n", self.host, self.port));
        request.push_str("User-Agent: remoteplay Windows\r\n");
        request.push_str("Connection: close\r\n");
        request.push_str("Content-Length: 0\r\n");
        request.push_str(&format!(
            "RP-Registkey: {}\r\n",
            regist_key_hex(self.regist_key)
        ));
        request.push_str(&format!("Rp-Version: {}\r\n", rp_version));
        request.push_str("\r\n");
        Ok(request)
    }
}

/// Hex-encode a registration key, stopping at the first NUL byte.
///
/// Two lowercase characters per byte.
pub fn regist_key_hex(regist_key: &[u8]) -> String {
    regist_key
        .iter()
        .take_while(|&&b| b != 0)
        .map(|b| format!("{:02x}", b))
        .collect()
}
