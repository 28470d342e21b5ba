use crate::error::{ParseErrorKind, Result, SessionError};

/// RP application reason: registration invalid or expired.
pub const APPLICATION_REASON_REGIST_FAILED: u32 = 0x81;
/// RP application reason: the PSN account id was rejected.
pub const APPLICATION_REASON_INVALID_PSN_ID: u32 = 0x82;
/// RP application reason: another Remote Play session is active.
pub const APPLICATION_REASON_IN_USE: u32 = 0x87;
/// RP application reason: Remote Play crashed on the console.
pub const APPLICATION_REASON_CRASH: u32 = 0x88;
/// RP application reason: the console wants a different RP-Version.
pub const APPLICATION_REASON_RP_VERSION: u32 = 0x80;
/// RP application reason: unclassified failure sentinel.
pub const APPLICATION_REASON_UNKNOWN: u32 = 0x100;

/// Human-readable text for a console-reported application reason.
pub fn application_reason_string(reason: u32) -> &'static str {
    match reason {
        APPLICATION_REASON_REGIST_FAILED => "Regist failed, probably invalid PIN",
        APPLICATION_REASON_INVALID_PSN_ID => "Invalid PSN ID",
        APPLICATION_REASON_IN_USE => "Remote is already in use",
        APPLICATION_REASON_CRASH => "Remote Play on Console crashed",
        APPLICATION_REASON_RP_VERSION => "RP-Version mismatch",
        _ => "unknown",
    }
}

/// A parsed session-init HTTP response (headers only, body ignored).
///
/// ```text
/// HTTP-Version SP Status-Code SP Reason-Phrase CRLF
/// *(Header: Value CRLF)
/// CRLF
/// ```
///
/// Header names are stored as-received; the two lookup methods implement
/// the exact-match and case-insensitive-match rules of the wire contract.
#[derive(Debug)]
pub struct HttpResponse {
    /// HTTP status code (e.g. 200, 403).
    pub code: u16,
    /// Headers as ordered (name, value) pairs.
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    /// Parse an HTTP response header block from its text representation.
    ///
    /// Expects at least a status line; header parsing stops at the first
    /// blank line. Returns [`SessionError::Parse`] on malformed input.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut lines = raw.lines();

        let status_line = lines.next().ok_or(SessionError::Parse {
            kind: ParseErrorKind::EmptyResponse,
        })?;

        let mut parts = status_line.split_whitespace();
        let version = parts.next().unwrap_or("");
        let code = parts
            .next()
            .and_then(|c| c.parse::<u16>().ok())
            .ok_or(SessionError::Parse {
                kind: ParseErrorKind::InvalidStatusLine,
            })?;
        if !version.starts_with("HTTP/") {
            return Err(SessionError::Parse {
                kind: ParseErrorKind::InvalidStatusLine,
            });
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }

            let colon_pos = line.find(':').ok_or(SessionError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;

            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();
            headers.push((name, value));
        }

        Ok(HttpResponse { code, headers })
    }

    /// Look up a header value by exact (case-sensitive) name.
    pub fn header_exact(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Look up a header value by name, ignoring ASCII case.
    pub fn header_ignore_case(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The session-relevant fields extracted from a session-init response.
#[derive(Debug)]
pub struct SessionResponse {
    /// `RP-Application-Reason` parsed as base-16, 0 when absent.
    pub application_reason: u32,
    /// `RP-Nonce` value (base64 text), matched case-sensitively.
    pub nonce: Option<String>,
    /// `RP-Version` value, matched case-insensitively.
    pub rp_version: Option<String>,
    /// HTTP 200 with a nonce present.
    pub success: bool,
}

impl SessionResponse {
    pub fn from_http(response: &HttpResponse) -> Self {
        let nonce = response.header_exact("RP-Nonce").map(str::to_string);
        let rp_version = response
            .header_ignore_case("RP-Version")
            .map(str::to_string);
        let application_reason = response
            .header_exact("RP-Application-Reason")
            .map(parse_application_reason)
            .unwrap_or(0);

        let success = response.code == 200 && nonce.is_some();
        SessionResponse {
            application_reason,
            nonce,
            rp_version,
            success,
        }
    }
}

/// Parse an application reason value as base-16, with or without a
/// `0x` prefix. Unparsable values read as 0.
fn parse_application_reason(value: &str) -> u32 {
    let digits = value
        .trim()
        .strip_prefix("0x")
        .or_else(|| value.trim().strip_prefix("0X"))
        .unwrap_or_else(|| value.trim());
    u32::from_str_radix(digits, 16).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_success_response() {
        let raw = "HTTP/1.1 200 OK\r\nRP-Nonce: AAAAAAAAAAAAAAAAAAAAAA==\r\n\r\n";
        let response = HttpResponse::parse(raw).unwrap();
        assert_eq!(response.code, 200);
        let session = SessionResponse::from_http(&response);
        assert!(session.success);
        assert_eq!(session.nonce.as_deref(), Some("AAAAAAAAAAAAAAAAAAAAAA=="));
    }

    #[test]
    fn nonce_header_is_case_sensitive() {
        let raw = "HTTP/1.1 200 OK\r\nrp-nonce: AAAAAAAAAAAAAAAAAAAAAA==\r\n\r\n";
        let response = HttpResponse::parse(raw).unwrap();
        let session = SessionResponse::from_http(&response);
        assert!(session.nonce.is_none());
        assert!(!session.success);
    }

    #[test]
    fn version_header_is_case_insensitive() {
        let raw = "HTTP/1.1 403 Forbidden\r\nrp-VERSION: 9.0\r\n\r\n";
        let response = HttpResponse::parse(raw).unwrap();
        let session = SessionResponse::from_http(&response);
        assert_eq!(session.rp_version.as_deref(), Some("9.0"));
    }

    #[test]
    fn application_reason_base16() {
        let raw = "HTTP/1.1 403 Forbidden\r\nRP-Application-Reason: 80\r\n\r\n";
        let response = HttpResponse::parse(raw).unwrap();
        let session = SessionResponse::from_http(&response);
        assert_eq!(session.application_reason, APPLICATION_REASON_RP_VERSION);
    }

    #[test]
    fn application_reason_with_prefix() {
        let raw = "HTTP/1.1 403 Forbidden\r\nRP-Application-Reason: 0x87\r\n\r\n";
        let response = HttpResponse::parse(raw).unwrap();
        let session = SessionResponse::from_http(&response);
        assert_eq!(session.application_reason, APPLICATION_REASON_IN_USE);
    }

    #[test]
    fn non_200_is_not_success_even_with_nonce() {
        let raw = "HTTP/1.1 403 Forbidden\r\nRP-Nonce: AAAAAAAAAAAAAAAAAAAAAA==\r\n\r\n";
        let response = HttpResponse::parse(raw).unwrap();
        let session = SessionResponse::from_http(&response);
        assert!(!session.success);
    }

    #[test]
    fn parse_empty_response() {
        assert!(HttpResponse::parse("").is_err());
    }

    #[test]
    fn parse_invalid_status_line() {
        assert!(HttpResponse::parse("NOT_HTTP\r\n\r\n").is_err());
        assert!(HttpResponse::parse("HTTP/1.1 abc OK\r\n\r\n").is_err());
    }

    #[test]
    fn parse_invalid_header() {
        assert!(HttpResponse::parse("HTTP/1.1 200 OK\r\nno-colon-here\r\n\r\n").is_err());
    }

    #[test]
    fn reason_strings() {
        assert_eq!(
            application_reason_string(APPLICATION_REASON_IN_USE),
            "Remote is already in use"
        );
        assert_eq!(application_reason_string(0xdead), "unknown");
    }
}
