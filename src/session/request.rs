//! The session-request client: one HTTP exchange per attempt.
//!
//! Walks the resolved address candidates, connects cancellably, sends
//! the session-init request and classifies the response. Version
//! mismatches are reported back to the state machine, which owns the
//! renegotiation retries.

use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use base64::prelude::{BASE64_STANDARD, Engine as _};

use crate::config::REGIST_KEY_SIZE;
use crate::crypto::RPCRYPT_KEY_SIZE;
use crate::error::SessionError;
use crate::protocol::response::{
    APPLICATION_REASON_CRASH, APPLICATION_REASON_IN_USE, APPLICATION_REASON_RP_VERSION,
    APPLICATION_REASON_UNKNOWN, application_reason_string,
};
use crate::protocol::{HttpResponse, SessionRequest, SessionResponse};
use crate::session::{QuitReason, SESSION_EXPECT_TIMEOUT_MS};
use crate::sync::StopToken;
use crate::target::Target;
use crate::transport::tcp;

/// Inputs of one session-request attempt.
pub(crate) struct RequestConfig<'a> {
    pub addrs: &'a [SocketAddr],
    pub regist_key: &'a [u8; REGIST_KEY_SIZE],
    pub target: Target,
    pub ps5: bool,
    pub stop: &'a StopToken,
}

/// Successful session request: the console accepted us.
pub(crate) struct RequestSuccess {
    pub nonce: [u8; RPCRYPT_KEY_SIZE],
    /// The candidate that connected, latched for the ctrl channel.
    pub selected: SocketAddr,
    /// Numeric form of the selected address.
    pub hostname: String,
}

/// Classified result of one session-request attempt.
pub(crate) enum RequestOutcome {
    Success(RequestSuccess),
    /// The console wants a different RP-Version. `server_target` is the
    /// parsed (or normalized) server version, or the family's unknown
    /// target when the server version was unusable.
    VersionMismatch { server_target: Target },
    /// Terminal failure for this attempt, with its quit reason.
    Failed {
        reason: QuitReason,
        error: SessionError,
    },
}

impl RequestOutcome {
    fn failed(reason: QuitReason, error: SessionError) -> Self {
        RequestOutcome::Failed { reason, error }
    }
}

/// Perform one session-request attempt.
///
/// `want_server_target` corresponds to whether a version mismatch may
/// still be renegotiated; when false, mismatch classification is left
/// entirely to the application-reason mapping.
pub(crate) fn request_session(cfg: &RequestConfig<'_>, want_server_target: bool) -> RequestOutcome {
    let timeout = Duration::from_millis(SESSION_EXPECT_TIMEOUT_MS);

    // Candidate walk: first address that connects wins.
    let mut connected: Option<(std::net::TcpStream, SocketAddr, String)> = None;
    let mut tentative_reason: Option<QuitReason> = None;
    for addr in cfg.addrs {
        let hostname = addr.ip().to_string();
        tracing::info!(host = %hostname, port = addr.port(), "trying to request session");

        match tcp::connect(addr, cfg.stop, timeout) {
            Ok(stream) => {
                connected = Some((stream, *addr, hostname));
                break;
            }
            Err(SessionError::Canceled) => {
                tracing::info!("session stopped while connecting for session request");
                return RequestOutcome::failed(QuitReason::Stopped, SessionError::Canceled);
            }
            Err(e) => {
                tracing::error!(host = %hostname, error = %e, "session request connect failed");
                tentative_reason = if is_connection_refused(&e) {
                    Some(QuitReason::SessionRequestConnectionRefused)
                } else {
                    None
                };
            }
        }
    }

    let Some((mut stream, selected, hostname)) = connected else {
        tracing::error!("session request connect failed on every candidate");
        return RequestOutcome::failed(
            tentative_reason.unwrap_or(QuitReason::SessionRequestUnknown),
            SessionError::Network(std::io::Error::other("session request connect failed")),
        );
    };

    tracing::info!(host = %hostname, port = selected.port(), "connected for session request");

    let request = SessionRequest {
        host: &hostname,
        port: selected.port(),
        regist_key: cfg.regist_key,
        target: cfg.target,
    };
    let request_text = match request.serialize() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "failed to build session request");
            return RequestOutcome::failed(QuitReason::SessionRequestUnknown, e);
        }
    };

    tracing::info!("sending session request");
    tracing::trace!(request = %request_text, "session request text");

    if let Err(e) = stream.write_all(request_text.as_bytes()) {
        tracing::error!(error = %e, "failed to send session request");
        return RequestOutcome::failed(QuitReason::SessionRequestUnknown, e.into());
    }

    let header = match tcp::recv_http_header(&stream, cfg.stop, timeout) {
        Ok(header) => header,
        Err(SessionError::Canceled) => {
            return RequestOutcome::failed(QuitReason::Stopped, SessionError::Canceled);
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to receive session request response");
            return RequestOutcome::failed(QuitReason::SessionRequestUnknown, e);
        }
    };

    tracing::trace!(response = %header, "session response header");

    let http_response = match HttpResponse::parse(&header) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "failed to parse session request response");
            return RequestOutcome::failed(QuitReason::SessionRequestUnknown, e);
        }
    };
    let response = SessionResponse::from_http(&http_response);

    classify_response(cfg, &response, want_server_target, selected, hostname)
}

fn classify_response(
    cfg: &RequestConfig<'_>,
    response: &SessionResponse,
    want_server_target: bool,
    selected: SocketAddr,
    hostname: String,
) -> RequestOutcome {
    // Request serialization already proved the target has a version.
    let our_version = cfg.target.rp_version().unwrap_or("");

    if response.success {
        let nonce_b64 = response.nonce.as_deref().unwrap_or("");
        let decoded = BASE64_STANDARD.decode(nonce_b64);
        return match decoded {
            Ok(bytes) if bytes.len() == RPCRYPT_KEY_SIZE => {
                let mut nonce = [0u8; RPCRYPT_KEY_SIZE];
                nonce.copy_from_slice(&bytes);
                RequestOutcome::Success(RequestSuccess {
                    nonce,
                    selected,
                    hostname,
                })
            }
            _ => {
                tracing::error!("nonce invalid");
                RequestOutcome::failed(
                    QuitReason::SessionRequestUnknown,
                    SessionError::InvalidData("nonce is not 16 base64-decoded bytes"),
                )
            }
        };
    }

    let reason = response.application_reason;
    if (reason == APPLICATION_REASON_RP_VERSION || reason == APPLICATION_REASON_UNKNOWN)
        && want_server_target
        && response
            .rp_version
            .as_deref()
            .is_some_and(|server| server != our_version)
    {
        let server_version = response.rp_version.as_deref().unwrap_or("");
        tracing::info!(
            ours = our_version,
            server = server_version,
            "console reported RP-Version mismatch"
        );
        let server_target = Target::parse_rp_version(server_version, cfg.ps5);
        let server_target = if !server_target.is_unknown() {
            tracing::info!(version = %server_target, "detected server RP-Version");
            server_target
        } else if server_version == "5.0" {
            // Some firmwares report 5.0 here; 9.0 is what they actually speak.
            tracing::info!("server reported RP-Version 5.0, retrying as 9.0");
            Target::Ps4V9
        } else {
            tracing::error!(server = server_version, "server RP-Version is unknown");
            Target::unknown(cfg.ps5)
        };
        return RequestOutcome::VersionMismatch { server_target };
    }

    tracing::error!(
        reason = format_args!("{:#x}", reason),
        text = application_reason_string(reason),
        "console reported application reason"
    );
    match reason {
        APPLICATION_REASON_IN_USE => RequestOutcome::failed(
            QuitReason::SessionRequestRpInUse,
            SessionError::Unknown,
        ),
        APPLICATION_REASON_CRASH => RequestOutcome::failed(
            QuitReason::SessionRequestRpCrash,
            SessionError::Unknown,
        ),
        APPLICATION_REASON_RP_VERSION => RequestOutcome::VersionMismatch {
            server_target: Target::unknown(cfg.ps5),
        },
        _ => RequestOutcome::failed(QuitReason::SessionRequestUnknown, SessionError::Unknown),
    }
}

fn is_connection_refused(error: &SessionError) -> bool {
    matches!(
        error,
        SessionError::Network(e) if e.kind() == std::io::ErrorKind::ConnectionRefused
    )
}
