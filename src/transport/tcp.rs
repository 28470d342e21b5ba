use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use crate::error::{ParseErrorKind, Result, SessionError};
use crate::sync::{POLL_INTERVAL, StopToken};

/// Receive buffer for the session-init response header. Request and
/// response both fit in 512 bytes on the wire.
const HEADER_BUF_SIZE: usize = 512;

/// Cancellable TCP connect with an overall deadline.
///
/// Connects in [`POLL_INTERVAL`] slices and re-checks the stop token
/// between attempts. Hard connect errors (e.g. connection refused) are
/// returned immediately; only timeout slices are retried.
pub(crate) fn connect(
    addr: &SocketAddr,
    stop: &StopToken,
    timeout: Duration,
) -> Result<TcpStream> {
    let deadline = Instant::now() + timeout;
    loop {
        if stop.is_stopped() {
            return Err(SessionError::Canceled);
        }
        match TcpStream::connect_timeout(addr, POLL_INTERVAL) {
            Ok(stream) => return Ok(stream),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                if Instant::now() >= deadline {
                    return Err(SessionError::Network(e));
                }
            }
            Err(e) => return Err(SessionError::Network(e)),
        }
    }
}

/// Read an HTTP response header block with a bounded timeout.
///
/// Accumulates bytes until the `\r\n\r\n` terminator, the buffer fills,
/// the deadline passes, or the stop token trips. Returns the header
/// text including the terminator.
pub(crate) fn recv_http_header(
    stream: &TcpStream,
    stop: &StopToken,
    timeout: Duration,
) -> Result<String> {
    stream.set_read_timeout(Some(POLL_INTERVAL))?;

    let mut buf = [0u8; HEADER_BUF_SIZE];
    let mut received = 0usize;
    let deadline = Instant::now() + timeout;
    let mut reader = stream;

    loop {
        if stop.is_stopped() {
            return Err(SessionError::Canceled);
        }
        if Instant::now() >= deadline {
            return Err(SessionError::Network(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "timed out waiting for response header",
            )));
        }

        match reader.read(&mut buf[received..]) {
            Ok(0) => {
                return Err(SessionError::Network(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed before response header end",
                )));
            }
            Ok(n) => {
                received += n;
                if let Some(end) = header_end(&buf[..received]) {
                    return Ok(String::from_utf8_lossy(&buf[..end]).into_owned());
                }
                if received == buf.len() {
                    return Err(SessionError::Parse {
                        kind: ParseErrorKind::HeaderTooLarge,
                    });
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(SessionError::Network(e)),
        }
    }
}

/// Offset just past the `\r\n\r\n` header terminator, if present.
fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}
