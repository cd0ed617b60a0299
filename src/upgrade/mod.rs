//! Codec and error types for the client side of the HTTP/1.1 Upgrade
//! handshake that promotes a TCP/TLS connection to WebSocket framing.
use std::fmt;

mod response;

pub use response::{Codec, Response};

/// Error during the HTTP/1.1 Upgrade handshake with a server.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The server response could not be parsed.
    Parsing(httparse::Error),
    /// A header required for the WebSocket protocol is missing in the
    /// response.
    MissingHeader(&'static str),
    /// The server responded with a status code other than 101 Switching
    /// Protocols.
    DidNotSwitchProtocols(u16),
    /// The `Connection` header of the response does not contain "upgrade".
    WrongConnectionHeader,
    /// The `Upgrade` header of the response is not "websocket".
    WrongUpgradeHeader,
    /// The `Sec-WebSocket-Accept` header does not match the digest of the key
    /// sent in the request.
    WrongWebSocketAccept,
    /// The `Content-Length` header of the response is not a valid length.
    InvalidContentLength,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsing(e) => write!(f, "parsing upgrade response failed: {e}"),
            Self::MissingHeader(header) => write!(f, "server didn't respond with {header} header"),
            Self::DidNotSwitchProtocols(code) => {
                write!(f, "expected 101 Switching Protocols, got status code {code}")
            }
            Self::WrongConnectionHeader => {
                f.write_str("server responded without Connection: Upgrade header")
            }
            Self::WrongUpgradeHeader => {
                f.write_str("server responded without Upgrade: websocket header")
            }
            Self::WrongWebSocketAccept => {
                f.write_str("server responded with incorrect Sec-WebSocket-Accept header")
            }
            Self::InvalidContentLength => {
                f.write_str("server responded with invalid Content-Length header")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parsing(e) => Some(e),
            _ => None,
        }
    }
}

impl From<httparse::Error> for Error {
    fn from(err: httparse::Error) -> Self {
        Self::Parsing(err)
    }
}
