//! Types required for the WebSocket protocol implementation.
use std::num::NonZeroU16;

use bytes::{BufMut, Bytes, BytesMut};

use super::error::ProtocolError;

/// The opcode of a WebSocket frame. It denotes the type of the frame or an
/// assembled message.
///
/// A fully assembled [`Message`] will never have a continuation opcode.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum OpCode {
    /// A continuation opcode. This will never be encountered in a full
    /// [`Message`].
    Continuation,
    /// A text opcode.
    Text,
    /// A binary opcode.
    Binary,
    /// A close opcode.
    Close,
    /// A ping opcode.
    Ping,
    /// A pong opcode.
    Pong,
}

impl OpCode {
    /// Whether this is a control opcode (i.e. close, ping or pong).
    pub(super) fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Continuation),
            1 => Ok(Self::Text),
            2 => Ok(Self::Binary),
            8 => Ok(Self::Close),
            9 => Ok(Self::Ping),
            10 => Ok(Self::Pong),
            _ => Err(ProtocolError::InvalidOpcode),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(value: OpCode) -> Self {
        match value {
            OpCode::Continuation => 0,
            OpCode::Text => 1,
            OpCode::Binary => 2,
            OpCode::Close => 8,
            OpCode::Ping => 9,
            OpCode::Pong => 10,
        }
    }
}

/// Close status code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CloseCode(NonZeroU16);

// rustfmt reorders these alphabetically
#[rustfmt::skip]
impl CloseCode {
    /// Normal closure, meaning that the purpose for which the connection was
    /// established has been fulfilled.
    pub const NORMAL_CLOSURE: Self = Self::from_u16(1000);
    /// Endpoint is "going away", such as a server going down or a browser
    /// having navigated away from a page.
    pub const GOING_AWAY: Self = Self::from_u16(1001);
    /// Endpoint is terminating the connection due to a protocol error.
    pub const PROTOCOL_ERROR: Self = Self::from_u16(1002);
    /// Endpoint is terminating the connection because it has received a type of
    /// data it cannot accept.
    pub const UNSUPPORTED_DATA: Self = Self::from_u16(1003);
    /// No status code was actually present.
    pub const NO_STATUS_RECEIVED: Self = Self::from_u16(1005);
    /// Endpoint is terminating the connection because it has received data
    /// within a message that was not consistent with the type of the message.
    pub const INVALID_FRAME_PAYLOAD_DATA: Self = Self::from_u16(1007);
    /// Endpoint is terminating the connection because it has received a message
    /// that violates its policy.
    pub const POLICY_VIOLATION: Self = Self::from_u16(1008);
    /// Endpoint is terminating the connection because it has received a message
    /// that is too big for it to process.
    pub const MESSAGE_TOO_BIG: Self = Self::from_u16(1009);
    /// Client is terminating the connection because it has expected the server
    /// to negotiate one or more extension, but the server didn't return them in
    /// the response message of the WebSocket handshake.
    pub const MANDATORY_EXTENSION: Self = Self::from_u16(1010);
    /// Server is terminating the connection because it encountered an
    /// unexpected condition that prevented it from fulfilling the request.
    pub const INTERNAL_SERVER_ERROR: Self = Self::from_u16(1011);
    /// Service is restarted. A client may reconnect, and if it choses to do,
    /// should reconnect using a randomized delay of 5--30s.
    pub const SERVICE_RESTART: Self = Self::from_u16(1012);
    /// Service is experiencing overload. A client should only connect to a
    /// different IP (when there are multiple for the target) or reconnect to
    /// the same IP upon user action.
    pub const SERVICE_OVERLOAD: Self = Self::from_u16(1013);
    /// The server was acting as a gateway or proxy and received an invalid
    /// response from the upstream server. This is similar to the HTTP 502
    /// status code.
    pub const BAD_GATEWAY: Self = Self::from_u16(1014);
}

impl CloseCode {
    /// Creates a close code from a constant. Panics in const evaluation when
    /// the value is zero.
    const fn from_u16(value: u16) -> Self {
        match NonZeroU16::new(value) {
            Some(value) => Self(value),
            None => panic!("close code must be non-zero"),
        }
    }

    /// Whether the close code is allowed to appear on the wire.
    pub(crate) fn is_sendable(self) -> bool {
        !matches!(self.0.get(), 1004..=1006 | 1015)
    }
}

impl From<CloseCode> for u16 {
    fn from(value: CloseCode) -> Self {
        value.0.get()
    }
}

impl TryFrom<u16> for CloseCode {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1000..=1015 | 3000..=4999 => Ok(Self::from_u16(value)),
            _ => Err(ProtocolError::InvalidCloseCode),
        }
    }
}

/// A WebSocket message, assembled from one or more [`Frame`]s. This is
/// cheaply clonable since the payload is stored in [`Bytes`].
///
/// Received messages are validated prior to being returned, so the type
/// casting methods on received messages never fail.
#[derive(Debug, Clone)]
pub struct Message {
    /// The [`OpCode`] of the message.
    pub(crate) opcode: OpCode,
    /// The payload of the message.
    pub(crate) payload: Bytes,
}

impl Message {
    /// Default close message with code 1000 (normal closure).
    pub(crate) const DEFAULT_CLOSE: Self = Self {
        opcode: OpCode::Close,
        payload: Bytes::from_static(&1000_u16.to_be_bytes()),
    };

    /// Create a new text message.
    #[must_use]
    pub fn text<P: Into<String>>(payload: P) -> Self {
        Self {
            opcode: OpCode::Text,
            payload: payload.into().into_bytes().into(),
        }
    }

    /// Create a new binary message.
    #[must_use]
    pub fn binary<P: Into<Bytes>>(payload: P) -> Self {
        Self {
            opcode: OpCode::Binary,
            payload: payload.into(),
        }
    }

    /// Create a new close message. If a non-empty reason is specified, a
    /// [`CloseCode`] must be specified for it to be included.
    #[must_use]
    pub fn close(code: Option<CloseCode>, reason: &str) -> Self {
        let mut payload = BytesMut::with_capacity((2 + reason.len()) * usize::from(code.is_some()));

        if let Some(code) = code {
            payload.put_u16(code.into());
            payload.extend_from_slice(reason.as_bytes());
        }

        Self {
            opcode: OpCode::Close,
            payload: payload.freeze(),
        }
    }

    /// Create a new ping message.
    #[must_use]
    pub fn ping<P: Into<Bytes>>(payload: P) -> Self {
        Self {
            opcode: OpCode::Ping,
            payload: payload.into(),
        }
    }

    /// Create a new pong message.
    #[must_use]
    pub fn pong<P: Into<Bytes>>(payload: P) -> Self {
        Self {
            opcode: OpCode::Pong,
            payload: payload.into(),
        }
    }

    /// Whether the message is a text message.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.opcode == OpCode::Text
    }

    /// Whether the message is a binary message.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.opcode == OpCode::Binary
    }

    /// Whether the message is a close message.
    #[must_use]
    pub fn is_close(&self) -> bool {
        self.opcode == OpCode::Close
    }

    /// Whether the message is a ping message.
    #[must_use]
    pub fn is_ping(&self) -> bool {
        self.opcode == OpCode::Ping
    }

    /// Whether the message is a pong message.
    #[must_use]
    pub fn is_pong(&self) -> bool {
        self.opcode == OpCode::Pong
    }

    /// Returns the message payload and consumes the message, regardless of
    /// type.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Returns a reference to the message payload, regardless of message
    /// type.
    #[must_use]
    pub fn as_payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns a reference to the message payload as a string if it is a text
    /// message with valid UTF-8 contents. Received text messages are always
    /// valid UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        (self.opcode == OpCode::Text)
            .then(|| std::str::from_utf8(&self.payload).ok())
            .flatten()
    }

    /// Returns the [`CloseCode`] and close reason if the message is a close
    /// message.
    #[must_use]
    pub fn as_close(&self) -> Option<(CloseCode, &str)> {
        (self.opcode == OpCode::Close).then(|| {
            let code = self
                .payload
                .get(0..2)
                .and_then(|bytes| u16::from_be_bytes(bytes.try_into().ok()?).try_into().ok())
                .unwrap_or(CloseCode::NO_STATUS_RECEIVED);

            let reason = self
                .payload
                .get(2..)
                .and_then(|bytes| std::str::from_utf8(bytes).ok())
                .unwrap_or_default();

            (code, reason)
        })
    }
}

/// Configuration for limitations on reading of [`Message`]s from a
/// [`WebSocketStream`] to prevent high memory usage caused by malicious
/// actors.
///
/// [`WebSocketStream`]: super::WebSocketStream
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// The maximum allowed frame payload length. The default is 16 MiB.
    pub(super) max_frame_size: Option<usize>,
    /// The maximum allowed message payload length. The default is 64 MiB.
    pub(super) max_message_size: Option<usize>,
}

impl Limits {
    /// A limit configuration without any limits.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_frame_size: None,
            max_message_size: None,
        }
    }

    /// Sets the maximum allowed frame payload length. `None` equals no limit.
    /// The default is 16 MiB.
    #[must_use]
    pub fn max_frame_size(mut self, size: Option<usize>) -> Self {
        self.max_frame_size = size;

        self
    }

    /// Sets the maximum allowed message payload length. `None` equals no
    /// limit. The default is 64 MiB.
    #[must_use]
    pub fn max_message_size(mut self, size: Option<usize>) -> Self {
        self.max_message_size = size;

        self
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: Some(16 * 1024 * 1024),
            max_message_size: Some(64 * 1024 * 1024),
        }
    }
}

/// Low-level configuration for a [`WebSocketStream`] that allows configuring
/// behavior for sending and receiving messages.
///
/// [`WebSocketStream`]: super::WebSocketStream
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Frame payload size to split outgoing messages into.
    pub(super) frame_size: usize,
    /// Threshold of queued up bytes after which the underlying I/O is flushed
    /// before the sink is declared ready.
    pub(super) flush_threshold: usize,
}

impl Config {
    /// Set the frame payload size to split outgoing messages into.
    ///
    /// Consider decreasing this if the remote imposes a limit on the frame
    /// payload size. The default is 4 MiB.
    ///
    /// # Panics
    ///
    /// If `frame_size` is `0`.
    #[must_use]
    pub fn frame_size(mut self, frame_size: usize) -> Self {
        assert_ne!(frame_size, 0, "frame_size must be non-zero");
        self.frame_size = frame_size;

        self
    }

    /// Sets the threshold of queued up bytes after which the underlying I/O
    /// is flushed before the sink is declared ready. The default is 8 KiB.
    #[must_use]
    pub fn flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;

        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_size: 4 * 1024 * 1024,
            flush_threshold: 8 * 1024,
        }
    }
}

/// Role assumed by the [`WebSocketStream`] in a connection.
///
/// The client end masks every outgoing frame and rejects masked incoming
/// frames, the server end does the opposite.
///
/// [`WebSocketStream`]: super::WebSocketStream
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum Role {
    /// The client end.
    Client,
    /// The server end. Only used by unit tests, the crate does not implement
    /// server-side upgrades.
    #[cfg_attr(not(test), allow(dead_code))]
    Server,
}

/// The close handshake state of the data-transfer phase.
#[derive(Debug, PartialEq)]
pub(super) enum StreamState {
    /// The connection is fully active and no close has been initiated.
    Active,
    /// The connection has been closed by the peer, but not yet acknowledged
    /// by us.
    ClosedByPeer,
    /// The connection has been closed by us, but not yet acknowledged.
    ClosedByUs,
    /// The close has been acknowledged by the end that did not initiate the
    /// close.
    CloseAcknowledged,
}

/// A frame of a WebSocket [`Message`].
#[derive(Clone, Debug)]
pub(crate) struct Frame {
    /// The [`OpCode`] of the frame.
    pub opcode: OpCode,
    /// Whether this is the last frame of a message.
    pub is_final: bool,
    /// The payload bytes of the frame.
    pub payload: Bytes,
}

impl From<&ProtocolError> for Message {
    fn from(val: &ProtocolError) -> Self {
        match val {
            ProtocolError::InvalidUtf8 => {
                Message::close(Some(CloseCode::INVALID_FRAME_PAYLOAD_DATA), "invalid utf8")
            }
            _ => Message::close(Some(CloseCode::PROTOCOL_ERROR), val.as_str()),
        }
    }
}
