//! WebSocket protocol error type.
use std::fmt;

/// Error encountered on protocol violations by the other end of the
/// connection.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    /// A close frame with a close code that may not be sent over the wire was
    /// received.
    DisallowedCloseCode,
    /// A control frame with the FIN bit unset was received.
    FragmentedControlFrame,
    /// An invalid close code was received.
    InvalidCloseCode,
    /// A close frame with a payload of exactly one byte was received.
    InvalidCloseSequence,
    /// A control frame with a payload longer than 125 bytes was received.
    InvalidControlFrameLength,
    /// An invalid opcode was received.
    InvalidOpcode,
    /// An overlong payload length encoding was received.
    InvalidPayloadLength,
    /// A frame with non-zero reserved bits was received. These are used by
    /// extensions, which are unsupported.
    InvalidRsv,
    /// An invalid UTF-8 segment was received when valid UTF-8 was expected.
    InvalidUtf8,
    /// A continuation frame was received without an in-progress message.
    UnexpectedContinuation,
    /// A masked frame was unexpectedly received.
    UnexpectedMaskedFrame,
    /// An unmasked frame was unexpectedly received.
    UnexpectedUnmaskedFrame,
    /// A new data frame was received before the previous fragmented message
    /// was completed.
    UnfinishedMessage,
}

impl ProtocolError {
    /// Stringify this variant.
    pub(super) const fn as_str(&self) -> &'static str {
        match self {
            ProtocolError::DisallowedCloseCode => "disallowed close code",
            ProtocolError::FragmentedControlFrame => "fragmented control frame",
            ProtocolError::InvalidCloseCode => "invalid close code",
            ProtocolError::InvalidCloseSequence => "invalid close sequence",
            ProtocolError::InvalidControlFrameLength => "invalid control frame length",
            ProtocolError::InvalidOpcode => "invalid opcode",
            ProtocolError::InvalidPayloadLength => "invalid payload length",
            ProtocolError::InvalidRsv => "invalid extension",
            ProtocolError::InvalidUtf8 => "invalid utf-8",
            ProtocolError::UnexpectedContinuation => "unexpected continuation frame",
            ProtocolError::UnexpectedMaskedFrame => "unexpected masked frame",
            ProtocolError::UnexpectedUnmaskedFrame => "unexpected unmasked frame",
            ProtocolError::UnfinishedMessage => "unfinished message",
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ProtocolError {}
