//! General error type used in the crate.
use std::{fmt, io};

#[cfg(feature = "native-tls")]
use tokio_native_tls::native_tls;

use crate::{proto::ProtocolError, upgrade};

/// Generic error when using websockets with this crate.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Attempted to read or write on a stream whose close handshake has
    /// already finished.
    AlreadyClosed,
    /// Attempted to connect a [`Connection`] that is not idle.
    ///
    /// [`Connection`]: crate::Connection
    AlreadyConnected,
    /// Attempted to send on a [`Connection`] that is not open.
    ///
    /// [`Connection`]: crate::Connection
    NotConnected,
    /// DNS lookup failed.
    CannotResolveHost,
    /// A frame payload exceeded the configured maximum length.
    FrameTooLong {
        /// Size of the frame payload.
        size: usize,
        /// The configured maximum frame payload size.
        max_size: usize,
    },
    /// A message payload exceeded the configured maximum length.
    MessageTooLong {
        /// Size of the message payload.
        size: usize,
        /// The configured maximum message payload size.
        max_size: usize,
    },
    /// Attempted to connect a client to a remote without a configured URI.
    NoUriConfigured,
    /// The connection was closed by the transport before the HTTP/1.1 Upgrade
    /// response was received.
    NoUpgradeResponse,
    /// WebSocket protocol violation by the remote end.
    Protocol(ProtocolError),
    /// I/O error on the underlying transport.
    Io(io::Error),
    /// TLS error originating in [`native_tls`].
    #[cfg(feature = "native-tls")]
    #[cfg_attr(docsrs, doc(cfg(feature = "native-tls")))]
    NativeTls(native_tls::Error),
    /// Attempted to connect to an invalid DNS name.
    #[cfg(feature = "__rustls")]
    #[cfg_attr(docsrs, doc(cfg(feature = "__rustls")))]
    InvalidDNSName(rustls_pki_types::InvalidDnsNameError),
    /// TLS error originating in [`rustls`].
    ///
    /// [`rustls`]: tokio_rustls::rustls
    #[cfg(feature = "__rustls")]
    #[cfg_attr(docsrs, doc(cfg(feature = "__rustls")))]
    Rustls(tokio_rustls::rustls::Error),
    /// No TLS roots were found on the system.
    #[cfg(feature = "rustls-native-roots")]
    #[cfg_attr(docsrs, doc(cfg(feature = "rustls-native-roots")))]
    NoNativeRootCertificatesFound,
    /// The HTTP/1.1 Upgrade handshake failed.
    Upgrade(upgrade::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyClosed => f.write_str("connection is already closed"),
            Self::AlreadyConnected => f.write_str("connection is already established"),
            Self::NotConnected => f.write_str("connection is not open"),
            Self::CannotResolveHost => f.write_str("could not resolve host"),
            Self::FrameTooLong { size, max_size } => {
                write!(f, "frame too long: {size} bytes, maximum allowed: {max_size} bytes")
            }
            Self::MessageTooLong { size, max_size } => {
                write!(f, "message too long: {size} bytes, maximum allowed: {max_size} bytes")
            }
            Self::NoUriConfigured => f.write_str("client has no URI configured"),
            Self::NoUpgradeResponse => f.write_str("connection closed before upgrade response"),
            Self::Protocol(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            #[cfg(feature = "native-tls")]
            Self::NativeTls(e) => e.fmt(f),
            #[cfg(feature = "__rustls")]
            Self::InvalidDNSName(e) => e.fmt(f),
            #[cfg(feature = "__rustls")]
            Self::Rustls(e) => e.fmt(f),
            #[cfg(feature = "rustls-native-roots")]
            Self::NoNativeRootCertificatesFound => {
                f.write_str("no native root certificates found")
            }
            Self::Upgrade(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protocol(e) => Some(e),
            Self::Io(e) => Some(e),
            #[cfg(feature = "native-tls")]
            Self::NativeTls(e) => Some(e),
            #[cfg(feature = "__rustls")]
            Self::InvalidDNSName(e) => Some(e),
            #[cfg(feature = "__rustls")]
            Self::Rustls(e) => Some(e),
            Self::Upgrade(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<upgrade::Error> for Error {
    fn from(err: upgrade::Error) -> Self {
        Self::Upgrade(err)
    }
}

#[cfg(feature = "native-tls")]
impl From<native_tls::Error> for Error {
    fn from(err: native_tls::Error) -> Self {
        Self::NativeTls(err)
    }
}

#[cfg(feature = "__rustls")]
impl From<rustls_pki_types::InvalidDnsNameError> for Error {
    fn from(err: rustls_pki_types::InvalidDnsNameError) -> Self {
        Self::InvalidDNSName(err)
    }
}

#[cfg(feature = "__rustls")]
impl From<tokio_rustls::rustls::Error> for Error {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        Self::Rustls(err)
    }
}
