//! A [`Codec`] to perform a HTTP Upgrade handshake with a server and validate
//! the response.
//!
//! The decoder is resumable in two phases: it first re-attempts to parse the
//! status line and header block whenever new bytes arrive, then waits for the
//! `Content-Length` delimited body. Bytes following the body, such as early
//! WebSocket frames sent by the server, are left in the read buffer for the
//! frame codec that takes over the connection.
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::{Buf, Bytes, BytesMut};
use http::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH},
    StatusCode, Version,
};
use tokio_util::codec::Decoder;

use super::Error;
use crate::sha::digest;

/// HTTP status code for Switching Protocols.
const SWITCHING_PROTOCOLS: u16 = 101;

/// Find a header in an array of headers by name, ignoring ASCII case.
fn header<'a, 'header: 'a>(
    headers: &'a [httparse::Header<'header>],
    name: &'static str,
) -> Result<&'header [u8], Error> {
    let header = headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
        .ok_or(Error::MissingHeader(name))?;

    Ok(header.value)
}

/// Returns whether an ASCII byte slice is contained in another one, ignoring
/// capitalization.
fn contains_ignore_ascii_case(mut haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }

    while haystack.len() >= needle.len() {
        if haystack[..needle.len()].eq_ignore_ascii_case(needle) {
            return true;
        }

        haystack = &haystack[1..];
    }

    false
}

/// The server's response to the client's HTTP/1.1 Upgrade request.
#[derive(Debug)]
pub struct Response {
    /// HTTP version of the response.
    version: Version,
    /// Numeric status code of the response.
    status: StatusCode,
    /// Reason phrase of the status line.
    reason: String,
    /// Response headers. Lookups are case-insensitive and a name may carry
    /// multiple values.
    headers: HeaderMap,
    /// Response body, bounded by the `Content-Length` header. Empty when the
    /// header is absent.
    body: Bytes,
}

impl Response {
    /// HTTP version of the response.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Status code of the response.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Reason phrase of the status line.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Response body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Resume point of the response decoder.
#[derive(Debug)]
enum DecodeState {
    /// Waiting for the blank-line terminated status line and header block.
    Head,
    /// The head was consumed and validated, waiting for `remaining` body
    /// bytes.
    Body {
        /// The decoded response with an empty body.
        response: Option<Response>,
        /// Number of body bytes announced via `Content-Length`.
        remaining: usize,
    },
}

/// [`Decoder`] for parsing and validating the server's response to the
/// client's HTTP `Connection: Upgrade` request.
#[derive(Debug)]
pub struct Codec {
    /// The SHA-1 digest of the `Sec-WebSocket-Key` header.
    ws_accept: [u8; 20],
    /// The [`DecodeState`] the decoder is suspended in.
    state: DecodeState,
}

impl Codec {
    /// Returns a new [`Codec`].
    ///
    /// The `key` parameter provides the string passed to the server via the
    /// HTTP `Sec-WebSocket-Key` header.
    #[must_use]
    pub fn new(key: &[u8]) -> Self {
        Self {
            ws_accept: digest(key),
            state: DecodeState::Head,
        }
    }

    /// Attempts to parse and validate the status line and header block at the
    /// start of `src`, advancing past it on success.
    ///
    /// Returns `Ok(None)` if the head is not complete yet.
    fn decode_head(&self, src: &mut BytesMut) -> Result<Option<(Response, usize)>, crate::Error> {
        let mut headers = [httparse::EMPTY_HEADER; 25];
        let mut response = httparse::Response::new(&mut headers);
        let status = response.parse(src).map_err(Error::Parsing)?;

        if !status.is_complete() {
            return Ok(None);
        }

        let head_len = status.unwrap();
        let code = response.code.unwrap();

        if code != SWITCHING_PROTOCOLS {
            return Err(crate::Error::Upgrade(Error::DidNotSwitchProtocols(code)));
        }

        let connection = header(response.headers, "Connection")?;
        if !contains_ignore_ascii_case(connection, b"upgrade") {
            return Err(crate::Error::Upgrade(Error::WrongConnectionHeader));
        }

        let upgrade = header(response.headers, "Upgrade")?;
        if !upgrade.eq_ignore_ascii_case(b"websocket") {
            return Err(crate::Error::Upgrade(Error::WrongUpgradeHeader));
        }

        let accept_header = header(response.headers, "Sec-WebSocket-Accept")?;
        // base64 conservatively estimates 21 decoded bytes for the 28
        // character accept value, the actual digest is 20 bytes
        let mut ws_accept = [0; 21];
        let accept_len = STANDARD
            .decode_slice(accept_header, &mut ws_accept)
            .map_err(|_| Error::WrongWebSocketAccept)?;

        if self.ws_accept[..] != ws_accept[..accept_len] {
            return Err(crate::Error::Upgrade(Error::WrongWebSocketAccept));
        }

        let version = match response.version.unwrap() {
            0 => Version::HTTP_10,
            _ => Version::HTTP_11,
        };
        let reason = response.reason.unwrap_or_default().to_owned();

        let mut header_map = HeaderMap::with_capacity(response.headers.len());

        for h in response.headers.iter() {
            let name = HeaderName::from_bytes(h.name.as_bytes())
                .map_err(|_| Error::Parsing(httparse::Error::HeaderName))?;
            let value = HeaderValue::from_bytes(h.value)
                .map_err(|_| Error::Parsing(httparse::Error::HeaderValue))?;
            header_map.append(name, value);
        }

        let content_length = match header_map.get(CONTENT_LENGTH) {
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|value| value.trim().parse::<usize>().ok())
                .ok_or(Error::InvalidContentLength)?,
            None => 0,
        };

        src.advance(head_len);

        let response = Response {
            version,
            // The status code was already matched against 101
            status: StatusCode::from_u16(code).unwrap(),
            reason,
            headers: header_map,
            body: Bytes::new(),
        };

        Ok(Some((response, content_length)))
    }
}

impl Decoder for Codec {
    type Error = crate::Error;
    type Item = Response;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if matches!(self.state, DecodeState::Head) {
            match self.decode_head(src)? {
                Some((response, remaining)) => {
                    if remaining == 0 {
                        return Ok(Some(response));
                    }

                    self.state = DecodeState::Body {
                        response: Some(response),
                        remaining,
                    };
                }
                None => return Ok(None),
            }
        }

        let DecodeState::Body { response, remaining } = &mut self.state else {
            // The branch above always leaves the decoder in the body state
            unreachable!()
        };

        if src.len() < *remaining {
            src.reserve(remaining.saturating_sub(src.capacity()));

            return Ok(None);
        }

        let body = src.split_to(*remaining).freeze();
        // The state is only entered with a stored response
        let Some(mut response) = response.take() else {
            unreachable!()
        };
        response.body = body;
        self.state = DecodeState::Head;

        Ok(Some(response))
    }
}
