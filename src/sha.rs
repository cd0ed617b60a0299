//! SHA-1 digest of the WebSocket key for `Sec-WebSocket-Accept` validation.

/// GUID defined in RFC 6455 that is appended to the WebSocket key before
/// hashing.
const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Calculate the SHA-1 digest of a WebSocket key and the GUID.
pub fn digest(key: &[u8]) -> [u8; 20] {
    let mut s = sha1_smol::Sha1::new();
    s.update(key);
    s.update(GUID.as_bytes());
    s.digest().bytes()
}
