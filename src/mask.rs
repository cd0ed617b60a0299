//! Implementation of WebSocket frame masking and unmasking, an involution
//! that XORs payload bytes with a rotating 4-byte key.
//!
//! Masking works in chunks of 8 bytes by widening the key to a `u64` and is
//! resumable: the caller passes the offset into the payload at which the
//! input slice starts, so partially received payloads can be unmasked as
//! they arrive.

/// (Un-)masks input bytes with the framing key.
///
/// The input bytes may be further in the payload and therefore the offset
/// into the payload must be specified.
pub fn frame(key: &[u8], input: &mut [u8], offset: usize) {
    let mut rotated = [0; 4];

    for (i, byte) in rotated.iter_mut().enumerate() {
        *byte = key[(offset + i) % 4];
    }

    let mask_u64 = u64::from_ne_bytes([
        rotated[0], rotated[1], rotated[2], rotated[3], rotated[0], rotated[1], rotated[2],
        rotated[3],
    ]);

    let mut chunks = input.chunks_exact_mut(8);

    for chunk in chunks.by_ref() {
        // The chunk is exactly 8 bytes long
        let block = u64::from_ne_bytes(chunk.try_into().unwrap());
        chunk.copy_from_slice(&(block ^ mask_u64).to_ne_bytes());
    }

    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= rotated[i % 4];
    }
}
