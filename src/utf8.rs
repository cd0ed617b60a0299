//! UTF-8 validation helpers with optional SIMD acceleration.
use crate::proto::ProtocolError;

/// Validates an entire byte slice as UTF-8.
#[cfg(feature = "simd")]
#[inline]
pub fn parse_str(input: &[u8]) -> Result<&str, ProtocolError> {
    simdutf8::basic::from_utf8(input).map_err(|_| ProtocolError::InvalidUtf8)
}

/// Validates an entire byte slice as UTF-8.
#[cfg(not(feature = "simd"))]
#[inline]
pub fn parse_str(input: &[u8]) -> Result<&str, ProtocolError> {
    std::str::from_utf8(input).map_err(|_| ProtocolError::InvalidUtf8)
}

/// Incrementally validates a partial UTF-8 sequence, returning the number of
/// bytes that are known to be valid.
///
/// If `is_complete`, the input must not end in the middle of a codepoint.
/// Otherwise, a trailing incomplete codepoint is tolerated and not counted as
/// valid yet, since more data may complete it.
///
/// # Errors
///
/// Returns a [`ProtocolError`] if the input contains bytes that can never
/// begin a valid codepoint.
#[cfg(feature = "simd")]
#[inline]
pub fn should_fail_fast(input: &[u8], is_complete: bool) -> Result<usize, ProtocolError> {
    match simdutf8::compat::from_utf8(input) {
        Ok(_) => Ok(input.len()),
        Err(utf8_error) => {
            if is_complete || utf8_error.error_len().is_some() {
                Err(ProtocolError::InvalidUtf8)
            } else {
                Ok(utf8_error.valid_up_to())
            }
        }
    }
}

/// Incrementally validates a partial UTF-8 sequence, returning the number of
/// bytes that are known to be valid.
///
/// If `is_complete`, the input must not end in the middle of a codepoint.
/// Otherwise, a trailing incomplete codepoint is tolerated and not counted as
/// valid yet, since more data may complete it.
///
/// # Errors
///
/// Returns a [`ProtocolError`] if the input contains bytes that can never
/// begin a valid codepoint.
#[cfg(not(feature = "simd"))]
#[inline]
pub fn should_fail_fast(input: &[u8], is_complete: bool) -> Result<usize, ProtocolError> {
    match std::str::from_utf8(input) {
        Ok(_) => Ok(input.len()),
        Err(utf8_error) => {
            if is_complete || utf8_error.error_len().is_some() {
                Err(ProtocolError::InvalidUtf8)
            } else {
                Ok(utf8_error.valid_up_to())
            }
        }
    }
}
