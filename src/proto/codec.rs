//! Implementation of a tokio-util [`Decoder`] and [`Encoder`] for WebSocket
//! frames.
//!
//! The decoder is a resumable state machine: it first assembles the 2-14 byte
//! frame head, then waits for the payload, unmasking and (for text frames)
//! UTF-8 validating whatever part of it has arrived so far. Each suspension
//! records how many bytes were already processed, so no byte is ever looked
//! at twice regardless of how the transport chunks its reads.
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::types::{Config, Frame, Limits, Message, OpCode, Role, StreamState};
use crate::{mask, proto::ProtocolError, utf8, CloseCode, Error};

/// The decoded frame head together with the decoder's progress through the
/// payload that follows it.
#[derive(Debug)]
pub(super) struct PartialFrame {
    /// The [`OpCode`] of the frame.
    opcode: OpCode,
    /// Whether this is the last frame of a message.
    is_final: bool,
    /// The masking key, if the payload is masked.
    mask: Option<[u8; 4]>,
    /// The full payload length declared in the frame head.
    length: usize,
    /// Index up to which the payload was unmasked.
    unmasked: usize,
    /// Index up to which the payload was validated to be valid UTF-8.
    validated: usize,
}

/// Resume point of the frame decoder.
#[derive(Debug)]
pub(super) enum DecodeState {
    /// Waiting for the frame head to be complete.
    Head,
    /// The head was consumed, waiting for `length` payload bytes.
    Payload(PartialFrame),
}

/// The actual implementation of the WebSocket byte-level protocol.
/// It provides an [`Encoder`] for entire [`Message`]s and a [`Decoder`] for
/// single frames that must be assembled by a client such as the
/// [`WebSocketStream`] later.
///
/// [`WebSocketStream`]: super::stream::WebSocketStream
#[derive(Debug)]
pub(super) struct WebSocketProtocol {
    /// The [`Role`] this implementation should assume for the stream.
    pub(super) role: Role,
    /// The [`Limits`] imposed on this stream.
    pub(super) limits: Limits,
    /// The [`Config`] of this stream.
    pub(super) config: Config,
    /// The [`StreamState`] of the current stream.
    pub(super) state: StreamState,
    /// The [`DecodeState`] the decoder is suspended in.
    decode_state: DecodeState,
}

impl WebSocketProtocol {
    /// Creates a new WebSocket codec.
    pub(super) fn new(role: Role, limits: Limits, config: Config) -> Self {
        Self {
            role,
            limits,
            config,
            state: StreamState::Active,
            decode_state: DecodeState::Head,
        }
    }
}

impl Encoder<Message> for WebSocketProtocol {
    type Error = Error;

    #[allow(clippy::cast_possible_truncation)]
    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if !(self.state == StreamState::Active
            || matches!(self.state, StreamState::ClosedByPeer if item.is_close()))
        {
            return Err(Error::AlreadyClosed);
        }

        if item.is_close() {
            if self.state == StreamState::ClosedByPeer {
                self.state = StreamState::CloseAcknowledged;
            } else {
                self.state = StreamState::ClosedByUs;
            }
        }

        let opcode = item.opcode;
        let data = item.payload;
        // Control frames are never fragmented and their payload must fit
        // into a single length byte
        let frame_size = if opcode.is_control() {
            if data.len() > 125 {
                return Err(Error::Protocol(ProtocolError::InvalidControlFrameLength));
            }

            self.config.frame_size.max(125)
        } else {
            self.config.frame_size
        };
        let mut chunks = data.chunks(frame_size).peekable();
        let mut next_chunk = Some(chunks.next().unwrap_or_default());
        let mut chunk_number = 0;

        while let Some(chunk) = next_chunk {
            let frame_opcode = if chunk_number == 0 {
                opcode
            } else {
                OpCode::Continuation
            };

            let is_final = chunks.peek().is_none();
            let chunk_size = chunk.len();
            // Clients are required to mask every frame they send
            let mask: Option<[u8; 4]> =
                (self.role == Role::Client).then(crate::rand::get_mask);
            let mask_bit = 128 * u8::from(mask.is_some());
            let opcode_value: u8 = frame_opcode.into();

            let initial_byte = (u8::from(is_final) << 7) + opcode_value;

            dst.put_u8(initial_byte);

            if u16::try_from(chunk_size).is_err() {
                dst.put_u8(127 + mask_bit);
                dst.put_u64(chunk_size as u64);
            } else if chunk_size > 125 {
                dst.put_u8(126 + mask_bit);
                dst.put_u16(chunk_size as u16);
            } else {
                dst.put_u8(chunk_size as u8 + mask_bit);
            }

            if let Some(mask) = &mask {
                dst.extend_from_slice(mask);
            }

            let start_of_data = dst.len();
            dst.extend_from_slice(chunk);

            if let Some(mask) = mask {
                mask::frame(&mask, &mut dst[start_of_data..], 0);
            }

            next_chunk = chunks.next();
            chunk_number += 1;
        }

        Ok(())
    }
}

/// Macro that returns `Ok(None)` early and reserves missing capacity if buf
/// is not large enough.
macro_rules! ensure_buffer_has_space {
    ($buf:expr, $space:expr) => {
        if $buf.len() < $space {
            $buf.reserve(($space as usize).saturating_sub($buf.capacity()));

            return Ok(None);
        }
    };
}

impl WebSocketProtocol {
    /// Attempts to decode a frame head from the start of `src`, advancing
    /// past it on success.
    ///
    /// Returns `Ok(None)` if more bytes are required.
    #[allow(clippy::too_many_lines)]
    fn decode_head(&mut self, src: &mut BytesMut) -> Result<Option<PartialFrame>, Error> {
        // Opcode and payload length must be present
        ensure_buffer_has_space!(src, 2);

        let fin_and_rsv = src[0];
        let payload_len_1 = src[1];

        // Bit 0
        let is_final = fin_and_rsv >> 7 != 0;

        // Bits 1-3
        let rsv = fin_and_rsv & 0x70;

        if rsv != 0 {
            return Err(Error::Protocol(ProtocolError::InvalidRsv));
        }

        // Bits 4-7
        let opcode = OpCode::try_from(fin_and_rsv & 0xF)?;

        if !is_final && opcode.is_control() {
            return Err(Error::Protocol(ProtocolError::FragmentedControlFrame));
        }

        // Bit 0
        let masked = payload_len_1 >> 7 != 0;

        if masked && self.role == Role::Client {
            return Err(Error::Protocol(ProtocolError::UnexpectedMaskedFrame));
        } else if !masked && self.role == Role::Server {
            return Err(Error::Protocol(ProtocolError::UnexpectedUnmaskedFrame));
        }

        // Bits 1-7
        let mut length = (payload_len_1 & 127) as usize;

        let mut offset = 2;

        // Close frames must be at least 2 bytes in length
        if opcode == OpCode::Close && length == 1 {
            return Err(Error::Protocol(ProtocolError::InvalidCloseSequence));
        } else if length > 125 {
            if opcode.is_control() {
                return Err(Error::Protocol(ProtocolError::InvalidControlFrameLength));
            }

            if length == 126 {
                ensure_buffer_has_space!(src, offset + 2);
                // The conversion from two u8s to a u16 cannot fail
                length = u16::from_be_bytes(src[2..4].try_into().unwrap()) as usize;
                if length <= 125 {
                    return Err(Error::Protocol(ProtocolError::InvalidPayloadLength));
                }
                offset = 4;
            } else {
                ensure_buffer_has_space!(src, offset + 8);
                // The conversion from eight u8s to a u64 cannot fail
                let length_u64 = u64::from_be_bytes(src[2..10].try_into().unwrap());
                if u16::try_from(length_u64).is_ok() {
                    return Err(Error::Protocol(ProtocolError::InvalidPayloadLength));
                }
                length = usize::try_from(length_u64)
                    .map_err(|_| Error::Protocol(ProtocolError::InvalidPayloadLength))?;
                offset = 10;
            }
        }

        if let Some(max_frame_size) = self.limits.max_frame_size {
            if length > max_frame_size {
                return Err(Error::FrameTooLong {
                    size: length,
                    max_size: max_frame_size,
                });
            }
        }

        let mask = if masked {
            ensure_buffer_has_space!(src, offset + 4);
            // The conversion from four u8s to a [u8; 4] cannot fail
            let mask = src[offset..offset + 4].try_into().unwrap();
            offset += 4;
            Some(mask)
        } else {
            None
        };

        // The head is complete, the payload now starts at index 0
        src.advance(offset);
        src.reserve(length.saturating_sub(src.capacity()));

        Ok(Some(PartialFrame {
            opcode,
            is_final,
            mask,
            length,
            unmasked: 0,
            validated: 0,
        }))
    }

    /// Attempts to complete the payload of a partially decoded frame,
    /// unmasking and fail-fast validating the part that has arrived.
    ///
    /// Returns `Ok(None)` if more bytes are required.
    fn decode_payload(
        frame: &mut PartialFrame,
        src: &mut BytesMut,
    ) -> Result<Option<Frame>, Error> {
        let available = src.len().min(frame.length);

        if let Some(mask) = &frame.mask {
            mask::frame(mask, &mut src[frame.unmasked..available], frame.unmasked & 3);
            frame.unmasked = available;
        }

        if available < frame.length {
            // Validate partial frame payload data
            if frame.opcode == OpCode::Text {
                frame.validated +=
                    utf8::should_fail_fast(&src[frame.validated..available], false)?;
            }

            src.reserve((frame.length - available).saturating_sub(src.capacity()));

            return Ok(None);
        }

        if frame.is_final && frame.opcode == OpCode::Text {
            utf8::parse_str(&src[frame.validated..frame.length])?;
        } else if frame.opcode == OpCode::Close && frame.length != 0 {
            // The head decoder rejects close payloads of length 1, so two
            // bytes of close code are present
            let code = CloseCode::try_from(u16::from_be_bytes(src[..2].try_into().unwrap()))?;
            if !code.is_sendable() {
                return Err(Error::Protocol(ProtocolError::DisallowedCloseCode));
            }

            utf8::parse_str(&src[2..frame.length])?;
        }

        let payload = src.split_to(frame.length).freeze();

        Ok(Some(Frame {
            opcode: frame.opcode,
            is_final: frame.is_final,
            payload,
        }))
    }
}

impl Decoder for WebSocketProtocol {
    type Error = Error;
    type Item = Frame;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if matches!(self.decode_state, DecodeState::Head) {
            match self.decode_head(src)? {
                Some(partial) => self.decode_state = DecodeState::Payload(partial),
                None => return Ok(None),
            }
        }

        let DecodeState::Payload(partial) = &mut self.decode_state else {
            // The branch above always leaves the decoder in the payload state
            unreachable!()
        };

        match Self::decode_payload(partial, src)? {
            Some(frame) => {
                self.decode_state = DecodeState::Head;
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[allow(clippy::missing_docs_in_private_items)]
mod tests {
    use bytes::BytesMut;
    use tokio_util::codec::{Decoder, Encoder};

    use super::{Config, Limits, Message, OpCode, Role, WebSocketProtocol};
    use crate::{proto::ProtocolError, Error};

    /// A pair of codecs that talk to each other, a masking client encoder and
    /// a server decoder.
    fn codec_pair() -> (WebSocketProtocol, WebSocketProtocol) {
        (
            WebSocketProtocol::new(Role::Client, Limits::default(), Config::default()),
            WebSocketProtocol::new(Role::Server, Limits::default(), Config::default()),
        )
    }

    #[test]
    fn test_round_trip_all_opcodes() {
        let payload: Vec<u8> = (0..=255).cycle().take(70000).collect();

        for (message, opcode) in [
            (Message::text(String::from_utf8(vec![b'a'; 70000]).unwrap()), OpCode::Text),
            (Message::binary(payload.clone()), OpCode::Binary),
            (Message::ping(payload[..125].to_vec()), OpCode::Ping),
            (Message::pong(Vec::new()), OpCode::Pong),
        ] {
            let (mut client, mut server) = codec_pair();
            let expected = message.payload.clone();
            let mut wire = BytesMut::new();
            client.encode(message, &mut wire).unwrap();

            let mut assembled = BytesMut::new();
            let mut last_opcode = None;
            while let Some(frame) = server.decode(&mut wire).unwrap() {
                last_opcode.get_or_insert(frame.opcode);
                assembled.extend_from_slice(&frame.payload);
                if frame.is_final {
                    break;
                }
            }

            assert_eq!(last_opcode.unwrap(), opcode);
            assert_eq!(&assembled[..], &expected[..]);
        }
    }

    #[test]
    fn test_length_class_boundaries() {
        for (len, header) in [
            (0_usize, vec![130, 128]),
            (125, vec![130, 128 + 125]),
            (126, vec![130, 128 + 126, 0, 126]),
            (65535, vec![130, 128 + 126, 255, 255]),
            (65536, vec![130, 128 + 127, 0, 0, 0, 0, 0, 1, 0, 0]),
        ] {
            let (mut client, _) = codec_pair();
            let mut wire = BytesMut::new();
            client.encode(Message::binary(vec![0; len]), &mut wire).unwrap();

            assert_eq!(&wire[..header.len()], &header[..], "payload length {len}");
            // Header, mask key and payload must account for the whole frame
            assert_eq!(wire.len(), header.len() + 4 + len);
        }
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let (mut client, _) = codec_pair();
        let mut wire = BytesMut::new();
        client
            .encode(Message::text("Hello, WebSocket!".to_string()), &mut wire)
            .unwrap();

        for chunk_size in 1..=wire.len() {
            let mut server =
                WebSocketProtocol::new(Role::Server, Limits::default(), Config::default());
            let mut buffered = BytesMut::new();
            let mut decoded = None;

            for chunk in wire.chunks(chunk_size) {
                buffered.extend_from_slice(chunk);
                if let Some(frame) = server.decode(&mut buffered).unwrap() {
                    decoded = Some(frame);
                }
            }

            let frame = decoded.expect("no frame decoded");
            assert!(frame.is_final);
            assert_eq!(frame.opcode, OpCode::Text);
            assert_eq!(&frame.payload[..], b"Hello, WebSocket!");
            assert!(buffered.is_empty());
        }
    }

    #[test]
    fn test_leftover_bytes_are_kept() {
        let (mut client, mut server) = codec_pair();
        let mut wire = BytesMut::new();
        client.encode(Message::text("one".to_string()), &mut wire).unwrap();
        client.encode(Message::text("two".to_string()), &mut wire).unwrap();

        let first = server.decode(&mut wire).unwrap().unwrap();
        assert_eq!(&first.payload[..], b"one");
        let second = server.decode(&mut wire).unwrap().unwrap();
        assert_eq!(&second.payload[..], b"two");
        assert!(wire.is_empty());
    }

    #[test]
    fn test_oversized_control_payload_is_rejected_on_encode() {
        let (mut client, _) = codec_pair();
        let mut wire = BytesMut::new();

        assert!(matches!(
            client.encode(Message::ping(vec![0; 126]), &mut wire),
            Err(Error::Protocol(ProtocolError::InvalidControlFrameLength))
        ));
        assert!(wire.is_empty());

        // 125 bytes still fit into one control frame
        client.encode(Message::pong(vec![0; 125]), &mut wire).unwrap();
        assert_eq!(wire.len(), 2 + 4 + 125);
    }

    #[test]
    fn test_rsv_bits_are_rejected() {
        let mut server =
            WebSocketProtocol::new(Role::Server, Limits::default(), Config::default());
        let mut src = BytesMut::from(&[0b1100_0001, 128, 0, 0, 0, 0][..]);

        assert!(matches!(
            server.decode(&mut src),
            Err(Error::Protocol(ProtocolError::InvalidRsv))
        ));
    }

    #[test]
    fn test_fragmented_control_frame_is_rejected() {
        let mut server =
            WebSocketProtocol::new(Role::Server, Limits::default(), Config::default());
        let mut src = BytesMut::from(&[0b0000_1001, 128, 0, 0, 0, 0][..]);

        assert!(matches!(
            server.decode(&mut src),
            Err(Error::Protocol(ProtocolError::FragmentedControlFrame))
        ));
    }

    #[test]
    fn test_overlong_length_encoding_is_rejected() {
        let mut server =
            WebSocketProtocol::new(Role::Server, Limits::default(), Config::default());
        // 2-byte extended length used for a payload that fits in 7 bits
        let mut src = BytesMut::from(&[0b1000_0010, 128 + 126, 0, 100][..]);

        assert!(matches!(
            server.decode(&mut src),
            Err(Error::Protocol(ProtocolError::InvalidPayloadLength))
        ));
    }

    #[test]
    fn test_client_rejects_masked_server_frame() {
        let mut client =
            WebSocketProtocol::new(Role::Client, Limits::default(), Config::default());
        let mut src = BytesMut::from(&[0b1000_0001, 128 + 2, 0, 0, 0, 0, b'h', b'i'][..]);

        assert!(matches!(
            client.decode(&mut src),
            Err(Error::Protocol(ProtocolError::UnexpectedMaskedFrame))
        ));
    }

    #[test]
    fn test_frame_size_limit() {
        let mut server = WebSocketProtocol::new(
            Role::Server,
            Limits::default().max_frame_size(Some(16)),
            Config::default(),
        );
        let mut src = BytesMut::from(&[0b1000_0010, 128 + 17][..]);

        assert!(matches!(
            server.decode(&mut src),
            Err(Error::FrameTooLong { size: 17, max_size: 16 })
        ));
    }
}
