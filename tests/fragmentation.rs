//! Tests for reassembly of fragmented messages and interleaved control
//! frames, driven by hand-encoded server frames over an in-memory stream.
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::io::{duplex, AsyncWriteExt};
use wsclient::{proto::ProtocolError, ClientBuilder, Error};

/// Encodes a single unmasked frame the way a server would send it.
fn encode_frame(opcode: u8, payload: &[u8], is_final: bool) -> Bytes {
    let mut dst = BytesMut::new();

    dst.put_u8((u8::from(is_final) << 7) + opcode);

    if u16::try_from(payload.len()).is_err() {
        dst.put_u8(127);
        dst.put_u64(payload.len() as u64);
    } else if payload.len() > 125 {
        dst.put_u8(126);
        dst.put_u16(payload.len() as u16);
    } else {
        dst.put_u8(payload.len() as u8);
    }

    dst.extend_from_slice(payload);

    dst.freeze()
}

#[tokio::test]
async fn fragments_reassemble_into_one_message() {
    let (one, mut two) = duplex(16 * 1024);
    let mut client = ClientBuilder::new().take_over(one);

    two.write_all(&encode_frame(1, b"He", false)).await.unwrap();
    two.write_all(&encode_frame(0, b"ll", false)).await.unwrap();
    two.write_all(&encode_frame(0, b"o", true)).await.unwrap();

    let msg = client.next().await.unwrap().unwrap();
    assert_eq!(msg.as_text(), Some("Hello"));
}

#[tokio::test]
async fn continuation_without_a_message_is_rejected() {
    let (one, mut two) = duplex(16 * 1024);
    let mut client = ClientBuilder::new().take_over(one);

    two.write_all(&encode_frame(0, b"lost", true)).await.unwrap();

    assert!(matches!(
        client.next().await,
        Some(Err(Error::Protocol(ProtocolError::UnexpectedContinuation)))
    ));
}

#[tokio::test]
async fn new_message_before_fin_is_rejected() {
    let (one, mut two) = duplex(16 * 1024);
    let mut client = ClientBuilder::new().take_over(one);

    two.write_all(&encode_frame(1, b"first", false)).await.unwrap();
    two.write_all(&encode_frame(1, b"second", true)).await.unwrap();

    assert!(matches!(
        client.next().await,
        Some(Err(Error::Protocol(ProtocolError::UnfinishedMessage)))
    ));
}

#[tokio::test]
async fn control_frames_interleave_with_fragments() {
    let (one, mut two) = duplex(16 * 1024);
    let mut client = ClientBuilder::new().take_over(one);

    two.write_all(&encode_frame(1, b"He", false)).await.unwrap();
    two.write_all(&encode_frame(9, b"mark", true)).await.unwrap();
    two.write_all(&encode_frame(0, b"llo", true)).await.unwrap();

    // The ping is surfaced immediately, before the message completes
    let ping = client.next().await.unwrap().unwrap();
    assert!(ping.is_ping());
    assert_eq!(&ping.as_payload()[..], b"mark");

    let msg = client.next().await.unwrap().unwrap();
    assert_eq!(msg.as_text(), Some("Hello"));
}

#[tokio::test]
async fn message_size_limit_applies_to_the_sum_of_fragments() {
    let (one, mut two) = duplex(16 * 1024);
    let mut client = ClientBuilder::new()
        .limits(wsclient::Limits::default().max_message_size(Some(4)))
        .take_over(one);

    two.write_all(&encode_frame(2, b"abc", false)).await.unwrap();
    two.write_all(&encode_frame(0, b"def", true)).await.unwrap();

    assert!(matches!(
        client.next().await,
        Some(Err(Error::MessageTooLong { size: 6, max_size: 4 }))
    ));
}
