//! Tests for the HTTP/1.1 Upgrade handshake against a scripted server on an
//! in-memory duplex stream.
use base64::{engine::general_purpose::STANDARD, Engine};
use futures_util::StreamExt;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use wsclient::{upgrade, ClientBuilder, Error};

/// Reads the upgrade request from the stream and returns it as a string.
async fn read_request(stream: &mut DuplexStream) -> String {
    let mut buf = Vec::new();

    loop {
        let mut chunk = [0; 1024];
        let n = stream.read(&mut chunk).await.unwrap();
        assert_ne!(n, 0, "client closed the stream mid-request");
        buf.extend_from_slice(&chunk[..n]);

        if buf.windows(4).any(|window| window == b"\r\n\r\n") {
            return String::from_utf8(buf).unwrap();
        }
    }
}

/// Extracts the `Sec-WebSocket-Key` header value from a request.
fn extract_key(request: &str) -> &str {
    request
        .lines()
        .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
        .expect("request has no Sec-WebSocket-Key header")
}

/// Computes the `Sec-WebSocket-Accept` value for a key.
fn accept_value(key: &str) -> String {
    let mut sha1 = sha1_smol::Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11");

    STANDARD.encode(sha1.digest().bytes())
}

fn builder() -> ClientBuilder<'static> {
    ClientBuilder::new().uri("ws://localhost:3000/ws").unwrap()
}

#[tokio::test]
async fn valid_upgrade_opens_the_stream() {
    let (client_end, mut server_end) = duplex(16 * 1024);

    let server = tokio::spawn(async move {
        let request = read_request(&mut server_end).await;
        assert!(request.starts_with("GET /ws HTTP/1.1\r\n"));
        let accept = accept_value(extract_key(&request));

        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Accept: {accept}\r\n\r\n"
        );
        // A frame directly after the response must not be lost
        let mut bytes = response.into_bytes();
        bytes.extend_from_slice(&[0b1000_0001, 5, b'h', b'e', b'l', b'l', b'o']);
        server_end.write_all(&bytes).await.unwrap();

        server_end
    });

    let mut client = builder().connect_on(client_end).await.unwrap();

    let msg = client.next().await.unwrap().unwrap();
    assert_eq!(msg.as_text(), Some("hello"));

    drop(server.await.unwrap());
}

#[tokio::test]
async fn non_101_status_fails_the_handshake() {
    let (client_end, mut server_end) = duplex(16 * 1024);

    tokio::spawn(async move {
        read_request(&mut server_end).await;
        server_end
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        // Keep the stream open until the client is done
        let mut sink = Vec::new();
        let _ = server_end.read_to_end(&mut sink).await;
    });

    let err = builder().connect_on(client_end).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Upgrade(upgrade::Error::DidNotSwitchProtocols(200))
    ));
}

#[tokio::test]
async fn missing_upgrade_headers_fail_the_handshake() {
    let (client_end, mut server_end) = duplex(16 * 1024);

    tokio::spawn(async move {
        let request = read_request(&mut server_end).await;
        let accept = accept_value(extract_key(&request));
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\nConnection: keep-alive\r\nUpgrade: websocket\r\nSec-WebSocket-Accept: {accept}\r\n\r\n"
        );
        server_end.write_all(response.as_bytes()).await.unwrap();
        let mut sink = Vec::new();
        let _ = server_end.read_to_end(&mut sink).await;
    });

    let err = builder().connect_on(client_end).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Upgrade(upgrade::Error::WrongConnectionHeader)
    ));
}

#[tokio::test]
async fn wrong_accept_fails_the_handshake() {
    let (client_end, mut server_end) = duplex(16 * 1024);

    tokio::spawn(async move {
        read_request(&mut server_end).await;
        // A valid base64 value that does not match any key
        let response = "HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Accept: YWFhYWFhYWFhYWFhYWFhYWFhYWE=\r\n\r\n";
        server_end.write_all(response.as_bytes()).await.unwrap();
        let mut sink = Vec::new();
        let _ = server_end.read_to_end(&mut sink).await;
    });

    let err = builder().connect_on(client_end).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Upgrade(upgrade::Error::WrongWebSocketAccept)
    ));
}

#[tokio::test]
async fn stream_closed_before_response() {
    let (client_end, mut server_end) = duplex(16 * 1024);

    tokio::spawn(async move {
        read_request(&mut server_end).await;
        drop(server_end);
    });

    let err = builder().connect_on(client_end).await.unwrap_err();

    assert!(matches!(err, Error::NoUpgradeResponse));
}
