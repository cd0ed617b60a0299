//! The connect future must be spawnable on a multi-threaded runtime.
use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use wsclient::ClientBuilder;

#[tokio::test]
async fn test_client_is_send() {
    let tcp_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = tcp_listener.local_addr().unwrap().port();

    let client = tokio::spawn(async move {
        let res = ClientBuilder::new()
            .uri(&format!("ws://127.0.0.1:{port}"))
            .unwrap()
            .connect()
            .await;
        assert!(res.is_ok());
    });

    let (mut conn, _) = tcp_listener.accept().await.unwrap();

    let mut buf = Vec::new();
    loop {
        let mut chunk = [0; 1024];
        let n = conn.read(&mut chunk).await.unwrap();
        assert_ne!(n, 0);
        buf.extend_from_slice(&chunk[..n]);

        if buf.windows(4).any(|window| window == b"\r\n\r\n") {
            break;
        }
    }

    let request = String::from_utf8(buf).unwrap();
    let key = request
        .lines()
        .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
        .unwrap();

    let mut sha1 = sha1_smol::Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11");
    let accept = STANDARD.encode(sha1.digest().bytes());

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Accept: {accept}\r\n\r\n"
    );
    conn.write_all(response.as_bytes()).await.unwrap();

    client.await.unwrap();
}
