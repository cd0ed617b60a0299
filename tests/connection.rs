//! Tests for the callback-driven connection layer.
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use wsclient::{ClientBuilder, Connection, ConnectionState, Error, Handler};

/// Encodes a single unmasked frame the way a server would send it.
fn encode_frame(opcode: u8, payload: &[u8], is_final: bool) -> Bytes {
    let mut dst = BytesMut::new();

    dst.put_u8((u8::from(is_final) << 7) + opcode);
    assert!(payload.len() <= 125);
    dst.put_u8(payload.len() as u8);
    dst.extend_from_slice(payload);

    dst.freeze()
}

/// Performs the server side of the upgrade handshake.
async fn accept_upgrade(stream: &mut DuplexStream) {
    let mut buf = Vec::new();

    loop {
        let mut chunk = [0; 1024];
        let n = stream.read(&mut chunk).await.unwrap();
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
    stream.write_all(response.as_bytes()).await.unwrap();
}

/// Events recorded by the test handler, in dispatch order.
#[derive(Debug, PartialEq, Eq)]
enum Event {
    Connected,
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Close(bool),
}

#[derive(Default)]
struct Recorder {
    events: Vec<Event>,
}

impl Handler for Recorder {
    fn on_connected(&mut self) {
        self.events.push(Event::Connected);
    }

    fn on_text(&mut self, text: &str) {
        self.events.push(Event::Text(text.to_owned()));
    }

    fn on_binary(&mut self, payload: &[u8]) {
        self.events.push(Event::Binary(payload.to_vec()));
    }

    fn on_ping(&mut self, payload: &[u8]) {
        self.events.push(Event::Ping(payload.to_vec()));
    }

    fn on_close(&mut self, error: Option<&Error>) {
        self.events.push(Event::Close(error.is_some()));
    }
}

#[tokio::test]
async fn events_are_dispatched_in_order() {
    let (client_end, mut server_end) = duplex(16 * 1024);

    let server = tokio::spawn(async move {
        accept_upgrade(&mut server_end).await;

        server_end
            .write_all(&encode_frame(1, b"hello", true))
            .await
            .unwrap();
        server_end
            .write_all(&encode_frame(2, &[1, 2, 3], true))
            .await
            .unwrap();
        server_end
            .write_all(&encode_frame(9, b"ping", true))
            .await
            .unwrap();
        server_end
            .write_all(&encode_frame(8, &[0x03, 0xE8], true))
            .await
            .unwrap();

        // Drain whatever the client sends back until it hangs up
        let mut sink = Vec::new();
        let _ = server_end.read_to_end(&mut sink).await;
    });

    let builder = ClientBuilder::new().uri("ws://localhost:3000/ws").unwrap();
    let mut conn = Connection::new(Recorder::default());

    conn.connect_on(&builder, client_end).await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Open);

    conn.run().await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Aborted);

    let events = conn.into_handler().events;
    assert_eq!(
        events,
        [
            Event::Connected,
            Event::Text("hello".to_owned()),
            Event::Binary(vec![1, 2, 3]),
            Event::Ping(b"ping".to_vec()),
            Event::Close(false),
        ]
    );

    server.await.unwrap();
}

#[tokio::test]
async fn protocol_violations_surface_through_on_close() {
    let (client_end, mut server_end) = duplex(16 * 1024);

    let server = tokio::spawn(async move {
        accept_upgrade(&mut server_end).await;

        // A continuation frame with nothing to continue
        server_end
            .write_all(&encode_frame(0, b"lost", true))
            .await
            .unwrap();

        let mut sink = Vec::new();
        let _ = server_end.read_to_end(&mut sink).await;
    });

    let builder = ClientBuilder::new().uri("ws://localhost:3000/ws").unwrap();
    let mut conn = Connection::new(Recorder::default());

    conn.connect_on(&builder, client_end).await.unwrap();
    assert!(conn.run().await.is_err());
    assert_eq!(conn.state(), ConnectionState::Aborted);

    let events = conn.into_handler().events;
    assert_eq!(events, [Event::Connected, Event::Close(true)]);

    server.await.unwrap();
}

#[tokio::test]
async fn close_frame_reaches_the_wire_before_teardown() {
    let (client_end, mut server_end) = duplex(16 * 1024);

    let server = tokio::spawn(async move {
        accept_upgrade(&mut server_end).await;

        // A continuation frame with nothing to continue
        server_end
            .write_all(&encode_frame(0, b"lost", true))
            .await
            .unwrap();

        // The violation must be answered with a masked close frame, not a
        // bare transport teardown
        let mut head = [0; 2];
        server_end.read_exact(&mut head).await.unwrap();
        assert_eq!(head[0] & 0xF, 8);
        assert_eq!(head[1] >> 7, 1, "client frames must be masked");
        let len = (head[1] & 127) as usize;

        let mut mask = [0; 4];
        server_end.read_exact(&mut mask).await.unwrap();
        let mut payload = vec![0; len];
        server_end.read_exact(&mut payload).await.unwrap();
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[i & 3];
        }

        // 1002, protocol error
        assert_eq!(&payload[..2], [0x03, 0xEA]);
    });

    let builder = ClientBuilder::new().uri("ws://localhost:3000/ws").unwrap();
    let mut conn = Connection::new(Recorder::default());

    conn.connect_on(&builder, client_end).await.unwrap();
    assert!(conn.run().await.is_err());
    assert_eq!(conn.state(), ConnectionState::Aborted);

    server.await.unwrap();
}

#[tokio::test]
async fn sends_are_rejected_unless_open() {
    let mut conn: Connection<DuplexStream, Recorder> = Connection::new(Recorder::default());

    assert!(matches!(
        conn.send_text("too early").await,
        Err(Error::NotConnected)
    ));
    assert!(matches!(
        conn.close(None, "").await,
        Err(Error::NotConnected)
    ));
}

#[tokio::test]
async fn connecting_twice_is_rejected() {
    let (client_end, mut server_end) = duplex(16 * 1024);
    let (second_client_end, _second_server_end) = duplex(16 * 1024);

    let server = tokio::spawn(async move {
        accept_upgrade(&mut server_end).await;

        let mut sink = Vec::new();
        let _ = server_end.read_to_end(&mut sink).await;
    });

    let builder = ClientBuilder::new().uri("ws://localhost:3000/ws").unwrap();
    let mut conn = Connection::new(Recorder::default());

    conn.connect_on(&builder, client_end).await.unwrap();

    assert!(matches!(
        conn.connect_on(&builder, second_client_end).await,
        Err(Error::AlreadyConnected)
    ));

    drop(conn);
    server.await.unwrap();
}

#[tokio::test]
async fn messages_sent_while_open_reach_the_server() {
    let (client_end, mut server_end) = duplex(16 * 1024);

    let server = tokio::spawn(async move {
        accept_upgrade(&mut server_end).await;

        // Read the masked text frame
        let mut head = [0; 2];
        server_end.read_exact(&mut head).await.unwrap();
        assert_eq!(head[0] & 0xF, 1);
        assert_eq!(head[1] >> 7, 1, "client frames must be masked");
        let len = (head[1] & 127) as usize;

        let mut mask = [0; 4];
        server_end.read_exact(&mut mask).await.unwrap();
        let mut payload = vec![0; len];
        server_end.read_exact(&mut payload).await.unwrap();
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[i & 3];
        }

        assert_eq!(payload, b"over the wire");

        server_end
            .write_all(&encode_frame(8, &[0x03, 0xE8], true))
            .await
            .unwrap();

        let mut sink = Vec::new();
        let _ = server_end.read_to_end(&mut sink).await;
    });

    let builder = ClientBuilder::new().uri("ws://localhost:3000/ws").unwrap();
    let mut conn = Connection::new(Recorder::default());

    conn.connect_on(&builder, client_end).await.unwrap();
    conn.send_text("over the wire").await.unwrap();
    conn.run().await.unwrap();

    server.await.unwrap();
}
