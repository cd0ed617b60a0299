//! Callback-driven connection layer on top of [`WebSocketStream`].
//!
//! A [`Connection`] owns the stream and a user-supplied [`Handler`] and
//! sequences the connection through its lifecycle: idle, handshaking, open,
//! closing and finally aborted. Incoming messages are dispatched to the
//! handler while the connection is open, close and error events exactly once
//! when it goes down.
//!
//! Applications that prefer to work with the [`futures_core::Stream`] and
//! [`futures_sink::Sink`] interfaces directly can use [`WebSocketStream`]
//! without this layer.
use std::{future::poll_fn, pin::Pin};

use futures_core::Stream;
use futures_sink::Sink;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use crate::{
    client, proto::CloseCode, Error, MaybeTlsStream, Message, WebSocketStream,
};

/// Lifecycle state of a [`Connection`].
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport is attached and no handshake has been attempted.
    Idle,
    /// The HTTP/1.1 Upgrade handshake is in progress.
    Handshaking,
    /// The handshake succeeded and messages can be exchanged.
    Open,
    /// A close frame was sent or received and the close handshake is being
    /// finished.
    Closing,
    /// The connection is torn down. This state is terminal.
    Aborted,
}

/// Application callbacks invoked by [`Connection::run`].
///
/// All methods have empty default implementations, implementors only override
/// the events they care about.
pub trait Handler {
    /// Called once when the handshake completes and the connection is open.
    fn on_connected(&mut self) {}

    /// Called for every complete text message received while open.
    fn on_text(&mut self, text: &str) {
        let _ = text;
    }

    /// Called for every complete binary message received while open.
    fn on_binary(&mut self, payload: &[u8]) {
        let _ = payload;
    }

    /// Called for every ping received while open. A pong reply with the same
    /// payload is queued automatically.
    fn on_ping(&mut self, payload: &[u8]) {
        let _ = payload;
    }

    /// Called for every pong received while open.
    fn on_pong(&mut self, payload: &[u8]) {
        let _ = payload;
    }

    /// Called exactly once when the connection starts going down.
    ///
    /// The error is `None` for a clean close handshake, in which case
    /// [`Connection::run`] keeps driving the stream until the handshake
    /// finishes. It carries the cause for transport errors and protocol
    /// violations.
    fn on_close(&mut self, error: Option<&Error>) {
        let _ = error;
    }
}

/// A WebSocket connection that dispatches events to a [`Handler`].
#[derive(Debug)]
pub struct Connection<T, H> {
    /// The stream messages are read from and written to. `None` unless the
    /// connection is open or closing.
    stream: Option<WebSocketStream<T>>,
    /// The application event handler.
    handler: H,
    /// Current lifecycle state.
    state: ConnectionState,
    /// Whether [`Handler::on_close`] was already invoked.
    close_notified: bool,
}

impl<T, H: Handler> Connection<T, H> {
    /// Creates an idle connection with the given handler.
    #[must_use]
    pub fn new(handler: H) -> Self {
        Self {
            stream: None,
            handler,
            state: ConnectionState::Idle,
            close_notified: false,
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns a reference to the handler.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Returns a mutable reference to the handler.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Consumes the connection and returns the handler.
    #[must_use]
    pub fn into_handler(self) -> H {
        self.handler
    }
}

impl<H: Handler> Connection<MaybeTlsStream<TcpStream>, H> {
    /// Establishes a connection to the WebSocket server configured in the
    /// builder.
    ///
    /// On success the connection is open and [`Handler::on_connected`] has
    /// been invoked. On failure the connection is aborted.
    ///
    /// # Errors
    ///
    /// This method returns an [`Error`] if the connection is not idle or
    /// connecting to the server fails.
    pub async fn connect(&mut self, builder: &client::Builder<'_>) -> Result<(), Error> {
        if self.state != ConnectionState::Idle {
            return Err(Error::AlreadyConnected);
        }

        self.state = ConnectionState::Handshaking;

        match builder.connect().await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.state = ConnectionState::Open;
                self.close_notified = false;
                self.handler.on_connected();

                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Aborted;

                Err(e)
            }
        }
    }
}

impl<T, H> Connection<T, H>
where
    T: AsyncRead + AsyncWrite + Unpin,
    H: Handler,
{
    /// Performs the HTTP/1.1 Upgrade handshake on an already established
    /// stream and opens the connection on it.
    ///
    /// # Errors
    ///
    /// This method returns an [`Error`] if the connection is not idle or the
    /// handshake fails.
    pub async fn connect_on(
        &mut self,
        builder: &client::Builder<'_>,
        stream: T,
    ) -> Result<(), Error> {
        if self.state != ConnectionState::Idle {
            return Err(Error::AlreadyConnected);
        }

        self.state = ConnectionState::Handshaking;

        match builder.connect_on(stream).await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.state = ConnectionState::Open;
                self.close_notified = false;
                self.handler.on_connected();

                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Aborted;

                Err(e)
            }
        }
    }

    /// Sends a text message.
    ///
    /// # Errors
    ///
    /// This method returns an [`Error`] if the connection is not open or
    /// sending fails.
    pub async fn send_text<P: Into<String>>(&mut self, text: P) -> Result<(), Error> {
        if self.state != ConnectionState::Open {
            return Err(Error::NotConnected);
        }

        self.send(Message::text(text)).await
    }

    /// Sends a binary message.
    ///
    /// # Errors
    ///
    /// This method returns an [`Error`] if the connection is not open or
    /// sending fails.
    pub async fn send_binary<P: Into<bytes::Bytes>>(&mut self, payload: P) -> Result<(), Error> {
        if self.state != ConnectionState::Open {
            return Err(Error::NotConnected);
        }

        self.send(Message::binary(payload)).await
    }

    /// Initiates the close handshake.
    ///
    /// The connection transitions to closing. [`Connection::run`] must keep
    /// being driven until the peer acknowledges the close.
    ///
    /// # Errors
    ///
    /// This method returns an [`Error`] if the connection is not open or
    /// sending the close frame fails.
    pub async fn close(&mut self, code: Option<CloseCode>, reason: &str) -> Result<(), Error> {
        match self.state {
            ConnectionState::Open => {}
            // Closing twice is a no-op
            ConnectionState::Closing => return Ok(()),
            _ => return Err(Error::NotConnected),
        }

        self.send(Message::close(code, reason)).await?;
        self.state = ConnectionState::Closing;

        if !self.close_notified {
            self.close_notified = true;
            self.handler.on_close(None);
        }

        Ok(())
    }

    /// Reads messages from the stream and dispatches them to the handler
    /// until the connection goes down.
    ///
    /// Returns `Ok(())` after a finished close handshake or clean end of
    /// stream.
    ///
    /// # Errors
    ///
    /// This method returns an [`Error`] if the transport fails or the peer
    /// violates the protocol. The same error is also passed to
    /// [`Handler::on_close`] and the connection is aborted.
    pub async fn run(&mut self) -> Result<(), Error> {
        loop {
            let Some(stream) = self.stream.as_mut() else {
                return Ok(());
            };

            let item = poll_fn(|cx| Pin::new(&mut *stream).poll_next(cx)).await;

            match item {
                Some(Ok(message)) => self.dispatch(&message),
                Some(Err(e)) => {
                    // The stream queues a close frame with the appropriate
                    // code on protocol violations, flush it out before the
                    // transport goes away. The connection is doomed either
                    // way, so failures here are ignored.
                    if let Some(stream) = self.stream.as_mut() {
                        _ = poll_fn(|cx| Pin::new(&mut *stream).poll_ready(cx)).await;
                        _ = poll_fn(|cx| Pin::new(&mut *stream).poll_flush(cx)).await;
                    }

                    self.abort();

                    if !self.close_notified {
                        self.close_notified = true;
                        self.handler.on_close(Some(&e));
                    }

                    return Err(e);
                }
                None => {
                    self.abort();

                    if !self.close_notified {
                        self.close_notified = true;
                        self.handler.on_close(None);
                    }

                    return Ok(());
                }
            }
        }
    }

    /// Dispatches one received message to the handler.
    fn dispatch(&mut self, message: &Message) {
        if message.is_close() {
            if self.state == ConnectionState::Open {
                self.state = ConnectionState::Closing;
            }

            if !self.close_notified {
                self.close_notified = true;
                self.handler.on_close(None);
            }

            return;
        }

        // Data and ping/pong events are only surfaced while open
        if self.state != ConnectionState::Open {
            return;
        }

        if let Some(text) = message.as_text() {
            self.handler.on_text(text);
        } else if message.is_binary() {
            self.handler.on_binary(message.as_payload());
        } else if message.is_ping() {
            self.handler.on_ping(message.as_payload());
        } else if message.is_pong() {
            self.handler.on_pong(message.as_payload());
        }
    }

    /// Sends one message over the stream and flushes it.
    async fn send(&mut self, message: Message) -> Result<(), Error> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        poll_fn(|cx| Pin::new(&mut *stream).poll_ready(cx)).await?;
        Pin::new(&mut *stream).start_send(message)?;
        poll_fn(|cx| Pin::new(&mut *stream).poll_flush(cx)).await
    }

    /// Tears down the stream and marks the connection terminal.
    fn abort(&mut self) {
        self.stream = None;
        self.state = ConnectionState::Aborted;
    }
}
