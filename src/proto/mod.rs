//! This module contains an implementation of the client side of [RFC6455](https://datatracker.ietf.org/doc/html/rfc6455).
//!
//! Any extensions are currently not implemented.
pub(crate) use self::types::Role;
pub use self::{
    error::ProtocolError,
    stream::WebSocketStream,
    types::{CloseCode, Config, Limits, Message},
};

mod codec;
mod error;
mod stream;
mod types;
