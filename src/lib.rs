#![deny(
    clippy::pedantic,
    clippy::missing_docs_in_private_items,
    clippy::missing_errors_doc,
    rustdoc::broken_intra_doc_links,
    warnings
)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod client;
pub mod connection;
pub mod error;
mod mask;
pub mod proto;
mod rand;
pub mod resolver;
mod sha;
pub mod tls;
pub mod upgrade;
mod utf8;

pub use client::Builder as ClientBuilder;
pub use connection::{Connection, ConnectionState, Handler};
pub use error::Error;
pub use proto::{CloseCode, Config, Limits, Message, WebSocketStream};
pub use tls::{Connector, MaybeTlsStream};
