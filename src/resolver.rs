//! Trait abstractions over DNS resolvers and a default implementation
//! using [`getaddrinfo`].
//!
//! [`getaddrinfo`]: https://man7.org/linux/man-pages/man3/getaddrinfo.3.html
use std::{future::Future, net::SocketAddr, pin::Pin};

use tokio::net::lookup_host;

use crate::Error;

/// Asynchronous DNS resolver used to translate hostnames to socket addresses
/// before opening the TCP connection.
pub trait Resolver: Send + Sync {
    /// Resolves a hostname and port to one socket address.
    ///
    /// # Errors
    ///
    /// This method returns an [`Error`] if resolving the hostname fails.
    fn resolve<'a>(
        &'a self,
        host: &'a str,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = Result<SocketAddr, Error>> + Send + 'a>>;
}

/// A resolver using the blocking `getaddrinfo` syscall in the tokio
/// threadpool.
#[derive(Debug)]
pub struct Gai;

impl Resolver for Gai {
    fn resolve<'a>(
        &'a self,
        host: &'a str,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = Result<SocketAddr, Error>> + Send + 'a>> {
        Box::pin(async move {
            lookup_host((host, port))
                .await?
                .next()
                .ok_or(Error::CannotResolveHost)
        })
    }
}
