//! A network abstraction layer for the demo.
//!
//! The traits here are the seam between the demo and whatever transport the
//! platform provides (TCP, TLS over TCP, a cellular modem, an in-memory mock).
//! The MQTT client in [`application::mqtt`] only ever talks to a
//! [`Connection`], and the demo only ever opens one through [`Connect`].

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Common error types for network operations
pub mod error;

/// Application protocols built on top of [`Connection`]
pub mod application;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connect, Connection, Read, Write};
}

// Core synchronous traits
pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read data from the connection.
    ///
    /// `Ok(0)` means no data is available right now; a closed peer is
    /// reported as an error.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// A synchronous connection
pub trait Connection: Read + Write + Close {}

/// Address of the MQTT server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerInfo<'a> {
    /// Server host name.
    pub host: &'a str,
    /// Server port in host order.
    pub port: u16,
}

/// Client credentials presented when the connection is established.
///
/// Both fields hold PEM text. Transports that terminate TLS use them for
/// client authentication; plaintext transports ignore them.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Credentials<'a> {
    /// PEM-encoded device certificate.
    pub certificate: &'a str,
    /// PEM-encoded private key matching the certificate.
    pub private_key: &'a str,
}

impl core::fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("certificate_len", &self.certificate.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// A synchronous connector (client)
pub trait Connect {
    /// Associated connection type
    type Connection: Connection;
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Open a connection to `server`, authenticating with `credentials`
    fn connect(
        &mut self,
        server: &ServerInfo<'_>,
        credentials: &Credentials<'_>,
    ) -> Result<Self::Connection, Self::Error>;
}
