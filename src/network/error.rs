//! Common error types for network operations

/// A common error type for network and MQTT operations.
///
/// This enum defines the errors that can occur while talking to the broker.
/// It is designed to be simple and portable for `no_std` environments.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// An operation was attempted on a connection that is not open.
    NotOpen,
    /// An error occurred during a write operation.
    WriteError,
    /// An error occurred during a read operation.
    ReadError,
    /// A connection attempt was refused.
    ConnectionRefused,
    /// A timeout occurred.
    Timeout,
    /// The connection was closed.
    ConnectionClosed,
    /// An invalid address was provided.
    InvalidAddress,
    /// A protocol-specific error occurred.
    ProtocolError,
    /// A topic name or topic filter is malformed.
    InvalidTopic,
    /// A packet does not fit the client's fixed-size buffers.
    PacketTooLarge,
    /// A fixed-capacity collection is full.
    BufferOverflow,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::NotOpen => defmt::write!(f, "NotOpen"),
            Error::WriteError => defmt::write!(f, "WriteError"),
            Error::ReadError => defmt::write!(f, "ReadError"),
            Error::ConnectionRefused => defmt::write!(f, "ConnectionRefused"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::ConnectionClosed => defmt::write!(f, "ConnectionClosed"),
            Error::InvalidAddress => defmt::write!(f, "InvalidAddress"),
            Error::ProtocolError => defmt::write!(f, "ProtocolError"),
            Error::InvalidTopic => defmt::write!(f, "InvalidTopic"),
            Error::PacketTooLarge => defmt::write!(f, "PacketTooLarge"),
            Error::BufferOverflow => defmt::write!(f, "BufferOverflow"),
        }
    }
}
