//! # Application Layer Network Protocols
//!
//! Application layer (OSI Layer 7) protocols built on the core network
//! traits. The demo only needs MQTT.
//!
//! All protocol implementations in this module follow the same principles:
//!
//! - **Connection Agnostic**: Work with any type implementing [`Connection`](crate::network::Connection)
//! - **No-std Compatible**: No heap allocation, fixed-size buffers only
//! - **Error Handling**: Failures surface as [`Error`](crate::network::error::Error)

/// MQTT client implementation.
///
/// Provides an MQTT 3.1.1 client for lightweight publish-subscribe messaging,
/// plus the [`Session`](mqtt::Session) driver used by the demo.
pub mod mqtt;
