//! MQTT 3.1.1 protocol implementation for embedded systems.
//!
//! This module provides the MQTT client the demo drives. MQTT (Message
//! Queuing Telemetry Transport) is a lightweight publish-subscribe messaging
//! protocol ideal for IoT applications.
//!
//! # Layout
//!
//! - [`client`]: packet-level [`Client`] over any [`Connection`](crate::network::Connection)
//! - [`topic`]: topic name/filter validation and wildcard matching
//! - [`session`]: [`Session`], which adds timeouts, keep-alive and
//!   subscription dispatch on top of a [`Client`]
//!
//! # Usage
//!
//! ```rust,no_run
//! use iotdemo::network::application::mqtt::{Client, Options, QoS};
//! # use iotdemo::network::Connection;
//! # struct MockConnection;
//! # impl Connection for MockConnection {}
//! # impl iotdemo::network::Read for MockConnection {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl iotdemo::network::Write for MockConnection {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl iotdemo::network::Close for MockConnection {
//! #     type Error = ();
//! #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//!
//! let connection = MockConnection;
//! let options = Options {
//!     client_id: "iotdemo1234",
//!     keep_alive_seconds: 60,
//!     clean_session: true,
//!     will: None,
//! };
//!
//! // let mut client = Client::connect(connection, &options, &clock, 5000)?;
//! // client.subscribe(&[("iotdemo/topic/+", QoS::AtLeastOnce)])?;
//! // client.publish("iotdemo/topic/1", b"Hello world 0!", QoS::AtLeastOnce, false)?;
//! ```

/// MQTT client implementation and supporting types.
pub mod client;

/// Session driver: timeouts, keep-alive and subscription dispatch.
pub mod session;

/// Topic name and topic filter helpers.
pub mod topic;

pub use client::{
    Client, Event, LastWill, Options, PublishPacket, QoS, SubAck, SubscribeReturnCode,
    MAX_PAYLOAD_LEN, MAX_TOPIC_FILTERS, MAX_TOPIC_LEN,
};
pub use session::{Handler, Session};
