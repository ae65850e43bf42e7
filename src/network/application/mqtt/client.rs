//! MQTT 3.1.1 client implementation for embedded systems.
//!
//! This module provides a lightweight MQTT client designed for `no_std`
//! environments. It speaks just enough of MQTT 3.1.1 for the demo: connect
//! with a last will, publish at any QoS, subscribe and unsubscribe several
//! filters at once, keep-alive pings and a clean disconnect.
//!
//! # Features
//!
//! - Quality of Service (QoS) levels 0, 1, and 2 for outgoing and incoming publishes
//! - Last Will and Testament
//! - Multi-filter SUBSCRIBE/UNSUBSCRIBE with per-filter SUBACK return codes
//! - Fixed-size buffers for predictable memory usage
//! - Connection agnostic (works with any transport)
//!
//! # Acknowledgements
//!
//! Incoming QoS 1 publishes are answered with PUBACK and incoming QoS 2
//! publishes with PUBREC/PUBCOMP before they are handed to the caller.
//! Outgoing QoS 2 publishes get their PUBREL sent automatically when the
//! PUBREC arrives. Sessions are always clean, so nothing is retransmitted.
//!
//! # Partial packets
//!
//! Bytes are collected in a receive buffer owned by the client, so a packet
//! that arrives over several reads is simply held until it is complete.
//! `poll` never waits; only [`Client::connect`] waits, for the CONNACK, and
//! that wait is bounded by a [`Clock`] deadline rather than a read count.
//!
//! # Examples
//!
//! ```rust,no_run
//! use iotdemo::network::application::mqtt::{Client, Event, LastWill, Options, QoS};
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
//! # struct NoClock;
//! # impl iotdemo::platform::Clock for NoClock {
//! #     fn now_ms(&self) -> u64 { 0 }
//! #     fn sleep_ms(&self, _ms: u64) {}
//! # }
//! let connection = MockConnection;
//! let options = Options {
//!     client_id: "iotdemo1234",
//!     keep_alive_seconds: 60,
//!     clean_session: true,
//!     will: Some(LastWill {
//!         topic: "iotdemo/will",
//!         message: b"MQTT demo unexpectedly disconnected.",
//!         qos: QoS::AtMostOnce,
//!         retain: false,
//!     }),
//! };
//!
//! // let mut client = Client::connect(connection, &options, &NoClock, 5000)?;
//! // client.publish("iotdemo/topic/1", b"Hello world 0!", QoS::AtLeastOnce, false)?;
//! // loop {
//! //     match client.poll()? {
//! //         Some(Event::PubAck(id)) => { /* delivered */ }
//! //         Some(Event::Publish(message)) => { /* incoming */ }
//! //         _ => {}
//! //     }
//! // }
//! ```

use super::topic::{validate_topic_filter, validate_topic_name};
use crate::network::error::Error;
use crate::network::{Close, Connection, Read, Write};
use crate::platform::Clock;
use heapless::{String, Vec};

// MQTT Control Packet types - these are the fixed header packet type values
const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const PUBACK: u8 = 0x40;
const PUBREC: u8 = 0x50;
const PUBREL: u8 = 0x62;
const PUBCOMP: u8 = 0x70;
const SUBSCRIBE: u8 = 0x82;
const SUBACK: u8 = 0x90;
const UNSUBSCRIBE: u8 = 0xA2;
const UNSUBACK: u8 = 0xB0;
const PINGREQ: u8 = 0xC0;
const PINGRESP: u8 = 0xD0;
const DISCONNECT: u8 = 0xE0;

// Protocol constants defined by MQTT 3.1.1 specification
const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4; // MQTT 3.1.1

// CONNECT flags
const CLEAN_SESSION_FLAG: u8 = 0x02;
const WILL_FLAG: u8 = 0x04;
const WILL_RETAIN_FLAG: u8 = 0x20;

/// Maximum topic length accepted for incoming and outgoing publishes.
pub const MAX_TOPIC_LEN: usize = 256;

/// Maximum payload carried by an incoming publish.
///
/// Certificates travel through this buffer during rotation, so it is sized
/// for a base64-encoded PEM certificate with JSON framing around it.
pub const MAX_PAYLOAD_LEN: usize = 4096;

/// Maximum number of topic filters in one SUBSCRIBE or UNSUBSCRIBE.
pub const MAX_TOPIC_FILTERS: usize = 8;

/// Largest incoming packet body the client will buffer.
const MAX_PACKET_LEN: usize = MAX_PAYLOAD_LEN + MAX_TOPIC_LEN + 4;

/// Largest SUBSCRIBE/UNSUBSCRIBE body the client will build.
const MAX_SUBSCRIPTION_PACKET_LEN: usize = 2 + MAX_TOPIC_FILTERS * (MAX_TOPIC_LEN + 3);

/// Fixed header (at most 5 bytes) plus the largest body.
const MAX_FRAME_LEN: usize = MAX_PACKET_LEN + 5;

/// Pause between reads while waiting for data.
pub(crate) const POLL_INTERVAL_MS: u64 = 10;

/// Quality of Service levels for MQTT messages.
///
/// ```rust
/// use iotdemo::network::application::mqtt::QoS;
///
/// assert_eq!(QoS::AtMostOnce as u8, 0);
/// assert_eq!(QoS::from_bits(1), Some(QoS::AtLeastOnce));
/// assert_eq!(QoS::from_bits(3), None);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QoS {
    /// **QoS 0**: At most once delivery.
    AtMostOnce = 0,
    /// **QoS 1**: At least once delivery, duplicates possible.
    AtLeastOnce = 1,
    /// **QoS 2**: Exactly once delivery.
    ExactlyOnce = 2,
}

impl QoS {
    /// Decode a QoS level from its two-bit wire value.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QoS {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", *self as u8)
    }
}

/// An incoming MQTT publish message.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PublishPacket {
    /// The topic on which the message was published.
    pub topic: String<MAX_TOPIC_LEN>,
    /// The message payload data.
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
    /// Delivery guarantee the broker used for this message.
    pub qos: QoS,
    /// Whether this is a retained message.
    pub retain: bool,
    /// Whether the broker flagged this as a redelivery.
    pub dup: bool,
    /// Packet identifier, present for QoS 1 and 2.
    pub packet_id: Option<u16>,
}

/// Last Will and Testament published by the broker if the client vanishes.
#[derive(Debug, Clone, Copy)]
pub struct LastWill<'a> {
    /// Topic the will is published to.
    pub topic: &'a str,
    /// Will payload.
    pub message: &'a [u8],
    /// QoS of the will publish.
    pub qos: QoS,
    /// Whether the broker retains the will.
    pub retain: bool,
}

/// Configuration options for MQTT client connection.
#[derive(Debug, Clone)]
pub struct Options<'a> {
    /// The client identifier, must be unique within the broker.
    ///
    /// Brokers are only required to accept 1-23 character identifiers.
    pub client_id: &'a str,

    /// The keep-alive time interval in seconds. `0` disables keep-alive.
    pub keep_alive_seconds: u16,

    /// Whether to start a clean session.
    pub clean_session: bool,

    /// Optional last will.
    pub will: Option<LastWill<'a>>,
}

/// Per-filter result carried by a SUBACK.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SubscribeReturnCode {
    /// The subscription was accepted with the given maximum QoS.
    Success(QoS),
    /// The broker refused the subscription.
    Failure,
}

/// A decoded SUBACK.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SubAck {
    /// Packet identifier of the SUBSCRIBE being acknowledged.
    pub packet_id: u16,
    /// One return code per requested filter, in request order.
    pub return_codes: Vec<SubscribeReturnCode, MAX_TOPIC_FILTERS>,
}

/// Something the broker sent.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Event {
    /// An application message on a subscribed topic.
    Publish(PublishPacket),
    /// A QoS 1 publish was acknowledged.
    PubAck(u16),
    /// A QoS 2 publish was received by the broker; PUBREL has been sent.
    PubRec(u16),
    /// The broker released an incoming QoS 2 publish; PUBCOMP has been sent.
    PubRel(u16),
    /// A QoS 2 publish completed.
    PubComp(u16),
    /// A subscription request was answered.
    SubAck(SubAck),
    /// An unsubscribe request was acknowledged.
    UnsubAck(u16),
    /// The broker answered a keep-alive ping.
    PingResp,
}

/// An MQTT 3.1.1 client for publish-subscribe messaging.
///
/// Apart from the CONNACK wait in [`connect`](Client::connect) the client
/// never sleeps. [`Session`](super::Session) layers timeouts and keep-alive
/// on top.
pub struct Client<C: Connection> {
    connection: C,
    next_packet_id: u16,
    activity: bool,
    rx: [u8; MAX_FRAME_LEN],
    rx_len: usize,
}

impl<C: Connection> core::fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("next_packet_id", &self.next_packet_id)
            .field("buffered", &self.rx_len)
            .finish_non_exhaustive()
    }
}

impl<C: Connection> Client<C> {
    /// Establish an MQTT connection with the broker.
    ///
    /// Sends a CONNECT packet and waits up to `timeout_ms` on `clock` for
    /// the CONNACK. Empty reads in between are spaced by short sleeps.
    ///
    /// # Errors
    ///
    /// * [`Error::WriteError`] - Failed to send CONNECT packet
    /// * [`Error::ReadError`] - Failed to read CONNACK response
    /// * [`Error::Timeout`] - No complete CONNACK arrived in time
    /// * [`Error::ConnectionRefused`] - Broker refused the connection
    /// * [`Error::ProtocolError`] - Invalid CONNACK packet received
    /// * [`Error::InvalidTopic`] - The will topic is not a valid topic name
    pub fn connect<K: Clock + ?Sized>(
        connection: C,
        options: &Options<'_>,
        clock: &K,
        timeout_ms: u64,
    ) -> Result<Self, Error> {
        let mut client = Self {
            connection,
            next_packet_id: 1,
            activity: false,
            rx: [0; MAX_FRAME_LEN],
            rx_len: 0,
        };

        // --- Variable Header ---
        let mut connect_flags = 0;
        if options.clean_session {
            connect_flags |= CLEAN_SESSION_FLAG;
        }
        if let Some(will) = &options.will {
            validate_topic_name(will.topic)?;
            connect_flags |= WILL_FLAG | ((will.qos as u8) << 3);
            if will.retain {
                connect_flags |= WILL_RETAIN_FLAG;
            }
        }

        let mut vh: Vec<u8, 10> = Vec::new();
        vh.extend_from_slice(&(PROTOCOL_NAME.len() as u16).to_be_bytes())
            .map_err(|_| Error::BufferOverflow)?;
        vh.extend_from_slice(PROTOCOL_NAME)
            .map_err(|_| Error::BufferOverflow)?;
        vh.push(PROTOCOL_LEVEL).map_err(|_| Error::BufferOverflow)?;
        vh.push(connect_flags).map_err(|_| Error::BufferOverflow)?;
        vh.extend_from_slice(&options.keep_alive_seconds.to_be_bytes())
            .map_err(|_| Error::BufferOverflow)?;

        // --- Payload ---
        let client_id = options.client_id.as_bytes();
        let client_id_len = encode_length_prefix(client_id)?;
        let (will_topic, will_message) = match &options.will {
            Some(will) => (will.topic.as_bytes(), will.message),
            None => (&[][..], &[][..]),
        };
        let will_topic_len = encode_length_prefix(will_topic)?;
        let will_message_len = encode_length_prefix(will_message)?;

        if options.will.is_some() {
            client.send(
                CONNECT,
                &[
                    &vh[..],
                    &client_id_len[..],
                    client_id,
                    &will_topic_len[..],
                    will_topic,
                    &will_message_len[..],
                    will_message,
                ],
            )?;
        } else {
            client.send(CONNECT, &[&vh[..], &client_id_len[..], client_id])?;
        }

        let deadline = clock.now_ms().saturating_add(timeout_ms);
        let (header, offset, len) = loop {
            if let Some(frame) = client.frame()? {
                break frame;
            }
            if client.fill()? == 0 {
                if clock.now_ms() >= deadline {
                    error!("No CONNACK within {} ms", timeout_ms);
                    return Err(Error::Timeout);
                }
                clock.sleep_ms(POLL_INTERVAL_MS);
            }
        };
        if header != CONNACK || len != 2 {
            return Err(Error::ProtocolError);
        }
        let code = client.rx[offset + 1];
        client.consume(offset + len);

        // Check connection acknowledgement status
        match code {
            0 => Ok(client),
            code @ 1..=5 => {
                error!("CONNACK refused the connection with return code {}", code);
                Err(Error::ConnectionRefused)
            }
            _ => Err(Error::ProtocolError),
        }
    }

    /// Publish a message to a specific topic.
    ///
    /// Returns the packet identifier for QoS 1 and 2 publishes, which
    /// shows up again in [`Event::PubAck`] or [`Event::PubComp`] once the
    /// broker has taken responsibility for the message.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidTopic`] - Empty topic or topic containing wildcards
    /// * [`Error::PacketTooLarge`] - Payload exceeds the MQTT length limit
    /// * [`Error::WriteError`] - Failed to send the publish packet
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<Option<u16>, Error> {
        validate_topic_name(topic)?;

        let mut flags = PUBLISH | ((qos as u8) << 1);
        if retain {
            flags |= 0x01;
        }

        let topic_len = encode_length_prefix(topic.as_bytes())?;
        match qos {
            QoS::AtMostOnce => {
                self.send(flags, &[&topic_len[..], topic.as_bytes(), payload])?;
                Ok(None)
            }
            QoS::AtLeastOnce | QoS::ExactlyOnce => {
                let packet_id = self.allocate_packet_id();
                self.send(
                    flags,
                    &[&topic_len[..], topic.as_bytes(), &packet_id.to_be_bytes()[..], payload],
                )?;
                Ok(Some(packet_id))
            }
        }
    }

    /// Subscribe to one or more topic filters.
    ///
    /// Returns the packet identifier; the matching [`Event::SubAck`] carries
    /// one return code per filter.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidTopic`] - A malformed filter or an empty filter list
    /// * [`Error::BufferOverflow`] - More than [`MAX_TOPIC_FILTERS`] filters
    /// * [`Error::WriteError`] - Failed to send the subscribe packet
    pub fn subscribe(&mut self, filters: &[(&str, QoS)]) -> Result<u16, Error> {
        if filters.is_empty() {
            return Err(Error::InvalidTopic);
        }
        if filters.len() > MAX_TOPIC_FILTERS {
            return Err(Error::BufferOverflow);
        }

        let packet_id = self.allocate_packet_id();
        let mut packet: Vec<u8, MAX_SUBSCRIPTION_PACKET_LEN> = Vec::new();
        packet
            .extend_from_slice(&packet_id.to_be_bytes())
            .map_err(|_| Error::BufferOverflow)?;
        for (filter, qos) in filters {
            validate_topic_filter(filter)?;
            push_length_prefixed(&mut packet, filter.as_bytes())?;
            packet.push(*qos as u8).map_err(|_| Error::BufferOverflow)?;
        }

        self.send(SUBSCRIBE, &[&packet[..]])?;
        Ok(packet_id)
    }

    /// Remove one or more subscriptions. Returns the packet identifier.
    pub fn unsubscribe(&mut self, filters: &[&str]) -> Result<u16, Error> {
        if filters.is_empty() {
            return Err(Error::InvalidTopic);
        }
        if filters.len() > MAX_TOPIC_FILTERS {
            return Err(Error::BufferOverflow);
        }

        let packet_id = self.allocate_packet_id();
        let mut packet: Vec<u8, MAX_SUBSCRIPTION_PACKET_LEN> = Vec::new();
        packet
            .extend_from_slice(&packet_id.to_be_bytes())
            .map_err(|_| Error::BufferOverflow)?;
        for filter in filters {
            validate_topic_filter(filter)?;
            push_length_prefixed(&mut packet, filter.as_bytes())?;
        }

        self.send(UNSUBSCRIBE, &[&packet[..]])?;
        Ok(packet_id)
    }

    /// Send a keep-alive PINGREQ.
    pub fn ping(&mut self) -> Result<(), Error> {
        self.send(PINGREQ, &[])
    }

    /// Send DISCONNECT and close the underlying connection.
    ///
    /// A clean disconnect tells the broker to discard the last will.
    pub fn disconnect(mut self) -> Result<(), Error> {
        let sent = self.send(DISCONNECT, &[]);
        let closed = self.connection.close().map_err(|_| Error::ConnectionClosed);
        sent.and(closed)
    }

    /// Returns `true` if anything was written since the last call.
    ///
    /// Used by the session to decide when a keep-alive ping is due.
    pub fn take_activity(&mut self) -> bool {
        core::mem::replace(&mut self.activity, false)
    }

    /// Poll the connection for the next packet from the broker.
    ///
    /// Reads whatever the connection has and returns the next complete
    /// packet. `Ok(None)` means no complete packet is buffered yet; a
    /// partial one stays buffered for the next call.
    ///
    /// # Errors
    ///
    /// * [`Error::ReadError`] - Failed to read from the connection
    /// * [`Error::PacketTooLarge`] - The packet does not fit the client's buffers
    /// * [`Error::ProtocolError`] - Received a malformed or unexpected packet
    pub fn poll(&mut self) -> Result<Option<Event>, Error> {
        let frame = match self.frame()? {
            Some(frame) => Some(frame),
            None => {
                self.fill()?;
                self.frame()?
            }
        };
        let Some((header, offset, len)) = frame else {
            return Ok(None);
        };

        let decoded = decode_packet(header, &self.rx[offset..offset + len]);
        self.consume(offset + len);
        let (event, reply) = decoded?;
        if let Some((kind, id)) = reply {
            self.send(kind, &[&id.to_be_bytes()[..]])?;
        }
        Ok(Some(event))
    }

    /// Header, body offset and body length of the first buffered packet,
    /// once all of it has arrived.
    fn frame(&mut self) -> Result<Option<(u8, usize, usize)>, Error> {
        let buffered = &self.rx[..self.rx_len];
        let Some(&header) = buffered.first() else {
            return Ok(None);
        };

        let mut len = 0;
        let mut multiplier = 1;
        for index in 1..5 {
            let Some(&byte) = buffered.get(index) else {
                return Ok(None);
            };
            len += (byte as usize & 0x7F) * multiplier;
            if byte & 0x80 == 0 {
                if len > MAX_PACKET_LEN {
                    // the stream cannot be resynchronised past this packet
                    self.rx_len = 0;
                    return Err(Error::PacketTooLarge);
                }
                let offset = index + 1;
                return Ok((buffered.len() >= offset + len).then_some((header, offset, len)));
            }
            multiplier *= 128;
        }
        self.rx_len = 0;
        Err(Error::ProtocolError)
    }

    /// Read into the free end of the receive buffer.
    fn fill(&mut self) -> Result<usize, Error> {
        // a complete frame always fits, so a full buffer holds one
        if self.rx_len == MAX_FRAME_LEN {
            return Ok(0);
        }
        let read = self
            .connection
            .read(&mut self.rx[self.rx_len..])
            .map_err(|_| Error::ReadError)?;
        self.rx_len += read;
        Ok(read)
    }

    /// Drop the first `len` buffered bytes.
    fn consume(&mut self, len: usize) {
        self.rx.copy_within(len..self.rx_len, 0);
        self.rx_len -= len;
    }

    /// Write one packet: fixed header, then each body part in order.
    fn send(&mut self, header: u8, parts: &[&[u8]]) -> Result<(), Error> {
        let remaining_len: usize = parts.iter().map(|part| part.len()).sum();
        let mut fixed_header: Vec<u8, 5> = Vec::new();
        fixed_header.push(header).map_err(|_| Error::BufferOverflow)?;
        encode_remaining_length(&mut fixed_header, remaining_len)
            .map_err(|_| Error::PacketTooLarge)?;

        self.write_all(&fixed_header)?;
        for part in parts {
            self.write_all(part)?;
        }
        self.connection.flush().map_err(|_| Error::WriteError)?;
        self.activity = true;
        Ok(())
    }

    fn write_all(&mut self, mut buf: &[u8]) -> Result<(), Error> {
        while !buf.is_empty() {
            match self.connection.write(buf) {
                Ok(0) | Err(_) => return Err(Error::WriteError),
                Ok(n) => buf = &buf[n..],
            }
        }
        Ok(())
    }

    fn allocate_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = match self.next_packet_id.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        id
    }
}

/// Decode one packet body into the event it carries and the acknowledgement
/// (packet type and id) owed to the broker, if any.
fn decode_packet(header: u8, body: &[u8]) -> Result<(Event, Option<(u8, u16)>), Error> {
    match header & 0xF0 {
        PUBLISH => {
            let publish = decode_publish(header, body)?;
            let reply = match (publish.qos, publish.packet_id) {
                (QoS::AtLeastOnce, Some(id)) => Some((PUBACK, id)),
                (QoS::ExactlyOnce, Some(id)) => Some((PUBREC, id)),
                _ => None,
            };
            Ok((Event::Publish(publish), reply))
        }
        PUBACK => Ok((Event::PubAck(packet_id(body)?), None)),
        PUBREC => {
            let id = packet_id(body)?;
            Ok((Event::PubRec(id), Some((PUBREL, id))))
        }
        // PUBREL arrives with the reserved flag bits set, so match on the type nibble
        0x60 => {
            let id = packet_id(body)?;
            Ok((Event::PubRel(id), Some((PUBCOMP, id))))
        }
        PUBCOMP => Ok((Event::PubComp(packet_id(body)?), None)),
        SUBACK => Ok((Event::SubAck(decode_suback(body)?), None)),
        UNSUBACK => Ok((Event::UnsubAck(packet_id(body)?), None)),
        PINGRESP => Ok((Event::PingResp, None)),
        _ => Err(Error::ProtocolError),
    }
}

fn decode_publish(header: u8, body: &[u8]) -> Result<PublishPacket, Error> {
    let qos = QoS::from_bits((header >> 1) & 0x03).ok_or(Error::ProtocolError)?;
    let retain = header & 0x01 != 0;
    let dup = header & 0x08 != 0;

    if body.len() < 2 {
        return Err(Error::ProtocolError);
    }
    let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
    let mut offset = 2 + topic_len;
    if body.len() < offset {
        return Err(Error::ProtocolError);
    }
    let topic_str = core::str::from_utf8(&body[2..offset]).map_err(|_| Error::ProtocolError)?;
    let topic = String::try_from(topic_str).map_err(|_| Error::PacketTooLarge)?;

    let packet_id = match qos {
        QoS::AtMostOnce => None,
        QoS::AtLeastOnce | QoS::ExactlyOnce => {
            let id = packet_id(&body[offset..])?;
            offset += 2;
            Some(id)
        }
    };

    let payload = Vec::from_slice(&body[offset..]).map_err(|_| Error::PacketTooLarge)?;
    Ok(PublishPacket {
        topic,
        payload,
        qos,
        retain,
        dup,
        packet_id,
    })
}

fn packet_id(body: &[u8]) -> Result<u16, Error> {
    match body {
        [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(Error::ProtocolError),
    }
}

fn decode_suback(body: &[u8]) -> Result<SubAck, Error> {
    let packet_id = packet_id(body)?;
    let mut return_codes = Vec::new();
    for code in &body[2..] {
        let code = match code {
            0x80 => SubscribeReturnCode::Failure,
            bits => SubscribeReturnCode::Success(
                QoS::from_bits(*bits).ok_or(Error::ProtocolError)?,
            ),
        };
        return_codes
            .push(code)
            .map_err(|_| Error::BufferOverflow)?;
    }
    Ok(SubAck {
        packet_id,
        return_codes,
    })
}

fn encode_length_prefix(bytes: &[u8]) -> Result<[u8; 2], Error> {
    u16::try_from(bytes.len())
        .map(u16::to_be_bytes)
        .map_err(|_| Error::PacketTooLarge)
}

fn push_length_prefixed<const N: usize>(packet: &mut Vec<u8, N>, bytes: &[u8]) -> Result<(), Error> {
    packet
        .extend_from_slice(&encode_length_prefix(bytes)?)
        .map_err(|_| Error::BufferOverflow)?;
    packet
        .extend_from_slice(bytes)
        .map_err(|_| Error::BufferOverflow)
}

/// Encode the remaining length field for an MQTT packet.
///
/// The encoding uses up to 4 bytes where each byte encodes 7 bits of the
/// length value. The most significant bit indicates if another byte follows,
/// which allows values from 0 to 268,435,455.
fn encode_remaining_length(buf: &mut Vec<u8, 5>, mut len: usize) -> Result<(), ()> {
    loop {
        if buf.is_full() {
            return Err(());
        }
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.push(byte).map_err(|_| ())?;
        if len == 0 {
            break;
        }
    }
    Ok(())
}
