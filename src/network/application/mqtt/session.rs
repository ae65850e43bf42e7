//! A blocking session on top of [`Client`].
//!
//! The client itself never waits. The session owns a [`Clock`] and turns the
//! client's non-blocking `poll` into bounded waits: every wait either
//! reaches its goal or fails with [`Error::Timeout`] once the configured
//! timeout has elapsed. While waiting it
//!
//! - routes incoming publishes to a [`Handler`] together with the granted
//!   subscription filter they matched,
//! - reports completed QoS 1/2 publishes to the handler,
//! - sends a PINGREQ whenever the keep-alive interval passes without any
//!   outgoing traffic.

use super::client::{Client, Event, PublishPacket, QoS, SubAck, SubscribeReturnCode};
use super::client::{MAX_TOPIC_FILTERS, MAX_TOPIC_LEN, POLL_INTERVAL_MS};
use super::topic::matches;
use crate::network::Connection;
use crate::network::error::Error;
use crate::platform::Clock;
use heapless::{String, Vec};

/// Receives what the broker pushes while a [`Session`] is waiting.
pub trait Handler {
    /// An incoming publish matched the granted subscription `filter`.
    ///
    /// The client is handed over so the handler can publish replies.
    fn on_publish<C: Connection>(
        &mut self,
        client: &mut Client<C>,
        filter: &str,
        publish: &PublishPacket,
    );

    /// The broker acknowledged the QoS 1 or QoS 2 publish `packet_id`.
    fn on_complete(&mut self, _packet_id: u16) {}
}

/// A connected client plus the bookkeeping needed to wait on it.
pub struct Session<'k, C: Connection, K: Clock> {
    client: Client<C>,
    clock: &'k K,
    filters: Vec<String<MAX_TOPIC_LEN>, MAX_TOPIC_FILTERS>,
    timeout_ms: u64,
    keep_alive_ms: u64,
    last_sent_ms: u64,
}

impl<C: Connection, K: Clock> core::fmt::Debug for Session<'_, C, K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("filters", &self.filters)
            .field("timeout_ms", &self.timeout_ms)
            .field("keep_alive_ms", &self.keep_alive_ms)
            .finish_non_exhaustive()
    }
}

impl<'k, C: Connection, K: Clock> Session<'k, C, K> {
    /// Wrap a freshly connected client.
    pub fn new(client: Client<C>, clock: &'k K, timeout_ms: u64, keep_alive_seconds: u16) -> Self {
        Self {
            client,
            clock,
            filters: Vec::new(),
            timeout_ms,
            keep_alive_ms: u64::from(keep_alive_seconds) * 1000,
            last_sent_ms: clock.now_ms(),
        }
    }

    /// Direct access to the client.
    pub fn client_mut(&mut self) -> &mut Client<C> {
        &mut self.client
    }

    /// Returns `true` if the broker granted a subscription to `filter`.
    pub fn is_subscribed(&self, filter: &str) -> bool {
        self.filters.iter().any(|granted| granted.as_str() == filter)
    }

    /// Publish without retain. See [`Client::publish`].
    pub fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<Option<u16>, Error> {
        self.client.publish(topic, payload, qos, false)
    }

    /// Subscribe to `filters` and wait for the SUBACK.
    ///
    /// Filters the broker accepted are remembered for dispatch; the full
    /// SUBACK is returned so the caller can report refusals.
    pub fn subscribe<H: Handler>(
        &mut self,
        handler: &mut H,
        filters: &[&str],
        qos: QoS,
    ) -> Result<SubAck, Error> {
        let mut requests: Vec<(&str, QoS), MAX_TOPIC_FILTERS> = Vec::new();
        for filter in filters {
            requests
                .push((*filter, qos))
                .map_err(|_| Error::BufferOverflow)?;
        }

        let packet_id = self.client.subscribe(&requests)?;
        let ack = self.wait_until(handler, |_, event| match event {
            Some(Event::SubAck(ack)) if ack.packet_id == packet_id => Some(ack.clone()),
            _ => None,
        })?;

        for (filter, code) in filters.iter().zip(ack.return_codes.iter()) {
            if let SubscribeReturnCode::Success(_) = code {
                if !self.is_subscribed(filter) {
                    let granted = String::try_from(*filter).map_err(|_| Error::InvalidTopic)?;
                    self.filters
                        .push(granted)
                        .map_err(|_| Error::BufferOverflow)?;
                }
            }
        }
        Ok(ack)
    }

    /// Unsubscribe from `filters` and wait for the UNSUBACK.
    pub fn unsubscribe<H: Handler>(&mut self, handler: &mut H, filters: &[&str]) -> Result<(), Error> {
        let packet_id = self.client.unsubscribe(filters)?;
        self.wait_until(handler, |_, event| match event {
            Some(Event::UnsubAck(id)) if *id == packet_id => Some(()),
            _ => None,
        })?;
        self.filters
            .retain(|granted| !filters.contains(&granted.as_str()));
        Ok(())
    }

    /// Pump the connection until `ready` yields a value.
    ///
    /// `ready` is consulted once before anything is read (with `None`) and
    /// then after every poll with the event just processed, if any.
    pub fn wait_until<H, T, F>(&mut self, handler: &mut H, mut ready: F) -> Result<T, Error>
    where
        H: Handler,
        F: FnMut(&mut H, Option<&Event>) -> Option<T>,
    {
        let deadline = self.clock.now_ms().saturating_add(self.timeout_ms);
        if let Some(value) = ready(handler, None) {
            return Ok(value);
        }

        loop {
            let event = self.pump(handler)?;
            if let Some(value) = ready(handler, event.as_ref()) {
                return Ok(value);
            }
            if self.clock.now_ms() >= deadline {
                return Err(Error::Timeout);
            }
            if event.is_none() {
                self.clock.sleep_ms(POLL_INTERVAL_MS);
            }
        }
    }

    /// Disconnect cleanly and close the connection.
    pub fn disconnect(self) -> Result<(), Error> {
        self.client.disconnect()
    }

    fn pump<H: Handler>(&mut self, handler: &mut H) -> Result<Option<Event>, Error> {
        self.service_keep_alive()?;

        let event = self.client.poll()?;
        match &event {
            Some(Event::Publish(publish)) => {
                match self
                    .filters
                    .iter()
                    .find(|granted| matches(granted, &publish.topic))
                {
                    Some(filter) => handler.on_publish(&mut self.client, filter, publish),
                    None => warn!(
                        "Dropping PUBLISH on {} with no matching subscription",
                        publish.topic.as_str()
                    ),
                }
            }
            Some(Event::PubAck(id)) | Some(Event::PubComp(id)) => handler.on_complete(*id),
            Some(Event::PingResp) => trace!("PINGRESP received"),
            _ => {}
        }

        if self.client.take_activity() {
            self.last_sent_ms = self.clock.now_ms();
        }
        Ok(event)
    }

    fn service_keep_alive(&mut self) -> Result<(), Error> {
        let now = self.clock.now_ms();
        if self.client.take_activity() {
            self.last_sent_ms = now;
        }
        if self.keep_alive_ms > 0 && now.saturating_sub(self.last_sent_ms) >= self.keep_alive_ms {
            debug!("Keep-alive interval elapsed, sending PINGREQ");
            self.client.ping()?;
            self.client.take_activity();
            self.last_sent_ms = now;
        }
        Ok(())
    }
}
