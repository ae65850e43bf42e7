//! The MQTT demo round, also used to check the current certificate.
//!
//! One round connects with the device credentials, subscribes to four demo
//! topics, publishes bursts of numbered messages to them and waits for the
//! broker to deliver every burst back. Each message received is
//! acknowledged on a separate topic. If all of that works, so does the
//! certificate the device presented.

use crate::config::{DemoConfig, MAX_CLIENT_ID_LEN};
use crate::credentials::CredentialStore;
use crate::error::Error;
use crate::network::application::mqtt::{
    Client, Handler, LastWill, Options, PublishPacket, QoS, Session, SubscribeReturnCode,
    MAX_TOPIC_LEN,
};
use crate::network::{Connect, Connection, Credentials, ServerInfo};
use crate::platform::Clock;
use core::fmt::Write;
use heapless::{FnvIndexMap, String, Vec};

/// Number of demo topics the messages are spread over.
pub const TOPIC_COUNT: usize = 4;

/// Message the broker publishes on `<prefix>/will` if the demo vanishes.
pub const WILL_MESSAGE: &str = "MQTT demo unexpectedly disconnected.";

const CLIENT_ID_PREFIX: &str = "iotdemo";

/// Outgoing publishes tracked for the "successfully sent" log.
const MAX_TRACKED_PUBLISHES: usize = 32;

/// Build `<prefix>/<suffix>`.
pub fn topic(prefix: &str, suffix: &str) -> Result<String<MAX_TOPIC_LEN>, Error> {
    let mut topic = String::new();
    write!(topic, "{}/{}", prefix, suffix).map_err(|_| Error::Encoding)?;
    Ok(topic)
}

/// A client identifier of the form `iotdemo<now_ms>`, cut to 23 characters.
pub fn generate_client_id<K: Clock + ?Sized>(clock: &K) -> String<MAX_CLIENT_ID_LEN> {
    let mut full: String<40> = String::new();
    // 40 bytes always fit the prefix and a u64
    let _ = write!(full, "{}{}", CLIENT_ID_PREFIX, clock.now_ms());
    let end = full.len().min(MAX_CLIENT_ID_LEN);
    let mut id = String::new();
    let _ = id.push_str(&full[..end]);
    id
}

/// The first run of ASCII digits in `payload`.
///
/// ```rust
/// use iotdemo::demo::message_number;
///
/// assert_eq!(message_number("Hello world 42!"), Some("42"));
/// assert_eq!(message_number("Hello world!"), None);
/// ```
pub fn message_number(payload: &str) -> Option<&str> {
    let start = payload.find(|c: char| c.is_ascii_digit())?;
    let rest = &payload[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Open a transport connection and an MQTT session on it.
///
/// The session starts clean and registers the demo's last will.
pub(crate) fn establish<'k, N: Connect, K: Clock>(
    config: &DemoConfig,
    network: &mut N,
    credentials: &Credentials<'_>,
    clock: &'k K,
) -> Result<Session<'k, N::Connection, K>, Error> {
    let client_id = match &config.client_id {
        Some(id) => id.clone(),
        None => generate_client_id(clock),
    };
    let will_topic = topic(&config.topic_prefix, "will")?;

    let server = ServerInfo {
        host: &config.host,
        port: config.port,
    };
    let connection = network.connect(&server, credentials).map_err(|_| {
        error!(
            "Failed to open a connection to {}:{}",
            config.host.as_str(),
            config.port
        );
        Error::Transport
    })?;

    let options = Options {
        client_id: &client_id,
        keep_alive_seconds: config.keep_alive_seconds,
        clean_session: true,
        will: Some(LastWill {
            topic: &will_topic,
            message: WILL_MESSAGE.as_bytes(),
            qos: QoS::AtMostOnce,
            retain: false,
        }),
    };
    let client = Client::connect(connection, &options, clock, config.mqtt_timeout_ms)
        .inspect_err(|err| error!("MQTT CONNECT returned error {:?}", err))?;
    info!(
        "MQTT demo client identifier is {} (length {}).",
        client_id.as_str(),
        client_id.len()
    );

    Ok(Session::new(
        client,
        clock,
        config.mqtt_timeout_ms,
        config.keep_alive_seconds,
    ))
}

/// Run one demo round with the credentials in `store`.
///
/// Succeeds only if the connection, every subscription, every publish and
/// every expected incoming message went through. The session is always
/// disconnected once it was established.
pub fn current_cert_works<N, K, S>(
    config: &DemoConfig,
    network: &mut N,
    store: &S,
    clock: &K,
) -> Result<(), Error>
where
    N: Connect,
    K: Clock,
    S: CredentialStore + ?Sized,
{
    config.validate()?;
    let mut session = establish(config, network, &store.credentials(), clock)?;

    let result = publish_bursts(config, &mut session);
    let disconnected = session.disconnect();
    if disconnected.is_ok() {
        info!("MQTT demo disconnected.");
    }

    result?;
    disconnected?;
    Ok(())
}

fn publish_bursts<C: Connection, K: Clock>(
    config: &DemoConfig,
    session: &mut Session<'_, C, K>,
) -> Result<(), Error> {
    let mut filters: Vec<String<MAX_TOPIC_LEN>, TOPIC_COUNT> = Vec::new();
    for index in 1..=TOPIC_COUNT {
        let mut suffix: String<16> = String::new();
        write!(suffix, "topic/{}", index).map_err(|_| Error::Encoding)?;
        filters
            .push(topic(&config.topic_prefix, &suffix)?)
            .map_err(|_| Error::Encoding)?;
    }
    let filters: Vec<&str, TOPIC_COUNT> = filters.iter().map(|filter| filter.as_str()).collect();

    let ack_topic = topic(&config.topic_prefix, "acknowledgements")?;
    let mut handler = DemoHandler::new(&ack_topic, config.publish_burst_size);

    let suback = session.subscribe(&mut handler, &filters, QoS::AtLeastOnce)?;
    let refused = suback.return_codes.len() != filters.len()
        || suback
            .return_codes
            .iter()
            .any(|code| *code == SubscribeReturnCode::Failure);
    if refused {
        for filter in &filters {
            if session.is_subscribed(filter) {
                info!("Topic filter {} was accepted.", *filter);
            } else {
                error!("Topic filter {} was rejected.", *filter);
            }
        }
        return Err(Error::SubscriptionRefused);
    }
    info!("All demo topic filter subscriptions accepted.");

    let burst_size = config.publish_burst_size;
    let total = burst_size
        .checked_mul(config.publish_burst_count)
        .ok_or(Error::Config(crate::config::Error::InvalidValue))?;

    for number in 0..total {
        if number % burst_size == 0 {
            info!(
                "Publishing messages {} to {}.",
                number,
                number + burst_size - 1
            );
        }

        let mut payload: String<32> = String::new();
        write!(payload, "Hello world {}!", number).map_err(|_| Error::Encoding)?;
        let topic = filters[number as usize % TOPIC_COUNT];
        if let Some(packet_id) = session.publish(topic, payload.as_bytes(), QoS::AtLeastOnce)? {
            handler.track(packet_id, number);
        }

        if (number + 1) % burst_size == 0 {
            info!("Waiting for {} publishes to be received.", burst_size);
            for _ in 0..burst_size {
                session
                    .wait_until(&mut handler, |handler, _| handler.take_received())
                    .inspect_err(|_| error!("Timed out waiting for incoming PUBLISH messages."))?;
            }
            info!("{} publishes received.", burst_size);
        }
    }

    session.unsubscribe(&mut handler, &filters)?;
    info!("Demo topic filters unsubscribed.");
    Ok(())
}

/// Counts incoming publishes and acknowledges each one.
struct DemoHandler<'a> {
    ack_topic: &'a str,
    burst_size: u32,
    received: u32,
    in_flight: FnvIndexMap<u16, u32, MAX_TRACKED_PUBLISHES>,
}

impl<'a> DemoHandler<'a> {
    fn new(ack_topic: &'a str, burst_size: u32) -> Self {
        Self {
            ack_topic,
            burst_size,
            received: 0,
            in_flight: FnvIndexMap::new(),
        }
    }

    fn track(&mut self, packet_id: u16, number: u32) {
        if self.in_flight.insert(packet_id, number).is_err() {
            debug!("Not tracking PUBLISH {}; too many in flight", number);
        }
    }

    fn take_received(&mut self) -> Option<()> {
        if self.received == 0 {
            return None;
        }
        self.received -= 1;
        Some(())
    }
}

impl Handler for DemoHandler<'_> {
    fn on_publish<C: Connection>(
        &mut self,
        client: &mut Client<C>,
        filter: &str,
        publish: &PublishPacket,
    ) {
        let payload = core::str::from_utf8(&publish.payload).unwrap_or("<binary>");
        info!(
            "Incoming PUBLISH received:\nSubscription topic filter: {}\nPublish topic name: {}\nPublish retain flag: {}\nPublish QoS: {}\nPublish payload: {}",
            filter,
            publish.topic.as_str(),
            publish.retain,
            publish.qos as u8,
            payload
        );

        match message_number(payload) {
            Some(number) => {
                let mut ack: String<64> = String::new();
                let queued = write!(ack, "Client has received PUBLISH {} from server.", number)
                    .map_err(|_| crate::network::error::Error::BufferOverflow)
                    .and_then(|_| {
                        client.publish(self.ack_topic, ack.as_bytes(), QoS::AtLeastOnce, false)
                    });
                match queued {
                    Ok(_) => info!("Acknowledgment message for PUBLISH {} will be sent.", number),
                    Err(err) => warn!(
                        "Acknowledgment message for PUBLISH {} will NOT be sent: {:?}",
                        number, err
                    ),
                }
            }
            None => warn!("Incoming PUBLISH carries no message number."),
        }

        if self.received < self.burst_size {
            self.received += 1;
        }
    }

    fn on_complete(&mut self, packet_id: u16) {
        if let Some(number) = self.in_flight.remove(&packet_id) {
            info!("MQTT PUBLISH {} successfully sent.", number);
        }
    }
}
