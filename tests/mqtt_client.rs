mod common;

use common::*;
use iotdemo::network::application::mqtt::{
    Client, Event, Handler, LastWill, Options, PublishPacket, QoS, Session, SubscribeReturnCode,
};
use iotdemo::network::error::Error;
use iotdemo::network::{Close, Connect, Connection, Read, Write};
use iotdemo::platform::Clock;
use std::collections::VecDeque;

#[derive(Default)]
struct Recorder {
    received: Vec<(String, String, String)>,
    completed: Vec<u16>,
}

impl Handler for Recorder {
    fn on_publish<C: Connection>(
        &mut self,
        _client: &mut Client<C>,
        filter: &str,
        publish: &PublishPacket,
    ) {
        self.received.push((
            filter.to_string(),
            publish.topic.to_string(),
            String::from_utf8(publish.payload.to_vec()).unwrap(),
        ));
    }

    fn on_complete(&mut self, packet_id: u16) {
        self.completed.push(packet_id);
    }
}

fn drain_events(client: &mut Client<MockConnection>) -> Vec<Event> {
    let mut events = Vec::new();
    for _ in 0..16 {
        if let Some(event) = client.poll().unwrap() {
            events.push(event);
        }
    }
    events
}

#[test]
fn connect_sends_client_id_and_will() {
    let mut network = MockNetwork::new();
    let connection = network.connect(&SERVER, &credentials(CERT_V1)).unwrap();
    let options = Options {
        client_id: "iotdemo42",
        keep_alive_seconds: 60,
        clean_session: true,
        will: Some(LastWill {
            topic: "iotdemo/will",
            message: b"MQTT demo unexpectedly disconnected.",
            qos: QoS::AtMostOnce,
            retain: false,
        }),
    };
    let client = Client::connect(connection, &options, &MockClock::default(), 5000).unwrap();

    {
        let broker = network.broker();
        let record = &broker.connects[0];
        assert_eq!(record.client_id, "iotdemo42");
        assert_eq!(record.keep_alive, 60);
        assert!(record.clean_session);
        assert_eq!(record.will_topic.as_deref(), Some("iotdemo/will"));
        assert_eq!(
            record.will_message.as_deref(),
            Some(&b"MQTT demo unexpectedly disconnected."[..])
        );
        assert_eq!(record.certificate, CERT_V1);
    }

    client.disconnect().unwrap();
    assert_eq!(network.broker().disconnects, 1);
    assert_eq!(network.broker().closes, 1);
}

#[test]
fn refused_connack_is_reported() {
    let mut network = MockNetwork::new();
    network.broker().refused_certificates.push(CERT_V1.to_string());
    let connection = network.connect(&SERVER, &credentials(CERT_V1)).unwrap();
    let options = Options {
        client_id: "iotdemo42",
        keep_alive_seconds: 60,
        clean_session: true,
        will: None,
    };
    assert_eq!(
        Client::connect(connection, &options, &MockClock::default(), 5000).err(),
        Some(Error::ConnectionRefused)
    );
}

#[test]
fn qos1_publish_is_acknowledged_and_echoed() {
    let mut network = MockNetwork::new();
    let mut client = connect_client(&mut network, "iotdemo-qos1");

    let sub_id = client.subscribe(&[("iotdemo/topic/+", QoS::AtLeastOnce)]).unwrap();
    let pub_id = client
        .publish("iotdemo/topic/1", b"Hello world 0!", QoS::AtLeastOnce, false)
        .unwrap()
        .unwrap();

    let events = drain_events(&mut client);
    assert!(matches!(&events[0], Event::SubAck(ack) if ack.packet_id == sub_id));
    assert_eq!(events[1], Event::PubAck(pub_id));
    match &events[2] {
        Event::Publish(publish) => {
            assert_eq!(publish.topic.as_str(), "iotdemo/topic/1");
            assert_eq!(&publish.payload[..], b"Hello world 0!");
            assert_eq!(publish.qos, QoS::AtLeastOnce);
        }
        other => panic!("expected a publish, got {other:?}"),
    }
}

#[test]
fn qos2_publish_completes_after_pubrel() {
    let mut network = MockNetwork::new();
    let mut client = connect_client(&mut network, "iotdemo-qos2");

    let id = client
        .publish("iotdemo/qos2", b"exactly once", QoS::ExactlyOnce, false)
        .unwrap()
        .unwrap();
    let events = drain_events(&mut client);
    assert_eq!(events, vec![Event::PubRec(id), Event::PubComp(id)]);
}

#[test]
fn incoming_qos2_publish_is_released_and_completed() {
    let mut network = MockNetwork::new();
    network.broker().delivery_qos = 2;
    let mut client = connect_client(&mut network, "iotdemo-qos2-in");

    client.subscribe(&[("iotdemo/qos2", QoS::ExactlyOnce)]).unwrap();
    client
        .publish("iotdemo/qos2", b"once only", QoS::AtMostOnce, false)
        .unwrap();

    let events = drain_events(&mut client);
    assert!(matches!(&events[0], Event::SubAck(_)));
    let delivered = match &events[1] {
        Event::Publish(publish) => {
            assert_eq!(publish.qos, QoS::ExactlyOnce);
            assert_eq!(&publish.payload[..], b"once only");
            publish.packet_id.unwrap()
        }
        other => panic!("expected a publish, got {other:?}"),
    };
    // PUBREC went out with the publish, PUBCOMP with the release
    assert_eq!(events[2], Event::PubRel(delivered));
    assert_eq!(events.len(), 3);
    assert_eq!(network.broker().completed, vec![delivered]);
}

#[test]
fn qos0_publish_has_no_packet_id() {
    let mut network = MockNetwork::new();
    let mut client = connect_client(&mut network, "iotdemo-qos0");
    assert_eq!(
        client.publish("iotdemo/qos0", b"fire and forget", QoS::AtMostOnce, false),
        Ok(None)
    );
    assert_eq!(network.broker().published[0].qos, 0);
}

#[test]
fn invalid_topics_are_rejected_before_sending() {
    let mut network = MockNetwork::new();
    let mut client = connect_client(&mut network, "iotdemo-topics");

    assert_eq!(
        client.publish("iotdemo/+", b"x", QoS::AtMostOnce, false),
        Err(Error::InvalidTopic)
    );
    assert_eq!(client.subscribe(&[("iotdemo/#/x", QoS::AtMostOnce)]), Err(Error::InvalidTopic));
    assert_eq!(client.subscribe(&[]), Err(Error::InvalidTopic));
    assert!(network.broker().published.is_empty());
    assert!(network.broker().subscriptions.is_empty());
}

#[test]
fn packet_ids_skip_zero() {
    let mut network = MockNetwork::new();
    let mut client = connect_client(&mut network, "iotdemo-ids");
    let mut last = 0;
    for _ in 0..3 {
        let id = client
            .publish("iotdemo/ids", b"", QoS::AtLeastOnce, false)
            .unwrap()
            .unwrap();
        assert_ne!(id, 0);
        assert_ne!(id, last);
        last = id;
    }
}

#[test]
fn session_tracks_granted_filters() {
    let mut network = MockNetwork::new();
    network
        .broker()
        .refused_filters
        .push("iotdemo/topic/2".to_string());
    let clock = MockClock::default();
    let client = connect_client(&mut network, "iotdemo-session");
    let mut session = Session::new(client, &clock, 5000, 60);
    let mut recorder = Recorder::default();

    let ack = session
        .subscribe(
            &mut recorder,
            &["iotdemo/topic/1", "iotdemo/topic/2"],
            QoS::AtLeastOnce,
        )
        .unwrap();
    assert_eq!(
        &ack.return_codes[..],
        &[
            SubscribeReturnCode::Success(QoS::AtLeastOnce),
            SubscribeReturnCode::Failure
        ]
    );
    assert!(session.is_subscribed("iotdemo/topic/1"));
    assert!(!session.is_subscribed("iotdemo/topic/2"));

    session.unsubscribe(&mut recorder, &["iotdemo/topic/1"]).unwrap();
    assert!(!session.is_subscribed("iotdemo/topic/1"));
    assert_eq!(network.broker().unsubscribed, vec!["iotdemo/topic/1".to_string()]);
}

#[test]
fn session_dispatches_publishes_with_matching_filter() {
    let mut network = MockNetwork::new();
    let clock = MockClock::default();
    let client = connect_client(&mut network, "iotdemo-dispatch");
    let mut session = Session::new(client, &clock, 5000, 60);
    let mut recorder = Recorder::default();

    session
        .subscribe(&mut recorder, &["iotdemo/topic/+"], QoS::AtLeastOnce)
        .unwrap();
    let id = session
        .publish("iotdemo/topic/3", b"Hello world 3!", QoS::AtLeastOnce)
        .unwrap()
        .unwrap();
    session
        .wait_until(&mut recorder, |recorder, _| {
            (!recorder.received.is_empty()).then_some(())
        })
        .unwrap();

    assert_eq!(
        recorder.received,
        vec![(
            "iotdemo/topic/+".to_string(),
            "iotdemo/topic/3".to_string(),
            "Hello world 3!".to_string()
        )]
    );
    assert_eq!(recorder.completed, vec![id]);
    // no time passes while events keep arriving
    assert_eq!(clock.now_ms(), 0);
}

#[test]
fn session_wait_times_out_and_keeps_connection_alive() {
    let mut network = MockNetwork::new();
    let clock = MockClock::at(1_000);
    let client = connect_client(&mut network, "iotdemo-keepalive");
    let mut session = Session::new(client, &clock, 5000, 1);
    let mut recorder = Recorder::default();

    let result = session.wait_until(&mut recorder, |_, _| None::<()>);
    assert_eq!(result, Err(Error::Timeout));
    assert!(clock.now_ms() >= 6_000);
    assert!(network.broker().pings >= 4);

    session.disconnect().unwrap();
}

#[test]
fn packet_split_across_reads_waits_for_the_rest() {
    let mut network = MockNetwork::new();
    let clock = MockClock::default();
    let client = connect_client(&mut network, "iotdemo-split");
    let mut session = Session::new(client, &clock, 5000, 0);
    let mut recorder = Recorder::default();
    session
        .subscribe(&mut recorder, &["iotdemo/split"], QoS::AtMostOnce)
        .unwrap();

    let mut body = Vec::new();
    body.extend_from_slice(&13u16.to_be_bytes());
    body.extend_from_slice(b"iotdemo/split");
    body.extend_from_slice(b"certificate-sized payload");
    let publish = packet(0x30, &body);
    let (head, tail) = publish.split_at(10);

    network.broker().inject(head);
    let waited = session.wait_until(&mut recorder, |recorder, _| {
        (!recorder.received.is_empty()).then_some(())
    });
    assert_eq!(waited, Err(Error::Timeout));
    assert!(clock.now_ms() >= 5000);
    assert!(recorder.received.is_empty());

    network.broker().inject(tail);
    session
        .wait_until(&mut recorder, |recorder, _| {
            (!recorder.received.is_empty()).then_some(())
        })
        .unwrap();
    assert_eq!(
        recorder.received[0].2,
        "certificate-sized payload".to_string()
    );
}

#[test]
fn oversized_incoming_packet_is_rejected() {
    let mut network = MockNetwork::new();
    let mut client = connect_client(&mut network, "iotdemo-oversized");

    // PUBLISH announcing a 5000 byte body
    network.broker().inject(&[0x30, 0x88, 0x27]);
    assert_eq!(client.poll(), Err(Error::PacketTooLarge));
}

/// Stays silent for a number of reads before the CONNACK shows up, the way
/// a non-blocking stack does while the broker is still answering.
struct SlowBroker {
    empty_reads: usize,
    inbound: VecDeque<u8>,
}

impl SlowBroker {
    fn new(empty_reads: usize, connack: Option<[u8; 4]>) -> Self {
        Self {
            empty_reads,
            inbound: connack.map(VecDeque::from).unwrap_or_default(),
        }
    }
}

impl Read for SlowBroker {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.empty_reads > 0 {
            self.empty_reads -= 1;
            return Ok(0);
        }
        let len = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..len)) {
            *slot = byte;
        }
        Ok(len)
    }
}

impl Write for SlowBroker {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Close for SlowBroker {
    type Error = Error;

    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Connection for SlowBroker {}

fn plain_options() -> Options<'static> {
    Options {
        client_id: "iotdemo-slow",
        keep_alive_seconds: 60,
        clean_session: true,
        will: None,
    }
}

#[test]
fn connack_after_many_empty_reads_is_accepted() {
    let clock = MockClock::default();
    let broker = SlowBroker::new(150, Some([0x20, 0x02, 0x00, 0x00]));

    let client = Client::connect(broker, &plain_options(), &clock, 5000);

    assert!(client.is_ok());
    assert!(clock.now_ms() >= 1000);
    assert!(clock.now_ms() < 5000);
}

#[test]
fn missing_connack_times_out_on_the_clock() {
    let clock = MockClock::at(100);
    let broker = SlowBroker::new(usize::MAX, None);

    let result = Client::connect(broker, &plain_options(), &clock, 3000);

    assert_eq!(result.err(), Some(Error::Timeout));
    assert!(clock.now_ms() >= 3100);
}
