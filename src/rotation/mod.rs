#![deny(unsafe_code)]

//! # Certificate rotation over MQTT
//!
//! The device asks the cloud for a new client certificate by publishing its
//! CSR and waits for the signed certificate on a response topic, all on
//! topics reserved for its serial number:
//!
//! | topic | direction | payload |
//! |---|---|---|
//! | `cdf/certificates/<serial>/requestCSR` | device → cloud | `{"serial":"…","csr":"<base64 PEM>"}` |
//! | `cdf/certificates/<serial>/responseCSR` | cloud → device | `{"certificate":"<base64 PEM>"}` or `{"error":"…"}` |
//! | `cdf/certificates/<serial>/ackCert` | device → cloud | `{"serial":"…","status":"received","crc32":…}` |
//!
//! PEM text is carried base64-encoded so the JSON strings never need
//! escaping.
//!
//! ## Design
//!
//! [`RotationAgent`] is a two-step state machine:
//!
//! * [`Step::GetCert`]: no certificate is pending; the next
//!   [`get_new_cloud_cert`](RotationAgent::get_new_cloud_cert) requests one.
//! * [`Step::AckCert`]: a certificate has been received and acknowledged and
//!   waits to be installed by [`rotate_cert`](RotationAgent::rotate_cert).
//!
//! Installing keeps the previous certificate so a certificate that turns out
//! not to work can be rolled back with
//! [`rollback`](RotationAgent::rollback).

use crate::config::DemoConfig;
use crate::credentials::{CERT_CAPACITY, CSR_CAPACITY, CredentialStore, RotationState};
use crate::demo::establish;
use crate::error::Error;
use crate::network::application::mqtt::{
    Client, Event, Handler, MAX_PAYLOAD_LEN, MAX_TOPIC_LEN, PublishPacket, QoS, Session,
};
use crate::network::error::Error as NetworkError;
use crate::network::{Connect, Connection};
use crate::pem::{self, Pem};
use crate::platform::Clock;
use base64ct::{Base64, Encoding};
use core::fmt::Write;
use heapless::String;
use serde::{Deserialize, Serialize};

/// Root of the certificate topics.
pub const CERT_TOPIC_ROOT: &str = "cdf/certificates";

/// Status reported in the certificate acknowledgement.
pub const ACK_STATUS_RECEIVED: &str = "received";

const ENCODED_CSR_LEN: usize = (CSR_CAPACITY + 2) / 3 * 4;
const REQUEST_LEN: usize = ENCODED_CSR_LEN + 256;
const ACK_LEN: usize = 256;
const DECODED_RESPONSE_LEN: usize = MAX_PAYLOAD_LEN / 4 * 3;

/// Where the rotation exchange stands.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Step {
    /// Waiting to request a certificate.
    GetCert,
    /// A certificate was received and acknowledged; it waits to be installed.
    AckCert,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Step {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Step::GetCert => defmt::write!(f, "GetCert"),
            Step::AckCert => defmt::write!(f, "AckCert"),
        }
    }
}

/// The three rotation topics of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationTopics {
    /// CSR requests are published here.
    pub request: String<MAX_TOPIC_LEN>,
    /// Certificates arrive here.
    pub response: String<MAX_TOPIC_LEN>,
    /// Acknowledgements are published here.
    pub ack: String<MAX_TOPIC_LEN>,
}

impl RotationTopics {
    /// Topics for the device with serial number `serial`.
    ///
    /// ```rust
    /// use iotdemo::rotation::RotationTopics;
    ///
    /// let topics = RotationTopics::new("SN-0001").unwrap();
    /// assert_eq!(topics.request.as_str(), "cdf/certificates/SN-0001/requestCSR");
    /// assert_eq!(topics.response.as_str(), "cdf/certificates/SN-0001/responseCSR");
    /// assert_eq!(topics.ack.as_str(), "cdf/certificates/SN-0001/ackCert");
    /// ```
    pub fn new(serial: &str) -> Result<Self, Error> {
        Ok(Self {
            request: Self::topic(serial, "requestCSR")?,
            response: Self::topic(serial, "responseCSR")?,
            ack: Self::topic(serial, "ackCert")?,
        })
    }

    fn topic(serial: &str, leaf: &str) -> Result<String<MAX_TOPIC_LEN>, Error> {
        let mut topic = String::new();
        write!(topic, "{}/{}/{}", CERT_TOPIC_ROOT, serial, leaf)
            .map_err(|_| Error::Network(NetworkError::InvalidTopic))?;
        Ok(topic)
    }
}

#[derive(Debug, Serialize)]
struct CsrRequest<'a> {
    serial: &'a str,
    csr: &'a str,
}

#[derive(Debug, Deserialize)]
struct CsrResponse<'a> {
    #[serde(default, borrow)]
    certificate: Option<&'a str>,
    #[serde(default, borrow)]
    error: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CertAck<'a> {
    serial: &'a str,
    status: &'a str,
    crc32: u32,
}

/// Encode the CSR request payload for `serial`.
pub fn encode_request<'b>(serial: &str, csr: &str, buf: &'b mut [u8]) -> Result<&'b [u8], Error> {
    let mut encoded = [0u8; ENCODED_CSR_LEN];
    let csr = Base64::encode(csr.as_bytes(), &mut encoded).map_err(|_| Error::Encoding)?;
    let len = serde_json_core::to_slice(&CsrRequest { serial, csr }, buf)
        .map_err(|_| Error::Encoding)?;
    Ok(&buf[..len])
}

/// Encode the acknowledgement of a certificate with fingerprint `crc32`.
pub fn encode_ack<'b>(serial: &str, crc32: u32, buf: &'b mut [u8]) -> Result<&'b [u8], Error> {
    let ack = CertAck {
        serial,
        status: ACK_STATUS_RECEIVED,
        crc32,
    };
    let len = serde_json_core::to_slice(&ack, buf).map_err(|_| Error::Encoding)?;
    Ok(&buf[..len])
}

/// Decode a certificate response into the PEM text of the certificate.
///
/// The certificate must be a PEM `CERTIFICATE` block that fits the
/// certificate slot.
pub fn decode_response<'b>(payload: &[u8], buf: &'b mut [u8]) -> Result<&'b str, Error> {
    let (response, _) =
        serde_json_core::from_slice::<CsrResponse<'_>>(payload).map_err(|_| Error::Encoding)?;

    let encoded = match (response.certificate, response.error) {
        (Some(certificate), _) => certificate,
        (None, Some(reason)) => {
            warn!("Cloud rejected the certificate request: {}", reason);
            return Err(Error::CertificateRejected);
        }
        (None, None) => return Err(Error::Encoding),
    };

    let decoded = Base64::decode(encoded, buf).map_err(|_| Error::Encoding)?;
    let certificate = core::str::from_utf8(decoded).map_err(|_| Error::Encoding)?;
    if certificate.len() >= CERT_CAPACITY {
        return Err(Error::Credentials(
            crate::credentials::Error::CapacityExceeded,
        ));
    }
    Pem::parse(certificate)?.expect_label(&[pem::CERTIFICATE])?;
    Ok(certificate)
}

/// Decodes certificate responses straight out of the incoming packet.
///
/// The certificate text of the most recent response sits at the start of
/// `scratch`; `response` holds its length or the reason it was unusable.
struct ResponseHandler<'b> {
    scratch: &'b mut [u8],
    response: Option<Result<usize, Error>>,
}

impl<'b> ResponseHandler<'b> {
    fn new(scratch: &'b mut [u8]) -> Self {
        Self {
            scratch,
            response: None,
        }
    }

    fn accept(&mut self, payload: &[u8]) {
        self.response = Some(decode_response(payload, self.scratch).map(str::len));
    }

    fn certificate(&self, len: usize) -> Result<&str, Error> {
        core::str::from_utf8(&self.scratch[..len]).map_err(|_| Error::Encoding)
    }
}

impl Handler for ResponseHandler<'_> {
    fn on_publish<C: Connection>(
        &mut self,
        _client: &mut Client<C>,
        _filter: &str,
        publish: &PublishPacket,
    ) {
        info!(
            "Certificate response received on {} ({} bytes).",
            publish.topic.as_str(),
            publish.payload.len()
        );
        self.accept(&publish.payload);
    }
}

/// What was installed before the last rotation.
#[derive(Debug, Clone)]
struct Previous {
    certificate: String<CERT_CAPACITY>,
    state: RotationState,
}

/// Drives certificate rotation for the credentials in `store`.
pub struct RotationAgent<S: CredentialStore> {
    /// The device's credentials.
    pub store: S,
    step: Step,
    pending: Option<String<CERT_CAPACITY>>,
    previous: Option<Previous>,
}

impl<S: CredentialStore> core::fmt::Debug for RotationAgent<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RotationAgent")
            .field("step", &self.step)
            .field("pending", &self.pending.is_some())
            .field("can_roll_back", &self.previous.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: CredentialStore> RotationAgent<S> {
    /// Creates a new agent over `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            step: Step::GetCert,
            pending: None,
            previous: None,
        }
    }

    /// Returns the current step of the exchange.
    pub fn step(&self) -> Step {
        self.step
    }

    /// The received certificate waiting to be installed, if any.
    pub fn pending_certificate(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Returns `true` while the certificate installed by the last rotation
    /// has not been confirmed with [`commit`](Self::commit).
    pub fn can_roll_back(&self) -> bool {
        self.previous.is_some()
    }

    /// Request a new cloud certificate and acknowledge it.
    ///
    /// Connects with the current credentials, subscribes to the response
    /// topic and publishes the CSR, retrying up to `retry_limit` times. A
    /// valid certificate becomes pending and the step advances to
    /// [`Step::AckCert`]. On failure nothing is pending and the step is back
    /// at [`Step::GetCert`].
    pub fn get_new_cloud_cert<N: Connect, K: Clock>(
        &mut self,
        config: &DemoConfig,
        network: &mut N,
        clock: &K,
    ) -> Result<(), Error> {
        self.step = Step::GetCert;
        self.pending = None;

        let topics = RotationTopics::new(self.store.serial_number())?;
        let mut session = establish(config, network, &self.store.credentials(), clock)?;

        let result = self.exchange(config, &mut session, &topics, clock);
        let disconnected = session.disconnect();

        if result.is_err() || disconnected.is_err() {
            self.step = Step::GetCert;
            self.pending = None;
        }
        result?;
        disconnected?;
        Ok(())
    }

    fn exchange<C: Connection, K: Clock>(
        &mut self,
        config: &DemoConfig,
        session: &mut Session<'_, C, K>,
        topics: &RotationTopics,
        clock: &K,
    ) -> Result<(), Error> {
        let mut scratch = [0u8; DECODED_RESPONSE_LEN];
        let mut handler = ResponseHandler::new(&mut scratch);

        session.subscribe(&mut handler, &[topics.response.as_str()], QoS::AtLeastOnce)?;
        if !session.is_subscribed(&topics.response) {
            error!(
                "Subscription to {} was rejected.",
                topics.response.as_str()
            );
            return Err(Error::SubscriptionRefused);
        }

        let mut request_buf = [0u8; REQUEST_LEN];
        let request = encode_request(self.store.serial_number(), self.store.csr(), &mut request_buf)?;

        let attempts = config.retry_limit.max(1);
        let mut attempt = 0;
        let len = loop {
            attempt += 1;
            info!(
                "Requesting a new certificate (attempt {} of {}).",
                attempt, attempts
            );
            session.publish(&topics.request, request, QoS::AtLeastOnce)?;

            match session.wait_until(&mut handler, |handler, _| handler.response.take()) {
                Ok(decoded) => break decoded?,
                Err(NetworkError::Timeout) if attempt < attempts => {
                    warn!("No certificate response yet, retrying.");
                    clock.sleep_ms(config.retry_ms);
                }
                Err(NetworkError::Timeout) => {
                    error!("No certificate response after {} attempts.", attempts);
                    return Err(Error::NoCertificateResponse);
                }
                Err(err) => return Err(err.into()),
            }
        };

        let certificate = handler.certificate(len)?;
        let fingerprint = Pem::parse(certificate)?.fingerprint()?;
        let pending = String::try_from(certificate)
            .map_err(|_| Error::Credentials(crate::credentials::Error::CapacityExceeded))?;
        self.pending = Some(pending);
        self.step = Step::AckCert;
        info!("New certificate received, fingerprint {:x}.", fingerprint);

        let mut ack_buf = [0u8; ACK_LEN];
        let ack = encode_ack(self.store.serial_number(), fingerprint, &mut ack_buf)?;
        let packet_id = session
            .publish(&topics.ack, ack, QoS::AtLeastOnce)?
            .ok_or(Error::Network(NetworkError::ProtocolError))?;
        session.wait_until(&mut handler, |_, event| match event {
            Some(Event::PubAck(id)) if *id == packet_id => Some(()),
            _ => None,
        })?;
        info!("Certificate acknowledgement delivered.");

        session.unsubscribe(&mut handler, &[topics.response.as_str()])?;
        Ok(())
    }

    /// Install the pending certificate.
    ///
    /// The certificate it replaces is kept for [`rollback`](Self::rollback).
    pub fn rotate_cert(&mut self) -> Result<(), Error> {
        let pending = self.pending.as_ref().ok_or(Error::NoPendingCertificate)?;

        let previous = Previous {
            certificate: String::try_from(self.store.device_cert())
                .map_err(|_| Error::Credentials(crate::credentials::Error::CapacityExceeded))?,
            state: self.store.read_state(),
        };
        self.store.put_device_cert(pending)?;
        if let Err(err) = self.store.write_state(RotationState::CloudCert) {
            self.store.put_device_cert(&previous.certificate)?;
            return Err(err.into());
        }

        if let Some(fingerprint) = pem::fingerprint(pending) {
            info!("Device certificate rotated, fingerprint {:x}.", fingerprint);
        }
        self.previous = Some(previous);
        self.pending = None;
        self.step = Step::GetCert;
        Ok(())
    }

    /// Confirm the certificate installed by the last rotation.
    pub fn commit(&mut self) {
        self.previous = None;
    }

    /// Restore the certificate the last rotation replaced.
    ///
    /// Returns `false` when there is nothing to roll back to.
    pub fn rollback(&mut self) -> Result<bool, Error> {
        let Some(previous) = self.previous.take() else {
            return Ok(false);
        };
        self.store.put_device_cert(&previous.certificate)?;
        self.store.write_state(previous.state)?;
        warn!("Device certificate rolled back to the previous one.");
        Ok(true)
    }
}
