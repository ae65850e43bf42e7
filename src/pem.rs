//! Minimal PEM handling for device credentials.
//!
//! Only what the demo needs: split a single PEM block into its label and
//! base64 body, check the label, decode the body, and fingerprint the
//! decoded DER with CRC-32 so certificates can be told apart in logs and
//! acknowledged to the cloud without ever echoing their contents.

use base64ct::{Base64, Encoding};

/// Label of an X.509 certificate.
pub const CERTIFICATE: &str = "CERTIFICATE";

/// Labels accepted for a certificate signing request.
pub const CERTIFICATE_REQUEST: &[&str] = &["CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST"];

/// Labels accepted for a private key.
pub const PRIVATE_KEY: &[&str] = &["PRIVATE KEY", "RSA PRIVATE KEY", "EC PRIVATE KEY"];

const BEGIN: &str = "-----BEGIN ";
const END: &str = "-----END ";
const DASHES: &str = "-----";

/// Errors raised while handling PEM text.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// No `-----BEGIN <label>-----` line.
    MissingBegin,
    /// No matching `-----END <label>-----` line.
    MissingEnd,
    /// The END label differs from the BEGIN label.
    LabelMismatch,
    /// The block carries a label the caller did not ask for.
    UnexpectedLabel,
    /// The body is not valid base64.
    InvalidBase64,
    /// The decoded body does not fit the caller's buffer.
    BufferTooSmall,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::MissingBegin => defmt::write!(f, "MissingBegin"),
            Error::MissingEnd => defmt::write!(f, "MissingEnd"),
            Error::LabelMismatch => defmt::write!(f, "LabelMismatch"),
            Error::UnexpectedLabel => defmt::write!(f, "UnexpectedLabel"),
            Error::InvalidBase64 => defmt::write!(f, "InvalidBase64"),
            Error::BufferTooSmall => defmt::write!(f, "BufferTooSmall"),
        }
    }
}

/// A borrowed PEM block.
///
/// ```rust
/// use iotdemo::pem::{Pem, CERTIFICATE};
///
/// let text = "-----BEGIN CERTIFICATE-----\nZGV2aWNlLWNlcnQtdjE=\n-----END CERTIFICATE-----\n";
/// let pem = Pem::parse(text).unwrap().expect_label(&[CERTIFICATE]).unwrap();
///
/// let mut der = [0u8; 32];
/// assert_eq!(pem.decode(&mut der).unwrap(), b"device-cert-v1");
/// assert_eq!(pem.fingerprint().unwrap(), crc32fast::hash(b"device-cert-v1"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pem<'a> {
    label: &'a str,
    body: &'a str,
}

impl<'a> Pem<'a> {
    /// Split `text` into label and body.
    ///
    /// Surrounding whitespace is ignored; anything else outside the block
    /// is rejected.
    pub fn parse(text: &'a str) -> Result<Self, Error> {
        let rest = text.trim().strip_prefix(BEGIN).ok_or(Error::MissingBegin)?;
        let (label, rest) = rest.split_once(DASHES).ok_or(Error::MissingBegin)?;
        let end = rest.find(END).ok_or(Error::MissingEnd)?;
        let end_label = rest[end + END.len()..]
            .strip_suffix(DASHES)
            .ok_or(Error::MissingEnd)?;
        if end_label != label {
            return Err(Error::LabelMismatch);
        }
        Ok(Self {
            label,
            body: &rest[..end],
        })
    }

    /// The label between `BEGIN` and the closing dashes.
    pub fn label(&self) -> &'a str {
        self.label
    }

    /// The raw base64 body, line breaks included.
    pub fn body(&self) -> &'a str {
        self.body
    }

    /// Pass the block through only if its label is one of `labels`.
    pub fn expect_label(self, labels: &[&str]) -> Result<Self, Error> {
        if labels.contains(&self.label) {
            Ok(self)
        } else {
            Err(Error::UnexpectedLabel)
        }
    }

    /// Decode the body into `buf` and return the DER bytes.
    pub fn decode<'b>(&self, buf: &'b mut [u8]) -> Result<&'b [u8], Error> {
        let mut len = 0;
        for byte in self.body.bytes().filter(|b| !b.is_ascii_whitespace()) {
            let slot = buf.get_mut(len).ok_or(Error::BufferTooSmall)?;
            *slot = byte;
            len += 1;
        }
        Base64::decode_in_place(&mut buf[..len]).map_err(|_| Error::InvalidBase64)
    }

    /// CRC-32 of the decoded body.
    ///
    /// Decodes one base64 quantum at a time so no DER-sized buffer is needed.
    /// Accepts exactly what [`decode`](Self::decode) accepts: padding may
    /// only close the final quantum.
    pub fn fingerprint(&self) -> Result<u32, Error> {
        let mut hasher = crc32fast::Hasher::new();
        let mut quantum = [0u8; 4];
        let mut filled = 0;
        let mut padded = false;
        for byte in self.body.bytes().filter(|b| !b.is_ascii_whitespace()) {
            if padded {
                return Err(Error::InvalidBase64);
            }
            quantum[filled] = byte;
            filled += 1;
            if filled == quantum.len() {
                let mut decoded = [0u8; 3];
                let bytes =
                    Base64::decode(&quantum, &mut decoded).map_err(|_| Error::InvalidBase64)?;
                hasher.update(bytes);
                padded = quantum.contains(&b'=');
                filled = 0;
            }
        }
        if filled != 0 {
            return Err(Error::InvalidBase64);
        }
        Ok(hasher.finalize())
    }
}

/// Fingerprint of PEM `text`, or `None` when it does not parse.
pub fn fingerprint(text: &str) -> Option<u32> {
    Pem::parse(text).and_then(|pem| pem.fingerprint()).ok()
}
