//! Crate-level error type.

use crate::{config, credentials, network, pem};

/// Everything that can stop a demo round or a rotation.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The MQTT exchange failed.
    Network(network::error::Error),
    /// The transport could not open a connection.
    Transport,
    /// The broker refused at least one subscription.
    SubscriptionRefused,
    /// Reading or writing credentials failed.
    Credentials(credentials::Error),
    /// A certificate is not usable PEM.
    Pem(pem::Error),
    /// The configuration is invalid.
    Config(config::Error),
    /// A rotation message could not be encoded or decoded.
    Encoding,
    /// No certificate response arrived within the retry limit.
    NoCertificateResponse,
    /// The cloud answered the CSR with an error.
    CertificateRejected,
    /// There is no new certificate waiting to be installed.
    NoPendingCertificate,
    /// The certificate installed by the last rotation does not work; the
    /// previous one has been restored.
    RotatedCertificateRejected,
}

impl From<network::error::Error> for Error {
    fn from(err: network::error::Error) -> Self {
        Error::Network(err)
    }
}

impl From<credentials::Error> for Error {
    fn from(err: credentials::Error) -> Self {
        Error::Credentials(err)
    }
}

impl From<pem::Error> for Error {
    fn from(err: pem::Error) -> Self {
        Error::Pem(err)
    }
}

impl From<config::Error> for Error {
    fn from(err: config::Error) -> Self {
        Error::Config(err)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Network(err) => defmt::write!(f, "Network({})", err),
            Error::Transport => defmt::write!(f, "Transport"),
            Error::SubscriptionRefused => defmt::write!(f, "SubscriptionRefused"),
            Error::Credentials(err) => defmt::write!(f, "Credentials({})", err),
            Error::Pem(err) => defmt::write!(f, "Pem({})", err),
            Error::Config(err) => defmt::write!(f, "Config({})", err),
            Error::Encoding => defmt::write!(f, "Encoding"),
            Error::NoCertificateResponse => defmt::write!(f, "NoCertificateResponse"),
            Error::CertificateRejected => defmt::write!(f, "CertificateRejected"),
            Error::NoPendingCertificate => defmt::write!(f, "NoPendingCertificate"),
            Error::RotatedCertificateRejected => defmt::write!(f, "RotatedCertificateRejected"),
        }
    }
}
