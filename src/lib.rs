//! # iotdemo - MQTT demo driver with certificate rotation
//!
//! A demonstration of an embedded MQTT client stack: connect to a broker,
//! subscribe, publish bursts of messages and receive them back with their
//! acknowledgements. On top of that the device rotates its TLS client
//! certificate by exchanging its CSR for a new certificate with a cloud
//! endpoint over reserved MQTT topics.
//!
//! The library is `no_std` and allocation-free; everything platform specific
//! sits behind a trait:
//!
//! - [`network::Connect`] / [`network::Connection`]: the transport (TCP, TLS, modem)
//! - [`platform::Clock`]: time and sleeping
//! - [`credentials::CredentialStore`]: where certificates and keys live
//!
//! ## Modules
//!
//! - [`network::application::mqtt`]: the MQTT 3.1.1 client and session
//! - [`demo`]: one demo round, used to check the current certificate
//! - [`rotation`]: the certificate rotation state machine
//! - [`runner`]: the loop that ties demo rounds and rotation together
//! - [`config`]: demo settings and their defaults
//! - [`pem`]: PEM parsing and fingerprints
//!
//! ## Usage
//!
//! ```rust,no_run
//! # #[cfg(feature = "std")]
//! # fn main() -> Result<(), iotdemo::error::Error> {
//! use iotdemo::config::DemoConfig;
//! use iotdemo::credentials::{provision, Provisioning, RamCredentialStore};
//! use iotdemo::rotation::RotationAgent;
//! use iotdemo::std_support::{StdClock, TcpNetwork};
//!
//! # let (cert, key, csr) = ("", "", "");
//! let config = DemoConfig::default();
//! let mut agent = RotationAgent::new(RamCredentialStore::new());
//! provision(&mut agent.store, &Provisioning::new(cert, key, csr, "SN-0001"))?;
//!
//! iotdemo::runner::run(&config, &mut TcpNetwork::default(), &mut agent, &StdClock::new())?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "std"))]
//! # fn main() {}
//! ```
//!
//! ## Optional Features
//!
//! - `std`: host transport and clock, `.env` configuration, the `iotdemo` binary
//! - `log`: log through the `log` crate (enabled by `std`)
//! - `defmt`: log through `defmt` for embedded debugging

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

// must stay first so the logging macros are visible to every module
#[macro_use]
mod fmt;

/// Transport traits and the MQTT client built on them.
pub mod network;

/// Platform services: time.
pub mod platform;

/// Demo configuration.
pub mod config;

/// PEM parsing and fingerprints.
pub mod pem;

/// Device credentials and rotation state.
pub mod credentials;

/// The MQTT demo round.
pub mod demo;

/// Certificate rotation over MQTT.
pub mod rotation;

/// The top-level demo loop.
pub mod runner;

/// Crate-level error type.
pub mod error;

/// Host transport, clock and credential loading.
#[cfg(feature = "std")]
pub mod std_support;

pub use error::Error;
