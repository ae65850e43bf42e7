//! Demo configuration.
//!
//! Defaults mirror the classic IoT SDK MQTT demo. Every field can be set
//! from text with [`DemoConfig::apply`], which is all a device needs to read
//! overrides from a provisioning blob. With the `std` feature
//! [`DemoConfig::from_env`] reads `IOTDEMO_<KEY>` variables, optionally from
//! a `.env` file.

use heapless::String;

/// Longest broker host name.
pub const MAX_HOST_LEN: usize = 128;
/// Longest client identifier every MQTT 3.1.1 broker must accept.
pub const MAX_CLIENT_ID_LEN: usize = 23;
/// Longest topic prefix.
pub const MAX_PREFIX_LEN: usize = 64;
/// Longest serial number.
pub const MAX_SERIAL_LEN: usize = 79;

/// Every key understood by [`DemoConfig::apply`].
pub const KEYS: &[&str] = &[
    "host",
    "port",
    "client_id",
    "topic_prefix",
    "publish_burst_size",
    "publish_burst_count",
    "keep_alive_seconds",
    "mqtt_timeout_ms",
    "retry_limit",
    "retry_ms",
    "rotation_delay_ms",
    "rotation_enabled",
    "iterations",
    "serial_number",
];

/// Configuration errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The key is not one of [`KEYS`].
    UnknownKey,
    /// The value could not be parsed for its key.
    InvalidValue,
    /// The value is longer than the field allows.
    TooLong,
    /// Burst size and burst count must both be positive.
    ZeroBurst,
    /// A run limit of zero iterations.
    ZeroIterations,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::UnknownKey => defmt::write!(f, "UnknownKey"),
            Error::InvalidValue => defmt::write!(f, "InvalidValue"),
            Error::TooLong => defmt::write!(f, "TooLong"),
            Error::ZeroBurst => defmt::write!(f, "ZeroBurst"),
            Error::ZeroIterations => defmt::write!(f, "ZeroIterations"),
        }
    }
}

/// Settings of one demo run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    /// Broker host name.
    pub host: String<MAX_HOST_LEN>,
    /// Broker port.
    pub port: u16,
    /// Fixed client identifier; generated from the clock when `None`.
    pub client_id: Option<String<MAX_CLIENT_ID_LEN>>,
    /// First level of every demo topic.
    pub topic_prefix: String<MAX_PREFIX_LEN>,
    /// Messages per burst.
    pub publish_burst_size: u32,
    /// Number of bursts.
    pub publish_burst_count: u32,
    /// MQTT keep-alive interval.
    pub keep_alive_seconds: u16,
    /// Upper bound of every wait on the broker.
    pub mqtt_timeout_ms: u64,
    /// Attempts made to obtain a new certificate.
    pub retry_limit: u32,
    /// Pause between certificate requests.
    pub retry_ms: u64,
    /// Pause between demo rounds.
    pub rotation_delay_ms: u64,
    /// Whether to rotate the certificate after every successful round.
    pub rotation_enabled: bool,
    /// Number of rounds; `None` runs forever.
    pub iterations: Option<u32>,
    /// Serial number to provision with.
    pub serial_number: Option<String<MAX_SERIAL_LEN>>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            host: fixed("localhost"),
            port: 1883,
            client_id: None,
            topic_prefix: fixed("iotdemo"),
            publish_burst_size: 10,
            publish_burst_count: 10,
            keep_alive_seconds: 60,
            mqtt_timeout_ms: 5000,
            retry_limit: 10,
            retry_ms: 1000,
            rotation_delay_ms: 20_000,
            rotation_enabled: true,
            iterations: None,
            serial_number: None,
        }
    }
}

fn fixed<const N: usize>(value: &str) -> String<N> {
    let mut out = String::new();
    for c in value.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

fn text<const N: usize>(value: &str) -> Result<String<N>, Error> {
    String::try_from(value).map_err(|_| Error::TooLong)
}

fn optional_text<const N: usize>(value: &str) -> Result<Option<String<N>>, Error> {
    if value.is_empty() {
        Ok(None)
    } else {
        text(value).map(Some)
    }
}

fn number<T: core::str::FromStr>(value: &str) -> Result<T, Error> {
    value.parse().map_err(|_| Error::InvalidValue)
}

fn flag(value: &str) -> Result<bool, Error> {
    match value {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidValue),
    }
}

impl DemoConfig {
    /// Set the field named `key` from its text form.
    ///
    /// Optional fields are cleared by an empty value.
    ///
    /// ```rust
    /// use iotdemo::config::DemoConfig;
    ///
    /// let mut config = DemoConfig::default();
    /// config.apply("port", "8883").unwrap();
    /// config.apply("rotation_enabled", "false").unwrap();
    /// assert_eq!(config.port, 8883);
    /// assert!(!config.rotation_enabled);
    /// assert!(config.apply("colour", "blue").is_err());
    /// ```
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let value = value.trim();
        match key {
            "host" => self.host = text(value)?,
            "port" => self.port = number(value)?,
            "client_id" => self.client_id = optional_text(value)?,
            "topic_prefix" => self.topic_prefix = text(value)?,
            "publish_burst_size" => self.publish_burst_size = number(value)?,
            "publish_burst_count" => self.publish_burst_count = number(value)?,
            "keep_alive_seconds" => self.keep_alive_seconds = number(value)?,
            "mqtt_timeout_ms" => self.mqtt_timeout_ms = number(value)?,
            "retry_limit" => self.retry_limit = number(value)?,
            "retry_ms" => self.retry_ms = number(value)?,
            "rotation_delay_ms" => self.rotation_delay_ms = number(value)?,
            "rotation_enabled" => self.rotation_enabled = flag(value)?,
            "iterations" if value.is_empty() => self.iterations = None,
            "iterations" => self.iterations = Some(number(value)?),
            "serial_number" => self.serial_number = optional_text(value)?,
            _ => return Err(Error::UnknownKey),
        }
        Ok(())
    }

    /// Check the settings that have no sensible zero.
    pub fn validate(&self) -> Result<(), Error> {
        if self.publish_burst_size == 0 || self.publish_burst_count == 0 {
            return Err(Error::ZeroBurst);
        }
        if self.iterations == Some(0) {
            return Err(Error::ZeroIterations);
        }
        if self.host.is_empty() || self.topic_prefix.is_empty() {
            return Err(Error::InvalidValue);
        }
        Ok(())
    }

    /// Defaults overridden by `IOTDEMO_<KEY>` environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    #[cfg(feature = "std")]
    pub fn from_env() -> Result<Self, Error> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        for key in KEYS {
            let name = std::format!("IOTDEMO_{}", key.to_ascii_uppercase());
            if let Ok(value) = std::env::var(&name) {
                config.apply(key, &value).inspect_err(|_| {
                    error!("Invalid value for {}", name.as_str());
                })?;
            }
        }
        config.validate()?;
        Ok(config)
    }
}
