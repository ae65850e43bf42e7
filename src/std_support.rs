//! Host implementations of the platform seams.
//!
//! [`TcpNetwork`] is plaintext TCP: good enough against a local broker,
//! but it does not present the device credentials. A TLS transport
//! implements the same [`Connect`] trait.

use crate::credentials::{Provisioning, RotationState};
use crate::network::{Close, Connect, Connection, Credentials, Read, ServerInfo, Write};
use crate::platform::Clock;
use std::io::{self, ErrorKind, Read as _, Write as _};
use std::net::{Shutdown, TcpStream};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Read timeout after which a read reports "no data".
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Opens plaintext TCP connections.
#[derive(Debug, Clone)]
pub struct TcpNetwork {
    read_timeout: Duration,
}

impl TcpNetwork {
    /// Creates a network whose reads give up after `read_timeout`.
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl Default for TcpNetwork {
    fn default() -> Self {
        Self::new(DEFAULT_READ_TIMEOUT)
    }
}

impl Connect for TcpNetwork {
    type Connection = TcpConnection;
    type Error = io::Error;

    fn connect(
        &mut self,
        server: &ServerInfo<'_>,
        credentials: &Credentials<'_>,
    ) -> Result<Self::Connection, Self::Error> {
        if !credentials.certificate.is_empty() {
            warn!(
                "Plaintext TCP to {}:{}; the device certificate is not presented.",
                server.host, server.port
            );
        }
        let stream = TcpStream::connect((server.host, server.port))?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        stream.set_nodelay(true)?;
        debug!("Connected to {}:{}", server.host, server.port);
        Ok(TcpConnection { stream })
    }
}

/// A TCP stream behind the crate's [`Connection`] traits.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
}

impl Read for TcpConnection {
    type Error = io::Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.stream.read(buf) {
            Ok(0) => Err(io::Error::from(ErrorKind::UnexpectedEof)),
            Ok(n) => Ok(n),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(0),
            Err(err) => Err(err),
        }
    }
}

impl Write for TcpConnection {
    type Error = io::Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.stream.flush()
    }
}

impl Close for TcpConnection {
    type Error = io::Error;

    fn close(self) -> Result<(), Self::Error> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(err) if err.kind() != ErrorKind::NotConnected => Err(err),
            _ => Ok(()),
        }
    }
}

impl Connection for TcpConnection {}

/// Wall-clock milliseconds that never go backwards.
#[derive(Debug, Clone)]
pub struct StdClock {
    start: Instant,
    epoch_ms: u64,
}

impl StdClock {
    /// Starts at the current Unix time.
    pub fn new() -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_millis() as u64)
            .unwrap_or_default();
        Self {
            start: Instant::now(),
            epoch_ms,
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.epoch_ms + self.start.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

/// Credential files read at start-up.
#[derive(Clone)]
pub struct ProvisioningFiles {
    /// Device certificate (PEM).
    pub certificate: String,
    /// Private key (PEM).
    pub private_key: String,
    /// Certificate signing request (PEM).
    pub csr: String,
}

impl std::fmt::Debug for ProvisioningFiles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningFiles")
            .field("certificate_len", &self.certificate.len())
            .field("private_key", &"<redacted>")
            .field("csr_len", &self.csr.len())
            .finish()
    }
}

impl ProvisioningFiles {
    /// Borrow the files as a [`Provisioning`] for `serial_number`.
    pub fn provisioning<'a>(&'a self, serial_number: &'a str) -> Provisioning<'a> {
        Provisioning {
            certificate: &self.certificate,
            private_key: &self.private_key,
            csr: &self.csr,
            serial_number,
            state: RotationState::CloudCert,
        }
    }
}

/// Read the files named by `IOTDEMO_CERT_PATH`, `IOTDEMO_KEY_PATH` and
/// `IOTDEMO_CSR_PATH`.
pub fn load_provisioning() -> io::Result<ProvisioningFiles> {
    Ok(ProvisioningFiles {
        certificate: read_named("IOTDEMO_CERT_PATH")?,
        private_key: read_named("IOTDEMO_KEY_PATH")?,
        csr: read_named("IOTDEMO_CSR_PATH")?,
    })
}

fn read_named(variable: &str) -> io::Result<String> {
    let path = std::env::var(variable).map_err(|_| {
        io::Error::new(ErrorKind::NotFound, format!("{} is not set", variable))
    })?;
    std::fs::read_to_string(&path).map_err(|err| {
        io::Error::new(err.kind(), format!("{} ({}): {}", variable, path, err))
    })
}
