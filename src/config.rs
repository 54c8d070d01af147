//! Runtime configuration.
//!
//! Built by the binary from command-line arguments, each of which falls back
//! to an environment variable. Credentials are only ever read from there;
//! nothing is stored on disk.

use std::time::Duration;

use crate::ibm::{Credentials, DEFAULT_ENDPOINT};
use crate::protocol::DEFAULT_BAUD_RATE;
pub use crate::types::Mode;
use crate::QbitLinkError;

/// Cloud provider settings.
#[derive(Debug, Clone)]
pub struct IbmConfig {
    /// REST API base URL.
    pub endpoint: String,
    /// Token installed at startup; `configure_ibm` may replace it later.
    pub credentials: Option<Credentials>,
    /// Instance (hub/group/project) used for job submission.
    pub instance: Option<String>,
    /// Shots per hardware job. One shot gives one bitstring.
    pub shots: u32,
    /// HTTP request timeout.
    pub request_timeout: Duration,
}

impl Default for IbmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            credentials: None,
            instance: None,
            shots: 1,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Explicit serial port. `None` means auto-discover.
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Pause after opening the port while the board resets.
    pub settle_delay: Duration,
    /// Give up discovery after this long.
    pub discovery_timeout: Duration,
    pub discovery_interval: Duration,
    /// Sleep between empty polls of the transport.
    pub idle_interval: Duration,
    /// Sleep between job status polls while a hardware job is queued or running.
    pub job_poll_interval: Duration,
    /// Give up waiting on a hardware job after this long (`send-bit` only).
    pub job_timeout: Option<Duration>,
    pub mode: Mode,
    pub max_qubits: u32,
    /// Seed for the local sampler; `None` seeds from OS entropy.
    pub seed: Option<u64>,
    pub ibm: IbmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            settle_delay: Duration::from_secs(2),
            discovery_timeout: Duration::from_secs(60),
            discovery_interval: Duration::from_secs(1),
            idle_interval: Duration::from_millis(10),
            job_poll_interval: Duration::from_secs(1),
            job_timeout: None,
            mode: Mode::Simulate,
            max_qubits: 32,
            seed: None,
            ibm: IbmConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), QbitLinkError> {
        if self.baud_rate == 0 {
            return Err(QbitLinkError::Config("Baud rate cannot be 0".into()));
        }
        if self.max_qubits == 0 {
            return Err(QbitLinkError::Config("max_qubits must be positive".into()));
        }
        if self.max_qubits > 128 {
            return Err(QbitLinkError::Config(format!(
                "max_qubits {} exceeds the 128 bits a result can carry",
                self.max_qubits
            )));
        }
        if self.discovery_interval.is_zero() {
            return Err(QbitLinkError::Config("Discovery interval cannot be 0".into()));
        }
        if self.ibm.shots == 0 {
            return Err(QbitLinkError::Config("Shots must be positive".into()));
        }
        if !self.ibm.endpoint.starts_with("http://") && !self.ibm.endpoint.starts_with("https://") {
            return Err(QbitLinkError::Config(format!(
                "Endpoint must be an http(s) URL: {}",
                self.ibm.endpoint
            )));
        }
        if self.mode == Mode::Hardware && self.ibm.credentials.is_none() {
            log::warn!("Hardware mode without a token; waiting for configure_ibm");
        }
        Ok(())
    }
}
