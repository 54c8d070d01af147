//! # qbitlink
//!
//! Relay quantum random bits to a microcontroller over a serial link.
//!
//! The microcontroller sends one JSON command per line (`start_job`,
//! `configure_ibm`, `get_job_status`, `get_job_result`, `start_real_ibm_job`)
//! and receives one JSON response per line. Bits come from a local
//! superposition sampler or from IBM Quantum hardware.
//!
//! ## Quick Start
//!
//! ```no_run
//! use qbitlink::{discovery, Config, Dispatcher, IbmProvider};
//!
//! let config = Config::default();
//! let mut transport = discovery::connect(&config)?;
//! let mut dispatcher = Dispatcher::new(&config, IbmProvider::from_config(&config.ibm));
//! dispatcher.serve(&mut transport)?;
//! # Ok::<(), qbitlink::QbitLinkError>(())
//! ```

use std::time::Duration;

pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod ibm;
pub mod protocol;
pub mod relay;
pub mod serial;
pub mod simulator;
pub mod types;

pub use config::{Config, IbmConfig};
pub use discovery::{discover_devices, wait_for_device, DiscoveredDevice};
pub use dispatcher::Dispatcher;
pub use ibm::{Credentials, IbmProvider, MockProvider, QuantumProvider};
pub use serial::{find_devices, LineTransport, MockTransport, SerialTransport};
pub use simulator::Simulator;
pub use types::*;

/// Errors returned by the bridge.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QbitLinkError {
    /// Discovery gave up after the configured timeout.
    #[error("No microcontroller found within {0:?}")]
    DiscoveryTimeout(Duration),

    /// Serial communication error.
    #[error("Serial error: {0}")]
    Serial(String),

    /// The request line was not valid JSON.
    #[error("Invalid JSON format")]
    MalformedJson,

    /// The request was valid JSON but not a usable command.
    #[error("Invalid request: {0}")]
    Protocol(String),

    /// A cloud call was attempted without a token.
    #[error("IBM token not configured")]
    NotConfigured,

    /// The provider does not know the job identifier.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Cloud provider failure (HTTP, authentication, backend, job).
    #[error("Provider error: {0}")]
    Provider(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}
