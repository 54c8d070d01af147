//! Command dispatcher: one request line in, at most one response line out.

use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::Config;
use crate::ibm::{Credentials, IbmProvider, QuantumProvider};
use crate::protocol::{
    encode_response, parse_command, validate_num_qubits, HARDWARE_DISABLED, TOKEN_CONFIGURED,
};
use crate::serial::LineTransport;
use crate::simulator::{Circuit, Simulator};
use crate::types::*;
use crate::QbitLinkError;

/// Routes decoded commands to the local sampler or the cloud provider.
///
/// ```
/// use qbitlink::{Config, Dispatcher, MockProvider, Response};
///
/// let mut dispatcher = Dispatcher::new(&Config::default(), MockProvider::default());
/// let response = dispatcher.handle_line(r#"{"action": "start_job", "num_qubits": 2}"#);
/// assert!(matches!(response, Some(Response::JobResult(bits)) if bits.len() == 2));
/// ```
pub struct Dispatcher<P: QuantumProvider = IbmProvider> {
    simulator: Simulator,
    provider: P,
    mode: Mode,
    max_qubits: u32,
    idle_interval: Duration,
}

impl<P: QuantumProvider> Dispatcher<P> {
    pub fn new(config: &Config, provider: P) -> Self {
        Self {
            simulator: Simulator::new(config.seed),
            provider,
            mode: config.mode,
            max_qubits: config.max_qubits,
            idle_interval: config.idle_interval,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Handle one raw request line.
    ///
    /// Returns `None` only for unrecognized actions. Every failure, whether
    /// a malformed line, a bad request or a provider error, becomes an
    /// `error` response.
    pub fn handle_line(&mut self, line: &str) -> Option<Response> {
        info!("Request: {line}");
        let result = parse_command(line).and_then(|command| self.execute(command));
        match result {
            Ok(response) => response,
            Err(e) => {
                error!("Request failed: {e}");
                Some(Response::from(&e))
            }
        }
    }

    /// Run a decoded command.
    pub fn execute(&mut self, command: Command) -> Result<Option<Response>, QbitLinkError> {
        let response = match command {
            Command::StartJob { num_qubits } => {
                let n = validate_num_qubits(num_qubits, self.max_qubits)?;
                let bits = self.simulator.sample(n)?;
                debug!("Sampled {n} qubits: {bits}");
                Response::JobResult(bits)
            }
            Command::StartHardwareJob { num_qubits } => {
                if self.mode != Mode::Hardware {
                    return Err(QbitLinkError::Protocol(HARDWARE_DISABLED.into()));
                }
                let n = validate_num_qubits(num_qubits, self.max_qubits)?;
                let circuit = Circuit::superposition(n)?;
                Response::JobId(self.provider.submit_to_least_busy(&circuit)?)
            }
            Command::ConfigureIbm { token } => {
                self.provider.configure(Credentials::new(token));
                info!("IBM Quantum token configured");
                Response::Status(TOKEN_CONFIGURED.into())
            }
            Command::GetJobStatus { job_id } => {
                Response::JobStatus(self.provider.job_status(&job_id)?)
            }
            Command::GetJobResult { job_id } => {
                Response::JobResult(self.provider.job_result(&job_id)?)
            }
            Command::Unknown(action) => {
                warn!("Ignoring unknown action {action:?}");
                return Ok(None);
            }
        };
        Ok(Some(response))
    }

    /// Encode and write one response through the transport's single write path.
    pub fn respond<T: LineTransport>(
        &self,
        transport: &mut T,
        response: &Response,
    ) -> Result<(), QbitLinkError> {
        let frame = encode_response(response)?;
        info!("Response: {}", String::from_utf8_lossy(&frame).trim_end());
        transport.send(&frame)
    }

    /// Process one pending line, if any. Returns whether a line was read.
    pub fn serve_once<T: LineTransport>(&mut self, transport: &mut T) -> Result<bool, QbitLinkError> {
        let Some(line) = transport.read_line()? else {
            return Ok(false);
        };
        if let Some(response) = self.handle_line(&line) {
            self.respond(transport, &response)?;
        }
        Ok(true)
    }

    /// Serve requests until the transport closes or fails.
    pub fn serve<T: LineTransport>(&mut self, transport: &mut T) -> Result<(), QbitLinkError> {
        info!("Serving requests ({:?} mode)", self.mode);
        while transport.is_open() {
            if !self.serve_once(transport)? {
                std::thread::sleep(self.idle_interval);
            }
        }
        info!("Transport closed");
        Ok(())
    }
}
