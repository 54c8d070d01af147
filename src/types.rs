use std::fmt;

use serde::Serialize;

use crate::QbitLinkError;

/// A measured bit sequence, most significant classical bit first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Bits(Vec<u8>);

impl Bits {
    /// Wrap a sequence of 0/1 values.
    pub fn new(bits: Vec<u8>) -> Result<Self, QbitLinkError> {
        if let Some(b) = bits.iter().find(|&&b| b > 1) {
            return Err(QbitLinkError::Protocol(format!("Not a bit: {b}")));
        }
        Ok(Self(bits))
    }

    /// Decode a provider bitstring (`"0110"`) character by character.
    ///
    /// Hex-encoded outcomes (`"0x6"`) are expanded to binary, left-padded to
    /// `width` when one is known. Without a width the leading zeros are lost.
    pub fn from_bitstring(s: &str, width: Option<usize>) -> Result<Self, QbitLinkError> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix("0x") {
            let value = u128::from_str_radix(hex, 16)
                .map_err(|_| QbitLinkError::Provider(format!("Bad hex outcome: {s}")))?;
            let binary = format!("{value:b}");
            let padded = match width {
                Some(w) if w > binary.len() => format!("{binary:0>w$}"),
                _ => binary,
            };
            return Self::from_bitstring(&padded, None);
        }

        // Registers are separated by spaces in some result encodings.
        s.chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                '0' => Ok(0),
                '1' => Ok(1),
                other => Err(QbitLinkError::Provider(format!(
                    "Unexpected character {other:?} in outcome {s:?}"
                ))),
            })
            .collect::<Result<Vec<u8>, _>>()
            .map(Self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b}")?;
        }
        Ok(())
    }
}

/// Execution capability of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Local sampling only; hardware submission is refused.
    #[default]
    Simulate,
    /// Hardware submission to the cloud provider is allowed.
    Hardware,
}

impl std::str::FromStr for Mode {
    type Err = QbitLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulate" | "simulator" | "sim" => Ok(Self::Simulate),
            "hardware" | "real" | "ibm" => Ok(Self::Hardware),
            other => Err(QbitLinkError::Config(format!("Unknown mode: {other}"))),
        }
    }
}

/// A decoded request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Sample `num_qubits` qubits locally.
    StartJob { num_qubits: u32 },
    /// Submit a superposition circuit to hardware.
    StartHardwareJob { num_qubits: u32 },
    /// Replace the cloud credential.
    ConfigureIbm { token: String },
    GetJobStatus { job_id: String },
    GetJobResult { job_id: String },
    /// Any other `action` value.
    Unknown(String),
}

impl Command {
    /// Wire name of the action.
    pub fn action(&self) -> &str {
        match self {
            Command::StartJob { .. } => "start_job",
            Command::StartHardwareJob { .. } => "start_real_ibm_job",
            Command::ConfigureIbm { .. } => "configure_ibm",
            Command::GetJobStatus { .. } => "get_job_status",
            Command::GetJobResult { .. } => "get_job_result",
            Command::Unknown(action) => action,
        }
    }
}

/// A response line. Serializes to a single-key JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Status(String),
    JobResult(Bits),
    JobId(String),
    JobStatus(String),
    Error(String),
}

impl Response {
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
}

impl From<&QbitLinkError> for Response {
    fn from(e: &QbitLinkError) -> Self {
        Response::Error(e.to_string())
    }
}
