//! One-shot relay: obtain a single bit and push it to the microcontroller
//! as a raw byte.

use std::time::{Duration, Instant};

use log::info;

use crate::config::Config;
use crate::ibm::{wait_for_job, QuantumProvider};
use crate::serial::LineTransport;
use crate::simulator::{Circuit, Simulator};
use crate::types::Mode;
use crate::QbitLinkError;

/// Obtain one measured bit according to `config.mode`.
///
/// Hardware mode submits to the least-busy backend and blocks, polling at
/// `config.job_poll_interval`, until the job finishes.
pub fn measure_bit<P: QuantumProvider>(
    config: &Config,
    provider: &mut P,
) -> Result<u8, QbitLinkError> {
    let circuit = Circuit::superposition(1)?;
    let bits = match config.mode {
        Mode::Simulate => Simulator::new(config.seed).run(&circuit),
        Mode::Hardware => {
            let job_id = provider.submit_to_least_busy(&circuit)?;
            wait_for_job(&mut *provider, &job_id, config.job_poll_interval, config.job_timeout)?;
            provider.job_result(&job_id)?
        }
    };
    bits.as_slice()
        .last()
        .copied()
        .ok_or_else(|| QbitLinkError::Provider("Empty measurement outcome".into()))
}

/// Write `bit` as a single byte, then wait up to `reply_timeout` for one
/// line back. Returns the reply, if any.
pub fn send_bit<T: LineTransport>(
    transport: &mut T,
    bit: u8,
    reply_timeout: Duration,
    poll_interval: Duration,
) -> Result<Option<String>, QbitLinkError> {
    transport.send(&[bit])?;
    info!("Sent to microcontroller: {bit}");

    let start = Instant::now();
    loop {
        if let Some(reply) = transport.read_line()? {
            info!("Microcontroller response: {reply}");
            return Ok(Some(reply));
        }
        if start.elapsed() >= reply_timeout || !transport.is_open() {
            info!("No response within {reply_timeout:?}");
            return Ok(None);
        }
        std::thread::sleep(poll_interval);
    }
}
