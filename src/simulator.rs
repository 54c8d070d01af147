//! Superposition circuit and the local single-shot sampler.

use std::fmt::Write as _;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::Bits;
use crate::QbitLinkError;

/// Hadamard on every qubit, then measure qubit `i` into classical bit `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Circuit {
    num_qubits: u32,
}

impl Circuit {
    pub fn superposition(num_qubits: u32) -> Result<Self, QbitLinkError> {
        if num_qubits == 0 {
            return Err(QbitLinkError::Protocol("num_qubits must be positive".into()));
        }
        Ok(Self { num_qubits })
    }

    pub fn num_qubits(&self) -> u32 {
        self.num_qubits
    }

    /// OpenQASM 3.0 source for submission to a remote backend.
    pub fn to_qasm(&self) -> String {
        let n = self.num_qubits;
        let mut qasm = String::from("OPENQASM 3.0;\ninclude \"stdgates.inc\";\n");
        let _ = writeln!(qasm, "qubit[{n}] q;");
        let _ = writeln!(qasm, "bit[{n}] c;\n");
        for i in 0..n {
            let _ = writeln!(qasm, "h q[{i}];");
        }
        qasm.push('\n');
        for i in 0..n {
            let _ = writeln!(qasm, "c[{i}] = measure q[{i}];");
        }
        qasm
    }
}

/// Local sampler for [`Circuit`].
///
/// Every basis state of a uniform superposition is equally likely, so one
/// shot is one fair coin per qubit.
pub struct Simulator {
    rng: StdRng,
}

impl Simulator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Run one shot. The outcome is ordered like a classical-register
    /// string: bit `n-1` first, bit `0` last.
    pub fn run(&mut self, circuit: &Circuit) -> Bits {
        let mut register: Vec<u8> = (0..circuit.num_qubits())
            .map(|_| u8::from(self.rng.gen::<bool>()))
            .collect();
        register.reverse();
        // Values are 0/1 by construction.
        Bits::new(register).unwrap_or_default()
    }

    /// Build and run a superposition over `num_qubits`.
    pub fn sample(&mut self, num_qubits: u32) -> Result<Bits, QbitLinkError> {
        let circuit = Circuit::superposition(num_qubits)?;
        Ok(self.run(&circuit))
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(None)
    }
}
