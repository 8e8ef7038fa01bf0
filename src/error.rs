//! Unified engine error type used across all phases.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Protocol,
    Build,
    Classify,
    Merge,
    Frontier,
    Solve,
    Drive,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Protocol => write!(f, "Protocol"),
            Phase::Build => write!(f, "Build"),
            Phase::Classify => write!(f, "Classify"),
            Phase::Merge => write!(f, "Merge"),
            Phase::Frontier => write!(f, "Frontier"),
            Phase::Solve => write!(f, "Solve"),
            Phase::Drive => write!(f, "Drive"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineError {
    pub code: String,
    pub phase: Phase,
    pub message: String,
    /// True when the error is an internal invariant breach rather than a
    /// condition of the outside world. The driver decides whether it aborts
    /// the process (debug builds) or marks the attempted target as missed.
    pub invariant: bool,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.invariant {
            write!(
                f,
                "[{}:{}] invariant violation: {}",
                self.phase, self.code, self.message
            )
        } else {
            write!(f, "[{}:{}] {}", self.phase, self.code, self.message)
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    pub fn protocol(code: &str, message: impl Into<String>) -> Self {
        EngineError {
            code: code.into(),
            phase: Phase::Protocol,
            message: message.into(),
            invariant: false,
        }
    }

    pub fn build(code: &str, message: impl Into<String>) -> Self {
        EngineError {
            code: code.into(),
            phase: Phase::Build,
            message: message.into(),
            invariant: false,
        }
    }

    pub fn solve(code: &str, message: impl Into<String>) -> Self {
        EngineError {
            code: code.into(),
            phase: Phase::Solve,
            message: message.into(),
            invariant: false,
        }
    }

    pub fn drive(code: &str, message: impl Into<String>) -> Self {
        EngineError {
            code: code.into(),
            phase: Phase::Drive,
            message: message.into(),
            invariant: false,
        }
    }

    /// An internal invariant breach (tree corruption, reclassified terminal,
    /// `set_child` on a terminal, ...).
    pub fn invariant(phase: Phase, code: &str, message: impl Into<String>) -> Self {
        EngineError {
            code: code.into(),
            phase,
            message: message.into(),
            invariant: true,
        }
    }
}
