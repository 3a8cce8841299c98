// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scangate.

use thiserror::Error;

/// Top-level error type for all gateway operations.
///
/// Every variant is recovered at the command-dispatch boundary and turned
/// into a failed response envelope; only `Server` errors on the transport
/// itself may terminate a connection session.
#[derive(Debug, Error)]
pub enum ScangateError {
    // -- Protocol errors --
    #[error("malformed command envelope: {0}")]
    Decode(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    // -- Capture subsystem errors --
    #[error("capture subsystem unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("device error: {0}")]
    Device(String),

    // -- Print subsystem errors --
    #[error("invalid print request: {0}")]
    Validation(String),

    #[error("spool queue error: {0}")]
    Spool(String),

    #[error("document rendering failed: {0}")]
    Render(String),

    #[error("print monitoring timed out: {0}")]
    MonitorTimeout(String),

    #[error("operation cancelled")]
    Cancelled,

    // -- Transport / infrastructure --
    #[error("gateway server error: {0}")]
    Server(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScangateError {
    /// Whether this error indicates a capture-subsystem-level fault (driver
    /// manager missing, binding unloadable) rather than a per-operation
    /// failure.  Subsystem faults demote the cached capability state.
    pub fn is_subsystem_fault(&self) -> bool {
        match self {
            Self::CaptureUnavailable(_) => true,
            Self::Device(detail) => {
                let lower = detail.to_ascii_lowercase();
                lower.contains("driver manager")
                    || lower.contains("binding")
                    || lower.contains("dsm")
            }
            _ => false,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScangateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsystem_fault_classification() {
        assert!(ScangateError::CaptureUnavailable("no DSM".into()).is_subsystem_fault());
        assert!(ScangateError::Device("driver manager library vanished".into())
            .is_subsystem_fault());
        assert!(!ScangateError::Device("paper jam in feeder".into()).is_subsystem_fault());
        assert!(!ScangateError::Validation("empty printer name".into()).is_subsystem_fault());
    }
}
