// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Trait seam for the OS print spooler.
//
// The spooler is an eventually-consistent view: jobs appear some time after
// submission and routinely vanish before a terminal status is ever visible.
// Everything in the monitor is written against that reality.

use sha2::{Digest, Sha256};

use scangate_core::error::Result;
use scangate_core::types::{PrinterInfo, SpoolJob};

/// Read-only access to the OS print queue.
///
/// Methods are synchronous; the orchestrator runs them under
/// `spawn_blocking` the same way the capture facade runs driver calls.
pub trait SpoolQueue: Send + Sync {
    /// Jobs currently visible in the named printer's queue.
    fn list_jobs(&self, printer: &str) -> Result<Vec<SpoolJob>>;

    /// Printers installed on this host.
    fn list_printers(&self) -> Result<Vec<PrinterInfo>>;
}

/// Spooler status strings that mean the job has failed and will not make
/// further progress without operator action.
const ERROR_STATUS_PATTERNS: &[&str] = &[
    "error",
    "offline",
    "paperout",
    "paper out",
    "userintervention",
    "user intervention",
    "deleted",
    "blocked",
];

/// Whether a raw spooler status string denotes a failed job.
pub fn is_error_status(status: &str) -> bool {
    let status = status.to_ascii_lowercase();
    ERROR_STATUS_PATTERNS.iter().any(|p| status.contains(p))
}

/// Technology class guessed from the device name, surfaced to clients as a
/// display hint only.
pub fn infer_printer_type(name: &str) -> &'static str {
    let name = name.to_ascii_lowercase();
    if name.contains("laser") {
        "laser"
    } else if name.contains("inkjet") || name.contains("deskjet") || name.contains("officejet") {
        "inkjet"
    } else if name.contains("thermal") || name.contains("receipt") {
        "thermal"
    } else if name.contains("dot matrix") || name.contains("dot-matrix") {
        "dot matrix"
    } else if name.contains("mfp") || name.contains("mfc") || name.contains("multifunction") {
        "multifunction"
    } else {
        "unknown"
    }
}

/// Short stable fingerprint of the document bytes, used as the spooler
/// document name so the same upload is recognisable across log lines.
pub fn document_fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses_are_matched_case_insensitively() {
        assert!(is_error_status("Error"));
        assert!(is_error_status("PAPEROUT"));
        assert!(is_error_status("printing, UserIntervention"));
        assert!(!is_error_status("Printing"));
        assert!(!is_error_status("Spooling"));
        assert!(!is_error_status(""));
    }

    #[test]
    fn printer_type_from_name() {
        assert_eq!(infer_printer_type("HP LaserJet Pro M404"), "laser");
        assert_eq!(infer_printer_type("Canon PIXMA Inkjet"), "inkjet");
        assert_eq!(infer_printer_type("Epson Thermal TM-T20"), "thermal");
        assert_eq!(infer_printer_type("Brother MFC-L2710"), "multifunction");
        assert_eq!(infer_printer_type("Generic Device"), "unknown");
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = document_fingerprint(b"%PDF-1.7 test");
        let b = document_fingerprint(b"%PDF-1.7 test");
        let c = document_fingerprint(b"%PDF-1.7 other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }
}
