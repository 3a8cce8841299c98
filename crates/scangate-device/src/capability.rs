// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capture-subsystem capability detection.
//
// Runs a fixed probe sequence -- binding, driver manager, live session --
// short-circuiting the session probe on prerequisite failure but recording
// every sub-probe attempted.  The verdict is cached as an immutable
// snapshot swapped atomically, so concurrent readers never observe a
// half-updated state.  Stale results persist until the next explicit probe;
// runtime subsystem faults demote the snapshot lazily, never promote it.

use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use scangate_core::types::{timestamp, CapabilityReport, CapabilityState, ProbeResult};

use crate::backend::{CaptureBackend, CaptureSession as _};

/// Probe name for the binding-library check.
const PROBE_BINDING: &str = "capture binding";

/// Probe name for the driver-manager discovery check.
const PROBE_DRIVER_MANAGER: &str = "driver manager";

/// Probe name for the open-and-close session check.
const PROBE_SESSION: &str = "capture session";

/// Cached capability verdict for the capture subsystem.
pub struct CapabilityCache {
    backend: Arc<dyn CaptureBackend>,
    snapshot: RwLock<Snapshot>,
}

#[derive(Clone)]
struct Snapshot {
    state: CapabilityState,
    report: Option<CapabilityReport>,
}

impl CapabilityCache {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            snapshot: RwLock::new(Snapshot {
                state: CapabilityState::Unprobed,
                report: None,
            }),
        }
    }

    /// Current cached state.
    pub fn state(&self) -> CapabilityState {
        match self.snapshot.read() {
            Ok(snap) => snap.state.clone(),
            Err(poisoned) => poisoned.into_inner().state.clone(),
        }
    }

    /// Last full report, if a probe has run.
    pub fn report(&self) -> Option<CapabilityReport> {
        match self.snapshot.read() {
            Ok(snap) => snap.report.clone(),
            Err(poisoned) => poisoned.into_inner().report.clone(),
        }
    }

    /// Probe once if never probed; otherwise keep the cached verdict.
    pub fn ensure_probed(&self) -> CapabilityState {
        if matches!(self.state(), CapabilityState::Unprobed) {
            self.probe();
        }
        self.state()
    }

    /// Run the full probe sequence and swap the cached snapshot.
    ///
    /// This is the explicit re-probe path; it is the only way the state can
    /// move back to `Available`.
    pub fn probe(&self) -> CapabilityReport {
        self.swap_state(CapabilityState::Probing);
        debug!("probing capture subsystem");

        let mut probes = Vec::with_capacity(3);

        let binding = match self.backend.probe_binding() {
            Ok(()) => ProbeResult::pass(PROBE_BINDING),
            Err(e) => ProbeResult::fail(PROBE_BINDING, e.to_string()),
        };
        probes.push(binding);

        let driver = match self.backend.probe_driver_manager() {
            Ok(()) => ProbeResult::pass(PROBE_DRIVER_MANAGER),
            Err(e) => ProbeResult::fail(PROBE_DRIVER_MANAGER, e.to_string()),
        };
        probes.push(driver);

        // The session probe only runs when its prerequisites hold; a failed
        // binding or missing driver manager makes open attempts meaningless.
        if probes.iter().all(|p| p.ok) {
            let session = match self.backend.open_session() {
                Ok(mut session) => {
                    if let Err(e) = session.close() {
                        warn!(error = %e, "closing probe session failed");
                    }
                    ProbeResult::pass(PROBE_SESSION)
                }
                Err(e) => ProbeResult::fail(PROBE_SESSION, e.to_string()),
            };
            probes.push(session);
        } else {
            probes.push(ProbeResult::fail(PROBE_SESSION, "prerequisites not met"));
        }

        let failing: Vec<&ProbeResult> = probes.iter().filter(|p| !p.ok).collect();
        let state = if failing.is_empty() {
            CapabilityState::Available
        } else {
            let reason = failing
                .iter()
                .map(|p| format!("{} unavailable", p.name))
                .collect::<Vec<_>>()
                .join(", ");
            CapabilityState::Unavailable { reason }
        };

        let report = CapabilityReport {
            state: state.clone(),
            recommendations: recommendations(&probes),
            probes,
            probed_at: timestamp(),
        };

        match &state {
            CapabilityState::Available => info!("capture subsystem fully available"),
            CapabilityState::Unavailable { reason } => {
                warn!(reason = %reason, "capture subsystem unavailable -- print-only mode")
            }
            _ => {}
        }

        if let Ok(mut snap) = self.snapshot.write() {
            *snap = Snapshot {
                state,
                report: Some(report.clone()),
            };
        }
        report
    }

    /// Demote the cached state after a runtime subsystem fault.
    ///
    /// Never promotes: a demotion on top of `Unavailable` only refreshes
    /// the reason.  Recovery requires an explicit re-probe.
    pub fn demote(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "demoting capture capability");
        if let Ok(mut snap) = self.snapshot.write() {
            snap.state = CapabilityState::Unavailable { reason };
        }
    }

    fn swap_state(&self, state: CapabilityState) {
        if let Ok(mut snap) = self.snapshot.write() {
            snap.state = state;
        }
    }
}

/// One deterministic remediation line per failing probe, with a leading
/// degraded-mode notice when anything failed.
fn recommendations(probes: &[ProbeResult]) -> Vec<String> {
    let mut lines = Vec::new();

    for probe in probes.iter().filter(|p| !p.ok) {
        match probe.name.as_str() {
            PROBE_BINDING => lines.push(
                "Check that the capture binding is deployed with the gateway and matches the host architecture"
                    .to_string(),
            ),
            PROBE_DRIVER_MANAGER => lines.push(
                "Install the capture driver manager: place the driver-manager library in the application directory or the system library directory"
                    .to_string(),
            ),
            PROBE_SESSION => lines.push(
                "Check that a scanner driver is installed and the device is connected and powered on"
                    .to_string(),
            ),
            _ => {}
        }
    }

    if lines.is_empty() {
        lines.push("Capture subsystem is fully operational".to_string());
    } else {
        lines.insert(
            0,
            "The gateway will run in print-only mode until capture is restored".to_string(),
        );
    }
    lines
}
