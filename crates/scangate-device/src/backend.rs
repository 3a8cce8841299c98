// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Trait seam for the capture-subsystem driver binding.
//
// The gateway never talks to scanner hardware directly; it goes through a
// `CaptureBackend` implementation injected at startup.  Real deployments
// wrap the platform driver stack, tests and driverless hosts use the stub.

use scangate_core::error::Result;
use scangate_core::types::{ImageFormat, ScanOptions};

/// A raw captured image as produced by the driver.
///
/// Codec work happens inside the backend; the gateway only forwards the
/// encoded bytes.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// The capture-subsystem driver binding.
///
/// All methods are synchronous because the underlying driver protocols are;
/// callers run them under `spawn_blocking` (see the facade).
pub trait CaptureBackend: Send + Sync {
    /// Can the driver binding be constructed at all on this host.
    fn probe_binding(&self) -> Result<()>;

    /// File name of the OS device-driver-manager shared library the binding
    /// loads at session-open time (e.g. `twaindsm.dll`).
    fn driver_library_name(&self) -> &str;

    /// Is the driver-manager component discoverable on this host.
    ///
    /// The default looks for [`driver_library_name`](Self::driver_library_name)
    /// in the fixed search order: process directory first, then the OS
    /// system library directories.
    fn probe_driver_manager(&self) -> Result<()> {
        let name = self.driver_library_name();
        for dir in driver_search_paths() {
            if dir.join(name).is_file() {
                return Ok(());
            }
        }
        Err(scangate_core::ScangateError::CaptureUnavailable(format!(
            "{name} not found in driver search path"
        )))
    }

    /// Open a live session against the driver manager.
    fn open_session(&self) -> Result<Box<dyn CaptureSession>>;
}

/// Directories searched for the driver-manager library, in probe order.
pub fn driver_search_paths() -> Vec<std::path::PathBuf> {
    let mut paths = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            paths.push(dir.to_path_buf());
        }
    }
    if cfg!(target_os = "windows") {
        paths.push(std::path::PathBuf::from(r"C:\Windows\System32"));
        paths.push(std::path::PathBuf::from(r"C:\Windows\SysWOW64"));
    } else {
        paths.push(std::path::PathBuf::from("/usr/local/lib"));
        paths.push(std::path::PathBuf::from("/usr/lib"));
    }
    paths
}

/// One open driver-manager session.
///
/// At most one exists process-wide; the facade guards it with a single
/// mutual-exclusion lock so commands serialize against the physical device.
pub trait CaptureSession: Send {
    /// Names of the capture devices currently visible to the driver.
    fn list_devices(&mut self) -> Result<Vec<String>>;

    /// Run a single blocking capture: open the named device, apply the
    /// options, transfer one image, and release the device.
    fn capture(&mut self, options: &ScanOptions) -> Result<CapturedImage>;

    /// Release the session.  Idempotent.
    fn close(&mut self) -> Result<()>;
}
