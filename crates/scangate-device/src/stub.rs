// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub capture backend.
//
// Two roles: on hosts without a driver stack the gateway is wired with an
// `unavailable` stub so capability detection degrades cleanly to print-only
// mode, and tests use the `simulated` variant to exercise the full capture
// path without hardware.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scangate_core::error::{Result, ScangateError};
use scangate_core::types::{ScanOptions, ImageFormat};

use crate::backend::{CaptureBackend, CaptureSession, CapturedImage};

/// Configurable stand-in for a real driver binding.
pub struct StubBackend {
    binding_error: Option<String>,
    capture_error: Option<String>,
    devices: Vec<String>,
    capture_delay: Duration,
    /// Times a session was opened (includes the capability probe's session
    /// check).
    pub session_opens: Arc<AtomicUsize>,
    /// Times a capture was attempted.
    pub captures: Arc<AtomicUsize>,
}

impl StubBackend {
    /// A backend whose binding probe always fails, putting the gateway in
    /// print-only mode.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            binding_error: Some(reason.into()),
            capture_error: None,
            devices: Vec::new(),
            capture_delay: Duration::ZERO,
            session_opens: Arc::new(AtomicUsize::new(0)),
            captures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A fully working backend exposing the given device names and
    /// producing synthetic one-pixel captures.
    pub fn simulated(devices: Vec<String>) -> Self {
        Self {
            binding_error: None,
            capture_error: None,
            devices,
            capture_delay: Duration::ZERO,
            session_opens: Arc::new(AtomicUsize::new(0)),
            captures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Delay injected into every capture, for serialization-order tests.
    pub fn with_capture_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = delay;
        self
    }

    /// Make every capture fail with the given message (probes still pass).
    pub fn failing_captures(mut self, message: impl Into<String>) -> Self {
        self.capture_error = Some(message.into());
        self
    }
}

impl CaptureBackend for StubBackend {
    fn probe_binding(&self) -> Result<()> {
        match &self.binding_error {
            Some(reason) => Err(ScangateError::CaptureUnavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn driver_library_name(&self) -> &str {
        "twaindsm.dll"
    }

    // The stub has no real driver manager; its presence mirrors the
    // binding's configured availability.
    fn probe_driver_manager(&self) -> Result<()> {
        self.probe_binding()
    }

    fn open_session(&self) -> Result<Box<dyn CaptureSession>> {
        self.probe_binding()?;
        self.session_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubSession {
            devices: self.devices.clone(),
            capture_error: self.capture_error.clone(),
            capture_delay: self.capture_delay,
            captures: Arc::clone(&self.captures),
        }))
    }
}

struct StubSession {
    devices: Vec<String>,
    capture_error: Option<String>,
    capture_delay: Duration,
    captures: Arc<AtomicUsize>,
}

impl CaptureSession for StubSession {
    fn list_devices(&mut self) -> Result<Vec<String>> {
        Ok(self.devices.clone())
    }

    fn capture(&mut self, options: &ScanOptions) -> Result<CapturedImage> {
        self.captures.fetch_add(1, Ordering::SeqCst);

        if !self.capture_delay.is_zero() {
            std::thread::sleep(self.capture_delay);
        }

        if let Some(message) = &self.capture_error {
            return Err(ScangateError::Device(message.clone()));
        }

        if !options.device_name.is_empty()
            && !self
                .devices
                .iter()
                .any(|d| d.eq_ignore_ascii_case(&options.device_name))
        {
            return Err(ScangateError::Device(format!(
                "scanner not found: {}",
                options.device_name
            )));
        }

        Ok(CapturedImage {
            format: options.format,
            width: 1,
            height: 1,
            bytes: synthetic_pixel(options.format),
        })
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Smallest recognisable payload per format; enough for clients to assert
/// on without shipping an image codec.
fn synthetic_pixel(format: ImageFormat) -> Vec<u8> {
    match format {
        ImageFormat::Png => b"\x89PNG\r\n\x1a\n".to_vec(),
        ImageFormat::Jpeg => b"\xff\xd8\xff\xe0".to_vec(),
        ImageFormat::Tiff => b"II*\x00".to_vec(),
        ImageFormat::Bmp => b"BM".to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_stub_fails_probe_and_open() {
        let backend = StubBackend::unavailable("no driver stack");
        assert!(backend.probe_binding().is_err());
        assert!(backend.open_session().is_err());
        assert_eq!(backend.session_opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn simulated_stub_lists_and_captures() {
        let backend = StubBackend::simulated(vec!["Stub Scanner".into()]);
        let mut session = backend.open_session().expect("open");
        assert_eq!(
            session.list_devices().expect("list"),
            vec!["Stub Scanner".to_string()]
        );

        let image = session
            .capture(&ScanOptions::default())
            .expect("capture first device");
        assert_eq!(image.format, ImageFormat::Png);
        assert_eq!(backend.captures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn simulated_stub_rejects_unknown_device() {
        let backend = StubBackend::simulated(vec!["Stub Scanner".into()]);
        let mut session = backend.open_session().expect("open");
        let err = session
            .capture(&ScanOptions {
                device_name: "Nope".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("scanner not found"));
    }
}
