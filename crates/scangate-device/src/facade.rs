// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device session facade.
//
// Owns the single process-wide capture session and the mutual-exclusion
// lock that serializes every open/configure/capture/close sequence across
// connections.  Driver calls are blocking by nature, so they run under
// `spawn_blocking`, bounded by the configured capture timeout.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use scangate_core::error::{Result, ScangateError};
use scangate_core::protocol::encode_image_data;
use scangate_core::types::{timestamp, ScanOptions, ScanOutcome};

use crate::backend::{CaptureBackend, CaptureSession};
use crate::capability::CapabilityCache;

/// Lazily-opened capture session, created on first use and held until
/// shutdown or explicit reset.
#[derive(Default)]
struct DeviceSlot {
    session: Option<Box<dyn CaptureSession>>,
}

/// Exclusive-access gateway to the capture subsystem.
pub struct DeviceFacade {
    backend: Arc<dyn CaptureBackend>,
    capability: Arc<CapabilityCache>,
    slot: Arc<Mutex<DeviceSlot>>,
    capture_timeout: Duration,
}

impl DeviceFacade {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        capability: Arc<CapabilityCache>,
        capture_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            capability,
            slot: Arc::new(Mutex::new(DeviceSlot::default())),
            capture_timeout,
        }
    }

    /// Enumerate capture devices.  Fails fast with the cached reason when
    /// the capability state is `Unavailable`; the driver is never touched.
    pub async fn list_scanners(&self) -> Result<Vec<String>> {
        self.with_session(|session| session.list_devices()).await
    }

    /// Run a single blocking capture and package the result for the wire.
    pub async fn scan(&self, options: ScanOptions) -> Result<ScanOutcome> {
        options.validate()?;
        debug!(device = %options.device_name, resolution = options.resolution, "starting capture");

        let image = self
            .with_session(move |session| session.capture(&options))
            .await?;

        info!(
            width = image.width,
            height = image.height,
            format = image.format.tag(),
            "capture completed"
        );
        Ok(ScanOutcome {
            success: true,
            message: "scan completed".into(),
            format: image.format.tag().into(),
            width: image.width,
            height: image.height,
            image_data: encode_image_data(&image.bytes),
            timestamp: timestamp(),
        })
    }

    /// Drop the cached session so the next call reopens it.
    pub async fn reset(&self) {
        let slot = Arc::clone(&self.slot);
        let _ = tokio::task::spawn_blocking(move || {
            if let Ok(mut guard) = slot.lock() {
                if let Some(mut session) = guard.session.take() {
                    if let Err(e) = session.close() {
                        warn!(error = %e, "closing capture session failed");
                    }
                }
            }
        })
        .await;
    }

    /// Gate on capability, then run `f` against the (lazily opened) session
    /// under the device lock on a blocking thread.
    ///
    /// On timeout the blocked task still holds the device lock until the
    /// driver call returns, so a timed-out capture can never interleave
    /// with the next one.
    async fn with_session<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn CaptureSession) -> Result<T> + Send + 'static,
    {
        let capability = Arc::clone(&self.capability);
        let state = tokio::task::spawn_blocking(move || capability.ensure_probed())
            .await
            .map_err(|e| ScangateError::Device(format!("capability probe task: {e}")))?;

        if let Some(reason) = state.reason() {
            return Err(ScangateError::CaptureUnavailable(reason.to_string()));
        }

        let backend = Arc::clone(&self.backend);
        let capability = Arc::clone(&self.capability);
        let slot = Arc::clone(&self.slot);

        let task = tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| ScangateError::Device("device lock poisoned".into()))?;

            if guard.session.is_none() {
                guard.session = Some(backend.open_session()?);
            }
            let session = match guard.session.as_mut() {
                Some(session) => session,
                None => return Err(ScangateError::Device("capture session not open".into())),
            };

            let result = f(session.as_mut());

            if let Err(e) = &result {
                if e.is_subsystem_fault() {
                    // The session is no longer trustworthy; demote and force
                    // a reopen (which will fail until re-probed).
                    capability.demote(e.to_string());
                    guard.session = None;
                }
            }
            result
        });

        match tokio::time::timeout(self.capture_timeout, task).await {
            Err(_) => Err(ScangateError::Device(format!(
                "capture operation timed out after {:?}",
                self.capture_timeout
            ))),
            Ok(Err(e)) => Err(ScangateError::Device(format!("capture task failed: {e}"))),
            Ok(Ok(result)) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubBackend;
    use scangate_core::types::CapabilityState;
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    fn facade_with(backend: StubBackend, timeout: Duration) -> (DeviceFacade, Arc<StubBackend>) {
        let backend = Arc::new(backend);
        let capability = Arc::new(CapabilityCache::new(backend.clone()));
        (
            DeviceFacade::new(backend.clone(), capability, timeout),
            backend,
        )
    }

    #[tokio::test]
    async fn unavailable_capability_never_touches_the_driver() {
        let (facade, backend) = facade_with(
            StubBackend::unavailable("binding not linked"),
            Duration::from_secs(5),
        );

        let err = facade.list_scanners().await.unwrap_err();
        assert!(matches!(err, ScangateError::CaptureUnavailable(_)));

        let err = facade.scan(ScanOptions::default()).await.unwrap_err();
        assert!(matches!(err, ScangateError::CaptureUnavailable(_)));

        assert_eq!(backend.session_opens.load(Ordering::SeqCst), 0);
        assert_eq!(backend.captures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn scan_produces_base64_outcome() {
        let (facade, _) = facade_with(
            StubBackend::simulated(vec!["Stub Scanner".into()]),
            Duration::from_secs(5),
        );

        let outcome = facade.scan(ScanOptions::default()).await.expect("scan");
        assert!(outcome.success);
        assert_eq!(outcome.format, "png");
        assert!(!outcome.image_data.is_empty());
        assert!(
            scangate_core::protocol::decode_document_data(&outcome.image_data).is_ok(),
            "imageData must be valid base64"
        );
    }

    #[tokio::test]
    async fn invalid_options_rejected_before_device_access() {
        let (facade, backend) = facade_with(
            StubBackend::simulated(vec!["Stub Scanner".into()]),
            Duration::from_secs(5),
        );

        let err = facade
            .scan(ScanOptions {
                resolution: 9_999,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ScangateError::Validation(_)));
        assert_eq!(backend.captures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_scans_serialize_on_the_device_lock() {
        let delay = Duration::from_millis(60);
        let (facade, backend) = facade_with(
            StubBackend::simulated(vec!["Stub Scanner".into()]).with_capture_delay(delay),
            Duration::from_secs(5),
        );
        let facade = Arc::new(facade);

        let start = Instant::now();
        let a = {
            let facade = Arc::clone(&facade);
            tokio::spawn(async move { facade.scan(ScanOptions::default()).await })
        };
        let b = {
            let facade = Arc::clone(&facade);
            tokio::spawn(async move { facade.scan(ScanOptions::default()).await })
        };

        let (a, b) = tokio::join!(a, b);
        a.expect("join").expect("scan a");
        b.expect("join").expect("scan b");

        // Two captures of `delay` each through one lock cannot overlap.
        assert!(start.elapsed() >= delay * 2);
        assert_eq!(backend.captures.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn subsystem_fault_demotes_capability_lazily() {
        let backend = StubBackend::simulated(vec!["Stub Scanner".into()])
            .failing_captures("driver manager fault during transfer");
        let backend = Arc::new(backend);
        let capability = Arc::new(CapabilityCache::new(backend.clone()));
        let facade = DeviceFacade::new(backend, capability.clone(), Duration::from_secs(5));

        let err = facade.scan(ScanOptions::default()).await.unwrap_err();
        assert!(matches!(err, ScangateError::Device(_)));

        // The runtime fault demoted the cached state.
        assert!(matches!(
            capability.state(),
            CapabilityState::Unavailable { .. }
        ));

        // Follow-up calls now short-circuit on the cached reason.
        let err = facade.list_scanners().await.unwrap_err();
        assert!(matches!(err, ScangateError::CaptureUnavailable(_)));
    }

    #[tokio::test]
    async fn slow_capture_hits_the_timeout() {
        let (facade, _) = facade_with(
            StubBackend::simulated(vec!["Stub Scanner".into()])
                .with_capture_delay(Duration::from_millis(200)),
            Duration::from_millis(40),
        );

        let err = facade.scan(ScanOptions::default()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
