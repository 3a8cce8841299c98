// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command dispatch.
//
// Every inbound frame is routed here by action name (case-insensitive).
// Errors never escape: each handler's failure is folded into a failed
// response envelope carrying the originating command id, so one bad command
// can never take down the connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use scangate_core::config::GatewayConfig;
use scangate_core::error::{Result, ScangateError};
use scangate_core::protocol::{CommandEnvelope, ResponseEnvelope};
use scangate_core::types::{PrintOptions, ScanOptions, ScanOutcome};
use scangate_device::{CapabilityCache, DeviceFacade};
use scangate_print::{cancel_pair, CancelHandle, PrintOrchestrator};

use crate::progress::ProgressEmitter;

/// Per-connection state the dispatcher needs: the writer queue for
/// out-of-band frames and the in-flight async print jobs.
pub struct ConnectionContext {
    pub outbound: mpsc::UnboundedSender<String>,
    pub jobs: Arc<Mutex<HashMap<String, CancelHandle>>>,
}

impl ConnectionContext {
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            outbound,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Cancel everything still in flight.  Called when the connection
    /// closes so orphaned monitors do not keep polling the queue.
    pub fn cancel_all(&self) {
        if let Ok(jobs) = self.jobs.lock() {
            for handle in jobs.values() {
                handle.cancel();
            }
        }
    }
}

/// Routes commands to the capture facade, the capability cache, and the
/// print orchestrator.  Shared across all connections.
pub struct Dispatcher {
    config: GatewayConfig,
    facade: Arc<DeviceFacade>,
    capability: Arc<CapabilityCache>,
    orchestrator: Arc<PrintOrchestrator>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CancelRequest {
    /// Command id of the async print to cancel.
    job_id: String,
}

impl Dispatcher {
    pub fn new(
        config: GatewayConfig,
        facade: Arc<DeviceFacade>,
        capability: Arc<CapabilityCache>,
        orchestrator: Arc<PrintOrchestrator>,
    ) -> Self {
        Self {
            config,
            facade,
            capability,
            orchestrator,
        }
    }

    /// Handle one command.  Returns the terminal response, or `None` when
    /// the action acknowledges and streams its frames out-of-band instead.
    pub async fn dispatch(
        &self,
        envelope: CommandEnvelope,
        ctx: &ConnectionContext,
    ) -> Option<ResponseEnvelope> {
        let id = envelope.id.clone();
        debug!(id = %id, action = %envelope.action, "dispatching command");

        let result = match envelope.action.to_ascii_lowercase().as_str() {
            "ping" => Ok(Some(ResponseEnvelope::ok_with_message(&id, "pong", None))),
            "getscanners" => self.get_scanners(&id).await,
            "scan" => self.scan(&envelope).await,
            "getprinters" => self.get_printers(&id).await,
            "printpdf" => self.print_sync(&envelope).await,
            "printpdfasync" => self.print_async(&envelope, ctx),
            "checkcapabilitystatus" => self.check_capability(&id).await,
            "cancelprint" => self.cancel_print(&envelope, ctx),
            _ => Err(ScangateError::UnknownAction(envelope.action.clone())),
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                warn!(id = %id, action = %envelope.action, error = %e, "command failed");
                Some(ResponseEnvelope::failure(id, e.to_string()))
            }
        }
    }

    async fn get_scanners(&self, id: &str) -> Result<Option<ResponseEnvelope>> {
        let scanners = self.facade.list_scanners().await?;
        Ok(Some(ResponseEnvelope::ok(
            id,
            Some(json!({ "scanners": scanners })),
        )))
    }

    async fn scan(&self, envelope: &CommandEnvelope) -> Result<Option<ResponseEnvelope>> {
        let options: ScanOptions = match envelope.data {
            Some(_) => envelope.payload()?,
            None => self.default_scan_options(),
        };

        match self.facade.scan(options).await {
            Ok(outcome) => Ok(Some(ResponseEnvelope::ok(
                &envelope.id,
                Some(serde_json::to_value(outcome)?),
            ))),
            Err(e) => {
                // Failed scans still carry a result body so clients get a
                // uniform shape either way.
                let outcome = ScanOutcome::failure(e.to_string());
                let mut response = ResponseEnvelope::failure(&envelope.id, e.to_string());
                response.data = Some(serde_json::to_value(outcome)?);
                Ok(Some(response))
            }
        }
    }

    async fn get_printers(&self, id: &str) -> Result<Option<ResponseEnvelope>> {
        let printers = self.orchestrator.printers().await?;
        Ok(Some(ResponseEnvelope::ok(
            id,
            Some(json!({ "printers": printers })),
        )))
    }

    async fn print_sync(&self, envelope: &CommandEnvelope) -> Result<Option<ResponseEnvelope>> {
        let options: PrintOptions = envelope.payload()?;
        match self.orchestrator.print(options).await {
            Ok(outcome) => Ok(Some(ResponseEnvelope::ok(
                &envelope.id,
                Some(serde_json::to_value(outcome)?),
            ))),
            Err(e) => {
                let outcome = scangate_core::types::PrintOutcome::failure(e.to_string());
                let mut response = ResponseEnvelope::failure(&envelope.id, e.to_string());
                response.data = Some(serde_json::to_value(outcome)?);
                Ok(Some(response))
            }
        }
    }

    /// Kick off a monitored print.  The spawned monitor's `Started` frame
    /// doubles as the acknowledgement, so nothing is returned inline.
    fn print_async(
        &self,
        envelope: &CommandEnvelope,
        ctx: &ConnectionContext,
    ) -> Result<Option<ResponseEnvelope>> {
        let id = envelope.id.clone();
        if id.is_empty() {
            return Err(ScangateError::Validation(
                "printPdfAsync requires a command id".into(),
            ));
        }
        let options: PrintOptions = envelope.payload()?;

        let (handle, token) = cancel_pair();
        {
            let mut jobs = ctx
                .jobs
                .lock()
                .map_err(|_| ScangateError::Server("job table lock poisoned".into()))?;
            if jobs.contains_key(&id) {
                return Err(ScangateError::Validation(format!(
                    "command id already in flight: {id}"
                )));
            }
            jobs.insert(id.clone(), handle);
        }

        let emitter = ProgressEmitter::new(id.clone(), ctx.outbound.clone());
        let orchestrator = Arc::clone(&self.orchestrator);
        let jobs = Arc::clone(&ctx.jobs);
        tokio::spawn(async move {
            let outcome = orchestrator
                .submit_and_monitor(options, &emitter, token)
                .await;
            info!(id = %id, success = outcome.success, "async print finished");
            if let Ok(mut jobs) = jobs.lock() {
                jobs.remove(&id);
            }
        });

        Ok(None)
    }

    /// Re-probe the capture subsystem and report the fresh verdict.
    async fn check_capability(&self, id: &str) -> Result<Option<ResponseEnvelope>> {
        let capability = Arc::clone(&self.capability);
        let report = tokio::task::spawn_blocking(move || capability.probe())
            .await
            .map_err(|e| ScangateError::Server(format!("probe task failed: {e}")))?;
        Ok(Some(ResponseEnvelope::ok(
            id,
            Some(serde_json::to_value(report)?),
        )))
    }

    /// Cancel an in-flight async print by its command id.  Idempotent: a
    /// job that already finished (or never existed) yields success with a
    /// note rather than an error.
    fn cancel_print(
        &self,
        envelope: &CommandEnvelope,
        ctx: &ConnectionContext,
    ) -> Result<Option<ResponseEnvelope>> {
        let request: CancelRequest = envelope.payload()?;
        if request.job_id.is_empty() {
            return Err(ScangateError::Validation("jobId is required".into()));
        }

        let found = match ctx.jobs.lock() {
            Ok(jobs) => match jobs.get(&request.job_id) {
                Some(handle) => {
                    handle.cancel();
                    true
                }
                None => false,
            },
            Err(_) => return Err(ScangateError::Server("job table lock poisoned".into())),
        };

        let message = if found {
            "cancellation requested"
        } else {
            "no such job in flight"
        };
        info!(job_id = %request.job_id, found, "cancelPrint");
        Ok(Some(ResponseEnvelope::ok_with_message(
            &envelope.id,
            message,
            Some(json!({ "jobId": request.job_id, "found": found })),
        )))
    }

    fn default_scan_options(&self) -> ScanOptions {
        ScanOptions {
            resolution: self.config.default_resolution,
            color_mode: self.config.default_color_mode,
            format: self.config.default_format,
            ..ScanOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use scangate_core::config::MonitorConfig;
    use scangate_core::protocol::{
        MSG_PRINT_COMPLETED, MSG_PRINT_FAILED_PREFIX, MSG_PRINT_STARTED,
    };
    use scangate_device::StubBackend;
    use scangate_print::{stub_printer, StubEngine, StubSpool};
    use std::time::Duration;

    fn fast_monitor() -> MonitorConfig {
        MonitorConfig {
            discovery_interval: Duration::from_millis(5),
            discovery_timeout: Duration::from_millis(50),
            grace_period: Duration::from_millis(10),
            status_interval: Duration::from_millis(5),
            status_timeout: Duration::from_millis(200),
            assume_success_when_invisible: true,
        }
    }

    fn dispatcher_with(backend: StubBackend, engine: StubEngine, spool: StubSpool) -> Dispatcher {
        let backend = Arc::new(backend);
        let capability = Arc::new(CapabilityCache::new(backend.clone()));
        let facade = Arc::new(DeviceFacade::new(
            backend,
            Arc::clone(&capability),
            Duration::from_secs(5),
        ));
        let orchestrator = Arc::new(PrintOrchestrator::new(
            Arc::new(engine),
            Arc::new(spool),
            fast_monitor(),
        ));
        let config = GatewayConfig {
            monitor: fast_monitor(),
            ..GatewayConfig::default()
        };
        Dispatcher::new(config, facade, capability, orchestrator)
    }

    fn simulated_dispatcher() -> Dispatcher {
        dispatcher_with(
            StubBackend::simulated(vec!["Stub Scanner".into()]),
            StubEngine::with_pages(2),
            StubSpool::empty(vec![stub_printer("HP LaserJet", true)]),
        )
    }

    fn command(id: &str, action: &str, data: Option<serde_json::Value>) -> CommandEnvelope {
        CommandEnvelope {
            id: id.into(),
            action: action.into(),
            data,
        }
    }

    fn context() -> (ConnectionContext, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionContext::new(tx), rx)
    }

    async fn recv_envelope(rx: &mut mpsc::UnboundedReceiver<String>) -> ResponseEnvelope {
        let line = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("frame within deadline")
            .expect("channel open");
        serde_json::from_str(&line).expect("valid response envelope")
    }

    #[tokio::test]
    async fn ping_pongs_with_the_same_id() {
        let dispatcher = simulated_dispatcher();
        let (ctx, _rx) = context();

        let response = dispatcher
            .dispatch(command("req-1", "ping", None), &ctx)
            .await
            .expect("inline response");
        assert_eq!(response.id, "req-1");
        assert!(response.success);
        assert_eq!(response.message.as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn action_routing_is_case_insensitive() {
        let dispatcher = simulated_dispatcher();
        let (ctx, _rx) = context();

        let response = dispatcher
            .dispatch(command("req-2", "GetScanners", None), &ctx)
            .await
            .expect("inline response");
        assert!(response.success);
        let scanners = &response.data.unwrap()["scanners"];
        assert_eq!(scanners[0], "Stub Scanner");
    }

    #[tokio::test]
    async fn unknown_action_fails_without_closing_anything() {
        let dispatcher = simulated_dispatcher();
        let (ctx, _rx) = context();

        let response = dispatcher
            .dispatch(command("req-3", "fireMissiles", None), &ctx)
            .await
            .expect("inline response");
        assert!(!response.success);
        assert!(response.message.unwrap().contains("fireMissiles"));
        assert_eq!(response.id, "req-3");
    }

    #[tokio::test]
    async fn scan_failure_keeps_the_result_shape() {
        let dispatcher = dispatcher_with(
            StubBackend::unavailable("binding not linked"),
            StubEngine::with_pages(2),
            StubSpool::empty(vec![stub_printer("HP LaserJet", true)]),
        );
        let (ctx, _rx) = context();

        let response = dispatcher
            .dispatch(command("req-4", "scan", None), &ctx)
            .await
            .expect("inline response");
        assert!(!response.success);
        let data = response.data.expect("failed scan still has a body");
        assert_eq!(data["success"], false);
        assert_eq!(data["imageData"], "");
    }

    #[tokio::test]
    async fn async_print_streams_frames_with_the_command_id() {
        let dispatcher = simulated_dispatcher();
        let (ctx, mut rx) = context();
        let doc = STANDARD.encode(b"%PDF-1.7 test");

        let inline = dispatcher
            .dispatch(
                command(
                    "job-1",
                    "printPdfAsync",
                    Some(json!({ "printerName": "HP LaserJet", "documentData": doc })),
                ),
                &ctx,
            )
            .await;
        assert!(inline.is_none(), "async print acknowledges out-of-band");

        let first = recv_envelope(&mut rx).await;
        assert_eq!(first.id, "job-1");
        assert_eq!(first.message.as_deref(), Some(MSG_PRINT_STARTED));

        let mut last = first;
        loop {
            let frame = recv_envelope(&mut rx).await;
            assert_eq!(frame.id, "job-1");
            let done = frame.message.as_deref() == Some(MSG_PRINT_COMPLETED)
                || frame
                    .message
                    .as_deref()
                    .is_some_and(|m| m.starts_with(MSG_PRINT_FAILED_PREFIX));
            last = frame;
            if done {
                break;
            }
        }
        assert!(last.success);
        assert_eq!(last.data.unwrap()["percentage"], 100);

        // The job table empties once the monitor finishes.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ctx.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_in_flight_id_is_rejected() {
        let dispatcher = dispatcher_with(
            StubBackend::simulated(vec![]),
            StubEngine::with_pages(2),
            // Job sits in the queue so the first monitor stays in flight.
            StubSpool::scripted(
                vec![stub_printer("HP LaserJet", true)],
                vec![
                    vec![],
                    vec![scangate_core::types::SpoolJob {
                        job_id: 3,
                        status: "Printing".into(),
                        document: "doc".into(),
                        pages_printed: 0,
                        total_pages: 2,
                        size: 10,
                    }],
                ],
            ),
        );
        let (ctx, mut rx) = context();
        let doc = STANDARD.encode(b"%PDF-1.7 test");
        let payload = json!({ "printerName": "HP LaserJet", "documentData": doc });

        let first = dispatcher
            .dispatch(command("job-dup", "printPdfAsync", Some(payload.clone())), &ctx)
            .await;
        assert!(first.is_none());
        // Wait for the ack so the job is known to be registered.
        let ack = recv_envelope(&mut rx).await;
        assert_eq!(ack.message.as_deref(), Some(MSG_PRINT_STARTED));

        let second = dispatcher
            .dispatch(command("job-dup", "printPdfAsync", Some(payload)), &ctx)
            .await
            .expect("inline rejection");
        assert!(!second.success);
        assert!(second.message.unwrap().contains("already in flight"));
    }

    #[tokio::test]
    async fn cancel_print_is_idempotent() {
        let dispatcher = simulated_dispatcher();
        let (ctx, _rx) = context();

        let response = dispatcher
            .dispatch(
                command("req-6", "cancelPrint", Some(json!({ "jobId": "nope" }))),
                &ctx,
            )
            .await
            .expect("inline response");
        assert!(response.success);
        assert_eq!(response.data.unwrap()["found"], false);
    }

    #[tokio::test]
    async fn capability_check_runs_a_fresh_probe() {
        let dispatcher = dispatcher_with(
            StubBackend::unavailable("binding not linked"),
            StubEngine::with_pages(2),
            StubSpool::empty(vec![stub_printer("HP LaserJet", true)]),
        );
        let (ctx, _rx) = context();

        let response = dispatcher
            .dispatch(command("req-7", "checkCapabilityStatus", None), &ctx)
            .await
            .expect("inline response");
        assert!(response.success, "the probe itself succeeded");
        let data = response.data.unwrap();
        assert_eq!(data["state"]["state"], "unavailable");
        assert!(data["recommendations"][0]
            .as_str()
            .unwrap()
            .contains("print-only mode"));
    }
}
