// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scangate — local scanner/printer gateway.
//
// Entry point. Initialises logging, probes the capture subsystem, wires
// the device facade and print orchestrator, and serves the duplex
// protocol until interrupted.

use std::sync::Arc;

use tracing::{info, warn};

use scangate_core::config::GatewayConfig;
use scangate_core::error::Result;
use scangate_device::{CapabilityCache, CaptureBackend, DeviceFacade, StubBackend};
use scangate_print::{stub_printer, PrintEngine, PrintOrchestrator, SpoolQueue, StubEngine, StubSpool};
use scangate_server::{Dispatcher, GatewayServer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Scangate gateway starting");

    let mut config = GatewayConfig::default();
    if let Ok(host) = std::env::var("SCANGATE_HOST") {
        config.host = host;
    }
    if let Ok(port) = std::env::var("SCANGATE_PORT") {
        match port.parse() {
            Ok(port) => config.port = port,
            Err(e) => warn!(error = %e, "SCANGATE_PORT not a port number, using default"),
        }
    }

    // Platform driver backends plug in at these three seams.  Without one
    // compiled in, capture degrades to print-only mode via the capability
    // probe, and SCANGATE_SIMULATE=1 swaps in simulated devices for
    // end-to-end exercising.
    let simulate = std::env::var("SCANGATE_SIMULATE").is_ok();
    let backend: Arc<dyn CaptureBackend> = if simulate {
        Arc::new(StubBackend::simulated(vec![
            "Scangate Virtual Scanner".into()
        ]))
    } else {
        Arc::new(StubBackend::unavailable(
            "no capture driver binding on this host",
        ))
    };
    let spool: Arc<dyn SpoolQueue> = Arc::new(StubSpool::empty(vec![stub_printer(
        "Scangate Virtual Printer",
        true,
    )]));
    let engine: Arc<dyn PrintEngine> = Arc::new(StubEngine::with_pages(1));

    let capability = Arc::new(CapabilityCache::new(Arc::clone(&backend)));

    // Startup probe: log the verdict and remediation steps before serving.
    let probe_cache = Arc::clone(&capability);
    let report = tokio::task::spawn_blocking(move || probe_cache.probe())
        .await
        .map_err(|e| scangate_core::ScangateError::Server(format!("startup probe: {e}")))?;
    for line in &report.recommendations {
        if report.state.is_available() {
            info!("{line}");
        } else {
            warn!("{line}");
        }
    }

    let facade = Arc::new(DeviceFacade::new(
        backend,
        Arc::clone(&capability),
        config.capture_timeout,
    ));
    let orchestrator = Arc::new(PrintOrchestrator::new(
        engine,
        spool,
        config.monitor.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        config.clone(),
        facade,
        capability,
        orchestrator,
    ));

    let mut server = GatewayServer::new(config, dispatcher);
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    server.stop().await?;
    Ok(())
}
