// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Gateway TCP server.
//
// Binds the configured listen address and accepts duplex client
// connections, each handled in its own task.  Shutdown is signalled
// through a `Notify`; connections mid-command are allowed to finish.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use scangate_core::config::GatewayConfig;
use scangate_core::error::{Result, ScangateError};

use crate::connection::handle_connection;
use crate::dispatch::Dispatcher;

pub struct GatewayServer {
    config: GatewayConfig,
    dispatcher: Arc<Dispatcher>,
    shutdown_signal: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    active_connections: Arc<AtomicU32>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
            local_addr: None,
            active_connections: Arc::new(AtomicU32::new(0)),
        }
    }

    /// The address actually bound, once started.  Differs from the config
    /// when port 0 was requested.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Bind the listener and spawn the accept loop.
    pub async fn start(&mut self) -> Result<()> {
        if self.task_handle.is_some() {
            debug!("gateway server already running");
            return Ok(());
        }

        let bind_addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ScangateError::Server(format!("bind {bind_addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ScangateError::Server(format!("local addr: {e}")))?;
        self.local_addr = Some(local_addr);
        info!(addr = %local_addr, "gateway listening");

        let shutdown = Arc::clone(&self.shutdown_signal);
        let dispatcher = Arc::clone(&self.dispatcher);
        let connections = Arc::clone(&self.active_connections);

        let handle = tokio::spawn(async move {
            Self::accept_loop(listener, shutdown, dispatcher, connections).await;
        });
        self.task_handle = Some(handle);
        Ok(())
    }

    /// Signal the accept loop to exit and wait for it.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.task_handle.take() else {
            return Ok(());
        };
        info!("stopping gateway server");
        self.shutdown_signal.notify_one();
        handle
            .await
            .map_err(|e| ScangateError::Server(format!("task join: {e}")))?;
        info!("gateway server stopped");
        Ok(())
    }

    async fn accept_loop(
        listener: TcpListener,
        shutdown: Arc<Notify>,
        dispatcher: Arc<Dispatcher>,
        connections: Arc<AtomicU32>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("accept loop received shutdown signal");
                    break;
                }

                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let dispatcher = Arc::clone(&dispatcher);
                            let connections = Arc::clone(&connections);
                            tokio::spawn(async move {
                                connections.fetch_add(1, Ordering::Relaxed);
                                if let Err(e) = handle_connection(stream, peer, dispatcher).await {
                                    warn!(peer = %peer, error = %e, "connection handler error");
                                }
                                connections.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }
}
