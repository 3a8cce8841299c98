// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// One duplex client connection.
//
// Reads newline-delimited JSON commands and writes response frames through
// a single outbound queue, so inline responses and out-of-band progress
// frames from concurrently running jobs never interleave mid-line.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use scangate_core::error::Result;
use scangate_core::protocol::{CommandEnvelope, ResponseEnvelope};

use crate::dispatch::{ConnectionContext, Dispatcher};

/// Drive one client connection to completion.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let (outbound, mut outbox) = mpsc::unbounded_channel::<String>();

    // Single writer task: everything outbound funnels through the queue.
    let writer_task = tokio::spawn(async move {
        while let Some(line) = outbox.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err()
                || writer.write_all(b"\n").await.is_err()
                || writer.flush().await.is_err()
            {
                break;
            }
        }
    });

    let ctx = ConnectionContext::new(outbound.clone());
    send(&outbound, &ResponseEnvelope::connected());
    info!(peer = %peer, "client connected");

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match CommandEnvelope::decode(line) {
                    Ok(envelope) => {
                        if let Some(response) = dispatcher.dispatch(envelope, &ctx).await {
                            send(&outbound, &response);
                        }
                    }
                    Err(e) => {
                        debug!(peer = %peer, error = %e, "undecodable frame");
                        send(&outbound, &ResponseEnvelope::failure("", e.to_string()));
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(peer = %peer, error = %e, "read error, closing connection");
                break;
            }
        }
    }

    // Client gone: stop any monitors still running for this connection.
    ctx.cancel_all();
    drop(ctx);
    drop(outbound);
    let _ = writer_task.await;
    info!(peer = %peer, "client disconnected");
    Ok(())
}

fn send(outbound: &mpsc::UnboundedSender<String>, envelope: &ResponseEnvelope) {
    match envelope.encode() {
        Ok(line) => {
            let _ = outbound.send(line);
        }
        Err(e) => warn!(error = %e, "response encode failed"),
    }
}
