// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridges orchestrator progress frames onto a connection's outbound queue.

use tokio::sync::mpsc;
use tracing::warn;

use scangate_core::protocol::{
    ResponseEnvelope, MSG_PRINT_COMPLETED, MSG_PRINT_FAILED_PREFIX, MSG_PRINT_PROGRESS,
    MSG_PRINT_STARTED,
};
use scangate_core::types::{PrintProgress, ProgressStatus};
use scangate_print::ProgressSink;

/// Tags each progress frame with the originating command id and pushes the
/// encoded line onto the connection's writer queue.  Never blocks; if the
/// connection is gone the frame is dropped.
pub struct ProgressEmitter {
    id: String,
    outbound: mpsc::UnboundedSender<String>,
}

impl ProgressEmitter {
    pub fn new(id: impl Into<String>, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: id.into(),
            outbound,
        }
    }
}

impl ProgressSink for ProgressEmitter {
    fn emit(&self, progress: &PrintProgress) {
        let data = match serde_json::to_value(progress) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "progress frame not serializable");
                None
            }
        };

        let envelope = match progress.status {
            ProgressStatus::Started => {
                ResponseEnvelope::ok_with_message(&self.id, MSG_PRINT_STARTED, data)
            }
            ProgressStatus::Completed => {
                ResponseEnvelope::ok_with_message(&self.id, MSG_PRINT_COMPLETED, data)
            }
            ProgressStatus::Failed | ProgressStatus::Cancelled | ProgressStatus::TimedOut => {
                let mut envelope = ResponseEnvelope::failure(
                    &self.id,
                    format!("{MSG_PRINT_FAILED_PREFIX}{}", progress.message),
                );
                envelope.data = data;
                envelope
            }
            _ => ResponseEnvelope::ok_with_message(&self.id, MSG_PRINT_PROGRESS, data),
        };

        match envelope.encode() {
            Ok(line) => {
                let _ = self.outbound.send(line);
            }
            Err(e) => warn!(error = %e, "progress frame encode failed"),
        }
    }
}
