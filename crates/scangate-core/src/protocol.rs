// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wire protocol envelopes for the gateway's duplex channel.
//
// Frames are JSON objects, one per line.  A command carries a client-chosen
// correlation id which every response and progress frame echoes back, so a
// client can multiplex many in-flight requests over one connection.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ScangateError};

/// `message` tag on the immediate acknowledgement of an async print command.
pub const MSG_PRINT_STARTED: &str = "printStarted";

/// `message` tag distinguishing a progress frame from a terminal frame.
pub const MSG_PRINT_PROGRESS: &str = "printProgress";

/// `message` tag on the successful terminal frame of an async print.
pub const MSG_PRINT_COMPLETED: &str = "printCompleted";

/// `message` prefix on the failed terminal frame of an async print; the
/// failure reason follows the colon.
pub const MSG_PRINT_FAILED_PREFIX: &str = "printFailed: ";

/// Timestamp with millisecond precision, stamped on every outbound frame.
pub fn frame_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// An inbound command frame.  Immutable once decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    /// Correlation token, unique per in-flight request on a connection.
    #[serde(default)]
    pub id: String,
    /// Action name; routing is case-insensitive.
    pub action: String,
    /// Action-specific payload.
    #[serde(default)]
    pub data: Option<Value>,
}

impl CommandEnvelope {
    /// Decode a raw frame.  Fails with `Decode` unless the frame is a JSON
    /// object carrying at least an `action` field.
    pub fn decode(raw: &str) -> Result<Self> {
        let envelope: Self = serde_json::from_str(raw)
            .map_err(|e| ScangateError::Decode(format!("invalid command frame: {e}")))?;
        if envelope.action.trim().is_empty() {
            return Err(ScangateError::Decode("missing action".into()));
        }
        Ok(envelope)
    }

    /// Deserialize the payload into an action-specific options type,
    /// falling back to `T::default()` when `data` is absent.
    pub fn payload<T>(&self) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match &self.data {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| ScangateError::Decode(format!("invalid payload: {e}"))),
            None => Ok(T::default()),
        }
    }
}

/// An outbound frame: terminal response, progress update, or the unsolicited
/// `connected` greeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// Echoes the originating command id (empty for unsolicited frames).
    pub id: String,
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    pub timestamp: String,
}

impl ResponseEnvelope {
    pub fn ok(id: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            id: id.into(),
            success: true,
            message: None,
            data,
            timestamp: frame_timestamp(),
        }
    }

    pub fn ok_with_message(
        id: impl Into<String>,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            id: id.into(),
            success: true,
            message: Some(message.into()),
            data,
            timestamp: frame_timestamp(),
        }
    }

    pub fn failure(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            message: Some(message.into()),
            data: None,
            timestamp: frame_timestamp(),
        }
    }

    /// Unsolicited greeting sent when a connection is accepted.
    pub fn connected() -> Self {
        Self {
            id: String::new(),
            success: true,
            message: Some("connected".into()),
            data: None,
            timestamp: frame_timestamp(),
        }
    }

    /// Serialize to a single NDJSON line (no trailing newline).
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Decode base64 document bytes, tolerating a `data:...;base64,` URL prefix
/// as browsers produce from `FileReader.readAsDataURL`.
pub fn decode_document_data(encoded: &str) -> Result<Vec<u8>> {
    let trimmed = encoded.trim();
    let body = match trimmed.split_once(',') {
        Some((_, rest)) => rest,
        None => trimmed,
    };
    BASE64
        .decode(body)
        .map_err(|e| ScangateError::Decode(format!("invalid base64 document data: {e}")))
}

/// Encode raw image bytes for the `imageData` field of a scan result.
pub fn encode_image_data(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}
