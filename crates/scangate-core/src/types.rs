// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scangate gateway.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScangateError};

/// Timestamp string in the format the gateway stamps on results
/// (`YYYY-MM-DD HH:MM:SS`, local-agnostic UTC).
pub fn timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Colour mode requested for a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ColorMode {
    #[default]
    Color,
    Gray,
    BlackWhite,
}

/// Output image format for a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Tiff,
    Bmp,
}

impl ImageFormat {
    /// Lowercase extension-style tag used in scan results.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Tiff => "tiff",
            Self::Bmp => "bmp",
        }
    }
}

/// Options for a single-shot capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanOptions {
    /// Device to capture from; empty string selects the first device.
    pub device_name: String,
    /// Resolution in DPI.
    pub resolution: u32,
    pub color_mode: ColorMode,
    pub format: ImageFormat,
    /// Whether the driver should show its own configuration dialog.
    pub show_ui: bool,
    /// Brightness adjustment, driver units.
    pub brightness: i32,
    /// Contrast adjustment, driver units.
    pub contrast: i32,
    pub auto_rotate: bool,
    pub auto_crop: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            device_name: String::new(),
            resolution: 300,
            color_mode: ColorMode::Color,
            format: ImageFormat::Png,
            show_ui: false,
            brightness: 0,
            contrast: 0,
            auto_rotate: false,
            auto_crop: false,
        }
    }
}

impl ScanOptions {
    /// Check the option ranges before touching the device.
    pub fn validate(&self) -> Result<()> {
        if !(50..=2400).contains(&self.resolution) {
            return Err(ScangateError::Validation(format!(
                "resolution {} out of range 50-2400",
                self.resolution
            )));
        }
        if !(-1000..=1000).contains(&self.brightness) {
            return Err(ScangateError::Validation(format!(
                "brightness {} out of range -1000..1000",
                self.brightness
            )));
        }
        if !(-1000..=1000).contains(&self.contrast) {
            return Err(ScangateError::Validation(format!(
                "contrast {} out of range -1000..1000",
                self.contrast
            )));
        }
        Ok(())
    }
}

/// Result of a capture operation, as sent back over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub success: bool,
    pub message: String,
    pub format: String,
    pub width: u32,
    pub height: u32,
    /// Base64-encoded image bytes (empty on failure).
    pub image_data: String,
    pub timestamp: String,
}

impl ScanOutcome {
    /// Failed outcome carrying only a message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            format: String::new(),
            width: 0,
            height: 0,
            image_data: String::new(),
            timestamp: timestamp(),
        }
    }
}

// ---------------------------------------------------------------------------
// Capability detection
// ---------------------------------------------------------------------------

/// Tri-state verdict on whether the capture subsystem is usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum CapabilityState {
    /// Not yet probed.
    Unprobed,
    /// A probe is in flight.
    Probing,
    /// All sub-probes passed.
    Available,
    /// At least one sub-probe failed.
    Unavailable { reason: String },
}

impl CapabilityState {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    /// The cached unavailability reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Unavailable { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Outcome of one sub-probe in the capability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    /// Probe name, e.g. "capture binding".
    pub name: String,
    pub ok: bool,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: true,
            error: None,
        }
    }

    pub fn fail(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Full capability report: sub-probe detail plus remediation guidance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityReport {
    pub state: CapabilityState,
    /// Every sub-probe attempted, in probe order.
    pub probes: Vec<ProbeResult>,
    /// One deterministic remediation line per failing probe.
    pub recommendations: Vec<String>,
    pub probed_at: String,
}

// ---------------------------------------------------------------------------
// Printing
// ---------------------------------------------------------------------------

/// Duplex printing mode, including "leave it to the printer default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DuplexMode {
    #[default]
    Default,
    Simplex,
    LongEdge,
    ShortEdge,
}

/// Options for a print job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrintOptions {
    pub printer_name: String,
    /// Base64 document bytes; a `data:...;base64,` prefix is stripped on
    /// decode (see `protocol::decode_document_data`).
    pub document_data: String,
    pub copies: u32,
    pub duplex: DuplexMode,
    /// Paper size name matched against the printer's supported sizes;
    /// empty keeps the printer default.
    pub paper_size: String,
    /// First page to print, 1-based.
    pub start_page: u32,
    /// Last page to print, 1-based; 0 means "last page of the document".
    pub end_page: u32,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            printer_name: String::new(),
            document_data: String::new(),
            copies: 1,
            duplex: DuplexMode::Default,
            paper_size: String::new(),
            start_page: 1,
            end_page: 0,
        }
    }
}

/// Terminal result of a print job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintOutcome {
    pub success: bool,
    pub message: String,
    pub total_pages: u32,
    pub printed_pages: u32,
    pub timestamp: String,
}

impl PrintOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            total_pages: 0,
            printed_pages: 0,
            timestamp: timestamp(),
        }
    }
}

/// Lifecycle stage of a long-running print job, streamed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStatus {
    Started,
    Preparing,
    Printing,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl ProgressStatus {
    /// Whether this status ends the progress stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::TimedOut
        )
    }
}

/// One out-of-band progress update for an async print job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintProgress {
    pub status: ProgressStatus,
    pub message: String,
    pub current_page: u32,
    pub total_pages: u32,
    /// 0-100; monotonic per job except on Failed/Cancelled/TimedOut.
    pub percentage: u8,
}

/// A job as surfaced by the OS print spooler.
///
/// Visibility in the queue is transient; a job may vanish before a terminal
/// status is ever observed, which the monitor treats as completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoolJob {
    pub job_id: u32,
    /// Raw status string from the spooler (queued/printing/error/...).
    pub status: String,
    pub document: String,
    pub pages_printed: u32,
    pub total_pages: u32,
    pub size: u64,
}

/// A printer known to the OS, with the capabilities clients care about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterInfo {
    pub name: String,
    pub is_default: bool,
    pub status: String,
    pub can_duplex: bool,
    pub max_copies: u32,
    pub supports_color: bool,
    /// Human-readable paper size descriptions.
    pub paper_sizes: Vec<String>,
    /// Technology class inferred from the device name (laser/inkjet/...).
    pub printer_type: String,
}
