// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Gateway configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{ColorMode, ImageFormat};

/// Poll intervals and deadlines for the print job monitor.
///
/// Injectable so tests can run the full discovery/monitor state machine in
/// milliseconds instead of faking a clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between queue snapshots while discovering the new job id.
    pub discovery_interval: Duration,
    /// How long to keep looking for the new job id before assuming the job
    /// finished invisibly.
    pub discovery_timeout: Duration,
    /// Settle delay before reporting success on an invisible job.
    pub grace_period: Duration,
    /// Interval between status polls once the job id is known.
    pub status_interval: Duration,
    /// Hard deadline for the whole monitoring phase.
    pub status_timeout: Duration,
    /// Treat a job that never appears in the queue as a success after the
    /// grace period.  When false, such jobs are reported as unconfirmed
    /// failures instead (pessimistic policy).
    pub assume_success_when_invisible: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_millis(200),
            discovery_timeout: Duration::from_secs(5),
            grace_period: Duration::from_secs(1),
            status_interval: Duration::from_secs(1),
            status_timeout: Duration::from_secs(600),
            assume_success_when_invisible: true,
        }
    }
}

/// Top-level gateway settings.
///
/// Loading these from disk is an external concern; the gateway only needs
/// the resolved values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listen address for the duplex protocol.
    pub host: String,
    pub port: u16,
    /// Defaults applied to scan requests that omit the field.
    pub default_resolution: u32,
    pub default_color_mode: ColorMode,
    pub default_format: ImageFormat,
    /// Upper bound on a single blocking capture call.
    pub capture_timeout: Duration,
    pub monitor: MonitorConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 45677,
            default_resolution: 300,
            default_color_mode: ColorMode::Color,
            default_format: ImageFormat::Png,
            capture_timeout: Duration::from_secs(30),
            monitor: MonitorConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_bounded() {
        let cfg = GatewayConfig::default();
        assert!(cfg.monitor.discovery_timeout < cfg.monitor.status_timeout);
        assert!(cfg.capture_timeout >= Duration::from_secs(1));
        assert_eq!(cfg.default_resolution, 300);
    }
}
