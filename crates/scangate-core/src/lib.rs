// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scangate — Core types, wire envelopes, and error definitions shared
// across all crates.

pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub use config::{GatewayConfig, MonitorConfig};
pub use error::ScangateError;
pub use types::*;
