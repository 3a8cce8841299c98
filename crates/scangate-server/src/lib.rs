// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! The gateway's network face: a TCP server speaking newline-delimited
//! JSON with correlation ids, a case-insensitive command dispatcher, and
//! out-of-band progress streaming for monitored print jobs.

pub mod connection;
pub mod dispatch;
pub mod progress;
pub mod server;

pub use dispatch::{ConnectionContext, Dispatcher};
pub use progress::ProgressEmitter;
pub use server::GatewayServer;
