// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Print-side integration: the spooler and renderer seams, cancellation
//! plumbing, and the submit-and-monitor orchestrator that streams job
//! progress back to clients.

pub mod cancel;
pub mod engine;
pub mod orchestrator;
pub mod spool;
pub mod stub;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use engine::{LoadedDocument, PrintEngine};
pub use orchestrator::{PrintOrchestrator, ProgressSink};
pub use spool::SpoolQueue;
pub use stub::{stub_printer, StubEngine, StubSpool};
