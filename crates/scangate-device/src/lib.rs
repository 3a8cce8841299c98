// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Capture-subsystem integration: the driver-binding seam, capability
//! detection with graceful degradation, and the exclusive device session
//! facade the rest of the gateway goes through.

pub mod backend;
pub mod capability;
pub mod facade;
pub mod stub;

pub use backend::{CaptureBackend, CaptureSession, CapturedImage};
pub use capability::CapabilityCache;
pub use facade::DeviceFacade;
pub use stub::StubBackend;
