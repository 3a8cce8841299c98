// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Trait seam for the document renderer / print engine.

use scangate_core::error::Result;
use scangate_core::types::PrintOptions;

/// Renders uploaded documents and hands rasterized jobs to the spooler.
pub trait PrintEngine: Send + Sync {
    /// Parse the raw document bytes into a printable document.
    fn open_document(&self, bytes: &[u8]) -> Result<Box<dyn LoadedDocument>>;
}

/// One parsed document, ready for submission.
pub trait LoadedDocument: Send {
    /// Number of pages in the document.
    fn page_count(&self) -> u32;

    /// Submit the given 1-based inclusive page range to the spooler under
    /// `job_name`.  Returns once the spooler has accepted the job; progress
    /// after that point is only observable through the queue.
    fn submit(
        &mut self,
        job_name: &str,
        options: &PrintOptions,
        first_page: u32,
        last_page: u32,
    ) -> Result<()>;
}
