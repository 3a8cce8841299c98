// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub spooler and print engine.
//
// Same two roles as the capture stub: hosts without a real spooler binding
// run against `StubSpool`/`StubEngine`, and tests script queue frames to
// drive the monitor through every path without an OS print queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use scangate_core::error::{Result, ScangateError};
use scangate_core::types::{PrintOptions, PrinterInfo, SpoolJob};

use crate::engine::{LoadedDocument, PrintEngine};
use crate::spool::{infer_printer_type, SpoolQueue};

/// Build a `PrinterInfo` with sensible capability defaults for tests and
/// the stub spooler.
pub fn stub_printer(name: &str, is_default: bool) -> PrinterInfo {
    PrinterInfo {
        name: name.to_string(),
        is_default,
        status: "Ready".into(),
        can_duplex: true,
        max_copies: 99,
        supports_color: true,
        paper_sizes: vec!["A4".into(), "Letter".into()],
        printer_type: infer_printer_type(name).to_string(),
    }
}

/// Scripted spooler: each `list_jobs` call consumes the next queue frame,
/// and the final frame repeats once the script runs out.
pub struct StubSpool {
    printers: Vec<PrinterInfo>,
    frames: Mutex<VecDeque<Vec<SpoolJob>>>,
    last: Mutex<Vec<SpoolJob>>,
    list_error: Option<String>,
    /// Times `list_jobs` was called.
    pub list_jobs_calls: Arc<AtomicUsize>,
}

impl StubSpool {
    /// A spooler whose queue is always empty.
    pub fn empty(printers: Vec<PrinterInfo>) -> Self {
        Self::scripted(printers, Vec::new())
    }

    /// A spooler that replays `frames` across successive `list_jobs` calls.
    pub fn scripted(printers: Vec<PrinterInfo>, frames: Vec<Vec<SpoolJob>>) -> Self {
        Self {
            printers,
            frames: Mutex::new(frames.into()),
            last: Mutex::new(Vec::new()),
            list_error: None,
            list_jobs_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make every `list_jobs` call fail with the given message.
    pub fn failing_jobs(mut self, message: impl Into<String>) -> Self {
        self.list_error = Some(message.into());
        self
    }
}

impl SpoolQueue for StubSpool {
    fn list_jobs(&self, _printer: &str) -> Result<Vec<SpoolJob>> {
        self.list_jobs_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.list_error {
            return Err(ScangateError::Spool(message.clone()));
        }

        let mut last = self
            .last
            .lock()
            .map_err(|_| ScangateError::Spool("stub queue lock poisoned".into()))?;
        if let Ok(mut frames) = self.frames.lock() {
            if let Some(frame) = frames.pop_front() {
                *last = frame;
            }
        }
        Ok(last.clone())
    }

    fn list_printers(&self) -> Result<Vec<PrinterInfo>> {
        Ok(self.printers.clone())
    }
}

/// Configurable stand-in for the document renderer.
pub struct StubEngine {
    page_count: u32,
    open_error: Option<String>,
    submit_error: Option<String>,
    /// Times a document was opened.
    pub opens: Arc<AtomicUsize>,
    /// Times a job was submitted.
    pub submits: Arc<AtomicUsize>,
}

impl StubEngine {
    /// An engine whose documents all have `page_count` pages.
    pub fn with_pages(page_count: u32) -> Self {
        Self {
            page_count,
            open_error: None,
            submit_error: None,
            opens: Arc::new(AtomicUsize::new(0)),
            submits: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make every open fail (corrupt document).
    pub fn failing_open(mut self, message: impl Into<String>) -> Self {
        self.open_error = Some(message.into());
        self
    }

    /// Make every submit fail (spooler rejected the job).
    pub fn failing_submit(mut self, message: impl Into<String>) -> Self {
        self.submit_error = Some(message.into());
        self
    }
}

impl PrintEngine for StubEngine {
    fn open_document(&self, bytes: &[u8]) -> Result<Box<dyn LoadedDocument>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.open_error {
            return Err(ScangateError::Render(message.clone()));
        }
        if bytes.is_empty() {
            return Err(ScangateError::Render("document is empty".into()));
        }
        Ok(Box::new(StubDocument {
            page_count: self.page_count,
            submit_error: self.submit_error.clone(),
            submits: Arc::clone(&self.submits),
        }))
    }
}

struct StubDocument {
    page_count: u32,
    submit_error: Option<String>,
    submits: Arc<AtomicUsize>,
}

impl LoadedDocument for StubDocument {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn submit(
        &mut self,
        _job_name: &str,
        _options: &PrintOptions,
        _first_page: u32,
        _last_page: u32,
    ) -> Result<()> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        match &self.submit_error {
            Some(message) => Err(ScangateError::Spool(message.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: u32, status: &str) -> SpoolJob {
        SpoolJob {
            job_id: id,
            status: status.into(),
            document: "doc".into(),
            pages_printed: 0,
            total_pages: 1,
            size: 100,
        }
    }

    #[test]
    fn scripted_frames_advance_then_repeat() {
        let spool = StubSpool::scripted(
            vec![stub_printer("HP LaserJet", true)],
            vec![vec![], vec![job(7, "Printing")]],
        );
        assert!(spool.list_jobs("HP LaserJet").expect("frame 1").is_empty());
        assert_eq!(spool.list_jobs("HP LaserJet").expect("frame 2").len(), 1);
        // Script exhausted; the last frame repeats.
        assert_eq!(spool.list_jobs("HP LaserJet").expect("repeat").len(), 1);
        assert_eq!(spool.list_jobs_calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn stub_engine_rejects_empty_documents() {
        let engine = StubEngine::with_pages(3);
        assert!(engine.open_document(b"").is_err());
        let doc = engine.open_document(b"%PDF-1.7").expect("open");
        assert_eq!(doc.page_count(), 3);
    }
}
