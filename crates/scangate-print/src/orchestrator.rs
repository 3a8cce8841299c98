// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print job orchestrator: submit, then watch the spooler queue until the
// job can be confirmed done (or cannot be confirmed at all).
//
// The queue is eventually consistent in both directions.  A submitted job
// may take a moment to appear, and a fast job may finish and vanish before
// it is ever observed.  Discovery therefore diffs queue snapshots taken
// before and after submission, and an invisible job is (by default) taken
// as having completed once a grace period passes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use scangate_core::config::MonitorConfig;
use scangate_core::error::{Result, ScangateError};
use scangate_core::protocol::decode_document_data;
use scangate_core::types::{
    timestamp, PrintOptions, PrintOutcome, PrintProgress, PrinterInfo, ProgressStatus, SpoolJob,
};

use crate::cancel::CancelToken;
use crate::engine::{LoadedDocument as _, PrintEngine};
use crate::spool::{document_fingerprint, is_error_status, SpoolQueue};

/// Receives out-of-band progress updates for a monitored job.
///
/// `emit` must not block; the server implementation pushes onto an
/// unbounded channel drained by the connection's writer task.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, progress: &PrintProgress);
}

/// Coordinates the print engine and the spool queue for one gateway.
pub struct PrintOrchestrator {
    engine: Arc<dyn PrintEngine>,
    spool: Arc<dyn SpoolQueue>,
    config: MonitorConfig,
}

impl PrintOrchestrator {
    pub fn new(
        engine: Arc<dyn PrintEngine>,
        spool: Arc<dyn SpoolQueue>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            engine,
            spool,
            config,
        }
    }

    /// Printers installed on this host.
    pub async fn printers(&self) -> Result<Vec<PrinterInfo>> {
        let spool = Arc::clone(&self.spool);
        run_blocking(move || spool.list_printers()).await
    }

    /// Fire-and-confirm print: decode, render, submit, and return as soon
    /// as the spooler accepts the job.  No queue monitoring.
    pub async fn print(&self, options: PrintOptions) -> Result<PrintOutcome> {
        validate_print_options(&options)?;
        let bytes = decode_document_data(&options.document_data)?;
        let printer = self.resolve_printer(&options.printer_name).await?;
        let job_name = format!("scangate-{}", document_fingerprint(&bytes));

        let engine = Arc::clone(&self.engine);
        let mut opts = options.clone();
        opts.printer_name = printer.clone();
        let job_name_for_submit = job_name.clone();
        let (total, printed) = run_blocking(move || {
            let mut document = engine.open_document(&bytes)?;
            let pages = document.page_count();
            let (first, last) = resolve_page_range(&opts, pages)?;
            document.submit(&job_name_for_submit, &opts, first, last)?;
            Ok((pages, last - first + 1))
        })
        .await?;

        info!(printer = %printer, job = %job_name, pages = printed, "print job submitted");
        Ok(PrintOutcome {
            success: true,
            message: "print completed".into(),
            total_pages: total,
            printed_pages: printed,
            timestamp: timestamp(),
        })
    }

    /// Submit a job and watch it through the queue, streaming progress to
    /// `sink`.  Always emits exactly one terminal frame, and never returns
    /// an error: failures are folded into the outcome.
    pub async fn submit_and_monitor(
        &self,
        options: PrintOptions,
        sink: &dyn ProgressSink,
        mut cancel: CancelToken,
    ) -> PrintOutcome {
        sink.emit(&frame(ProgressStatus::Started, "print job accepted", 0, 0, 0));

        match self.run_monitored(options, sink, &mut cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let status = match &e {
                    ScangateError::Cancelled => ProgressStatus::Cancelled,
                    ScangateError::MonitorTimeout(_) => ProgressStatus::TimedOut,
                    _ => ProgressStatus::Failed,
                };
                warn!(error = %e, "monitored print job failed");
                sink.emit(&frame(status, e.to_string(), 0, 0, 0));
                PrintOutcome::failure(e.to_string())
            }
        }
    }

    async fn run_monitored(
        &self,
        options: PrintOptions,
        sink: &dyn ProgressSink,
        cancel: &mut CancelToken,
    ) -> Result<PrintOutcome> {
        // Validation happens before the queue is touched at all.
        validate_print_options(&options)?;
        let bytes = decode_document_data(&options.document_data)?;
        let printer = self.resolve_printer(&options.printer_name).await?;
        sink.emit(&frame(ProgressStatus::Preparing, "document received", 0, 0, 10));
        self.check_cancel(cancel)?;

        // Snapshot the queue before submission so the new job id can be
        // recognized by diffing.
        let before: HashSet<u32> = self
            .jobs(&printer)
            .await?
            .iter()
            .map(|j| j.job_id)
            .collect();

        let job_name = format!("scangate-{}", document_fingerprint(&bytes));
        let engine = Arc::clone(&self.engine);
        let mut document = run_blocking(move || engine.open_document(&bytes)).await?;
        let total = document.page_count();
        let (first, last) = resolve_page_range(&options, total)?;
        let printed = last - first + 1;
        sink.emit(&frame(ProgressStatus::Preparing, "document loaded", 0, total, 20));
        self.check_cancel(cancel)?;

        let mut opts = options.clone();
        opts.printer_name = printer.clone();
        let submit_name = job_name.clone();
        run_blocking(move || document.submit(&submit_name, &opts, first, last)).await?;
        info!(printer = %printer, job = %job_name, pages = printed, "job handed to the spooler");
        sink.emit(&frame(ProgressStatus::Printing, "job handed to the spooler", 0, total, 90));

        match self.discover_job(&printer, &before, cancel).await? {
            Some(job_id) => {
                self.watch_job(&printer, job_id, printed, total, sink, cancel)
                    .await
            }
            None => {
                // The job never showed up.  Give the spooler one more
                // settle interval, then apply the invisibility policy.
                self.pause(self.config.grace_period, cancel).await?;
                if let Some(job_id) = self.find_new_job(&printer, &before).await? {
                    return self
                        .watch_job(&printer, job_id, printed, total, sink, cancel)
                        .await;
                }
                if self.config.assume_success_when_invisible {
                    debug!(printer = %printer, "job left the queue before it was observed");
                    sink.emit(&frame(
                        ProgressStatus::Completed,
                        "print completed",
                        printed,
                        total,
                        100,
                    ));
                    Ok(PrintOutcome {
                        success: true,
                        message: "print completed".into(),
                        total_pages: total,
                        printed_pages: printed,
                        timestamp: timestamp(),
                    })
                } else {
                    Err(ScangateError::Spool(
                        "job never appeared in the print queue".into(),
                    ))
                }
            }
        }
    }

    /// Poll the queue until a job id not in `before` appears, or the
    /// discovery deadline passes.
    async fn discover_job(
        &self,
        printer: &str,
        before: &HashSet<u32>,
        cancel: &mut CancelToken,
    ) -> Result<Option<u32>> {
        let deadline = Instant::now() + self.config.discovery_timeout;
        loop {
            if let Some(job_id) = self.find_new_job(printer, before).await? {
                return Ok(Some(job_id));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            self.pause(self.config.discovery_interval, cancel).await?;
        }
    }

    async fn find_new_job(&self, printer: &str, before: &HashSet<u32>) -> Result<Option<u32>> {
        Ok(self
            .jobs(printer)
            .await?
            .iter()
            .map(|j| j.job_id)
            .find(|id| !before.contains(id)))
    }

    /// Watch one known job id until it vanishes (done), errors, or the
    /// status deadline passes.
    async fn watch_job(
        &self,
        printer: &str,
        job_id: u32,
        printed: u32,
        total: u32,
        sink: &dyn ProgressSink,
        cancel: &mut CancelToken,
    ) -> Result<PrintOutcome> {
        debug!(printer = %printer, job_id, "job visible in the queue");
        sink.emit(&frame(
            ProgressStatus::Printing,
            "job visible in the print queue",
            0,
            total,
            95,
        ));
        let deadline = Instant::now() + self.config.status_timeout;
        let mut last_emitted = 95u8;

        loop {
            self.pause(self.config.status_interval, cancel).await?;
            let jobs = self.jobs(printer).await?;
            match jobs.iter().find(|j| j.job_id == job_id) {
                // Gone from the queue means the spooler is done with it.
                None => {
                    sink.emit(&frame(
                        ProgressStatus::Completed,
                        "print completed",
                        printed,
                        total,
                        100,
                    ));
                    return Ok(PrintOutcome {
                        success: true,
                        message: "print completed".into(),
                        total_pages: total,
                        printed_pages: printed,
                        timestamp: timestamp(),
                    });
                }
                Some(job) if is_error_status(&job.status) => {
                    return Err(ScangateError::Spool(format!(
                        "print job failed in the queue: {}",
                        job.status
                    )));
                }
                Some(job) => {
                    let pct = monitoring_percentage(job.pages_printed, printed);
                    if pct != last_emitted {
                        last_emitted = pct;
                        sink.emit(&frame(
                            ProgressStatus::Printing,
                            "printing",
                            job.pages_printed,
                            total,
                            pct,
                        ));
                    }
                }
            }
            if Instant::now() >= deadline {
                return Err(ScangateError::MonitorTimeout(format!(
                    "job still in the queue after {:?}; completion cannot be confirmed",
                    self.config.status_timeout
                )));
            }
        }
    }

    async fn jobs(&self, printer: &str) -> Result<Vec<SpoolJob>> {
        let spool = Arc::clone(&self.spool);
        let printer = printer.to_string();
        run_blocking(move || spool.list_jobs(&printer)).await
    }

    /// Map an empty printer name to the default (or first) installed
    /// printer, and reject names that match nothing.
    async fn resolve_printer(&self, name: &str) -> Result<String> {
        let printers = self.printers().await?;
        if name.is_empty() {
            return printers
                .iter()
                .find(|p| p.is_default)
                .or_else(|| printers.first())
                .map(|p| p.name.clone())
                .ok_or_else(|| ScangateError::Validation("no printers installed".into()));
        }
        printers
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.name.clone())
            .ok_or_else(|| ScangateError::Validation(format!("printer not found: {name}")))
    }

    async fn pause(&self, duration: Duration, cancel: &mut CancelToken) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ScangateError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    fn check_cancel(&self, cancel: &CancelToken) -> Result<()> {
        if cancel.is_cancelled() {
            Err(ScangateError::Cancelled)
        } else {
            Ok(())
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ScangateError::Spool(format!("blocking task failed: {e}")))?
}

fn frame(
    status: ProgressStatus,
    message: impl Into<String>,
    current_page: u32,
    total_pages: u32,
    percentage: u8,
) -> PrintProgress {
    PrintProgress {
        status,
        message: message.into(),
        current_page,
        total_pages,
        percentage,
    }
}

/// While a job sits in the queue, progress crawls from 95 toward 99 using
/// the spooler's printed-page counter.  100 is only reported once the job
/// leaves the queue.
fn monitoring_percentage(pages_printed: u32, pages_in_range: u32) -> u8 {
    let ratio = (pages_printed * 4) / pages_in_range.max(1);
    (95 + ratio.min(4)).min(99) as u8
}

fn validate_print_options(options: &PrintOptions) -> Result<()> {
    if options.document_data.is_empty() {
        return Err(ScangateError::Validation("documentData is required".into()));
    }
    if options.copies == 0 {
        return Err(ScangateError::Validation(
            "copies must be at least 1".into(),
        ));
    }
    if options.start_page == 0 {
        return Err(ScangateError::Validation("startPage is 1-based".into()));
    }
    if options.end_page != 0 && options.end_page < options.start_page {
        return Err(ScangateError::Validation(format!(
            "endPage {} before startPage {}",
            options.end_page, options.start_page
        )));
    }
    Ok(())
}

/// Resolve the requested 1-based inclusive page range against the actual
/// document length.  `end_page == 0` means "to the last page".
fn resolve_page_range(options: &PrintOptions, pages: u32) -> Result<(u32, u32)> {
    if pages == 0 {
        return Err(ScangateError::Render("document has no pages".into()));
    }
    if options.start_page > pages {
        return Err(ScangateError::Validation(format!(
            "startPage {} beyond document end ({} pages)",
            options.start_page, pages
        )));
    }
    let last = if options.end_page == 0 {
        pages
    } else {
        options.end_page.min(pages)
    };
    Ok((options.start_page, last))
}
