//! Report sinks.
//!
//! A sink failure fails the pass: the worker does not commit the watermark
//! for a report nobody received.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use smw_reconcile::Report;

pub trait ReportSink: Send {
    fn emit(&mut self, report: &Report) -> Result<()>;
}

/// Pretty-printed JSON on stdout, one document per pass.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl ReportSink for StdoutSink {
    fn emit(&mut self, report: &Report) -> Result<()> {
        let body = serde_json::to_string_pretty(report).context("serialize report failed")?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{body}").context("write report to stdout failed")?;
        out.flush().context("flush stdout failed")?;
        Ok(())
    }
}

/// Append-only JSON Lines file. One report == one line.
#[derive(Debug)]
pub struct JsonlFileSink {
    path: PathBuf,
}

impl JsonlFileSink {
    /// Ensures parent dirs exist.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for JsonlFileSink {
    fn emit(&mut self, report: &Report) -> Result<()> {
        let line = serde_json::to_string(report).context("serialize report failed")?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open report log {:?}", self.path))?;
        f.write_all(line.as_bytes())
            .context("write report line failed")?;
        f.write_all(b"\n").context("write newline failed")?;
        Ok(())
    }
}

/// Fan-out to several sinks in order. The first failure stops the fan-out.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: impl ReportSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ReportSink for MultiSink {
    fn emit(&mut self, report: &Report) -> Result<()> {
        for sink in &mut self.sinks {
            sink.emit(report)?;
        }
        Ok(())
    }
}
