//! Crop lifecycle events written as JSON lines.
//!
//! `CROP_TELEMETRY_SINK=stderr` streams events next to diagnostics;
//! `CROP_TELEMETRY_SINK=file` appends them to `CROP_TELEMETRY_FILE`.
//! Stdout is never used: it carries the crop result line.

use std::fs::{File, OpenOptions};
use std::io::{Stderr, Write};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use crop_core::{TelemetryEvent, TelemetrySink};

pub const SINK_ENV: &str = "CROP_TELEMETRY_SINK";
pub const FILE_ENV: &str = "CROP_TELEMETRY_FILE";

pub fn sink_from_env() -> Option<Box<dyn TelemetrySink>> {
    let mode = std::env::var(SINK_ENV).ok()?;
    match sink_from_settings(&mode, std::env::var(FILE_ENV).ok()) {
        Ok(sink) => sink,
        Err(err) => {
            tracing::warn!(error = %format!("{:#}", err), "telemetry disabled");
            None
        }
    }
}

/// Unknown modes, and `file` without a path, yield no sink. A file that
/// cannot be opened is an error.
pub fn sink_from_settings(mode: &str, file: Option<String>) -> Result<Option<Box<dyn TelemetrySink>>> {
    match mode.trim().to_ascii_lowercase().as_str() {
        "stderr" => Ok(Some(Box::new(JsonLinesSink::stderr()))),
        "file" => match file.filter(|v| !v.trim().is_empty()) {
            Some(path) => Ok(Some(Box::new(JsonLinesSink::append_to(Path::new(&path))?))),
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, event: &TelemetryEvent) -> Result<()> {
        let line = serde_json::to_string(event).context("encoding crop event")?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow::anyhow!("telemetry writer poisoned"))?;
        writeln!(out, "{}", line).context("writing crop event")?;
        out.flush().context("flushing crop event")
    }
}

impl JsonLinesSink<Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl JsonLinesSink<File> {
    pub fn append_to(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening telemetry log {}", path.display()))?;
        Ok(Self::new(file))
    }
}

impl<W: Write + Send> TelemetrySink for JsonLinesSink<W> {
    fn emit(&self, event: TelemetryEvent) {
        if let Err(err) = self.record(&event) {
            tracing::debug!(error = %format!("{:#}", err), "dropped crop event");
        }
    }
}
