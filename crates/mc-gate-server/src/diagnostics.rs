//! Desync capture.
//!
//! When a tunnel loses track of packet boundaries it hands the unparsed
//! bytes and its recent relay history to a [`DiagnosticSink`] once, then
//! closes the connection.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};

/// Everything needed to reproduce a desync offline.
#[derive(Debug, Clone)]
pub struct DesyncReport {
    /// Which connection and direction failed, and why.
    pub context: String,
    /// Slot of the failing connection, used to name the artifact.
    pub slot: usize,
    /// Window contents starting at the packet that could not be parsed.
    pub unparsed: Bytes,
    /// Most recent relayed chunks, oldest first.
    pub history: Vec<Bytes>,
}

pub trait DiagnosticSink: Send + Sync {
    /// Record a report. Must not block the calling task.
    fn dump(&self, report: DesyncReport);
}

#[derive(Serialize)]
struct Artifact<'a> {
    context: &'a str,
    captured_at_ms: u128,
    unparsed: String,
    history: Vec<String>,
}

/// Writes one JSON file per report under a directory.
pub struct FileSink {
    directory: PathBuf,
}

impl FileSink {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }
}

impl DiagnosticSink for FileSink {
    fn dump(&self, report: DesyncReport) {
        let directory = self.directory.clone();
        let write = move || write_artifact(directory, report);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }
}

fn write_artifact(directory: PathBuf, report: DesyncReport) {
    let captured_at_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let artifact = Artifact {
        context: &report.context,
        captured_at_ms,
        unparsed: STANDARD.encode(&report.unparsed),
        history: report.history.iter().map(|c| STANDARD.encode(c)).collect(),
    };
    let path = directory.join(format!("desync-{captured_at_ms}-{}.json", report.slot));
    if let Err(e) = std::fs::create_dir_all(&directory) {
        warn!("Failed to create {}: {e}", directory.display());
        return;
    }
    match serde_json::to_string_pretty(&artifact) {
        Ok(json) => match std::fs::write(&path, json) {
            Ok(()) => info!("Wrote desync report {}", path.display()),
            Err(e) => warn!("Failed to write {}: {e}", path.display()),
        },
        Err(e) => warn!("Failed to serialize desync report: {e}"),
    }
}

/// Keeps reports in memory so tests can inspect them.
#[cfg(test)]
#[derive(Default)]
pub struct MemorySink {
    pub reports: parking_lot::Mutex<Vec<DesyncReport>>,
}

#[cfg(test)]
impl DiagnosticSink for MemorySink {
    fn dump(&self, report: DesyncReport) {
        self.reports.lock().push(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::store::testing::TempDir;

    #[test]
    fn artifact_is_base64_json() {
        let dir = TempDir::new("diagnostics");
        let sink = FileSink::new(dir.file("diagnostics"));
        sink.dump(DesyncReport {
            context: "client->server Steve".into(),
            slot: 7,
            unparsed: Bytes::from_static(&[0xEE, 0x01]),
            history: vec![Bytes::from_static(b"\x00"), Bytes::from_static(b"\x00\x00")],
        });

        let entries: Vec<_> = std::fs::read_dir(dir.file("diagnostics"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("desync-") && name.ends_with("-7.json"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&entries[0]).unwrap()).unwrap();
        assert_eq!(json["context"], "client->server Steve");
        assert_eq!(json["unparsed"], "7gE=");
        assert_eq!(json["history"].as_array().unwrap().len(), 2);
    }
}
