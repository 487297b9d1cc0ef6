//! Per-device packet traces, written when packet capture is enabled.
//!
//! Every frame exchange and every delivery becomes one JSON object per line in
//! `<dir>/Devices-<node>-0.jsonl`, where `<node>` is the transmitting node (for
//! deliveries, the receiving one).

use anyhow::Context;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    /// One transmission attempt of a data frame on a hop.
    Tx,
    /// A packet handed to the sink application.
    Rx,
    /// A packet dropped at the sender's MAC queue.
    QueueDrop,
    /// A packet abandoned after exhausting MAC retries.
    RetryDrop,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    /// Virtual time in seconds.
    pub time: f64,
    pub kind: TraceKind,
    pub packet: u64,
    pub from: usize,
    pub to: usize,
    pub bytes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snr_db: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

/// Lazily opened trace files, one per node.
pub struct PacketTrace {
    dir: PathBuf,
    writers: HashMap<usize, BufWriter<File>>,
    records: u64,
}

impl PacketTrace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writers: HashMap::new(),
            records: 0,
        }
    }

    pub fn file_path(&self, node: usize) -> PathBuf {
        self.dir.join(format!("Devices-{}-0.jsonl", node))
    }

    /// Append `record` to the trace of `node`.
    pub fn record(&mut self, node: usize, record: &TraceRecord) -> anyhow::Result<()> {
        if !self.writers.contains_key(&node) {
            let path = self.file_path(node);
            let file = File::create(&path).with_context(|| format!("Failed to create trace file {}", path.display()))?;
            log::debug!("Tracing node {} to {}", node, path.display());
            self.writers.insert(node, BufWriter::new(file));
        }
        if let Some(writer) = self.writers.get_mut(&node) {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
            self.records += 1;
        }
        Ok(())
    }

    /// Flush every open trace file.
    pub fn flush(&mut self) -> anyhow::Result<()> {
        for (node, writer) in self.writers.iter_mut() {
            writer.flush().with_context(|| format!("Failed to flush trace of node {}", node))?;
        }
        log::info!("Wrote {} trace records for {} devices to {}", self.records, self.writers.len(), self.dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wifi-throughput-sim-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn tx(packet: u64, from: usize, to: usize) -> TraceRecord {
        TraceRecord {
            time: 0.25,
            kind: TraceKind::Tx,
            packet,
            from,
            to,
            bytes: 1_536,
            rate: Some("HtMcs3"),
            snr_db: Some(13.5),
            attempt: Some(1),
            success: Some(true),
        }
    }

    #[test]
    fn writes_one_json_line_per_record_per_device() {
        let dir = scratch_dir("trace");
        let mut trace = PacketTrace::new(&dir);
        trace.record(2, &tx(0, 2, 1)).unwrap();
        trace.record(2, &tx(1, 2, 1)).unwrap();
        trace.record(1, &tx(0, 1, 0)).unwrap();
        trace.flush().unwrap();

        let node2 = fs::read_to_string(trace.file_path(2)).unwrap();
        let lines: Vec<&str> = node2.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["kind"], "tx");
        assert_eq!(first["rate"], "HtMcs3");
        assert_eq!(first["from"], 2);

        let node1 = fs::read_to_string(trace.file_path(1)).unwrap();
        assert_eq!(node1.lines().count(), 1);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn optional_fields_are_omitted() {
        let record = TraceRecord {
            time: 1.0,
            kind: TraceKind::QueueDrop,
            packet: 9,
            from: 2,
            to: 0,
            bytes: 1_472,
            rate: None,
            snr_db: None,
            attempt: None,
            success: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"time":1.0,"kind":"queue_drop","packet":9,"from":2,"to":0,"bytes":1472}"#);
    }
}
