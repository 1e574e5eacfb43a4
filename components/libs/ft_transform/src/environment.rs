//! The environment the frame tree lives in: who publishes transforms and alerts
//! and where they go.
//!
//! [`InMemoryEnvironment`] keeps everything in process, which is what tests and
//! single process deployments want. [`StreamEnvironment`] additionally frames
//! every batch and alert onto a byte stream so another process can replay them
//! with [`decode_stream`].

use crate::error::{TransformError, TransformResult};
use crate::record::{AlertKind, IngestReport, SystemAlert, TransformRecord, WireMessage};
use crate::tree::FrameTree;
use bincode::config::standard;
use bincode::{decode_from_slice, encode_to_vec};
use ft_clock::Timestamp;
use ft_spatial_payloads::RigidTransform;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

/// Frames larger than this are refused on both ends.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub trait EnvironmentManager: Send + Sync {
    /// Publish time varying transforms.
    fn publish_tf(&self, records: &[TransformRecord]) -> TransformResult<IngestReport>;

    /// Publish transforms valid at every time.
    fn publish_static_tf(&self, records: &[TransformRecord]) -> TransformResult<IngestReport>;

    fn publish_system_alert(&self, alert: SystemAlert) -> TransformResult<()>;

    /// Pose of `child` in `parent` at `time`.
    fn get_transform(
        &self,
        parent: &str,
        child: &str,
        time: Timestamp,
    ) -> TransformResult<RigidTransform>;

    fn get_time(&self) -> Timestamp;

    fn shutdown(&self);
}

/// Turns the cycle rejections of a batch into warning alerts.
fn cycle_alerts(report: &IngestReport) -> Vec<SystemAlert> {
    report
        .cycles()
        .map(|e| SystemAlert::new(AlertKind::Warning, e.to_string()))
        .collect()
}

/// An environment with no transport: transforms go straight into the tree and
/// alerts are recorded for inspection.
pub struct InMemoryEnvironment {
    tree: Arc<FrameTree>,
    source: String,
    alerts: Mutex<Vec<SystemAlert>>,
}

impl InMemoryEnvironment {
    /// `source` names the publisher in logs and in the stored samples.
    pub fn new(tree: Arc<FrameTree>, source: impl Into<String>) -> Self {
        Self {
            tree,
            source: source.into(),
            alerts: Mutex::new(Vec::new()),
        }
    }

    pub fn tree(&self) -> &Arc<FrameTree> {
        &self.tree
    }

    /// Every alert published so far, oldest first.
    pub fn alerts(&self) -> Vec<SystemAlert> {
        self.alerts.lock().clone()
    }

    fn apply(&self, records: &[TransformRecord], is_static: bool) -> IngestReport {
        let report = if is_static {
            self.tree.ingest_static_batch(records, &self.source)
        } else {
            self.tree.ingest_batch(records, &self.source)
        };
        for alert in cycle_alerts(&report) {
            self.record_alert(alert);
        }
        report
    }

    fn record_alert(&self, alert: SystemAlert) {
        match alert.kind {
            AlertKind::Fatal => error!("{alert}"),
            AlertKind::Warning | AlertKind::Caution => warn!("{alert}"),
            _ => info!("{alert}"),
        }
        self.alerts.lock().push(alert);
    }
}

impl EnvironmentManager for InMemoryEnvironment {
    fn publish_tf(&self, records: &[TransformRecord]) -> TransformResult<IngestReport> {
        Ok(self.apply(records, false))
    }

    fn publish_static_tf(&self, records: &[TransformRecord]) -> TransformResult<IngestReport> {
        Ok(self.apply(records, true))
    }

    fn publish_system_alert(&self, alert: SystemAlert) -> TransformResult<()> {
        self.record_alert(alert);
        Ok(())
    }

    fn get_transform(
        &self,
        parent: &str,
        child: &str,
        time: Timestamp,
    ) -> TransformResult<RigidTransform> {
        self.tree.transform(parent, child, time)
    }

    fn get_time(&self) -> Timestamp {
        self.tree.current_time()
    }

    fn shutdown(&self) {
        self.tree.shutdown();
    }
}

/// Frames every published message onto `writer` before applying it locally.
///
/// A frame is a little endian `u32` length followed by the bincode encoded
/// [`WireMessage`]. When the write fails nothing is applied locally.
pub struct StreamEnvironment<W: Write + Send> {
    local: InMemoryEnvironment,
    writer: Mutex<W>,
}

impl<W: Write + Send> StreamEnvironment<W> {
    pub fn new(tree: Arc<FrameTree>, source: impl Into<String>, writer: W) -> Self {
        Self {
            local: InMemoryEnvironment::new(tree, source),
            writer: Mutex::new(writer),
        }
    }

    pub fn tree(&self) -> &Arc<FrameTree> {
        self.local.tree()
    }

    pub fn alerts(&self) -> Vec<SystemAlert> {
        self.local.alerts()
    }

    /// Give back the writer, typically to inspect what was sent.
    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }

    fn send(&self, message: &WireMessage) -> TransformResult<()> {
        let payload = encode_to_vec(message, standard())
            .map_err(|e| TransformError::Transport(format!("could not encode message: {e}")))?;
        if payload.len() > MAX_FRAME_LEN {
            return Err(TransformError::Transport(format!(
                "message of {} bytes exceeds the {MAX_FRAME_LEN} bytes frame limit",
                payload.len()
            )));
        }
        let len = payload.len() as u32;

        write_frame(&mut *self.writer.lock(), len, &payload)
            .map_err(|e| TransformError::Transport(format!("could not write frame: {e}")))?;
        debug!("Sent a {len} bytes frame");
        Ok(())
    }
}

fn write_frame(writer: &mut impl Write, len: u32, payload: &[u8]) -> std::io::Result<()> {
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

impl<W: Write + Send> EnvironmentManager for StreamEnvironment<W> {
    fn publish_tf(&self, records: &[TransformRecord]) -> TransformResult<IngestReport> {
        // the receiving side derives cycle alerts on its own when replaying
        self.send(&WireMessage::Transforms(records.to_vec()))?;
        Ok(self.local.apply(records, false))
    }

    fn publish_static_tf(&self, records: &[TransformRecord]) -> TransformResult<IngestReport> {
        self.send(&WireMessage::StaticTransforms(records.to_vec()))?;
        Ok(self.local.apply(records, true))
    }

    fn publish_system_alert(&self, alert: SystemAlert) -> TransformResult<()> {
        self.send(&WireMessage::Alert(alert.clone()))?;
        self.local.record_alert(alert);
        Ok(())
    }

    fn get_transform(
        &self,
        parent: &str,
        child: &str,
        time: Timestamp,
    ) -> TransformResult<RigidTransform> {
        self.local.get_transform(parent, child, time)
    }

    fn get_time(&self) -> Timestamp {
        self.local.get_time()
    }

    fn shutdown(&self) {
        let alert = SystemAlert::new(AlertKind::Shutdown, "frame tree shutting down");
        if let Err(e) = self.publish_system_alert(alert) {
            warn!("Could not announce shutdown: {e}");
        }
        self.local.shutdown();
    }
}

/// Read back every frame written by a [`StreamEnvironment`].
///
/// A clean end of stream between two frames ends the read; a truncated frame is an error.
pub fn decode_stream<R: Read>(mut reader: R) -> TransformResult<Vec<WireMessage>> {
    let mut messages = Vec::new();
    loop {
        let mut len = [0u8; 4];
        match reader.read_exact(&mut len) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(TransformError::Transport(format!("could not read frame: {e}"))),
        }
        let len = u32::from_le_bytes(len) as usize;
        if len > MAX_FRAME_LEN {
            return Err(TransformError::Transport(format!(
                "frame of {len} bytes exceeds the {MAX_FRAME_LEN} bytes limit"
            )));
        }

        let mut payload = vec![0u8; len];
        reader
            .read_exact(&mut payload)
            .map_err(|e| TransformError::Transport(format!("truncated frame: {e}")))?;
        let (message, _) = decode_from_slice(&payload, standard())
            .map_err(|e| TransformError::Transport(format!("could not decode frame: {e}")))?;
        messages.push(message);
    }
    Ok(messages)
}

/// Apply decoded messages to an environment, the receiving half of a [`StreamEnvironment`].
pub fn replay(
    environment: &dyn EnvironmentManager,
    messages: impl IntoIterator<Item = WireMessage>,
) -> TransformResult<()> {
    for message in messages {
        match message {
            WireMessage::Transforms(records) => {
                environment.publish_tf(&records)?;
            }
            WireMessage::StaticTransforms(records) => {
                environment.publish_static_tf(&records)?;
            }
            WireMessage::Alert(alert) => environment.publish_system_alert(alert)?,
        }
    }
    Ok(())
}
