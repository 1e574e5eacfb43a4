//! Records exchanged with the message transport.

use crate::error::TransformError;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One transform as it comes off the wire: the pose of `child_frame_id` in `parent_frame_id`.
/// Rotation is a quaternion in (x, y, z, w) order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct TransformRecord {
    pub parent_frame_id: String,
    pub child_frame_id: String,
    pub timestamp_nanos: i64,
    pub translation: [f64; 3],
    pub rotation: [f64; 4],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum AlertKind {
    Caution,
    Warning,
    Fatal,
    NotReady,
    DriversReady,
    Shutdown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct SystemAlert {
    pub kind: AlertKind,
    pub description: String,
}

impl SystemAlert {
    pub fn new(kind: AlertKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }
}

impl Display for SystemAlert {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.description)
    }
}

/// Everything a transport backed environment puts on the wire.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub enum WireMessage {
    Transforms(Vec<TransformRecord>),
    StaticTransforms(Vec<TransformRecord>),
    Alert(SystemAlert),
}

/// Outcome of a batch ingestion. Rejections never stop the batch.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestReport {
    pub accepted: usize,
    /// Position in the batch and reason of every rejected record.
    pub rejected: Vec<(usize, TransformError)>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    pub fn cycles(&self) -> impl Iterator<Item = &TransformError> {
        self.rejected
            .iter()
            .map(|(_, e)| e)
            .filter(|e| matches!(e, TransformError::CycleDetected { .. }))
    }
}
