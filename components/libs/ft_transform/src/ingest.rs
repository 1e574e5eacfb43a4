//! Validation and application of incoming samples.

use crate::config::TreeConfig;
use crate::error::{TransformError, TransformResult};
use crate::frames::frame_id;
use crate::record::{IngestReport, TransformRecord};
use crate::transform::{FrameBuffer, InsertOutcome, TransformSample, TransformStore};
use crate::tree_index::{EdgeChange, SharedTreeIndex};
use ft_clock::Timestamp;
use ft_spatial_payloads::RigidTransform;
use glam::{DQuat, DVec3};
use log::{debug, trace, warn};
use std::sync::Arc;

/// Check a record and turn it into a sample.
///
/// Translation and rotation must be finite and the rotation norm within
/// `quaternion_norm_tolerance` of 1; such rotations are renormalized.
pub fn validate_record(
    record: &TransformRecord,
    source: &Arc<str>,
    quaternion_norm_tolerance: f64,
) -> TransformResult<TransformSample> {
    let child = &record.child_frame_id;
    let invalid = |reason: String| TransformError::InvalidTransform {
        child: child.clone(),
        reason,
    };

    let child_frame = frame_id(child, child)?;
    let parent_frame = frame_id(&record.parent_frame_id, child)?;

    let translation = DVec3::from_array(record.translation);
    if !translation.is_finite() {
        return Err(invalid(format!(
            "translation {:?} is not finite",
            record.translation
        )));
    }

    let rotation = DQuat::from_array(record.rotation);
    if !rotation.is_finite() {
        return Err(invalid(format!("rotation {:?} is not finite", record.rotation)));
    }
    let norm = rotation.length();
    if (norm - 1.0).abs() > quaternion_norm_tolerance {
        return Err(invalid(format!(
            "rotation norm {norm} is not within {quaternion_norm_tolerance} of 1"
        )));
    }

    Ok(TransformSample {
        child_frame,
        parent_frame,
        stamp: Timestamp::from_nanos(record.timestamp_nanos),
        transform: RigidTransform::new(translation, rotation / norm),
        source: source.clone(),
    })
}

const MAX_WRITE_ATTEMPTS: usize = 8;

/// Validates incoming stamped transforms and writes them into the tree index and the store.
pub struct UpdateIngester {
    index: Arc<SharedTreeIndex>,
    store: Arc<TransformStore>,
    quaternion_norm_tolerance: f64,
}

impl UpdateIngester {
    pub fn new(
        index: Arc<SharedTreeIndex>,
        store: Arc<TransformStore>,
        config: &TreeConfig,
    ) -> Self {
        Self {
            index,
            store,
            quaternion_norm_tolerance: config.quaternion_norm_tolerance,
        }
    }

    /// Ingest one time varying transform.
    pub fn ingest(
        &self,
        record: &TransformRecord,
        source: &Arc<str>,
    ) -> TransformResult<InsertOutcome> {
        self.apply(record, source, false)
    }

    /// Ingest a transform valid at every time, it replaces the frame's samples.
    pub fn ingest_static(
        &self,
        record: &TransformRecord,
        source: &Arc<str>,
    ) -> TransformResult<InsertOutcome> {
        self.apply(record, source, true)
    }

    /// Ingest every record of a batch; a bad record is reported and skipped.
    pub fn ingest_batch(
        &self,
        records: &[TransformRecord],
        source: &Arc<str>,
        is_static: bool,
    ) -> IngestReport {
        let mut report = IngestReport::default();
        for (position, record) in records.iter().enumerate() {
            match self.apply(record, source, is_static) {
                Ok(_) => report.accepted += 1,
                Err(e) => report.rejected.push((position, e)),
            }
        }
        report
    }

    fn apply(
        &self,
        record: &TransformRecord,
        source: &Arc<str>,
        is_static: bool,
    ) -> TransformResult<InsertOutcome> {
        let result = self.try_apply(record, source, is_static);
        if let Err(e) = &result {
            warn!(
                "Dropping transform {} -> {} from '{source}': {e}",
                record.parent_frame_id, record.child_frame_id
            );
        }
        result
    }

    fn try_apply(
        &self,
        record: &TransformRecord,
        source: &Arc<str>,
        is_static: bool,
    ) -> TransformResult<InsertOutcome> {
        let sample = validate_record(record, source, self.quaternion_norm_tolerance)?;

        // Another writer can move or prune the frame between the index update
        // and the buffer write, in which case the edge is decided again.
        for _ in 0..MAX_WRITE_ATTEMPTS {
            match self.index.update(sample.parent_frame, sample.child_frame)? {
                EdgeChange::Created => debug!(
                    "Frame '{}' attached to '{}' at {}",
                    sample.child_frame, sample.parent_frame, sample.transform
                ),
                EdgeChange::Reparented { previous } => debug!(
                    "Frame '{}' moved from '{previous}' to '{}', dropping its samples",
                    sample.child_frame, sample.parent_frame
                ),
                EdgeChange::Unchanged => {}
            }

            let buffer = self.store.get_or_create_buffer(&sample.child_frame);
            if let Some(outcome) = self.write_sample(&buffer, sample.clone(), is_static) {
                if outcome.evicted > 0 {
                    trace!("Evicted {} samples of '{}'", outcome.evicted, record.child_frame_id);
                }
                return Ok(outcome);
            }
            debug!(
                "Parent of '{}' changed while writing, retrying",
                sample.child_frame
            );
        }

        Err(TransformError::InvalidTransform {
            child: record.child_frame_id.clone(),
            reason: format!("parent kept changing over {MAX_WRITE_ATTEMPTS} attempts"),
        })
    }

    /// Write under the buffer lock, only while the sample's parent is still the
    /// published parent of its frame.
    fn write_sample(
        &self,
        buffer: &FrameBuffer,
        sample: TransformSample,
        is_static: bool,
    ) -> Option<InsertOutcome> {
        let child = sample.child_frame;
        buffer.insert_under_parent(sample, is_static, |parent| {
            self.index.snapshot().parent_of(&child).as_ref() == Some(parent)
        })
    }
}
