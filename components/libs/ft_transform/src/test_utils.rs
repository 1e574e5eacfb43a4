/// Test utilities for creating samples and records
use crate::frames::FrameId;
use crate::record::TransformRecord;
use crate::transform::TransformSample;
use ft_clock::Timestamp;
use ft_spatial_payloads::RigidTransform;
use glam::DVec3;

/// A sample translated by `x` along the x axis.
pub fn sample(parent: &str, child: &str, stamp_nanos: i64, x: f64) -> TransformSample {
    TransformSample {
        child_frame: FrameId::from(child).unwrap(),
        parent_frame: FrameId::from(parent).unwrap(),
        stamp: Timestamp::from_nanos(stamp_nanos),
        transform: RigidTransform::from_translation(DVec3::new(x, 0.0, 0.0)),
        source: "test".into(),
    }
}

/// A record translated by `(x, y, z)` with an identity rotation.
pub fn translation_record(
    parent: &str,
    child: &str,
    stamp_nanos: i64,
    x: f64,
    y: f64,
    z: f64,
) -> TransformRecord {
    TransformRecord {
        parent_frame_id: parent.to_string(),
        child_frame_id: child.to_string(),
        timestamp_nanos: stamp_nanos,
        translation: [x, y, z],
        rotation: [0.0, 0.0, 0.0, 1.0],
    }
}
