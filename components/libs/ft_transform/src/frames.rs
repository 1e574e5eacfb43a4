//! Frame identifiers.
//!
//! Frames are plain names; they are stored inline as fixed capacity strings so
//! that the hot paths never allocate for a lookup key.

use crate::error::{TransformError, TransformResult};
use arrayvec::ArrayString;

/// Maximum length in bytes of a frame name.
pub const MAX_FRAME_ID_LEN: usize = 64;

/// Frame identifier strings
pub type FrameId = ArrayString<MAX_FRAME_ID_LEN>;

/// Validate and convert a frame name.
///
/// `child` is only used to attribute the error to the sample being processed.
pub fn frame_id(name: &str, child: &str) -> TransformResult<FrameId> {
    if name.is_empty() {
        return Err(TransformError::InvalidTransform {
            child: child.to_string(),
            reason: "empty frame name".to_string(),
        });
    }
    FrameId::from(name).map_err(|_| TransformError::InvalidTransform {
        child: child.to_string(),
        reason: format!("frame name '{name}' is longer than {MAX_FRAME_ID_LEN} bytes"),
    })
}

/// Resolve a name used in a query. A name that cannot be a frame is simply unknown.
pub(crate) fn query_frame_id(name: &str) -> TransformResult<FrameId> {
    FrameId::from(name).map_err(|_| TransformError::UnknownFrame(name.to_string()))
}
