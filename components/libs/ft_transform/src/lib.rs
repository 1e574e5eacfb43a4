//! A time-stamped coordinate frame tree.
//!
//! Publishers feed stamped parent to child transforms, consumers ask for the
//! transform between any two frames at any retained time. Samples are
//! interpolated linearly in translation and spherically in rotation, then
//! composed through the lowest common ancestor of the two frames.
//!
//! ```no_run
//! use ft_transform::{FrameTree, Timestamp, TransformRecord};
//!
//! let tree = FrameTree::default();
//! tree.ingest(
//!     &TransformRecord {
//!         parent_frame_id: "map".into(),
//!         child_frame_id: "base_link".into(),
//!         timestamp_nanos: 0,
//!         translation: [1.0, 0.0, 0.0],
//!         rotation: [0.0, 0.0, 0.0, 1.0],
//!     },
//!     "odometry",
//! )?;
//! let _pose = tree.transform("map", "base_link", Timestamp::ZERO)?;
//! # Ok::<(), ft_transform::TransformError>(())
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod frames;
pub mod ingest;
pub mod interpolation;
pub mod query;
pub mod record;
pub mod transform;
pub mod tree;
pub mod tree_index;

#[cfg(test)]
mod test_utils;

pub use config::{read_configuration, TreeConfig};
pub use environment::{
    decode_stream, replay, EnvironmentManager, InMemoryEnvironment, StreamEnvironment,
};
pub use error::{TransformError, TransformResult};
pub use frames::{frame_id, FrameId, MAX_FRAME_ID_LEN};
pub use ingest::{validate_record, UpdateIngester};
pub use interpolation::TimeInterpolator;
pub use query::{QueryEngine, QueryOptions};
pub use record::{AlertKind, IngestReport, SystemAlert, TransformRecord, WireMessage};
pub use transform::{FrameBuffer, SampleRange, TransformSample, TransformStore};
pub use tree::{FrameSubscription, FrameTree};
pub use tree_index::{SharedTreeIndex, TreeIndex};

pub use ft_clock::{Clock, ClockMock, FtDuration, Timestamp};
pub use ft_spatial_payloads::{Pose, RigidTransform};
