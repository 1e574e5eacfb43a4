//! Transform queries between two arbitrary frames.
//!
//! A query takes one snapshot of the tree index, walks both frames up to their
//! lowest common ancestor and composes the interpolated edge transforms.

use crate::error::{TransformError, TransformResult};
use crate::frames::query_frame_id;
use crate::interpolation::TimeInterpolator;
use crate::transform::{SampleRange, TransformStore};
use crate::tree_index::{FrameIndex, SharedTreeIndex, TreeIndex};
use ft_clock::{Clock, FtDuration, Timestamp};
use ft_spatial_payloads::RigidTransform;
use log::trace;
use std::sync::Arc;

/// Per query constraints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Fail with `Stale` when the newest sample of an edge on the path is older than this
    /// relative to the clock.
    pub max_staleness: Option<FtDuration>,
}

impl QueryOptions {
    pub fn with_max_staleness(max_staleness: FtDuration) -> Self {
        Self {
            max_staleness: Some(max_staleness),
        }
    }
}

/// Both halves of the path between two frames, each running from the frame
/// up to (excluded) their lowest common ancestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePath {
    pub source_chain: Vec<FrameIndex>,
    pub target_chain: Vec<FrameIndex>,
    pub common_ancestor: FrameIndex,
}

impl FramePath {
    fn edges(&self) -> impl Iterator<Item = &FrameIndex> {
        self.source_chain.iter().chain(self.target_chain.iter())
    }
}

/// Find the lowest common ancestor of two frames in a snapshot.
pub fn find_path(index: &TreeIndex, source: &str, target: &str) -> TransformResult<FramePath> {
    let source_idx = resolve(index, source)?;
    let target_idx = resolve(index, target)?;

    let source_up = index.path_to_root(source_idx);
    let target_up = index.path_to_root(target_idx);

    // Chains are as long as the tree is deep, a linear scan beats hashing here.
    for (source_pos, frame) in source_up.iter().enumerate() {
        if let Some(target_pos) = target_up.iter().position(|f| f == frame) {
            return Ok(FramePath {
                source_chain: source_up[..source_pos].to_vec(),
                target_chain: target_up[..target_pos].to_vec(),
                common_ancestor: *frame,
            });
        }
    }

    Err(TransformError::DisconnectedFrames {
        from: source.to_string(),
        to: target.to_string(),
    })
}

fn resolve(index: &TreeIndex, frame: &str) -> TransformResult<FrameIndex> {
    let id = query_frame_id(frame)?;
    index
        .index_of(&id)
        .ok_or_else(|| TransformError::UnknownFrame(frame.to_string()))
}

/// Answers `transform(source, target, time)` from the tree index and the store.
pub struct QueryEngine {
    index: Arc<SharedTreeIndex>,
    store: Arc<TransformStore>,
    interpolator: TimeInterpolator,
    clock: Clock,
}

impl QueryEngine {
    pub fn new(
        index: Arc<SharedTreeIndex>,
        store: Arc<TransformStore>,
        interpolator: TimeInterpolator,
        clock: Clock,
    ) -> Self {
        Self {
            index,
            store,
            interpolator,
            clock,
        }
    }

    /// The transform that maps coordinates expressed in `target` into `source`,
    /// in other words the pose of `target` relative to `source` at `time`.
    pub fn transform(
        &self,
        source: &str,
        target: &str,
        time: Timestamp,
    ) -> TransformResult<RigidTransform> {
        self.transform_with(source, target, time, &QueryOptions::default())
    }

    pub fn transform_with(
        &self,
        source: &str,
        target: &str,
        time: Timestamp,
        options: &QueryOptions,
    ) -> TransformResult<RigidTransform> {
        let snapshot = self.index.snapshot();
        let path = find_path(&snapshot, source, target)?;
        self.check_staleness(&snapshot, &path, options)?;
        self.compose(&snapshot, &path, time)
    }

    /// Query at the newest time every edge on the path can answer.
    /// Static edges do not constrain the time; a fully static path is evaluated at the clock's now.
    pub fn transform_latest(
        &self,
        source: &str,
        target: &str,
    ) -> TransformResult<(Timestamp, RigidTransform)> {
        let snapshot = self.index.snapshot();
        let path = find_path(&snapshot, source, target)?;

        let mut time: Option<Timestamp> = None;
        for edge in path.edges() {
            let frame = frame_name(&snapshot, *edge)?;
            let buffer = self
                .store
                .get_buffer(frame)
                .ok_or_else(|| TransformError::UnknownFrame(frame.to_string()))?;
            if buffer.is_static() {
                continue;
            }
            let latest = buffer.latest().ok_or_else(|| TransformError::NoDataAtTime {
                frame: frame.to_string(),
                time: self.clock.now(),
                reason: "no sample retained".to_string(),
            })?;
            time = Some(time.map_or(latest.stamp, |t| t.min(latest.stamp)));
        }

        let time = time.unwrap_or_else(|| self.clock.now());
        Ok((time, self.compose(&snapshot, &path, time)?))
    }

    fn check_staleness(
        &self,
        snapshot: &TreeIndex,
        path: &FramePath,
        options: &QueryOptions,
    ) -> TransformResult<()> {
        let Some(max_staleness) = options.max_staleness else {
            return Ok(());
        };
        let now = self.clock.now();
        for edge in path.edges() {
            let frame = frame_name(snapshot, *edge)?;
            if let Some(latest) = self.store.latest_dynamic_stamp(frame) {
                let age = if latest < now {
                    now.abs_diff(latest)
                } else {
                    FtDuration::ZERO
                };
                if age > max_staleness {
                    return Err(TransformError::Stale {
                        frame: frame.to_string(),
                        age,
                        max_staleness,
                    });
                }
            }
        }
        Ok(())
    }

    fn compose(
        &self,
        snapshot: &TreeIndex,
        path: &FramePath,
        time: Timestamp,
    ) -> TransformResult<RigidTransform> {
        let ancestor_from_source = self.chain_to_ancestor(snapshot, &path.source_chain, time)?;
        let ancestor_from_target = self.chain_to_ancestor(snapshot, &path.target_chain, time)?;
        trace!(
            "Composed {} + {} edges at {time}",
            path.source_chain.len(),
            path.target_chain.len()
        );
        Ok(ancestor_from_source.inverse() * ancestor_from_target)
    }

    /// Product of the edge transforms from the first frame of `chain` up to the common ancestor.
    fn chain_to_ancestor(
        &self,
        snapshot: &TreeIndex,
        chain: &[FrameIndex],
        time: Timestamp,
    ) -> TransformResult<RigidTransform> {
        let mut result = RigidTransform::IDENTITY;
        for frame_idx in chain {
            let edge = self.edge_transform(snapshot, *frame_idx, time)?;
            // the edge closer to the ancestor is applied last
            result = edge * result;
        }
        Ok(result)
    }

    fn edge_transform(
        &self,
        snapshot: &TreeIndex,
        frame_idx: FrameIndex,
        time: Timestamp,
    ) -> TransformResult<RigidTransform> {
        let frame = frame_name(snapshot, frame_idx)?;
        let parent = snapshot
            .parent(frame_idx)
            .and_then(|p| snapshot.name(p))
            .ok_or_else(|| TransformError::UnknownFrame(frame.to_string()))?;

        let range = self.store.lookup_range(frame, time)?;
        let sample_parent = match &range {
            SampleRange::Exact(s) => s.parent_frame,
            SampleRange::Bracket(before, _) => before.parent_frame,
        };
        if sample_parent != *parent {
            // The frame was reparented after this query took its snapshot.
            return Err(TransformError::NoDataAtTime {
                frame: frame.to_string(),
                time,
                reason: format!("samples are now relative to '{sample_parent}', not '{parent}'"),
            });
        }

        self.interpolator.resolve(&range, time)
    }
}

fn frame_name(snapshot: &TreeIndex, idx: FrameIndex) -> TransformResult<&str> {
    snapshot
        .name(idx)
        .map(|f| f.as_str())
        .ok_or_else(|| TransformError::UnknownFrame(format!("{idx:?}")))
}
