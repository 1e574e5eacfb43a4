use crate::config::TreeConfig;
use crate::error::{TransformError, TransformResult};
use crate::frames::{frame_id, FrameId};
use crate::ingest::UpdateIngester;
use crate::interpolation::TimeInterpolator;
use crate::query::{QueryEngine, QueryOptions};
use crate::record::{IngestReport, TransformRecord};
use crate::transform::TransformStore;
use crate::tree_index::{SharedTreeIndex, TreeIndex};
use dashmap::DashMap;
use ft_clock::{Clock, ClockProvider, Timestamp};
use ft_spatial_payloads::RigidTransform;
use log::{debug, info};
use std::sync::Arc;

/// The frame transform tree.
///
/// Many threads can query while others publish: the parent mapping is read
/// from an immutable snapshot per query and each frame buffer has its own lock.
/// Share it behind an `Arc`.
pub struct FrameTree {
    config: TreeConfig,
    clock: Clock,
    index: Arc<SharedTreeIndex>,
    store: Arc<TransformStore>,
    ingester: UpdateIngester,
    engine: QueryEngine,
    subscribers: Arc<DashMap<FrameId, usize>>,
}

/// Keeps a frame alive across [`FrameTree::prune`] while it is held.
#[derive(Debug)]
pub struct FrameSubscription {
    frame: FrameId,
    subscribers: Arc<DashMap<FrameId, usize>>,
}

impl FrameSubscription {
    pub fn frame(&self) -> &str {
        self.frame.as_str()
    }
}

impl Drop for FrameSubscription {
    fn drop(&mut self) {
        self.subscribers.remove_if_mut(&self.frame, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        });
    }
}

impl FrameTree {
    pub fn new(config: TreeConfig, clock: Clock) -> Self {
        let index = Arc::new(SharedTreeIndex::new());
        let store = Arc::new(TransformStore::new(&config));
        let ingester = UpdateIngester::new(index.clone(), store.clone(), &config);
        let engine = QueryEngine::new(
            index.clone(),
            store.clone(),
            TimeInterpolator::from_config(&config),
            clock.clone(),
        );
        Self {
            config,
            clock,
            index,
            store,
            ingester,
            engine,
            subscribers: Arc::new(DashMap::new()),
        }
    }

    /// Start from an empty tree.
    pub fn init(&self) {
        self.index.reset();
        self.store.clear();
        info!(
            "Frame tree ready: retention {}, extrapolation tolerance {}",
            self.config.retention, self.config.extrapolation_tolerance
        );
    }

    /// Release every buffer and frame. Subscriptions stay valid but point to nothing.
    pub fn shutdown(&self) {
        let frames = self.index.snapshot().len();
        self.index.reset();
        self.store.clear();
        info!("Frame tree shut down, released {frames} frames");
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Current time of the injected clock.
    pub fn current_time(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn ingest(&self, record: &TransformRecord, source: &str) -> TransformResult<()> {
        self.ingester.ingest(record, &Arc::from(source)).map(|_| ())
    }

    pub fn ingest_static(&self, record: &TransformRecord, source: &str) -> TransformResult<()> {
        self.ingester
            .ingest_static(record, &Arc::from(source))
            .map(|_| ())
    }

    pub fn ingest_batch(&self, records: &[TransformRecord], source: &str) -> IngestReport {
        self.ingester.ingest_batch(records, &Arc::from(source), false)
    }

    pub fn ingest_static_batch(&self, records: &[TransformRecord], source: &str) -> IngestReport {
        self.ingester.ingest_batch(records, &Arc::from(source), true)
    }

    /// Pose of `target` in `source` at `time`: maps `target` coordinates into `source`.
    pub fn transform(
        &self,
        source: &str,
        target: &str,
        time: Timestamp,
    ) -> TransformResult<RigidTransform> {
        self.engine.transform(source, target, time)
    }

    pub fn transform_with(
        &self,
        source: &str,
        target: &str,
        time: Timestamp,
        options: &QueryOptions,
    ) -> TransformResult<RigidTransform> {
        self.engine.transform_with(source, target, time, options)
    }

    /// Transform at the newest time common to the whole path, with that time.
    pub fn transform_latest(
        &self,
        source: &str,
        target: &str,
    ) -> TransformResult<(Timestamp, RigidTransform)> {
        self.engine.transform_latest(source, target)
    }

    pub fn frames(&self) -> Vec<FrameId> {
        self.index.snapshot().frames().copied().collect()
    }

    pub fn contains(&self, frame: &str) -> bool {
        self.index.snapshot().contains(frame)
    }

    pub fn parent_of(&self, frame: &str) -> TransformResult<Option<FrameId>> {
        let snapshot = self.index.snapshot();
        if !snapshot.contains(frame) {
            return Err(TransformError::UnknownFrame(frame.to_string()));
        }
        Ok(snapshot.parent_of(frame))
    }

    /// Frames from `frame` up to its root.
    pub fn path_to_root(&self, frame: &str) -> TransformResult<Vec<FrameId>> {
        self.index.snapshot().path_to_root_by_name(frame)
    }

    /// Oldest and newest retained stamps of a frame.
    pub fn time_range(&self, frame: &str) -> TransformResult<Option<(Timestamp, Timestamp)>> {
        self.store
            .get_buffer(frame)
            .map(|buffer| buffer.time_range())
            .ok_or_else(|| TransformError::UnknownFrame(frame.to_string()))
    }

    /// Declare interest in a frame, it will not be pruned while the subscription lives.
    pub fn subscribe(&self, frame: &str) -> TransformResult<FrameSubscription> {
        let frame = frame_id(frame, frame)?;
        *self.subscribers.entry(frame).or_insert(0) += 1;
        Ok(FrameSubscription {
            frame,
            subscribers: self.subscribers.clone(),
        })
    }

    /// Drop every sample of a frame then prune what became unreferenced.
    pub fn clear_frame(&self, frame: &str) -> TransformResult<Vec<FrameId>> {
        if !self.contains(frame) {
            return Err(TransformError::UnknownFrame(frame.to_string()));
        }
        if let Some(buffer) = self.store.get_buffer(frame) {
            buffer.clear();
        }
        Ok(self.prune())
    }

    /// Remove frames without samples, children or subscribers. Returns the removed frames.
    pub fn prune(&self) -> Vec<FrameId> {
        let mut removed = Vec::new();
        loop {
            let snapshot = self.index.snapshot();
            let candidates: Vec<FrameId> = snapshot
                .frames()
                .filter(|frame| self.is_unreferenced(&snapshot, frame))
                .copied()
                .collect();

            let before = removed.len();
            for frame in candidates {
                if self.retire(&frame) {
                    removed.push(frame);
                }
            }
            // removing leaves can turn their parents into leaves
            if removed.len() == before {
                break;
            }
        }
        if !removed.is_empty() {
            debug!("Pruned frames {removed:?}");
        }
        removed
    }

    fn is_leaf_without_subscribers(&self, index: &TreeIndex, frame: &FrameId) -> bool {
        let leaf = index
            .index_of(frame)
            .map(|idx| index.child_count(idx) == 0)
            .unwrap_or(false);
        leaf && !self.subscribers.contains_key(frame)
    }

    fn is_unreferenced(&self, index: &TreeIndex, frame: &FrameId) -> bool {
        self.is_leaf_without_subscribers(index, frame) && !self.store.has_samples(frame)
    }

    /// Unlink one frame. A frame with a buffer is unlinked under that buffer's
    /// lock so a concurrent ingest either lands first or sees the buffer retired.
    fn retire(&self, frame: &FrameId) -> bool {
        let unlink = || {
            let unlinked = self.index.modify(|index| {
                self.is_leaf_without_subscribers(index, frame) && index.remove_leaf(frame)
            });
            if unlinked {
                self.store.remove(frame);
            }
            unlinked
        };
        match self.store.get_buffer(frame) {
            Some(buffer) => buffer.retire_if_empty(unlink),
            None => unlink(),
        }
    }
}

impl ClockProvider for FrameTree {
    fn get_clock(&self) -> Clock {
        self.clock.clone()
    }
}

impl Default for FrameTree {
    fn default() -> Self {
        Self::new(TreeConfig::default(), Clock::default())
    }
}
