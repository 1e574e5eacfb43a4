use crate::config::TreeConfig;
use crate::error::{TransformError, TransformResult};
use crate::frames::FrameId;
use dashmap::DashMap;
use ft_clock::{FtDuration, Timestamp};
use ft_spatial_payloads::RigidTransform;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

/// A transform of `child_frame` relative to `parent_frame` at `stamp`.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformSample {
    pub child_frame: FrameId,
    pub parent_frame: FrameId,
    pub stamp: Timestamp,
    pub transform: RigidTransform,
    /// Who published the sample.
    pub source: Arc<str>,
}

/// Result of a range lookup in a frame buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum SampleRange {
    /// A sample stamped exactly at the query time, or a static transform.
    Exact(TransformSample),
    /// The sample at or before the query time and the one at or after it.
    /// Both are the same sample when the query runs past the newest sample
    /// but stays within the extrapolation tolerance.
    Bracket(TransformSample, TransformSample),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InsertOutcome {
    /// An older sample with the same stamp was overwritten.
    pub replaced: bool,
    /// Number of samples evicted by the retention window or the capacity bound.
    pub evicted: usize,
}

/// Internal buffer that holds the time ordered samples of one child frame
#[derive(Clone, Debug)]
struct FrameBufferInternal {
    samples: VecDeque<TransformSample>,
    is_static: bool,
    /// Set once the frame was pruned, the buffer must not take samples anymore.
    retired: bool,
    retention: FtDuration,
    max_capacity: usize,
}

impl FrameBufferInternal {
    fn new(retention: FtDuration, max_capacity: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            is_static: false,
            retired: false,
            retention,
            max_capacity: max_capacity.max(1),
        }
    }

    fn insert(&mut self, sample: TransformSample) -> InsertOutcome {
        if self.is_static {
            self.samples.clear();
            self.is_static = false;
        }

        let pos = self.samples.partition_point(|s| s.stamp < sample.stamp);
        let replaced = matches!(self.samples.get(pos), Some(s) if s.stamp == sample.stamp);
        if replaced {
            // Same stamp: the latest publication wins.
            self.samples[pos] = sample;
        } else {
            self.samples.insert(pos, sample);
        }

        InsertOutcome {
            replaced,
            evicted: self.evict(),
        }
    }

    fn insert_static(&mut self, sample: TransformSample) -> InsertOutcome {
        let replaced = !self.samples.is_empty();
        self.samples.clear();
        self.samples.push_back(sample);
        self.is_static = true;
        InsertOutcome {
            replaced,
            evicted: 0,
        }
    }

    fn reset_with(&mut self, sample: TransformSample, is_static: bool) -> InsertOutcome {
        let dropped = self.samples.len();
        self.samples.clear();
        self.is_static = false;
        let outcome = if is_static {
            self.insert_static(sample)
        } else {
            self.insert(sample)
        };
        InsertOutcome {
            replaced: false,
            evicted: dropped + outcome.evicted,
        }
    }

    fn evict(&mut self) -> usize {
        let Some(newest) = self.samples.back().map(|s| s.stamp) else {
            return 0;
        };
        let horizon = newest.saturating_sub(self.retention);
        let before = self.samples.len();
        while matches!(self.samples.front(), Some(s) if s.stamp < horizon) {
            self.samples.pop_front();
        }
        while self.samples.len() > self.max_capacity {
            self.samples.pop_front();
        }
        before - self.samples.len()
    }

    fn latest(&self) -> Option<&TransformSample> {
        self.samples.back()
    }

    fn time_range(&self) -> Option<(Timestamp, Timestamp)> {
        Some((self.samples.front()?.stamp, self.samples.back()?.stamp))
    }

    fn lookup_range(
        &self,
        time: Timestamp,
        extrapolation_tolerance: FtDuration,
        exact_match_epsilon: FtDuration,
    ) -> Result<SampleRange, String> {
        let Some(first) = self.samples.front() else {
            return Err("no sample retained".to_string());
        };

        if self.is_static {
            return Ok(SampleRange::Exact(first.clone()));
        }

        // number of samples stamped at or before `time`
        let pos = self.samples.partition_point(|s| s.stamp <= time);
        if pos == 0 {
            if first.stamp.abs_diff(time) <= exact_match_epsilon {
                return Ok(SampleRange::Exact(first.clone()));
            }
            return Err(format!(
                "requested time precedes the earliest retained sample at {}",
                first.stamp
            ));
        }

        let before = &self.samples[pos - 1];
        if before.stamp == time {
            return Ok(SampleRange::Exact(before.clone()));
        }

        match self.samples.get(pos) {
            Some(after) => Ok(SampleRange::Bracket(before.clone(), after.clone())),
            None => {
                let overshoot = time.abs_diff(before.stamp);
                if overshoot <= extrapolation_tolerance {
                    Ok(SampleRange::Bracket(before.clone(), before.clone()))
                } else {
                    Err(format!(
                        "requested time is {overshoot} past the latest sample at {}, tolerance is {extrapolation_tolerance}",
                        before.stamp
                    ))
                }
            }
        }
    }
}

/// Thread-safe wrapper around a frame buffer.
/// Writers of one frame serialize on its lock, other frames are untouched.
#[derive(Clone)]
pub struct FrameBuffer {
    buffer: Arc<RwLock<FrameBufferInternal>>,
}

impl FrameBuffer {
    pub fn new(retention: FtDuration, max_capacity: usize) -> Self {
        Self {
            buffer: Arc::new(RwLock::new(FrameBufferInternal::new(
                retention,
                max_capacity,
            ))),
        }
    }

    /// Insert a sample in stamp order then evict what fell out of the retention window.
    pub fn insert(&self, sample: TransformSample) -> InsertOutcome {
        self.buffer.write().insert(sample)
    }

    /// Replace the content of the buffer with a sample valid at every time.
    pub fn insert_static(&self, sample: TransformSample) -> InsertOutcome {
        self.buffer.write().insert_static(sample)
    }

    /// Insert `sample` while holding the buffer lock, provided `is_current_parent`
    /// still accepts its parent at that point.
    ///
    /// Samples relative to another parent are dropped first, so the buffer always
    /// holds samples of a single parent. Returns `None` without writing when the
    /// parent check fails or the buffer was retired.
    pub fn insert_under_parent(
        &self,
        sample: TransformSample,
        is_static: bool,
        is_current_parent: impl FnOnce(&FrameId) -> bool,
    ) -> Option<InsertOutcome> {
        let mut buffer = self.buffer.write();
        if buffer.retired || !is_current_parent(&sample.parent_frame) {
            return None;
        }
        let foreign = matches!(
            buffer.samples.back(),
            Some(s) if s.parent_frame != sample.parent_frame
        );
        Some(if foreign {
            buffer.reset_with(sample, is_static)
        } else if is_static {
            buffer.insert_static(sample)
        } else {
            buffer.insert(sample)
        })
    }

    /// Run `unlink` under the buffer lock if the buffer is empty. When it
    /// returns true the buffer is retired and refuses further samples.
    pub fn retire_if_empty(&self, unlink: impl FnOnce() -> bool) -> bool {
        let mut buffer = self.buffer.write();
        if buffer.retired || !buffer.samples.is_empty() {
            return false;
        }
        buffer.retired = unlink();
        buffer.retired
    }

    pub fn is_retired(&self) -> bool {
        self.buffer.read().retired
    }

    pub fn clear(&self) {
        let mut buffer = self.buffer.write();
        buffer.samples.clear();
        buffer.is_static = false;
    }

    pub fn len(&self) -> usize {
        self.buffer.read().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.read().samples.is_empty()
    }

    pub fn is_static(&self) -> bool {
        self.buffer.read().is_static
    }

    /// Get the latest sample in the buffer
    pub fn latest(&self) -> Option<TransformSample> {
        self.buffer.read().latest().cloned()
    }

    /// Get the time range of samples in this buffer
    pub fn time_range(&self) -> Option<(Timestamp, Timestamp)> {
        self.buffer.read().time_range()
    }

    pub fn samples(&self) -> Vec<TransformSample> {
        self.buffer.read().samples.iter().cloned().collect()
    }
}

/// Per frame sample storage.
/// Buffers are keyed by child frame so that writers of different frames never contend.
pub struct TransformStore {
    buffers: DashMap<FrameId, FrameBuffer>,
    retention: FtDuration,
    max_samples_per_frame: usize,
    extrapolation_tolerance: FtDuration,
    exact_match_epsilon: FtDuration,
}

impl TransformStore {
    pub fn new(config: &TreeConfig) -> Self {
        Self {
            buffers: DashMap::new(),
            retention: config.retention,
            max_samples_per_frame: config.max_samples_per_frame,
            extrapolation_tolerance: config.extrapolation_tolerance,
            exact_match_epsilon: config.exact_match_epsilon,
        }
    }

    /// Get or create the buffer of a child frame.
    /// The map shard lock is released before the buffer itself is locked.
    pub fn get_or_create_buffer(&self, child: &FrameId) -> FrameBuffer {
        self.buffers
            .entry(*child)
            .or_insert_with(|| FrameBuffer::new(self.retention, self.max_samples_per_frame))
            .clone()
    }

    pub fn get_buffer(&self, frame: &str) -> Option<FrameBuffer> {
        let frame = FrameId::from(frame).ok()?;
        self.buffers.get(&frame).map(|entry| entry.clone())
    }

    pub fn insert(&self, sample: TransformSample) -> InsertOutcome {
        self.get_or_create_buffer(&sample.child_frame).insert(sample)
    }

    /// Find the samples bracketing `time` for `frame`.
    pub fn lookup_range(&self, frame: &str, time: Timestamp) -> TransformResult<SampleRange> {
        let buffer = self
            .get_buffer(frame)
            .ok_or_else(|| TransformError::UnknownFrame(frame.to_string()))?;
        let range = buffer.buffer.read().lookup_range(
            time,
            self.extrapolation_tolerance,
            self.exact_match_epsilon,
        );
        range.map_err(|reason| TransformError::NoDataAtTime {
            frame: frame.to_string(),
            time,
            reason,
        })
    }

    /// Stamp of the newest sample of a dynamic frame, `None` for static or empty frames.
    pub fn latest_dynamic_stamp(&self, frame: &str) -> Option<Timestamp> {
        let buffer = self.get_buffer(frame)?;
        let internal = buffer.buffer.read();
        if internal.is_static {
            None
        } else {
            internal.latest().map(|s| s.stamp)
        }
    }

    pub fn has_samples(&self, frame: &FrameId) -> bool {
        // release the map shard before touching the buffer lock
        let buffer = self.buffers.get(frame).map(|entry| entry.clone());
        buffer.map(|b| !b.is_empty()).unwrap_or(false)
    }

    pub fn remove(&self, frame: &FrameId) -> Option<FrameBuffer> {
        self.buffers.remove(frame).map(|(_, buffer)| buffer)
    }

    pub fn clear(&self) {
        self.buffers.clear();
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
