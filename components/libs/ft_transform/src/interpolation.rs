use crate::config::TreeConfig;
use crate::error::{TransformError, TransformResult};
use crate::transform::{SampleRange, TransformSample};
use ft_clock::{FtDuration, Timestamp};
use ft_spatial_payloads::RigidTransform;

/// Resolves the transform of a frame at an arbitrary time from its bracketing samples.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeInterpolator {
    /// A query this close to a sample returns the sample untouched.
    pub exact_match_epsilon: FtDuration,
    /// How far from a lone sample a query may still use it.
    pub extrapolation_tolerance: FtDuration,
}

impl Default for TimeInterpolator {
    fn default() -> Self {
        Self::from_config(&TreeConfig::default())
    }
}

impl TimeInterpolator {
    pub fn from_config(config: &TreeConfig) -> Self {
        Self {
            exact_match_epsilon: config.exact_match_epsilon,
            extrapolation_tolerance: config.extrapolation_tolerance,
        }
    }

    pub fn resolve(&self, range: &SampleRange, time: Timestamp) -> TransformResult<RigidTransform> {
        match range {
            SampleRange::Exact(sample) => Ok(sample.transform),
            SampleRange::Bracket(before, after) => self.interpolate(before, after, time),
        }
    }

    /// Interpolate between two samples of the same frame at `time`.
    ///
    /// Translation is interpolated linearly, rotation with a slerp. A query
    /// within `exact_match_epsilon` of either sample returns that sample as is.
    pub fn interpolate(
        &self,
        before: &TransformSample,
        after: &TransformSample,
        time: Timestamp,
    ) -> TransformResult<RigidTransform> {
        let no_data = |reason: String| TransformError::NoDataAtTime {
            frame: before.child_frame.to_string(),
            time,
            reason,
        };

        if before.child_frame != after.child_frame || before.parent_frame != after.parent_frame {
            return Err(no_data(format!(
                "cannot interpolate between {}->{} and {}->{}",
                before.parent_frame, before.child_frame, after.parent_frame, after.child_frame
            )));
        }

        if time.abs_diff(before.stamp) <= self.exact_match_epsilon {
            return Ok(before.transform);
        }
        if time.abs_diff(after.stamp) <= self.exact_match_epsilon {
            return Ok(after.transform);
        }

        if before.stamp == after.stamp {
            let gap = time.abs_diff(before.stamp);
            return if gap <= self.extrapolation_tolerance {
                Ok(before.transform)
            } else {
                Err(no_data(format!(
                    "only sample is {gap} away, tolerance is {}",
                    self.extrapolation_tolerance
                )))
            };
        }

        if time < before.stamp || time > after.stamp || before.stamp > after.stamp {
            return Err(no_data(format!(
                "requested time is outside [{}, {}]",
                before.stamp, after.stamp
            )));
        }

        let ratio = (time - before.stamp) as f64 / (after.stamp - before.stamp) as f64;
        Ok(before.transform.interpolate(&after.transform, ratio))
    }
}
