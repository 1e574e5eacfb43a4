//! Configuration of the frame tree.
//! The configuration is serialized in the RON format, every field is optional.
//!
//! ```ron
//! (
//!     retention: 10000000000,            // 10 s, in ns
//!     extrapolation_tolerance: 100000000, // 100 ms
//! )
//! ```

use crate::error::{TransformError, TransformResult};
use ft_clock::FtDuration;
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TreeConfig {
    /// Samples older than the newest sample of their frame minus this window are evicted.
    pub retention: FtDuration,
    /// Hard bound on the number of samples kept per frame.
    pub max_samples_per_frame: usize,
    /// How far past the newest sample a query may still use it.
    pub extrapolation_tolerance: FtDuration,
    /// A query this close to a sample returns the sample as is.
    pub exact_match_epsilon: FtDuration,
    /// Allowed deviation of the rotation quaternion norm from 1.
    pub quaternion_norm_tolerance: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            retention: FtDuration::from_secs(10),
            max_samples_per_frame: 1000,
            extrapolation_tolerance: FtDuration::from_millis(100),
            exact_match_epsilon: FtDuration::from_nanos(1),
            quaternion_norm_tolerance: 1e-3,
        }
    }
}

impl TreeConfig {
    pub fn from_ron_str(content: &str) -> TransformResult<Self> {
        let config: TreeConfig = ron::from_str(content)
            .map_err(|e| TransformError::Config(format!("Failed to parse configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_ron_string(&self) -> TransformResult<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| TransformError::Config(format!("Failed to serialize configuration: {e}")))
    }

    fn validate(&self) -> TransformResult<()> {
        if self.max_samples_per_frame == 0 {
            return Err(TransformError::Config(
                "max_samples_per_frame must be at least 1".to_string(),
            ));
        }
        if !self.quaternion_norm_tolerance.is_finite() || self.quaternion_norm_tolerance < 0.0 {
            return Err(TransformError::Config(format!(
                "quaternion_norm_tolerance must be a finite positive number, got {}",
                self.quaternion_norm_tolerance
            )));
        }
        Ok(())
    }
}

/// Read a tree configuration from a RON file.
pub fn read_configuration(config_filename: impl AsRef<Path>) -> TransformResult<TreeConfig> {
    let path = config_filename.as_ref();
    let config_content = read_to_string(path).map_err(|e| {
        TransformError::Config(format!(
            "Failed to read configuration file: {:?} ({e})",
            path
        ))
    })?;
    TreeConfig::from_ron_str(&config_content)
}
