// ============================================================================
// PIPELINE SETTINGS — tunables shared by the engines and the supervisor
// ============================================================================

use std::time::Duration;

use crate::ops::transform::Interpolation;

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    /// Canny hysteresis thresholds on the L1 gradient magnitude.
    pub canny_low: f32,
    pub canny_high: f32,
    /// Resampling used by scale and arbitrary-angle rotation.
    pub interpolation: Interpolation,
    /// Sleep between `try_lock` attempts on the coordinator thread.
    pub lock_poll: Duration,
    /// Sleep between checks while waiting for a retiring worker to exit.
    pub shutdown_poll: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            interpolation: Interpolation::Bilinear,
            lock_poll: Duration::from_millis(2),
            shutdown_poll: Duration::from_millis(5),
        }
    }
}
