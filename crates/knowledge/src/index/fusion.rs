//! Score fusion for hybrid retrieval.

use ragline_core::{AppError, AppResult};

/// Combines a dense similarity and a sparse similarity into one score.
///
/// Implementations must be monotonic in both arguments.
pub trait Fusion: Send + Sync + std::fmt::Debug {
    fn fuse(&self, dense: f32, sparse: f32) -> f32;
}

/// `alpha * dense + (1 - alpha) * sparse`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvexFusion {
    alpha: f32,
}

impl ConvexFusion {
    pub fn new(alpha: f32) -> AppResult<Self> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(AppError::Config(format!(
                "Fusion alpha must be within [0, 1], got {}",
                alpha
            )));
        }
        Ok(Self { alpha })
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }
}

impl Default for ConvexFusion {
    fn default() -> Self {
        Self { alpha: 0.5 }
    }
}

impl Fusion for ConvexFusion {
    fn fuse(&self, dense: f32, sparse: f32) -> f32 {
        self.alpha * dense + (1.0 - self.alpha) * sparse
    }
}
