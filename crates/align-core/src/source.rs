//! Sources of per-camera characteristic points.
//!
//! The calibration pipeline never cares whether point sets were captured by
//! real sensors or generated synthetically; both implement
//! [`CorrespondenceSource`].

use crate::CharacteristicPointSet;
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Provider of one [`CharacteristicPointSet`] per camera.
pub trait CorrespondenceSource {
    /// Short human-readable label used in logs.
    fn label(&self) -> &str;

    fn num_cameras(&self) -> usize;

    /// Point sets indexed by camera.
    fn point_sets(&self) -> Result<Vec<CharacteristicPointSet>>;
}

/// Point sets captured externally, one per camera.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapturedPoints {
    pub cameras: Vec<CharacteristicPointSet>,
}

impl CapturedPoints {
    pub fn new(cameras: Vec<CharacteristicPointSet>) -> Result<Self> {
        ensure!(!cameras.is_empty(), "need at least one camera point set");
        Ok(Self { cameras })
    }
}

impl CorrespondenceSource for CapturedPoints {
    fn label(&self) -> &str {
        "captured"
    }

    fn num_cameras(&self) -> usize {
        self.cameras.len()
    }

    fn point_sets(&self) -> Result<Vec<CharacteristicPointSet>> {
        Ok(self.cameras.clone())
    }
}
