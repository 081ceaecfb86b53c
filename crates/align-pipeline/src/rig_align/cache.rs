//! Lazily recomputed composed transforms, published as immutable snapshots.
//!
//! The owning [`CalibrationState`](super::CalibrationState) is the only writer.
//! It marks the cache dirty on every pair mutation and publishes a new
//! [`TransformSnapshot`] on the next lookup. Readers on other threads hold a
//! [`TransformHandle`] and always see a complete snapshot.

use align_core::math::invert_affine;
use align_core::Mat4;
use align_linear::CameraSupport;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

use super::error::CalibrationError;

/// Composed camera poses at one point in time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransformSnapshot {
    /// Increases by one per publication; 0 means nothing published yet.
    pub generation: u64,
    pub reference: usize,
    /// `camera_to_reference[c]` maps points of camera `c` into the reference frame.
    pub camera_to_reference: Vec<Mat4>,
    reference_to_camera: Vec<Mat4>,
    pub support: Vec<CameraSupport>,
}

impl TransformSnapshot {
    pub fn num_cameras(&self) -> usize {
        self.camera_to_reference.len()
    }

    /// Transform mapping points of camera `from` into camera `to`.
    pub fn transformation(&self, from: usize, to: usize) -> Result<Mat4, CalibrationError> {
        let n = self.num_cameras();
        for camera in [from, to] {
            if camera >= n {
                return Err(CalibrationError::CameraOutOfRange {
                    camera,
                    num_cameras: n,
                });
            }
        }
        Ok(self.reference_to_camera[to] * self.camera_to_reference[from])
    }
}

/// Cloneable read handle onto the latest published snapshot.
#[derive(Debug, Clone)]
pub struct TransformHandle {
    shared: Arc<RwLock<Arc<TransformSnapshot>>>,
}

impl TransformHandle {
    /// Latest snapshot. The lock is held only for the `Arc` clone.
    pub fn snapshot(&self) -> Arc<TransformSnapshot> {
        let guard = self.shared.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    pub fn transformation(&self, from: usize, to: usize) -> Result<Mat4, CalibrationError> {
        self.snapshot().transformation(from, to)
    }
}

#[derive(Debug)]
pub struct TransformCache {
    dirty: bool,
    current: Arc<TransformSnapshot>,
    shared: Arc<RwLock<Arc<TransformSnapshot>>>,
}

impl Default for TransformCache {
    fn default() -> Self {
        let current = Arc::new(TransformSnapshot::default());
        Self {
            dirty: true,
            shared: Arc::new(RwLock::new(Arc::clone(&current))),
            current,
        }
    }
}

// A cloned cache gets its own lock: handles never follow a copy of the state.
impl Clone for TransformCache {
    fn clone(&self) -> Self {
        Self {
            dirty: self.dirty,
            current: Arc::clone(&self.current),
            shared: Arc::new(RwLock::new(Arc::clone(&self.current))),
        }
    }
}

impl TransformCache {
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn current(&self) -> &Arc<TransformSnapshot> {
        &self.current
    }

    pub fn handle(&self) -> TransformHandle {
        TransformHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Publish freshly composed poses and clear the dirty flag.
    ///
    /// Nothing is published if any pose is singular; the cache stays dirty.
    pub fn publish(
        &mut self,
        reference: usize,
        camera_to_reference: Vec<Mat4>,
        support: Vec<CameraSupport>,
    ) -> Result<Arc<TransformSnapshot>, CalibrationError> {
        let reference_to_camera = camera_to_reference
            .iter()
            .enumerate()
            .map(|(camera, g)| {
                invert_affine(g).ok_or(CalibrationError::SingularTransform { camera })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let snapshot = Arc::new(TransformSnapshot {
            generation: self.current.generation + 1,
            reference,
            camera_to_reference,
            reference_to_camera,
            support,
        });

        *self.shared.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        self.current = Arc::clone(&snapshot);
        self.dirty = false;
        Ok(snapshot)
    }
}
