//! Mutable calibration state shared by every rig alignment step.

use align_core::math::transform_point_affine;
use align_core::{Mat4, PairCorrespondences, PairStats, PairTransform, Real};
use align_linear::{maximum_spanning_tree, CameraSupport, SpanningError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::cache::{TransformCache, TransformHandle, TransformSnapshot};
use super::error::CalibrationError;

/// Lifecycle of a calibration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CalibrationPhase {
    #[default]
    Uninitialized,
    Initialized,
    Refined,
}

/// How far a single pair transform has been solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PairStatus {
    /// Identity seed, never solved.
    #[default]
    Seed,
    Initialized,
    Refined,
}

impl PairStatus {
    pub fn is_solved(self) -> bool {
        !matches!(self, PairStatus::Seed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PairEntry {
    pub transform: PairTransform,
    pub status: PairStatus,
}

/// Row-major `N × N` grid of ordered pair transforms.
///
/// Diagonal cells exist for indexing only; they are never returned or written.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PairGrid {
    num_cameras: usize,
    entries: Vec<PairEntry>,
}

impl PairGrid {
    pub fn new(num_cameras: usize) -> Self {
        Self {
            num_cameras,
            entries: vec![PairEntry::default(); num_cameras * num_cameras],
        }
    }

    pub fn num_cameras(&self) -> usize {
        self.num_cameras
    }

    fn index(&self, from: usize, to: usize) -> Result<usize, CalibrationError> {
        for camera in [from, to] {
            if camera >= self.num_cameras {
                return Err(CalibrationError::CameraOutOfRange {
                    camera,
                    num_cameras: self.num_cameras,
                });
            }
        }
        if from == to {
            return Err(CalibrationError::SelfPair { camera: from });
        }
        Ok(from * self.num_cameras + to)
    }

    pub fn get(&self, from: usize, to: usize) -> Option<&PairEntry> {
        self.index(from, to).ok().map(|i| &self.entries[i])
    }

    pub fn set(
        &mut self,
        from: usize,
        to: usize,
        transform: PairTransform,
        status: PairStatus,
    ) -> Result<(), CalibrationError> {
        let i = self.index(from, to)?;
        self.entries[i] = PairEntry { transform, status };
        Ok(())
    }

    /// Off-diagonal entries in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &PairEntry)> + '_ {
        let n = self.num_cameras;
        self.entries
            .iter()
            .enumerate()
            .map(move |(i, e)| (i / n, i % n, e))
            .filter(|(from, to, _)| from != to)
    }

    pub fn count(&self, status: PairStatus) -> usize {
        self.iter().filter(|(_, _, e)| e.status == status).count()
    }
}

/// Best composed poses seen so far and their total squared residual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestTransformations {
    pub camera_to_reference: Vec<Mat4>,
    pub cost: Real,
}

/// Intermediate state for rig alignment.
///
/// Correspondences and the transform cache are derived from the input and the
/// pair grid; they are skipped when serializing and rebuilt on demand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationState {
    pub phase: CalibrationPhase,
    pub reference_camera: usize,
    pub pairs: PairGrid,

    // ─────────────────────────────────────────────────────────────────────────
    // Matching
    // ─────────────────────────────────────────────────────────────────────────
    /// Row-major per-pair statistics from the last match.
    pub pair_stats: Vec<PairStats>,
    /// Validity bound the last match was filtered with.
    #[serde(default)]
    pub matched_bound: Option<Real>,
    /// Support of each camera in the last published snapshot.
    pub support: Vec<CameraSupport>,

    // ─────────────────────────────────────────────────────────────────────────
    // Refinement progress
    // ─────────────────────────────────────────────────────────────────────────
    pub best: Option<BestTransformations>,
    /// Refine passes since the last strict improvement of `best`.
    pub passes_without_improvement: usize,
    pub refine_passes: usize,
    /// Total cost after the latest step, regressions included.
    pub last_cost: Option<Real>,

    #[serde(skip)]
    correspondences: Option<PairCorrespondences>,
    #[serde(skip)]
    cache: TransformCache,
}

impl CalibrationState {
    pub fn num_cameras(&self) -> usize {
        self.pairs.num_cameras()
    }

    /// Size the pair grid for the rig and choose the reference camera.
    ///
    /// The grid and every result built on it are reset only when the number of
    /// cameras changes. A new reference keeps the pair transforms but drops the
    /// best poses, which are expressed in the old reference frame. Existing
    /// reader handles stay attached.
    pub fn prepare(&mut self, num_cameras: usize, reference_camera: usize) {
        if self.pairs.num_cameras() != num_cameras {
            let mut cache = std::mem::take(&mut self.cache);
            cache.mark_dirty();
            *self = Self {
                pairs: PairGrid::new(num_cameras),
                cache,
                ..Self::default()
            };
        }
        if self.reference_camera != reference_camera {
            self.reference_camera = reference_camera;
            self.clear_progress();
            self.cache.mark_dirty();
        }
    }

    /// Store the correspondences filtered with `validity_bound`.
    ///
    /// Costs under a different bound are not comparable, so a bound change
    /// drops the best poses.
    pub fn set_correspondences(
        &mut self,
        correspondences: PairCorrespondences,
        validity_bound: Real,
    ) {
        if self.matched_bound.is_some_and(|bound| bound != validity_bound) {
            self.clear_progress();
        }
        self.matched_bound = Some(validity_bound);
        self.pair_stats = correspondences.stats_grid().to_vec();
        self.correspondences = Some(correspondences);
        self.cache.mark_dirty();
    }

    /// `true` when the stored correspondences and reference no longer match
    /// the given settings, or were never built.
    pub fn is_stale(&self, validity_bound: Real, reference_camera: usize) -> bool {
        !self.has_correspondences()
            || self.matched_bound != Some(validity_bound)
            || self.reference_camera != reference_camera
    }

    fn clear_progress(&mut self) {
        self.best = None;
        self.passes_without_improvement = 0;
        self.last_cost = None;
    }

    pub fn correspondences(&self) -> Option<&PairCorrespondences> {
        self.correspondences.as_ref()
    }

    pub fn has_correspondences(&self) -> bool {
        self.correspondences.is_some()
    }

    pub fn stats(&self, from: usize, to: usize) -> PairStats {
        let n = self.num_cameras();
        if from == to || from >= n || to >= n {
            return PairStats::default();
        }
        self.pair_stats.get(from * n + to).copied().unwrap_or_default()
    }

    /// Overwrite one pair transform and mark the composed transforms stale.
    pub fn set_pair(
        &mut self,
        from: usize,
        to: usize,
        transform: PairTransform,
        status: PairStatus,
    ) -> Result<(), CalibrationError> {
        self.pairs.set(from, to, transform, status)?;
        self.cache.mark_dirty();
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.cache.is_dirty()
    }

    pub fn is_initialized(&self) -> bool {
        self.phase != CalibrationPhase::Uninitialized
    }

    /// Reader handle for other threads.
    ///
    /// A handle follows this state only; replacing the session input starts a
    /// fresh state with its own cache.
    pub fn transform_handle(&self) -> TransformHandle {
        self.cache.handle()
    }

    /// Latest snapshot, recomposed first if any pair changed since.
    pub fn refresh(&mut self) -> Result<Arc<TransformSnapshot>, CalibrationError> {
        if !self.cache.is_dirty() {
            return Ok(Arc::clone(self.cache.current()));
        }

        let n = self.num_cameras();
        let pairs = &self.pairs;
        let tree = maximum_spanning_tree(n, self.reference_camera, |child, parent| {
            match pairs.get(child, parent) {
                Some(entry) if entry.status.is_solved() => self.stats(child, parent).valid,
                _ => 0,
            }
        })
        .map_err(|err| match err {
            SpanningError::InvalidReference {
                reference,
                num_cameras,
            } => CalibrationError::CameraOutOfRange {
                camera: reference,
                num_cameras,
            },
        })?;

        let globals = tree.compose(|child, parent| {
            pairs
                .get(child, parent)
                .map(|e| e.transform.to_matrix())
                .unwrap_or_else(Mat4::identity)
        });
        let snapshot = self
            .cache
            .publish(self.reference_camera, globals, tree.support.clone())?;
        self.support = tree.support;
        Ok(snapshot)
    }

    /// Transform mapping points of camera `from` into camera `to`.
    ///
    /// Recomposes only when dirty; otherwise the cached value is returned.
    pub fn transformation(&mut self, from: usize, to: usize) -> Result<Mat4, CalibrationError> {
        self.refresh()?.transformation(from, to)
    }

    /// Total squared residual of the composed transforms over all valid
    /// correspondences.
    pub fn total_cost(&mut self) -> Result<Real, CalibrationError> {
        let snapshot = self.refresh()?;
        let correspondences = self
            .correspondences
            .as_ref()
            .ok_or(CalibrationError::NoCorrespondences)?;

        let mut cost = 0.0;
        for corr in correspondences.iter().filter(|c| !c.is_empty()) {
            let t = snapshot.transformation(corr.from, corr.to)?;
            cost += corr
                .from_points
                .iter()
                .zip(&corr.to_points)
                .map(|(p, q)| (transform_point_affine(&t, p) - *q).norm_squared())
                .sum::<Real>();
        }
        Ok(cost)
    }

    /// Offer new composed poses as the best so far.
    ///
    /// Accepted only when `cost` does not exceed the current best.
    pub fn offer_best(&mut self, camera_to_reference: Vec<Mat4>, cost: Real) -> bool {
        let accept = self.best.as_ref().map_or(true, |best| cost <= best.cost);
        if accept {
            self.best = Some(BestTransformations {
                camera_to_reference,
                cost,
            });
        }
        accept
    }
}
