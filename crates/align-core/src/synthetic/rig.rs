use crate::math::{invert_affine, transform_point_affine};
use crate::{
    CharacteristicPointSet, CorrespondenceSource, Mat4, PairTransform, PointId, Pt3, Real,
};
use anyhow::{anyhow, ensure, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Identifier assigned to the first lattice point.
const FIRST_POINT_ID: PointId = 100;

/// Coordinate used for injected invalid points.
const INVALID_COORDINATE: Real = 2.0e6;

/// Synthetic multi-camera rig observing a shared point lattice.
///
/// `cameras[c]` is the ground-truth camera-to-reference transform of camera
/// `c`; the lattice is defined in the reference frame and each camera sees it
/// through the inverse of its transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticRig {
    pub cameras: Vec<PairTransform>,
    /// Lattice points along x, y, z.
    pub lattice: [usize; 3],
    pub spacing: Real,
    /// Lattice corner in the reference frame.
    pub origin: [Real; 3],
    /// Camera `c` misses point `i` when `(i + c) % hidden_every == 0`; 0 disables.
    pub hidden_every: usize,
    /// Half-width of uniform per-coordinate noise; 0 disables.
    pub noise: Real,
    pub seed: u64,
    /// Camera `c` reports point `i` far out of range when
    /// `(i + 2c) % invalid_every == 0`; 0 disables.
    pub invalid_every: usize,
}

impl SyntheticRig {
    /// Cameras on a ring around the lattice, camera 0 at the reference pose.
    pub fn ring(num_cameras: usize) -> Self {
        let radius = 1.5;
        let cameras = (0..num_cameras)
            .map(|c| {
                let theta = TAU * c as Real / num_cameras.max(1) as Real;
                PairTransform {
                    rotation: [0.05 * c as Real, theta, 0.0],
                    translation: [
                        radius * theta.sin(),
                        0.05 * c as Real,
                        radius * (1.0 - theta.cos()),
                    ],
                    scale: [1.0; 3],
                }
            })
            .collect();

        Self {
            cameras,
            lattice: [4, 4, 3],
            spacing: 0.2,
            origin: [-0.3, -0.3, 1.2],
            hidden_every: 5,
            noise: 0.0,
            seed: 7,
            invalid_every: 0,
        }
    }

    pub fn with_noise(mut self, noise: Real, seed: u64) -> Self {
        self.noise = noise;
        self.seed = seed;
        self
    }

    pub fn with_invalid_every(mut self, invalid_every: usize) -> Self {
        self.invalid_every = invalid_every;
        self
    }

    /// Lattice points in the reference frame, in identifier order.
    pub fn reference_points(&self) -> Vec<(PointId, Pt3)> {
        let [nx, ny, nz] = self.lattice;
        let mut out = Vec::with_capacity(nx * ny * nz);
        let mut id = FIRST_POINT_ID;
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    out.push((
                        id,
                        Pt3::new(
                            self.origin[0] + i as Real * self.spacing,
                            self.origin[1] + j as Real * self.spacing,
                            self.origin[2] + k as Real * self.spacing,
                        ),
                    ));
                    id += 1;
                }
            }
        }
        out
    }

    /// Ground-truth transform mapping camera `camera` into the reference frame.
    pub fn ground_truth(&self, camera: usize) -> Option<Mat4> {
        self.cameras.get(camera).map(PairTransform::to_matrix)
    }

    /// Ground-truth transform mapping camera `from` into camera `to`.
    pub fn ground_truth_pair(&self, from: usize, to: usize) -> Result<Mat4> {
        let g_from = self
            .ground_truth(from)
            .ok_or_else(|| anyhow!("camera {} out of range", from))?;
        let g_to = self
            .ground_truth(to)
            .ok_or_else(|| anyhow!("camera {} out of range", to))?;
        let g_to_inv =
            invert_affine(&g_to).ok_or_else(|| anyhow!("camera {} transform is singular", to))?;
        Ok(g_to_inv * g_from)
    }
}

impl CorrespondenceSource for SyntheticRig {
    fn label(&self) -> &str {
        "synthetic"
    }

    fn num_cameras(&self) -> usize {
        self.cameras.len()
    }

    fn point_sets(&self) -> Result<Vec<CharacteristicPointSet>> {
        ensure!(!self.cameras.is_empty(), "synthetic rig has no cameras");
        ensure!(self.noise >= 0.0, "noise must be non-negative");

        let reference = self.reference_points();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut sets = Vec::with_capacity(self.cameras.len());

        for (c, camera) in self.cameras.iter().enumerate() {
            let to_camera = invert_affine(&camera.to_matrix())
                .ok_or_else(|| anyhow!("camera {} transform is singular", c))?;

            let mut set = CharacteristicPointSet::new();
            for (i, (id, x)) in reference.iter().enumerate() {
                if self.hidden_every > 0 && (i + c) % self.hidden_every == 0 {
                    continue;
                }
                if self.invalid_every > 0 && (i + 2 * c) % self.invalid_every == 0 {
                    set.insert(*id, Pt3::new(INVALID_COORDINATE, 0.0, 0.0));
                    continue;
                }
                let mut p = transform_point_affine(&to_camera, x);
                if self.noise > 0.0 {
                    for coord in p.coords.iter_mut() {
                        *coord += rng.random_range(-self.noise..=self.noise);
                    }
                }
                set.insert(*id, p);
            }
            sets.push(set);
        }
        Ok(sets)
    }
}
