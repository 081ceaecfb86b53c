//! Global pose selection over the pair graph.
//!
//! Cameras are nodes; an ordered pair `(child, parent)` with a usable
//! transform is an edge weighted by its number of valid correspondences.
//! A maximum spanning tree rooted at the reference camera is grown with
//! Prim's algorithm, so every camera is chained to the reference through the
//! best-supported pairs. Each camera pose relative to the reference is the
//! product of pair transforms along its tree path:
//!
//! ```text
//! G_ref = I
//! G_c   = G_parent(c) · T(c → parent(c))
//! ```
//!
//! Ties are broken deterministically: candidates are scanned in ascending
//! `(child, parent)` order and only a strictly greater weight replaces the
//! current best.

use align_core::{Mat4, Real};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpanningError {
    #[error("reference camera {reference} out of range for {num_cameras} cameras")]
    InvalidReference { reference: usize, num_cameras: usize },
}

/// How a camera's global pose is supported by evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraSupport {
    /// Defines the shared frame.
    Reference,
    /// Chained to `parent` through a pair with `correspondences` valid points.
    Connected { parent: usize, correspondences: usize },
    /// No usable chain to the reference; pose is the identity seed.
    Disconnected,
}

impl CameraSupport {
    pub fn is_supported(&self) -> bool {
        !matches!(self, CameraSupport::Disconnected)
    }
}

/// Maximum spanning tree over the pair graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanningTree {
    pub reference: usize,
    pub support: Vec<CameraSupport>,
    /// Cameras in insertion order, reference first; parents precede children.
    pub order: Vec<usize>,
}

impl SpanningTree {
    pub fn num_cameras(&self) -> usize {
        self.support.len()
    }

    pub fn parent(&self, camera: usize) -> Option<usize> {
        match self.support.get(camera)? {
            CameraSupport::Connected { parent, .. } => Some(*parent),
            _ => None,
        }
    }

    /// Cameras with no chain to the reference.
    pub fn disconnected(&self) -> impl Iterator<Item = usize> + '_ {
        self.support
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_supported())
            .map(|(c, _)| c)
    }

    /// Compose camera-to-reference transforms along the tree.
    ///
    /// `pair(child, parent)` must return the transform mapping points of
    /// `child` into `parent`. Disconnected cameras get the identity.
    pub fn compose<F>(&self, mut pair: F) -> Vec<Mat4>
    where
        F: FnMut(usize, usize) -> Mat4,
    {
        let mut globals = vec![Mat4::identity(); self.num_cameras()];
        for &camera in self.order.iter().skip(1) {
            if let Some(parent) = self.parent(camera) {
                globals[camera] = globals[parent] * pair(camera, parent);
            }
        }
        globals
    }
}

/// Grow a maximum spanning tree from `reference`.
///
/// `weight(child, parent)` is the number of valid correspondences of the pair
/// `child → parent`, or 0 when that pair has no usable transform. Edges with
/// zero weight are never used.
pub fn maximum_spanning_tree<W>(
    num_cameras: usize,
    reference: usize,
    weight: W,
) -> Result<SpanningTree, SpanningError>
where
    W: Fn(usize, usize) -> usize,
{
    if reference >= num_cameras {
        return Err(SpanningError::InvalidReference {
            reference,
            num_cameras,
        });
    }

    let mut support = vec![CameraSupport::Disconnected; num_cameras];
    let mut in_tree = vec![false; num_cameras];
    let mut order = Vec::with_capacity(num_cameras);

    support[reference] = CameraSupport::Reference;
    in_tree[reference] = true;
    order.push(reference);

    loop {
        let mut best: Option<(usize, usize, usize)> = None;
        for child in (0..num_cameras).filter(|&c| !in_tree[c]) {
            for parent in (0..num_cameras).filter(|&p| in_tree[p]) {
                let w = weight(child, parent);
                if w == 0 {
                    continue;
                }
                if best.map_or(true, |(_, _, bw)| w > bw) {
                    best = Some((child, parent, w));
                }
            }
        }

        let Some((child, parent, correspondences)) = best else {
            break;
        };
        support[child] = CameraSupport::Connected {
            parent,
            correspondences,
        };
        in_tree[child] = true;
        order.push(child);
    }

    Ok(SpanningTree {
        reference,
        support,
        order,
    })
}

/// Fraction of cameras with evidence-backed poses.
pub fn supported_fraction(tree: &SpanningTree) -> Real {
    if tree.num_cameras() == 0 {
        return 0.0;
    }
    let supported = tree.support.iter().filter(|s| s.is_supported()).count();
    supported as Real / tree.num_cameras() as Real
}
