//! Core types for multi-camera point-correspondence alignment.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec3`, `Pt3`, ...) and axis-angle helpers,
//! - per-camera characteristic point sets keyed by stable identifiers,
//! - correspondence matching with validity filtering and per-pair statistics,
//! - the pairwise transform parameterization (`rotation`, `translation`, `scale`),
//! - point sources, including a deterministic synthetic rig.
//!
//! Transform convention:
//! `p_to = scale ⊙ (R(rotation) · p_from) + translation`

/// Linear algebra type aliases and helpers.
pub mod math;

mod correspondence;
mod points;
mod source;
pub mod synthetic;
mod transform;

pub use correspondence::{
    match_points, Correspondence, PairCorrespondences, PairStats, ValidityFilter,
    DEFAULT_VALIDITY_BOUND,
};
pub use math::{Mat3, Mat4, Pt3, Real, Vec3};
pub use points::{CharacteristicPointSet, PointId};
pub use source::{CapturedPoints, CorrespondenceSource};
pub use transform::{PairTransform, PAIR_PARAM_DIM};
