//! Residual models shared by the backends.
//!
//! Residual functions are generic over [`nalgebra::RealField`] so they can be
//! evaluated with plain `f64` or with dual numbers for automatic differentiation.

pub mod point_correspondence;

pub use point_correspondence::point_correspondence_residual;
