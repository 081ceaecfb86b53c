//! Backend-independent intermediate representation of optimization problems.

mod types;

pub use types::{FactorKind, FixedMask, ParamBlock, ParamId, ProblemIR, ResidualBlock};
