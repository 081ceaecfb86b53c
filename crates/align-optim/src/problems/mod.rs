//! Problem builders for the optimization IR.

pub mod pair_bundle;
