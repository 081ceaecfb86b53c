//! Closed-form initialization of every ordered camera pair.

use crate::procrustes::{umeyama, ProcrustesError, MIN_PROCRUSTES_POINTS};
use align_core::{PairCorrespondences, PairTransform, Real};
use log::{debug, warn};

/// A pair that received a closed-form estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct PairEstimate {
    pub from: usize,
    pub to: usize,
    pub transform: PairTransform,
    pub correspondences: usize,
    pub rms_error: Real,
}

/// Why a pair kept its seed.
#[derive(Debug, Clone, PartialEq)]
pub enum PairSkipReason {
    /// Fewer valid correspondences than required.
    TooFewCorrespondences { count: usize, required: usize },
    /// The closed-form solve rejected the configuration.
    Failed(ProcrustesError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairSkip {
    pub from: usize,
    pub to: usize,
    pub reason: PairSkipReason,
}

/// Result of initializing all ordered pairs of a rig.
#[derive(Debug, Clone, Default)]
pub struct PairInitResult {
    pub estimates: Vec<PairEstimate>,
    pub skipped: Vec<PairSkip>,
}

impl PairInitResult {
    /// Returns `true` if no pair received an estimate.
    pub fn is_empty(&self) -> bool {
        self.estimates.is_empty()
    }
}

/// Run the Umeyama solve on every ordered pair with at least
/// `min_correspondences` valid correspondences.
///
/// Pairs below the threshold, or whose point configuration is degenerate,
/// are reported in [`PairInitResult::skipped`] and should keep their seed.
pub fn initialize_pairs(pairs: &PairCorrespondences, min_correspondences: usize) -> PairInitResult {
    let required = min_correspondences.max(MIN_PROCRUSTES_POINTS);
    let mut result = PairInitResult::default();

    for corr in pairs.iter() {
        let count = corr.len();
        if count < required {
            if count > 0 {
                debug!(
                    "pair {}->{}: {} valid correspondences, need {}",
                    corr.from, corr.to, count, required
                );
            }
            result.skipped.push(PairSkip {
                from: corr.from,
                to: corr.to,
                reason: PairSkipReason::TooFewCorrespondences { count, required },
            });
            continue;
        }

        match umeyama(&corr.from_points, &corr.to_points) {
            Ok(sim) => {
                let rms_error = sim.rms_error(&corr.from_points, &corr.to_points);
                debug!(
                    "pair {}->{}: scale {:.6}, rms {:.3e} over {} points",
                    corr.from, corr.to, sim.scale, rms_error, count
                );
                result.estimates.push(PairEstimate {
                    from: corr.from,
                    to: corr.to,
                    transform: sim.to_pair_transform(),
                    correspondences: count,
                    rms_error,
                });
            }
            Err(err) => {
                warn!("pair {}->{}: initialization failed: {}", corr.from, corr.to, err);
                result.skipped.push(PairSkip {
                    from: corr.from,
                    to: corr.to,
                    reason: PairSkipReason::Failed(err),
                });
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::{CharacteristicPointSet, Pt3, ValidityFilter};

    fn set(points: &[(i64, [f64; 3])]) -> CharacteristicPointSet {
        points
            .iter()
            .map(|(id, p)| (*id, Pt3::new(p[0], p[1], p[2])))
            .collect()
    }

    #[test]
    fn pairs_below_threshold_are_skipped() {
        let a = set(&[(1, [0.0, 0.0, 0.0]), (2, [1.0, 0.0, 0.0])]);
        let b = set(&[(1, [0.0, 0.0, 1.0]), (2, [1.0, 0.0, 1.0])]);
        let grid = PairCorrespondences::build(&[a, b], &ValidityFilter::default());

        let result = initialize_pairs(&grid, 3);
        assert!(result.is_empty());
        assert_eq!(result.skipped.len(), 2);
        assert!(matches!(
            result.skipped[0].reason,
            PairSkipReason::TooFewCorrespondences {
                count: 2,
                required: 3
            }
        ));
    }

    #[test]
    fn translation_only_pair_is_recovered() {
        let pts = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let a: CharacteristicPointSet = pts
            .iter()
            .enumerate()
            .map(|(i, p)| (i as i64, Pt3::new(p[0], p[1], p[2])))
            .collect();
        let b: CharacteristicPointSet = pts
            .iter()
            .enumerate()
            .map(|(i, p)| (i as i64, Pt3::new(p[0] + 2.0, p[1], p[2] - 1.0)))
            .collect();
        let grid = PairCorrespondences::build(&[a, b], &ValidityFilter::default());

        let result = initialize_pairs(&grid, 3);
        assert_eq!(result.estimates.len(), 2);
        let fwd = result
            .estimates
            .iter()
            .find(|e| e.from == 0 && e.to == 1)
            .unwrap();
        let t = fwd.transform.translation;
        assert!((t[0] - 2.0).abs() < 1e-9 && t[1].abs() < 1e-9 && (t[2] + 1.0).abs() < 1e-9);
        assert!(fwd.transform.rotation.iter().all(|w| w.abs() < 1e-9));
    }

    #[test]
    fn collinear_pair_reports_failure() {
        let a: CharacteristicPointSet = (0..4).map(|i| (i, Pt3::new(i as f64, 0.0, 0.0))).collect();
        let b: CharacteristicPointSet = (0..4).map(|i| (i, Pt3::new(0.0, i as f64, 0.0))).collect();
        let grid = PairCorrespondences::build(&[a, b], &ValidityFilter::default());

        let result = initialize_pairs(&grid, 3);
        assert!(result.is_empty());
        assert!(result
            .skipped
            .iter()
            .all(|s| matches!(s.reason, PairSkipReason::Failed(ProcrustesError::Degenerate(_)))));
    }
}
