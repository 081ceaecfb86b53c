//! Correspondence matching between camera point sets and validity filtering.
//!
//! For an ordered camera pair `(from, to)` the matcher collects every point
//! identifier present in both sets. The [`ValidityFilter`] then drops any
//! correspondence where either side has a coordinate of absurd magnitude
//! (sensor glitches, unprojected depth), and the dropped count is reported
//! through [`PairStats`].

use crate::{CharacteristicPointSet, PointId, Pt3, Real};
use log::debug;
use serde::{Deserialize, Serialize};

/// Default coordinate magnitude bound used by [`ValidityFilter`].
pub const DEFAULT_VALIDITY_BOUND: Real = 1.0e6;

/// Rejects points with non-finite coordinates or any coordinate magnitude
/// strictly greater than `bound`. A coordinate equal to `bound` is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidityFilter {
    pub bound: Real,
}

impl Default for ValidityFilter {
    fn default() -> Self {
        Self {
            bound: DEFAULT_VALIDITY_BOUND,
        }
    }
}

impl ValidityFilter {
    pub fn new(bound: Real) -> Self {
        Self { bound }
    }

    pub fn is_valid(&self, p: &Pt3) -> bool {
        p.coords
            .iter()
            .all(|c| c.is_finite() && c.abs() <= self.bound)
    }

    /// A correspondence is kept only if both of its points are valid.
    pub fn accepts(&self, from: &Pt3, to: &Pt3) -> bool {
        self.is_valid(from) && self.is_valid(to)
    }
}

/// Identifier-aligned points shared by an ordered camera pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Correspondence {
    pub from: usize,
    pub to: usize,
    /// Shared identifiers in ascending order.
    pub ids: Vec<PointId>,
    /// `from_points[i]` is point `ids[i]` in the `from` camera frame.
    pub from_points: Vec<Pt3>,
    /// `to_points[i]` is point `ids[i]` in the `to` camera frame.
    pub to_points: Vec<Pt3>,
}

impl Correspondence {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate `(id, from_point, to_point)` triples.
    pub fn iter(&self) -> impl Iterator<Item = (PointId, &Pt3, &Pt3)> + '_ {
        self.ids
            .iter()
            .zip(self.from_points.iter().zip(self.to_points.iter()))
            .map(|(id, (a, b))| (*id, a, b))
    }

    /// Keep only correspondences accepted by `filter`.
    pub fn filtered(&self, filter: &ValidityFilter) -> (Correspondence, PairStats) {
        let mut kept = Correspondence {
            from: self.from,
            to: self.to,
            ids: Vec::with_capacity(self.len()),
            from_points: Vec::with_capacity(self.len()),
            to_points: Vec::with_capacity(self.len()),
        };
        for (id, a, b) in self.iter() {
            if filter.accepts(a, b) {
                kept.ids.push(id);
                kept.from_points.push(*a);
                kept.to_points.push(*b);
            }
        }
        let stats = PairStats {
            shared: self.len(),
            valid: kept.len(),
            rejected: self.len() - kept.len(),
        };
        (kept, stats)
    }
}

/// Collect the points of `from_set` and `to_set` that share an identifier.
///
/// Both sets iterate in ascending identifier order, so this is a single merge.
pub fn match_points(
    from: usize,
    from_set: &CharacteristicPointSet,
    to: usize,
    to_set: &CharacteristicPointSet,
) -> Correspondence {
    let mut out = Correspondence {
        from,
        to,
        ids: Vec::new(),
        from_points: Vec::new(),
        to_points: Vec::new(),
    };

    let mut a = from_set.iter().peekable();
    let mut b = to_set.iter().peekable();
    while let (Some(&(id_a, pa)), Some(&(id_b, pb))) = (a.peek(), b.peek()) {
        match id_a.cmp(&id_b) {
            std::cmp::Ordering::Less => {
                a.next();
            }
            std::cmp::Ordering::Greater => {
                b.next();
            }
            std::cmp::Ordering::Equal => {
                out.ids.push(id_a);
                out.from_points.push(*pa);
                out.to_points.push(*pb);
                a.next();
                b.next();
            }
        }
    }
    out
}

/// Per-pair matching statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairStats {
    /// Identifiers present in both point sets.
    pub shared: usize,
    /// Correspondences that passed the validity filter.
    pub valid: usize,
    /// Correspondences dropped by the validity filter.
    pub rejected: usize,
}

/// Filtered correspondences for every ordered pair of a rig.
///
/// The diagonal (`from == to`) is never populated.
#[derive(Debug, Clone, Default)]
pub struct PairCorrespondences {
    num_cameras: usize,
    pairs: Vec<Option<Correspondence>>,
    stats: Vec<PairStats>,
}

impl PairCorrespondences {
    /// Match and filter all ordered pairs of `sets`.
    pub fn build(sets: &[CharacteristicPointSet], filter: &ValidityFilter) -> Self {
        let n = sets.len();
        let mut pairs = vec![None; n * n];
        let mut stats = vec![PairStats::default(); n * n];

        for from in 0..n {
            for to in 0..n {
                if from == to {
                    continue;
                }
                let raw = match_points(from, &sets[from], to, &sets[to]);
                let (kept, pair_stats) = raw.filtered(filter);
                if pair_stats.rejected > 0 {
                    debug!(
                        "pair {}->{}: rejected {} of {} shared correspondences",
                        from, to, pair_stats.rejected, pair_stats.shared
                    );
                }
                stats[from * n + to] = pair_stats;
                pairs[from * n + to] = Some(kept);
            }
        }

        Self {
            num_cameras: n,
            pairs,
            stats,
        }
    }

    pub fn num_cameras(&self) -> usize {
        self.num_cameras
    }

    /// Valid correspondences for `(from, to)`; `None` on the diagonal or out of range.
    pub fn get(&self, from: usize, to: usize) -> Option<&Correspondence> {
        if from == to || from >= self.num_cameras || to >= self.num_cameras {
            return None;
        }
        self.pairs[from * self.num_cameras + to].as_ref()
    }

    /// Statistics for `(from, to)`; zeroed on the diagonal or out of range.
    pub fn stats(&self, from: usize, to: usize) -> PairStats {
        if from == to || from >= self.num_cameras || to >= self.num_cameras {
            return PairStats::default();
        }
        self.stats[from * self.num_cameras + to]
    }

    /// Number of valid correspondences for `(from, to)`.
    pub fn valid_count(&self, from: usize, to: usize) -> usize {
        self.stats(from, to).valid
    }

    /// Iterate the correspondences of every ordered pair with `from != to`.
    pub fn iter(&self) -> impl Iterator<Item = &Correspondence> + '_ {
        self.pairs.iter().flatten()
    }

    /// Row-major `num_cameras × num_cameras` statistics grid.
    pub fn stats_grid(&self) -> &[PairStats] {
        &self.stats
    }

    /// Sum of correspondences rejected over all ordered pairs.
    pub fn total_rejected(&self) -> usize {
        self.stats.iter().map(|s| s.rejected).sum()
    }

    /// Sum of valid correspondences over all ordered pairs.
    pub fn total_valid(&self) -> usize {
        self.stats.iter().map(|s| s.valid).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(points: &[(PointId, [Real; 3])]) -> CharacteristicPointSet {
        points
            .iter()
            .map(|(id, p)| (*id, Pt3::new(p[0], p[1], p[2])))
            .collect()
    }

    #[test]
    fn match_collects_shared_ids_in_order() {
        let a = set(&[(1, [1.0, 0.0, 0.0]), (3, [3.0, 0.0, 0.0]), (5, [5.0, 0.0, 0.0])]);
        let b = set(&[(0, [0.0, 1.0, 0.0]), (3, [0.0, 3.0, 0.0]), (5, [0.0, 5.0, 0.0])]);

        let c = match_points(0, &a, 1, &b);
        assert_eq!(c.ids, vec![3, 5]);
        assert_eq!(c.from_points[0].x, 3.0);
        assert_eq!(c.to_points[1].y, 5.0);
    }

    #[test]
    fn validity_bound_is_inclusive() {
        let filter = ValidityFilter::default();
        assert!(filter.is_valid(&Pt3::new(1.0e6, -1.0e6, 0.0)));
        assert!(!filter.is_valid(&Pt3::new(1.0e6 + 1.0, 0.0, 0.0)));
        assert!(!filter.is_valid(&Pt3::new(0.0, -1.000_001e6, 0.0)));
        assert!(!filter.is_valid(&Pt3::new(f64::NAN, 0.0, 0.0)));
        assert!(!filter.is_valid(&Pt3::new(0.0, 0.0, f64::INFINITY)));
    }

    #[test]
    fn one_invalid_side_drops_correspondence() {
        let a = set(&[(1, [1.0, 0.0, 0.0]), (2, [2.0e7, 0.0, 0.0]), (3, [3.0, 0.0, 0.0])]);
        let b = set(&[(1, [0.0, 1.0, 0.0]), (2, [0.0, 2.0, 0.0]), (3, [0.0, 0.0, 2.0e7])]);

        let (kept, stats) = match_points(0, &a, 1, &b).filtered(&ValidityFilter::default());
        assert_eq!(kept.ids, vec![1]);
        assert_eq!(
            stats,
            PairStats {
                shared: 3,
                valid: 1,
                rejected: 2
            }
        );
    }

    #[test]
    fn pair_grid_never_contains_self_pairs() {
        let a = set(&[(1, [1.0, 0.0, 0.0])]);
        let b = set(&[(1, [0.0, 1.0, 0.0])]);
        let grid = PairCorrespondences::build(&[a, b], &ValidityFilter::default());

        assert!(grid.get(0, 0).is_none());
        assert!(grid.get(1, 1).is_none());
        assert_eq!(grid.valid_count(0, 1), 1);
        assert_eq!(grid.valid_count(1, 0), 1);
        assert_eq!(grid.iter().count(), 2);
        assert!(grid.iter().all(|c| c.from != c.to));
    }

    #[test]
    fn disjoint_sets_yield_empty_pair() {
        let a = set(&[(1, [1.0, 0.0, 0.0])]);
        let b = set(&[(2, [0.0, 1.0, 0.0])]);
        let grid = PairCorrespondences::build(&[a, b], &ValidityFilter::default());
        assert!(grid.get(0, 1).is_some_and(|c| c.is_empty()));
        assert_eq!(grid.stats(0, 1), PairStats::default());
    }
}
