//! Per-camera characteristic point sets.

use crate::Pt3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable identifier of a characteristic point, shared across cameras.
pub type PointId = i64;

/// Identifiable 3D points observed by one camera, in that camera's frame.
///
/// Points are kept in ascending identifier order so that correspondence
/// matching is a linear merge and results are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacteristicPointSet {
    points: BTreeMap<PointId, Pt3>,
}

impl CharacteristicPointSet {
    /// Create an empty point set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a point, returning the previous point with the same identifier.
    pub fn insert(&mut self, id: PointId, point: Pt3) -> Option<Pt3> {
        self.points.insert(id, point)
    }

    /// Look up a point by identifier.
    pub fn get(&self, id: PointId) -> Option<&Pt3> {
        self.points.get(&id)
    }

    pub fn contains(&self, id: PointId) -> bool {
        self.points.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate points in ascending identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (PointId, &Pt3)> + '_ {
        self.points.iter().map(|(id, p)| (*id, p))
    }

    /// Identifiers in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = PointId> + '_ {
        self.points.keys().copied()
    }
}

impl FromIterator<(PointId, Pt3)> for CharacteristicPointSet {
    fn from_iter<I: IntoIterator<Item = (PointId, Pt3)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl Extend<(PointId, Pt3)> for CharacteristicPointSet {
    fn extend<I: IntoIterator<Item = (PointId, Pt3)>>(&mut self, iter: I) {
        self.points.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_is_sorted_by_id() {
        let set: CharacteristicPointSet = [
            (7, Pt3::new(7.0, 0.0, 0.0)),
            (-2, Pt3::new(-2.0, 0.0, 0.0)),
            (3, Pt3::new(3.0, 0.0, 0.0)),
        ]
        .into_iter()
        .collect();

        let ids: Vec<PointId> = set.ids().collect();
        assert_eq!(ids, vec![-2, 3, 7]);
        assert_eq!(set.get(3).map(|p| p.x), Some(3.0));
        assert!(!set.contains(4));
    }

    #[test]
    fn json_roundtrip_keeps_ids() {
        let mut set = CharacteristicPointSet::new();
        set.insert(42, Pt3::new(1.0, 2.0, 3.0));
        set.insert(-1, Pt3::new(0.5, 0.0, 0.0));

        let json = serde_json::to_string(&set).unwrap();
        let restored: CharacteristicPointSet = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, set);
    }
}
