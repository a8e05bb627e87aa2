//! Trench geometry types.

use photoscribe_math::Point2;

/// A fabricated cavity region: a closed boundary ("wall") traversed at
/// stepped depths, plus interior fill paths ("floor") run once per level.
#[derive(Debug, Clone)]
pub struct Trench {
    /// Boundary polygon vertices in traversal order. The first vertex is
    /// the anchor the master program positions to before each level.
    pub boundary: Vec<Point2>,
    /// Interior fill polylines covering the floor.
    pub floor: Vec<Vec<Point2>>,
}

impl Trench {
    /// Create a trench from its boundary and floor paths.
    pub fn new(boundary: Vec<Point2>, floor: Vec<Vec<Point2>>) -> Self {
        Self { boundary, floor }
    }

    /// First boundary vertex, if any.
    pub fn anchor(&self) -> Option<Point2> {
        self.boundary.first().copied()
    }

    /// Boundary traversal with the ring explicitly closed: if the last
    /// vertex does not coincide with the first, the first is appended.
    pub fn closed_boundary(&self) -> Vec<Point2> {
        let mut ring = self.boundary.clone();
        if let (Some(&first), Some(&last)) = (ring.first(), ring.last()) {
            if first != last {
                ring.push(first);
            }
        }
        ring
    }
}

/// An ordered set of trenches fabricated together, level by level.
#[derive(Debug, Clone, Default)]
pub struct TrenchColumn {
    /// Trenches in fabrication order.
    pub trenches: Vec<Trench>,
}

impl TrenchColumn {
    /// Create a column from its trenches.
    pub fn new(trenches: Vec<Trench>) -> Self {
        Self { trenches }
    }

    /// Number of trenches in the column.
    pub fn len(&self) -> usize {
        self.trenches.len()
    }

    /// Does the column hold no trenches?
    pub fn is_empty(&self) -> bool {
        self.trenches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_boundary_appends_first_vertex() {
        let t = Trench::new(
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(1.0, 1.0),
            ],
            vec![],
        );
        let ring = t.closed_boundary();
        assert_eq!(ring.len(), 4);
        assert_eq!(ring[3], ring[0]);
    }

    #[test]
    fn test_closed_boundary_keeps_closed_ring() {
        let t = Trench::new(
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(0.0, 0.0),
            ],
            vec![],
        );
        assert_eq!(t.closed_boundary().len(), 3);
    }

    #[test]
    fn test_anchor() {
        let t = Trench::new(vec![Point2::new(2.0, 3.0)], vec![]);
        assert_eq!(t.anchor(), Some(Point2::new(2.0, 3.0)));
        assert!(Trench::new(vec![], vec![]).anchor().is_none());
    }
}
