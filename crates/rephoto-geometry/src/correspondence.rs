use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A 2d coordinate in pixel space, `[x, y]`.
pub type Point2 = [f64; 2];

/// Stable identifier of a correspondence inside a [`crate::CorrespondenceStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrespondenceId(pub u64);

impl std::fmt::Display for CorrespondenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which image a coordinate belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// The historical reference image, the warp target frame.
    A,
    /// The modern image, the warp source.
    B,
}

/// A single matched coordinate: `a` in image A and `b` in image B.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointPair {
    /// Coordinate in image A.
    pub a: Point2,
    /// Coordinate in image B.
    pub b: Point2,
}

/// The type tag of a correspondence, as returned by [`crate::CorrespondenceStore::kind_of`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CorrespondenceType {
    /// One point pair.
    Point,
    /// A directed segment, two point pairs.
    Line,
    /// A planar quad with corners TL, TR, BR, BL, four point pairs.
    Face,
}

/// Geometry of a correspondence.
///
/// Both sides always carry the same number of points, in the same order.
#[derive(Clone, Debug, PartialEq)]
pub enum CorrespondenceKind {
    /// A single point on each side.
    Point {
        /// Point in image A.
        a: Point2,
        /// Point in image B.
        b: Point2,
    },
    /// A directed segment on each side; `a[0] -> a[1]` matches `b[0] -> b[1]`.
    Line {
        /// Segment endpoints in image A.
        a: [Point2; 2],
        /// Segment endpoints in image B.
        b: [Point2; 2],
    },
    /// A quad on each side, corners ordered TL, TR, BR, BL.
    Face {
        /// Corners in image A.
        a: [Point2; 4],
        /// Corners in image B.
        b: [Point2; 4],
    },
}

impl CorrespondenceKind {
    /// The type tag of the correspondence.
    pub fn tag(&self) -> CorrespondenceType {
        match self {
            CorrespondenceKind::Point { .. } => CorrespondenceType::Point,
            CorrespondenceKind::Line { .. } => CorrespondenceType::Line,
            CorrespondenceKind::Face { .. } => CorrespondenceType::Face,
        }
    }

    /// Number of points on each side.
    pub fn num_points(&self) -> usize {
        self.points(Side::A).len()
    }

    /// The points of one side, in declaration order.
    pub fn points(&self, side: Side) -> &[Point2] {
        match (self, side) {
            (CorrespondenceKind::Point { a, .. }, Side::A) => std::slice::from_ref(a),
            (CorrespondenceKind::Point { b, .. }, Side::B) => std::slice::from_ref(b),
            (CorrespondenceKind::Line { a, .. }, Side::A) => a,
            (CorrespondenceKind::Line { b, .. }, Side::B) => b,
            (CorrespondenceKind::Face { a, .. }, Side::A) => a,
            (CorrespondenceKind::Face { b, .. }, Side::B) => b,
        }
    }

    fn points_mut(&mut self, side: Side) -> &mut [Point2] {
        match (self, side) {
            (CorrespondenceKind::Point { a, .. }, Side::A) => std::slice::from_mut(a),
            (CorrespondenceKind::Point { b, .. }, Side::B) => std::slice::from_mut(b),
            (CorrespondenceKind::Line { a, .. }, Side::A) => a,
            (CorrespondenceKind::Line { b, .. }, Side::B) => b,
            (CorrespondenceKind::Face { a, .. }, Side::A) => a,
            (CorrespondenceKind::Face { b, .. }, Side::B) => b,
        }
    }

    /// Replace the point at `index` on `side`.
    pub(crate) fn set_point(
        &mut self,
        side: Side,
        index: usize,
        coord: Point2,
    ) -> Result<(), StoreError> {
        let num_points = self.num_points();
        let slot = self.points_mut(side).get_mut(index).ok_or_else(|| {
            StoreError::InvalidShape(format!(
                "point index {index} out of range for a correspondence with {num_points} points"
            ))
        })?;
        *slot = coord;
        Ok(())
    }

    /// The point pairs contributed to the solver, in declaration order.
    pub fn point_pairs(&self) -> impl Iterator<Item = PointPair> + '_ {
        self.points(Side::A)
            .iter()
            .zip(self.points(Side::B))
            .map(|(&a, &b)| PointPair { a, b })
    }

    /// Check the structural shape: matching point counts and finite coordinates.
    pub fn validate_shape(&self) -> Result<(), StoreError> {
        let (pa, pb) = (self.points(Side::A), self.points(Side::B));
        if pa.len() != pb.len() {
            return Err(StoreError::InvalidShape(format!(
                "side A has {} points, side B has {}",
                pa.len(),
                pb.len()
            )));
        }
        if pa.iter().chain(pb).flatten().any(|v| !v.is_finite()) {
            return Err(StoreError::InvalidShape(
                "coordinates must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// A correspondence together with its store id.
#[derive(Clone, Debug, PartialEq)]
pub struct Correspondence {
    /// Stable id assigned by the store.
    pub id: CorrespondenceId,
    /// Geometry on both sides.
    pub kind: CorrespondenceKind,
}
