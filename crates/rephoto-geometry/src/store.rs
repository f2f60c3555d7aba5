use std::sync::Arc;

use crate::correspondence::{
    Correspondence, CorrespondenceId, CorrespondenceKind, CorrespondenceType, Point2, PointPair,
    Side,
};
use crate::error::StoreError;

/// Immutable view of the store handed to the compute worker.
#[derive(Clone, Debug)]
pub struct StoreSnapshot {
    /// Generation of the store when the snapshot was taken.
    pub generation: u64,
    /// Flattened point pairs, in insertion order.
    pub pairs: Arc<[PointPair]>,
}

/// Canonical, ordered collection of correspondences between image A and image B.
///
/// Every mutation bumps a monotonically increasing generation counter and marks the store
/// dirty. The dirty flag is cleared only by [`CorrespondenceStore::mark_solved`] for the
/// current generation.
#[derive(Clone, Debug, Default)]
pub struct CorrespondenceStore {
    entries: Vec<Correspondence>,
    next_id: u64,
    generation: u64,
    dirty: bool,
}

impl CorrespondenceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from correspondences with preassigned ids.
    ///
    /// The entries are kept in the given order. Fails with [`StoreError::InvalidShape`] on a
    /// duplicated id or a malformed entry; nothing is returned in that case.
    pub fn from_entries(entries: Vec<Correspondence>) -> Result<Self, StoreError> {
        let mut seen = std::collections::HashSet::with_capacity(entries.len());
        for entry in &entries {
            entry.kind.validate_shape()?;
            if !seen.insert(entry.id) {
                return Err(StoreError::InvalidShape(format!(
                    "duplicated correspondence id {}",
                    entry.id
                )));
            }
        }
        let next_id = entries.iter().map(|e| e.id.0 + 1).max().unwrap_or(0);
        Ok(Self {
            entries,
            next_id,
            generation: 1,
            dirty: true,
        })
    }

    fn insert(&mut self, kind: CorrespondenceKind) -> Result<CorrespondenceId, StoreError> {
        kind.validate_shape()?;
        let id = CorrespondenceId(self.next_id);
        self.next_id += 1;
        self.entries.push(Correspondence { id, kind });
        self.touch();
        Ok(id)
    }

    fn touch(&mut self) {
        self.generation += 1;
        self.dirty = true;
    }

    fn position(&self, id: CorrespondenceId) -> Result<usize, StoreError> {
        self.entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    /// Add a point correspondence.
    pub fn add_point(&mut self, a: Point2, b: Point2) -> Result<CorrespondenceId, StoreError> {
        self.insert(CorrespondenceKind::Point { a, b })
    }

    /// Add a directed line correspondence, `a0 -> a1` matching `b0 -> b1`.
    pub fn add_line(
        &mut self,
        a0: Point2,
        a1: Point2,
        b0: Point2,
        b1: Point2,
    ) -> Result<CorrespondenceId, StoreError> {
        self.insert(CorrespondenceKind::Line {
            a: [a0, a1],
            b: [b0, b1],
        })
    }

    /// Add a face correspondence from two corner lists ordered TL, TR, BR, BL.
    ///
    /// Fails with [`StoreError::InvalidShape`] unless both lists hold exactly 4 corners.
    pub fn add_face(
        &mut self,
        corners_a: &[Point2],
        corners_b: &[Point2],
    ) -> Result<CorrespondenceId, StoreError> {
        let a: [Point2; 4] = corners_a.try_into().map_err(|_| {
            StoreError::InvalidShape(format!(
                "a face needs 4 corners on side A, got {}",
                corners_a.len()
            ))
        })?;
        let b: [Point2; 4] = corners_b.try_into().map_err(|_| {
            StoreError::InvalidShape(format!(
                "a face needs 4 corners on side B, got {}",
                corners_b.len()
            ))
        })?;
        self.insert(CorrespondenceKind::Face { a, b })
    }

    /// Move one point of a correspondence.
    ///
    /// `index` addresses the point within the correspondence: always 0 for points, 0..2 for
    /// lines and 0..4 for faces.
    pub fn update(
        &mut self,
        id: CorrespondenceId,
        side: Side,
        index: usize,
        coord: Point2,
    ) -> Result<(), StoreError> {
        let pos = self.position(id)?;
        if !coord.iter().all(|v| v.is_finite()) {
            return Err(StoreError::InvalidShape(
                "coordinates must be finite".to_string(),
            ));
        }
        self.entries[pos].kind.set_point(side, index, coord)?;
        self.touch();
        Ok(())
    }

    /// Remove a correspondence, returning it.
    pub fn remove(&mut self, id: CorrespondenceId) -> Result<Correspondence, StoreError> {
        let pos = self.position(id)?;
        let removed = self.entries.remove(pos);
        self.touch();
        Ok(removed)
    }

    /// Bump the generation and mark the store dirty without editing it.
    ///
    /// Used when a setting that affects the solve changes.
    pub fn invalidate(&mut self) {
        self.touch();
    }

    /// Move the generation past `generation` and mark the store dirty.
    ///
    /// A store that replaces another one continues its counter, so generations observed by
    /// a compute worker never go backwards.
    pub fn advance_generation_past(&mut self, generation: u64) {
        self.generation = self.generation.max(generation);
        self.touch();
    }

    /// Remove every correspondence. Ids are never reused.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.touch();
    }

    /// The type of a correspondence.
    pub fn kind_of(&self, id: CorrespondenceId) -> Result<CorrespondenceType, StoreError> {
        Ok(self.get(id)?.kind.tag())
    }

    /// Borrow a correspondence by id.
    pub fn get(&self, id: CorrespondenceId) -> Result<&Correspondence, StoreError> {
        let pos = self.position(id)?;
        Ok(&self.entries[pos])
    }

    /// Iterate the correspondences in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Correspondence> {
        self.entries.iter()
    }

    /// Number of correspondences.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no correspondence.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flatten every correspondence into point pairs.
    ///
    /// Points contribute one pair, lines two and faces four, in insertion order. Reading does
    /// not clear the dirty flag.
    pub fn flatten_to_point_pairs(&self) -> Vec<PointPair> {
        self.entries
            .iter()
            .flat_map(|e| e.kind.point_pairs())
            .collect()
    }

    /// Current generation; incremented by every mutation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the store changed since the last completed solve.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Record that a solve for `generation` completed.
    ///
    /// Returns `false`, leaving the store dirty, if the store has moved past `generation`.
    pub fn mark_solved(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.dirty = false;
        true
    }

    /// Take an immutable snapshot of the flattened pairs for the compute worker.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            generation: self.generation,
            pairs: self.flatten_to_point_pairs().into(),
        }
    }
}
