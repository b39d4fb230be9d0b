//! Sector-partitioned spatial index for proximity queries
//!
//! Divides the map into fixed-size sectors and records every entity in each
//! sector its footprint (`position ± radius`) overlaps. Queries visit only the
//! sectors covering `point ± range`, then filter by exact distance.
//!
//! The index is a pure function of one entity snapshot. It must be rebuilt as
//! soon as any entity in that snapshot moves.

use hashbrown::HashMap;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::game::constants::spatial::SECTOR_SIZE;
use crate::game::state::{EntityId, PlayerId};
use crate::util::vec2::Vec2;

/// Sector coordinates, always within `[0, sectors_per_axis)`
pub type SectorKey = (i32, i32);

/// Initial capacity for entity vectors within sectors
const SECTOR_INITIAL_CAPACITY: usize = 8;

/// Identity of an indexed entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpatialEntityId {
    Player(PlayerId),
    Ai(EntityId),
}

/// Snapshot of one entity as seen by the index
#[derive(Debug, Clone, Copy)]
pub struct SpatialEntity {
    pub id: SpatialEntityId,
    pub position: Vec2,
    /// Footprint radius used for sector registration (0 for point entities)
    pub radius: f32,
}

impl SpatialEntity {
    pub fn player(id: PlayerId, position: Vec2, radius: f32) -> Self {
        Self {
            id: SpatialEntityId::Player(id),
            position,
            radius,
        }
    }

    pub fn ai(id: EntityId, position: Vec2) -> Self {
        Self {
            id: SpatialEntityId::Ai(id),
            position,
            radius: 0.0,
        }
    }
}

/// Unordered pair key: `(min(id), max(id))`
pub type PairKey = (SpatialEntityId, SpatialEntityId);

#[inline]
pub fn pair_key(a: SpatialEntityId, b: SpatialEntityId) -> PairKey {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Spatial index over one entity snapshot
pub struct SpatialIndex {
    sector_size: f32,
    inv_sector_size: f32,
    sectors_per_axis: i32,
    /// Indices into `entities` per overlapped sector
    sectors: HashMap<SectorKey, Vec<usize>>,
    entities: Vec<SpatialEntity>,
}

impl SpatialIndex {
    /// Build an index for a square map of edge `map_size`
    pub fn build(entities: Vec<SpatialEntity>, map_size: f32) -> Self {
        Self::with_sector_size(entities, map_size, SECTOR_SIZE)
    }

    pub fn with_sector_size(entities: Vec<SpatialEntity>, map_size: f32, sector_size: f32) -> Self {
        let sectors_per_axis = ((map_size / sector_size).ceil() as i32).max(1);
        let mut index = Self {
            sector_size,
            inv_sector_size: 1.0 / sector_size,
            sectors_per_axis,
            sectors: HashMap::with_capacity(entities.len().min(1024)),
            entities,
        };

        for i in 0..index.entities.len() {
            let entity = index.entities[i];
            for key in index.sectors_covering(entity.position, entity.radius) {
                index
                    .sectors
                    .entry(key)
                    .or_insert_with(|| Vec::with_capacity(SECTOR_INITIAL_CAPACITY))
                    .push(i);
            }
        }

        index
    }

    #[inline]
    fn axis_sector(&self, coord: f32) -> i32 {
        ((coord * self.inv_sector_size).floor() as i32).clamp(0, self.sectors_per_axis - 1)
    }

    /// Sector keys overlapped by the square `center ± reach`, clamped to index bounds
    pub fn sectors_covering(&self, center: Vec2, reach: f32) -> SmallVec<[SectorKey; 4]> {
        let reach = reach.max(0.0);
        let (min_x, max_x) = (self.axis_sector(center.x - reach), self.axis_sector(center.x + reach));
        let (min_y, max_y) = (self.axis_sector(center.y - reach), self.axis_sector(center.y + reach));

        let mut keys = SmallVec::new();
        for sx in min_x..=max_x {
            for sy in min_y..=max_y {
                keys.push((sx, sy));
            }
        }
        keys
    }

    /// Every entity in a sector overlapping `point ± range`, each at most once.
    ///
    /// A conservative superset of the exact result; callers filter by distance.
    pub fn candidates(&self, point: Vec2, range: f32) -> Vec<&SpatialEntity> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        for key in self.sectors_covering(point, range) {
            if let Some(indices) = self.sectors.get(&key) {
                for &i in indices {
                    if seen.insert(i) {
                        out.push(&self.entities[i]);
                    }
                }
            }
        }
        out
    }

    /// Entities whose position lies within `range` of `point` (inclusive)
    pub fn query_range(&self, point: Vec2, range: f32) -> Vec<&SpatialEntity> {
        let range_sq = range * range;
        self.candidates(point, range)
            .into_iter()
            .filter(|e| e.position.distance_sq_to(point) <= range_sq)
            .collect()
    }

    /// Candidate partners for `entity` within `range`, skipping the entity
    /// itself and any unordered pair already recorded in `seen`.
    pub fn potential_collisions(
        &self,
        entity: &SpatialEntity,
        range: f32,
        seen: &mut FxHashSet<PairKey>,
    ) -> Vec<SpatialEntity> {
        self.candidates(entity.position, range)
            .into_iter()
            .filter(|other| other.id != entity.id)
            .filter(|other| seen.insert(pair_key(entity.id, other.id)))
            .copied()
            .collect()
    }

    /// Every unordered pair whose centres are within `distance`, each once.
    ///
    /// Pairs come out in snapshot order of their first member.
    pub fn colliding_pairs(&self, distance: f32) -> Vec<(SpatialEntity, SpatialEntity)> {
        let distance_sq = distance * distance;
        let mut seen = FxHashSet::default();
        let mut pairs = Vec::new();

        for entity in &self.entities {
            for other in self.potential_collisions(entity, distance, &mut seen) {
                if entity.position.distance_sq_to(other.position) <= distance_sq {
                    pairs.push((*entity, other));
                }
            }
        }
        pairs
    }

    pub fn entities(&self) -> &[SpatialEntity] {
        &self.entities
    }

    pub fn sector_size(&self) -> f32 {
        self.sector_size
    }

    pub fn sectors_per_axis(&self) -> i32 {
        self.sectors_per_axis
    }

    pub fn stats(&self) -> SpatialIndexStats {
        SpatialIndexStats {
            non_empty_sectors: self.sectors.values().filter(|s| !s.is_empty()).count(),
            total_entities: self.entities.len(),
            max_per_sector: self.sectors.values().map(|s| s.len()).max().unwrap_or(0),
        }
    }
}

/// Statistics about the index
#[derive(Debug, Clone)]
pub struct SpatialIndexStats {
    pub non_empty_sectors: usize,
    pub total_entities: usize,
    pub max_per_sector: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn ai_at(id: EntityId, x: f32, y: f32) -> SpatialEntity {
        SpatialEntity::ai(id, Vec2::new(x, y))
    }

    fn random_entities(rng: &mut StdRng, count: usize, lo: f32, hi: f32) -> Vec<SpatialEntity> {
        (0..count)
            .map(|i| {
                let mut e = ai_at(i as EntityId, rng.gen_range(lo..hi), rng.gen_range(lo..hi));
                e.radius = rng.gen_range(0.0..30.0);
                e
            })
            .collect()
    }

    fn brute_force_range(entities: &[SpatialEntity], point: Vec2, range: f32) -> Vec<SpatialEntityId> {
        let mut ids: Vec<_> = entities
            .iter()
            .filter(|e| e.position.distance_sq_to(point) <= range * range)
            .map(|e| e.id)
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_sector_count_from_map_size() {
        let index = SpatialIndex::build(Vec::new(), 2000.0);
        assert_eq!(index.sectors_per_axis(), 20);

        let index = SpatialIndex::build(Vec::new(), 50.0);
        assert_eq!(index.sectors_per_axis(), 1);
    }

    #[test]
    fn test_sectors_clamped_at_edges() {
        let index = SpatialIndex::build(Vec::new(), 1000.0);

        let keys = index.sectors_covering(Vec2::new(0.0, 0.0), 50.0);
        assert_eq!(keys.as_slice(), &[(0, 0)]);

        let keys = index.sectors_covering(Vec2::new(1000.0, 1000.0), 0.0);
        assert_eq!(keys.as_slice(), &[(9, 9)]);
    }

    #[test]
    fn test_entity_registered_in_every_overlapped_sector() {
        let mut entity = ai_at(1, 100.0, 100.0);
        entity.radius = 10.0;
        let index = SpatialIndex::build(vec![entity], 1000.0);

        let stats = index.stats();
        assert_eq!(stats.non_empty_sectors, 4);
        assert_eq!(stats.total_entities, 1);
        // Registered four times but reported once
        assert_eq!(index.candidates(Vec2::new(100.0, 100.0), 200.0).len(), 1);
    }

    #[test]
    fn test_query_range_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        let entities = random_entities(&mut rng, 300, 0.0, 2000.0);
        let index = SpatialIndex::build(entities.clone(), 2000.0);

        for _ in 0..200 {
            let point = Vec2::new(rng.gen_range(0.0..2000.0), rng.gen_range(0.0..2000.0));
            let range = rng.gen_range(0.0..250.0);

            let candidates: Vec<_> = index.candidates(point, range).iter().map(|e| e.id).collect();
            let expected = brute_force_range(&entities, point, range);
            for id in &expected {
                assert!(candidates.contains(id), "candidate set missed {:?}", id);
            }

            let mut exact: Vec<_> = index.query_range(point, range).iter().map(|e| e.id).collect();
            exact.sort();
            assert_eq!(exact, expected);
        }
    }

    #[test]
    fn test_clustered_entities_stay_correct() {
        let mut rng = StdRng::seed_from_u64(11);
        let entities = random_entities(&mut rng, 200, 400.0, 460.0);
        let index = SpatialIndex::build(entities.clone(), 1000.0);

        let point = Vec2::new(430.0, 430.0);
        let mut exact: Vec<_> = index.query_range(point, 20.0).iter().map(|e| e.id).collect();
        exact.sort();
        assert_eq!(exact, brute_force_range(&entities, point, 20.0));
    }

    #[test]
    fn test_potential_collisions_excludes_self_and_dedups() {
        let a = ai_at(1, 100.0, 100.0);
        let b = ai_at(2, 105.0, 100.0);
        let index = SpatialIndex::build(vec![a, b], 1000.0);

        let mut seen = FxHashSet::default();
        let from_a = index.potential_collisions(&a, 15.0, &mut seen);
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_a[0].id, b.id);

        // The (a, b) pair is already recorded, so b yields nothing new
        let from_b = index.potential_collisions(&b, 15.0, &mut seen);
        assert!(from_b.is_empty());
    }

    #[test]
    fn test_colliding_pairs_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(3);
        let entities = random_entities(&mut rng, 400, 0.0, 600.0);
        let index = SpatialIndex::build(entities.clone(), 600.0);

        let mut found: Vec<PairKey> = index
            .colliding_pairs(15.0)
            .iter()
            .map(|(a, b)| pair_key(a.id, b.id))
            .collect();
        found.sort();
        let before = found.len();
        found.dedup();
        assert_eq!(before, found.len(), "each pair must appear once");

        let mut expected = Vec::new();
        for i in 0..entities.len() {
            for j in (i + 1)..entities.len() {
                if entities[i].position.distance_to(entities[j].position) <= 15.0 {
                    expected.push(pair_key(entities[i].id, entities[j].id));
                }
            }
        }
        expected.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_pairs_across_sector_boundary() {
        let a = ai_at(1, 99.0, 50.0);
        let b = ai_at(2, 101.0, 50.0);
        let index = SpatialIndex::build(vec![a, b], 1000.0);
        assert_eq!(index.colliding_pairs(15.0).len(), 1);
    }

    #[test]
    fn test_pair_key_is_order_independent() {
        let a = SpatialEntityId::Ai(4);
        let b = SpatialEntityId::Ai(9);
        assert_eq!(pair_key(a, b), pair_key(b, a));
    }
}
