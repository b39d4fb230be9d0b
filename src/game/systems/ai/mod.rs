//! AI behaviour engine
//!
//! Sparks wander and flee, creepers patrol, hunt and retreat from light. Both
//! state machines are recomputed from scratch every tick against a snapshot
//! of the match's alive players.

pub mod creeper;
pub mod spark;

use std::f32::consts::TAU;

use rand::Rng;
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::game::constants::ai::EDGE_MARGIN;
use crate::game::error::CoreResult;
use crate::game::spatial::{SpatialEntity, SpatialEntityId, SpatialIndex};
use crate::game::state::{AiKind, EntityId, Match, MatchId, PlayerId};
use crate::util::vec2::Vec2;

pub use creeper::CreeperUpdate;
pub use spark::SparkUpdate;

/// Which AI family asked for a power-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerUpSource {
    Spark,
    Creeper,
}

/// Request for the effects collaborator to spawn a power-up
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerUpRequest {
    pub match_id: MatchId,
    pub position: Vec2,
    pub source: PowerUpSource,
}

/// Add an AI entity to an active match
pub fn spawn(m: &mut Match, kind: AiKind, position: Vec2, now: u64) -> CoreResult<EntityId> {
    m.ensure_active()?;
    m.validate_position(position)?;

    let id = m.spawn_entity(kind, position);
    m.touch(now);
    tracing::debug!("Match {} spawned {:?} #{} at ({:.0}, {:.0})", m.id, kind, id, position.x, position.y);
    Ok(id)
}

/// Nearest player found by a detection query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub player_id: PlayerId,
    pub position: Vec2,
    pub distance: f32,
}

/// Per-tick view of the alive players an AI pass reads
pub struct PlayerSnapshot {
    index: SpatialIndex,
    cloaked: FxHashSet<PlayerId>,
}

impl PlayerSnapshot {
    pub fn capture(m: &Match) -> Self {
        let mut cloaked = FxHashSet::default();
        let entities = m
            .alive_players()
            .map(|p| {
                if p.effects.cloaked {
                    cloaked.insert(p.id);
                }
                SpatialEntity::player(p.id, p.position, 0.0)
            })
            .collect();

        Self {
            index: SpatialIndex::build(entities, m.config.map_size),
            cloaked,
        }
    }

    /// Nearest alive player within `radius`, optionally skipping cloaked ones.
    /// Equal distances resolve to the lower player id.
    pub fn nearest(&self, point: Vec2, radius: f32, include_cloaked: bool) -> Option<Detection> {
        self.index
            .query_range(point, radius)
            .into_iter()
            .filter_map(|e| match e.id {
                SpatialEntityId::Player(id) if include_cloaked || !self.cloaked.contains(&id) => Some(Detection {
                    player_id: id,
                    position: e.position,
                    distance: e.position.distance_to(point),
                }),
                _ => None,
            })
            .min_by(|a, b| {
                a.distance
                    .total_cmp(&b.distance)
                    .then_with(|| a.player_id.cmp(&b.player_id))
            })
    }

    /// Nearest player visible to AI detection
    pub fn nearest_visible(&self, point: Vec2, radius: f32) -> Option<Detection> {
        self.nearest(point, radius, false)
    }
}

/// Keep AI movement inside the map with an edge margin
#[inline]
pub fn clamp_to_arena(position: Vec2, map_size: f32) -> Vec2 {
    let max = (map_size - EDGE_MARGIN).max(EDGE_MARGIN);
    position.clamp_to(EDGE_MARGIN, max)
}

/// Uniformly random unit direction, drawn fresh each tick
#[inline]
pub fn random_direction(rng: &mut impl Rng) -> Vec2 {
    Vec2::from_angle(rng.gen_range(0.0..TAU))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::error::CoreError;
    use crate::game::state::{MatchConfig, MatchStatus, PlayerEffects};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    fn active_match() -> Match {
        let mut m = Match::new(MatchConfig::default(), 0);
        m.start(0).unwrap();
        m
    }

    #[test]
    fn test_spawn_assigns_unique_ids() {
        let mut m = active_match();
        let a = spawn(&mut m, AiKind::Spark, Vec2::new(100.0, 100.0), 5).unwrap();
        let b = spawn(&mut m, AiKind::Creeper, Vec2::new(200.0, 100.0), 6).unwrap();
        assert_ne!(a, b);
        assert_eq!(m.entities.len(), 2);
        assert_eq!(m.entity(b).unwrap().kind(), AiKind::Creeper);
        assert_eq!(m.last_activity_ms, 6);
    }

    #[test]
    fn test_spawn_validates() {
        let mut m = Match::new(MatchConfig::default(), 0);
        assert!(matches!(
            spawn(&mut m, AiKind::Spark, Vec2::new(1.0, 1.0), 0),
            Err(CoreError::MatchNotActive(_))
        ));

        m.start(0).unwrap();
        assert!(matches!(
            spawn(&mut m, AiKind::Spark, Vec2::new(-1.0, 1.0), 0),
            Err(CoreError::PositionOutOfBounds { .. })
        ));
        assert!(m.entities.is_empty());

        m.status = MatchStatus::Finished;
        assert!(spawn(&mut m, AiKind::Spark, Vec2::new(1.0, 1.0), 0).is_err());
    }

    #[test]
    fn test_snapshot_hides_cloaked_from_detection() {
        let mut m = active_match();
        let visible = Uuid::new_v4();
        let hidden = Uuid::new_v4();
        m.add_player(visible, "V".into(), Vec2::new(140.0, 100.0), 0).unwrap();
        m.add_player(hidden, "H".into(), Vec2::new(110.0, 100.0), 0).unwrap();
        m.player_mut(hidden).unwrap().set_effects(PlayerEffects {
            cloaked: true,
            ..Default::default()
        });

        let snapshot = PlayerSnapshot::capture(&m);
        let point = Vec2::new(100.0, 100.0);
        assert_eq!(snapshot.nearest_visible(point, 50.0).unwrap().player_id, visible);
        assert_eq!(snapshot.nearest(point, 50.0, true).unwrap().player_id, hidden);
        assert!(snapshot.nearest_visible(point, 20.0).is_none());
    }

    #[test]
    fn test_snapshot_skips_dead_players() {
        let mut m = active_match();
        let dead = Uuid::new_v4();
        m.add_player(dead, "D".into(), Vec2::new(100.0, 100.0), 0).unwrap();
        m.player_mut(dead).unwrap().eliminate(0);

        let snapshot = PlayerSnapshot::capture(&m);
        assert!(snapshot.nearest(Vec2::new(100.0, 100.0), 50.0, true).is_none());
    }

    #[test]
    fn test_clamp_to_arena() {
        assert_eq!(clamp_to_arena(Vec2::new(-5.0, 1995.0), 2000.0), Vec2::new(10.0, 1990.0));
        assert_eq!(clamp_to_arena(Vec2::new(500.0, 500.0), 2000.0), Vec2::new(500.0, 500.0));
    }

    #[test]
    fn test_random_direction_is_unit() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert!((random_direction(&mut rng).length() - 1.0).abs() < 1e-4);
        }
    }
}
