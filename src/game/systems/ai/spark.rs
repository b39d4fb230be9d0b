//! Spark (wanderer) behaviour
//!
//! A spark flees from the nearest visible player within its detection radius
//! and otherwise drifts in a fresh random direction every tick. Any alive
//! player within consume distance of the spark's snapshot position absorbs it.

use rand::Rng;
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, trace};

use super::{clamp_to_arena, random_direction, PlayerSnapshot, PowerUpRequest, PowerUpSource};
use crate::game::constants::spark::*;
use crate::game::error::{CoreError, CoreResult};
use crate::game::state::{AiBehavior, AiKind, EntityId, Match, PlayerId, SparkState};
use crate::util::vec2::Vec2;

/// Result of one spark tick over a match
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SparkUpdate {
    pub updated: u32,
    pub consumed: u32,
    pub power_ups: Vec<PowerUpRequest>,
}

struct SparkStep {
    slot: usize,
    state: SparkState,
    target_id: Option<PlayerId>,
    position: Vec2,
    /// Player index that consumes this spark
    consumer: Option<usize>,
}

/// Next state, target and unclamped position for a spark at `position`
pub fn decide(
    position: Vec2,
    snapshot: &PlayerSnapshot,
    rng: &mut impl Rng,
) -> (SparkState, Option<PlayerId>, Vec2) {
    match snapshot.nearest_visible(position, DETECTION_RADIUS) {
        Some(threat) => {
            let away = (position - threat.position).normalize();
            let away = if away == Vec2::ZERO { random_direction(rng) } else { away };
            (SparkState::Flee, Some(threat.player_id), position + away * SPEED)
        }
        None => (SparkState::Wander, None, position + random_direction(rng) * SPEED),
    }
}

/// Run one spark tick over every spark in `m`
pub fn update(m: &mut Match, now: u64, rng: &mut impl Rng) -> CoreResult<SparkUpdate> {
    m.ensure_active()?;

    let snapshot = PlayerSnapshot::capture(m);
    let map_size = m.config.map_size;

    let mut steps = Vec::new();
    for (slot, entity) in m.entities.iter().enumerate() {
        if entity.kind() != AiKind::Spark {
            continue;
        }
        let (state, target_id, next) = decide(entity.position, &snapshot, rng);
        let consumer = match snapshot.nearest(entity.position, CONSUME_DISTANCE, true) {
            Some(hit) => Some(m.player_index(hit.player_id).ok_or_else(|| {
                CoreError::InvariantViolation(format!("spark #{} touched missing player {}", entity.id, hit.player_id))
            })?),
            None => None,
        };
        steps.push(SparkStep {
            slot,
            state,
            target_id,
            position: clamp_to_arena(next, map_size),
            consumer,
        });
    }

    let mut report = SparkUpdate::default();
    let mut transitions = 0u32;
    let mut consumed: FxHashSet<EntityId> = FxHashSet::default();

    for step in steps {
        let entity = &mut m.entities[step.slot];
        let behavior = AiBehavior::Spark(step.state);
        if entity.behavior != behavior {
            transitions += 1;
            trace!("Spark #{} -> {:?}", entity.id, step.state);
        }
        entity.behavior = behavior;
        entity.target_id = step.target_id;
        entity.position = step.position;
        report.updated += 1;

        if let Some(player_slot) = step.consumer {
            consumed.insert(entity.id);
            let spark_position = entity.position;

            let player = &mut m.players[player_slot];
            player.absorb(SIZE_REWARD);
            debug!("Match {}: {} consumed a spark (size {:.0})", m.id, player.name, player.size);

            if rng.gen_bool(POWER_UP_CHANCE) {
                report.power_ups.push(PowerUpRequest {
                    match_id: m.id,
                    position: spark_position,
                    source: PowerUpSource::Spark,
                });
            }
        }
    }

    if !consumed.is_empty() {
        m.entities.retain(|e| !consumed.contains(&e.id));
        report.consumed = consumed.len() as u32;
    }

    if transitions > 0 || report.consumed > 0 {
        m.touch(now);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{MatchConfig, PlayerEffects};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    fn active_match() -> Match {
        let mut m = Match::new(MatchConfig::default(), 0);
        m.start(0).unwrap();
        m
    }

    fn add_player(m: &mut Match, x: f32, y: f32) -> PlayerId {
        let id = Uuid::new_v4();
        m.add_player(id, "P".into(), Vec2::new(x, y), 0).unwrap();
        id
    }

    fn spark_state(m: &Match, id: EntityId) -> SparkState {
        match m.entity(id).unwrap().behavior {
            AiBehavior::Spark(state) => state,
            other => panic!("not a spark: {:?}", other),
        }
    }

    #[test]
    fn test_wanders_alone() {
        let mut m = active_match();
        let id = m.spawn_entity(AiKind::Spark, Vec2::new(500.0, 500.0));
        let mut rng = StdRng::seed_from_u64(1);

        let report = update(&mut m, 100, &mut rng).unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.consumed, 0);

        let spark = m.entity(id).unwrap();
        assert_eq!(spark_state(&m, id), SparkState::Wander);
        assert!(spark.target_id.is_none());
        assert!((spark.position.distance_to(Vec2::new(500.0, 500.0)) - SPEED).abs() < 1e-3);
        // Movement alone is not activity
        assert_eq!(m.last_activity_ms, 0);
    }

    #[test]
    fn test_flees_from_nearest_player() {
        let mut m = active_match();
        let near = add_player(&mut m, 530.0, 500.0);
        add_player(&mut m, 500.0, 545.0);
        let id = m.spawn_entity(AiKind::Spark, Vec2::new(500.0, 500.0));
        let mut rng = StdRng::seed_from_u64(2);

        update(&mut m, 100, &mut rng).unwrap();

        let spark = m.entity(id).unwrap();
        assert_eq!(spark_state(&m, id), SparkState::Flee);
        assert_eq!(spark.target_id, Some(near));
        assert!(spark.position.approx_eq(Vec2::new(495.0, 500.0), 1e-3));
        assert_eq!(m.last_activity_ms, 100);
    }

    #[test]
    fn test_cloaked_player_is_invisible() {
        let mut m = active_match();
        let hidden = add_player(&mut m, 545.0, 500.0);
        m.player_mut(hidden).unwrap().set_effects(PlayerEffects {
            cloaked: true,
            ..Default::default()
        });
        let id = m.spawn_entity(AiKind::Spark, Vec2::new(500.0, 500.0));
        let mut rng = StdRng::seed_from_u64(3);

        for tick in 0..5 {
            update(&mut m, tick, &mut rng).unwrap();
            assert_eq!(spark_state(&m, id), SparkState::Wander);
            assert!(m.entity(id).unwrap().target_id.is_none());
        }
    }

    #[test]
    fn test_consumed_by_nearby_player() {
        let mut m = active_match();
        let player = add_player(&mut m, 505.0, 500.0);
        m.spawn_entity(AiKind::Spark, Vec2::new(500.0, 500.0));
        let mut rng = StdRng::seed_from_u64(4);

        let report = update(&mut m, 10, &mut rng).unwrap();
        assert_eq!(report.consumed, 1);
        assert!(m.entities.is_empty());
        assert_eq!(m.player(player).unwrap().size, 25.0);
        assert!(report.power_ups.len() <= 1);
    }

    #[test]
    fn test_cloaked_player_still_consumes() {
        let mut m = active_match();
        let player = add_player(&mut m, 505.0, 500.0);
        m.player_mut(player).unwrap().effects.cloaked = true;
        m.spawn_entity(AiKind::Spark, Vec2::new(500.0, 500.0));
        let mut rng = StdRng::seed_from_u64(5);

        let report = update(&mut m, 10, &mut rng).unwrap();
        assert_eq!(report.consumed, 1);
        assert_eq!(m.player(player).unwrap().size, 25.0);
    }

    #[test]
    fn test_growth_capped() {
        let mut m = active_match();
        let player = add_player(&mut m, 500.0, 500.0);
        m.player_mut(player).unwrap().size = 98.0;
        m.spawn_entity(AiKind::Spark, Vec2::new(500.0, 505.0));
        let mut rng = StdRng::seed_from_u64(6);

        update(&mut m, 10, &mut rng).unwrap();
        assert_eq!(m.player(player).unwrap().size, 100.0);
    }

    #[test]
    fn test_power_up_requests_follow_chance() {
        let mut m = active_match();
        add_player(&mut m, 1000.0, 1000.0);
        for i in 0..100 {
            let angle = i as f32 * 0.0628;
            m.spawn_entity(AiKind::Spark, Vec2::new(1000.0, 1000.0) + Vec2::from_angle(angle) * 5.0);
        }
        let mut rng = StdRng::seed_from_u64(7);

        let report = update(&mut m, 10, &mut rng).unwrap();
        assert_eq!(report.consumed, 100);
        assert!(!report.power_ups.is_empty());
        assert!(report.power_ups.len() < 100);
        assert!(report.power_ups.iter().all(|p| p.source == PowerUpSource::Spark && p.match_id == m.id));
    }

    #[test]
    fn test_movement_clamped_to_margin() {
        let mut m = active_match();
        add_player(&mut m, 40.0, 10.0);
        let id = m.spawn_entity(AiKind::Spark, Vec2::new(10.0, 10.0));
        let mut rng = StdRng::seed_from_u64(8);

        update(&mut m, 10, &mut rng).unwrap();
        assert_eq!(m.entity(id).unwrap().position, Vec2::new(10.0, 10.0));
    }

    #[test]
    fn test_creepers_untouched() {
        let mut m = active_match();
        let creeper = m.spawn_entity(AiKind::Creeper, Vec2::new(300.0, 300.0));
        let mut rng = StdRng::seed_from_u64(9);

        let report = update(&mut m, 10, &mut rng).unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(m.entity(creeper).unwrap().position, Vec2::new(300.0, 300.0));
    }
}
