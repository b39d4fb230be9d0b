//! Creeper (hunter) behaviour
//!
//! Light always wins: a creeper standing on a painted cell returns toward the
//! nearest sampled dark point and burns. Otherwise it hunts the nearest
//! visible player if that player is in the dark, or patrols at random.
//! Contact damage applies in every state.

use rand::Rng;
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, trace};

use super::{clamp_to_arena, random_direction, Detection, PlayerSnapshot, PowerUpRequest, PowerUpSource};
use crate::game::constants::creeper::*;
use crate::game::error::{CoreError, CoreResult};
use crate::game::state::{AiBehavior, AiKind, CreeperState, EntityId, Match, PlayerId};
use crate::game::territory::TerritoryGrid;
use crate::util::vec2::Vec2;

/// Result of one creeper tick over a match
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreeperUpdate {
    pub updated: u32,
    pub players_hit: u32,
    /// Creepers burned away by light this tick
    pub destroyed: u32,
    pub power_ups: Vec<PowerUpRequest>,
}

struct CreeperStep {
    slot: usize,
    state: CreeperState,
    target_id: Option<PlayerId>,
    position: Vec2,
    burn: bool,
    /// Player index taking contact damage
    victim: Option<usize>,
}

/// Next state, target and unclamped position for a creeper at `position`
pub fn decide(
    position: Vec2,
    nearest: Option<Detection>,
    territory: &TerritoryGrid,
    rng: &mut impl Rng,
) -> (CreeperState, Option<PlayerId>, Vec2) {
    if territory.is_lit(position) {
        let next = match territory.nearest_dark_sample(position) {
            Some(dark) => position.step_toward(dark, SPEED),
            None => position,
        };
        return (CreeperState::Return, None, next);
    }

    match nearest {
        Some(prey) if !territory.is_lit(prey.position) => (
            CreeperState::Hunt,
            Some(prey.player_id),
            position.step_toward(prey.position, SPEED),
        ),
        _ => (CreeperState::Patrol, None, position + random_direction(rng) * SPEED),
    }
}

/// Run one creeper tick over every creeper in `m`
pub fn update(m: &mut Match, now: u64, rng: &mut impl Rng) -> CoreResult<CreeperUpdate> {
    m.ensure_active()?;

    let snapshot = PlayerSnapshot::capture(m);
    let map_size = m.config.map_size;

    let mut steps = Vec::new();
    for (slot, entity) in m.entities.iter().enumerate() {
        if entity.kind() != AiKind::Creeper {
            continue;
        }
        let nearest = snapshot.nearest_visible(entity.position, DETECTION_RADIUS);
        let (state, target_id, next) = decide(entity.position, nearest, &m.territory, rng);

        let victim = match nearest {
            Some(prey) if prey.distance <= CONTACT_DISTANCE => Some(m.player_index(prey.player_id).ok_or_else(|| {
                CoreError::InvariantViolation(format!("creeper #{} hit missing player {}", entity.id, prey.player_id))
            })?),
            _ => None,
        };

        steps.push(CreeperStep {
            slot,
            state,
            target_id,
            position: clamp_to_arena(next, map_size),
            burn: state == CreeperState::Return,
            victim,
        });
    }

    let mut report = CreeperUpdate::default();
    let mut transitions = 0u32;
    let mut burned: FxHashSet<EntityId> = FxHashSet::default();

    for step in steps {
        let entity = &mut m.entities[step.slot];
        let behavior = AiBehavior::Creeper(step.state);
        if entity.behavior != behavior {
            transitions += 1;
            trace!("Creeper #{} -> {:?}", entity.id, step.state);
        }
        entity.behavior = behavior;
        entity.target_id = step.target_id;
        entity.position = step.position;
        report.updated += 1;

        if step.burn {
            entity.health -= LIGHT_BURN;
            if entity.health <= 0.0 {
                burned.insert(entity.id);
            }
        }
        let creeper_position = entity.position;

        if let Some(player_slot) = step.victim {
            let player = &mut m.players[player_slot];
            player.shrink(DAMAGE);
            report.players_hit += 1;
            debug!("Match {}: creeper hit {} (size {:.0})", m.id, player.name, player.size);

            if rng.gen_bool(POWER_UP_CHANCE) {
                report.power_ups.push(PowerUpRequest {
                    match_id: m.id,
                    position: creeper_position,
                    source: PowerUpSource::Creeper,
                });
            }
        }
    }

    if !burned.is_empty() {
        m.entities.retain(|e| !burned.contains(&e.id));
        report.destroyed = burned.len() as u32;
        debug!("Match {}: {} creepers burned away", m.id, report.destroyed);
    }

    if transitions > 0 || report.players_hit > 0 || report.destroyed > 0 {
        m.touch(now);
    }

    Ok(report)
}
