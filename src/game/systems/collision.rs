//! Player-vs-player collision and elimination
//!
//! Colliding pairs come from a spatial index built over the alive players.
//! A pair whose size difference exceeds the threshold ends in elimination of
//! the smaller player unless it is shielded; every other pair bounces apart.

use hashbrown::HashMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::game::constants::collision::*;
use crate::game::error::{CoreError, CoreResult};
use crate::game::spatial::{SpatialEntity, SpatialEntityId, SpatialIndex};
use crate::game::state::{Match, PlayerId, PlayerState};
use crate::util::vec2::Vec2;

/// Counts from one collision pass over a match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollisionReport {
    pub collisions: u32,
    pub eliminations: u32,
    pub bounces: u32,
}

/// What happens to a colliding pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    /// `winner` and `loser` are indices into the pair as given (0 or 1)
    Eliminate { winner: usize, loser: usize },
    Bounce,
}

/// Decide the outcome for two colliding players
pub fn decide(a: &PlayerState, b: &PlayerState) -> PairOutcome {
    if (a.size - b.size).abs() <= SIZE_THRESHOLD {
        return PairOutcome::Bounce;
    }

    let (winner, loser) = if a.size > b.size { (0, 1) } else { (1, 0) };
    let loser_shielded = if loser == 0 {
        a.effects.shielded
    } else {
        b.effects.shielded
    };

    if loser_shielded {
        PairOutcome::Bounce
    } else {
        PairOutcome::Eliminate { winner, loser }
    }
}

/// Mutable references to two distinct players
fn pair_mut(players: &mut [PlayerState], i: usize, j: usize) -> (&mut PlayerState, &mut PlayerState) {
    debug_assert_ne!(i, j);
    if i < j {
        let (left, right) = players.split_at_mut(j);
        (&mut left[i], &mut right[0])
    } else {
        let (left, right) = players.split_at_mut(i);
        (&mut right[0], &mut left[j])
    }
}

/// Push both players `BOUNCE_DISTANCE` apart along their centre normal
pub fn bounce(a: &mut PlayerState, b: &mut PlayerState, map_size: f32) {
    let normal = (b.position - a.position).normalize();
    // Coincident centres: separate along the x axis
    let normal = if normal == Vec2::ZERO { Vec2::RIGHT } else { normal };

    a.position = (a.position + -normal * BOUNCE_DISTANCE).clamp_to(0.0, map_size);
    b.position = (b.position + normal * BOUNCE_DISTANCE).clamp_to(0.0, map_size);
}

/// Winner absorbs a share of the loser and scores; loser is eliminated
fn eliminate(winner: &mut PlayerState, loser: &mut PlayerState, now: u64) {
    let absorbed = (loser.size * ABSORPTION_RATE).floor();
    winner.absorb(absorbed);
    winner.score += 1;
    winner.eliminations += 1;
    loser.eliminate(now);
}

/// Resolve every colliding pair of alive players in `m`
pub fn resolve(m: &mut Match, now: u64) -> CoreResult<CollisionReport> {
    let snapshot: Vec<SpatialEntity> = m
        .alive_players()
        .map(|p| SpatialEntity::player(p.id, p.position, 0.0))
        .collect();
    let index = SpatialIndex::build(snapshot, m.config.map_size);

    // Resolve every pair to player indices before writing anything
    let slots: HashMap<PlayerId, usize> = m.players.iter().enumerate().map(|(i, p)| (p.id, i)).collect();
    let lookup = |id: SpatialEntityId| -> CoreResult<usize> {
        match id {
            SpatialEntityId::Player(player_id) => slots.get(&player_id).copied().ok_or_else(|| {
                CoreError::InvariantViolation(format!("collision pair references missing player {}", player_id))
            }),
            SpatialEntityId::Ai(entity_id) => Err(CoreError::InvariantViolation(format!(
                "AI entity {} in player collision snapshot",
                entity_id
            ))),
        }
    };
    let pairs = index
        .colliding_pairs(DISTANCE)
        .into_iter()
        .map(|(a, b)| Ok((lookup(a.id)?, lookup(b.id)?)))
        .collect::<CoreResult<Vec<(usize, usize)>>>()?;

    let mut report = CollisionReport::default();
    let map_size = m.config.map_size;

    for (i, j) in pairs {
        let (a, b) = pair_mut(&mut m.players, i, j);
        // Eliminated earlier in this pass
        if !a.alive || !b.alive {
            continue;
        }
        report.collisions += 1;

        match decide(a, b) {
            PairOutcome::Eliminate { winner, loser } => {
                let (w, l) = if winner == 0 { (a, b) } else { (b, a) };
                debug_assert_ne!(winner, loser);
                eliminate(w, l, now);
                report.eliminations += 1;
                info!("Match {}: {} eliminated {} (size {:.0})", m.id, w.name, l.name, w.size);
            }
            PairOutcome::Bounce => {
                bounce(a, b, map_size);
                report.bounces += 1;
            }
        }
    }

    if report.collisions > 0 {
        debug!(
            "Match {} collisions={} eliminations={} bounces={}",
            m.id, report.collisions, report.eliminations, report.bounces
        );
    }

    Ok(report)
}
