//! Glow decay
//!
//! Players slowly dim unless they stand on territory they own. Idle matches
//! dim at half rate.

use serde::Serialize;

use crate::game::constants::glow::*;
use crate::game::error::CoreResult;
use crate::game::state::Match;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecayReport {
    pub replenished: u32,
    pub decayed: u32,
}

/// Size lost this pass by a player off their own territory
pub fn decay_amount(m: &Match, now: u64) -> f32 {
    let idle_ms = now.saturating_sub(m.last_activity_ms);
    if idle_ms > IDLE_DECAY_THRESHOLD_MS {
        (DECAY / 2.0).floor().max(1.0)
    } else {
        DECAY
    }
}

/// Apply one decay pass to every alive player
pub fn apply(m: &mut Match, now: u64) -> CoreResult<DecayReport> {
    m.ensure_active()?;

    let amount = decay_amount(m, now);
    let mut report = DecayReport::default();

    for player in m.players.iter_mut().filter(|p| p.alive) {
        if m.territory.owner_at(player.position) == Some(player.id) {
            player.grow(REPLENISH);
            report.replenished += 1;
        } else {
            player.shrink(amount);
            report.decayed += 1;
        }
    }

    tracing::trace!(
        "Match {} decay: {} replenished, {} decayed by {}",
        m.id,
        report.replenished,
        report.decayed,
        amount
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{MatchConfig, PlayerId};
    use crate::util::vec2::Vec2;
    use uuid::Uuid;

    fn setup() -> (Match, PlayerId, PlayerId) {
        let mut m = Match::new(MatchConfig::default(), 0);
        m.start(0).unwrap();
        let home = Uuid::new_v4();
        let away = Uuid::new_v4();
        m.add_player(home, "Home".into(), Vec2::new(100.0, 100.0), 0).unwrap();
        m.add_player(away, "Away".into(), Vec2::new(900.0, 900.0), 0).unwrap();
        m.territory.paint(home, 20.0, Vec2::new(100.0, 100.0), 0).unwrap();
        (m, home, away)
    }

    #[test]
    fn test_replenish_on_own_territory() {
        let (mut m, home, away) = setup();
        let report = apply(&mut m, 1_000).unwrap();

        assert_eq!(report, DecayReport { replenished: 1, decayed: 1 });
        assert_eq!(m.player(home).unwrap().size, 22.0);
        assert_eq!(m.player(away).unwrap().size, 18.0);
    }

    #[test]
    fn test_foreign_territory_decays() {
        let (mut m, home, away) = setup();
        m.player_mut(away).unwrap().position = Vec2::new(100.0, 100.0);
        apply(&mut m, 1_000).unwrap();

        assert_eq!(m.player(home).unwrap().size, 22.0);
        assert_eq!(m.player(away).unwrap().size, 18.0);
    }

    #[test]
    fn test_decay_floors_at_min_size() {
        let (mut m, _, away) = setup();
        m.player_mut(away).unwrap().size = 11.0;
        apply(&mut m, 1_000).unwrap();
        assert_eq!(m.player(away).unwrap().size, MIN_SIZE);
    }

    #[test]
    fn test_idle_match_decays_slower() {
        let (mut m, _, away) = setup();
        assert_eq!(decay_amount(&m, 30_000), DECAY);
        assert_eq!(decay_amount(&m, 30_001), 1.0);

        apply(&mut m, 60_000).unwrap();
        assert_eq!(m.player(away).unwrap().size, 19.0);
    }

    #[test]
    fn test_dead_players_skipped() {
        let (mut m, _, away) = setup();
        m.player_mut(away).unwrap().eliminate(0);
        let report = apply(&mut m, 1_000).unwrap();
        assert_eq!(report.decayed, 0);
        assert_eq!(m.player(away).unwrap().size, 20.0);
    }

    #[test]
    fn test_requires_active_match() {
        let mut m = Match::new(MatchConfig::default(), 0);
        assert!(apply(&mut m, 0).is_err());
    }
}
