//! Victory evaluation and match finalization
//!
//! Conditions are checked in fixed priority order (territory, elimination,
//! time limit); the first satisfied one decides the winner. Finalization is
//! idempotent: evaluating a finished match returns its recorded outcome.

use serde::Serialize;
use tracing::info;

use crate::game::constants::victory::*;
use crate::game::state::{Match, MatchStatus, PlayerId, PlayerState};

/// Why a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WinCondition {
    /// A player reached the territory share threshold
    Territory,
    /// Last player standing, or last to be eliminated
    Elimination,
    /// Time limit reached; largest territory wins
    TimeLimit,
}

/// Final standing of one participant
#[derive(Debug, Clone, Serialize)]
pub struct PlayerRanking {
    pub player_id: PlayerId,
    pub name: String,
    pub placement: u32,
    pub final_score: u64,
    pub territory_cells: u32,
    pub eliminations: u32,
    pub survival_seconds: u64,
    pub winner: bool,
}

/// Recorded result of a finished match
#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    pub winner_id: PlayerId,
    pub win_condition: WinCondition,
    pub finished_at_ms: u64,
    pub duration_ms: u64,
    /// Ordered by placement
    pub rankings: Vec<PlayerRanking>,
}

/// Result of one victory check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VictoryCheck {
    pub has_winner: bool,
    pub winner_id: Option<PlayerId>,
    pub win_condition: Option<WinCondition>,
}

impl VictoryCheck {
    pub fn none() -> Self {
        Self::default()
    }

    fn from_outcome(outcome: &MatchOutcome) -> Self {
        Self {
            has_winner: true,
            winner_id: Some(outcome.winner_id),
            win_condition: Some(outcome.win_condition),
        }
    }
}

/// Territory share needed to win, given the number of human players
pub fn territory_threshold(human_players: usize) -> f64 {
    if human_players == 1 {
        TERRITORY_SHARE_SOLO
    } else {
        TERRITORY_SHARE_MULTIPLAYER
    }
}

/// Decide whether `m` has a winner right now, without mutating it
pub fn evaluate(m: &Match, now: u64) -> Option<(PlayerId, WinCondition)> {
    if m.status != MatchStatus::Active || m.players.is_empty() {
        return None;
    }

    let humans = m.human_count();

    // 1. Territory
    let threshold = territory_threshold(humans);
    if let Some(p) = m.players.iter().find(|p| m.territory.share(p.id) >= threshold) {
        return Some((p.id, WinCondition::Territory));
    }

    // 2. Elimination, multiplayer only
    if humans > 1 {
        let mut alive = m.alive_players();
        match (alive.next(), alive.next()) {
            (Some(survivor), None) => return Some((survivor.id, WinCondition::Elimination)),
            (None, _) => {
                // Simultaneous wipe: last to die wins, later insertion on equal timestamps
                let mut last: Option<&PlayerState> = None;
                for p in &m.players {
                    if last.map_or(true, |l| p.eliminated_at >= l.eliminated_at) {
                        last = Some(p);
                    }
                }
                if let Some(p) = last {
                    return Some((p.id, WinCondition::Elimination));
                }
            }
            _ => {}
        }
    }

    // 3. Time limit: most territory, earliest insertion on ties
    if m.elapsed_ms(now) >= m.config.time_limit_ms {
        let mut leader: Option<(&PlayerState, u32)> = None;
        for p in &m.players {
            let cells = m.territory.cell_count(p.id);
            if leader.map_or(true, |(_, best)| cells > best) {
                leader = Some((p, cells));
            }
        }
        if let Some((p, _)) = leader {
            return Some((p.id, WinCondition::TimeLimit));
        }
    }

    None
}

/// Evaluate and, if a winner exists, finalize the match.
///
/// A finished match is returned as-is; nothing is recomputed.
pub fn check_and_finalize(m: &mut Match, now: u64) -> VictoryCheck {
    if let Some(outcome) = &m.outcome {
        return VictoryCheck::from_outcome(outcome);
    }

    match evaluate(m, now) {
        Some((winner_id, condition)) => VictoryCheck::from_outcome(finalize(m, winner_id, condition, now)),
        None => VictoryCheck::none(),
    }
}

/// Final score: territory, eliminations, survival time and the winner bonus
pub fn final_score(territory_cells: u32, eliminations: u32, survival_seconds: u64, winner: bool) -> u64 {
    territory_cells as u64 * POINTS_PER_CELL
        + eliminations as u64 * POINTS_PER_ELIMINATION
        + survival_seconds * POINTS_PER_SURVIVAL_SECOND
        + if winner { WINNER_BONUS } else { 0 }
}

/// Mark `m` finished, score every participant and assign placements
fn finalize(m: &mut Match, winner_id: PlayerId, condition: WinCondition, now: u64) -> &MatchOutcome {
    let started_at = m.started_at_ms.unwrap_or(m.created_at_ms);

    let mut rankings: Vec<PlayerRanking> = m
        .players
        .iter()
        .map(|p| {
            let from = started_at.max(p.joined_at_ms);
            let until = p.eliminated_at.unwrap_or(now);
            let survival_seconds = until.saturating_sub(from) / 1000;
            let territory_cells = m.territory.cell_count(p.id);
            let winner = p.id == winner_id;
            PlayerRanking {
                player_id: p.id,
                name: p.name.clone(),
                placement: 0,
                final_score: final_score(territory_cells, p.eliminations, survival_seconds, winner),
                territory_cells,
                eliminations: p.eliminations,
                survival_seconds,
                winner,
            }
        })
        .collect();

    // Stable: equal scores keep insertion order
    rankings.sort_by(|a, b| b.final_score.cmp(&a.final_score));
    for (i, ranking) in rankings.iter_mut().enumerate() {
        ranking.placement = (i + 1) as u32;
    }

    for ranking in &rankings {
        if let Some(p) = m.player_mut(ranking.player_id) {
            p.final_score = Some(ranking.final_score);
            p.placement = Some(ranking.placement);
        }
    }

    info!(
        "Match {} finished: winner={} condition={:?} players={}",
        m.id,
        winner_id,
        condition,
        rankings.len()
    );

    m.status = MatchStatus::Finished;
    m.outcome.insert(MatchOutcome {
        winner_id,
        win_condition: condition,
        finished_at_ms: now,
        duration_ms: now.saturating_sub(started_at),
        rankings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::MatchConfig;
    use crate::util::vec2::Vec2;
    use uuid::Uuid;

    /// Active 10x10-cell match (map edge 100) with `players` players
    fn create_match(players: usize) -> (Match, Vec<PlayerId>) {
        let mut m = Match::new(
            MatchConfig {
                map_size: 100.0,
                time_limit_ms: 60_000,
            },
            0,
        );
        let ids: Vec<PlayerId> = (0..players).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            m.add_player(*id, format!("P{}", i), Vec2::new(50.0, 50.0), 0).unwrap();
        }
        m.start(0).unwrap();
        (m, ids)
    }

    fn claim_cells(m: &mut Match, owner: PlayerId, count: usize) {
        let width = m.territory.width();
        for i in 0..count {
            m.territory.claim((i % width) as i64, (i / width) as i64, owner, 0);
        }
    }

    #[test]
    fn test_solo_territory_threshold() {
        let (mut m, ids) = create_match(1);
        claim_cells(&mut m, ids[0], 39);
        assert_eq!(evaluate(&m, 1_000), None);

        claim_cells(&mut m, ids[0], 40);
        assert_eq!(evaluate(&m, 1_000), Some((ids[0], WinCondition::Territory)));
    }

    #[test]
    fn test_multiplayer_territory_threshold() {
        let (mut m, ids) = create_match(2);
        claim_cells(&mut m, ids[1], 59);
        assert_eq!(evaluate(&m, 1_000), None);

        claim_cells(&mut m, ids[1], 60);
        assert_eq!(evaluate(&m, 1_000), Some((ids[1], WinCondition::Territory)));
    }

    #[test]
    fn test_solo_match_skips_elimination() {
        let (mut m, _) = create_match(1);
        m.players[0].eliminate(500);
        assert_eq!(evaluate(&m, 1_000), None);
    }

    #[test]
    fn test_last_player_standing() {
        let (mut m, ids) = create_match(4);
        m.players[0].eliminate(100);
        m.players[1].eliminate(200);
        assert_eq!(evaluate(&m, 1_000), None);

        m.players[3].eliminate(300);
        assert_eq!(evaluate(&m, 1_000), Some((ids[2], WinCondition::Elimination)));
    }

    #[test]
    fn test_simultaneous_wipe_last_eliminated_wins() {
        let (mut m, ids) = create_match(3);
        m.players[0].eliminate(900);
        m.players[1].eliminate(400);
        m.players[2].eliminate(700);
        assert_eq!(evaluate(&m, 1_000), Some((ids[0], WinCondition::Elimination)));
    }

    #[test]
    fn test_simultaneous_wipe_tie_prefers_later_insertion() {
        let (mut m, ids) = create_match(2);
        m.players[0].eliminate(500);
        m.players[1].eliminate(500);
        assert_eq!(evaluate(&m, 1_000), Some((ids[1], WinCondition::Elimination)));
    }

    #[test]
    fn test_territory_beats_elimination() {
        let (mut m, ids) = create_match(2);
        m.players[0].eliminate(100);
        claim_cells(&mut m, ids[0], 60);
        assert_eq!(evaluate(&m, 1_000), Some((ids[0], WinCondition::Territory)));
    }

    #[test]
    fn test_time_limit_most_territory() {
        let (mut m, ids) = create_match(3);
        m.territory.claim(0, 0, ids[1], 0);
        m.territory.claim(1, 0, ids[1], 0);
        m.territory.claim(2, 0, ids[2], 0);

        assert_eq!(evaluate(&m, 59_999), None);
        assert_eq!(evaluate(&m, 60_000), Some((ids[1], WinCondition::TimeLimit)));
    }

    #[test]
    fn test_time_limit_tie_prefers_earliest_insertion() {
        let (mut m, ids) = create_match(2);
        m.territory.claim(0, 0, ids[1], 0);
        m.territory.claim(1, 0, ids[0], 0);
        assert_eq!(evaluate(&m, 60_000), Some((ids[0], WinCondition::TimeLimit)));
    }

    #[test]
    fn test_waiting_match_has_no_winner() {
        let mut m = Match::new(MatchConfig::default(), 0);
        m.add_player(Uuid::new_v4(), "P".into(), Vec2::new(5.0, 5.0), 0).unwrap();
        assert_eq!(evaluate(&m, 10_000_000), None);
    }

    #[test]
    fn test_final_score_formula() {
        assert_eq!(final_score(13, 2, 45, false), 130 + 200 + 45);
        assert_eq!(final_score(0, 0, 0, true), 500);
    }

    #[test]
    fn test_finalize_scores_and_placements() {
        let (mut m, ids) = create_match(3);
        claim_cells(&mut m, ids[2], 5);
        m.players[0].eliminations = 1;
        m.players[1].eliminate(10_000);

        m.players[0].eliminate(30_000);
        m.players[2].eliminations = 2;
        let check = check_and_finalize(&mut m, 30_000);
        assert_eq!(check.winner_id, Some(ids[2]));
        assert_eq!(check.win_condition, Some(WinCondition::Elimination));
        assert_eq!(m.status, MatchStatus::Finished);

        let outcome = m.outcome.as_ref().unwrap();
        assert_eq!(outcome.finished_at_ms, 30_000);
        // Winner: 5 cells, 2 eliminations, 30 s, bonus
        assert_eq!(outcome.rankings[0].player_id, ids[2]);
        assert_eq!(outcome.rankings[0].final_score, 50 + 200 + 30 + 500);
        // P0: 1 elimination, 30 s
        assert_eq!(outcome.rankings[1].player_id, ids[0]);
        assert_eq!(outcome.rankings[1].final_score, 130);
        // P1: 10 s
        assert_eq!(outcome.rankings[2].final_score, 10);

        assert_eq!(m.player(ids[2]).unwrap().placement, Some(1));
        assert_eq!(m.player(ids[1]).unwrap().placement, Some(3));
    }

    #[test]
    fn test_equal_scores_keep_insertion_order() {
        let (mut m, ids) = create_match(3);
        m.players[2].eliminate(0);
        m.players[1].eliminate(0);
        m.players[0].eliminate(0);
        check_and_finalize(&mut m, 0);

        let outcome = m.outcome.as_ref().unwrap();
        // Later insertion wins the wipe tie; the rest keep insertion order
        assert_eq!(outcome.winner_id, ids[2]);
        assert_eq!(outcome.rankings[1].player_id, ids[0]);
        assert_eq!(outcome.rankings[2].player_id, ids[1]);
    }

    #[test]
    fn test_finalization_is_idempotent() {
        let (mut m, ids) = create_match(2);
        m.players[1].eliminate(5_000);
        let first = check_and_finalize(&mut m, 5_000);
        assert!(first.has_winner);

        // Later changes must not re-score a finished match
        m.territory.claim(0, 0, ids[1], 6_000);
        let second = check_and_finalize(&mut m, 90_000);
        assert_eq!(first, second);
        assert_eq!(m.outcome.as_ref().unwrap().finished_at_ms, 5_000);
    }
}
