//! Match records: players, AI entities and the match envelope that owns them.
//!
//! Every record is scoped to one [`Match`]. Once a match is `Finished` no
//! further mutation is accepted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::constants::{self, glow, victory};
use crate::game::error::{CoreError, CoreResult};
use crate::game::territory::TerritoryGrid;
use crate::game::victory::MatchOutcome;
use crate::util::vec2::Vec2;

/// Unique match identifier
pub type MatchId = Uuid;

/// Unique player identifier
pub type PlayerId = Uuid;

/// Identifier for AI entities, unique within a match
pub type EntityId = u64;

/// Match lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Waiting,
    Active,
    Finished,
}

/// Effect facts supplied by the effects collaborator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEffects {
    /// Blocks being eliminated in a collision (the pair bounces instead)
    pub shielded: bool,
    /// Hides the player from AI detection
    pub cloaked: bool,
    /// Raises the size cap to the boosted maximum
    pub size_boost: bool,
}

/// Per-match player state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    pub position: Vec2,
    /// Glow radius; always within `[MIN_SIZE, size_cap()]`
    pub size: f32,
    pub alive: bool,
    pub effects: PlayerEffects,
    /// Live score, one point per elimination
    pub score: u32,
    pub eliminations: u32,
    pub eliminated_at: Option<u64>,
    pub joined_at_ms: u64,
    /// Set when the match is finalized
    pub final_score: Option<u64>,
    /// 1-based placement, set when the match is finalized
    pub placement: Option<u32>,
    pub id: PlayerId,
    pub name: String,
}

impl PlayerState {
    pub fn new(id: PlayerId, name: String, position: Vec2, joined_at_ms: u64) -> Self {
        Self {
            position,
            size: glow::STARTING_SIZE,
            alive: true,
            effects: PlayerEffects::default(),
            score: 0,
            eliminations: 0,
            eliminated_at: None,
            joined_at_ms,
            final_score: None,
            placement: None,
            id,
            name,
        }
    }

    /// Current size cap
    pub fn size_cap(&self) -> f32 {
        constants::size_cap(self.effects.size_boost)
    }

    /// Grow by `amount`, clamped to the current cap
    pub fn grow(&mut self, amount: f32) {
        self.size = (self.size + amount).min(self.size_cap());
    }

    /// Grow by an absorbed `amount`, capped at the base maximum.
    ///
    /// A size-boosted player already above that maximum keeps their size.
    pub fn absorb(&mut self, amount: f32) {
        if self.size < glow::MAX_SIZE {
            self.size = (self.size + amount).min(glow::MAX_SIZE);
        }
    }

    /// Shrink by `amount`, never below the minimum size
    pub fn shrink(&mut self, amount: f32) {
        self.size = (self.size - amount).max(glow::MIN_SIZE);
    }

    /// Replace effect facts, re-clamping size if the cap dropped
    pub fn set_effects(&mut self, effects: PlayerEffects) {
        self.effects = effects;
        self.size = self.size.clamp(glow::MIN_SIZE, self.size_cap());
    }

    pub fn eliminate(&mut self, now: u64) {
        self.alive = false;
        self.eliminated_at = Some(now);
    }
}

/// Spark states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SparkState {
    Wander,
    Flee,
}

/// Creeper states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreeperState {
    Patrol,
    Hunt,
    Return,
}

/// AI entity family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiKind {
    Spark,
    Creeper,
}

/// Kind-tagged behaviour state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiBehavior {
    Spark(SparkState),
    Creeper(CreeperState),
}

impl AiBehavior {
    pub fn initial(kind: AiKind) -> Self {
        match kind {
            AiKind::Spark => AiBehavior::Spark(SparkState::Wander),
            AiKind::Creeper => AiBehavior::Creeper(CreeperState::Patrol),
        }
    }

    pub fn kind(&self) -> AiKind {
        match self {
            AiBehavior::Spark(_) => AiKind::Spark,
            AiBehavior::Creeper(_) => AiKind::Creeper,
        }
    }
}

/// Autonomous non-player entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiEntity {
    pub id: EntityId,
    pub position: Vec2,
    pub behavior: AiBehavior,
    /// Weak reference: resolved on every use, a missing player means no target
    pub target_id: Option<PlayerId>,
    pub health: f32,
}

impl AiEntity {
    pub fn new(id: EntityId, kind: AiKind, position: Vec2) -> Self {
        let health = match kind {
            AiKind::Spark => constants::spark::HEALTH,
            AiKind::Creeper => constants::creeper::HEALTH,
        };
        Self {
            id,
            position,
            behavior: AiBehavior::initial(kind),
            target_id: None,
            health,
        }
    }

    pub fn kind(&self) -> AiKind {
        self.behavior.kind()
    }
}

/// Per-match tunables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchConfig {
    /// Edge length of the square map in world units
    pub map_size: f32,
    pub time_limit_ms: u64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            map_size: constants::DEFAULT_MAP_SIZE,
            time_limit_ms: victory::DEFAULT_TIME_LIMIT_MS,
        }
    }
}

/// Lightweight view of a match used by the scheduler's indexed scan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchSummary {
    pub match_id: MatchId,
    pub status: MatchStatus,
    pub alive_players: usize,
    pub ai_entities: usize,
    pub last_activity_ms: u64,
    pub finished_at_ms: Option<u64>,
}

/// One independent run of the game
#[derive(Debug, Clone)]
pub struct Match {
    pub id: MatchId,
    pub status: MatchStatus,
    pub config: MatchConfig,
    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
    /// Last time a collision, paint or AI state change happened
    pub last_activity_ms: u64,
    /// Insertion order is significant for tie-breaks
    pub players: Vec<PlayerState>,
    pub entities: Vec<AiEntity>,
    pub territory: TerritoryGrid,
    pub outcome: Option<MatchOutcome>,
    next_entity_id: EntityId,
}

impl Match {
    pub fn new(config: MatchConfig, now: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: MatchStatus::Waiting,
            territory: TerritoryGrid::for_map(config.map_size),
            config,
            created_at_ms: now,
            started_at_ms: None,
            last_activity_ms: now,
            players: Vec::new(),
            entities: Vec::new(),
            outcome: None,
            next_entity_id: 1,
        }
    }

    /// Add a player at `position`; rejected once the match has finished
    pub fn add_player(&mut self, id: PlayerId, name: String, position: Vec2, now: u64) -> CoreResult<()> {
        if self.status == MatchStatus::Finished {
            return Err(CoreError::MatchNotActive(self.id));
        }
        self.validate_position(position)?;
        if self.player(id).is_none() {
            self.players.push(PlayerState::new(id, name, position, now));
        }
        Ok(())
    }

    /// Move a waiting match into play
    pub fn start(&mut self, now: u64) -> CoreResult<()> {
        if self.status != MatchStatus::Waiting {
            return Err(CoreError::MatchNotActive(self.id));
        }
        self.status = MatchStatus::Active;
        self.started_at_ms = Some(now);
        self.last_activity_ms = now;
        Ok(())
    }

    pub fn ensure_active(&self) -> CoreResult<()> {
        if self.status == MatchStatus::Active {
            Ok(())
        } else {
            Err(CoreError::MatchNotActive(self.id))
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished
    }

    pub fn validate_position(&self, position: Vec2) -> CoreResult<()> {
        if position.within_square(self.config.map_size) {
            Ok(())
        } else {
            Err(CoreError::PositionOutOfBounds {
                x: position.x,
                y: position.y,
            })
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerState> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn player_index(&self, id: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }

    /// Index of a player that must exist and be alive
    pub fn require_alive_player(&self, id: PlayerId) -> CoreResult<usize> {
        let index = self.player_index(id).ok_or(CoreError::PlayerNotInMatch {
            match_id: self.id,
            player_id: id,
        })?;
        if !self.players[index].alive {
            return Err(CoreError::PlayerNotAlive(id));
        }
        Ok(index)
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.iter().filter(|p| p.alive)
    }

    pub fn alive_count(&self) -> usize {
        self.alive_players().count()
    }

    /// Number of human participants; AI entities never count
    pub fn human_count(&self) -> usize {
        self.players.len()
    }

    pub fn entity(&self, id: EntityId) -> Option<&AiEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Add an AI entity and return its id
    pub fn spawn_entity(&mut self, kind: AiKind, position: Vec2) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        self.entities.push(AiEntity::new(id, kind, position));
        id
    }

    /// Record activity; timestamps never move backwards
    pub fn touch(&mut self, now: u64) {
        self.last_activity_ms = self.last_activity_ms.max(now);
    }

    pub fn elapsed_ms(&self, now: u64) -> u64 {
        self.started_at_ms.map_or(0, |start| now.saturating_sub(start))
    }

    pub fn summary(&self) -> MatchSummary {
        MatchSummary {
            match_id: self.id,
            status: self.status,
            alive_players: self.alive_count(),
            ai_entities: self.entities.len(),
            last_activity_ms: self.last_activity_ms,
            finished_at_ms: self.outcome.as_ref().map(|o| o.finished_at_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> MatchConfig {
        MatchConfig {
            map_size: 100.0,
            time_limit_ms: 60_000,
        }
    }

    #[test]
    fn test_player_size_clamping() {
        let mut player = PlayerState::new(Uuid::new_v4(), "P".into(), Vec2::ZERO, 0);
        player.grow(500.0);
        assert_eq!(player.size, 100.0);
        player.shrink(500.0);
        assert_eq!(player.size, 10.0);
    }

    #[test]
    fn test_size_boost_raises_and_reclamps_cap() {
        let mut player = PlayerState::new(Uuid::new_v4(), "P".into(), Vec2::ZERO, 0);
        player.set_effects(PlayerEffects { size_boost: true, ..Default::default() });
        player.grow(500.0);
        assert_eq!(player.size, 200.0);

        player.set_effects(PlayerEffects::default());
        assert_eq!(player.size, 100.0);
    }

    #[test]
    fn test_absorb_ignores_size_boost() {
        let mut player = PlayerState::new(Uuid::new_v4(), "P".into(), Vec2::ZERO, 0);
        player.set_effects(PlayerEffects { size_boost: true, ..Default::default() });
        player.size = 98.0;
        player.absorb(5.0);
        assert_eq!(player.size, 100.0);

        player.size = 150.0;
        player.absorb(5.0);
        assert_eq!(player.size, 150.0);
    }

    #[test]
    fn test_match_lifecycle() {
        let mut m = Match::new(small_config(), 1_000);
        assert_eq!(m.status, MatchStatus::Waiting);
        assert!(m.ensure_active().is_err());

        m.start(2_000).unwrap();
        assert_eq!(m.status, MatchStatus::Active);
        assert_eq!(m.elapsed_ms(5_000), 3_000);
        assert!(matches!(m.start(3_000), Err(CoreError::MatchNotActive(_))));
    }

    #[test]
    fn test_add_player_validates_position() {
        let mut m = Match::new(small_config(), 0);
        let result = m.add_player(Uuid::new_v4(), "P".into(), Vec2::new(150.0, 10.0), 0);
        assert!(matches!(result, Err(CoreError::PositionOutOfBounds { .. })));
        assert!(m.players.is_empty());
    }

    #[test]
    fn test_require_alive_player() {
        let mut m = Match::new(small_config(), 0);
        let id = Uuid::new_v4();
        m.add_player(id, "P".into(), Vec2::new(50.0, 50.0), 0).unwrap();
        assert_eq!(m.require_alive_player(id).unwrap(), 0);

        m.players[0].eliminate(10);
        assert_eq!(m.require_alive_player(id), Err(CoreError::PlayerNotAlive(id)));

        let stranger = Uuid::new_v4();
        assert!(matches!(
            m.require_alive_player(stranger),
            Err(CoreError::PlayerNotInMatch { .. })
        ));
    }

    #[test]
    fn test_spawn_entity_ids_are_unique() {
        let mut m = Match::new(small_config(), 0);
        let a = m.spawn_entity(AiKind::Spark, Vec2::new(10.0, 10.0));
        let b = m.spawn_entity(AiKind::Creeper, Vec2::new(20.0, 20.0));
        assert_ne!(a, b);
        assert_eq!(m.entity(b).unwrap().kind(), AiKind::Creeper);
        assert_eq!(m.entity(b).unwrap().health, 100.0);
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut m = Match::new(small_config(), 5_000);
        m.touch(3_000);
        assert_eq!(m.last_activity_ms, 5_000);
        m.touch(9_000);
        assert_eq!(m.last_activity_ms, 9_000);
    }
}
