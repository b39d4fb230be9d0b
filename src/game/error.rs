//! Errors surfaced by simulation operations

use crate::game::state::{MatchId, PlayerId};

/// Caller-facing validation failures plus the internal invariant failure kind.
///
/// Validation errors are raised before any record is written, so a failed
/// operation never leaves a partial mutation behind.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("Match not found: {0}")]
    MatchNotFound(MatchId),
    #[error("Match {0} is not active")]
    MatchNotActive(MatchId),
    #[error("Player {player_id} is not in match {match_id}")]
    PlayerNotInMatch { match_id: MatchId, player_id: PlayerId },
    #[error("Player {0} is not alive")]
    PlayerNotAlive(PlayerId),
    #[error("Position ({x}, {y}) is outside the map")]
    PositionOutOfBounds { x: f32, y: f32 },
    #[error("Grid cell ({grid_x}, {grid_y}) is outside the territory grid")]
    GridOutOfBounds { grid_x: i64, grid_y: i64 },
    #[error("Insufficient resource: need {required}, have {available}")]
    InsufficientResource { required: f32, available: f32 },
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl CoreError {
    /// Whether this error signals a broken internal invariant rather than bad input
    pub fn is_internal(&self) -> bool {
        matches!(self, CoreError::InvariantViolation(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
