//! Tuned gameplay constants, grouped by the system that reads them.
//!
//! The scheduler coefficients and the sector size are tuning values; only their
//! relative weighting (recency vs. player count) matters.

/// Player glow (size) limits
pub mod glow {
    /// Smallest size a player can be reduced to
    pub const MIN_SIZE: f32 = 10.0;
    /// Size cap without a size-boost effect
    pub const MAX_SIZE: f32 = 100.0;
    /// Size cap while a size-boost effect is active
    pub const BOOSTED_MAX_SIZE: f32 = 200.0;
    /// Size a freshly joined player starts with
    pub const STARTING_SIZE: f32 = 20.0;
    /// Size lost per decay pass when not standing on owned territory
    pub const DECAY: f32 = 2.0;
    /// Size regained per decay pass when standing on owned territory
    pub const REPLENISH: f32 = 2.0;
    /// Matches idle longer than this decay at half rate
    pub const IDLE_DECAY_THRESHOLD_MS: u64 = 30_000;
}

/// Boost (dash) costs
pub mod boost {
    /// Distance covered by a single dash
    pub const DISTANCE: f32 = 60.0;
    /// Size spent per dash
    pub const COST: f32 = 10.0;
}

/// Spatial index partitioning
pub mod spatial {
    /// Sector edge length in world units
    pub const SECTOR_SIZE: f32 = 100.0;
}

/// Player-vs-player collision rules
pub mod collision {
    /// Centre distance at or below which two players collide
    pub const DISTANCE: f32 = 15.0;
    /// Size difference above which the larger player eliminates the smaller
    pub const SIZE_THRESHOLD: f32 = 5.0;
    /// Fraction of the loser's size absorbed by the winner (floored)
    pub const ABSORPTION_RATE: f32 = 0.3;
    /// Displacement applied to each player of a bouncing pair
    pub const BOUNCE_DISTANCE: f32 = 20.0;
}

/// Territory grid
pub mod territory {
    /// Cell edge length in world units
    pub const CELL_SIZE: f32 = 10.0;
    /// Painter size at which the paint radius becomes 2 cells
    pub const LARGE_BRUSH_SIZE: f32 = 50.0;
    /// Painter size at which the paint radius becomes 1 cell
    pub const MEDIUM_BRUSH_SIZE: f32 = 30.0;
    /// Stride (in cells) of the darkness sampling lattice
    pub const DARKNESS_SAMPLE_STRIDE: usize = 5;
}

/// Wandering spark entities
pub mod spark {
    pub const DETECTION_RADIUS: f32 = 50.0;
    pub const SPEED: f32 = 5.0;
    pub const CONSUME_DISTANCE: f32 = 10.0;
    /// Size granted to the consuming player
    pub const SIZE_REWARD: f32 = 5.0;
    pub const POWER_UP_CHANCE: f64 = 0.3;
    pub const HEALTH: f32 = 1.0;
}

/// Hunting creeper entities
pub mod creeper {
    pub const DETECTION_RADIUS: f32 = 100.0;
    pub const SPEED: f32 = 3.0;
    pub const CONTACT_DISTANCE: f32 = 10.0;
    pub const DAMAGE: f32 = 10.0;
    pub const POWER_UP_CHANCE: f64 = 0.2;
    pub const HEALTH: f32 = 100.0;
    /// Health lost per tick while standing in painted territory
    pub const LIGHT_BURN: f32 = 5.0;
}

/// Shared AI movement bounds
pub mod ai {
    /// Distance AI entities keep from the map edge
    pub const EDGE_MARGIN: f32 = 10.0;
}

/// Match end conditions and scoring
pub mod victory {
    /// Territory share that wins a multiplayer match
    pub const TERRITORY_SHARE_MULTIPLAYER: f64 = 0.6;
    /// Territory share that wins a single-player match
    pub const TERRITORY_SHARE_SOLO: f64 = 0.4;
    /// Default match time limit
    pub const DEFAULT_TIME_LIMIT_MS: u64 = 600_000;

    pub const POINTS_PER_CELL: u64 = 10;
    pub const POINTS_PER_ELIMINATION: u64 = 100;
    pub const POINTS_PER_SURVIVAL_SECOND: u64 = 1;
    pub const WINNER_BONUS: u64 = 500;
}

/// Adaptive scheduler eligibility and ranking
pub mod scheduler {
    /// Collision passes only consider matches active this recently
    pub const COLLISION_ACTIVITY_WINDOW_MS: u64 = 5_000;
    /// AI passes only consider matches active this recently; also the idle threshold for decay
    pub const AI_ACTIVITY_WINDOW_MS: u64 = 30_000;
    pub const PRIORITY_PER_ALIVE_PLAYER: f64 = 10.0;
    /// Recency bonus starts here and loses one point per idle second
    pub const RECENCY_BONUS: f64 = 100.0;
    /// Bonus for matches with both players and AI entities
    pub const MIXED_BONUS: f64 = 20.0;
    pub const DEFAULT_CAP: usize = 16;
}

/// Default map edge length in world units
pub const DEFAULT_MAP_SIZE: f32 = 2000.0;

/// Paint radius in cells for a painter of the given size
#[inline]
pub fn paint_radius_cells(size: f32) -> i32 {
    if size >= territory::LARGE_BRUSH_SIZE {
        2
    } else if size >= territory::MEDIUM_BRUSH_SIZE {
        1
    } else {
        0
    }
}

/// Size cap for a player depending on whether a size boost is active
#[inline]
pub fn size_cap(size_boost: bool) -> f32 {
    if size_boost {
        glow::BOOSTED_MAX_SIZE
    } else {
        glow::MAX_SIZE
    }
}
