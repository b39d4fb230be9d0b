//! Adaptive scheduling of per-match work
//!
//! Each pass asks for the matches worth processing for one process type,
//! ranked by priority and capped so the worst-case pass cost stays bounded no
//! matter how many matches are live. Idle matches fall out of the ranking on
//! their own because activity is only recorded when something happens.
//!
//! [`PassBudget`] watches pass durations and shrinks or grows the cap.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::game::constants::scheduler::*;
use crate::game::state::{MatchId, MatchStatus, MatchSummary};

/// Kind of periodic work a pass performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessType {
    Collision,
    Ai,
    GlowDecay,
    Victory,
}

impl ProcessType {
    pub const ALL: [ProcessType; 4] = [
        ProcessType::Collision,
        ProcessType::Ai,
        ProcessType::GlowDecay,
        ProcessType::Victory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessType::Collision => "collision",
            ProcessType::Ai => "ai",
            ProcessType::GlowDecay => "glow-decay",
            ProcessType::Victory => "victory",
        }
    }

    /// Victory checks are never capped
    pub fn is_capped(&self) -> bool {
        !matches!(self, ProcessType::Victory)
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Activity facts for one match, derived from its summary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchActivity {
    pub match_id: MatchId,
    pub last_activity_ms: u64,
    pub alive_players: usize,
    pub ai_entities: usize,
}

impl MatchActivity {
    pub fn from_summary(summary: &MatchSummary) -> Self {
        Self {
            match_id: summary.match_id,
            last_activity_ms: summary.last_activity_ms,
            alive_players: summary.alive_players,
            ai_entities: summary.ai_entities,
        }
    }

    pub fn idle_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_activity_ms)
    }

    pub fn active_within(&self, window_ms: u64, now: u64) -> bool {
        self.idle_ms(now) <= window_ms
    }

    /// `10 * alive + max(0, 100 - idle seconds) + 20 if players and AI share the match`
    pub fn priority(&self, now: u64) -> f64 {
        let idle_secs = self.idle_ms(now) as f64 / 1000.0;
        let mixed = if self.alive_players > 0 && self.ai_entities > 0 {
            MIXED_BONUS
        } else {
            0.0
        };
        PRIORITY_PER_ALIVE_PLAYER * self.alive_players as f64 + (RECENCY_BONUS - idle_secs).max(0.0) + mixed
    }

    pub fn is_eligible(&self, process: ProcessType, now: u64) -> bool {
        match process {
            ProcessType::Collision => {
                self.alive_players >= 2 && self.active_within(COLLISION_ACTIVITY_WINDOW_MS, now)
            }
            ProcessType::Ai => self.ai_entities >= 1 && self.active_within(AI_ACTIVITY_WINDOW_MS, now),
            ProcessType::GlowDecay => self.alive_players >= 1,
            ProcessType::Victory => true,
        }
    }
}

/// A match selected for processing
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScheduledMatch {
    pub match_id: MatchId,
    pub priority: f64,
}

/// Rank active matches for `process`, highest priority first.
///
/// Equal priorities order by match id so selection is deterministic.
pub fn eligible_matches(summaries: &[MatchSummary], process: ProcessType, cap: usize, now: u64) -> Vec<ScheduledMatch> {
    let mut ranked: Vec<ScheduledMatch> = summaries
        .iter()
        .filter(|s| s.status == MatchStatus::Active)
        .map(MatchActivity::from_summary)
        .filter(|a| a.is_eligible(process, now))
        .map(|a| ScheduledMatch {
            match_id: a.match_id,
            priority: a.priority(now),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.priority
            .partial_cmp(&a.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.match_id.cmp(&b.match_id))
    });

    if process.is_capped() {
        ranked.truncate(cap);
    }
    ranked
}

// ============================================================================
// Pass budget
// ============================================================================

/// Load level derived from recent pass durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    /// Under half the budget, the cap may grow
    Relaxed,
    Normal,
    /// Over budget, the cap shrinks
    Overloaded,
}

/// Adapts the per-pass match cap to how long passes actually take
#[derive(Debug, Clone)]
pub struct PassBudget {
    /// Rolling window of pass durations
    durations: VecDeque<Duration>,
    max_samples: usize,
    target: Duration,
    configured_cap: usize,
    effective_cap: usize,
    status: BudgetStatus,
}

impl PassBudget {
    pub fn new(target: Duration, configured_cap: usize) -> Self {
        let configured_cap = configured_cap.max(1);
        Self {
            durations: VecDeque::with_capacity(64),
            max_samples: 64,
            target,
            configured_cap,
            effective_cap: configured_cap,
            status: BudgetStatus::Normal,
        }
    }

    /// Record a finished pass and adapt the cap
    pub fn record(&mut self, duration: Duration) {
        self.durations.push_back(duration);
        while self.durations.len() > self.max_samples {
            self.durations.pop_front();
        }

        if duration > self.target {
            self.status = BudgetStatus::Overloaded;
            let shrunk = (self.effective_cap as f64 * 0.75).floor() as usize;
            self.effective_cap = shrunk.max(1);
        } else if duration < self.target / 2 {
            self.status = BudgetStatus::Relaxed;
            self.effective_cap = (self.effective_cap + 1).min(self.configured_cap);
        } else {
            self.status = BudgetStatus::Normal;
        }
    }

    /// Cap to use for the next pass, always within `[1, configured]`
    pub fn cap(&self) -> usize {
        self.effective_cap
    }

    pub fn configured_cap(&self) -> usize {
        self.configured_cap
    }

    pub fn status(&self) -> BudgetStatus {
        self.status
    }

    pub fn average(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.durations.iter().sum();
        sum / self.durations.len() as u32
    }

    pub fn p95(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<_> = self.durations.iter().copied().collect();
        sorted.sort();
        let idx = (sorted.len() as f32 * 0.95) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    /// Budget usage of the average pass, in percent
    pub fn usage_percent(&self) -> f32 {
        if self.target.is_zero() {
            return 0.0;
        }
        self.average().as_secs_f32() / self.target.as_secs_f32() * 100.0
    }
}
