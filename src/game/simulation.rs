//! Simulation facade
//!
//! Every operation runs inside one store transaction for its match, so all
//! validation happens before any write and concurrent callers never interleave
//! on the same match. Scheduler passes fan out over independent matches on the
//! rayon pool; an error in one match is logged and counted without stopping
//! the rest of the pass.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use hashbrown::HashMap;
use parking_lot::Mutex;
use rand::Rng;
#[cfg(feature = "parallel_passes")]
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::game::constants::{boost, glow, scheduler::DEFAULT_CAP};
use crate::game::error::{CoreError, CoreResult};
use crate::game::scheduler::{self, PassBudget, ProcessType, ScheduledMatch};
use crate::game::state::{AiKind, EntityId, Match, MatchConfig, MatchId, MatchStatus, PlayerEffects, PlayerId};
use crate::game::store::MatchStore;
use crate::game::systems::ai::{self, creeper, spark, CreeperUpdate, PowerUpRequest, SparkUpdate};
use crate::game::systems::collision::{self, CollisionReport};
use crate::game::systems::glow::{self as decay, DecayReport};
use crate::game::victory::{self, VictoryCheck};
use crate::metrics::SimulationMetrics;
use crate::util::vec2::Vec2;

/// Default wall-clock budget for one scheduler pass
pub const DEFAULT_PASS_BUDGET: Duration = Duration::from_millis(50);

/// Result of a paint, move or boost
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PaintReport {
    pub cells_painted: u32,
    pub victory: VictoryCheck,
}

/// One entry of a batched paint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaintUpdate {
    pub player_id: PlayerId,
    pub position: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoostReport {
    pub position: Vec2,
    pub size: f32,
    pub paint: PaintReport,
}

/// Outcome of one AI tick, by family
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AiUpdate {
    Spark(SparkUpdate),
    Creeper(CreeperUpdate),
}

impl AiUpdate {
    pub fn updated(&self) -> u32 {
        match self {
            AiUpdate::Spark(u) => u.updated,
            AiUpdate::Creeper(u) => u.updated,
        }
    }
}

/// Summary of one scheduler pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub process: ProcessType,
    pub selected: usize,
    pub processed: usize,
    pub failed: usize,
}

/// Result of a retention sweep; per-match failures never abort the sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub purged: usize,
    pub failed: usize,
}

pub struct Simulation<S: MatchStore> {
    store: S,
    metrics: Arc<SimulationMetrics>,
    power_ups: Sender<PowerUpRequest>,
    configured_cap: usize,
    budgets: Mutex<HashMap<ProcessType, PassBudget>>,
}

impl<S: MatchStore> Simulation<S> {
    /// Create a simulation over `store`. The returned receiver yields power-up
    /// spawn requests for the effects collaborator.
    pub fn new(store: S, metrics: Arc<SimulationMetrics>) -> (Self, Receiver<PowerUpRequest>) {
        Self::with_budget(store, metrics, DEFAULT_CAP, DEFAULT_PASS_BUDGET)
    }

    pub fn with_budget(
        store: S,
        metrics: Arc<SimulationMetrics>,
        cap: usize,
        pass_budget: Duration,
    ) -> (Self, Receiver<PowerUpRequest>) {
        let (power_ups, receiver) = crossbeam_channel::unbounded();
        let budgets = ProcessType::ALL
            .iter()
            .map(|&process| (process, PassBudget::new(pass_budget, cap)))
            .collect();

        let simulation = Self {
            store,
            metrics,
            power_ups,
            configured_cap: cap.max(1),
            budgets: Mutex::new(budgets),
        };
        (simulation, receiver)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<SimulationMetrics> {
        &self.metrics
    }

    pub fn create_match(&self, config: MatchConfig, now: u64) -> MatchId {
        self.store.insert(Match::new(config, now))
    }

    // ========================================================================
    // AI
    // ========================================================================

    pub fn spawn(&self, match_id: MatchId, kind: AiKind, position: Vec2, now: u64) -> CoreResult<EntityId> {
        let id = self.store.transact(match_id, |m| ai::spawn(m, kind, position, now))?;
        SimulationMetrics::add(&self.metrics.ai_spawned, 1);
        Ok(id)
    }

    /// Run one AI tick for every entity of `kind` in the match
    pub fn update_behavior(&self, match_id: MatchId, kind: AiKind, now: u64) -> CoreResult<AiUpdate> {
        let mut rng = rand::thread_rng();
        match kind {
            AiKind::Spark => self.update_sparks(match_id, now, &mut rng).map(AiUpdate::Spark),
            AiKind::Creeper => self.update_creepers(match_id, now, &mut rng).map(AiUpdate::Creeper),
        }
    }

    pub fn update_sparks(&self, match_id: MatchId, now: u64, rng: &mut impl Rng) -> CoreResult<SparkUpdate> {
        let update = self.store.transact(match_id, |m| spark::update(m, now, rng))?;
        SimulationMetrics::add(&self.metrics.sparks_consumed, update.consumed as u64);
        self.request_power_ups(&update.power_ups);
        Ok(update)
    }

    pub fn update_creepers(&self, match_id: MatchId, now: u64, rng: &mut impl Rng) -> CoreResult<CreeperUpdate> {
        let update = self.store.transact(match_id, |m| creeper::update(m, now, rng))?;
        SimulationMetrics::add(&self.metrics.creeper_hits, update.players_hit as u64);
        SimulationMetrics::add(&self.metrics.creepers_burned, update.destroyed as u64);
        self.request_power_ups(&update.power_ups);
        Ok(update)
    }

    fn request_power_ups(&self, requests: &[PowerUpRequest]) {
        for request in requests {
            SimulationMetrics::add(&self.metrics.power_ups_requested, 1);
            if self.power_ups.send(*request).is_err() {
                debug!("Power-up receiver gone, dropping request for match {}", request.match_id);
            }
        }
    }

    // ========================================================================
    // Collisions
    // ========================================================================

    pub fn check_collisions(&self, match_id: MatchId, now: u64) -> CoreResult<CollisionReport> {
        let (report, finished) = self.store.transact(match_id, |m| {
            m.ensure_active()?;
            let report = collision::resolve(m, now)?;
            if report.collisions > 0 {
                m.touch(now);
            }
            let finished = report.eliminations > 0 && victory::check_and_finalize(m, now).has_winner;
            Ok((report, finished))
        })?;

        SimulationMetrics::add(&self.metrics.collisions, report.collisions as u64);
        SimulationMetrics::add(&self.metrics.eliminations, report.eliminations as u64);
        SimulationMetrics::add(&self.metrics.bounces, report.bounces as u64);
        self.count_finished(finished);
        Ok(report)
    }

    // ========================================================================
    // Territory and player input
    // ========================================================================

    pub fn paint(&self, match_id: MatchId, player_id: PlayerId, position: Vec2, now: u64) -> CoreResult<PaintReport> {
        let report = self.store.transact(match_id, |m| paint_in(m, player_id, position, now))?;
        self.count_paint(&report);
        Ok(report)
    }

    /// Apply several paints in one transaction.
    ///
    /// Ownership ends up exactly as if each update had been a separate
    /// [`paint`](Self::paint) call in order, including per-update failures.
    pub fn paint_batch(
        &self,
        match_id: MatchId,
        updates: &[PaintUpdate],
        now: u64,
    ) -> CoreResult<Vec<CoreResult<PaintReport>>> {
        let results = self.store.transact(match_id, |m| {
            Ok(updates
                .iter()
                .map(|u| paint_in(m, u.player_id, u.position, now))
                .collect::<Vec<_>>())
        })?;

        for report in results.iter().flatten() {
            self.count_paint(report);
        }
        Ok(results)
    }

    /// Input path: move a player and paint under the new position
    pub fn move_player(&self, match_id: MatchId, player_id: PlayerId, position: Vec2, now: u64) -> CoreResult<PaintReport> {
        let report = self.store.transact(match_id, |m| {
            m.ensure_active()?;
            let index = m.require_alive_player(player_id)?;
            m.validate_position(position)?;

            m.players[index].position = position;
            paint_if_on_grid(m, player_id, position, now)
        })?;
        self.count_paint(&report);
        Ok(report)
    }

    /// Dash `boost::DISTANCE` along `direction`, paying `boost::COST` size.
    /// A zero direction pays the cost without moving.
    pub fn boost(&self, match_id: MatchId, player_id: PlayerId, direction: Vec2, now: u64) -> CoreResult<BoostReport> {
        let report = self.store.transact(match_id, |m| {
            m.ensure_active()?;
            let index = m.require_alive_player(player_id)?;

            let player = &m.players[index];
            let spare = player.size - glow::MIN_SIZE;
            if spare < boost::COST {
                return Err(CoreError::InsufficientResource {
                    required: boost::COST,
                    available: spare.max(0.0),
                });
            }
            let destination = (player.position + direction.normalize() * boost::DISTANCE).clamp_to(0.0, m.config.map_size);

            let player = &mut m.players[index];
            player.shrink(boost::COST);
            player.position = destination;
            let size = player.size;

            let paint = paint_if_on_grid(m, player_id, destination, now)?;
            Ok(BoostReport {
                position: destination,
                size,
                paint,
            })
        })?;
        self.count_paint(&report.paint);
        Ok(report)
    }

    /// Effects collaborator writes shield, cloak and size-boost facts here
    pub fn set_effects(&self, match_id: MatchId, player_id: PlayerId, effects: PlayerEffects) -> CoreResult<()> {
        self.store.transact(match_id, |m| {
            m.ensure_active()?;
            let index = m.player_index(player_id).ok_or(CoreError::PlayerNotInMatch { match_id, player_id })?;
            m.players[index].set_effects(effects);
            Ok(())
        })
    }

    fn count_paint(&self, report: &PaintReport) {
        SimulationMetrics::add(&self.metrics.cells_painted, report.cells_painted as u64);
        // A paint can only finish a match that was still active
        self.count_finished(report.victory.has_winner);
    }

    fn count_finished(&self, finished: bool) {
        if finished {
            SimulationMetrics::add(&self.metrics.matches_finished, 1);
        }
    }

    // ========================================================================
    // Victory and decay
    // ========================================================================

    /// Idempotent: a finished match reports its recorded outcome
    pub fn check_victory(&self, match_id: MatchId, now: u64) -> CoreResult<VictoryCheck> {
        let (check, newly_finished) = self.store.transact(match_id, |m| {
            let was_finished = m.is_finished();
            let check = victory::check_and_finalize(m, now);
            Ok((check, !was_finished && m.is_finished()))
        })?;
        self.count_finished(newly_finished);
        Ok(check)
    }

    pub fn apply_glow_decay(&self, match_id: MatchId, now: u64) -> CoreResult<DecayReport> {
        self.store.transact(match_id, |m| decay::apply(m, now))
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    pub fn get_eligible_matches(&self, process: ProcessType, cap: usize, now: u64) -> Vec<ScheduledMatch> {
        let summaries = self.store.summaries(Some(MatchStatus::Active));
        scheduler::eligible_matches(&summaries, process, cap, now)
    }

    /// Cap the next pass of `process` will use
    pub fn effective_cap(&self, process: ProcessType) -> usize {
        self.budgets
            .lock()
            .get(&process)
            .map_or(self.configured_cap, |budget| budget.cap())
    }

    fn process_match(&self, process: ProcessType, match_id: MatchId, now: u64) -> CoreResult<()> {
        match process {
            ProcessType::Collision => self.check_collisions(match_id, now).map(|_| ()),
            ProcessType::Ai => {
                let mut rng = rand::thread_rng();
                self.update_sparks(match_id, now, &mut rng)?;
                self.update_creepers(match_id, now, &mut rng).map(|_| ())
            }
            ProcessType::GlowDecay => self.apply_glow_decay(match_id, now).map(|_| ()),
            ProcessType::Victory => self.check_victory(match_id, now).map(|_| ()),
        }
    }

    /// Select, process and account one pass of `process`
    pub fn run_pass(&self, process: ProcessType, now: u64) -> PassReport {
        let started = Instant::now();
        let cap = self.effective_cap(process);
        let selected = self.get_eligible_matches(process, cap, now);

        let work = |scheduled: &ScheduledMatch| -> bool {
            match self.process_match(process, scheduled.match_id, now) {
                Ok(()) => true,
                Err(e) if e.is_internal() => {
                    error!("{} pass aborted match {}: {}", process, scheduled.match_id, e);
                    false
                }
                Err(e) => {
                    warn!("{} pass skipped match {}: {}", process, scheduled.match_id, e);
                    false
                }
            }
        };

        #[cfg(feature = "parallel_passes")]
        let processed = selected.par_iter().filter(|s| work(s)).count();
        #[cfg(not(feature = "parallel_passes"))]
        let processed = selected.iter().filter(|s| work(s)).count();

        let failed = selected.len() - processed;
        let elapsed = started.elapsed();

        let next_cap = {
            let mut budgets = self.budgets.lock();
            let budget = budgets
                .entry(process)
                .or_insert_with(|| PassBudget::new(DEFAULT_PASS_BUDGET, self.configured_cap));
            budget.record(elapsed);
            budget.cap()
        };

        self.metrics.record_pass(elapsed);
        self.metrics.record_cap(process, next_cap);
        SimulationMetrics::add(&self.metrics.matches_processed, processed as u64);
        SimulationMetrics::add(&self.metrics.matches_aborted, failed as u64);

        if next_cap != cap {
            debug!("{} cap {} -> {} after {:?}", process, cap, next_cap, elapsed);
        }

        PassReport {
            process,
            selected: selected.len(),
            processed,
            failed,
        }
    }

    // ========================================================================
    // Retention
    // ========================================================================

    /// Delete matches that finished at least `retention_ms` ago
    pub fn purge_finished(&self, now: u64, retention_ms: u64) -> CleanupReport {
        let mut report = CleanupReport::default();

        for summary in self.store.summaries(Some(MatchStatus::Finished)) {
            let Some(finished_at) = summary.finished_at_ms else {
                continue;
            };
            if now.saturating_sub(finished_at) < retention_ms {
                continue;
            }
            match self.store.remove(summary.match_id) {
                Some(_) => report.purged += 1,
                None => {
                    warn!("Match {} vanished before purge", summary.match_id);
                    report.failed += 1;
                }
            }
        }

        if report.purged > 0 {
            info!("Purged {} finished matches ({} failed)", report.purged, report.failed);
        }
        SimulationMetrics::add(&self.metrics.matches_purged, report.purged as u64);
        report
    }
}

/// Paint for an alive player of an active match, then check for a territory win
fn paint_in(m: &mut Match, player_id: PlayerId, position: Vec2, now: u64) -> CoreResult<PaintReport> {
    m.ensure_active()?;
    let index = m.require_alive_player(player_id)?;
    if !(position.x.is_finite() && position.y.is_finite()) {
        return Err(CoreError::PositionOutOfBounds {
            x: position.x,
            y: position.y,
        });
    }

    let size = m.players[index].size;
    let cells_painted = m.territory.paint(player_id, size, position, now)?;

    let mut report = PaintReport {
        cells_painted,
        victory: VictoryCheck::none(),
    };
    if cells_painted > 0 {
        m.touch(now);
        report.victory = victory::check_and_finalize(m, now);
    }
    Ok(report)
}

/// Positions on the far map edge are valid but have no grid cell underneath
fn paint_if_on_grid(m: &mut Match, player_id: PlayerId, position: Vec2, now: u64) -> CoreResult<PaintReport> {
    if m.territory.contains(position) {
        paint_in(m, player_id, position, now)
    } else {
        Ok(PaintReport::default())
    }
}
