use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashSet;
use rand::Rng;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use glow_arena_server::config::SimulationConfig;
use glow_arena_server::game::scheduler::ProcessType;
use glow_arena_server::game::simulation::Simulation;
use glow_arena_server::game::state::{AiKind, MatchId, MatchStatus};
use glow_arena_server::game::store::{InMemoryStore, MatchStore};
use glow_arena_server::metrics::{self, SimulationMetrics};
use glow_arena_server::util::vec2::Vec2;

type DemoSimulation = Simulation<InMemoryStore>;

const INPUT_INTERVAL_MS: u64 = 250;
const CLEANUP_INTERVAL_MS: u64 = 10_000;
const STEP_DISTANCE: f32 = 12.0;
const BOOST_CHANCE: f64 = 0.03;
const SPARKS_PER_MATCH: usize = 12;
const CREEPERS_PER_MATCH: usize = 3;

/// Milliseconds since the host started
#[derive(Clone, Copy)]
struct Clock(Instant);

impl Clock {
    fn now_ms(&self) -> u64 {
        self.0.elapsed().as_millis() as u64
    }
}

fn random_point(rng: &mut impl Rng, map_size: f32) -> Vec2 {
    let margin = map_size * 0.05;
    Vec2::new(
        rng.gen_range(margin..map_size - margin),
        rng.gen_range(margin..map_size - margin),
    )
}

/// Create and start the demo matches with players and AI
fn seed_matches(simulation: &DemoSimulation, config: &SimulationConfig, now: u64) -> anyhow::Result<Vec<MatchId>> {
    let mut rng = rand::thread_rng();
    let mut ids = Vec::with_capacity(config.demo_matches);

    for _ in 0..config.demo_matches {
        let match_id = simulation.create_match(config.match_config(), now);
        let players: Vec<(uuid::Uuid, Vec2)> = (0..config.demo_players_per_match)
            .map(|_| (uuid::Uuid::new_v4(), random_point(&mut rng, config.map_size)))
            .collect();

        simulation.store().transact(match_id, |m| {
            for (i, (player_id, position)) in players.iter().enumerate() {
                m.add_player(*player_id, format!("Player {}", i + 1), *position, now)?;
            }
            m.start(now)
        })?;

        for kind in std::iter::repeat(AiKind::Spark)
            .take(SPARKS_PER_MATCH)
            .chain(std::iter::repeat(AiKind::Creeper).take(CREEPERS_PER_MATCH))
        {
            simulation.spawn(match_id, kind, random_point(&mut rng, config.map_size), now)?;
        }

        info!("Match {} started with {} players", match_id, players.len());
        ids.push(match_id);
    }

    Ok(ids)
}

/// Feed random movement (and the occasional boost) for every alive player
fn drive_input(simulation: &DemoSimulation, map_size: f32, now: u64) {
    let mut rng = rand::thread_rng();

    for summary in simulation.store().summaries(Some(MatchStatus::Active)) {
        let match_id = summary.match_id;
        let Ok(players) = simulation
            .store()
            .read(match_id, |m| m.alive_players().map(|p| (p.id, p.position)).collect::<Vec<_>>())
        else {
            continue;
        };

        for (player_id, position) in players {
            let direction = Vec2::from_angle(rng.gen_range(0.0..std::f32::consts::TAU));
            let result = if rng.gen_bool(BOOST_CHANCE) {
                simulation.boost(match_id, player_id, direction, now).map(|r| r.paint)
            } else {
                let target = (position + direction * STEP_DISTANCE).clamp_to(0.0, map_size);
                simulation.move_player(match_id, player_id, target, now)
            };

            match result {
                Ok(report) if report.victory.has_winner => break,
                Ok(_) => {}
                Err(e) => debug!("Input for {} in match {} rejected: {}", player_id, match_id, e),
            }
        }
    }
}

/// Log outcomes of newly finished matches as JSON
fn report_finished(simulation: &DemoSimulation, reported: &mut HashSet<MatchId>) {
    for summary in simulation.store().summaries(Some(MatchStatus::Finished)) {
        if !reported.insert(summary.match_id) {
            continue;
        }
        let outcome = simulation
            .store()
            .read(summary.match_id, |m| m.outcome.as_ref().map(serde_json::to_string));
        match outcome {
            Ok(Some(Ok(json))) => info!("Match {} outcome: {}", summary.match_id, json),
            Ok(Some(Err(e))) => warn!("Failed to serialize outcome of {}: {}", summary.match_id, e),
            Ok(None) | Err(_) => {}
        }
    }
}

async fn run_pass(simulation: &Arc<DemoSimulation>, process: ProcessType, now: u64) {
    let simulation = simulation.clone();
    match tokio::task::spawn_blocking(move || simulation.run_pass(process, now)).await {
        Ok(report) if report.selected > 0 => debug!(
            "{} pass: {} selected, {} processed, {} failed",
            report.process, report.selected, report.processed, report.failed
        ),
        Ok(_) => {}
        Err(e) => error!("{} pass panicked: {}", process, e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Glow Arena simulation v{}", env!("CARGO_PKG_VERSION"));

    let config = SimulationConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: map={} cap={} budget={}ms matches={}",
        config.map_size, config.scheduler_cap, config.pass_budget_ms, config.demo_matches
    );

    let metrics = Arc::new(SimulationMetrics::new());
    if config.metrics_port > 0 {
        let metrics_clone = metrics.clone();
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_clone, port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let (simulation, power_ups) =
        Simulation::with_budget(InMemoryStore::new(), metrics.clone(), config.scheduler_cap, config.pass_budget());
    let simulation = Arc::new(simulation);
    let clock = Clock(Instant::now());

    let match_ids = seed_matches(&simulation, &config, clock.now_ms())?;
    let mut reported: HashSet<MatchId> = HashSet::new();

    let ticker = |ms: u64| {
        let mut timer = interval(Duration::from_millis(ms));
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        timer
    };
    let mut collision_timer = ticker(config.collision_interval_ms);
    let mut ai_timer = ticker(config.ai_interval_ms);
    let mut decay_timer = ticker(config.decay_interval_ms);
    let mut victory_timer = ticker(config.victory_interval_ms);
    let mut input_timer = ticker(INPUT_INTERVAL_MS);
    let mut cleanup_timer = ticker(CLEANUP_INTERVAL_MS);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = collision_timer.tick() => run_pass(&simulation, ProcessType::Collision, clock.now_ms()).await,
            _ = ai_timer.tick() => run_pass(&simulation, ProcessType::Ai, clock.now_ms()).await,
            _ = decay_timer.tick() => run_pass(&simulation, ProcessType::GlowDecay, clock.now_ms()).await,
            _ = victory_timer.tick() => {
                run_pass(&simulation, ProcessType::Victory, clock.now_ms()).await;
                report_finished(&simulation, &mut reported);
                if match_ids.iter().all(|id| reported.contains(id)) {
                    info!("All {} matches finished", match_ids.len());
                    break;
                }
            }
            _ = input_timer.tick() => {
                drive_input(&simulation, config.map_size, clock.now_ms());
                for request in power_ups.try_iter() {
                    debug!(
                        "Power-up requested in match {} at ({:.0}, {:.0}) by {:?}",
                        request.match_id, request.position.x, request.position.y, request.source
                    );
                }
            }
            _ = cleanup_timer.tick() => {
                report_finished(&simulation, &mut reported);
                simulation.purge_finished(clock.now_ms(), config.retention_ms);
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("{}", metrics.to_json());
    info!("Simulation stopped");
    Ok(())
}
