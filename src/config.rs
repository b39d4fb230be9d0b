use std::str::FromStr;
use std::time::Duration;

use crate::game::constants::{scheduler::DEFAULT_CAP, victory::DEFAULT_TIME_LIMIT_MS, DEFAULT_MAP_SIZE};
use crate::game::state::MatchConfig;

/// Simulation host configuration
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Edge length of the square map
    pub map_size: f32,
    /// Match time limit in milliseconds
    pub match_time_limit_ms: u64,
    /// Maximum matches processed per capped scheduler pass
    pub scheduler_cap: usize,
    pub collision_interval_ms: u64,
    pub ai_interval_ms: u64,
    pub decay_interval_ms: u64,
    pub victory_interval_ms: u64,
    /// Wall-clock budget for one pass; the cap adapts around it
    pub pass_budget_ms: u64,
    /// How long finished matches are kept before purge
    pub retention_ms: u64,
    /// Matches created by the demo host
    pub demo_matches: usize,
    pub demo_players_per_match: usize,
    /// Port for the metrics endpoint (0 disables it)
    pub metrics_port: u16,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            map_size: DEFAULT_MAP_SIZE,
            match_time_limit_ms: DEFAULT_TIME_LIMIT_MS,
            scheduler_cap: DEFAULT_CAP,
            collision_interval_ms: 1_000,
            ai_interval_ms: 2_000,
            decay_interval_ms: 30_000,
            victory_interval_ms: 5_000,
            pass_budget_ms: 50,
            retention_ms: 60_000,
            demo_matches: 8,
            demo_players_per_match: 4,
            metrics_port: 9090,
        }
    }
}

/// Overwrite `field` from env var `key` when it parses and passes `valid`
fn read_env<T: FromStr>(key: &str, field: &mut T, valid: impl Fn(&T) -> bool, expectation: &str) {
    let Ok(raw) = std::env::var(key) else {
        return;
    };
    match raw.parse::<T>() {
        Ok(parsed) if valid(&parsed) => *field = parsed,
        Ok(_) => tracing::warn!("{} must be {}, using default", key, expectation),
        Err(_) => tracing::warn!("Invalid {} '{}', using default", key, raw),
    }
}

impl SimulationConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        read_env("MAP_SIZE", &mut config.map_size, |v| v.is_finite() && *v >= 100.0, ">= 100");
        read_env("MATCH_TIME_LIMIT_MS", &mut config.match_time_limit_ms, |v| *v > 0, "> 0");
        read_env("SCHEDULER_CAP", &mut config.scheduler_cap, |v| (1..=1000).contains(v), "1-1000");
        read_env("COLLISION_INTERVAL_MS", &mut config.collision_interval_ms, |v| *v > 0, "> 0");
        read_env("AI_INTERVAL_MS", &mut config.ai_interval_ms, |v| *v > 0, "> 0");
        read_env("DECAY_INTERVAL_MS", &mut config.decay_interval_ms, |v| *v > 0, "> 0");
        read_env("VICTORY_INTERVAL_MS", &mut config.victory_interval_ms, |v| *v > 0, "> 0");
        read_env("PASS_BUDGET_MS", &mut config.pass_budget_ms, |v| *v > 0, "> 0");
        read_env("RETENTION_MS", &mut config.retention_ms, |_| true, "a number");
        read_env("DEMO_MATCHES", &mut config.demo_matches, |v| *v <= 10_000, "0-10000");
        read_env("DEMO_PLAYERS_PER_MATCH", &mut config.demo_players_per_match, |v| (1..=64).contains(v), "1-64");
        read_env("METRICS_PORT", &mut config.metrics_port, |_| true, "a port");

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if !(self.map_size.is_finite() && self.map_size > 0.0) {
            return Err("map_size must be positive".to_string());
        }
        if self.scheduler_cap == 0 {
            return Err("scheduler_cap must be at least 1".to_string());
        }
        if self.pass_budget_ms == 0 {
            return Err("pass_budget_ms must be at least 1".to_string());
        }
        if [
            self.collision_interval_ms,
            self.ai_interval_ms,
            self.decay_interval_ms,
            self.victory_interval_ms,
        ]
        .contains(&0)
        {
            return Err("tick intervals must be at least 1ms".to_string());
        }
        Ok(())
    }

    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            map_size: self.map_size,
            time_limit_ms: self.match_time_limit_ms,
        }
    }

    pub fn pass_budget(&self) -> Duration {
        Duration::from_millis(self.pass_budget_ms)
    }
}
