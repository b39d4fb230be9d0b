//! Prometheus-compatible metrics endpoint
//!
//! Exposes simulation counters in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::game::scheduler::ProcessType;

const HISTORY_LEN: usize = 1000;

/// Metrics registry for the simulation core
#[derive(Debug)]
pub struct SimulationMetrics {
    // Scheduler passes
    pub passes_total: AtomicU64,
    pub matches_processed: AtomicU64,
    pub matches_aborted: AtomicU64,

    // Pass timing (microseconds)
    pub pass_time_us: AtomicU64,
    pub pass_time_p95_us: AtomicU64,
    pub pass_time_p99_us: AtomicU64,
    pub pass_time_max_us: AtomicU64,

    // Effective cap per process type
    pub collision_cap: AtomicU64,
    pub ai_cap: AtomicU64,
    pub decay_cap: AtomicU64,

    // Collisions
    pub collisions: AtomicU64,
    pub eliminations: AtomicU64,
    pub bounces: AtomicU64,

    // Territory
    pub cells_painted: AtomicU64,

    // AI
    pub ai_spawned: AtomicU64,
    pub sparks_consumed: AtomicU64,
    pub creeper_hits: AtomicU64,
    pub creepers_burned: AtomicU64,
    pub power_ups_requested: AtomicU64,

    // Match lifecycle
    pub matches_finished: AtomicU64,
    pub matches_purged: AtomicU64,

    start_time: Instant,

    // Rolling pass times for percentile calculation
    pass_history: RwLock<VecDeque<u64>>,
}

impl SimulationMetrics {
    pub fn new() -> Self {
        Self {
            passes_total: AtomicU64::new(0),
            matches_processed: AtomicU64::new(0),
            matches_aborted: AtomicU64::new(0),
            pass_time_us: AtomicU64::new(0),
            pass_time_p95_us: AtomicU64::new(0),
            pass_time_p99_us: AtomicU64::new(0),
            pass_time_max_us: AtomicU64::new(0),
            collision_cap: AtomicU64::new(0),
            ai_cap: AtomicU64::new(0),
            decay_cap: AtomicU64::new(0),
            collisions: AtomicU64::new(0),
            eliminations: AtomicU64::new(0),
            bounces: AtomicU64::new(0),
            cells_painted: AtomicU64::new(0),
            ai_spawned: AtomicU64::new(0),
            sparks_consumed: AtomicU64::new(0),
            creeper_hits: AtomicU64::new(0),
            creepers_burned: AtomicU64::new(0),
            power_ups_requested: AtomicU64::new(0),
            matches_finished: AtomicU64::new(0),
            matches_purged: AtomicU64::new(0),
            start_time: Instant::now(),
            pass_history: RwLock::new(VecDeque::with_capacity(HISTORY_LEN)),
        }
    }

    /// Shorthand for a relaxed increment
    #[inline]
    pub fn add(counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    /// Record a pass duration and update percentiles
    pub fn record_pass(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.pass_time_us.store(us, Ordering::Relaxed);
        self.passes_total.fetch_add(1, Ordering::Relaxed);

        let mut history = self.pass_history.write();
        history.push_back(us);
        while history.len() > HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.pass_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.pass_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.pass_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Publish the effective cap a process type is running with
    pub fn record_cap(&self, process: ProcessType, cap: usize) {
        let gauge = match process {
            ProcessType::Collision => &self.collision_cap,
            ProcessType::Ai => &self.ai_cap,
            ProcessType::GlowDecay => &self.decay_cap,
            ProcessType::Victory => return,
        };
        gauge.store(cap as u64, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        // Scheduler
        metric!("glow_arena_passes_total", "Scheduler passes run", "counter",
            self.passes_total.load(Ordering::Relaxed));
        metric!("glow_arena_matches_processed_total", "Match passes completed", "counter",
            self.matches_processed.load(Ordering::Relaxed));
        metric!("glow_arena_matches_aborted_total", "Match passes aborted by an error", "counter",
            self.matches_aborted.load(Ordering::Relaxed));
        metric!("glow_arena_pass_time_microseconds", "Last pass time in microseconds", "gauge",
            self.pass_time_us.load(Ordering::Relaxed));
        metric!("glow_arena_pass_time_p95_microseconds", "95th percentile pass time", "gauge",
            self.pass_time_p95_us.load(Ordering::Relaxed));
        metric!("glow_arena_pass_time_p99_microseconds", "99th percentile pass time", "gauge",
            self.pass_time_p99_us.load(Ordering::Relaxed));
        metric!("glow_arena_pass_time_max_microseconds", "Maximum pass time", "gauge",
            self.pass_time_max_us.load(Ordering::Relaxed));

        for (process, gauge) in [
            (ProcessType::Collision, &self.collision_cap),
            (ProcessType::Ai, &self.ai_cap),
            (ProcessType::GlowDecay, &self.decay_cap),
        ] {
            output.push_str(&format!(
                "glow_arena_effective_cap{{process=\"{}\"}} {}\n",
                process,
                gauge.load(Ordering::Relaxed)
            ));
        }

        // Collisions
        metric!("glow_arena_collisions_total", "Colliding pairs resolved", "counter",
            self.collisions.load(Ordering::Relaxed));
        metric!("glow_arena_eliminations_total", "Players eliminated", "counter",
            self.eliminations.load(Ordering::Relaxed));
        metric!("glow_arena_bounces_total", "Pairs bounced apart", "counter",
            self.bounces.load(Ordering::Relaxed));

        // Territory
        metric!("glow_arena_cells_painted_total", "Territory cells painted", "counter",
            self.cells_painted.load(Ordering::Relaxed));

        // AI
        metric!("glow_arena_ai_spawned_total", "AI entities spawned", "counter",
            self.ai_spawned.load(Ordering::Relaxed));
        metric!("glow_arena_sparks_consumed_total", "Sparks consumed by players", "counter",
            self.sparks_consumed.load(Ordering::Relaxed));
        metric!("glow_arena_creeper_hits_total", "Creeper contact hits", "counter",
            self.creeper_hits.load(Ordering::Relaxed));
        metric!("glow_arena_creepers_burned_total", "Creepers destroyed by light", "counter",
            self.creepers_burned.load(Ordering::Relaxed));
        metric!("glow_arena_power_ups_requested_total", "Power-up spawn requests", "counter",
            self.power_ups_requested.load(Ordering::Relaxed));

        // Lifecycle
        metric!("glow_arena_matches_finished_total", "Matches finalized", "counter",
            self.matches_finished.load(Ordering::Relaxed));
        metric!("glow_arena_matches_purged_total", "Finished matches purged", "counter",
            self.matches_purged.load(Ordering::Relaxed));
        metric!("glow_arena_uptime_seconds", "Uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON snapshot of the same counters
    pub fn to_json(&self) -> String {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        serde_json::json!({
            "scheduler": {
                "passes": load(&self.passes_total),
                "matches_processed": load(&self.matches_processed),
                "matches_aborted": load(&self.matches_aborted),
                "pass_time_us": load(&self.pass_time_us),
                "pass_time_p95_us": load(&self.pass_time_p95_us),
                "pass_time_p99_us": load(&self.pass_time_p99_us),
                "pass_time_max_us": load(&self.pass_time_max_us),
                "caps": {
                    "collision": load(&self.collision_cap),
                    "ai": load(&self.ai_cap),
                    "glow_decay": load(&self.decay_cap),
                },
            },
            "collisions": {
                "total": load(&self.collisions),
                "eliminations": load(&self.eliminations),
                "bounces": load(&self.bounces),
            },
            "territory": {
                "cells_painted": load(&self.cells_painted),
            },
            "ai": {
                "spawned": load(&self.ai_spawned),
                "sparks_consumed": load(&self.sparks_consumed),
                "creeper_hits": load(&self.creeper_hits),
                "creepers_burned": load(&self.creepers_burned),
                "power_ups_requested": load(&self.power_ups_requested),
            },
            "matches": {
                "finished": load(&self.matches_finished),
                "purged": load(&self.matches_purged),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<SimulationMetrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = render_response(&metrics, &request);

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

/// HTTP response for a raw request
fn render_response(metrics: &SimulationMetrics, request: &str) -> String {
    let (content_type, body) = if request.starts_with("GET /metrics/json") || request.starts_with("GET /json") {
        ("application/json", metrics.to_json())
    } else if request.starts_with("GET /metrics") {
        ("text/plain; version=0.0.4", metrics.to_prometheus())
    } else if request.starts_with("GET /health") || request.starts_with("GET / ") {
        ("text/plain", "OK".to_string())
    } else {
        return "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
    };

    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}
