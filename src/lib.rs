//! Glow Arena Simulation Library
//!
//! Authoritative tick simulation for a multiplayer territory arena: spatial
//! indexing, collision and elimination, territory painting, spark and creeper
//! AI, victory evaluation and adaptive per-match scheduling.
//!
//! # Features
//!
//! - `parallel_passes` - Process the matches of one scheduler pass on the rayon pool (enabled by default)

pub mod config;
pub mod game;
pub mod metrics;
pub mod util;
