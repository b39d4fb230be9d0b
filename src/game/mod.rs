pub mod constants;
pub mod error;
pub mod scheduler;
pub mod simulation;
pub mod spatial;
pub mod state;
pub mod store;
pub mod systems;
pub mod territory;
pub mod victory;
