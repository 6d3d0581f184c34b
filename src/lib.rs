pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod factors;
pub mod geometry;
pub mod rng;
pub mod scenario;
pub mod systems;
pub mod world;

pub use config::{SimulationConfig, StabilityStrategy};
pub use engine::{Engine, EngineBuilder, RunOutcome, RunState, TerminationReason, TickSnapshot};
pub use error::{SimError, SimResult};
pub use factors::{ensure_defined, FactorDefinition};
pub use world::{CitySeed, World};
