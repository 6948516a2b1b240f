//! arbor-sim library.
//!
//! Seeded fault-injection runs of the category store. Each run drives
//! random moves, creates, renames and deactivations through a
//! [`arbor_core::store::CategoryStore`] backed by an in-memory backend that
//! rejects writes at a configured rate, and checks the forest and rollback
//! invariants after every step.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).

pub mod campaign;
pub mod oracle;
pub mod rng;
pub mod simulator;

pub use campaign::{CampaignConfig, CampaignReport, SeedFailure, replay_seed, run_campaign};
pub use oracle::InvariantViolation;
pub use simulator::{SimOp, SimulationConfig, SimulationResult, Simulator, StepOutcome, TraceEntry};
