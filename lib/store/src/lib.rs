//! Durable storage for the agent-runner control plane.
//!
//! Exposes a single [`Store`] trait covering Projects, Runs, and Events plus
//! the atomic claim primitive (`claim_next_queued`) that the background
//! worker relies on for its single-winner-per-Run safety property. Two
//! implementations are provided: [`postgres::PostgresStore`] for production
//! and [`memory::InMemoryStore`] for tests and `DATABASE_URL`-less runs.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use model::{Event, Project, Run, RunStatus, RunType, event_type};
pub use postgres::PostgresStore;
pub use store::Store;
