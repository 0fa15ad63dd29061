//! Background Worker for the agent-runner control plane.
//!
//! Claims queued Runs with [`Store::claim_next_queued`] and drives each to
//! a terminal state through [`agent_runner_executor::AgentExecutor`]. Safe
//! distribution across many processes falls out of the claim primitive
//! itself: no two workers, in this process or another, ever see the same
//! Run returned from a claim.

pub mod registry;
pub mod worker;

pub use registry::RunCancelRegistry;
pub use worker::{Worker, WorkerConfig, WorkerStatus};
