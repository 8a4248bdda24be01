//! Multi-agent build orchestrator.
//!
//! Natural-language requests become plans (via an external Planner), plans
//! are queued as files, and a single consumer dispatches each task to a named
//! agent. Background workers audit the workspace and feed bug tickets back
//! into planning. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (path sanitizing, safety
//!   classification, action normalization, selection, audits). No I/O.
//! - **[`io`]**: Side-effecting stores and adapters (queue, manifest, tickets,
//!   subprocesses, git, prompts).
//!
//! Orchestration modules ([`plan_executor`], [`supervisor`], [`workers`],
//! [`interactive`]) coordinate core logic with I/O to implement CLI commands.

pub mod agents;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod interactive;
pub mod io;
pub mod logging;
pub mod plan_executor;
pub mod supervisor;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workers;
pub mod workspace;
