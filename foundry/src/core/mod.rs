//! Pure orchestration logic: path sanitizing, command screening, action
//! normalization, plan and ticket selection, and workspace audits.
//!
//! Nothing here touches the filesystem or spawns processes.

pub mod action;
pub mod audit;
pub mod invariants;
pub mod path;
pub mod reply;
pub mod safety;
pub mod selector;
pub mod types;
pub mod workdir;
