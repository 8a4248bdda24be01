//! Stable exit codes for foundry CLI commands.

/// Command succeeded (every drained plan completed, or the command was safe).
pub const OK: i32 = 0;
/// Invalid config, workspace, plan file, or any other error.
pub const INVALID: i32 = 1;
/// `foundry drain` processed at least one plan that ended FAILED.
pub const PLAN_FAILED: i32 = 2;
/// `foundry classify` flagged the command.
pub const NEEDS_CONFIRMATION: i32 = 3;
