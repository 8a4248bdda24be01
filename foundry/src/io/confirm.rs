//! Confirmation of commands the safety classifier flagged.

use tracing::warn;

/// Asks someone (or something) whether a flagged command may run.
pub trait Confirmer: Send + Sync {
    /// Return true to run `command` despite `reason`.
    fn confirm(&self, command: &str, reason: &str) -> bool;
}

/// Declines everything. Used when nobody is at the console.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl Confirmer for DenyAll {
    fn confirm(&self, command: &str, reason: &str) -> bool {
        warn!(command, reason, "declining flagged command (no interactive confirmation)");
        false
    }
}

/// Approves everything. Only for explicit opt-in such as `--assume-yes`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApproveAll;

impl Confirmer for ApproveAll {
    fn confirm(&self, command: &str, reason: &str) -> bool {
        warn!(command, reason, "approving flagged command (assume-yes)");
        true
    }
}

/// True for an affirmative console answer (`y` / `yes`, any case).
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
