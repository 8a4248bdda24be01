//! Deterministic selection of the next plan and the next bug ticket.

/// Ticket raised when queued plans sit unprocessed for too long.
pub const STALE_PLAN_TICKET: &str = "stale_plan.md";
/// Ticket raised when output directories are missing from the manifest.
pub const ORPHAN_PROJECTS_TICKET: &str = "orphan_projects.md";

const PLAN_PREFIX: &str = "plan_";
const PLAN_SUFFIX: &str = ".json";

/// True for `plan_<digits>.json`.
pub fn is_plan_file_name(name: &str) -> bool {
    plan_stem(name).is_some()
}

/// `plan_<digits>` for a recognized plan file name.
pub fn plan_stem(name: &str) -> Option<&str> {
    let stem = name.strip_suffix(PLAN_SUFFIX)?;
    let digits = stem.strip_prefix(PLAN_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(stem)
}

/// Lexicographically first recognized plan file name.
///
/// Plan names embed epoch milliseconds, which have a constant digit count for
/// any realistic clock, so lexicographic order is submission order.
pub fn oldest_plan<'a, I>(names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    names.into_iter().filter(|name| is_plan_file_name(name)).min()
}

/// True for files the autonomous planner should treat as tickets.
pub fn is_ticket_name(name: &str) -> bool {
    !name.starts_with('.') && !name.ends_with(".tmp")
}

fn ticket_priority(name: &str) -> u8 {
    match name {
        STALE_PLAN_TICKET => 0,
        ORPHAN_PROJECTS_TICKET => 1,
        _ => 2,
    }
}

/// Highest-priority ticket: stale plans, then orphans, then the rest by name.
pub fn next_ticket<'a, I>(names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .filter(|name| is_ticket_name(name))
        .min_by_key(|name| (ticket_priority(name), *name))
}

/// Ticket kind without its extension (`stale_plan.md` -> `stale_plan`).
pub fn ticket_kind(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(kind, _)| kind)
}
