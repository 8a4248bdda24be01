//! File-based bug tickets. A ticket's existence is the signal.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::selector::{is_ticket_name, next_ticket};

pub use crate::core::selector::{ORPHAN_PROJECTS_TICKET, STALE_PLAN_TICKET};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A ticket removed from the board for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub name: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct TicketBoard {
    dir: PathBuf,
}

impl TicketBoard {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create `name` with `body` unless it already exists.
    ///
    /// Returns false (leaving the first content untouched) when the ticket is
    /// already open. The body is written to a temp file and hard-linked into
    /// place, so the check and the publish are one atomic step.
    pub fn create(&self, name: &str, body: &str) -> Result<bool> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create bugs directory {}", self.dir.display()))?;
        let path = self.dir.join(name);
        let tmp_path = self.dir.join(format!(
            ".{name}.{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp_path, body)
            .with_context(|| format!("write temp ticket {}", tmp_path.display()))?;

        let linked = fs::hard_link(&tmp_path, &path);
        let _ = fs::remove_file(&tmp_path);
        match linked {
            Ok(()) => {
                info!(ticket = name, "bug ticket created");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                debug!(ticket = name, "bug ticket already open");
                Ok(false)
            }
            Err(err) => Err(err).with_context(|| format!("publish ticket {}", path.display())),
        }
    }

    /// Open ticket names, sorted.
    pub fn list_names(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("read bugs directory {}", self.dir.display()));
            }
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.context("read bugs entry")?;
            if !entry.file_type().is_ok_and(|kind| kind.is_file()) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && is_ticket_name(name)
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove and return the highest-priority open ticket.
    pub fn take_next(&self) -> Result<Option<Ticket>> {
        let names = self.list_names()?;
        let Some(name) = next_ticket(names.iter().map(String::as_str)) else {
            return Ok(None);
        };
        let path = self.dir.join(name);
        let body = match fs::read_to_string(&path) {
            Ok(body) => body,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).with_context(|| format!("read ticket {}", path.display())),
        };
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("remove ticket {}", path.display()));
            }
        }
        debug!(ticket = name, "bug ticket taken");
        Ok(Some(Ticket {
            name: name.to_string(),
            body,
        }))
    }
}
