//! Directory-backed FIFO of pending plans.
//!
//! Each plan is `plan_<epoch_millis>.json`, written via temp file + rename so
//! consumers never observe a partial document. A sibling `plan_<millis>.ready`
//! marker signals that the producer is done with it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::invariants::validate_plan;
use crate::core::selector::{is_plan_file_name, oldest_plan, plan_stem};
use crate::core::types::Plan;
use crate::error::PlanRejected;

const PLAN_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/plan/v1.schema.json"
));

/// Last stamp handed out in this process; keeps names strictly increasing.
static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// A plan file present in the queue directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPlan {
    pub name: String,
    pub path: PathBuf,
}

impl QueuedPlan {
    /// `plan_<millis>`, used to name the plan's report.
    pub fn stem(&self) -> &str {
        plan_stem(&self.name).unwrap_or(&self.name)
    }
}

pub struct PlanQueue {
    dir: PathBuf,
    require_ready_marker: bool,
    validator: Validator,
}

impl PlanQueue {
    pub fn new(dir: impl Into<PathBuf>, require_ready_marker: bool) -> Result<Self> {
        let schema: Value = serde_json::from_str(PLAN_SCHEMA).context("parse plan schema")?;
        let validator =
            validator_for(&schema).map_err(|err| anyhow!("invalid plan schema: {}", err))?;
        Ok(Self {
            dir: dir.into(),
            require_ready_marker,
            validator,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Parse and validate a plan document without queueing it.
    pub fn parse(&self, plan_json: &str) -> Result<Plan> {
        let value: Value = serde_json::from_str(plan_json).map_err(|err| {
            anyhow::Error::new(PlanRejected {
                reasons: vec![format!("invalid JSON: {err}")],
            })
        })?;
        self.validate_value(&value)
    }

    /// Schema + semantic validation of a plan document.
    pub fn validate_value(&self, value: &Value) -> Result<Plan> {
        if !self.validator.is_valid(value) {
            let reasons = self
                .validator
                .iter_errors(value)
                .map(|err| err.to_string())
                .collect();
            return Err(PlanRejected { reasons }.into());
        }
        let plan: Plan = serde_json::from_value(value.clone()).map_err(|err| {
            anyhow::Error::new(PlanRejected {
                reasons: vec![err.to_string()],
            })
        })?;
        let reasons = validate_plan(&plan);
        if !reasons.is_empty() {
            return Err(PlanRejected { reasons }.into());
        }
        Ok(plan)
    }

    /// Validate, write, and mark ready. Returns the plan file name.
    pub fn enqueue(&self, plan_json: &str) -> Result<String> {
        let plan = self.parse(plan_json)?;
        self.publish(&plan)
    }

    /// Validate an in-memory plan, write it, and mark it ready.
    pub fn enqueue_plan(&self, plan: &Plan) -> Result<String> {
        let value = serde_json::to_value(plan).context("serialize plan")?;
        let plan = self.validate_value(&value)?;
        self.publish(&plan)
    }

    fn publish(&self, plan: &Plan) -> Result<String> {
        let name = self.stage(plan)?;
        self.mark_ready(&name)?;
        info!(plan = %name, project_id = %plan.project_id, tasks = plan.action_plan.len(), "plan enqueued");
        Ok(name)
    }

    /// Write `plan` under a fresh name without marking it ready.
    #[instrument(skip_all, fields(dir = %self.dir.display()))]
    pub fn stage(&self, plan: &Plan) -> Result<String> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create queue directory {}", self.dir.display()))?;

        let mut buf = serde_json::to_string_pretty(plan).context("serialize plan")?;
        buf.push('\n');

        loop {
            let name = format!("plan_{}.json", next_stamp());
            let path = self.dir.join(&name);
            if path.exists() {
                continue;
            }
            let tmp_path = self.dir.join(format!(".{name}.tmp"));
            fs::write(&tmp_path, &buf)
                .with_context(|| format!("write temp plan {}", tmp_path.display()))?;
            fs::rename(&tmp_path, &path)
                .with_context(|| format!("publish plan {}", path.display()))?;
            debug!(plan = %name, "plan staged");
            return Ok(name);
        }
    }

    /// Create the empty completion marker for `name`.
    pub fn mark_ready(&self, name: &str) -> Result<()> {
        let marker = self.marker_path(name)?;
        fs::write(&marker, b"").with_context(|| format!("write marker {}", marker.display()))
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.marker_path(name).is_ok_and(|marker| marker.exists())
    }

    /// Oldest plan eligible for execution, if any.
    pub fn peek_oldest(&self) -> Result<Option<QueuedPlan>> {
        let names = self.list()?;
        let eligible = names
            .iter()
            .map(String::as_str)
            .filter(|name| !self.require_ready_marker || self.is_ready(name));
        Ok(oldest_plan(eligible).map(|name| QueuedPlan {
            name: name.to_string(),
            path: self.dir.join(name),
        }))
    }

    /// Read and validate a queued plan.
    pub fn load(&self, queued: &QueuedPlan) -> Result<Plan> {
        let contents = fs::read_to_string(&queued.path)
            .with_context(|| format!("read plan {}", queued.path.display()))?;
        self.parse(&contents)
            .with_context(|| format!("load plan {}", queued.name))
    }

    /// Delete a plan and its marker. Missing files are not an error.
    pub fn remove(&self, name: &str) -> Result<()> {
        remove_if_exists(&self.dir.join(name))?;
        if let Ok(marker) = self.marker_path(name) {
            remove_if_exists(&marker)?;
        }
        debug!(plan = %name, "plan removed");
        Ok(())
    }

    /// Recognized plan file names in submission order (ready or not).
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("read queue directory {}", self.dir.display()));
            }
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.context("read queue entry")?;
            if let Some(name) = entry.file_name().to_str()
                && is_plan_file_name(name)
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Plan names with their last modification time.
    pub fn plan_ages(&self) -> Result<Vec<(String, SystemTime)>> {
        let mut ages = Vec::new();
        for name in self.list()? {
            let path = self.dir.join(&name);
            match fs::metadata(&path).and_then(|meta| meta.modified()) {
                Ok(modified) => ages.push((name, modified)),
                // Consumed between listing and stat.
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("stat plan {}", path.display()));
                }
            }
        }
        Ok(ages)
    }

    fn marker_path(&self, name: &str) -> Result<PathBuf> {
        let stem = plan_stem(name).ok_or_else(|| anyhow!("not a plan file name: {name}"))?;
        Ok(self.dir.join(format!("{stem}.ready")))
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

/// Epoch milliseconds, bumped past the last stamp handed out.
fn next_stamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64);
    let previous = LAST_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    now.max(previous + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Task;

    fn plan(project_id: &str) -> Plan {
        Plan {
            project_id: project_id.to_string(),
            description: "d".to_string(),
            action_plan: vec![Task {
                agent: "backend_dev".to_string(),
                task: "write".to_string(),
                target_file: Some("main.py".to_string()),
                command: None,
            }],
        }
    }

    fn queue(dir: &Path) -> PlanQueue {
        PlanQueue::new(dir.join("queue"), true).expect("queue")
    }

    #[test]
    fn preserves_submission_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let queue = queue(temp.path());
        let names: Vec<String> = ["a", "b", "c", "d"]
            .iter()
            .map(|id| queue.enqueue_plan(&plan(id)).expect("enqueue"))
            .collect();

        assert_eq!(queue.list().expect("list"), names);
        let mut consumed = Vec::new();
        while let Some(next) = queue.peek_oldest().expect("peek") {
            consumed.push(queue.load(&next).expect("load").project_id);
            queue.remove(&next.name).expect("remove");
        }
        assert_eq!(consumed, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn names_strictly_increase() {
        let first = next_stamp();
        let second = next_stamp();
        assert!(second > first);
    }

    #[test]
    fn rejects_empty_action_plan() {
        let temp = tempfile::tempdir().expect("tempdir");
        let queue = queue(temp.path());
        let err = queue
            .enqueue(r#"{"project_id": "demo", "action_plan": []}"#)
            .unwrap_err();
        assert!(err.downcast_ref::<PlanRejected>().is_some());
        assert!(queue.list().expect("list").is_empty());
    }

    #[test]
    fn rejects_invalid_json_and_schema_violations() {
        let temp = tempfile::tempdir().expect("tempdir");
        let queue = queue(temp.path());
        for doc in [
            "not json",
            r#"{"action_plan": [{"agent": "x"}]}"#,
            r#"{"project_id": "demo", "action_plan": [{"task": "no agent"}]}"#,
            r#"{"project_id": "  ", "action_plan": [{"agent": "x"}]}"#,
        ] {
            let err = queue.enqueue(doc).unwrap_err();
            assert!(err.downcast_ref::<PlanRejected>().is_some(), "{doc}");
        }
    }

    #[test]
    fn staged_plan_waits_for_marker() {
        let temp = tempfile::tempdir().expect("tempdir");
        let queue = queue(temp.path());
        let name = queue.stage(&plan("demo")).expect("stage");
        assert_eq!(queue.peek_oldest().expect("peek"), None);

        queue.mark_ready(&name).expect("mark");
        let next = queue.peek_oldest().expect("peek").expect("ready plan");
        assert_eq!(next.name, name);
        assert_eq!(next.stem(), name.trim_end_matches(".json"));
    }

    #[test]
    fn marker_not_required_when_disabled() {
        let temp = tempfile::tempdir().expect("tempdir");
        let queue = PlanQueue::new(temp.path(), false).expect("queue");
        let name = queue.stage(&plan("demo")).expect("stage");
        assert_eq!(queue.peek_oldest().expect("peek").map(|q| q.name), Some(name));
    }

    #[test]
    fn remove_tolerates_missing_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let queue = queue(temp.path());
        let name = queue.enqueue_plan(&plan("demo")).expect("enqueue");
        queue.remove(&name).expect("remove");
        queue.remove(&name).expect("remove again");
        assert!(!queue.dir().join(&name).exists());
        assert!(!queue.is_ready(&name));
    }

    #[test]
    fn ignores_foreign_and_temp_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let queue = queue(temp.path());
        fs::create_dir_all(queue.dir()).expect("mkdir");
        fs::write(queue.dir().join(".plan_1.json.tmp"), "{}").expect("write");
        fs::write(queue.dir().join("notes.txt"), "x").expect("write");
        assert!(queue.list().expect("list").is_empty());
        assert_eq!(queue.peek_oldest().expect("peek"), None);
    }

    #[test]
    fn missing_directory_is_an_empty_queue() {
        let temp = tempfile::tempdir().expect("tempdir");
        let queue = queue(temp.path());
        assert!(queue.list().expect("list").is_empty());
        assert!(queue.plan_ages().expect("ages").is_empty());
    }
}
