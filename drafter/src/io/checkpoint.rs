//! Persisted run checkpoints, keyed by run id.
//!
//! A checkpoint is rewritten after every step, so an interrupted run can be
//! resumed by a later process from `.drafter/runs/<run_id>/checkpoint.json`.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::interrupt::InterruptPayload;
use crate::core::node::NodeId;
use crate::core::types::RunState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    AwaitingInput,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::AwaitingInput => "awaiting_input",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Snapshot of a run between two steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    pub status: RunStatus,
    pub state: RunState,
    /// Node to execute next; `None` once the run has ended.
    pub next: Option<NodeId>,
    /// Payload shown to the human while `status` is `awaiting_input`.
    pub pending: Option<InterruptPayload>,
    /// Steps executed over the whole run, across resumes.
    pub steps_taken: u32,
    /// Failure message when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Checkpoint {
    pub fn new(run_id: impl Into<String>, state: RunState) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Running,
            state,
            next: Some(NodeId::ENTRY),
            pending: None,
            steps_taken: 0,
            error: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Storage for checkpoints and the per-run event log.
pub trait CheckpointStore {
    fn load(&self, run_id: &str) -> Result<Option<Checkpoint>>;

    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Append one JSON event to the run's log. Stores without a log ignore it.
    fn append_event(&self, _run_id: &str, _event: &serde_json::Value) -> Result<()> {
        Ok(())
    }
}

impl<T: CheckpointStore + ?Sized> CheckpointStore for &T {
    fn load(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        (**self).load(run_id)
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        (**self).save(checkpoint)
    }

    fn append_event(&self, run_id: &str, event: &serde_json::Value) -> Result<()> {
        (**self).append_event(run_id, event)
    }
}

/// Validate that a run id is safe to use as a directory name.
pub fn validate_run_id(run_id: &str) -> Result<()> {
    if run_id.is_empty() {
        return Err(anyhow!("run id must not be empty"));
    }
    if run_id.starts_with('.') {
        return Err(anyhow!("run id must not start with '.'"));
    }
    if run_id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(anyhow!("run id must be [A-Za-z0-9._-] only (got '{run_id}')"));
    }
    Ok(())
}

/// On-disk locations under a working directory.
#[derive(Debug, Clone)]
pub struct DrafterPaths {
    root: PathBuf,
}

impl DrafterPaths {
    pub fn new(workdir: &Path) -> Self {
        Self {
            root: workdir.join(".drafter"),
        }
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join("runs").join(run_id)
    }

    pub fn checkpoint(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("checkpoint.json")
    }

    pub fn events(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("events.jsonl")
    }
}

/// Checkpoints as pretty JSON files plus an `events.jsonl` log per run.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    paths: DrafterPaths,
}

impl FileCheckpointStore {
    pub fn new(workdir: &Path) -> Self {
        Self {
            paths: DrafterPaths::new(workdir),
        }
    }

    pub fn paths(&self) -> &DrafterPaths {
        &self.paths
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        validate_run_id(run_id)?;
        let path = self.paths.checkpoint(run_id);
        if !path.exists() {
            return Ok(None);
        }
        debug!(path = %path.display(), "loading checkpoint");
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read checkpoint {}", path.display()))?;
        let checkpoint = serde_json::from_str(&contents)
            .with_context(|| format!("parse checkpoint {}", path.display()))?;
        Ok(Some(checkpoint))
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        validate_run_id(&checkpoint.run_id)?;
        let path = self.paths.checkpoint(&checkpoint.run_id);
        debug!(
            path = %path.display(),
            status = checkpoint.status.as_str(),
            next = ?checkpoint.next,
            "writing checkpoint"
        );
        let mut buf = serde_json::to_string_pretty(checkpoint)?;
        buf.push('\n');
        write_atomic(&path, &buf)
    }

    fn append_event(&self, run_id: &str, event: &serde_json::Value) -> Result<()> {
        validate_run_id(run_id)?;
        let path = self.paths.events(run_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open event log {}", path.display()))?;
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .with_context(|| format!("append event log {}", path.display()))
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("checkpoint path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp checkpoint {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace checkpoint {}", path.display()))?;
    Ok(())
}

/// In-process store for tests and single-process drivers.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
    events: Mutex<HashMap<String, Vec<serde_json::Value>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events appended for `run_id`, oldest first.
    pub fn events(&self, run_id: &str) -> Vec<serde_json::Value> {
        self.events
            .lock()
            .map(|events| events.get(run_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let checkpoints = self
            .checkpoints
            .lock()
            .map_err(|_| anyhow!("checkpoint store lock poisoned"))?;
        Ok(checkpoints.get(run_id).cloned())
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut checkpoints = self
            .checkpoints
            .lock()
            .map_err(|_| anyhow!("checkpoint store lock poisoned"))?;
        checkpoints.insert(checkpoint.run_id.clone(), checkpoint.clone());
        Ok(())
    }

    fn append_event(&self, run_id: &str, event: &serde_json::Value) -> Result<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        events.entry(run_id.to_string()).or_default().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::state_with_sections;

    fn awaiting(run_id: &str) -> Checkpoint {
        let state = state_with_sections(2);
        Checkpoint {
            status: RunStatus::AwaitingInput,
            next: Some(NodeId::HumanBlogFeedback),
            pending: Some(InterruptPayload::HumanBlogFeedback {
                sections: state.sections.clone(),
                blog_structuring_version: 1,
                message: "review".to_string(),
            }),
            steps_taken: 2,
            ..Checkpoint::new(run_id, state)
        }
    }

    #[test]
    fn file_store_round_trips_checkpoint() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileCheckpointStore::new(temp.path());
        assert!(store.load("run-1").expect("load").is_none());

        let checkpoint = awaiting("run-1");
        store.save(&checkpoint).expect("save");
        assert_eq!(store.load("run-1").expect("load"), Some(checkpoint));
        assert!(temp.path().join(".drafter/runs/run-1/checkpoint.json").is_file());
        assert!(!temp.path().join(".drafter/runs/run-1/checkpoint.json.tmp").exists());
    }

    #[test]
    fn checkpoint_json_tags_pending_payload_by_node() {
        let value = serde_json::to_value(awaiting("run-1")).expect("serialize");
        assert_eq!(value["status"], "awaiting_input");
        assert_eq!(value["next"], "human_blog_feedback");
        assert_eq!(value["pending"]["current_node"], "human_blog_feedback");
        assert_eq!(value["pending"]["blog_structuring_version"], 1);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn file_store_appends_events_as_json_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileCheckpointStore::new(temp.path());
        store
            .append_event("run-1", &serde_json::json!({"event": "update"}))
            .expect("append");
        store
            .append_event("run-1", &serde_json::json!({"event": "interrupt"}))
            .expect("append");
        let log = fs::read_to_string(store.paths().events("run-1")).expect("read");
        assert_eq!(log, "{\"event\":\"update\"}\n{\"event\":\"interrupt\"}\n");
    }

    #[test]
    fn rejects_path_like_run_ids() {
        assert!(validate_run_id("../escape").is_err());
        assert!(validate_run_id("a/b").is_err());
        assert!(validate_run_id("").is_err());
        assert!(validate_run_id(".hidden").is_err());
        validate_run_id("7f9c2ba4-e88f-11ee-a5f2-0242ac120002").expect("uuid is valid");
    }

    #[test]
    fn memory_store_keeps_latest_checkpoint_per_run() {
        let store = MemoryCheckpointStore::new();
        let mut checkpoint = awaiting("run-1");
        store.save(&checkpoint).expect("save");
        checkpoint.status = RunStatus::Completed;
        checkpoint.next = None;
        checkpoint.pending = None;
        store.save(&checkpoint).expect("save");
        let loaded = store.load("run-1").expect("load").expect("present");
        assert!(loaded.is_complete());
        assert!(store.load("run-2").expect("load").is_none());
    }
}
