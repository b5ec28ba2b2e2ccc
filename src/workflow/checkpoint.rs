//! Checkpoints and checkpoint stores
//!
//! Step 0 holds the initial state; every node execution appends the next
//! step. Stores accept steps strictly in order, so the sequence for a run is
//! always gap-free.

use crate::errors::{Result, WorkflowError};
use crate::types::{RunState, StateUpdate};
use crate::workflow::node::NodeKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Committed step of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    pub step: u64,
    /// Node that produced this step; `None` for the initial state
    pub node: Option<NodeKind>,
    /// Update applied to the previous step's state
    pub update: StateUpdate,
    /// State after the update
    pub state: RunState,
}

impl Checkpoint {
    /// Step 0 of a new run
    pub fn initial(state: RunState) -> Self {
        Self {
            run_id: state.run_id.clone(),
            step: state.step,
            node: None,
            update: StateUpdate::new(),
            state,
        }
    }

    pub fn after_node(node: NodeKind, update: StateUpdate, state: RunState) -> Self {
        Self {
            run_id: state.run_id.clone(),
            step: state.step,
            node: Some(node),
            update,
            state,
        }
    }
}

/// Durable checkpoint persistence
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint atomically; `step` must follow the latest stored step
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Latest committed checkpoint of a run, if any
    async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint>>;

    /// Every checkpoint of a run, in step order
    async fn load_all(&self, run_id: &str) -> Result<Vec<Checkpoint>>;
}

/// Fold the recorded updates over step 0
///
/// Fails on gaps or when a recorded state disagrees with the replayed one.
pub fn replay(checkpoints: &[Checkpoint]) -> Result<RunState> {
    let (first, rest) = checkpoints
        .split_first()
        .ok_or_else(|| WorkflowError::Checkpoint("nothing to replay".to_string()))?;
    if first.step != 0 {
        return Err(WorkflowError::Checkpoint(format!(
            "replay must start at step 0, found step {}",
            first.step
        )));
    }

    let mut state = first.state.clone();
    for checkpoint in rest {
        if checkpoint.step != state.step + 1 {
            return Err(WorkflowError::Checkpoint(format!(
                "gap in checkpoints: step {} follows step {}",
                checkpoint.step, state.step
            )));
        }

        state = state.advance(&checkpoint.update, checkpoint.state.next_node)?;
        if state != checkpoint.state {
            return Err(WorkflowError::Logic(format!(
                "replayed state diverges from checkpoint at step {}",
                checkpoint.step
            )));
        }
    }

    Ok(state)
}

fn expect_next_step(run_id: &str, latest: Option<u64>, step: u64) -> Result<()> {
    let expected = latest.map(|s| s + 1).unwrap_or(0);
    if step != expected {
        return Err(WorkflowError::Logic(format!(
            "checkpoint for run {} out of order: got step {}, expected {}",
            run_id, step, expected
        )));
    }
    Ok(())
}

/// Process-local store keeping serialized checkpoints per run
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    runs: Mutex<HashMap<String, Vec<String>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints stored for a run
    pub fn len(&self, run_id: &str) -> usize {
        self.runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(run_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Drop every checkpoint after `step`, simulating a crash that lost them
    pub fn truncate_after(&self, run_id: &str, step: u64) {
        if let Some(entries) = self
            .runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_mut(run_id)
        {
            entries.truncate(step as usize + 1);
        }
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let json = serde_json::to_string(checkpoint)?;
        let mut runs = self
            .runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entries = runs.entry(checkpoint.run_id.clone()).or_default();

        let latest = entries.len().checked_sub(1).map(|s| s as u64);
        expect_next_step(&checkpoint.run_id, latest, checkpoint.step)?;
        entries.push(json);
        Ok(())
    }

    async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let runs = self
            .runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match runs.get(run_id).and_then(|entries| entries.last()) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    async fn load_all(&self, run_id: &str) -> Result<Vec<Checkpoint>> {
        let runs = self
            .runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut checkpoints = Vec::new();
        for json in runs.get(run_id).into_iter().flatten() {
            checkpoints.push(serde_json::from_str(json)?);
        }
        Ok(checkpoints)
    }
}

/// One JSON file per step under `<root>/<run_id>/`
///
/// Files are written to a temporary name, synced and renamed into place, so a
/// crash never leaves a partially written checkpoint behind. The run directory
/// is synced after the rename, so step N is durable before step N+1 is written.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.agentflow/checkpoints`
    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            WorkflowError::Checkpoint("could not determine home directory".to_string())
        })?;
        Ok(Self::new(home.join(".agentflow").join("checkpoints")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        let valid = !run_id.is_empty()
            && run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(WorkflowError::Validation(format!(
                "run id '{}' is not usable as a directory name",
                run_id
            )));
        }
        Ok(self.root.join(run_id))
    }

    fn file_name(step: u64) -> String {
        format!("step_{:010}.json", step)
    }

    fn parse_step(name: &str) -> Option<u64> {
        name.strip_prefix("step_")?
            .strip_suffix(".json")?
            .parse()
            .ok()
    }

    /// Stored steps of a run, ascending
    async fn steps(&self, run_id: &str) -> Result<Vec<u64>> {
        let dir = self.run_dir(run_id)?;
        if !fs::try_exists(&dir).await.map_err(io_error)? {
            return Ok(Vec::new());
        }

        let mut steps = Vec::new();
        let mut entries = fs::read_dir(&dir).await.map_err(io_error)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            if let Some(step) = entry.file_name().to_str().and_then(Self::parse_step) {
                steps.push(step);
            }
        }
        steps.sort_unstable();
        Ok(steps)
    }

    async fn read(&self, run_id: &str, step: u64) -> Result<Checkpoint> {
        let path = self.run_dir(run_id)?.join(Self::file_name(step));
        let json = fs::read_to_string(&path).await.map_err(io_error)?;
        Ok(serde_json::from_str(&json)?)
    }
}

fn io_error(err: std::io::Error) -> WorkflowError {
    WorkflowError::Checkpoint(err.to_string())
}

/// Flush directory entries (creates, renames) to disk
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<()> {
    let handle = fs::File::open(dir).await.map_err(io_error)?;
    handle.sync_all().await.map_err(io_error)
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let dir = self.run_dir(&checkpoint.run_id)?;
        let latest = self.steps(&checkpoint.run_id).await?.last().copied();
        expect_next_step(&checkpoint.run_id, latest, checkpoint.step)?;

        let created = !fs::try_exists(&dir).await.map_err(io_error)?;
        fs::create_dir_all(&dir).await.map_err(io_error)?;
        if created {
            sync_dir(&self.root).await?;
        }

        let json = serde_json::to_string_pretty(checkpoint)?;
        let final_path = dir.join(Self::file_name(checkpoint.step));
        let temp_path = dir.join(format!(".{}.tmp", Self::file_name(checkpoint.step)));

        let mut file = fs::File::create(&temp_path).await.map_err(io_error)?;
        file.write_all(json.as_bytes()).await.map_err(io_error)?;
        file.sync_all().await.map_err(io_error)?;
        drop(file);
        fs::rename(&temp_path, &final_path).await.map_err(io_error)?;
        sync_dir(&dir).await?;

        debug!(run_id = %checkpoint.run_id, step = checkpoint.step, path = %final_path.display(), "checkpoint written");
        Ok(())
    }

    async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        match self.steps(run_id).await?.last() {
            Some(&step) => Ok(Some(self.read(run_id, step).await?)),
            None => Ok(None),
        }
    }

    async fn load_all(&self, run_id: &str) -> Result<Vec<Checkpoint>> {
        let mut checkpoints = Vec::new();
        for step in self.steps(run_id).await? {
            checkpoints.push(self.read(run_id, step).await?);
        }
        Ok(checkpoints)
    }
}
