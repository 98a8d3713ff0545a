// Copyright (c) 2025 Orchestrator Core Team
// SPDX-License-Identifier: Apache-2.0

//! Persistent filesystem-backed store of workflow runs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::StateStoreError;
use crate::state::{RunSummary, WorkflowState};

/// Replace every character outside `[A-Za-z0-9_-]` with `_`. Operates on `char`s,
/// so multibyte characters count as one unit each.
pub fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// A persistent key-value store of workflow runs. The only implementation shipped
/// is `FilesystemStateStore`; the trait exists so alternative backends could be
/// substituted without touching the engine.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save(&self, state: &WorkflowState) -> Result<(), StateStoreError>;
    async fn load(&self, id: &str) -> Result<WorkflowState, StateStoreError>;
    async fn list(&self) -> Result<Vec<RunSummary>, StateStoreError>;
    async fn delete(&self, id: &str) -> Result<(), StateStoreError>;

    /// Convenience: the most recently updated run, or `None` if the store is empty.
    async fn latest_run(&self) -> Result<Option<WorkflowState>, StateStoreError> {
        let mut summaries = self.list().await?;
        if summaries.is_empty() {
            return Ok(None);
        }
        let first = summaries.remove(0);
        Ok(Some(self.load(&first.id).await?))
    }
}

/// A `StateStore` backed by one JSON file per run in a single directory.
pub struct FilesystemStateStore {
    dir: PathBuf,
}

impl FilesystemStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_id(id)))
    }

    fn tmp_path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json.tmp", sanitize_id(id)))
    }

    async fn read_summary(path: &Path) -> Option<RunSummary> {
        let content = fs::read_to_string(path).await.ok()?;
        let state: WorkflowState = serde_json::from_str(&content).ok()?;
        Some(state.to_summary())
    }
}

#[async_trait]
impl StateStore for FilesystemStateStore {
    /// Serialise `state`, write it to a `.tmp` sibling, fsync, then rename over the
    /// final path. The rename is the commit point: a crash before it leaves the
    /// previous file (if any) intact.
    async fn save(&self, state: &WorkflowState) -> Result<(), StateStoreError> {
        fs::create_dir_all(&self.dir).await?;

        let final_path = self.path_for(&state.id);
        let tmp_path = self.tmp_path_for(&state.id);
        let json = serde_json::to_string_pretty(state)?;

        {
            use tokio::io::AsyncWriteExt;
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
        }

        fs::rename(&tmp_path, &final_path).await?;
        debug!(run_id = %state.id, path = %final_path.display(), "saved run checkpoint");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<WorkflowState, StateStoreError> {
        let path = self.path_for(id);
        let content = fs::read_to_string(&path)
            .await
            .map_err(|_| StateStoreError::NotFound(id.to_string()))?;
        serde_json::from_str(&content).map_err(|source| StateStoreError::Corrupt { id: id.to_string(), source })
    }

    async fn list(&self) -> Result<Vec<RunSummary>, StateStoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if !name.ends_with(".json") {
                continue;
            }
            match Self::read_summary(&path).await {
                Some(summary) => summaries.push(summary),
                None => warn!(path = %path.display(), "skipping unreadable or corrupt run file"),
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn delete(&self, id: &str) -> Result<(), StateStoreError> {
        let path = self.path_for(id);
        fs::remove_file(&path).await.map_err(|_| StateStoreError::NotFound(id.to_string()))
    }
}
