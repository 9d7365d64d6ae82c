//! Snapshot persistence for the context manager: whole-manager snapshots
//! plus per-iteration files, atomic write-temp-then-rename, backups
//! capped and pruned oldest-first.
//!
//! Open Question #1 (recovery precedence when only one artefact is
//! present): resolved in `DESIGN.md` as "prefer the whole-manager snapshot;
//! fall back to reconstructing from per-iteration files when it's absent
//! or corrupt".

use crate::errors::{LoopError, Result};
use crate::model::ExecutionContext;
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Encoding selected at construction; JSON for portability/inspectability,
/// binary for size when history gets large.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceFormat {
    Json,
    Binary,
}

pub struct PersistenceManager {
    save_dir: PathBuf,
    format: PersistenceFormat,
    max_backups: usize,
}

const SNAPSHOT_BASENAME: &str = "context_manager";

impl PersistenceManager {
    pub fn new(save_dir: impl Into<PathBuf>, format: PersistenceFormat, max_backups: usize) -> Self {
        Self { save_dir: save_dir.into(), format, max_backups: max_backups.max(1) }
    }

    fn snapshot_extension(&self) -> &'static str {
        match self.format {
            PersistenceFormat::Json => "json",
            PersistenceFormat::Binary => "bin",
        }
    }

    fn snapshot_path(&self) -> PathBuf {
        self.save_dir.join(format!("{SNAPSHOT_BASENAME}.{}", self.snapshot_extension()))
    }

    fn iteration_path(&self, loop_id: &str) -> PathBuf {
        self.save_dir.join(format!("loop_{loop_id}.{}", self.snapshot_extension()))
    }

    fn backup_suffix(&self) -> String {
        format!(".{}.bak", self.snapshot_extension())
    }

    fn backup_path(&self, stamp: &str) -> PathBuf {
        self.save_dir.join(format!("{SNAPSHOT_BASENAME}.{stamp}{}", self.backup_suffix()))
    }

    fn encode(&self, history: &[ExecutionContext]) -> Result<Vec<u8>> {
        match self.format {
            PersistenceFormat::Json => serde_json::to_vec_pretty(history).map_err(|e| LoopError::PersistenceError(e.to_string())),
            PersistenceFormat::Binary => bincode::serialize(history).map_err(|e| LoopError::PersistenceError(e.to_string())),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<ExecutionContext>> {
        match self.format {
            PersistenceFormat::Json => serde_json::from_slice(bytes).map_err(|e| LoopError::PersistenceError(e.to_string())),
            PersistenceFormat::Binary => bincode::deserialize(bytes).map_err(|e| LoopError::PersistenceError(e.to_string())),
        }
    }

    /// Writes the whole-manager snapshot atomically: encode, write to a
    /// sibling temp file, then rename over the real path. A crash between
    /// those two steps leaves the previous snapshot intact.
    pub async fn save_snapshot(&self, history: &[ExecutionContext]) -> Result<()> {
        tokio::fs::create_dir_all(&self.save_dir).await?;
        self.rotate_current_snapshot_to_backup().await?;

        let bytes = self.encode(history)?;
        let final_path = self.snapshot_path();
        let tmp_path = final_path.with_extension(format!("{}.tmp", self.snapshot_extension()));

        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        self.prune_backups().await?;
        Ok(())
    }

    /// Moves the current live snapshot (if any) aside into a
    /// timestamp-stamped backup before it gets overwritten, so
    /// `prune_backups` has something to rotate.
    async fn rotate_current_snapshot_to_backup(&self) -> Result<()> {
        let current = self.snapshot_path();
        if tokio::fs::try_exists(&current).await.unwrap_or(false) {
            let stamp = Utc::now().format("%Y%m%dT%H%M%S%.f").to_string();
            tokio::fs::rename(&current, self.backup_path(&stamp)).await?;
        }
        Ok(())
    }

    /// A corrupt or missing snapshot is surfaced as an error; callers must
    /// leave in-memory state untouched rather than clearing it on failure.
    pub async fn load_snapshot(&self) -> Result<Vec<ExecutionContext>> {
        let path = self.snapshot_path();
        let bytes = tokio::fs::read(&path).await.map_err(LoopError::Io)?;
        self.decode(&bytes)
    }

    pub async fn save_iteration(&self, ctx: &ExecutionContext) -> Result<()> {
        tokio::fs::create_dir_all(&self.save_dir).await?;
        let bytes = match self.format {
            PersistenceFormat::Json => serde_json::to_vec_pretty(ctx).map_err(|e| LoopError::PersistenceError(e.to_string()))?,
            PersistenceFormat::Binary => bincode::serialize(ctx).map_err(|e| LoopError::PersistenceError(e.to_string()))?,
        };
        let final_path = self.iteration_path(&ctx.loop_id);
        let tmp_path = final_path.with_extension(format!("{}.tmp", self.snapshot_extension()));
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    /// Loads the whole-manager snapshot if present and valid; otherwise
    /// reconstructs from whatever per-iteration files exist, sorted by
    /// the embedded `loop_index`.
    pub async fn load(&self) -> Result<Vec<ExecutionContext>> {
        match self.load_snapshot().await {
            Ok(history) => Ok(history),
            Err(_) => self.reconstruct_from_iterations().await,
        }
    }

    async fn reconstruct_from_iterations(&self) -> Result<Vec<ExecutionContext>> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.save_dir).await {
            Ok(dir) => dir,
            Err(_) => return Ok(Vec::new()),
        };

        while let Some(entry) = dir.next_entry().await.map_err(LoopError::Io)? {
            let path = entry.path();
            let is_iteration_file = path.file_name().and_then(|n| n.to_str()).map(|n| n.starts_with("loop_")).unwrap_or(false);
            if !is_iteration_file {
                continue;
            }
            if let Ok(bytes) = tokio::fs::read(&path).await {
                let decoded: std::result::Result<ExecutionContext, _> = match self.format {
                    PersistenceFormat::Json => serde_json::from_slice(&bytes).map_err(|e| e.to_string()),
                    PersistenceFormat::Binary => bincode::deserialize(&bytes).map_err(|e| e.to_string()),
                };
                if let Ok(ctx) = decoded {
                    entries.push(ctx);
                }
            }
        }

        entries.sort_by_key(|ctx| ctx.loop_index);
        Ok(entries)
    }

    /// Keeps at most `max_backups` rotated snapshot files, deleting the
    /// oldest first. Backup filenames embed a sortable timestamp, so a
    /// lexicographic sort is also a chronological one.
    async fn prune_backups(&self) -> Result<()> {
        let mut dir = match tokio::fs::read_dir(&self.save_dir).await {
            Ok(dir) => dir,
            Err(_) => return Ok(()),
        };

        let prefix = format!("{SNAPSHOT_BASENAME}.");
        let suffix = self.backup_suffix();
        let mut backups = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(LoopError::Io)? {
            let path = entry.path();
            let is_backup = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(&prefix) && n.ends_with(&suffix))
                .unwrap_or(false);
            if is_backup {
                backups.push(path);
            }
        }

        backups.sort();
        while backups.len() > self.max_backups {
            let oldest = backups.remove(0);
            let _ = tokio::fs::remove_file(&oldest).await;
        }
        Ok(())
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExecutionContext;

    fn sample(index: u64) -> ExecutionContext {
        ExecutionContext::new("loop-1", index, "prompt", "wrapped")
    }

    #[tokio::test]
    async fn save_and_load_snapshot_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let pm = PersistenceManager::new(dir.path(), PersistenceFormat::Json, 5);
        let history = vec![sample(0), sample(1)];
        pm.save_snapshot(&history).await.unwrap();
        let loaded = pm.load_snapshot().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].loop_index, 1);
    }

    #[tokio::test]
    async fn binary_format_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let pm = PersistenceManager::new(dir.path(), PersistenceFormat::Binary, 5);
        let history = vec![sample(0)];
        pm.save_snapshot(&history).await.unwrap();
        let loaded = pm.load_snapshot().await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn missing_snapshot_falls_back_to_iteration_reconstruction() {
        let dir = tempfile::tempdir().unwrap();
        let pm = PersistenceManager::new(dir.path(), PersistenceFormat::Json, 5);
        pm.save_iteration(&sample(0)).await.unwrap();
        pm.save_iteration(&sample(1)).await.unwrap();
        let loaded = pm.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[tokio::test]
    async fn corrupt_snapshot_surfaces_error_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let pm = PersistenceManager::new(dir.path(), PersistenceFormat::Json, 5);
        tokio::fs::create_dir_all(dir.path()).await.unwrap();
        tokio::fs::write(pm.snapshot_path(), b"not valid json").await.unwrap();
        assert!(pm.load_snapshot().await.is_err());
    }
}
