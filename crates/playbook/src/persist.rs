//! File persistence for the Insight Store — one pretty-printed JSON document.
//!
//! A missing file loads as an empty store; the parent directory is created on
//! first save. Writes go to a sibling temp file and are renamed into place.

use reflace_core::embedding::Embedder;
use reflace_core::error::PlaybookError;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::store::{InsightStore, PlaybookSnapshot};

/// Save the store to `path`.
pub fn save(store: &InsightStore, path: &Path) -> Result<(), PlaybookError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            PlaybookError::Storage(format!("Failed to create playbook directory: {e}"))
        })?;
    }

    let json = serde_json::to_string_pretty(&store.snapshot())
        .map_err(|e| PlaybookError::Storage(format!("Failed to serialize playbook: {e}")))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .map_err(|e| PlaybookError::Storage(format!("Failed to write playbook file: {e}")))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| PlaybookError::Storage(format!("Failed to replace playbook file: {e}")))?;

    debug!(path = %path.display(), insights = store.len(), "Playbook saved");
    Ok(())
}

/// Load a store from `path`, or an empty one if the file does not exist.
pub fn load(path: &Path, embedder: Arc<dyn Embedder>) -> Result<InsightStore, PlaybookError> {
    if !path.exists() {
        info!("No playbook found at {}, starting empty", path.display());
        return Ok(InsightStore::new(embedder));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| PlaybookError::Storage(format!("Failed to read playbook file: {e}")))?;
    let snapshot: PlaybookSnapshot = serde_json::from_str(&content).map_err(|e| {
        PlaybookError::Storage(format!("Failed to parse playbook {}: {e}", path.display()))
    })?;

    debug!(path = %path.display(), insights = snapshot.insights.len(), "Playbook loaded");
    Ok(InsightStore::from_snapshot(embedder, snapshot))
}
