//! JSON snapshot persistence for the in-memory store: one versioned
//! file, written atomically (tmp then rename). Meant for small pools
//! and tests; the sqlite store is the durable option.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::store::{MemoryStore, StoreSnapshot};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    data: StoreSnapshot,
}

pub fn save_to_path(store: &MemoryStore, path: &Path) -> Result<()> {
    let file = SnapshotFile {
        version: SNAPSHOT_VERSION,
        data: store.snapshot().context("snapshot store")?,
    };

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(&file).context("encode snapshot")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename to {}", path.display()))?;
    Ok(())
}

/// Loads a snapshot into the store. Returns false (leaving the store
/// untouched) when the file is missing or carries a different version.
pub fn load_from_path(store: &MemoryStore, path: &Path) -> Result<bool> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
    };
    let file: SnapshotFile =
        serde_json::from_str(&raw).with_context(|| format!("decode {}", path.display()))?;
    if file.version != SNAPSHOT_VERSION {
        return Ok(false);
    }
    store.restore(file.data).context("restore snapshot")?;
    Ok(true)
}
