//! Persisted boot counter (spec.md §4.1, §6 "Persisted state", §9).
//!
//! One directory per custom engineID under `persistence_dir`, holding a
//! single file `boots` with the ASCII decimal boot counter. Updates are
//! atomic: write to a temp file in the same directory, then rename.

use std::path::{Path, PathBuf};

use tracing::warn;

fn engine_dir(persistence_dir: &Path, engine_id: &[u8]) -> PathBuf {
    persistence_dir.join(hex::encode(engine_id))
}

/// Reads the prior boot counter for `engine_id`, increments it, and
/// atomically rewrites the file. A missing or corrupt file is treated
/// as `boots = 0` (spec.md §9 "Persistent boot counter"). If the
/// engine-specific directory cannot be created, the failure is logged
/// and the engine proceeds with `boots = 0` in memory only (Open
/// Question (b), resolved as "start anyway, log").
pub fn load_and_increment_boots(persistence_dir: &Path, engine_id: &[u8]) -> u32 {
    let dir = engine_dir(persistence_dir, engine_id);

    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!(
            "failed to create boot-counter directory {}: {} (continuing with boots=0, unpersisted)",
            dir.display(),
            e
        );
        return 0;
    }

    let boots_path = dir.join("boots");
    let previous = read_boots(&boots_path);
    let next = previous.wrapping_add(1);

    if let Err(e) = write_boots_atomic(&dir, &boots_path, next) {
        warn!(
            "failed to persist boot counter to {}: {} (continuing with boots={} in memory)",
            boots_path.display(),
            e,
            next
        );
    }

    next
}

fn read_boots(path: &Path) -> u32 {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents.trim().parse().unwrap_or(0),
        Err(_) => 0,
    }
}

fn write_boots_atomic(dir: &Path, final_path: &Path, value: u32) -> std::io::Result<()> {
    let tmp_path = dir.join(format!("boots.tmp.{}", std::process::id()));
    std::fs::write(&tmp_path, value.to_string())?;
    std::fs::rename(&tmp_path, final_path)
}
