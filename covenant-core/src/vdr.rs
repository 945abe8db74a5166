//! VDR ingestion: copy a directory of records and put a manifest over it.

use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::info;

use auditlock::{EvidenceStore, Retention};

use crate::clock::{timestamp_utc, Clock};
use crate::CovenantResult;

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Ingest every file under `src` into `dst` and write a manifest covering
/// the copies. Returns the manifest path and its SHA-256.
pub fn ingest(src: &Path, dst: &Path, clock: &dyn Clock) -> CovenantResult<(PathBuf, String)> {
    let mut files = Vec::new();
    collect_files(src, &mut files)?;
    files.sort();

    let mut store = EvidenceStore::new(dst, Retention::Standard)?;
    for path in &files {
        let relpath = path
            .strip_prefix(src)
            .expect("walked paths are under src")
            .to_string_lossy()
            .replace('\\', "/");
        let bytes = std::fs::read(path)?;
        store.write_bytes("external", &relpath, &bytes)?;
    }

    let metadata = json!({
        "ingested_from": src.display().to_string(),
        "timestamp_utc": timestamp_utc(clock),
        "artifact_count": files.len(),
    });
    let (manifest_path, sha256) = store.write_manifest(metadata)?;
    info!(count = files.len(), manifest = %manifest_path.display(), "VDR ingested");
    Ok((manifest_path, sha256))
}
