use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Builds a sibling temp path that no other writer in this process (or a
/// concurrent process) will pick.
fn temp_path_for(path: &Path) -> PathBuf {
    // SEC-009: Randomized temp filename so nobody can pre-create a symlink there
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        ".{file_name}.tmp.{:x}.{nanos:016x}.{seq}",
        std::process::id()
    ))
}

/// Atomically replaces `path` with `contents`.
///
/// Writes to a uniquely named temp file in the same directory, syncs it to
/// disk, then renames it over the destination. Readers either see the old
/// file or the complete new one, never a partial write. Two writers racing on
/// the same path both succeed; the last rename wins.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let temp_path = temp_path_for(path);

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true) // Fails if the path exists (prevents symlink race)
        .open(&temp_path)
        .await?;

    let written = async {
        file.write_all(contents).await?;
        file.sync_all().await
    }
    .await;

    // Drop the handle before rename (required on Windows)
    drop(file);

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    // On Windows, rename fails if destination exists, so remove it first
    #[cfg(windows)]
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }
    }

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    Ok(())
}
