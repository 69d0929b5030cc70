//! 工作文件到最终文件的原子重命名。

use std::io;
use std::path::Path;
use tokio::fs;

/// 在同一目录内将 `working` 原子重命名为 `target`。
///
/// On failure nothing is removed: `working` keeps every byte written so far.
pub async fn promote(working: &Path, target: &Path) -> io::Result<()> {
    fs::rename(working, target).await?;
    if let Some(parent) = target.parent() {
        let _ = sync_dir(parent).await;
    }
    Ok(())
}

async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}
