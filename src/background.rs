//! 遗留 `.part` 工作文件的后台清理任务。

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::PART_SWEEP_INTERVAL_SECS;
use crate::locking::LockManager;
use crate::storage::UploadStore;
use crate::upload::{UploadConfig, cleanup_stale_parts};

/// 启动后台任务；未配置 TTL 时不启动。
pub fn spawn_background_tasks(
    store: Arc<UploadStore>,
    locks: Arc<LockManager>,
    upload: Arc<UploadConfig>,
) {
    if upload.part_ttl.is_zero() {
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(PART_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if let Err(err) = cleanup_stale_parts(&store, &locks, &upload).await {
                warn!(error = %err, "stale part cleanup failed");
            }
        }
    });
}
