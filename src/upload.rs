//! 分片上传处理器与遗留工作文件清理。

use axum::Router;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Extension, Multipart};
use axum::response::Json as JsonResponse;
use axum::routing::post;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::chunk::{self, ChunkForm};
use crate::error::ApiError;
use crate::locking::LockManager;
use crate::storage::{UploadStore, WORKING_SUFFIX};

#[derive(Debug)]
pub struct UploadConfig {
    pub max_request_size: usize,
    /// `None` waits for a busy file lock indefinitely.
    pub lock_timeout: Option<Duration>,
    /// Zero disables the stale `.part` sweep.
    pub part_ttl: Duration,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
pub(crate) enum ChunkResponse {
    Received {
        status: &'static str,
        received: i64,
    },
    Done {
        status: &'static str,
        done: bool,
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

/// 上传分片相关路由；共享状态由调用方通过 `Extension` 注入。
pub fn routes(upload: &UploadConfig) -> Router {
    Router::new().route(
        "/upload",
        post(upload_chunk).layer(DefaultBodyLimit::max(upload.max_request_size)),
    )
}

/// 接收单个分片：校验、加锁、追加写入，最后一个分片时原子重命名。
pub async fn upload_chunk(
    Extension(store): Extension<Arc<UploadStore>>,
    Extension(locks): Extension<Arc<LockManager>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<JsonResponse<ChunkResponse>, ApiError> {
    let multipart =
        multipart.inspect_err(|err| warn!(error = %err, "not a multipart request"))?;
    let form = read_form(multipart)
        .await
        .inspect_err(|err| warn!(error = ?err, "unreadable chunk request"))?;
    let chunk = chunk::validate(form).inspect_err(|err| warn!(error = %err, "rejected chunk"))?;
    let name = chunk.file_name.as_str();

    store
        .ensure_root()
        .await
        .inspect_err(|err| error!(error = %err, "upload dir unavailable"))?;

    let lock = locks
        .acquire(name, upload.lock_timeout)
        .await
        .inspect_err(|err| warn!(file = name, error = %err, "file lock unavailable"))?;

    let mut payload = &chunk.payload[..];
    let written = store
        .write_chunk(name, chunk.index, &mut payload, chunk.size())
        .await
        .inspect_err(|err| {
            error!(file = name, index = chunk.index, error = %err, "chunk write failed")
        })?;
    debug!(
        file = name,
        index = chunk.index,
        total = chunk.total_chunks,
        bytes = written,
        "chunk written"
    );

    let response = if chunk.is_last() {
        match store.finalize(name).await {
            Ok(path) => {
                info!(file = name, path = ?path, "upload complete");
                ChunkResponse::Done {
                    status: "ok",
                    done: true,
                    path: path.display().to_string(),
                    note: None,
                }
            }
            Err(err) => {
                error!(
                    file = name,
                    working = ?err.working,
                    error = %err.source,
                    "rename failed"
                );
                ChunkResponse::Done {
                    status: "ok",
                    done: true,
                    path: err.working.display().to_string(),
                    note: Some(err.to_string()),
                }
            }
        }
    } else {
        let received = store
            .received(name)
            .await
            .inspect_err(|err| error!(file = name, error = %err, "part stat failed"))?;
        ChunkResponse::Received {
            status: "ok",
            received: i64::try_from(received).unwrap_or(i64::MAX),
        }
    };

    lock.release();
    Ok(JsonResponse(response))
}

async fn read_form(mut multipart: Multipart) -> Result<ChunkForm, ApiError> {
    let mut form = ChunkForm::default();
    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "chunk" => form.chunk = Some(field.bytes().await?),
            "index" => form.index = Some(field.text().await?),
            "totalChunks" => form.total_chunks = Some(field.text().await?),
            "fileName" => form.file_name = Some(field.text().await?),
            _ => {}
        }
    }
    Ok(form)
}

/// 清理超过 TTL 的遗留 `.part` 文件，跳过正在写入的文件。
pub async fn cleanup_stale_parts(
    store: &UploadStore,
    locks: &Arc<LockManager>,
    upload: &UploadConfig,
) -> Result<(), std::io::Error> {
    if upload.part_ttl.is_zero() {
        return Ok(());
    }
    if fs::metadata(store.root_path()).await.is_err() {
        return Ok(());
    }

    let now = SystemTime::now();
    let mut dir = fs::read_dir(store.root_path()).await?;
    while let Some(entry) = dir.next_entry().await? {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        let Some(name) = file_name.strip_suffix(WORKING_SUFFIX) else {
            continue;
        };
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let age = match metadata.modified().map(|modified| now.duration_since(modified)) {
            Ok(Ok(value)) => value,
            _ => continue,
        };
        if age < upload.part_ttl {
            continue;
        }
        let Some(_lock) = locks.try_acquire(name) else {
            debug!(file = name, "skipping stale part with active upload");
            continue;
        };
        let path = entry.path();
        if let Err(err) = fs::remove_file(&path).await {
            warn!(path = ?path, error = %err, "failed to remove stale part file");
        } else {
            info!(path = ?path, "removed stale part file");
        }
    }

    debug!(active_locks = locks.len(), "stale part sweep finished");
    Ok(())
}
