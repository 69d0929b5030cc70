use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::atomic::promote;

pub const WORKING_SUFFIX: &str = ".part";

#[derive(Clone, Debug)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(StoreError::CreateDir)
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn working_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}{WORKING_SUFFIX}"))
    }

    pub fn final_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Appends one chunk to the working file of `name`.
    ///
    /// Index 0 truncates whatever a previous attempt left behind. The caller
    /// must hold the file lock for `name`.
    pub async fn write_chunk<R>(
        &self,
        name: &str,
        index: u64,
        payload: &mut R,
        expected: u64,
    ) -> Result<u64, StoreError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = self.working_path(name);
        let mut options = OpenOptions::new();
        options.create(true);
        if index == 0 {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let mut file = options
            .open(&path)
            .await
            .map_err(StoreError::CannotOpenWorkingFile)?;

        let written = tokio::io::copy(payload, &mut file)
            .await
            .map_err(StoreError::Write)?;
        file.flush().await.map_err(StoreError::Write)?;
        file.sync_data().await.map_err(StoreError::Write)?;

        if written != expected {
            return Err(StoreError::IncompleteWrite { expected, written });
        }
        Ok(written)
    }

    /// Bytes accumulated so far in the working file of `name`.
    pub async fn received(&self, name: &str) -> Result<u64, StoreError> {
        let metadata = fs::metadata(self.working_path(name))
            .await
            .map_err(StoreError::Stat)?;
        Ok(metadata.len())
    }

    /// Promotes the working file of `name` to its final path.
    pub async fn finalize(&self, name: &str) -> Result<PathBuf, FinalizeError> {
        let working = self.working_path(name);
        let target = self.final_path(name);
        match promote(&working, &target).await {
            Ok(()) => Ok(target),
            Err(source) => Err(FinalizeError { working, source }),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot create upload dir: {0}")]
    CreateDir(#[source] io::Error),
    #[error("cannot open part file: {0}")]
    CannotOpenWorkingFile(#[source] io::Error),
    #[error("write error: {0}")]
    Write(#[source] io::Error),
    #[error("incomplete write: expected {expected} bytes, wrote {written}")]
    IncompleteWrite { expected: u64, written: u64 },
    #[error("cannot stat part file: {0}")]
    Stat(#[source] io::Error),
}

/// Rename failed; all bytes are still at `working`.
#[derive(Debug, Error)]
#[error("received last chunk but rename failed: {source}")]
pub struct FinalizeError {
    pub working: PathBuf,
    #[source]
    pub source: io::Error,
}
