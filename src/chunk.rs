//! 分片请求字段校验（不涉及任何 I/O）。

use axum::body::Bytes;
use thiserror::Error;

use crate::storage::WORKING_SUFFIX;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("missing index/totalChunks/fileName")]
    MissingField,
    #[error("invalid index")]
    InvalidIndex,
    #[error("invalid totalChunks")]
    InvalidTotal,
    #[error("index >= totalChunks")]
    IndexOutOfRange,
    #[error("invalid fileName")]
    InvalidFileName,
    #[error("missing chunk file")]
    MissingPayload,
}

/// Raw multipart fields as they arrived.
#[derive(Debug, Default)]
pub struct ChunkForm {
    pub file_name: Option<String>,
    pub index: Option<String>,
    pub total_chunks: Option<String>,
    pub chunk: Option<Bytes>,
}

/// A chunk request that passed every syntactic check.
#[derive(Debug)]
pub struct ValidChunk {
    pub index: u64,
    pub total_chunks: u64,
    pub file_name: String,
    pub payload: Bytes,
}

impl ValidChunk {
    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.total_chunks
    }
}

/// 按固定顺序校验分片字段。
pub fn validate(form: ChunkForm) -> Result<ValidChunk, ChunkError> {
    let file_name = non_empty(form.file_name);
    let index = non_empty(form.index);
    let total = non_empty(form.total_chunks);
    let (Some(file_name), Some(index), Some(total)) = (file_name, index, total) else {
        return Err(ChunkError::MissingField);
    };

    let index = index
        .parse::<u64>()
        .map_err(|_| ChunkError::InvalidIndex)?;
    let total_chunks = match total.parse::<u64>() {
        Ok(value) if value > 0 => value,
        _ => return Err(ChunkError::InvalidTotal),
    };
    if index >= total_chunks {
        return Err(ChunkError::IndexOutOfRange);
    }
    if !is_safe_file_name(&file_name) {
        return Err(ChunkError::InvalidFileName);
    }

    let payload = form
        .chunk
        .filter(|bytes| !bytes.is_empty())
        .ok_or(ChunkError::MissingPayload)?;

    Ok(ValidChunk {
        index,
        total_chunks,
        file_name,
        payload,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

/// 文件名必须是单一路径段，且不能与工作文件命名冲突。
pub fn is_safe_file_name(name: &str) -> bool {
    if name == "." || name == ".." {
        return false;
    }
    if name.contains(['/', '\\', '\0']) {
        return false;
    }
    !name.ends_with(WORKING_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(file_name: &str, index: &str, total: &str, chunk: &'static [u8]) -> ChunkForm {
        ChunkForm {
            file_name: Some(file_name.to_string()),
            index: Some(index.to_string()),
            total_chunks: Some(total.to_string()),
            chunk: Some(Bytes::from_static(chunk)),
        }
    }

    #[test]
    fn accepts_well_formed_chunk() {
        let chunk = validate(form("photo.png", "2", "3", b"abc")).expect("valid");
        assert_eq!(chunk.index, 2);
        assert_eq!(chunk.total_chunks, 3);
        assert_eq!(chunk.file_name, "photo.png");
        assert_eq!(chunk.size(), 3);
        assert!(chunk.is_last());
    }

    #[test]
    fn missing_or_empty_fields_rejected_first() {
        let mut missing = form("photo.png", "0", "1", b"abc");
        missing.index = None;
        assert_eq!(validate(missing).unwrap_err(), ChunkError::MissingField);

        // Checked before the index parse, even when the index is garbage.
        assert_eq!(
            validate(form("", "x", "1", b"abc")).unwrap_err(),
            ChunkError::MissingField
        );
    }

    #[test]
    fn index_must_be_non_negative_integer() {
        assert_eq!(
            validate(form("a", "-1", "3", b"abc")).unwrap_err(),
            ChunkError::InvalidIndex
        );
        assert_eq!(
            validate(form("a", "one", "3", b"abc")).unwrap_err(),
            ChunkError::InvalidIndex
        );
    }

    #[test]
    fn total_must_be_positive() {
        let err = validate(form("a", "0", "0", b"abc")).unwrap_err();
        assert_eq!(err, ChunkError::InvalidTotal);
        assert_eq!(err.to_string(), "invalid totalChunks");
    }

    #[test]
    fn index_beyond_total_rejected() {
        let err = validate(form("a", "5", "3", b"abc")).unwrap_err();
        assert_eq!(err, ChunkError::IndexOutOfRange);
        assert_eq!(err.to_string(), "index >= totalChunks");
        assert_eq!(
            validate(form("a", "3", "3", b"abc")).unwrap_err(),
            ChunkError::IndexOutOfRange
        );
    }

    #[test]
    fn unsafe_names_rejected() {
        for name in ["..", ".", "../etc/passwd", "dir/file", "dir\\file", "movie.mkv.part"] {
            assert_eq!(
                validate(form(name, "0", "1", b"abc")).unwrap_err(),
                ChunkError::InvalidFileName,
                "{name}"
            );
        }
        assert!(is_safe_file_name("..hidden"));
        assert!(is_safe_file_name("report.final.pdf"));
    }

    #[test]
    fn payload_required_and_non_empty() {
        let mut absent = form("a", "0", "1", b"abc");
        absent.chunk = None;
        assert_eq!(validate(absent).unwrap_err(), ChunkError::MissingPayload);
        assert_eq!(
            validate(form("a", "0", "1", b"")).unwrap_err(),
            ChunkError::MissingPayload
        );
    }
}
