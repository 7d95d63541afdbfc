//! Object keys used by chunked uploads.
//!
//! Temporary chunks live at `.chunk-uploads/{session}/{digest}/{index}.part`.
//! Merged files land outside that prefix at `YYYY/MM/DD/{uuid}{ext}`.

use crate::services::error::{ErrorCode, ServiceError, ServiceResult};
use chrono::NaiveDate;
use uuid::Uuid;

pub const CHUNK_UPLOAD_PREFIX: &str = ".chunk-uploads/";
pub const CHUNK_SUFFIX: &str = ".part";

/// Everything a session ever wrote: `.chunk-uploads/{session}/`.
pub fn session_prefix(upload_session_id: &str) -> String {
    format!("{}{}/", CHUNK_UPLOAD_PREFIX, upload_session_id)
}

/// Chunks of one file within a session: `.chunk-uploads/{session}/{digest}/`.
pub fn chunk_dir(upload_session_id: &str, file_digest: &str) -> String {
    format!("{}{}/", session_prefix(upload_session_id), file_digest)
}

pub fn chunk_key(upload_session_id: &str, file_digest: &str, chunk_index: u32) -> String {
    format!(
        "{}{}{}",
        chunk_dir(upload_session_id, file_digest),
        chunk_index,
        CHUNK_SUFFIX
    )
}

/// Prefix swept by a cancel that carries no session id.
pub fn digest_sweep_prefix(file_digest: &str) -> String {
    format!("{}{}/", CHUNK_UPLOAD_PREFIX, file_digest)
}

/// The `{index}` part of a chunk key, unparsed. `None` when the key is not a chunk.
pub fn chunk_index_component(key: &str) -> Option<&str> {
    let file = key.rsplit('/').next()?;
    file.strip_suffix(CHUNK_SUFFIX)
}

/// The digest directory a chunk key sits in.
pub fn digest_of_chunk_key(key: &str) -> Option<&str> {
    let rest = key.strip_prefix(CHUNK_UPLOAD_PREFIX)?;
    let mut segments = rest.rsplit('/');
    segments.next()?;
    segments.next()
}

/// `ceil(total_size / chunk_size)`.
pub fn total_chunks(total_size: u64, chunk_size: u64) -> ServiceResult<u32> {
    if chunk_size == 0 {
        return Err(ServiceError::invalid(
            ErrorCode::InvalidParameter,
            "chunk_size must be greater than zero",
        ));
    }
    u32::try_from(total_size.div_ceil(chunk_size)).map_err(|_| {
        ServiceError::invalid(
            ErrorCode::InvalidParameter,
            format!(
                "{} bytes in chunks of {} bytes needs too many chunks",
                total_size, chunk_size
            ),
        )
    })
}

/// Fresh key for a merged or directly uploaded file, e.g. `2024/05/17/9f0c...e1.pdf`.
pub fn final_object_key(ext: &str, date: NaiveDate) -> String {
    format!(
        "{}/{}{}",
        date.format("%Y/%m/%d"),
        Uuid::new_v4().simple(),
        ext
    )
}
