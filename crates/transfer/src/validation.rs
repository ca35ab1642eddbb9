use std::path::{Component, Path};

use crate::TransferError;
use crate::types::UploadMetadata;

/// Validates that `filename` is a bare file name with no directory part.
///
/// Rejects:
/// - Empty names
/// - Absolute paths and Windows prefixes
/// - Any separator or `.`/`..` component
pub fn validate_filename(filename: &str) -> Result<(), TransferError> {
    if filename.trim().is_empty() {
        return Err(TransferError::InvalidUpload("empty filename".into()));
    }

    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !filename.contains(['/', '\\']) => Ok(()),
        _ => Err(TransferError::InvalidUpload(format!(
            "filename must not contain a path: {filename}"
        ))),
    }
}

/// Checks that an upload can be described to the server before any request.
pub fn validate_upload(
    source_size: u64,
    chunk_size: u64,
    metadata: &UploadMetadata,
) -> Result<(), TransferError> {
    if source_size == 0 {
        return Err(TransferError::InvalidUpload("source is empty".into()));
    }
    if chunk_size == 0 {
        return Err(TransferError::InvalidUpload("chunk size must be positive".into()));
    }
    if source_size.div_ceil(chunk_size) > u64::from(u32::MAX) {
        return Err(TransferError::InvalidUpload(format!(
            "{source_size} bytes need too many chunks of {chunk_size} bytes"
        )));
    }
    validate_filename(&metadata.filename)?;
    if metadata.title.trim().is_empty() {
        return Err(TransferError::InvalidUpload("title is required".into()));
    }
    Ok(())
}
