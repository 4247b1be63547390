pub mod change_storage;
pub mod config;
pub mod file_lock;
pub mod version_control;

pub use change_storage::ChangeLog;
pub use config::{DiffAlgorithm, TrackerConfig};
pub use file_lock::FileLockRegistry;

use crate::models::{TrackerError, TrackerResult};

// File ids name files on disk, so they must be plain names
pub fn validate_file_id(file_id: &str) -> TrackerResult<()> {
    if file_id.trim().is_empty() {
        return Err(TrackerError::invalid("fileId must not be empty"));
    }
    if file_id.contains('/') || file_id.contains('\\') || file_id.contains("..") || file_id.contains('\0') {
        return Err(TrackerError::invalid(format!(
            "fileId contains path characters: {}",
            file_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_ids_must_be_plain_names() {
        assert!(validate_file_id("prp-auth_flow.v2").is_ok());
        assert!(validate_file_id("").is_err());
        assert!(validate_file_id("   ").is_err());
        assert!(validate_file_id("../etc/passwd").is_err());
        assert!(validate_file_id("a/b").is_err());
        assert!(validate_file_id("a\\b").is_err());
    }
}
