//! Per-file import bookkeeping in `data_imports`.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::error::ImportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ImportStatus::Pending),
            "processing" => Ok(ImportStatus::Processing),
            "completed" => Ok(ImportStatus::Completed),
            "failed" => Ok(ImportStatus::Failed),
            other => Err(ImportError::UnknownStatus(other.to_string())),
        }
    }
}

/// What `data_imports` says about a file from an earlier run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub file_hash: String,
    pub status: ImportStatus,
}

/// Lowercase hex SHA-256 of the file content.
pub fn file_hash(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// Skip a file whose content was already handled to a final state; `force` overrides.
pub fn should_process(previous: Option<&ImportRecord>, hash: &str, force: bool) -> bool {
    if force {
        return true;
    }
    match previous {
        Some(record) => {
            let finished = matches!(
                record.status,
                ImportStatus::Completed | ImportStatus::Failed
            );
            !(finished && record.file_hash == hash)
        }
        None => true,
    }
}
