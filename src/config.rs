//! Environment configuration

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorCode, Result};

/// Default page size (16 KiB)
pub const DEFAULT_PAGE_SIZE: u32 = 16 * 1024;
/// Default cache size (2 MiB)
pub const DEFAULT_CACHE_SIZE: u64 = 2 * 1024 * 1024;
/// Default number of database slots
pub const DEFAULT_MAX_DATABASES: u16 = 16;
/// Page sizes must be a multiple of this
pub const PAGE_SIZE_ALIGNMENT: u32 = 1024;
/// Largest accepted page size
pub const MAX_PAGE_SIZE: u32 = 64 * 1024;

/// Settings for creating or opening an environment.
///
/// `page_size` and `max_databases` only matter on create; an existing
/// environment keeps the values stored in its header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Page size in bytes
    pub page_size: u32,
    /// Cache size in bytes
    pub cache_size: u64,
    /// Number of database slots reserved in the header
    pub max_databases: u16,
    /// Unix permission bits for a newly created file
    pub file_mode: u32,
    /// Open without write access
    pub read_only: bool,
    /// Keep everything in memory; no file is created
    pub in_memory: bool,
    /// Sync the file to disk on flush and close
    pub enable_fsync: bool,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_size: DEFAULT_CACHE_SIZE,
            max_databases: DEFAULT_MAX_DATABASES,
            file_mode: 0o644,
            read_only: false,
            in_memory: false,
            enable_fsync: false,
        }
    }
}

impl EnvConfig {
    /// Check settings that are independent of the file on disk.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0
            || self.page_size % PAGE_SIZE_ALIGNMENT != 0
            || self.page_size > MAX_PAGE_SIZE
        {
            return Err(Error::with_message(
                ErrorCode::InvPageSize,
                format!(
                    "page size {} must be a non-zero multiple of {PAGE_SIZE_ALIGNMENT} \
                     up to {MAX_PAGE_SIZE}",
                    self.page_size
                ),
            ));
        }
        if self.max_databases == 0 {
            return Err(Error::with_message(
                ErrorCode::InvParameter,
                "max_databases must be at least 1",
            ));
        }
        if self.in_memory && self.read_only {
            return Err(Error::with_message(
                ErrorCode::InvParameter,
                "an in-memory environment cannot be read-only",
            ));
        }
        Ok(())
    }
}
