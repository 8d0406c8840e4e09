//! Environment header page

use std::io::Read;

use bincode::{Decode, Encode, config};

use crate::capability::get_version;
use crate::config::{EnvConfig, MAX_PAGE_SIZE, PAGE_SIZE_ALIGNMENT};
use crate::error::{Error, ErrorCode, Result};

/// Identifies an environment file
pub const MAGIC: [u8; 4] = *b"BRW\0";

/// On-disk format version; bumped on incompatible header changes
pub const FILE_VERSION: u32 = 1;

/// First page of every environment file.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct FileHeader {
    /// Always [`MAGIC`]
    pub magic: [u8; 4],
    /// Format of everything after the magic
    pub file_version: u32,
    /// Engine version that created the file
    pub engine_version: (u32, u32, u32),
    /// Page size in bytes
    pub page_size: u32,
    /// Number of database slots
    pub max_databases: u16,
    /// Reserved for persistent flags
    pub flags: u32,
}

fn codec() -> impl config::Config {
    config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

impl FileHeader {
    /// Header for a new environment.
    pub fn new(cfg: &EnvConfig) -> Self {
        let version = get_version();
        Self {
            magic: MAGIC,
            file_version: FILE_VERSION,
            engine_version: (version.major, version.minor, version.revision),
            page_size: cfg.page_size,
            max_databases: cfg.max_databases,
            flags: 0,
        }
    }

    /// The full header page, zero-padded to the page size.
    pub fn to_page(&self) -> Result<Vec<u8>> {
        let mut page = bincode::encode_to_vec(self, codec()).map_err(|e| {
            Error::with_message(ErrorCode::InternalError, format!("cannot encode header: {e}"))
        })?;
        page.resize(self.page_size as usize, 0);
        Ok(page)
    }

    /// Read and validate the header at the start of `reader`.
    pub fn read_from(reader: impl Read) -> Result<Self> {
        let mut buf = Vec::with_capacity(PAGE_SIZE_ALIGNMENT as usize);
        reader
            .take(u64::from(PAGE_SIZE_ALIGNMENT))
            .read_to_end(&mut buf)?;

        let (header, _) =
            bincode::decode_from_slice::<FileHeader, _>(&buf, codec()).map_err(|e| {
                Error::with_message(ErrorCode::InvFileHeader, format!("unreadable header: {e}"))
            })?;
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(Error::with_message(
                ErrorCode::InvFileHeader,
                "not an environment file (bad magic)",
            ));
        }
        if self.file_version != FILE_VERSION {
            return Err(Error::with_message(
                ErrorCode::InvFileVersion,
                format!(
                    "file format version {} is not supported (expected {FILE_VERSION})",
                    self.file_version
                ),
            ));
        }
        if self.page_size == 0
            || self.page_size % PAGE_SIZE_ALIGNMENT != 0
            || self.page_size > MAX_PAGE_SIZE
            || self.max_databases == 0
        {
            return Err(Error::with_message(
                ErrorCode::InvFileHeader,
                format!(
                    "corrupt header: page size {}, {} database slots",
                    self.page_size, self.max_databases
                ),
            ));
        }
        Ok(())
    }
}
