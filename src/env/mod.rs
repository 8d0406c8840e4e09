//! Environment handle
//!
//! An [`Environment`] is the root object of the engine. It starts out
//! unopened, becomes open through [`Environment::open`] or
//! [`Environment::create`] and ends closed. A closed handle may be opened
//! again. Every failing operation returns its [`Error`] and mirrors it once to
//! the installed error handler.

mod header;

pub use header::{FILE_VERSION, FileHeader, MAGIC};

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EnvConfig;
use crate::error::{Error, ErrorCode, Result, io_error_code};
use crate::handler::reported;

/// Lifecycle state of an [`Environment`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnvState {
    /// Never opened
    Unopened,
    /// Open and usable
    Open,
    /// Closed; may be opened again
    Closed,
}

/// Effective settings of an open environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvParameters {
    /// Backing file, `None` for in-memory environments
    pub path: Option<PathBuf>,
    /// Page size in bytes
    pub page_size: u32,
    /// Cache size in bytes
    pub cache_size: u64,
    /// Number of database slots
    pub max_databases: u16,
    /// Opened without write access
    pub read_only: bool,
    /// Kept in memory only
    pub in_memory: bool,
    /// Syncs to disk on flush and close
    pub enable_fsync: bool,
}

enum Backing {
    /// Locked environment file; dropping it releases the lock.
    File { file: File, path: PathBuf },
    Memory,
}

struct OpenEnv {
    backing: Backing,
    config: EnvConfig,
}

enum Slot {
    Unopened,
    Open(OpenEnv),
    Closed,
}

/// Database environment handle.
///
/// Lifecycle operations take `&mut self`; share a handle across threads only
/// behind your own synchronization.
pub struct Environment {
    slot: Slot,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("state", &self.state())
            .field("path", &self.path())
            .finish()
    }
}

impl Environment {
    /// An unopened handle.
    pub fn new() -> Self {
        Self {
            slot: Slot::Unopened,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EnvState {
        match self.slot {
            Slot::Unopened => EnvState::Unopened,
            Slot::Open(_) => EnvState::Open,
            Slot::Closed => EnvState::Closed,
        }
    }

    /// True while the environment is open.
    pub fn is_open(&self) -> bool {
        matches!(self.slot, Slot::Open(_))
    }

    /// Backing file of an open, file-based environment.
    pub fn path(&self) -> Option<&Path> {
        match &self.slot {
            Slot::Open(OpenEnv {
                backing: Backing::File { path, .. },
                ..
            }) => Some(path),
            _ => None,
        }
    }

    /// Open an existing environment file.
    ///
    /// Fails with [`ErrorCode::FileNotFound`] if `path` does not exist,
    /// [`ErrorCode::InvFileHeader`] or [`ErrorCode::InvFileVersion`] if it is
    /// not a compatible environment, [`ErrorCode::WouldBlock`] if another
    /// handle holds it, and [`ErrorCode::EnvironmentAlreadyOpen`] if this
    /// handle is open. The handle is unchanged on failure.
    pub fn open(&mut self, path: impl AsRef<Path>, config: &EnvConfig) -> Result<()> {
        let path = path.as_ref();
        reported(|| {
            self.ensure_not_open()?;
            config.validate()?;
            if config.in_memory {
                return Err(Error::with_message(
                    ErrorCode::InvParameter,
                    "in-memory environments can only be created",
                ));
            }
            let env = open_file(path, config)?;
            info!(path = %path.display(), read_only = config.read_only, "environment opened");
            self.slot = Slot::Open(env);
            Ok(())
        })
    }

    /// Create a new environment, replacing any existing file at `path`.
    ///
    /// With `in_memory` set, `path` is ignored and nothing touches the disk.
    pub fn create(&mut self, path: impl AsRef<Path>, config: &EnvConfig) -> Result<()> {
        let path = path.as_ref();
        reported(|| {
            self.ensure_not_open()?;
            config.validate()?;
            if config.read_only {
                return Err(Error::with_message(
                    ErrorCode::InvParameter,
                    "cannot create a read-only environment",
                ));
            }
            let env = if config.in_memory {
                OpenEnv {
                    backing: Backing::Memory,
                    config: config.clone(),
                }
            } else {
                create_file(path, config)?
            };
            info!(
                in_memory = config.in_memory,
                page_size = config.page_size,
                "environment created"
            );
            self.slot = Slot::Open(env);
            Ok(())
        })
    }

    /// Write buffered state to disk.
    ///
    /// Syncs the file when `enable_fsync` is set; a no-op for in-memory and
    /// read-only environments.
    pub fn flush(&mut self) -> Result<()> {
        reported(|| self.open_env()?.flush())
    }

    /// Effective settings of the open environment.
    pub fn parameters(&self) -> Result<EnvParameters> {
        reported(|| {
            let env = self.open_env()?;
            Ok(EnvParameters {
                path: match &env.backing {
                    Backing::File { path, .. } => Some(path.clone()),
                    Backing::Memory => None,
                },
                page_size: env.config.page_size,
                cache_size: env.config.cache_size,
                max_databases: env.config.max_databases,
                read_only: env.config.read_only,
                in_memory: env.config.in_memory,
                enable_fsync: env.config.enable_fsync,
            })
        })
    }

    /// Close the environment and release its file and lock.
    ///
    /// Closing an unopened or already closed handle succeeds and does
    /// nothing. If the final flush fails the error is returned, but the
    /// handle is closed regardless.
    pub fn close(&mut self) -> Result<()> {
        self.close_with(OpenEnv::flush)
    }

    /// Close with `flush` as the final write; the handle ends Closed even if
    /// it fails.
    fn close_with(&mut self, flush: impl FnOnce(&OpenEnv) -> Result<()>) -> Result<()> {
        match std::mem::replace(&mut self.slot, Slot::Closed) {
            Slot::Open(env) => reported(|| {
                let result = flush(&env);
                if let Backing::File { path, .. } = &env.backing {
                    info!(path = %path.display(), "environment closed");
                }
                drop(env);
                result
            }),
            other => {
                self.slot = other;
                debug!(state = ?self.state(), "close ignored, environment is not open");
                Ok(())
            }
        }
    }

    fn ensure_not_open(&self) -> Result<()> {
        if self.is_open() {
            return Err(Error::new(ErrorCode::EnvironmentAlreadyOpen));
        }
        Ok(())
    }

    fn open_env(&self) -> Result<&OpenEnv> {
        match &self.slot {
            Slot::Open(env) => Ok(env),
            _ => Err(Error::with_message(
                ErrorCode::NotInitialized,
                "environment is not open",
            )),
        }
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if self.is_open()
            && let Err(e) = self.close()
        {
            warn!("failed to close environment on drop: {e}");
        }
    }
}

impl OpenEnv {
    fn flush(&self) -> Result<()> {
        match &self.backing {
            Backing::File { file, path } if self.config.enable_fsync && !self.config.read_only => {
                file.sync_all().map_err(|e| {
                    Error::io(io_error_code(&e), format!("cannot sync {}: {e}", path.display()), e)
                })
            }
            _ => Ok(()),
        }
    }
}

/// Open `path`, lock it and read its header.
fn open_file(path: &Path, config: &EnvConfig) -> Result<OpenEnv> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(!config.read_only)
        .open(path)
        .map_err(|e| file_error(path, "cannot open", e))?;
    lock(&file, path, config.read_only)?;

    let header = FileHeader::read_from(&mut file).map_err(|e| {
        Error::with_message(e.code(), format!("{}: {}", path.display(), e.message()))
    })?;
    debug!(
        path = %path.display(),
        page_size = header.page_size,
        created_by = ?header.engine_version,
        "environment header validated"
    );

    Ok(OpenEnv {
        backing: Backing::File {
            file,
            path: path.to_path_buf(),
        },
        config: EnvConfig {
            page_size: header.page_size,
            max_databases: header.max_databases,
            ..config.clone()
        },
    })
}

/// Create `path`, lock it and write a fresh header page.
fn create_file(path: &Path, config: &EnvConfig) -> Result<OpenEnv> {
    let existed = path.exists();
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(config.file_mode);
    }
    let mut file = options
        .open(path)
        .map_err(|e| file_error(path, "cannot create", e))?;
    let guard = RemoveOnError {
        path,
        armed: !existed,
    };

    lock(&file, path, false)?;
    let page = FileHeader::new(config).to_page()?;
    write_header(&mut file, &page).map_err(|e| file_error(path, "cannot write header to", e))?;
    if config.enable_fsync {
        file.sync_all()
            .map_err(|e| file_error(path, "cannot sync", e))?;
    }
    guard.disarm();

    Ok(OpenEnv {
        backing: Backing::File {
            file,
            path: path.to_path_buf(),
        },
        config: config.clone(),
    })
}

fn write_header(file: &mut File, page: &[u8]) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(page)
}

fn lock(file: &File, path: &Path, shared: bool) -> Result<()> {
    let locked = if shared {
        FileExt::try_lock_shared(file)
    } else {
        FileExt::try_lock_exclusive(file)
    };
    locked.map_err(|e| {
        if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
            let message = format!("{} is locked by another handle", path.display());
            Error::io(ErrorCode::WouldBlock, message, e)
        } else {
            file_error(path, "cannot lock", e)
        }
    })
}

fn file_error(path: &Path, action: &str, err: io::Error) -> Error {
    let code = io_error_code(&err);
    Error::io(code, format!("{action} {}: {}", path.display(), code.message()), err)
}

/// Deletes a file this handle created unless the creation completed.
struct RemoveOnError<'a> {
    path: &'a Path,
    armed: bool,
}

impl RemoveOnError<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RemoveOnError<'_> {
    fn drop(&mut self) {
        if self.armed
            && let Err(e) = fs::remove_file(self.path)
        {
            warn!(
                path = %self.path.display(),
                "cannot remove partially created environment: {e}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::tests::SLOT;

    fn env_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("test.env")
    }

    #[test]
    fn new_handle_is_unopened() {
        let env = Environment::new();
        assert_eq!(env.state(), EnvState::Unopened);
        assert!(env.path().is_none());
    }

    #[test]
    fn create_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = env_path(&dir);
        let cfg = EnvConfig {
            page_size: 4096,
            max_databases: 4,
            ..EnvConfig::default()
        };

        let mut env = Environment::new();
        env.create(&path, &cfg).unwrap();
        assert_eq!(env.state(), EnvState::Open);
        assert_eq!(fs::metadata(&path).unwrap().len(), 4096);
        env.close().unwrap();
        assert_eq!(env.state(), EnvState::Closed);

        // Header values win over the config passed to open.
        env.open(&path, &EnvConfig::default()).unwrap();
        let params = env.parameters().unwrap();
        assert_eq!(params.page_size, 4096);
        assert_eq!(params.max_databases, 4);
        assert_eq!(params.path.as_deref(), Some(path.as_path()));
        assert_eq!(env.path(), Some(path.as_path()));
    }

    #[test]
    fn open_missing_file() {
        let _slot = SLOT.lock();
        let dir = tempfile::tempdir().unwrap();
        let mut env = Environment::new();
        let err = env.open(env_path(&dir), &EnvConfig::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FileNotFound);
        assert_eq!(env.state(), EnvState::Unopened);
    }

    #[test]
    fn open_garbage_file() {
        let _slot = SLOT.lock();
        let dir = tempfile::tempdir().unwrap();
        let path = env_path(&dir);
        fs::write(&path, b"definitely not an environment").unwrap();

        let mut env = Environment::new();
        let err = env.open(&path, &EnvConfig::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvFileHeader);
        assert!(err.message().contains("test.env"));
        assert_eq!(env.state(), EnvState::Unopened);

        // The failed open released its lock.
        fs::write(&path, b"").unwrap();
        let mut other = Environment::new();
        other.create(&path, &EnvConfig::default()).unwrap();
    }

    #[test]
    fn second_handle_would_block() {
        let _slot = SLOT.lock();
        let dir = tempfile::tempdir().unwrap();
        let path = env_path(&dir);
        let mut first = Environment::new();
        first.create(&path, &EnvConfig::default()).unwrap();

        let mut second = Environment::new();
        let err = second.open(&path, &EnvConfig::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::WouldBlock);

        first.close().unwrap();
        second.open(&path, &EnvConfig::default()).unwrap();
    }

    #[test]
    fn open_on_open_handle() {
        let _slot = SLOT.lock();
        let dir = tempfile::tempdir().unwrap();
        let path = env_path(&dir);
        let mut env = Environment::new();
        env.create(&path, &EnvConfig::default()).unwrap();

        let err = env.open(&path, &EnvConfig::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::EnvironmentAlreadyOpen);
        assert!(env.is_open());
    }

    #[test]
    fn read_only_handles_share_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = env_path(&dir);
        Environment::new()
            .create(&path, &EnvConfig::default())
            .unwrap();

        let cfg = EnvConfig {
            read_only: true,
            ..EnvConfig::default()
        };
        let mut a = Environment::new();
        let mut b = Environment::new();
        a.open(&path, &cfg).unwrap();
        b.open(&path, &cfg).unwrap();
        assert!(a.parameters().unwrap().read_only);
        a.flush().unwrap();
    }

    #[test]
    fn create_read_only_is_rejected() {
        let _slot = SLOT.lock();
        let dir = tempfile::tempdir().unwrap();
        let path = env_path(&dir);
        let cfg = EnvConfig {
            read_only: true,
            ..EnvConfig::default()
        };
        let err = Environment::new().create(&path, &cfg).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvParameter);
        assert!(!path.exists());
    }

    #[test]
    fn invalid_page_size_creates_nothing() {
        let _slot = SLOT.lock();
        let dir = tempfile::tempdir().unwrap();
        let path = env_path(&dir);
        let cfg = EnvConfig {
            page_size: 3000,
            ..EnvConfig::default()
        };
        let err = Environment::new().create(&path, &cfg).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvPageSize);
        assert!(!path.exists());
    }

    #[test]
    fn in_memory_environment() {
        let _slot = SLOT.lock();
        let cfg = EnvConfig {
            in_memory: true,
            ..EnvConfig::default()
        };
        let mut env = Environment::new();
        env.create("ignored", &cfg).unwrap();
        assert!(env.path().is_none());
        let params = env.parameters().unwrap();
        assert!(params.in_memory);
        assert!(params.path.is_none());
        env.flush().unwrap();
        env.close().unwrap();

        let err = env.open("ignored", &cfg).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvParameter);
        assert!(!Path::new("ignored").exists());
    }

    #[test]
    fn operations_on_closed_handle() {
        let _slot = SLOT.lock();
        let mut env = Environment::new();
        assert_eq!(env.flush().unwrap_err().code(), ErrorCode::NotInitialized);
        assert_eq!(env.parameters().unwrap_err().code(), ErrorCode::NotInitialized);
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = Environment::new();
        env.close().unwrap();
        assert_eq!(env.state(), EnvState::Unopened);

        env.create(env_path(&dir), &EnvConfig::default()).unwrap();
        env.close().unwrap();
        env.close().unwrap();
        assert_eq!(env.state(), EnvState::Closed);
    }

    #[test]
    fn fsync_enabled_flush() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EnvConfig {
            enable_fsync: true,
            ..EnvConfig::default()
        };
        let mut env = Environment::new();
        env.create(env_path(&dir), &cfg).unwrap();
        env.flush().unwrap();
        assert!(env.parameters().unwrap().enable_fsync);
    }

    #[test]
    fn armed_guard_removes_created_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = env_path(&dir);
        fs::write(&path, b"half-written header").unwrap();
        {
            let _guard = RemoveOnError {
                path: &path,
                armed: true,
            };
        }
        assert!(!path.exists());
    }

    #[test]
    fn disarmed_guard_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = env_path(&dir);
        fs::write(&path, b"complete").unwrap();
        let guard = RemoveOnError {
            path: &path,
            armed: true,
        };
        guard.disarm();
        assert!(path.exists());
    }

    #[test]
    fn failed_final_flush_still_closes() {
        use crate::handler::{ErrorHandler, set_error_handler};
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let _slot = SLOT.lock();
        let dir = tempfile::tempdir().unwrap();
        let path = env_path(&dir);
        let mut env = Environment::new();
        env.create(&path, &EnvConfig::default()).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        set_error_handler(Some(ErrorHandler::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })));
        let err = env
            .close_with(|_| Err(Error::with_message(ErrorCode::IoError, "sync failed")))
            .unwrap_err();
        set_error_handler(None);

        assert_eq!(err.code(), ErrorCode::IoError);
        assert_eq!(env.state(), EnvState::Closed);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // The file and its lock were released despite the failure.
        env.close().unwrap();
        let mut other = Environment::new();
        other.open(&path, &EnvConfig::default()).unwrap();
    }

    #[test]
    fn parameters_serialize_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = env_path(&dir);
        let mut env = Environment::new();
        env.create(&path, &EnvConfig::default()).unwrap();

        let json = serde_json::to_value(env.parameters().unwrap()).unwrap();
        assert_eq!(json["page_size"], crate::config::DEFAULT_PAGE_SIZE);
        assert_eq!(json["in_memory"], false);
        assert_eq!(serde_json::to_value(env.state()).unwrap(), "Open");
    }

    #[test]
    fn drop_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = env_path(&dir);
        {
            let mut env = Environment::new();
            env.create(&path, &EnvConfig::default()).unwrap();
        }
        let mut env = Environment::new();
        env.open(&path, &EnvConfig::default()).unwrap();
    }
}
