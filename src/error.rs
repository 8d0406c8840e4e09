use std::fmt;
use std::io;

use thiserror::Error;

/// Result type for burrowdb operations
pub type Result<T> = std::result::Result<T, Error>;

macro_rules! error_codes {
    ($( $(#[$meta:meta])* $name:ident = $value:literal => $message:literal, )+) => {
        /// Outcome code of an engine operation.
        ///
        /// Numeric values are part of the stable interface: new codes are only
        /// ever appended and an existing value never changes its meaning.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        #[non_exhaustive]
        pub enum ErrorCode {
            $( $(#[$meta])* $name = $value, )+
        }

        impl ErrorCode {
            /// Every registered code, in declaration order.
            pub const ALL: &'static [ErrorCode] = &[ $( ErrorCode::$name, )+ ];

            /// Looks up a code by its numeric value.
            pub const fn from_code(code: i32) -> Option<Self> {
                match code {
                    $( $value => Some(ErrorCode::$name), )+
                    _ => None,
                }
            }

            /// Default human-readable message for this code.
            pub const fn message(self) -> &'static str {
                match self {
                    $( ErrorCode::$name => $message, )+
                }
            }
        }
    };
}

error_codes! {
    /// Success
    Ok = 0 => "Success",
    /// Invalid record size
    InvRecordSize = -2 => "Invalid record size",
    /// Invalid key size
    InvKeySize = -3 => "Invalid key size",
    /// Invalid page size
    InvPageSize = -4 => "Invalid page size",
    /// Out of memory
    OutOfMemory = -6 => "Out of memory",
    /// Object not initialized
    NotInitialized = -7 => "Object not initialized",
    /// Invalid function parameter
    InvParameter = -8 => "Invalid parameter",
    /// Invalid file header
    InvFileHeader = -9 => "Invalid database file header",
    /// Invalid file version
    InvFileVersion = -10 => "Invalid database file version",
    /// Key was not found
    KeyNotFound = -11 => "Key not found",
    /// Tried to insert a key which already exists
    DuplicateKey = -12 => "Duplicate key",
    /// Internal database integrity violated
    IntegrityViolated = -13 => "Internal integrity violated",
    /// Internal error
    InternalError = -14 => "Internal error",
    /// Tried to modify a read-only environment
    WriteProtected = -15 => "Database opened in read-only mode",
    /// Data blob not found
    BlobNotFound = -16 => "Data blob not found",
    /// Generic file I/O error
    IoError = -18 => "System I/O error",
    /// Function is not yet implemented
    NotImplemented = -20 => "Operation not implemented",
    /// File not found
    FileNotFound = -21 => "File not found",
    /// Operation would block
    WouldBlock = -22 => "Operation would block",
    /// Object was not initialized correctly
    NotReady = -23 => "Object was not initialized correctly",
    /// Database limits reached
    LimitsReached = -24 => "Database limits reached",
    /// Object was already initialized
    AlreadyInitialized = -27 => "Object was already initialized",
    /// Database needs recovery
    NeedRecovery = -28 => "Database needs recovery",
    /// Cursor must be closed prior to transaction abort/commit
    CursorStillOpen = -29 => "Cursor must be closed prior to Transaction abort/commit",
    /// Record filter or file filter not found
    FilterNotFound = -30 => "Record filter or file filter not found",
    /// Operation conflicts with another transaction
    TxnConflict = -31 => "Operation conflicts with another Transaction",
    /// Key was erased in a transaction
    KeyErasedInTxn = -32 => "Database key was erased in a Transaction",
    /// Environment or database closed while a transaction was open
    TxnStillOpen = -33 => "Cannot close Database/Environment while a Transaction is open",
    /// Cursor does not point to a valid item
    CursorIsNil = -100 => "Cursor points to NIL",
    /// Database not found
    DatabaseNotFound = -200 => "Database not found",
    /// Database name already exists
    DatabaseAlreadyExists = -201 => "Database name already exists",
    /// Database already open
    DatabaseAlreadyOpen = -202 => "Database already open, or: Database handle already initialized",
    /// Environment already open
    EnvironmentAlreadyOpen = -203 => "Environment already open, or: Environment handle already initialized",
    /// Invalid log file header
    LogInvFileHeader = -300 => "Invalid log file header",
    /// Remote I/O error
    NetworkError = -400 => "Remote I/O error/Network error",
}

impl ErrorCode {
    /// Numeric value of this code.
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// True only for [`ErrorCode::Ok`].
    pub const fn is_ok(self) -> bool {
        matches!(self, ErrorCode::Ok)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

/// Message for a raw numeric code, `"Unknown error"` if it is not registered.
pub fn strerror(code: i32) -> &'static str {
    ErrorCode::from_code(code).map_or("Unknown error", ErrorCode::message)
}

/// Failure of an engine operation.
///
/// Match on [`Error::code`]; the message is informational and may be
/// replaced by the caller-facing layer.
#[derive(Debug, Error)]
#[error("{message} ({})", .code.code())]
pub struct Error {
    code: ErrorCode,
    message: String,
    #[source]
    source: Option<io::Error>,
}

impl Error {
    /// Error with the code's default message.
    pub fn new(code: ErrorCode) -> Self {
        let code = failure_code(code);
        Self::with_message(code, code.message())
    }

    /// Error with a custom message.
    ///
    /// An error never carries [`ErrorCode::Ok`]; passing it yields
    /// [`ErrorCode::InternalError`] with the given message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: failure_code(code),
            message: message.into(),
            source: None,
        }
    }

    /// The outcome code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn io(code: ErrorCode, message: impl Into<String>, err: io::Error) -> Self {
        Self {
            source: Some(err),
            ..Self::with_message(code, message)
        }
    }
}

const fn failure_code(code: ErrorCode) -> ErrorCode {
    if code.is_ok() {
        ErrorCode::InternalError
    } else {
        code
    }
}

/// Maps an I/O error kind onto the registry.
pub(crate) fn io_error_code(err: &io::Error) -> ErrorCode {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorCode::FileNotFound,
        io::ErrorKind::WouldBlock => ErrorCode::WouldBlock,
        io::ErrorKind::OutOfMemory => ErrorCode::OutOfMemory,
        io::ErrorKind::PermissionDenied => ErrorCode::WriteProtected,
        _ => ErrorCode::IoError,
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        let code = io_error_code(&err);
        Error::io(code, err.to_string(), err)
    }
}
