//! Process-wide diagnostic channel.
//!
//! At most one [`ErrorHandler`] is installed at a time. Every failing
//! environment operation hands a [`Diagnostic`] to it exactly once, in
//! addition to returning the [`Error`] to its caller. Installing or clearing
//! the handler never changes what the caller receives.
//!
//! Only failures are dispatched; successful operations are reported through
//! `tracing` instead.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{trace, warn};

use crate::error::{Error, ErrorCode};

/// A failure notification delivered to the installed handler.
///
/// Borrowed for the duration of the call; copy out what you need to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostic<'a> {
    /// Outcome code of the failed operation
    pub code: ErrorCode,
    /// Message returned to the caller alongside the code
    pub message: &'a str,
}

impl<'a> Diagnostic<'a> {
    /// Diagnostic mirroring a caller-facing error.
    pub fn from_error(err: &'a Error) -> Self {
        Self {
            code: err.code(),
            message: err.message(),
        }
    }
}

impl fmt::Display for Diagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

type HandlerFn = dyn Fn(&Diagnostic<'_>) + Send + Sync;

/// Callable receiving every failure diagnostic.
#[derive(Clone)]
pub struct ErrorHandler(Arc<HandlerFn>);

impl ErrorHandler {
    /// Wrap a closure as a handler.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Diagnostic<'_>) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// True if both values wrap the same closure.
    pub fn ptr_eq(&self, other: &ErrorHandler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn call(&self, diagnostic: &Diagnostic<'_>) {
        (self.0)(diagnostic)
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErrorHandler")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

static HANDLER: RwLock<Option<ErrorHandler>> = RwLock::new(None);

/// Install `handler` as the process-wide error handler, or clear it with `None`.
///
/// The new handler replaces the previous one (they never stack) and is seen
/// by every call that starts after this returns. The previous handler is
/// returned.
pub fn set_error_handler(handler: Option<ErrorHandler>) -> Option<ErrorHandler> {
    let installed = handler.is_some();
    let previous = std::mem::replace(&mut *HANDLER.write(), handler);
    trace!(installed, replaced = previous.is_some(), "error handler updated");
    previous
}

/// The currently installed handler, if any.
pub fn error_handler() -> Option<ErrorHandler> {
    HANDLER.read().clone()
}

/// Mirror `err` to the installed handler.
///
/// The handler runs after the slot lock is released, so it may itself call
/// into the engine or install another handler. A panicking handler is
/// contained here and logged.
pub(crate) fn dispatch(err: &Error) {
    let Some(handler) = error_handler() else {
        return;
    };
    let diagnostic = Diagnostic::from_error(err);
    if panic::catch_unwind(AssertUnwindSafe(|| handler.call(&diagnostic))).is_err() {
        warn!(code = err.code().code(), "error handler panicked; diagnostic dropped");
    }
}

/// Run `op` and mirror its failure, if any, to the installed handler.
pub(crate) fn reported<T>(op: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
    op().inspect_err(dispatch)
}
