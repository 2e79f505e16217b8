//! Error taxonomy for the object-store core.
//!
//! The source models errors as *kinds*, not types: `NotFound`, `Exists`, `Waiting`, and
//! `Recheck` are frequently expected control-flow outcomes rather than failures, so they
//! carry no backtrace and are cheap to construct and match on.

use std::fmt;

use snafu::Snafu;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Put aborted: the cell was already populated and overwrites are disabled.
    Exists,
    /// The item isn't present; for `get_for_op` this also means "a waiter was registered".
    NotFound,
    /// Not present, but the caller has already requested it (duplicate `want` suppressed).
    Waiting,
    /// A bulk operation partially succeeded; the caller should inspect per-item results.
    Recheck,
    /// A backend reported failure, or `write_to_iom` was requested with no IOM configured.
    IoError,
    /// A malformed key or out-of-place wildcard.
    InvalidArg,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Exists => "exists",
            Kind::NotFound => "not found",
            Kind::Waiting => "waiting",
            Kind::Recheck => "recheck",
            Kind::IoError => "io error",
            Kind::InvalidArg => "invalid argument",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("{kind}: {message}"))]
pub struct KelpieError {
    pub kind: Kind,
    pub message: String,
}

impl KelpieError {
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn exists() -> Self {
        Self::new(Kind::Exists, "cell already populated and overwrites are disabled")
    }

    pub fn not_found() -> Self {
        Self::new(Kind::NotFound, "key not present")
    }

    pub fn waiting() -> Self {
        Self::new(Kind::Waiting, "a want for this key is already pending")
    }

    pub fn recheck() -> Self {
        Self::new(Kind::Recheck, "batch operation partially succeeded")
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(Kind::IoError, message)
    }

    pub fn invalid_arg(message: impl Into<String>) -> Self {
        Self::new(Kind::InvalidArg, message)
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }
}

impl From<std::io::Error> for KelpieError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KelpieError>;

/// The outcome of an operation that can succeed plainly (`Ok`) or succeed while leaving
/// pending side effects behind (`TODO` in the source's taxonomy) — for example, a `put`
/// that populated a previously-empty cell and fired waiters as a result.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    pub triggered_dependencies: bool,
}

impl<T> Outcome<T> {
    pub fn plain(value: T) -> Self {
        Self {
            value,
            triggered_dependencies: false,
        }
    }

    pub fn triggered(value: T) -> Self {
        Self {
            value,
            triggered_dependencies: true,
        }
    }
}
