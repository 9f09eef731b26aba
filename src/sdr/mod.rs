//! SDR device shims.
//!
//! Both drivers are bound at runtime with `libloading`, so the binaries
//! build and start without the vendor libraries installed; a missing driver
//! or device surfaces as a fatal startup error.

mod hackrf;
mod rtlsdr;

pub use hackrf::HackRf;
pub use rtlsdr::{RtlSdr, DEFAULT_BUF_LENGTH};

use thiserror::Error;

pub type SdrResult<T> = Result<T, SdrError>;

#[derive(Debug, Error)]
pub enum SdrError {
    #[error("SDR driver library not found: {0}")]
    LibraryNotFound(&'static str),

    #[error("missing driver symbol {0}: {1}")]
    MissingSymbol(&'static str, String),

    #[error("no device found")]
    NoDevice,

    #[error("device open failed: error code {0}")]
    OpenFailed(i32),

    #[error("{op} failed: error code {code}")]
    OperationFailed { op: &'static str, code: i32 },

    #[error("short read: got {got} of {expected} bytes")]
    ShortRead { expected: usize, got: usize },

    #[error("TX already streaming")]
    AlreadyStreaming,
}

impl SdrError {
    pub(crate) fn op(op: &'static str, code: i32) -> Self {
        Self::OperationFailed { op, code }
    }
}
