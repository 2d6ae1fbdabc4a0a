//! Build backends for fnpack.
//!
//! This crate implements the process boundary of a packaging run: the
//! `BuildBackend` trait that executes a rendered multi-stage recipe against a
//! staging context, the `BuildxBackend` that drives `docker buildx build`, the
//! in-process `MockBackend` used by tests and dry runs, and prerequisite checks
//! for the external tooling.

pub mod backend;
pub mod buildx;
pub mod mock;
pub mod prereq;

pub use backend::{
    select_backend, BuildBackend, BuildOutcome, BuildRequest, CacheHints, ImageLocation,
    OutputMode,
};
pub use buildx::{find_internal_diagnostic, BuildxBackend};
pub use mock::{MockBackend, MOCK_FAIL_ENV};
pub use prereq::{check_buildx_prereqs, format_missing, MissingPrereq};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("invalid build request: {0}")]
    InvalidRequest(String),
    #[error("build of {label} failed (exit status {}):\n{diagnostics}", fmt_status(.status))]
    BuildFailed {
        label: String,
        status: Option<i32>,
        diagnostics: String,
    },
    #[error("store error: {0}")]
    Store(#[from] fnpack_store::StoreError),
}

fn fmt_status(status: &Option<i32>) -> String {
    status.map_or_else(|| "signal".to_owned(), |c| c.to_string())
}
