//! Build orchestration for fnpack.
//!
//! This crate ties the configuration schema, the distribution store, and the
//! build backends together: the planner resolves a validated `PackageConfig`
//! into self-describing `BuildTarget`s, the recipe renderer turns a target into
//! a multi-stage build description, staging assembles a disposable build
//! context per task, and the `Engine` runs every (target, platform) task on a
//! bounded worker pool, archiving or tagging results and recording them in the
//! build manifest.

pub mod concurrency;
pub mod engine;
pub mod planner;
pub mod recipe;
pub mod staging;

pub use concurrency::{effective_workers, DistLock};
pub use engine::{BuildOptions, Engine, RunReport, TaskFailure};
pub use planner::{dependency_graph, plan, BuildTarget, LayerInput};
pub use recipe::{render, render_target, LayerStage, RenderError};
pub use staging::{StagingContext, StagingError};

use thiserror::Error;

/// Errors that stop a whole run.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(#[from] fnpack_schema::ConfigError),
    #[error("store error: {0}")]
    Store(#[from] fnpack_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] fnpack_runtime::RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("distribution root is in use by another run (lock: {0})")]
    Lock(String),
    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Errors confined to a single (target, platform) task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("staging failed: {0}")]
    Staging(#[from] StagingError),
    #[error("{0}")]
    Backend(#[from] fnpack_runtime::RuntimeError),
    #[error("archive export failed: {0}")]
    Export(#[from] fnpack_store::StoreError),
    #[error("failed to record artifact: {0}")]
    Record(#[source] fnpack_store::StoreError),
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Short name of the step that failed.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Render(_) => "render",
            Self::Staging(_) => "staging",
            Self::Backend(_) => "backend",
            Self::Export(_) => "export",
            Self::Record(_) => "record",
            Self::Panicked(_) => "panic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_error_phases() {
        assert_eq!(TaskError::from(RenderError::MissingEntryPoint).phase(), "render");
        let backend = fnpack_runtime::RuntimeError::BuildFailed {
            label: "api (linux/amd64)".to_owned(),
            status: Some(1),
            diagnostics: "ERROR: boom".to_owned(),
        };
        let e = TaskError::from(backend);
        assert_eq!(e.phase(), "backend");
        assert!(e.to_string().contains("ERROR: boom"));
    }

    #[test]
    fn config_error_converts() {
        let e: CoreError = fnpack_schema::ConfigError::EmptyName.into();
        assert!(matches!(e, CoreError::Config(_)));
    }
}
