use crate::concurrency::{effective_workers, DistLock};
use crate::planner::{plan, BuildTarget};
use crate::recipe::render_target;
use crate::staging::{StagingContext, StagingError};
use crate::{CoreError, TaskError};
use fnpack_runtime::{BuildBackend, BuildRequest, CacheHints, OutputMode, RuntimeError};
use fnpack_schema::{OutputFormat, PackageConfig, Platform, TargetKind};
use fnpack_store::{export_archive, ArtifactRecord, DistLayout, ManifestAggregator};
use rayon::prelude::*;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub cache: CacheHints,
    /// Push image targets to their registry.
    pub push: bool,
    /// Maximum number of tasks in flight; 0 and 1 both mean serial.
    pub concurrency: usize,
}

/// A task that did not produce an artifact.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskFailure {
    pub target: String,
    pub kind: TargetKind,
    pub platform: String,
    pub phase: String,
    pub error: String,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<TaskFailure>,
    pub manifest_path: PathBuf,
    pub artifacts: Vec<ArtifactRecord>,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs build tasks against one distribution root.
pub struct Engine {
    layout: DistLayout,
    backend: Arc<dyn BuildBackend>,
}

impl Engine {
    pub fn new(dist_root: impl Into<PathBuf>, backend: Arc<dyn BuildBackend>) -> Self {
        Self {
            layout: DistLayout::new(dist_root),
            backend,
        }
    }

    pub fn layout(&self) -> &DistLayout {
        &self.layout
    }

    /// Validate, plan, and build everything `config` declares.
    ///
    /// Configuration problems and an unavailable backend fail the call before
    /// any task starts. Task failures are collected in the report.
    pub fn run(&self, config: &PackageConfig, options: &BuildOptions) -> Result<RunReport, CoreError> {
        config.validate()?;
        if !self.backend.available() {
            return Err(RuntimeError::BackendUnavailable(self.backend.name().to_owned()).into());
        }
        let targets = plan(config);
        self.run_plan(&targets, options)
    }

    /// Build already-planned targets, one task per (target, platform).
    pub fn run_plan(
        &self,
        targets: &[BuildTarget],
        options: &BuildOptions,
    ) -> Result<RunReport, CoreError> {
        self.layout.initialize()?;
        let _lock = DistLock::try_acquire(&self.layout.lock_file())?;

        let tasks: Vec<(&BuildTarget, &Platform)> = targets
            .iter()
            .flat_map(|t| t.platforms.iter().map(move |p| (t, p)))
            .collect();
        let workers = effective_workers(options.concurrency);
        info!(
            "{} build tasks into {} (concurrency {workers}, backend {})",
            tasks.len(),
            self.layout.root().display(),
            self.backend.name()
        );
        if tasks.is_empty() {
            warn!("configuration declares no layers or functions");
        }

        let manifest = ManifestAggregator::new(self.layout.clone());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fnpack-worker-{i}"))
            .build()?;

        let outcomes: Vec<Result<(), TaskFailure>> = pool.install(|| {
            tasks
                .par_iter()
                .map(|(target, platform)| {
                    self.run_task_guarded(target, platform, options, &manifest)
                        .map_err(|e| {
                            warn!("{} failed during {}: {e}", target.label(platform), e.phase());
                            TaskFailure {
                                target: target.name.to_string(),
                                kind: target.kind,
                                platform: platform.to_string(),
                                phase: e.phase().to_owned(),
                                error: e.to_string(),
                            }
                        })
                })
                .collect()
        });

        let attempted = outcomes.len();
        let failures: Vec<TaskFailure> = outcomes.into_iter().filter_map(Result::err).collect();
        let manifest_path = manifest.save()?;
        let artifacts = manifest.snapshot()?;

        info!(
            "{attempted} attempted, {} succeeded, {} failed",
            attempted - failures.len(),
            failures.len()
        );
        Ok(RunReport {
            attempted,
            succeeded: attempted - failures.len(),
            failures,
            manifest_path,
            artifacts,
        })
    }

    /// Run one task, turning a panic into a task failure.
    fn run_task_guarded(
        &self,
        target: &BuildTarget,
        platform: &Platform,
        options: &BuildOptions,
        manifest: &ManifestAggregator,
    ) -> Result<(), TaskError> {
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_task(target, platform, options, manifest)
        }))
        .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload.as_ref()))))
    }

    fn run_task(
        &self,
        target: &BuildTarget,
        platform: &Platform,
        options: &BuildOptions,
        manifest: &ManifestAggregator,
    ) -> Result<(), TaskError> {
        let arch = platform.arch();
        let label = target.label(platform);
        info!("building {} {label}", target.kind);

        self.layout
            .prepare_task_dir(&target.name, &arch)
            .map_err(StagingError::from)?;
        // Removed on every exit path when this goes out of scope.
        let context = StagingContext::assemble(target)?;
        let recipe = render_target(target)?;

        let mut request = BuildRequest {
            label,
            recipe,
            context_dir: context.path().to_path_buf(),
            platforms: vec![platform.clone()],
            output: OutputMode::Image { tags: Vec::new() },
            cache: options.cache.clone(),
            push: false,
        };

        match target.output {
            OutputFormat::Archive => {
                let asset = self.layout.asset_dir(&target.name, &arch);
                request.output = OutputMode::StagedFilesystem {
                    dest: asset.clone(),
                };
                self.backend.build(&request)?;
                self.archive(target, platform, &asset, manifest)?;
            }
            OutputFormat::Image => {
                let tag = target.tag_for(platform);
                request.output = OutputMode::Image {
                    tags: vec![tag.clone()],
                };
                request.push = options.push;
                let outcome = self.backend.build(&request)?;
                let record = ArtifactRecord::new(target.name.as_str(), target.kind, tag)
                    .with_meta("platform", platform.as_str())
                    .with_meta("runtime", target.runtime.as_str())
                    .with_meta("format", "image")
                    .with_meta("image_location", outcome.location.to_string());
                manifest.add(record).map_err(TaskError::Record)?;
            }
        }
        info!("finished {}", request.label);
        Ok(())
    }

    fn archive(
        &self,
        target: &BuildTarget,
        platform: &Platform,
        asset: &Path,
        manifest: &ManifestAggregator,
    ) -> Result<(), TaskError> {
        let arch = platform.arch();
        let dest = self
            .layout
            .archive_path(&target.name, &arch, target.archive_format);
        let summary = export_archive(asset, &dest, target.archive_format)?;
        debug!(
            "{} -> {} ({} entries, {} bytes)",
            asset.display(),
            dest.display(),
            summary.entries,
            summary.size
        );
        let metadata = BTreeMap::from([
            ("platform".to_owned(), platform.to_string()),
            ("runtime".to_owned(), target.runtime.to_string()),
            ("format".to_owned(), target.archive_format.extension().to_owned()),
            ("digest".to_owned(), summary.digest),
        ]);
        manifest
            .add_archive(target.name.as_str(), target.kind, &dest, metadata)
            .map_err(TaskError::Record)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}
