use crate::RuntimeError;
use fnpack_schema::Platform;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Where the backend should put the result of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Export the final stage's filesystem into `dest` on the host.
    StagedFilesystem { dest: PathBuf },
    /// Produce an image carrying every tag in `tags`.
    Image { tags: Vec<String> },
}

/// Cache import/export specifications passed through to the backend verbatim
/// (e.g. `type=local,src=/tmp/cache`, `type=gha`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHints {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl CacheHints {
    /// The same spec used for import and export.
    pub fn shared(spec: impl Into<String>) -> Self {
        let spec = spec.into();
        Self {
            from: Some(spec.clone()),
            to: Some(spec),
        }
    }
}

/// One backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Human-readable identity used in logs and errors, e.g. `api (linux/amd64)`.
    pub label: String,
    pub recipe: String,
    pub context_dir: PathBuf,
    pub platforms: Vec<Platform>,
    pub output: OutputMode,
    pub cache: CacheHints,
    pub push: bool,
}

impl BuildRequest {
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.platforms.is_empty() {
            return Err(RuntimeError::InvalidRequest(format!(
                "{}: at least one platform is required",
                self.label
            )));
        }
        if let OutputMode::Image { tags } = &self.output {
            if tags.is_empty() {
                return Err(RuntimeError::InvalidRequest(format!(
                    "{}: image output needs at least one tag",
                    self.label
                )));
            }
        }
        if !self.context_dir.is_dir() {
            return Err(RuntimeError::InvalidRequest(format!(
                "{}: build context {} is not a directory",
                self.label,
                self.context_dir.display()
            )));
        }
        Ok(())
    }

    /// Where the result of this request ends up.
    pub fn image_location(&self) -> ImageLocation {
        match self.output {
            OutputMode::StagedFilesystem { .. } => ImageLocation::Filesystem,
            OutputMode::Image { .. } if self.push => ImageLocation::Registry,
            OutputMode::Image { .. } if self.platforms.len() <= 1 => ImageLocation::LocalDaemon,
            // A single local image cannot hold several platform variants.
            OutputMode::Image { .. } => ImageLocation::BuilderCache,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageLocation {
    Filesystem,
    Registry,
    LocalDaemon,
    BuilderCache,
}

impl fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesystem => f.write_str("filesystem"),
            Self::Registry => f.write_str("registry"),
            Self::LocalDaemon => f.write_str("local-daemon"),
            Self::BuilderCache => f.write_str("builder-cache"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub location: ImageLocation,
}

pub trait BuildBackend: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Execute one build. Blocks until the backend exits.
    ///
    /// Backend failures surface as [`RuntimeError::BuildFailed`] with the
    /// backend's own diagnostic text; nothing is retried.
    fn build(&self, request: &BuildRequest) -> Result<BuildOutcome, RuntimeError>;
}

pub fn select_backend(
    name: &str,
    builder: Option<&str>,
) -> Result<Arc<dyn BuildBackend>, RuntimeError> {
    match name {
        "buildx" => {
            let mut backend = crate::buildx::BuildxBackend::new();
            if let Some(b) = builder {
                backend = backend.with_builder(b);
            }
            Ok(Arc::new(backend))
        }
        "mock" => Ok(Arc::new(crate::mock::MockBackend::from_env())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}
