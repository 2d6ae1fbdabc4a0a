use crate::backend::{BuildBackend, BuildOutcome, BuildRequest, OutputMode};
use crate::RuntimeError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

const DEFAULT_PROGRAM: &str = "docker";

/// Drives `docker buildx build` as a child process.
///
/// Each request writes its recipe to a temporary file that is removed once
/// the child exits, whatever the outcome.
#[derive(Debug, Clone)]
pub struct BuildxBackend {
    program: String,
    builder: Option<String>,
    recipe_dir: Option<PathBuf>,
}

impl Default for BuildxBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildxBackend {
    pub fn new() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_owned(),
            builder: None,
            recipe_dir: None,
        }
    }

    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Use a named buildx builder instance instead of the current one.
    #[must_use]
    pub fn with_builder(mut self, builder: impl Into<String>) -> Self {
        self.builder = Some(builder.into());
        self
    }

    /// Directory for temporary recipe files. Defaults to the system temp dir.
    #[must_use]
    pub fn with_recipe_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recipe_dir = Some(dir.into());
        self
    }

    /// Arguments passed to the program for `request`, recipe at `recipe_path`.
    pub fn command_args(&self, request: &BuildRequest, recipe_path: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec!["buildx".into(), "build".into()];
        if let Some(builder) = &self.builder {
            args.push("--builder".into());
            args.push(builder.clone());
        }
        args.push("--progress".into());
        args.push("plain".into());

        let platforms: Vec<&str> = request.platforms.iter().map(|p| p.as_str()).collect();
        args.push("--platform".into());
        args.push(platforms.join(","));

        args.push("-f".into());
        args.push(recipe_path.display().to_string());

        match &request.output {
            OutputMode::StagedFilesystem { dest } => {
                args.push("--output".into());
                args.push(format!("type=local,dest={}", dest.display()));
            }
            OutputMode::Image { tags } => {
                if request.push {
                    args.push("--output".into());
                    args.push("type=image".into());
                    args.push("--push".into());
                } else if request.platforms.len() <= 1 {
                    args.push("--load".into());
                } else {
                    args.push("--output".into());
                    args.push("type=image".into());
                }
                for tag in tags {
                    args.push("-t".into());
                    args.push(tag.clone());
                }
            }
        }

        if let Some(to) = &request.cache.to {
            args.push("--cache-to".into());
            args.push(to.clone());
        }
        if let Some(from) = &request.cache.from {
            args.push("--cache-from".into());
            args.push(from.clone());
        }

        args.push(request.context_dir.display().to_string());
        args
    }

    fn write_recipe(&self, recipe: &str) -> Result<tempfile::NamedTempFile, RuntimeError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("fnpack-").suffix(".Dockerfile");
        let mut file = match &self.recipe_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(recipe.as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}

/// The first line of buildx output that reports an internal error.
///
/// buildx occasionally exits 0 after printing `ERROR:` for failures inside
/// the builder; such a run did not produce what was asked for.
pub fn find_internal_diagnostic(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim_start)
        .find(|line| line.starts_with("ERROR:"))
}

impl BuildBackend for BuildxBackend {
    fn name(&self) -> &str {
        "buildx"
    }

    fn available(&self) -> bool {
        Command::new(&self.program)
            .args(["buildx", "version"])
            .stdin(Stdio::null())
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn build(&self, request: &BuildRequest) -> Result<BuildOutcome, RuntimeError> {
        request.validate()?;
        let location = request.image_location();
        if matches!(request.output, OutputMode::Image { .. })
            && !request.push
            && request.platforms.len() > 1
        {
            warn!(
                "{}: multi-platform image without --push stays in the builder cache",
                request.label
            );
        }

        // Dropped after the child exits, removing the file.
        let recipe = self.write_recipe(&request.recipe)?;
        let args = self.command_args(request, recipe.path());
        debug!("{} {}", self.program, args.join(" "));
        info!("building {}", request.label);

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RuntimeError::BackendUnavailable(format!("{} ({e})", self.program))
                } else {
                    RuntimeError::Io(e)
                }
            })?;
        drop(recipe);

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut diagnostics = stderr.trim().to_owned();
        if !stdout.trim().is_empty() {
            if !diagnostics.is_empty() {
                diagnostics.push('\n');
            }
            diagnostics.push_str(stdout.trim());
        }

        if !output.status.success() {
            return Err(RuntimeError::BuildFailed {
                label: request.label.clone(),
                status: output.status.code(),
                diagnostics,
            });
        }
        if let Some(line) = find_internal_diagnostic(&diagnostics) {
            warn!("{}: buildx exited 0 but reported: {line}", request.label);
            return Err(RuntimeError::BuildFailed {
                label: request.label.clone(),
                status: Some(0),
                diagnostics,
            });
        }

        debug!("{} finished ({location})", request.label);
        Ok(BuildOutcome { location })
    }
}
