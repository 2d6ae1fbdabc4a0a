use crate::backend::{BuildBackend, BuildOutcome, BuildRequest, OutputMode};
use crate::RuntimeError;
use fnpack_store::copy_tree;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;
use tracing::debug;

/// Comma-separated target names the mock backend should fail, read by
/// [`MockBackend::from_env`].
pub const MOCK_FAIL_ENV: &str = "FNPACK_MOCK_FAIL";

/// Build variables the recipe may reference.
const KNOWN_VARS: &[(&str, &str)] = &[("LAMBDA_TASK_ROOT", "/var/task")];

/// In-process backend that interprets the file-system subset of a recipe.
///
/// Every stage starts from an empty root; `WORKDIR` and `COPY` (including
/// `COPY --from=<stage>`) are applied on the host, `RUN` is recorded and
/// skipped. A staged-filesystem request receives the final stage's root.
#[derive(Debug, Default)]
pub struct MockBackend {
    fail: BTreeSet<String>,
    requests: Mutex<Vec<BuildRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock whose failing targets come from `FNPACK_MOCK_FAIL`.
    pub fn from_env() -> Self {
        let mut backend = Self::new();
        if let Ok(list) = std::env::var(MOCK_FAIL_ENV) {
            for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                backend = backend.fail_on(name);
            }
        }
        backend
    }

    /// Make requests for `target` fail. Matches either the full label or the
    /// target name in front of ` (<platform>)`.
    #[must_use]
    pub fn fail_on(mut self, target: impl Into<String>) -> Self {
        self.fail.insert(target.into());
        self
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<BuildRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn should_fail(&self, label: &str) -> bool {
        let name = label.split(" (").next().unwrap_or(label);
        self.fail.contains(label) || self.fail.contains(name)
    }
}

impl BuildBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn build(&self, request: &BuildRequest) -> Result<BuildOutcome, RuntimeError> {
        request.validate()?;
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if self.should_fail(&request.label) {
            return Err(RuntimeError::BuildFailed {
                label: request.label.clone(),
                status: Some(1),
                diagnostics: "ERROR: mock backend configured to fail".to_owned(),
            });
        }

        let final_root = interpret(&request.recipe, &request.context_dir).map_err(|msg| {
            RuntimeError::BuildFailed {
                label: request.label.clone(),
                status: Some(1),
                diagnostics: format!("ERROR: {msg}"),
            }
        })?;

        if let OutputMode::StagedFilesystem { dest } = &request.output {
            fs::create_dir_all(dest)?;
            if let Some(root) = &final_root {
                copy_tree(root.path(), dest)?;
            }
        }

        debug!("mock build of {} complete", request.label);
        Ok(BuildOutcome {
            location: request.image_location(),
        })
    }
}

struct Stage {
    root: TempDir,
    workdir: String,
}

/// Apply the recipe to per-stage temporary roots and return the last one.
fn interpret(recipe: &str, context: &Path) -> Result<Option<TempDir>, String> {
    let mut stages: Vec<Stage> = Vec::new();
    let mut names: BTreeMap<String, usize> = BTreeMap::new();

    for (idx, raw) in recipe.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut words = line.split_whitespace();
        let instruction = words.next().unwrap_or_default().to_ascii_uppercase();
        let rest: Vec<&str> = words.collect();

        if instruction == "FROM" {
            let args: Vec<&str> = rest
                .iter()
                .copied()
                .filter(|w| !w.starts_with("--"))
                .collect();
            if args.is_empty() {
                return Err(format!("line {lineno}: FROM requires a base"));
            }
            let root = tempfile::Builder::new()
                .prefix("fnpack-mock-")
                .tempdir()
                .map_err(|e| format!("line {lineno}: {e}"))?;
            if args.len() >= 3 && args[1].eq_ignore_ascii_case("as") {
                names.insert(args[2].to_owned(), stages.len());
            }
            stages.push(Stage {
                root,
                workdir: "/".to_owned(),
            });
            continue;
        }

        let Some(current) = stages.len().checked_sub(1) else {
            return Err(format!("line {lineno}: {instruction} before FROM"));
        };

        match instruction.as_str() {
            "WORKDIR" => {
                let dir = expand(rest.first().copied().unwrap_or("/"));
                let stage = &mut stages[current];
                let next = if dir.starts_with('/') {
                    dir
                } else {
                    format!("{}/{dir}", stage.workdir.trim_end_matches('/'))
                };
                fs::create_dir_all(host_path(stage.root.path(), "/", &next))
                    .map_err(|e| format!("line {lineno}: {e}"))?;
                stage.workdir = next;
            }
            "COPY" | "ADD" => {
                let mut from = None;
                let mut operands = Vec::new();
                for word in &rest {
                    if let Some(stage) = word.strip_prefix("--from=") {
                        from = Some(stage);
                    } else if !word.starts_with("--") {
                        operands.push(expand(word));
                    }
                }
                if operands.len() < 2 {
                    return Err(format!("line {lineno}: COPY needs a source and a destination"));
                }
                let dest_spec = operands.pop().unwrap_or_default();

                let source_root: PathBuf = match from {
                    Some(name) => {
                        let idx = *names
                            .get(name)
                            .ok_or_else(|| format!("line {lineno}: unknown stage '{name}'"))?;
                        stages[idx].root.path().to_path_buf()
                    }
                    None => context.to_path_buf(),
                };
                let stage = &stages[current];
                let dest = host_path(stage.root.path(), &stage.workdir, &dest_spec);
                let dest_is_dir = dest_spec.ends_with('/') || dest_spec == "." || dest.is_dir();

                for src_spec in &operands {
                    let src = source_root.join(src_spec.trim_start_matches('/'));
                    copy_operand(&src, &dest, dest_is_dir)
                        .map_err(|e| format!("line {lineno}: COPY {src_spec}: {e}"))?;
                }
            }
            "RUN" => debug!("mock: skipping RUN on line {lineno}"),
            _ => {}
        }
    }

    Ok(stages.pop().map(|s| s.root))
}

fn copy_operand(src: &Path, dest: &Path, dest_is_dir: bool) -> Result<(), String> {
    let meta = fs::symlink_metadata(src).map_err(|_| format!("{} not found", src.display()))?;
    if meta.is_dir() {
        fs::create_dir_all(dest).map_err(|e| e.to_string())?;
        copy_tree(src, dest).map_err(|e| e.to_string())?;
        return Ok(());
    }
    let target = if dest_is_dir {
        let name = src
            .file_name()
            .ok_or_else(|| format!("{} has no file name", src.display()))?;
        dest.join(name)
    } else {
        dest.to_path_buf()
    };
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    fs::copy(src, &target).map_err(|e| e.to_string())?;
    Ok(())
}

fn expand(word: &str) -> String {
    let mut out = word.to_owned();
    for (key, value) in KNOWN_VARS {
        out = out
            .replace(&format!("${{{key}}}"), value)
            .replace(&format!("${key}"), value);
    }
    out
}

fn host_path(root: &Path, workdir: &str, path: &str) -> PathBuf {
    let full = if path.starts_with('/') {
        PathBuf::from(path)
    } else {
        Path::new(workdir).join(path)
    };
    let mut out = root.to_path_buf();
    for part in full.components() {
        if let std::path::Component::Normal(p) = part {
            out.push(p);
        }
    }
    out
}
