use super::{
    colorize_kind, json_pretty, load_config, spin_fail, spin_ok, spinner, EXIT_SUCCESS,
    EXIT_TASKS_FAILED,
};
use fnpack_core::{BuildOptions, Engine, RunReport};
use fnpack_runtime::{select_backend, CacheHints};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug)]
pub struct BuildArgs {
    pub dist: PathBuf,
    pub cache: CacheHints,
    pub push: bool,
    pub concurrency: usize,
    pub backend: String,
    pub builder: Option<String>,
}

pub fn run(config_path: &Path, args: &BuildArgs, json: bool) -> Result<u8, String> {
    let config = load_config(config_path)?;
    let backend = select_backend(&args.backend, args.builder.as_deref()).map_err(|e| e.to_string())?;
    debug!("using {} backend, dist {}", backend.name(), args.dist.display());

    let engine = Engine::new(&args.dist, backend);
    let options = BuildOptions {
        cache: args.cache.clone(),
        push: args.push,
        concurrency: args.concurrency,
    };

    let tasks: usize = fnpack_core::plan(&config)
        .iter()
        .map(|t| t.platforms.len())
        .sum();
    let pb = if json {
        None
    } else {
        Some(spinner(&format!("building {tasks} tasks...")))
    };

    let report = match engine.run(&config, &options) {
        Ok(r) => r,
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "build aborted");
            }
            return Err(e.to_string());
        }
    };

    if let Some(ref pb) = pb {
        let msg = format!(
            "{} of {} tasks succeeded",
            report.succeeded, report.attempted
        );
        if report.is_success() {
            spin_ok(pb, &msg);
        } else {
            spin_fail(pb, &msg);
        }
    }

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(if report.is_success() {
        EXIT_SUCCESS
    } else {
        EXIT_TASKS_FAILED
    })
}

fn print_summary(report: &RunReport) {
    for artifact in &report.artifacts {
        println!(
            "  {:<9} {:<20} {:<14} {}",
            colorize_kind(&artifact.kind.to_string()),
            artifact.name,
            artifact.platform().unwrap_or("-"),
            artifact.path
        );
    }
    for failure in &report.failures {
        println!(
            "  {:<9} {:<20} {:<14} {}: {}",
            colorize_kind("failed"),
            failure.target,
            failure.platform,
            failure.phase,
            failure.error.lines().next().unwrap_or_default()
        );
    }
    println!();
    println!(
        "attempted: {}, succeeded: {}, failed: {}",
        report.attempted,
        report.succeeded,
        report.failed()
    );
    println!("manifest: {}", report.manifest_path.display());
}
