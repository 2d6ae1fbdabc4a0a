pub mod build;
pub mod completions;
pub mod doctor;
pub mod graph;
pub mod init;
pub mod man_pages;
pub mod plan;
pub mod render;

use fnpack_schema::{load_config_file, PackageConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_TASKS_FAILED: u8 = 3;

/// Errors starting with this prefix exit with `EXIT_CONFIG_ERROR`.
pub const CONFIG_ERROR_PREFIX: &str = "configuration error";

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Load and validate the configuration file.
pub fn load_config(path: &Path) -> Result<PackageConfig, String> {
    let config = load_config_file(path)
        .map_err(|e| format!("{CONFIG_ERROR_PREFIX}: {}: {e}", path.display()))?;
    config
        .validate()
        .map_err(|e| format!("{CONFIG_ERROR_PREFIX}: {e}"))?;
    Ok(config)
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn plain_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_kind(kind: &str) -> String {
    use console::Style;
    match kind {
        "function" => Style::new().green().apply_to(kind).to_string(),
        "layer" => Style::new().cyan().apply_to(kind).to_string(),
        "failed" => Style::new().red().bold().apply_to(kind).to_string(),
        other => other.to_owned(),
    }
}
