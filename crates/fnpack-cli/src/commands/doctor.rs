use super::{load_config, EXIT_FAILURE, EXIT_SUCCESS};
use fnpack_runtime::{check_buildx_prereqs, format_missing, BuildBackend, BuildxBackend};
use std::path::Path;

pub fn run(config_path: &Path, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check_prereqs(&mut checks, &mut all_pass);
    check_config(config_path, &mut checks, &mut all_pass);

    print_results(&checks, all_pass, json_output)
}

fn check_prereqs(checks: &mut Vec<Check>, all_pass: &mut bool) {
    let missing = check_buildx_prereqs("docker");
    if missing.is_empty() {
        checks.push(Check::pass(
            "buildx_prereqs",
            "docker and the buildx plugin are available",
        ));
    } else {
        *all_pass = false;
        checks.push(Check::fail(
            "buildx_prereqs",
            &format!("Missing prerequisites: {}", format_missing(&missing)),
        ));
        return;
    }

    if BuildxBackend::new().available() {
        checks.push(Check::pass("buildx_backend", "buildx backend responds"));
    } else {
        *all_pass = false;
        checks.push(Check::fail("buildx_backend", "buildx backend does not respond"));
    }
}

fn check_config(config_path: &Path, checks: &mut Vec<Check>, all_pass: &mut bool) {
    if !config_path.exists() {
        checks.push(Check::info(
            "config",
            &format!(
                "{} not found (run `fnpack init` to create one)",
                config_path.display()
            ),
        ));
        return;
    }
    match load_config(config_path) {
        Ok(config) => {
            checks.push(Check::pass(
                "config",
                &format!(
                    "{} is valid ({} layers, {} functions)",
                    config_path.display(),
                    config.layers.len(),
                    config.functions.len()
                ),
            ));
            let missing: Vec<String> = config
                .layers
                .iter()
                .map(|l| (&l.name, &l.path))
                .chain(config.functions.iter().map(|f| (&f.name, &f.path)))
                .filter(|(_, path)| !path.is_dir())
                .map(|(name, path)| format!("{name} ({})", path.display()))
                .collect();
            if missing.is_empty() {
                checks.push(Check::pass("sources", "All source directories exist"));
            } else {
                checks.push(Check::warn(
                    "sources",
                    &format!("Missing source directories: {}", missing.join(", ")),
                ));
            }
        }
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("config", &e));
        }
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("fnpack doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
