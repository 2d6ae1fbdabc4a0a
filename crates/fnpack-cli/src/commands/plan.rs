use super::{colorize_kind, json_pretty, load_config, EXIT_SUCCESS};
use fnpack_core::plan;
use std::path::Path;

pub fn run(config_path: &Path, json: bool) -> Result<u8, String> {
    let config = load_config(config_path)?;
    let targets = plan(&config);

    if json {
        println!("{}", json_pretty(&targets)?);
        return Ok(EXIT_SUCCESS);
    }

    if targets.is_empty() {
        println!("no layers or functions declared in {}", config_path.display());
        return Ok(EXIT_SUCCESS);
    }
    for t in &targets {
        let platforms: Vec<&str> = t.platforms.iter().map(|p| p.as_str()).collect();
        println!(
            "{} {} [{}] {} {}",
            colorize_kind(&t.kind.to_string()),
            t.name,
            t.output,
            t.runtime,
            platforms.join(",")
        );
        if !t.layers.is_empty() {
            let layers: Vec<&str> = t.layers.iter().map(|l| l.name.as_str()).collect();
            println!("    layers: {}", layers.join(" -> "));
        }
    }
    let tasks: usize = targets.iter().map(|t| t.platforms.len()).sum();
    println!("\n{} targets, {tasks} tasks", targets.len());
    Ok(EXIT_SUCCESS)
}
