use super::{json_pretty, load_config, EXIT_SUCCESS};
use fnpack_core::dependency_graph;
use std::path::Path;

pub fn run(config_path: &Path, json: bool) -> Result<u8, String> {
    let config = load_config(config_path)?;
    let graph = dependency_graph(&config);

    if json {
        println!("{}", json_pretty(&graph)?);
    } else {
        for (function, layers) in &graph {
            if layers.is_empty() {
                println!("{function}");
            } else {
                let list: Vec<&str> = layers.iter().map(String::as_str).collect();
                println!("{function} <- {}", list.join(", "));
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
