use super::{json_pretty, load_config, EXIT_SUCCESS};
use fnpack_core::{plan, render_target, BuildTarget};
use fnpack_schema::{OutputFormat, Platform};
use std::path::Path;

fn find_target<'a>(targets: &'a [BuildTarget], name: &str) -> Option<&'a BuildTarget> {
    targets.iter().find(|t| t.name == name)
}

pub fn run(
    config_path: &Path,
    name: &str,
    platform: Option<&str>,
    json: bool,
) -> Result<u8, String> {
    let config = load_config(config_path)?;
    let targets = plan(&config);
    let target =
        find_target(&targets, name).ok_or_else(|| format!("no layer or function named '{name}'"))?;

    let platform = match platform {
        Some(p) => {
            let p = Platform::new(p);
            if !target.platforms.contains(&p) {
                return Err(format!("'{name}' is not built for {p}"));
            }
            p
        }
        None => target.platforms[0].clone(),
    };

    let recipe = render_target(target).map_err(|e| format!("{name}: {e}"))?;

    if json {
        let tag = (target.output == OutputFormat::Image).then(|| target.tag_for(&platform));
        let payload = serde_json::json!({
            "target": target.name,
            "kind": target.kind,
            "platform": platform,
            "tag": tag,
            "recipe": recipe,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        print!("{recipe}");
    }
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnpack_schema::{parse_config_str, TargetKind};

    #[test]
    fn finds_layers_and_functions_by_name() {
        let config = parse_config_str(
            "[[layers]]\nname = \"x\"\npath = \"l\"\n\n\
             [[functions]]\nname = \"f\"\npath = \"f\"\noutput = \"archive\"\n",
        )
        .unwrap();
        let targets = plan(&config);
        assert_eq!(find_target(&targets, "x").unwrap().kind, TargetKind::Layer);
        assert_eq!(find_target(&targets, "f").unwrap().kind, TargetKind::Function);
        assert!(find_target(&targets, "y").is_none());
    }
}
