use super::{json_pretty, EXIT_SUCCESS};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const STARTER_CONFIG: &str = r#"# fnpack configuration
runtime_default = "python3.12"
archive_format = "zip"

[[layers]]
name = "shared"
path = "layers/shared"
# requirements = "layers/shared/requirements.txt"

[[functions]]
name = "api"
path = "functions/api"
output = "archive"
layers = ["shared"]
platforms = ["linux/amd64", "linux/arm64"]

# [[functions]]
# name = "worker"
# path = "functions/worker"
# output = "image"
# entry_point = "app.handler"
# image_tag = "registry.example.com/{name}:{arch}"
"#;

fn write_atomic(dest: &Path, content: &str) -> Result<(), String> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| format!("write temp file: {e}"))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| format!("write temp file: {e}"))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| format!("fsync temp file: {e}"))?;
    tmp.persist(dest)
        .map_err(|e| format!("persist config: {}", e.error))?;
    Ok(())
}

pub fn run(dest: &Path, force: bool, json: bool) -> Result<u8, String> {
    if dest.exists() && !force {
        return Err(format!(
            "refusing to overwrite existing {} (pass --force)",
            dest.display()
        ));
    }
    write_atomic(dest, STARTER_CONFIG)?;

    if json {
        let payload = serde_json::json!({
            "status": "written",
            "path": dest.display().to_string(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("wrote {}", dest.display());
    }
    Ok(EXIT_SUCCESS)
}
