//! Full-pipeline tests against the in-process mock backend.

use fnpack_core::{plan, BuildOptions, Engine};
use fnpack_runtime::MockBackend;
use fnpack_schema::{load_config_file, Platform, TargetKind};
use fnpack_store::BuildManifest;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

fn write_config(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("fnpack.toml");
    fs::write(&path, content).unwrap();
    path
}

fn write_sources(dir: &Path) {
    fs::create_dir_all(dir.join("functions/api")).unwrap();
    fs::write(
        dir.join("functions/api/app.py"),
        "from shared import greet\n\ndef handler(event, context):\n    return greet()\n",
    )
    .unwrap();
    fs::write(dir.join("functions/api/bootstrap"), "#!/bin/sh\n").unwrap();
    fs::set_permissions(
        dir.join("functions/api/bootstrap"),
        fs::Permissions::from_mode(0o755),
    )
    .unwrap();
    fs::create_dir_all(dir.join("layers/shared/shared")).unwrap();
    fs::write(
        dir.join("layers/shared/shared/__init__.py"),
        "def greet():\n    return 'hi'\n",
    )
    .unwrap();
}

const SHARED_API: &str = r#"
[[layers]]
name = "shared"
path = "layers/shared"

[[functions]]
name = "api"
path = "functions/api"
output = "archive"
layers = ["shared"]
platforms = ["linux/amd64"]
"#;

#[test]
fn shared_layer_and_api_function() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let config = load_config_file(write_config(dir.path(), SHARED_API)).unwrap();
    let dist = dir.path().join("dist");

    let engine = Engine::new(&dist, Arc::new(MockBackend::new()));
    let report = engine.run(&config, &BuildOptions::default()).unwrap();
    assert!(report.is_success());

    let manifest = BuildManifest::read_from_file(&dist.join("build_manifest.json")).unwrap();
    let names: Vec<_> = manifest
        .artifacts
        .iter()
        .map(|r| (r.name.as_str(), r.kind))
        .collect();
    assert_eq!(
        names,
        vec![("api", TargetKind::Function), ("shared", TargetKind::Layer)]
    );
    assert!(dist.join("api-amd64.zip").is_file());
    assert!(dist.join("shared-amd64.zip").is_file());
}

#[test]
fn rerun_produces_byte_identical_archive() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let config = load_config_file(write_config(dir.path(), SHARED_API)).unwrap();
    let dist = dir.path().join("dist");
    let archive = dist.join("api-amd64.zip");

    let engine = Engine::new(&dist, Arc::new(MockBackend::new()));
    engine.run(&config, &BuildOptions::default()).unwrap();
    let first = fs::read(&archive).unwrap();

    // A second process would see a fresh aggregator and new staging dirs.
    let engine = Engine::new(&dist, Arc::new(MockBackend::new()));
    engine.run(&config, &BuildOptions::default()).unwrap();
    assert_eq!(first, fs::read(&archive).unwrap());
}

#[test]
fn archive_keeps_layer_files_and_modes() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let config = load_config_file(write_config(dir.path(), SHARED_API)).unwrap();
    let dist = dir.path().join("dist");

    Engine::new(&dist, Arc::new(MockBackend::new()))
        .run(&config, &BuildOptions::default())
        .unwrap();

    let file = fs::File::open(dist.join("api-amd64.zip")).unwrap();
    let mut zip = zip::ZipArchive::new(file).unwrap();
    let mut names: Vec<String> = (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["app.py", "bootstrap", "shared/__init__.py"]);
    let mode = zip.by_name("bootstrap").unwrap().unix_mode().unwrap();
    assert_eq!(mode & 0o777, 0o755);
}

#[test]
fn later_layer_overwrites_earlier_one() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path();
    write_sources(p);
    fs::create_dir_all(p.join("layers/a")).unwrap();
    fs::write(p.join("layers/a/conf.py"), "WHO = 'a'\n").unwrap();
    fs::create_dir_all(p.join("layers/b")).unwrap();
    fs::write(p.join("layers/b/conf.py"), "WHO = 'b'\n").unwrap();

    let config = load_config_file(write_config(
        p,
        r#"
[[layers]]
name = "a"
path = "layers/a"

[[layers]]
name = "b"
path = "layers/b"

[[functions]]
name = "api"
path = "functions/api"
output = "archive"
layers = ["a", "b"]
"#,
    ))
    .unwrap();

    let dist = p.join("dist");
    Engine::new(&dist, Arc::new(MockBackend::new()))
        .run(&config, &BuildOptions::default())
        .unwrap();
    assert_eq!(
        fs::read_to_string(dist.join("api/amd64/asset/conf.py")).unwrap(),
        "WHO = 'b'\n"
    );
}

#[test]
fn one_of_k_tasks_fails() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path();
    let mut config = String::new();
    for i in 0..5 {
        let src = p.join(format!("functions/f{i}"));
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("app.py"), format!("N = {i}\n")).unwrap();
        config.push_str(&format!(
            "[[functions]]\nname = \"f{i}\"\npath = \"functions/f{i}\"\noutput = \"archive\"\n\n"
        ));
    }
    let config = load_config_file(write_config(p, &config)).unwrap();
    let dist = p.join("dist");

    let engine = Engine::new(&dist, Arc::new(MockBackend::new().fail_on("f2")));
    let options = BuildOptions {
        concurrency: 3,
        ..BuildOptions::default()
    };
    let report = engine.run(&config, &options).unwrap();

    assert_eq!(report.attempted, 5);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].target, "f2");
    let manifest = BuildManifest::read_from_file(&report.manifest_path).unwrap();
    let names: Vec<_> = manifest.artifacts.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["f0", "f1", "f3", "f4"]);
    assert!(!dist.join("f2-amd64.zip").exists());
}

#[test]
fn image_tag_template_on_arm64() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let config = load_config_file(write_config(
        dir.path(),
        r#"
[[functions]]
name = "api"
path = "functions/api"
output = "image"
platforms = ["linux/arm64"]
image_tag = "registry/{name}:{arch}"
entry_point = "app.handler"
"#,
    ))
    .unwrap();

    let targets = plan(&config);
    assert_eq!(
        targets[0].tag_for(&Platform::new("linux/arm64")),
        "registry/api:arm64"
    );

    let backend = Arc::new(MockBackend::new());
    let report = Engine::new(dir.path().join("dist"), backend.clone())
        .run(&config, &BuildOptions::default())
        .unwrap();
    assert_eq!(report.artifacts[0].path, "registry/api:arm64");
    assert_eq!(report.artifacts[0].platform(), Some("linux/arm64"));

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].recipe.contains("CMD [ \"app.handler\" ]"));
}

#[test]
fn tar_gz_archive_format() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let config = load_config_file(write_config(
        dir.path(),
        &format!("archive_format = \"tar.gz\"\n{SHARED_API}"),
    ))
    .unwrap();
    let dist = dir.path().join("dist");

    let report = Engine::new(&dist, Arc::new(MockBackend::new()))
        .run(&config, &BuildOptions::default())
        .unwrap();
    assert!(report.is_success());
    assert!(dist.join("api-amd64.tar.gz").is_file());
    let api = report.artifacts.iter().find(|r| r.name == "api").unwrap();
    assert_eq!(api.metadata["format"], "tar.gz");
}

/// Runs the real `docker buildx` pipeline.
///
/// Run with: `cargo test -p fnpack-core --test integration -- --ignored`
#[test]
#[ignore = "requires docker with the buildx plugin and network access"]
fn buildx_archive_end_to_end() {
    let missing = fnpack_runtime::check_buildx_prereqs("docker");
    if !missing.is_empty() {
        eprintln!("skipping: {}", fnpack_runtime::format_missing(&missing));
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let config = load_config_file(write_config(dir.path(), SHARED_API)).unwrap();
    let dist = dir.path().join("dist");

    let backend = fnpack_runtime::select_backend("buildx", None).unwrap();
    let report = Engine::new(&dist, backend)
        .run(&config, &BuildOptions::default())
        .unwrap();
    assert!(report.is_success(), "{:?}", report.failures);
    assert!(dist.join("api-amd64.zip").is_file());
}
