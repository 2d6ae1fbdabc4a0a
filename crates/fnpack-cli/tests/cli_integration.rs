//! CLI subprocess integration tests.
//!
//! These tests invoke the `fnpack` binary as a subprocess with the mock
//! backend and verify exit codes, stdout content, and JSON output.

use std::path::{Path, PathBuf};
use std::process::Command;

fn fnpack_bin(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_fnpack"));
    cmd.current_dir(dir);
    cmd.env("FNPACK_SKIP_PREREQS", "1");
    cmd.env_remove("FNPACK_MOCK_FAIL");
    cmd
}

fn write_project(dir: &Path) -> PathBuf {
    std::fs::create_dir_all(dir.join("functions/api")).unwrap();
    std::fs::write(
        dir.join("functions/api/app.py"),
        "def handler(event, context):\n    return {}\n",
    )
    .unwrap();
    std::fs::create_dir_all(dir.join("functions/web")).unwrap();
    std::fs::write(dir.join("functions/web/app.py"), "def handler(e, c): pass\n").unwrap();
    std::fs::create_dir_all(dir.join("layers/shared")).unwrap();
    std::fs::write(dir.join("layers/shared/util.py"), "X = 1\n").unwrap();

    let path = dir.join("fnpack.toml");
    std::fs::write(
        &path,
        r#"[[layers]]
name = "shared"
path = "layers/shared"

[[functions]]
name = "api"
path = "functions/api"
output = "archive"
layers = ["shared"]

[[functions]]
name = "web"
path = "functions/web"
output = "image"
entry_point = "app.handler"
image_tag = "registry/{name}:{arch}"
platforms = ["linux/arm64"]
"#,
    )
    .unwrap();
    path
}

#[test]
fn cli_version_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let output = fnpack_bin(dir.path()).arg("--version").output().unwrap();
    assert!(output.status.success(), "fnpack --version must exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("fnpack"), "version output: {stdout}");
}

#[test]
fn cli_help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let output = fnpack_bin(dir.path()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["build", "plan", "graph", "render", "init", "doctor"] {
        assert!(stdout.contains(cmd), "help must list '{cmd}'");
    }
}

#[test]
fn cli_build_succeeds_with_mock() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let output = fnpack_bin(dir.path())
        .args(["build", "--backend", "mock", "-j", "2"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "build failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("attempted: 3, succeeded: 3, failed: 0"), "{stdout}");
    assert!(dir.path().join("dist/api-amd64.zip").is_file());
    assert!(dir.path().join("dist/shared-amd64.zip").is_file());
    assert!(dir.path().join("dist/build_manifest.json").is_file());
}

#[test]
fn cli_build_json_output() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let output = fnpack_bin(dir.path())
        .args(["--json", "build", "--backend", "mock", "--dist", "out"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["attempted"], 3);
    assert_eq!(report["succeeded"], 3);
    assert!(report["failures"].as_array().unwrap().is_empty());

    let web = report["artifacts"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["name"] == "web")
        .unwrap();
    assert_eq!(web["path"], "registry/web:arm64");
    assert_eq!(web["type"], "function");

    let manifest: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("out/build_manifest.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["artifacts"].as_array().unwrap().len(), 3);
}

#[test]
fn cli_build_task_failure_exits_three() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let output = fnpack_bin(dir.path())
        .env("FNPACK_MOCK_FAIL", "api")
        .args(["--json", "build", "--backend", "mock"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["succeeded"], 2);
    assert_eq!(report["failures"][0]["target"], "api");
    assert!(!dir.path().join("dist/api-amd64.zip").exists());
    assert!(dir.path().join("dist/shared-amd64.zip").is_file());
}

#[test]
fn cli_build_invalid_config_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("fnpack.toml"),
        "[[functions]]\nname = \"a\"\npath = \"a\"\noutput = \"archive\"\nlayers = [\"nope\"]\n",
    )
    .unwrap();

    let output = fnpack_bin(dir.path())
        .args(["build", "--backend", "mock"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nope"), "{stderr}");
    assert!(!dir.path().join("dist/build_manifest.json").exists());
}

#[test]
fn cli_build_rejects_configs_with_shared_output_paths() {
    let cases = [
        (
            "[[layers]]\nname = \"shared\"\npath = \"l\"\n\n\
             [[functions]]\nname = \"shared\"\npath = \"f\"\noutput = \"archive\"\n",
            "duplicate target name 'shared'",
        ),
        (
            "[[functions]]\nname = \"api\"\npath = \"f\"\noutput = \"archive\"\n\
             platforms = [\"linux/amd64\", \"linux/amd64\"]\n",
            "share the architecture 'amd64'",
        ),
    ];
    for (config, expected) in cases {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("l")).unwrap();
        std::fs::create_dir_all(dir.path().join("f")).unwrap();
        std::fs::write(dir.path().join("fnpack.toml"), config).unwrap();

        let output = fnpack_bin(dir.path())
            .args(["build", "--backend", "mock", "-j", "2"])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains(expected), "{stderr}");
        assert!(!dir.path().join("dist/build_manifest.json").exists());
    }
}

#[test]
fn cli_build_missing_config_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let output = fnpack_bin(dir.path())
        .args(["build", "--backend", "mock"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_build_unknown_backend_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let output = fnpack_bin(dir.path())
        .args(["build", "--backend", "podman"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn cli_plan_json_output() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let output = fnpack_bin(dir.path())
        .args(["--json", "plan"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let targets: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let targets = targets.as_array().unwrap();
    assert_eq!(targets.len(), 3);
    assert_eq!(targets[0]["name"], "shared");
    assert_eq!(targets[0]["kind"], "layer");
    assert_eq!(targets[1]["runtime"], "python3.12");
    assert_eq!(targets[1]["platforms"][0], "linux/amd64");
    assert_eq!(targets[2]["platforms"][0], "linux/arm64");
}

#[test]
fn cli_graph_lists_layers() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let output = fnpack_bin(dir.path())
        .args(["--json", "graph"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let graph: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(graph["api"][0], "shared");
    assert!(graph["web"].as_array().unwrap().is_empty());
}

#[test]
fn cli_render_prints_recipe() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    let output = fnpack_bin(dir.path())
        .args(["render", "web"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("AS builder"));
    assert!(stdout.contains("CMD [ \"app.handler\" ]"));

    let output = fnpack_bin(dir.path())
        .args(["--json", "render", "web", "--platform", "linux/arm64"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let payload: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(payload["tag"], "registry/web:arm64");
}

#[test]
fn cli_render_unknown_target_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    let output = fnpack_bin(dir.path())
        .args(["render", "missing"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn cli_init_writes_valid_config() {
    let dir = tempfile::tempdir().unwrap();

    let output = fnpack_bin(dir.path()).arg("init").output().unwrap();
    assert!(output.status.success());
    assert!(dir.path().join("fnpack.toml").is_file());

    let again = fnpack_bin(dir.path()).arg("init").output().unwrap();
    assert!(!again.status.success(), "init must not overwrite silently");

    let plan = fnpack_bin(dir.path()).arg("plan").output().unwrap();
    assert!(plan.status.success());
}

#[test]
fn cli_completions_generate() {
    let dir = tempfile::tempdir().unwrap();
    let output = fnpack_bin(dir.path())
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("fnpack"));
}

#[test]
fn cli_man_pages_written() {
    let dir = tempfile::tempdir().unwrap();
    let output = fnpack_bin(dir.path())
        .args(["man-pages", "man"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(dir.path().join("man/fnpack.1").is_file());
    assert!(dir.path().join("man/fnpack-build.1").is_file());
}
