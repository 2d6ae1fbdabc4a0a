//! Multi-stage build recipe generation.
//!
//! The recipe refers to inputs by the fixed context paths defined here; the
//! staging module lays files out under the same names.

use crate::planner::BuildTarget;
use fnpack_schema::{is_entry_point, OutputFormat, Runtime};
use std::fmt::Write as _;
use thiserror::Error;

/// Context path of the function (or layer) source tree.
pub const SOURCE_DIR: &str = "src";
/// Context path of the target's own requirements file.
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

const ASSET_ROOT: &str = "/asset";
const LAYER_ASSET_ROOT: &str = "/asset/python";
const PIP_INSTALL: &str =
    "RUN --mount=type=cache,target=/root/.cache/pip pip install -r /tmp/requirements.txt -t .";

/// Context path of a merged layer's source tree.
pub fn layer_dir(name: &str) -> String {
    format!("layer_{name}")
}

/// Directory holding merged layers' requirements files.
pub const LAYER_REQUIREMENTS_DIR: &str = "layer-requirements";

/// Context path of a merged layer's requirements file.
///
/// Kept outside the `layer_` prefix so no layer name maps onto it.
pub fn layer_requirements_file(name: &str) -> String {
    format!("{LAYER_REQUIREMENTS_DIR}/{name}.txt")
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("image output requires an entry point")]
    MissingEntryPoint,
    #[error("entry point '{0}' is not a dotted identifier")]
    InvalidEntryPoint(String),
    #[error("runtime '{0}' has no known base image")]
    UnsupportedRuntime(String),
}

/// A layer stage: its name and whether it installs requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerStage<'a> {
    pub name: &'a str,
    pub has_requirements: bool,
}

/// Render the recipe for one target.
///
/// One stage per layer installs that layer's requirements and copies its
/// source; the `builder` stage assembles the target's own requirements and
/// source, then copies every layer stage on top in order, so later layers win
/// on conflicting paths. The final stage is an empty base for archives or the
/// runtime's base image for images.
pub fn render(
    runtime: &Runtime,
    has_requirements: bool,
    layers: &[LayerStage<'_>],
    output: OutputFormat,
    entry_point: Option<&str>,
) -> Result<String, RenderError> {
    if !runtime.is_supported() {
        return Err(RenderError::UnsupportedRuntime(runtime.to_string()));
    }
    let entry_point = match (output, entry_point.map(str::trim)) {
        (OutputFormat::Image, None | Some("")) => return Err(RenderError::MissingEntryPoint),
        (OutputFormat::Image, Some(ep)) if !is_entry_point(ep) => {
            return Err(RenderError::InvalidEntryPoint(ep.to_owned()))
        }
        (_, ep) => ep,
    };
    let version = runtime.version();

    let mut out = String::from("# syntax=docker/dockerfile:1\n");

    for layer in layers {
        let _ = writeln!(out);
        let _ = writeln!(out, "FROM python:{version}-slim AS layer-{}", layer.name);
        let _ = writeln!(out, "WORKDIR {LAYER_ASSET_ROOT}");
        if layer.has_requirements {
            let _ = writeln!(
                out,
                "COPY {} /tmp/requirements.txt",
                layer_requirements_file(layer.name)
            );
            let _ = writeln!(out, "{PIP_INSTALL}");
        }
        let _ = writeln!(out, "COPY {}/ .", layer_dir(layer.name));
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "FROM python:{version}-slim AS builder");
    let _ = writeln!(out, "WORKDIR {ASSET_ROOT}");
    if has_requirements {
        let _ = writeln!(out, "COPY {REQUIREMENTS_FILE} /tmp/requirements.txt");
        let _ = writeln!(out, "{PIP_INSTALL}");
    }
    let _ = writeln!(out, "COPY {SOURCE_DIR}/ .");
    for layer in layers {
        let _ = writeln!(
            out,
            "COPY --from=layer-{} {LAYER_ASSET_ROOT}/ .",
            layer.name
        );
    }

    let _ = writeln!(out);
    match (output, entry_point) {
        (OutputFormat::Image, Some(entry)) => {
            let _ = writeln!(out, "FROM public.ecr.aws/lambda/python:{version}");
            let _ = writeln!(out, "WORKDIR ${{LAMBDA_TASK_ROOT}}");
            let _ = writeln!(out, "COPY --from=builder {ASSET_ROOT} .");
            let _ = writeln!(out, "ENTRYPOINT [ \"/lambda-entrypoint.sh\" ]");
            let _ = writeln!(out, "CMD [ \"{entry}\" ]");
        }
        _ => {
            let _ = writeln!(out, "FROM scratch");
            let _ = writeln!(out, "COPY --from=builder {ASSET_ROOT} /");
        }
    }
    Ok(out)
}

/// Render the recipe for a planned target.
pub fn render_target(target: &BuildTarget) -> Result<String, RenderError> {
    let layers: Vec<LayerStage<'_>> = target
        .layers
        .iter()
        .map(|l| LayerStage {
            name: l.name.as_str(),
            has_requirements: l.requirements.is_some(),
        })
        .collect();
    render(
        &target.runtime,
        target.requirements.is_some(),
        &layers,
        target.output,
        target.entry_point.as_deref(),
    )
}
