use fnpack_schema::{
    ArchiveFormat, FunctionSpec, LayerSpec, OutputFormat, PackageConfig, Platform, Runtime,
    TargetKind, TargetName,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// A layer as seen by a function that merges it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerInput {
    pub name: TargetName,
    pub path: PathBuf,
    pub requirements: Option<PathBuf>,
}

/// One fully resolved function or layer.
///
/// Carries everything a task needs; nothing downstream looks at the
/// configuration again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildTarget {
    pub name: TargetName,
    pub kind: TargetKind,
    pub output: OutputFormat,
    pub archive_format: ArchiveFormat,
    pub path: PathBuf,
    pub runtime: Runtime,
    pub requirements: Option<PathBuf>,
    /// Never empty.
    pub platforms: Vec<Platform>,
    /// Layers merged into this target, in overwrite order. Empty for layers.
    pub layers: Vec<LayerInput>,
    /// Tag template with `{name}` and `{arch}` placeholders.
    pub image_tag: String,
    pub entry_point: Option<String>,
}

impl BuildTarget {
    /// Final image tag for one platform.
    pub fn tag_for(&self, platform: &Platform) -> String {
        self.image_tag
            .replace("{name}", &self.name)
            .replace("{arch}", &platform.arch())
    }

    /// Identity of a (target, platform) task in logs and errors.
    pub fn label(&self, platform: &Platform) -> String {
        format!("{} ({platform})", self.name)
    }
}

fn default_tag_template(namespace: &str) -> String {
    format!("{namespace}/{{name}}:{{arch}}")
}

fn resolve_platforms(platforms: Option<&Vec<Platform>>) -> Vec<Platform> {
    match platforms {
        Some(list) if !list.is_empty() => list.clone(),
        _ => vec![Platform::baseline()],
    }
}

fn layer_target(config: &PackageConfig, layer: &LayerSpec) -> BuildTarget {
    BuildTarget {
        name: layer.name.clone(),
        kind: TargetKind::Layer,
        output: OutputFormat::Archive,
        archive_format: config.archive_format,
        path: layer.path.clone(),
        runtime: layer
            .runtime
            .clone()
            .unwrap_or_else(|| config.runtime_default.clone()),
        requirements: layer.requirements.clone(),
        platforms: resolve_platforms(layer.platforms.as_ref()),
        layers: Vec::new(),
        image_tag: default_tag_template(&config.image_namespace),
        entry_point: None,
    }
}

fn function_target(config: &PackageConfig, function: &FunctionSpec) -> BuildTarget {
    // Unknown names were rejected by validation; skip rather than panic if not.
    let layers = function
        .layers
        .iter()
        .filter_map(|name| config.layer(name))
        .map(|l| LayerInput {
            name: l.name.clone(),
            path: l.path.clone(),
            requirements: l.requirements.clone(),
        })
        .collect();

    BuildTarget {
        name: function.name.clone(),
        kind: TargetKind::Function,
        output: function.output,
        archive_format: config.archive_format,
        path: function.path.clone(),
        runtime: function
            .runtime
            .clone()
            .unwrap_or_else(|| config.runtime_default.clone()),
        requirements: function.requirements.clone(),
        platforms: resolve_platforms(function.platforms.as_ref()),
        layers,
        image_tag: function
            .image_tag
            .clone()
            .unwrap_or_else(|| default_tag_template(&config.image_namespace)),
        entry_point: function.entry_point.clone(),
    }
}

/// Resolve a validated configuration into build targets: every layer, then
/// every function, each in declaration order.
pub fn plan(config: &PackageConfig) -> Vec<BuildTarget> {
    let layers = config.layers.iter().map(|l| layer_target(config, l));
    let functions = config.functions.iter().map(|f| function_target(config, f));
    layers.chain(functions).collect()
}

/// Function name to the set of layer names it merges.
pub fn dependency_graph(config: &PackageConfig) -> BTreeMap<String, BTreeSet<String>> {
    config
        .functions
        .iter()
        .map(|f| {
            let deps = f.layers.iter().map(ToString::to_string).collect();
            (f.name.to_string(), deps)
        })
        .collect()
}
