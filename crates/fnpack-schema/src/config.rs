use crate::types::{ArchiveFormat, OutputFormat, Platform, Runtime, TargetName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file name looked up in the working directory.
pub const CONFIG_FILE: &str = "fnpack.toml";

/// Namespace used for image tags when a function declares no template.
pub const DEFAULT_IMAGE_NAMESPACE: &str = "fnpack";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("name must not be empty")]
    EmptyName,
    #[error("invalid name '{0}': only ASCII letters, digits, '.', '_' and '-' are allowed")]
    InvalidName(String),
    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },
    #[error("function '{function}' references undeclared layer '{layer}'")]
    UnknownLayer { function: String, layer: String },
    #[error("function '{0}' has image output but no entry_point")]
    MissingEntryPoint(String),
    #[error("'{owner}' declares an empty platform list")]
    EmptyPlatforms { owner: String },
    #[error("'{owner}' declares malformed platform '{platform}', expected os/arch[/variant]")]
    InvalidPlatform { owner: String, platform: String },
    #[error("'{owner}' declares platforms {first} and {second}, which share the architecture '{arch}'")]
    DuplicatePlatform {
        owner: String,
        first: String,
        second: String,
        arch: String,
    },
    #[error("'{owner}' uses unsupported runtime '{runtime}', expected python3.<minor>")]
    UnsupportedRuntime { owner: String, runtime: String },
    #[error("function '{function}' has invalid entry_point '{entry_point}', expected a dotted identifier such as app.handler")]
    InvalidEntryPoint { function: String, entry_point: String },
    #[error("'{owner}' has invalid image tag template '{tag}': {reason}")]
    InvalidImageTag {
        owner: String,
        tag: String,
        reason: String,
    },
}

/// Root of an `fnpack.toml` file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackageConfig {
    #[serde(default)]
    pub runtime_default: Runtime,
    #[serde(default = "default_namespace")]
    pub image_namespace: String,
    #[serde(default)]
    pub archive_format: ArchiveFormat,
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub functions: Vec<FunctionSpec>,
}

/// A shared bundle of code and dependencies merged into functions.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LayerSpec {
    pub name: TargetName,
    pub path: PathBuf,
    #[serde(default)]
    pub requirements: Option<PathBuf>,
    #[serde(default)]
    pub runtime: Option<Runtime>,
    #[serde(default)]
    pub platforms: Option<Vec<Platform>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FunctionSpec {
    pub name: TargetName,
    pub path: PathBuf,
    pub output: OutputFormat,
    #[serde(default)]
    pub runtime: Option<Runtime>,
    #[serde(default)]
    pub requirements: Option<PathBuf>,
    #[serde(default)]
    pub layers: Vec<TargetName>,
    #[serde(default)]
    pub platforms: Option<Vec<Platform>>,
    /// Tag template with `{name}` and `{arch}` placeholders.
    #[serde(default)]
    pub image_tag: Option<String>,
    /// Handler the container invokes, e.g. `app.handler`.
    #[serde(default)]
    pub entry_point: Option<String>,
}

fn default_namespace() -> String {
    DEFAULT_IMAGE_NAMESPACE.to_owned()
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            runtime_default: Runtime::default(),
            image_namespace: default_namespace(),
            archive_format: ArchiveFormat::default(),
            layers: Vec::new(),
            functions: Vec::new(),
        }
    }
}

impl PackageConfig {
    pub fn layer(&self, name: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Rebase every relative source and requirements path onto `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for layer in &mut self.layers {
            rebase(&mut layer.path);
            if let Some(req) = layer.requirements.as_mut() {
                rebase(req);
            }
        }
        for function in &mut self.functions {
            rebase(&mut function.path);
            if let Some(req) = function.requirements.as_mut() {
                rebase(req);
            }
        }
    }

    /// Check referential integrity and field-level constraints.
    ///
    /// The planner and orchestrator assume a configuration that passed this check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_runtime("runtime_default", &self.runtime_default)?;
        if self.image_namespace.contains(['{', '}']) {
            return Err(ConfigError::InvalidImageTag {
                owner: "image_namespace".to_owned(),
                tag: self.image_namespace.clone(),
                reason: "placeholders are not allowed in the namespace".to_owned(),
            });
        }

        let mut layer_names = BTreeSet::new();
        for layer in &self.layers {
            check_name(&layer.name)?;
            if !layer_names.insert(layer.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "layer",
                    name: layer.name.to_string(),
                });
            }
            if let Some(rt) = &layer.runtime {
                check_runtime(&layer.name, rt)?;
            }
            check_platforms(&layer.name, layer.platforms.as_deref())?;
        }

        let mut function_names = BTreeSet::new();
        for function in &self.functions {
            check_name(&function.name)?;
            if !function_names.insert(function.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "function",
                    name: function.name.to_string(),
                });
            }
            // Layers and functions share the dist namespace.
            if layer_names.contains(function.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    kind: "target",
                    name: function.name.to_string(),
                });
            }
            if let Some(rt) = &function.runtime {
                check_runtime(&function.name, rt)?;
            }
            check_platforms(&function.name, function.platforms.as_deref())?;
            for layer in &function.layers {
                if !layer_names.contains(layer.as_str()) {
                    return Err(ConfigError::UnknownLayer {
                        function: function.name.to_string(),
                        layer: layer.to_string(),
                    });
                }
            }
            if function.output == OutputFormat::Image
                && function
                    .entry_point
                    .as_deref()
                    .map_or(true, |e| e.trim().is_empty())
            {
                return Err(ConfigError::MissingEntryPoint(function.name.to_string()));
            }
            if let Some(entry) = &function.entry_point {
                if !entry.trim().is_empty() && !is_entry_point(entry.trim()) {
                    return Err(ConfigError::InvalidEntryPoint {
                        function: function.name.to_string(),
                        entry_point: entry.clone(),
                    });
                }
            }
            if let Some(tag) = &function.image_tag {
                check_tag_template(tag).map_err(|reason| ConfigError::InvalidImageTag {
                    owner: function.name.to_string(),
                    tag: tag.clone(),
                    reason,
                })?;
            }
        }
        Ok(())
    }
}

fn check_name(name: &TargetName) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::EmptyName);
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !valid || name.starts_with('.') {
        return Err(ConfigError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn check_runtime(owner: &str, runtime: &Runtime) -> Result<(), ConfigError> {
    if runtime.is_supported() {
        Ok(())
    } else {
        Err(ConfigError::UnsupportedRuntime {
            owner: owner.to_owned(),
            runtime: runtime.to_string(),
        })
    }
}

fn check_platforms(owner: &str, platforms: Option<&[Platform]>) -> Result<(), ConfigError> {
    let Some(platforms) = platforms else {
        return Ok(());
    };
    if platforms.is_empty() {
        return Err(ConfigError::EmptyPlatforms {
            owner: owner.to_owned(),
        });
    }
    let mut seen: BTreeMap<String, &Platform> = BTreeMap::new();
    for p in platforms {
        if !p.is_well_formed() {
            return Err(ConfigError::InvalidPlatform {
                owner: owner.to_owned(),
                platform: p.to_string(),
            });
        }
        let arch = p.arch();
        if let Some(first) = seen.get(&arch) {
            return Err(ConfigError::DuplicatePlatform {
                owner: owner.to_owned(),
                first: first.to_string(),
                second: p.to_string(),
                arch,
            });
        }
        seen.insert(arch, p);
    }
    Ok(())
}

/// Whether `entry` is a dotted Python identifier path such as `app.handler`.
pub fn is_entry_point(entry: &str) -> bool {
    entry.split('.').all(|part| {
        let mut chars = part.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Placeholders a tag template may use.
const TAG_PLACEHOLDERS: [&str; 2] = ["name", "arch"];

/// Check that every `{...}` in a tag template is a known placeholder.
pub fn check_tag_template(template: &str) -> Result<(), String> {
    let mut rest = template;
    while let Some(open) = rest.find(['{', '}']) {
        if rest[open..].starts_with('}') {
            return Err("unmatched '}'".to_owned());
        }
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            return Err("unmatched '{'".to_owned());
        };
        let key = &after[..close];
        if !TAG_PLACEHOLDERS.contains(&key) {
            return Err(format!("unknown placeholder '{{{key}}}'"));
        }
        rest = &after[close + 1..];
    }
    Ok(())
}

pub fn parse_config_str(input: &str) -> Result<PackageConfig, ConfigError> {
    Ok(toml::from_str(input)?)
}

/// Read, parse, and rebase a configuration file.
///
/// Relative paths inside the file are resolved against the file's directory.
/// Validation is a separate step so callers can report parse and
/// consistency errors differently.
pub fn load_config_file(path: impl AsRef<Path>) -> Result<PackageConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let mut config = parse_config_str(&content)?;
    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    config.resolve_paths(base);
    Ok(config)
}
