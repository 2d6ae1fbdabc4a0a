//! Newtype wrappers and small closed enums shared by every fnpack crate.
//!
//! All newtypes serialize/deserialize as plain strings so the configuration
//! file and the build manifest stay human-editable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Name of a function or layer. Unique across both kinds; used as a path
    /// component and as a recipe stage suffix.
    TargetName
);

string_newtype!(
    /// Target platform in `os/arch[/variant]` form, e.g. `linux/arm64`.
    Platform
);

string_newtype!(
    /// Language runtime identifier such as `python3.12`.
    Runtime
);

/// Platform used when a layer or function declares none.
pub const BASELINE_PLATFORM: &str = "linux/amd64";

/// Runtime used when the configuration declares no global default.
pub const DEFAULT_RUNTIME: &str = "python3.12";

impl Platform {
    pub fn baseline() -> Self {
        Self::new(BASELINE_PLATFORM)
    }

    /// Architecture component used in artifact names and image tags.
    ///
    /// `linux/amd64` yields `amd64`; a variant is folded in, so `linux/arm/v7`
    /// yields `armv7` and stays distinct from `linux/arm/v6`.
    pub fn arch(&self) -> String {
        let mut parts = self.0.split('/');
        let _os = parts.next();
        let rest: String = parts.collect();
        if rest.is_empty() {
            self.0.clone()
        } else {
            rest
        }
    }

    /// Whether the string has the `os/arch[/variant]` shape with no empty parts.
    pub fn is_well_formed(&self) -> bool {
        let parts: Vec<&str> = self.0.split('/').collect();
        (2..=3).contains(&parts.len())
            && parts
                .iter()
                .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
    }
}

impl Runtime {
    /// Version suffix used to select base images (`python3.12` -> `3.12`).
    pub fn version(&self) -> &str {
        self.0.strip_prefix("python").unwrap_or(&self.0)
    }

    /// Only `python3.<minor>` runtimes have base images the recipe knows about.
    pub fn is_supported(&self) -> bool {
        let Some(rest) = self.0.strip_prefix("python3.") else {
            return false;
        };
        !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(DEFAULT_RUNTIME)
    }
}

/// Artifact shape a function is packaged into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Flat filesystem exported into a deterministic archive.
    #[serde(alias = "zip")]
    Archive,
    /// Runnable container image, tagged and optionally pushed.
    Image,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive => f.write_str("archive"),
            Self::Image => f.write_str("image"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Function,
    Layer,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function => f.write_str("function"),
            Self::Layer => f.write_str("layer"),
        }
    }
}

/// On-disk container for exported filesystems.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveFormat {
    #[default]
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "tar.gz", alias = "tgz")]
    TarGz,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
