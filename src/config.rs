//! Layered run configuration.
//!
//! Three layers feed one immutable [`ResolvedConfig`]: built-in defaults, the
//! persisted `step2stl.config.json`, and per-invocation overrides. Later
//! layers win key by key.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::orientation::{Axis, OrientationTransform};
use crate::quality::{MeshTolerance, QualityLevel, QualityRequest};
use crate::stl::StlEncoding;

/// File name looked up beside the executable.
pub const CONFIG_FILE_NAME: &str = "step2stl.config.json";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value `{value}` for `{key}`: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("missing value for `{key}`: {reason}")]
    Missing {
        key: &'static str,
        reason: &'static str,
    },
}

/// One configuration layer. Every key is optional; absent keys fall through
/// to the layer below.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub quality: Option<QualityLevel>,
    pub source_up: Option<Axis>,
    pub target_up: Option<Axis>,
    pub rotate_x: Option<f64>,
    pub rotate_y: Option<f64>,
    pub rotate_z: Option<f64>,
    pub binary: Option<bool>,
    pub linear_deflection: Option<f64>,
    /// Degrees.
    pub angular_deflection: Option<f64>,
    pub relative: Option<bool>,
    pub out_dir: Option<PathBuf>,
}

impl ConfigLayer {
    /// Parses a layer from JSON text.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed JSON, unknown keys or
    /// values of the wrong type.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// `other` on top of `self`.
    #[must_use]
    pub fn overlay(&self, other: &ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            quality: other.quality.or(self.quality),
            source_up: other.source_up.or(self.source_up),
            target_up: other.target_up.or(self.target_up),
            rotate_x: other.rotate_x.or(self.rotate_x),
            rotate_y: other.rotate_y.or(self.rotate_y),
            rotate_z: other.rotate_z.or(self.rotate_z),
            binary: other.binary.or(self.binary),
            linear_deflection: other.linear_deflection.or(self.linear_deflection),
            angular_deflection: other.angular_deflection.or(self.angular_deflection),
            relative: other.relative.or(self.relative),
            out_dir: other.out_dir.clone().or_else(|| self.out_dir.clone()),
        }
    }
}

/// Reads a persisted config file. A missing file is not an error.
///
/// # Errors
///
/// Returns [`ConfigError::Unreadable`], [`ConfigError::InvalidValue`] for an
/// unknown quality or axis name, or [`ConfigError::Malformed`] otherwise.
pub fn load_config_file(path: &Path) -> ConfigResult<Option<ConfigLayer>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            log::debug!("no config file at {}", path.display());
            return Ok(None);
        }
        Err(source) => {
            return Err(ConfigError::Unreadable {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let malformed = |source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    };
    let value: Value = serde_json::from_str(&text).map_err(malformed)?;
    check_value::<QualityLevel>(&value, "quality")?;
    check_value::<Axis>(&value, "source_up")?;
    check_value::<Axis>(&value, "target_up")?;
    let layer = ConfigLayer::deserialize(value).map_err(malformed)?;
    log::debug!("loaded config file {}", path.display());
    Ok(Some(layer))
}

/// Named values outside their domain are reported against their key rather
/// than as a syntax error.
fn check_value<T: DeserializeOwned>(layer: &Value, key: &'static str) -> ConfigResult<()> {
    let Some(value) = layer.get(key).filter(|v| !v.is_null()) else {
        return Ok(());
    };
    T::deserialize(value).map(drop).map_err(|e| ConfigError::InvalidValue {
        key,
        value: value.as_str().map_or_else(|| value.to_string(), str::to_owned),
        reason: e.to_string(),
    })
}

/// `step2stl.config.json` in the directory holding the running executable.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join(CONFIG_FILE_NAME))
}

/// Stacks configuration layers and validates the result.
#[derive(Debug, Clone, Default)]
pub struct ConfigMerger {
    file: ConfigLayer,
    overrides: ConfigLayer,
}

impl ConfigMerger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file_layer(mut self, layer: ConfigLayer) -> Self {
        self.file = layer;
        self
    }

    #[must_use]
    pub fn with_overrides(mut self, layer: ConfigLayer) -> Self {
        self.overrides = layer;
        self
    }

    /// Merges the layers over the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for non-finite rotations, an empty output
    /// directory, or custom quality without valid deflections.
    pub fn resolve(&self) -> ConfigResult<ResolvedConfig> {
        let merged = self.file.overlay(&self.overrides);

        let quality = merged.quality.unwrap_or_default();
        let tolerance = QualityRequest {
            level: quality,
            linear_deflection: merged.linear_deflection,
            angular_deflection_deg: merged.angular_deflection,
            relative: merged.relative,
        }
        .resolve()?;

        let out_dir = match merged.out_dir {
            Some(dir) if dir.as_os_str().is_empty() => {
                return Err(ConfigError::InvalidValue {
                    key: "out_dir",
                    value: String::new(),
                    reason: "must not be empty".to_string(),
                });
            }
            other => other,
        };

        Ok(ResolvedConfig {
            quality,
            tolerance,
            source_up: merged.source_up.unwrap_or_default(),
            target_up: merged.target_up.unwrap_or_default(),
            rotate_x: finite_angle("rotate_x", merged.rotate_x)?,
            rotate_y: finite_angle("rotate_y", merged.rotate_y)?,
            rotate_z: finite_angle("rotate_z", merged.rotate_z)?,
            binary: merged.binary.unwrap_or(false),
            out_dir,
        })
    }
}

fn finite_angle(key: &'static str, value: Option<f64>) -> ConfigResult<f64> {
    match value {
        None => Ok(0.0),
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(ConfigError::InvalidValue {
            key,
            value: v.to_string(),
            reason: "rotation must be a finite number of degrees".to_string(),
        }),
    }
}

/// Validated, immutable settings for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    quality: QualityLevel,
    tolerance: MeshTolerance,
    source_up: Axis,
    target_up: Axis,
    rotate_x: f64,
    rotate_y: f64,
    rotate_z: f64,
    binary: bool,
    out_dir: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Built-in defaults: high quality, Z up to Z up, no rotation, ASCII.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            quality: QualityLevel::High,
            tolerance: crate::quality::PRESET_HIGH,
            source_up: Axis::Z,
            target_up: Axis::Z,
            rotate_x: 0.0,
            rotate_y: 0.0,
            rotate_z: 0.0,
            binary: false,
            out_dir: None,
        }
    }

    #[must_use]
    pub fn quality(&self) -> QualityLevel {
        self.quality
    }

    #[must_use]
    pub fn tolerance(&self) -> MeshTolerance {
        self.tolerance
    }

    #[must_use]
    pub fn orientation(&self) -> OrientationTransform {
        OrientationTransform::new(
            self.source_up,
            self.target_up,
            self.rotate_x,
            self.rotate_y,
            self.rotate_z,
        )
    }

    #[must_use]
    pub fn source_up(&self) -> Axis {
        self.source_up
    }

    #[must_use]
    pub fn target_up(&self) -> Axis {
        self.target_up
    }

    /// Rotations in degrees, X then Y then Z.
    #[must_use]
    pub fn rotations(&self) -> [f64; 3] {
        [self.rotate_x, self.rotate_y, self.rotate_z]
    }

    #[must_use]
    pub fn binary(&self) -> bool {
        self.binary
    }

    #[must_use]
    pub fn encoding(&self) -> StlEncoding {
        StlEncoding::from_binary_flag(self.binary)
    }

    #[must_use]
    pub fn out_dir(&self) -> Option<&Path> {
        self.out_dir.as_deref()
    }

    /// Pretty JSON for `--print-config`.
    #[must_use]
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|err| format!("{{\"error\": \"{err}\"}}"))
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::defaults()
    }
}
