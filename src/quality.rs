//! Tessellation quality presets and their resolution into tolerances.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigResult};

/// Named quality level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    #[default]
    High,
    Medium,
    Low,
    /// Deflections come from explicit overrides.
    Custom,
}

impl QualityLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Custom => "custom",
        }
    }

    /// Preset tolerances, `None` for [`QualityLevel::Custom`].
    #[must_use]
    pub const fn preset(self) -> Option<MeshTolerance> {
        match self {
            Self::High => Some(PRESET_HIGH),
            Self::Medium => Some(PRESET_MEDIUM),
            Self::Low => Some(PRESET_LOW),
            Self::Custom => None,
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const fn degrees(deg: f64) -> f64 {
    deg * PI / 180.0
}

/// 0.05 % of the bounding diagonal, 10 degrees.
pub const PRESET_HIGH: MeshTolerance = MeshTolerance {
    linear_deflection: 0.0005,
    angular_deflection: degrees(10.0),
    relative: true,
};

/// 0.10 % of the bounding diagonal, 15 degrees.
pub const PRESET_MEDIUM: MeshTolerance = MeshTolerance {
    linear_deflection: 0.0010,
    angular_deflection: degrees(15.0),
    relative: true,
};

/// 0.25 % of the bounding diagonal, 25 degrees.
pub const PRESET_LOW: MeshTolerance = MeshTolerance {
    linear_deflection: 0.0025,
    angular_deflection: degrees(25.0),
    relative: true,
};

/// Tolerance triple handed to tessellation.
///
/// `linear_deflection` is in mesh units, or a fraction of the shape's bounding
/// diagonal when `relative` is set. `angular_deflection` is in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeshTolerance {
    pub linear_deflection: f64,
    pub angular_deflection: f64,
    pub relative: bool,
}

impl MeshTolerance {
    /// Linear deflection in mesh units for a shape with the given bounding
    /// diagonal. `None` when the result is not a positive finite length.
    #[must_use]
    pub fn absolute_linear(&self, diagonal: f64) -> Option<f64> {
        let value = if self.relative {
            self.linear_deflection * diagonal
        } else {
            self.linear_deflection
        };
        (value.is_finite() && value > 0.0).then_some(value)
    }
}

/// Quality inputs before validation. Angular deflection is in degrees here,
/// the unit users type.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QualityRequest {
    pub level: QualityLevel,
    pub linear_deflection: Option<f64>,
    pub angular_deflection_deg: Option<f64>,
    pub relative: Option<bool>,
}

impl QualityRequest {
    #[must_use]
    pub fn preset(level: QualityLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn custom(linear_deflection: f64, angular_deflection_deg: f64, relative: Option<bool>) -> Self {
        Self {
            level: QualityLevel::Custom,
            linear_deflection: Some(linear_deflection),
            angular_deflection_deg: Some(angular_deflection_deg),
            relative,
        }
    }

    /// Keys that were supplied but have no effect because a preset is selected.
    #[must_use]
    pub fn ignored_overrides(&self) -> Vec<&'static str> {
        if self.level == QualityLevel::Custom {
            return Vec::new();
        }
        let mut ignored = Vec::new();
        if self.linear_deflection.is_some() {
            ignored.push("linear_deflection");
        }
        if self.angular_deflection_deg.is_some() {
            ignored.push("angular_deflection");
        }
        if self.relative.is_some() {
            ignored.push("relative");
        }
        ignored
    }

    /// Resolves the request into tolerances.
    ///
    /// # Errors
    ///
    /// For [`QualityLevel::Custom`], a missing, zero, negative or non-finite
    /// deflection is a [`ConfigError`].
    pub fn resolve(&self) -> ConfigResult<MeshTolerance> {
        if let Some(preset) = self.level.preset() {
            for key in self.ignored_overrides() {
                log::warn!("`{key}` is ignored with quality `{}`; use `custom` to set it", self.level);
            }
            return Ok(preset);
        }

        let linear = require_positive("linear_deflection", self.linear_deflection)?;
        let angular_deg = require_positive("angular_deflection", self.angular_deflection_deg)?;
        Ok(MeshTolerance {
            linear_deflection: linear,
            angular_deflection: angular_deg.to_radians(),
            relative: self.relative.unwrap_or(false),
        })
    }
}

fn require_positive(key: &'static str, value: Option<f64>) -> ConfigResult<f64> {
    let value = value.ok_or(ConfigError::Missing {
        key,
        reason: "required when quality is `custom`",
    })?;
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "must be a positive finite number".to_string(),
        });
    }
    Ok(value)
}
