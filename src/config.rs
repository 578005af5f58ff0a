//! Pipeline configuration
//!
//! Loaded from TOML; every field has a default so partial files work.

use crate::constants::tessellation::{DEFAULT_SUBDIVISION, MAX_SUBDIVISION};
use crate::error::{GradientError, GradientResult};
use crate::memory::StorageClass;
use crate::renderer::{PixelFormat, Viewport};
use crate::tessellation::BufferKind;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientConfig {
    /// Samples per patch edge
    pub subdivision: u32,
    pub control_point_class: StorageClass,
    pub coefficient_class: StorageClass,
    pub dense_class: StorageClass,
    pub triangle_class: StorageClass,
    /// Format the rasterizer should target
    pub pixel_format: PixelFormat,
    pub viewport: Viewport,
}

impl Default for GradientConfig {
    fn default() -> Self {
        Self {
            subdivision: DEFAULT_SUBDIVISION,
            control_point_class: StorageClass::HostShared,
            coefficient_class: StorageClass::DevicePrivate,
            dense_class: StorageClass::DevicePrivate,
            triangle_class: StorageClass::DevicePrivate,
            pixel_format: PixelFormat::default(),
            viewport: Viewport::default(),
        }
    }
}

impl GradientConfig {
    /// Storage class configured for one of the frame's buffers
    pub fn storage_class(&self, kind: BufferKind) -> StorageClass {
        match kind {
            BufferKind::ControlPoints => self.control_point_class,
            BufferKind::Coefficients => self.coefficient_class,
            BufferKind::DenseVertices => self.dense_class,
            BufferKind::Triangles => self.triangle_class,
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> GradientResult<()> {
        if self.subdivision == 0 || self.subdivision > MAX_SUBDIVISION {
            return Err(GradientError::InvalidConfig {
                field: "subdivision".to_string(),
                value: self.subdivision.to_string(),
                reason: format!("must be between 1 and {}", MAX_SUBDIVISION),
            });
        }

        for kind in BufferKind::ALL {
            let class = self.storage_class(kind);
            if !class.is_storage() {
                return Err(GradientError::InvalidConfig {
                    field: format!("{:?}", kind),
                    value: class.to_string(),
                    reason: "stage buffers must be bindable as storage".to_string(),
                });
            }
        }

        self.viewport.validate()?;

        log::debug!(
            "[GradientConfig] Validated: subdivision={}, viewport={}, format={}",
            self.subdivision,
            self.viewport,
            self.pixel_format
        );
        Ok(())
    }

    /// Parse and validate a TOML document; missing fields take their defaults
    pub fn from_toml_str(source: &str) -> GradientResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| GradientError::InvalidConfig {
            field: "toml".to_string(),
            value: String::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> GradientResult<String> {
        toml::to_string_pretty(self).map_err(|e| GradientError::Internal {
            message: format!("serializing config: {}", e),
        })
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_toml_str(&source)
            .with_context(|| format!("parsing config {}", path.display()))?;
        log::info!("[GradientConfig::load] Loaded {}", path.display());
        Ok(config)
    }
}
