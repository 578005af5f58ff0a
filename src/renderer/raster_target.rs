//! Output contract for the external rasterizer
//!
//! The pipeline never paints pixels; it hands over a triangle buffer plus a
//! `RasterTarget` describing where and in what format it should be drawn.

use crate::constants::viewport::{DEFAULT_HEIGHT, DEFAULT_WIDTH, MAX_DIMENSION};
use crate::error::{GradientError, GradientResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Render area in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Reject empty or oversized viewports
    pub fn validate(&self) -> GradientResult<()> {
        if self.width == 0
            || self.height == 0
            || self.width > MAX_DIMENSION
            || self.height > MAX_DIMENSION
        {
            return Err(GradientError::InvalidViewport {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel formats the crate can describe to a rasterizer or write from a kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PixelFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
}

impl PixelFormat {
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            PixelFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            PixelFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            PixelFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            PixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            PixelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        }
    }

    /// WGSL texel format name, for formats usable as write-only storage textures
    pub fn storage_texel_format(self) -> Option<&'static str> {
        match self {
            PixelFormat::Rgba8Unorm => Some("rgba8unorm"),
            PixelFormat::Rgba16Float => Some("rgba16float"),
            PixelFormat::Rgba32Float => Some("rgba32float"),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Rgba8Unorm => "rgba8-unorm",
            PixelFormat::Rgba8UnormSrgb => "rgba8-unorm-srgb",
            PixelFormat::Bgra8Unorm => "bgra8-unorm",
            PixelFormat::Bgra8UnormSrgb => "bgra8-unorm-srgb",
            PixelFormat::Rgba16Float => "rgba16-float",
            PixelFormat::Rgba32Float => "rgba32-float",
        }
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        PixelFormat::Bgra8UnormSrgb
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where and how the triangle list should be rasterized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RasterTarget {
    pub viewport: Viewport,
    pub format: PixelFormat,
}

impl RasterTarget {
    pub fn new(viewport: Viewport, format: PixelFormat) -> GradientResult<Self> {
        viewport.validate()?;
        Ok(Self { viewport, format })
    }

    pub fn texture_format(&self) -> wgpu::TextureFormat {
        self.format.to_wgpu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_validation() {
        assert!(Viewport::new(128, 128).validate().is_ok());
        assert!(matches!(
            Viewport::new(0, 128).validate(),
            Err(GradientError::InvalidViewport { width: 0, .. })
        ));
        assert!(Viewport::new(128, 0).validate().is_err());
        assert!(Viewport::new(MAX_DIMENSION + 1, 16).validate().is_err());
    }

    #[test]
    fn test_storage_formats() {
        assert_eq!(PixelFormat::Rgba8Unorm.storage_texel_format(), Some("rgba8unorm"));
        assert_eq!(PixelFormat::Rgba32Float.storage_texel_format(), Some("rgba32float"));
        assert_eq!(PixelFormat::Bgra8UnormSrgb.storage_texel_format(), None);
        assert_eq!(
            PixelFormat::Rgba16Float.to_wgpu(),
            wgpu::TextureFormat::Rgba16Float
        );
    }

    #[test]
    fn test_raster_target_rejects_empty_viewport() {
        assert!(RasterTarget::new(Viewport::new(0, 0), PixelFormat::default()).is_err());
        let target = RasterTarget::new(Viewport::new(640, 480), PixelFormat::Bgra8Unorm).unwrap();
        assert_eq!(target.texture_format(), wgpu::TextureFormat::Bgra8Unorm);
        assert_eq!(target.viewport.to_string(), "640x480");
    }
}
