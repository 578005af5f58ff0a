//! GPU record layouts
//!
//! Every struct here has a WGSL twin in [`GPU_TYPES_WGSL`]. Sizes are pinned
//! with static assertions so a field change that breaks std430/uniform layout
//! fails to compile instead of corrupting buffers.

use crate::constants::tessellation::PATCH_CORNERS;
use crate::grid::ControlPoint;
use crate::renderer::vertex::DenseVertex;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::size_of;

/// Control point as uploaded to the coefficient kernel
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuControlPoint {
    pub position: [f32; 3],
    pub turbulence: f32,
    pub color: [f32; 4],
}

impl From<&ControlPoint> for GpuControlPoint {
    fn from(point: &ControlPoint) -> Self {
        Self {
            position: point.position.to_array(),
            turbulence: point.turbulence,
            color: point.color.to_array(),
        }
    }
}

/// Per-cell Hermite inputs
///
/// Corner order is (u, v) = (0,0), (1,0), (0,1), (1,1). Tangents are
/// derivatives with respect to the patch parameters, one cell spanning [0, 1].
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PatchCoefficients {
    pub positions: [[f32; 4]; PATCH_CORNERS],
    pub colors: [[f32; 4]; PATCH_CORNERS],
    pub position_du: [[f32; 4]; PATCH_CORNERS],
    pub position_dv: [[f32; 4]; PATCH_CORNERS],
    pub color_du: [[f32; 4]; PATCH_CORNERS],
    pub color_dv: [[f32; 4]; PATCH_CORNERS],
}

/// Uniform block shared by the three tessellation kernels
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TessellationParams {
    pub grid_width: u32,
    pub grid_height: u32,
    pub subdivision: u32,
    pub dense_width: u32,
    pub dense_height: u32,
    pub quad_columns: u32,
    pub quad_rows: u32,
    pub padding: u32,
}

const_assert_eq!(size_of::<GpuControlPoint>(), 32);
const_assert_eq!(size_of::<PatchCoefficients>(), 384);
const_assert_eq!(size_of::<DenseVertex>(), 48);
const_assert_eq!(size_of::<TessellationParams>(), 32);

/// WGSL definitions of the records above, prepended to every kernel
pub const GPU_TYPES_WGSL: &str = r#"
struct ControlPoint {
    position: vec3<f32>,
    turbulence: f32,
    color: vec4<f32>,
}

struct PatchCoefficients {
    positions: array<vec4<f32>, 4>,
    colors: array<vec4<f32>, 4>,
    position_du: array<vec4<f32>, 4>,
    position_dv: array<vec4<f32>, 4>,
    color_du: array<vec4<f32>, 4>,
    color_dv: array<vec4<f32>, 4>,
}

struct DenseVertex {
    position: vec4<f32>,
    color: vec4<f32>,
    uv: vec2<f32>,
    padding: vec2<f32>,
}

struct TessellationParams {
    grid_width: u32,
    grid_height: u32,
    subdivision: u32,
    dense_width: u32,
    dense_height: u32,
    quad_columns: u32,
    quad_rows: u32,
    padding: u32,
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4};

    #[test]
    fn test_control_point_conversion() {
        let mut point = ControlPoint::new(Vec3::new(0.5, -0.25, 0.0), Vec4::new(1.0, 0.5, 0.0, 1.0));
        point.turbulence = 0.3;
        let gpu = GpuControlPoint::from(&point);
        assert_eq!(gpu.position, [0.5, -0.25, 0.0]);
        assert_eq!(gpu.turbulence, 0.3);
        assert_eq!(gpu.color, [1.0, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn test_wgsl_prelude_declares_every_record() {
        for name in [
            "struct ControlPoint",
            "struct PatchCoefficients",
            "struct DenseVertex",
            "struct TessellationParams",
        ] {
            assert!(GPU_TYPES_WGSL.contains(name), "missing {}", name);
        }
    }
}
