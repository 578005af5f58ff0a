//! Coefficient derivation
//!
//! One invocation per grid cell. Each cell gathers its four corner values
//! and their parametric tangents along u and v. Tangents are central
//! differences of neighboring control points, clamped one-sided at the
//! border, so a corner shared by several cells always gets the same inputs.

use super::sizing::TessellationSizes;
use super::stages::{BufferKind, TessellationStage};
use crate::error::GradientResult;
use crate::gpu::shader_library::{create_compute_kernel, BindingKind, ComputeKernel};

const ENTRY_POINT: &str = "derive_coefficients";

const COEFFICIENT_WGSL: &str = r#"
@group(0) @binding(0) var<uniform> params: TessellationParams;
@group(0) @binding(1) var<storage, read> grid: array<ControlPoint>;
@group(0) @binding(2) var<storage, read_write> coefficients: array<PatchCoefficients>;

fn control_at(x: u32, y: u32) -> ControlPoint {
    return grid[y * params.grid_width + x];
}

fn position_du(x: u32, y: u32) -> vec4<f32> {
    let prev = max(x, 1u) - 1u;
    let next = min(x + 1u, params.grid_width - 1u);
    let span = f32(next - prev);
    return vec4<f32>((control_at(next, y).position - control_at(prev, y).position) / span, 0.0);
}

fn position_dv(x: u32, y: u32) -> vec4<f32> {
    let prev = max(y, 1u) - 1u;
    let next = min(y + 1u, params.grid_height - 1u);
    let span = f32(next - prev);
    return vec4<f32>((control_at(x, next).position - control_at(x, prev).position) / span, 0.0);
}

fn color_du(x: u32, y: u32) -> vec4<f32> {
    let prev = max(x, 1u) - 1u;
    let next = min(x + 1u, params.grid_width - 1u);
    let span = f32(next - prev);
    return (control_at(next, y).color - control_at(prev, y).color) / span;
}

fn color_dv(x: u32, y: u32) -> vec4<f32> {
    let prev = max(y, 1u) - 1u;
    let next = min(y + 1u, params.grid_height - 1u);
    let span = f32(next - prev);
    return (control_at(x, next).color - control_at(x, prev).color) / span;
}

@compute @workgroup_size({WORKGROUP_EDGE}, {WORKGROUP_EDGE}, 1)
fn derive_coefficients(@builtin(global_invocation_id) id: vec3<u32>) {
    let cell_columns = params.grid_width - 1u;
    let cell_rows = params.grid_height - 1u;
    if (id.x >= cell_columns || id.y >= cell_rows) {
        return;
    }

    var cell: PatchCoefficients;
    for (var corner = 0u; corner < 4u; corner = corner + 1u) {
        let x = id.x + (corner & 1u);
        let y = id.y + (corner >> 1u);
        let control = control_at(x, y);
        cell.positions[corner] = vec4<f32>(control.position, 1.0);
        cell.colors[corner] = control.color;
        cell.position_du[corner] = position_du(x, y);
        cell.position_dv[corner] = position_dv(x, y);
        cell.color_du[corner] = color_du(x, y);
        cell.color_dv[corner] = color_dv(x, y);
    }

    coefficients[id.y * cell_columns + id.x] = cell;
}
"#;

pub struct CoefficientStage {
    kernel: ComputeKernel,
}

impl CoefficientStage {
    pub fn new(device: &wgpu::Device) -> GradientResult<Self> {
        let kernel = create_compute_kernel(
            device,
            "Coefficient Derivation",
            COEFFICIENT_WGSL,
            ENTRY_POINT,
            &[
                BindingKind::Uniform,
                BindingKind::StorageRead,
                BindingKind::StorageReadWrite,
            ],
        )?;
        Ok(Self { kernel })
    }
}

impl TessellationStage for CoefficientStage {
    const INPUT: BufferKind = BufferKind::ControlPoints;
    const OUTPUT: BufferKind = BufferKind::Coefficients;

    fn kernel(&self) -> &ComputeKernel {
        &self.kernel
    }

    fn invocation_extent(sizes: &TessellationSizes) -> (u32, u32) {
        (sizes.cell_columns, sizes.cell_rows)
    }
}
