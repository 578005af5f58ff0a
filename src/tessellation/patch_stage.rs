//! Patch interpolation
//!
//! One invocation per dense vertex. The vertex finds its owning cell and the
//! local sample index inside it, then evaluates the cell's bicubic Hermite
//! surface for position and color. Twist terms are zero.
//!
//! Sample parameters hit 0 and 1 exactly at cell borders, so two cells that
//! share an edge evaluate identical expressions on identical inputs there.

use super::sizing::TessellationSizes;
use super::stages::{BufferKind, TessellationStage};
use crate::error::GradientResult;
use crate::gpu::shader_library::{create_compute_kernel, BindingKind, ComputeKernel};

const ENTRY_POINT: &str = "interpolate_patches";

const PATCH_WGSL: &str = r#"
@group(0) @binding(0) var<uniform> params: TessellationParams;
@group(0) @binding(1) var<storage, read> coefficients: array<PatchCoefficients>;
@group(0) @binding(2) var<storage, read_write> dense: array<DenseVertex>;

fn hermite_basis(t: f32) -> vec4<f32> {
    let t2 = t * t;
    let t3 = t2 * t;
    return vec4<f32>(
        2.0 * t3 - 3.0 * t2 + 1.0,
        -2.0 * t3 + 3.0 * t2,
        t3 - 2.0 * t2 + t,
        t3 - t2
    );
}

// Local sample index -> [0, 1]; the last sample is pinned to exactly 1
fn sample_parameter(index: u32) -> f32 {
    if (params.subdivision <= 1u) {
        return 0.0;
    }
    if (index + 1u >= params.subdivision) {
        return 1.0;
    }
    return f32(index) / f32(params.subdivision - 1u);
}

fn hermite_row(weights: vec4<f32>, a: vec4<f32>, b: vec4<f32>, da: vec4<f32>, db: vec4<f32>) -> vec4<f32> {
    return weights.x * a + weights.y * b + weights.z * da + weights.w * db;
}

fn bicubic(
    hu: vec4<f32>,
    hv: vec4<f32>,
    values: array<vec4<f32>, 4>,
    du: array<vec4<f32>, 4>,
    dv: array<vec4<f32>, 4>
) -> vec4<f32> {
    let zero = vec4<f32>(0.0);
    let left = hermite_row(hv, values[0], values[2], dv[0], dv[2]);
    let right = hermite_row(hv, values[1], values[3], dv[1], dv[3]);
    let left_slope = hermite_row(hv, du[0], du[2], zero, zero);
    let right_slope = hermite_row(hv, du[1], du[3], zero, zero);
    return hu.x * left + hu.y * right + hu.z * left_slope + hu.w * right_slope;
}

@compute @workgroup_size({WORKGROUP_EDGE}, {WORKGROUP_EDGE}, 1)
fn interpolate_patches(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.dense_width || id.y >= params.dense_height) {
        return;
    }

    let subdivision = max(params.subdivision, 1u);
    let cell_x = id.x / subdivision;
    let cell_y = id.y / subdivision;
    let cell = coefficients[cell_y * (params.grid_width - 1u) + cell_x];

    let hu = hermite_basis(sample_parameter(id.x % subdivision));
    let hv = hermite_basis(sample_parameter(id.y % subdivision));

    let position = bicubic(hu, hv, cell.positions, cell.position_du, cell.position_dv);
    let color = bicubic(hu, hv, cell.colors, cell.color_du, cell.color_dv);

    let uv_scale = vec2<f32>(
        f32(max(params.dense_width, 2u) - 1u),
        f32(max(params.dense_height, 2u) - 1u)
    );

    var out_vertex: DenseVertex;
    out_vertex.position = vec4<f32>(position.xyz, 1.0);
    out_vertex.color = clamp(color, vec4<f32>(0.0), vec4<f32>(1.0));
    out_vertex.uv = vec2<f32>(id.xy) / uv_scale;
    out_vertex.padding = vec2<f32>(0.0);

    dense[id.y * params.dense_width + id.x] = out_vertex;
}
"#;

pub struct PatchStage {
    kernel: ComputeKernel,
}

impl PatchStage {
    pub fn new(device: &wgpu::Device) -> GradientResult<Self> {
        let kernel = create_compute_kernel(
            device,
            "Patch Interpolation",
            PATCH_WGSL,
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

impl TessellationStage for PatchStage {
    const INPUT: BufferKind = BufferKind::Coefficients;
    const OUTPUT: BufferKind = BufferKind::DenseVertices;

    fn kernel(&self) -> &ComputeKernel {
        &self.kernel
    }

    fn invocation_extent(sizes: &TessellationSizes) -> (u32, u32) {
        (sizes.dense_width, sizes.dense_height)
    }
}
