//! Primitive assembly
//!
//! One invocation per dense quad, six vertices out. Every quad is split
//! along the same diagonal, (x, y) to (x + 1, y + 1), with consistent
//! winding: [v00, v10, v11] then [v00, v11, v01].

use super::sizing::TessellationSizes;
use super::stages::{BufferKind, TessellationStage};
use crate::error::GradientResult;
use crate::gpu::shader_library::{create_compute_kernel, BindingKind, ComputeKernel};

const ENTRY_POINT: &str = "assemble_triangles";

const ASSEMBLY_WGSL: &str = r#"
@group(0) @binding(0) var<uniform> params: TessellationParams;
@group(0) @binding(1) var<storage, read> dense: array<DenseVertex>;
@group(0) @binding(2) var<storage, read_write> triangles: array<DenseVertex>;

fn dense_at(x: u32, y: u32) -> DenseVertex {
    return dense[y * params.dense_width + x];
}

@compute @workgroup_size({WORKGROUP_EDGE}, {WORKGROUP_EDGE}, 1)
fn assemble_triangles(@builtin(global_invocation_id) id: vec3<u32>) {
    if (id.x >= params.quad_columns || id.y >= params.quad_rows) {
        return;
    }

    let v00 = dense_at(id.x, id.y);
    let v10 = dense_at(id.x + 1u, id.y);
    let v01 = dense_at(id.x, id.y + 1u);
    let v11 = dense_at(id.x + 1u, id.y + 1u);

    let base = (id.y * params.quad_columns + id.x) * 6u;
    triangles[base] = v00;
    triangles[base + 1u] = v10;
    triangles[base + 2u] = v11;
    triangles[base + 3u] = v00;
    triangles[base + 4u] = v11;
    triangles[base + 5u] = v01;
}
"#;

pub struct AssemblyStage {
    kernel: ComputeKernel,
}

impl AssemblyStage {
    pub fn new(device: &wgpu::Device) -> GradientResult<Self> {
        let kernel = create_compute_kernel(
            device,
            "Primitive Assembly",
            ASSEMBLY_WGSL,
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

impl TessellationStage for AssemblyStage {
    const INPUT: BufferKind = BufferKind::DenseVertices;
    const OUTPUT: BufferKind = BufferKind::Triangles;

    fn kernel(&self) -> &ComputeKernel {
        &self.kernel
    }

    fn invocation_extent(sizes: &TessellationSizes) -> (u32, u32) {
        (sizes.quad_columns, sizes.quad_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::dispatch::WORKGROUP_EDGE;
    use crate::gpu::shader_library::compose_shader;
    use crate::tessellation::sizing::compute_sizes;

    #[test]
    fn test_one_invocation_per_quad() {
        let sizes = compute_sizes(3, 3, 4).unwrap();
        assert_eq!(AssemblyStage::invocation_extent(&sizes), (7, 7));
        assert_eq!(AssemblyStage::workgroups(&sizes), (1, 1));
    }

    #[test]
    fn test_source_names_entry_point_and_workgroup() {
        assert!(ASSEMBLY_WGSL.contains(&format!("fn {}(", ENTRY_POINT)));
        let source = compose_shader(ASSEMBLY_WGSL);
        assert!(source.contains(&format!("@workgroup_size({0}, {0}, 1)", WORKGROUP_EDGE)));
    }
}
