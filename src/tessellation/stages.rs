//! Buffer kinds and the shared shape of a tessellation stage
//!
//! The pipeline is a fixed chain: control points -> coefficients -> dense
//! vertices -> triangles. Each stage reads one kind and writes the next.

use super::sizing::TessellationSizes;
use crate::constants::dispatch::WORKGROUP_EDGE;
use crate::gpu::gpu_types::{GpuControlPoint, PatchCoefficients};
use crate::gpu::shader_library::{workgroups_for, ComputeKernel};
use crate::memory::PooledBuffer;
use crate::renderer::vertex::DenseVertex;
use std::mem::size_of;
use std::num::NonZeroU64;

/// Buffers a frame checks out of the pool, in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    ControlPoints,
    Coefficients,
    DenseVertices,
    Triangles,
}

impl BufferKind {
    pub const ALL: [BufferKind; 4] = [
        BufferKind::ControlPoints,
        BufferKind::Coefficients,
        BufferKind::DenseVertices,
        BufferKind::Triangles,
    ];

    /// Bytes per element
    pub fn stride(self) -> u64 {
        (match self {
            BufferKind::ControlPoints => size_of::<GpuControlPoint>(),
            BufferKind::Coefficients => size_of::<PatchCoefficients>(),
            BufferKind::DenseVertices | BufferKind::Triangles => size_of::<DenseVertex>(),
        }) as u64
    }

    pub fn element_count(self, sizes: &TessellationSizes) -> u64 {
        match self {
            BufferKind::ControlPoints => sizes.control_point_count,
            BufferKind::Coefficients => sizes.cell_count,
            BufferKind::DenseVertices => sizes.dense_vertex_count,
            BufferKind::Triangles => sizes.triangle_vertex_count,
        }
    }

    pub fn byte_size(self, sizes: &TessellationSizes) -> u64 {
        self.element_count(sizes).saturating_mul(self.stride())
    }

    pub fn label(self) -> &'static str {
        match self {
            BufferKind::ControlPoints => "gradient-mesh::control-points",
            BufferKind::Coefficients => "gradient-mesh::coefficients",
            BufferKind::DenseVertices => "gradient-mesh::dense-vertices",
            BufferKind::Triangles => "gradient-mesh::triangles",
        }
    }
}

/// Bind only the bytes this frame uses; pooled blocks may be larger
pub(crate) fn frame_binding(binding: u32, buffer: &PooledBuffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: buffer.block(),
            offset: 0,
            size: NonZeroU64::new(buffer.requested_size()),
        }),
    }
}

/// One compute dispatch of the tessellation chain
///
/// Every stage binds `params` at 0, its input at 1 and its output at 2.
pub trait TessellationStage {
    const INPUT: BufferKind;
    const OUTPUT: BufferKind;

    fn kernel(&self) -> &ComputeKernel;

    /// Invocation grid the kernel covers, one thread per output element
    fn invocation_extent(sizes: &TessellationSizes) -> (u32, u32);

    fn workgroups(sizes: &TessellationSizes) -> (u32, u32) {
        let (x, y) = Self::invocation_extent(sizes);
        (workgroups_for(x, WORKGROUP_EDGE), workgroups_for(y, WORKGROUP_EDGE))
    }

    /// Record this stage as its own compute pass on `encoder`
    fn encode(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        params: &wgpu::Buffer,
        input: &PooledBuffer,
        output: &PooledBuffer,
        sizes: &TessellationSizes,
    ) {
        let kernel = self.kernel();
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.name),
            layout: &kernel.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                frame_binding(1, input),
                frame_binding(2, output),
            ],
        });

        let (groups_x, groups_y) = Self::workgroups(sizes);
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.name),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&kernel.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(groups_x, groups_y, 1);
        }

        log::debug!(
            "[TessellationStage::encode] {}: {:?} -> {:?} with {}x{} work-groups",
            kernel.name,
            Self::INPUT,
            Self::OUTPUT,
            groups_x,
            groups_y
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tessellation::sizing::compute_sizes;

    #[test]
    fn test_byte_sizes() {
        let sizes = compute_sizes(3, 3, 4).unwrap();
        assert_eq!(BufferKind::ControlPoints.byte_size(&sizes), 9 * 32);
        assert_eq!(BufferKind::Coefficients.byte_size(&sizes), 4 * 384);
        assert_eq!(BufferKind::DenseVertices.byte_size(&sizes), 64 * 48);
        assert_eq!(BufferKind::Triangles.byte_size(&sizes), 294 * 48);
    }

    #[test]
    fn test_kinds_are_in_dependency_order() {
        assert_eq!(BufferKind::ALL[0], BufferKind::ControlPoints);
        assert_eq!(BufferKind::ALL[3], BufferKind::Triangles);
    }
}
