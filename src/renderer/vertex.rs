//! Dense vertex - the tessellated sample handed to the rasterizer

use bytemuck::{Pod, Zeroable};

/// One sample of the dense grid, also the element of the triangle list
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DenseVertex {
    /// Clip-space position, w = 1
    pub position: [f32; 4],
    /// Straight RGBA clamped to [0, 1]
    pub color: [f32; 4],
    /// Normalized dense-grid coordinate, for overlay sampling
    pub uv: [f32; 2],
    pub padding: [f32; 2],
}

impl DenseVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x4,
        1 => Float32x4,
        2 => Float32x2
    ];

    /// Layout for drawing the triangle list buffer directly as a vertex buffer
    pub fn buffer_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<DenseVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}
