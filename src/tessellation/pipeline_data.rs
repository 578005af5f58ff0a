//! Pipeline Data - Pure DOP
//!
//! The orchestrator handle and the per-frame records it hands out. Every
//! operation on them lives in pipeline_operations.rs

use super::assembly_stage::AssemblyStage;
use super::coefficient_stage::CoefficientStage;
use super::patch_stage::PatchStage;
use super::sizing::TessellationSizes;
use crate::gpu::gpu_types::PatchCoefficients;
use crate::gpu::GpuContext;
use crate::memory::{BlockId, GpuBufferPool, PooledBuffer};
use crate::renderer::raster_target::RasterTarget;
use crate::renderer::vertex::DenseVertex;
use crate::GradientConfig;
use parking_lot::Mutex;
use std::sync::atomic::AtomicU64;

/// Fixed three-stage tessellation pipeline
///
/// Frames are submitted from one control thread at a time; the params
/// uniform is held under a lock from upload to submit.
pub struct TessellationPipeline {
    pub(crate) context: GpuContext,
    pub(crate) pool: GpuBufferPool,
    pub(crate) config: GradientConfig,
    pub(crate) raster_target: RasterTarget,
    pub(crate) params: Mutex<wgpu::Buffer>,
    pub(crate) coefficient_stage: CoefficientStage,
    pub(crate) patch_stage: PatchStage,
    pub(crate) assembly_stage: AssemblyStage,
    pub(crate) frames_submitted: AtomicU64,
    pub(crate) frames_skipped: AtomicU64,
}

/// The four blocks one frame checks out
#[derive(Debug)]
pub(crate) struct FrameBuffers {
    pub(crate) control_points: PooledBuffer,
    pub(crate) coefficients: PooledBuffer,
    pub(crate) dense: PooledBuffer,
    pub(crate) triangles: PooledBuffer,
}

impl FrameBuffers {
    pub(crate) fn into_vec(self) -> Vec<PooledBuffer> {
        vec![self.control_points, self.coefficients, self.dense, self.triangles]
    }
}

/// A frame whose compute work has been submitted but not yet released
#[derive(Debug)]
pub(crate) struct SubmittedFrame {
    pub(crate) index: u64,
    pub(crate) sizes: TessellationSizes,
    pub(crate) buffers: FrameBuffers,
}

/// Triangle list for one frame, owned by the caller until `retire`
///
/// Dropping a `FrameOutput` without retiring it frees the triangle block
/// instead of recycling it.
#[derive(Debug)]
pub struct FrameOutput {
    pub(crate) index: u64,
    pub(crate) sizes: TessellationSizes,
    pub(crate) raster_target: RasterTarget,
    pub(crate) triangles: PooledBuffer,
    pub(crate) pool: GpuBufferPool,
}

impl FrameOutput {
    pub fn frame_index(&self) -> u64 {
        self.index
    }

    pub fn sizes(&self) -> &TessellationSizes {
        &self.sizes
    }

    pub fn raster_target(&self) -> &RasterTarget {
        &self.raster_target
    }

    /// Non-indexed triangle list, `vertex_count` `DenseVertex` records
    pub fn triangle_buffer(&self) -> &wgpu::Buffer {
        self.triangles.block()
    }

    pub fn triangle_block_id(&self) -> BlockId {
        self.triangles.id()
    }

    pub fn vertex_count(&self) -> u32 {
        self.sizes.triangle_vertex_count as u32
    }

    /// Slice covering exactly this frame's vertices, for `set_vertex_buffer`
    pub fn vertex_slice(&self) -> wgpu::BufferSlice<'_> {
        self.triangles.block().slice(0..self.triangles.requested_size())
    }

    /// Hand the triangle block back once the caller's draw has been submitted
    pub fn retire(self, queue: &wgpu::Queue) {
        let FrameOutput {
            index,
            triangles,
            pool,
            ..
        } = self;
        log::debug!("[FrameOutput::retire] Frame {} retired", index);
        pool.release_on_completion(queue, vec![triangles]);
    }
}

/// Host copies of every intermediate buffer of one frame
#[derive(Debug, Clone)]
pub struct FrameCapture {
    pub sizes: TessellationSizes,
    pub coefficients: Vec<PatchCoefficients>,
    pub dense: Vec<DenseVertex>,
    pub triangles: Vec<DenseVertex>,
}
