//! Pipeline Operations
//!
//! Per-frame orchestration: validate and size, check out the frame's
//! blocks, encode the three stages on one command encoder, submit, and hand
//! the intermediate blocks back to the pool once the GPU signals completion.
//! A frame either runs all three stages or none of them.

use super::pipeline_data::{
    FrameBuffers, FrameCapture, FrameOutput, SubmittedFrame, TessellationPipeline,
};
use super::sizing::{compute_sizes, TessellationSizes};
use super::stages::{BufferKind, TessellationStage};
use super::{AssemblyStage, CoefficientStage, PatchStage};
use crate::error::{ErrorSeverity, GradientError, GradientResult};
use crate::gpu::gpu_types::{GpuControlPoint, TessellationParams};
use crate::gpu::readback::read_buffer;
use crate::gpu::GpuContext;
use crate::grid::{validate_grid, ControlPoint, Grid, GridProvider};
use crate::memory::{
    BlockRequest, BufferPool, GpuBufferPool, PoolStats, PooledBuffer, WgpuBlockAllocator,
};
use crate::renderer::raster_target::RasterTarget;
use crate::renderer::vertex::DenseVertex;
use crate::GradientConfig;
use parking_lot::Mutex;
use std::mem::size_of;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

impl TessellationPipeline {
    /// Compile the three kernels and set up an empty pool
    ///
    /// Fails with `ShaderCompilation` if any kernel is rejected by the device.
    pub fn new(context: &GpuContext, config: GradientConfig) -> GradientResult<Self> {
        let pool = BufferPool::new(WgpuBlockAllocator::new(Arc::clone(context.device())));
        Self::with_pool(context, config, pool)
    }

    /// Like `new`, drawing blocks from an existing pool
    pub fn with_pool(
        context: &GpuContext,
        config: GradientConfig,
        pool: GpuBufferPool,
    ) -> GradientResult<Self> {
        config.validate()?;
        let raster_target = RasterTarget::new(config.viewport, config.pixel_format)?;

        let device = context.device();
        let coefficient_stage = CoefficientStage::new(device)?;
        let patch_stage = PatchStage::new(device)?;
        let assembly_stage = AssemblyStage::new(device)?;

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Tessellation Params"),
            size: size_of::<TessellationParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        log::info!(
            "[TessellationPipeline::new] Ready: subdivision {}, target {} {}",
            config.subdivision,
            raster_target.viewport,
            raster_target.format
        );

        Ok(Self {
            context: context.clone(),
            pool,
            config,
            raster_target,
            params: Mutex::new(params),
            coefficient_stage,
            patch_stage,
            assembly_stage,
            frames_submitted: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &GradientConfig {
        &self.config
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn pool(&self) -> &GpuBufferPool {
        &self.pool
    }

    pub fn raster_target(&self) -> &RasterTarget {
        &self.raster_target
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted.load(Ordering::Relaxed)
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped.load(Ordering::Relaxed)
    }

    /// Tessellate `grid` for this frame
    ///
    /// The returned triangle block stays checked out until
    /// [`FrameOutput::retire`] is called after the caller's draw.
    pub fn try_run_frame(&self, grid: &Grid<ControlPoint>) -> GradientResult<FrameOutput> {
        let SubmittedFrame {
            index,
            sizes,
            buffers,
        } = self.submit_frame(grid)?;

        let FrameBuffers {
            control_points,
            coefficients,
            dense,
            triangles,
        } = buffers;
        self.pool.release_on_completion(
            self.context.queue(),
            vec![control_points, coefficients, dense],
        );

        Ok(FrameOutput {
            index,
            sizes,
            raster_target: self.raster_target,
            triangles,
            pool: self.pool.clone(),
        })
    }

    /// Like `try_run_frame`, turning any failure into "nothing to draw"
    pub fn run_frame(&self, grid: &Grid<ControlPoint>) -> Option<FrameOutput> {
        match self.try_run_frame(grid) {
            Ok(output) => Some(output),
            Err(e) => {
                self.frames_skipped.fetch_add(1, Ordering::Relaxed);
                match e.severity() {
                    ErrorSeverity::Fatal => {
                        log::error!("[TessellationPipeline::run_frame] Frame aborted: {}", e)
                    }
                    ErrorSeverity::SkipFrame | ErrorSeverity::InvalidInput => {
                        log::warn!("[TessellationPipeline::run_frame] Skipping frame: {}", e)
                    }
                }
                None
            }
        }
    }

    /// Pull the current grid from `provider` and run one frame
    pub fn run_frame_from<P>(&self, provider: &P) -> Option<FrameOutput>
    where
        P: GridProvider + ?Sized,
    {
        self.run_frame(provider.current_grid())
    }

    /// Fire completion callbacks for finished frames without blocking
    pub fn poll(&self) {
        self.context.poll();
    }

    /// Block until every submitted frame has finished and its blocks are back
    pub fn wait_idle(&self) {
        self.context.wait_idle();
    }

    /// Copy a frame's triangle list back to the host, blocking on the GPU
    pub fn read_triangles(&self, output: &FrameOutput) -> GradientResult<Vec<DenseVertex>> {
        read_buffer(
            self.context.device(),
            self.context.queue(),
            &self.pool,
            output.triangle_buffer(),
            output.vertex_count() as usize,
            "triangles",
        )
    }

    /// Run one frame and read back every buffer it produced
    ///
    /// Blocks until the frame has finished; all four blocks are back in the
    /// pool when this returns.
    pub fn capture_frame(&self, grid: &Grid<ControlPoint>) -> GradientResult<FrameCapture> {
        let SubmittedFrame { sizes, buffers, .. } = self.submit_frame(grid)?;
        self.context.wait_idle();

        let capture = self.read_frame_buffers(&sizes, &buffers);
        // Both the frame and the readback copies have completed
        self.pool.release_all(buffers.into_vec());
        capture
    }

    fn read_frame_buffers(
        &self,
        sizes: &TessellationSizes,
        buffers: &FrameBuffers,
    ) -> GradientResult<FrameCapture> {
        let device = self.context.device();
        let queue = self.context.queue();

        Ok(FrameCapture {
            sizes: *sizes,
            coefficients: read_buffer(
                device,
                queue,
                &self.pool,
                buffers.coefficients.block(),
                sizes.cell_count as usize,
                "coefficients",
            )?,
            dense: read_buffer(
                device,
                queue,
                &self.pool,
                buffers.dense.block(),
                sizes.dense_vertex_count as usize,
                "dense vertices",
            )?,
            triangles: read_buffer(
                device,
                queue,
                &self.pool,
                buffers.triangles.block(),
                sizes.triangle_vertex_count as usize,
                "triangles",
            )?,
        })
    }

    /// Validate, acquire, upload, encode and submit one frame
    fn submit_frame(&self, grid: &Grid<ControlPoint>) -> GradientResult<SubmittedFrame> {
        validate_grid(grid)?;
        let sizes = compute_sizes(grid.width(), grid.height(), self.config.subdivision)?;
        if !sizes.has_triangles() {
            return Err(GradientError::DegenerateGrid {
                width: grid.width(),
                height: grid.height(),
                reason: format!(
                    "subdivision {} leaves no quads to triangulate",
                    self.config.subdivision
                ),
            });
        }

        if self.context.monitor().take_out_of_memory() {
            return Err(GradientError::AllocationFailed {
                size: 0,
                class: "device".to_string(),
                reason: "device reported out-of-memory since the last frame".to_string(),
            });
        }

        let buffers = self.acquire_frame_buffers(&sizes)?;

        let points: Vec<GpuControlPoint> = grid.points().iter().map(GpuControlPoint::from).collect();
        let device = self.context.device();
        let queue = self.context.queue();

        let params = self.params.lock();
        queue.write_buffer(
            buffers.control_points.block(),
            0,
            bytemuck::cast_slice(&points),
        );
        queue.write_buffer(&params, 0, bytemuck::bytes_of(&sizes.params()));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Tessellation Encoder"),
        });
        self.coefficient_stage.encode(
            device,
            &mut encoder,
            &params,
            &buffers.control_points,
            &buffers.coefficients,
            &sizes,
        );
        self.patch_stage.encode(
            device,
            &mut encoder,
            &params,
            &buffers.coefficients,
            &buffers.dense,
            &sizes,
        );
        self.assembly_stage.encode(
            device,
            &mut encoder,
            &params,
            &buffers.dense,
            &buffers.triangles,
            &sizes,
        );
        queue.submit(std::iter::once(encoder.finish()));
        drop(params);

        let index = self.frames_submitted.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "[TessellationPipeline::submit_frame] Frame {}: {}x{} grid -> {}x{} dense, {} vertices",
            index,
            sizes.grid_width,
            sizes.grid_height,
            sizes.dense_width,
            sizes.dense_height,
            sizes.triangle_vertex_count
        );

        Ok(SubmittedFrame {
            index,
            sizes,
            buffers,
        })
    }

    /// Check out one block per buffer kind, or none at all
    fn acquire_frame_buffers(&self, sizes: &TessellationSizes) -> GradientResult<FrameBuffers> {
        let requests = BufferKind::ALL.map(|kind| {
            BlockRequest::new(
                kind.byte_size(sizes),
                self.config.storage_class(kind),
                kind.label(),
            )
        });
        let acquired = self.pool.acquire_set(&requests)?;

        let [control_points, coefficients, dense, triangles]: [PooledBuffer; 4] =
            acquired.try_into().map_err(|_| GradientError::Internal {
                message: "frame buffer set incomplete".to_string(),
            })?;

        Ok(FrameBuffers {
            control_points,
            coefficients,
            dense,
            triangles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::context::test_context;
    use crate::grid::{grid_from_fn, lattice_position, uniform_grid};
    use crate::tessellation::reference::tessellate_on_host;
    use glam::{Vec3, Vec4};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn config_with(subdivision: u32) -> GradientConfig {
        GradientConfig {
            subdivision,
            ..Default::default()
        }
    }

    fn random_grid(width: u32, height: u32, seed: u64) -> Grid<ControlPoint> {
        let mut rng = StdRng::seed_from_u64(seed);
        grid_from_fn(width, height, |x, y| {
            let jitter = Vec3::new(rng.gen_range(-0.1..0.1), rng.gen_range(-0.1..0.1), 0.0);
            let color = Vec4::new(rng.gen(), rng.gen(), rng.gen(), 1.0);
            ControlPoint::new(lattice_position(x, y, width, height) + jitter, color)
        })
    }

    fn assert_close(actual: &[f32], expected: &[f32], what: &str) {
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-4, "{}: {} vs {}", what, a, e);
        }
    }

    #[test]
    fn test_matches_host_reference() {
        let Some(context) = test_context() else { return };
        let pipeline = TessellationPipeline::new(&context, config_with(6)).unwrap();
        let grid = random_grid(5, 4, 11);

        let capture = pipeline.capture_frame(&grid).unwrap();
        let host = tessellate_on_host(&grid, 6).unwrap();

        assert_eq!(capture.sizes, host.sizes);
        assert_eq!(capture.coefficients.len(), host.coefficients.len());
        assert_eq!(capture.dense.len(), host.dense.len());
        assert_eq!(capture.triangles.len(), host.triangles.len());

        for (gpu, cpu) in capture.coefficients.iter().zip(&host.coefficients) {
            assert_close(bytemuck::cast_slice(&[*gpu]), bytemuck::cast_slice(&[*cpu]), "coefficients");
        }
        for (gpu, cpu) in capture.triangles.iter().zip(&host.triangles) {
            assert_close(&gpu.position, &cpu.position, "position");
            assert_close(&gpu.color, &cpu.color, "color");
            assert_close(&gpu.uv, &cpu.uv, "uv");
        }

        // Capture returns every block to the pool
        assert_eq!(pipeline.pool_stats().checked_out, 0);
    }

    #[test]
    fn test_gpu_seams_match() {
        let Some(context) = test_context() else { return };
        let subdivision = 4;
        let pipeline = TessellationPipeline::new(&context, config_with(subdivision)).unwrap();
        let capture = pipeline.capture_frame(&random_grid(4, 4, 3)).unwrap();
        let sizes = capture.sizes;
        let at = |x: u32, y: u32| capture.dense[(y * sizes.dense_width + x) as usize];

        let assert_coincide = |last: DenseVertex, first: DenseVertex, x: u32, y: u32| {
            for (a, b) in last.position.iter().zip(&first.position) {
                assert!((a - b).abs() < 1e-6, "position seam at ({}, {})", x, y);
            }
            for (a, b) in last.color.iter().zip(&first.color) {
                assert!((a - b).abs() < 1e-6, "color seam at ({}, {})", x, y);
            }
        };

        for boundary in 1..sizes.cell_columns {
            let x = boundary * subdivision;
            for y in 0..sizes.dense_height {
                assert_coincide(at(x - 1, y), at(x, y), x, y);
            }
        }

        for boundary in 1..sizes.cell_rows {
            let y = boundary * subdivision;
            for x in 0..sizes.dense_width {
                assert_coincide(at(x, y - 1), at(x, y), x, y);
            }
        }
    }

    #[test]
    fn test_oversized_frame_is_skipped_and_pool_recovers() {
        let Some(context) = test_context() else { return };
        let pipeline = TessellationPipeline::new(&context, config_with(256)).unwrap();

        // Dense and triangle buffers run to gigabytes, far past any buffer
        // limit; the control-point and coefficient blocks still fit
        let huge = uniform_grid(64, 64, Vec4::ONE);
        assert!(pipeline.run_frame(&huge).is_none());

        let stats = pipeline.pool_stats();
        assert_eq!(stats.checked_out, 0);
        assert_eq!(stats.idle_blocks, 2);
        assert_eq!(stats.retired, 0);
        assert_eq!(pipeline.frames_skipped(), 1);
        assert_eq!(pipeline.frames_submitted(), 0);

        let output = pipeline.run_frame(&uniform_grid(2, 2, Vec4::ONE)).unwrap();
        assert_eq!(output.vertex_count(), 255 * 255 * 6);
        assert_eq!(pipeline.pool_stats().reuses, 2);

        output.retire(context.queue());
        pipeline.wait_idle();
        assert_eq!(pipeline.pool_stats().checked_out, 0);
    }

    #[test]
    fn test_three_by_three_at_four_yields_294_vertices() {
        let Some(context) = test_context() else { return };
        let pipeline = TessellationPipeline::new(&context, config_with(4)).unwrap();
        let grid = uniform_grid(3, 3, Vec4::new(0.1, 0.5, 0.9, 1.0));

        let output = pipeline.try_run_frame(&grid).unwrap();
        assert_eq!(output.vertex_count(), 294);
        assert_eq!(output.sizes().dense_width, 8);

        let triangles = pipeline.read_triangles(&output).unwrap();
        assert_eq!(triangles.len(), 294);
        assert!(triangles.iter().all(|v| v.position[3] == 1.0));

        output.retire(context.queue());
        pipeline.wait_idle();
        assert_eq!(pipeline.pool_stats().checked_out, 0);
    }

    #[test]
    fn test_degenerate_grid_touches_no_pool() {
        let Some(context) = test_context() else { return };
        let pipeline = TessellationPipeline::new(&context, config_with(8)).unwrap();

        let thin = uniform_grid(1, 4, Vec4::ONE);
        assert!(matches!(
            pipeline.try_run_frame(&thin),
            Err(GradientError::DegenerateGrid { .. })
        ));
        assert!(pipeline.run_frame(&thin).is_none());

        let stats = pipeline.pool_stats();
        assert_eq!(stats.allocations, 0);
        assert_eq!(stats.checked_out, 0);
        assert_eq!(pipeline.frames_submitted(), 0);
        assert_eq!(pipeline.frames_skipped(), 1);
    }

    #[test]
    fn test_zero_triangle_frame_is_skipped() {
        let Some(context) = test_context() else { return };
        let pipeline = TessellationPipeline::new(&context, config_with(1)).unwrap();
        let grid = uniform_grid(2, 2, Vec4::ONE);

        assert!(pipeline.run_frame(&grid).is_none());
        assert_eq!(pipeline.pool_stats().allocations, 0);
    }

    #[test]
    fn test_blocks_recycled_after_completion() {
        let Some(context) = test_context() else { return };
        let pipeline = TessellationPipeline::new(&context, config_with(8)).unwrap();
        let grid = random_grid(4, 3, 5);

        let first = pipeline.run_frame(&grid).unwrap();
        first.retire(context.queue());
        pipeline.wait_idle();

        let stats = pipeline.pool_stats();
        assert_eq!(stats.checked_out, 0);
        assert_eq!(stats.idle_blocks, 4);
        assert_eq!(stats.allocations, 4);

        let second = pipeline.run_frame(&grid).unwrap();
        let stats = pipeline.pool_stats();
        assert_eq!(stats.allocations, 4);
        assert_eq!(stats.reuses, 4);

        second.retire(context.queue());
        pipeline.wait_idle();
    }

    #[test]
    fn test_in_flight_frames_never_share_blocks() {
        let Some(context) = test_context() else { return };
        let pipeline = TessellationPipeline::new(&context, config_with(8)).unwrap();
        let grid = random_grid(4, 4, 9);

        let first = pipeline.run_frame(&grid).unwrap();
        let second = pipeline.run_frame(&grid).unwrap();
        assert_ne!(first.triangle_block_id(), second.triangle_block_id());
        assert_ne!(first.frame_index(), second.frame_index());

        first.retire(context.queue());
        second.retire(context.queue());
        pipeline.wait_idle();
        assert_eq!(pipeline.pool_stats().checked_out, 0);
    }

    #[test]
    fn test_grid_provider_is_pulled() {
        let Some(context) = test_context() else { return };
        let pipeline = TessellationPipeline::new(&context, config_with(2)).unwrap();
        let grid = random_grid(3, 2, 1);

        let output = pipeline.run_frame_from(&grid).unwrap();
        assert_eq!(output.vertex_count(), 18);
        output.retire(context.queue());
        pipeline.wait_idle();
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let Some(context) = test_context() else { return };
        let result = TessellationPipeline::new(&context, config_with(0));
        assert!(matches!(result, Err(GradientError::InvalidConfig { .. })));
    }
}
