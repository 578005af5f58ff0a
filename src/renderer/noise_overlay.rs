//! Film-grain noise overlay
//!
//! A single storage-texture kernel that fills a viewport-sized texture with
//! animated value noise. Unlike the tessellation frame it is synchronous:
//! `generate` blocks until the GPU has written the texture.

use super::raster_target::{PixelFormat, Viewport};
use crate::constants::dispatch::NOISE_WORKGROUP_EDGE;
use crate::error::{GradientError, GradientResult};
use crate::gpu::shader_library::{create_compute_kernel, BindingKind, ComputeKernel};
use crate::gpu::GpuContext;
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

const ENTRY_POINT: &str = "generate_noise";

const NOISE_WGSL: &str = r#"
struct NoiseParams {
    alpha: f32,
    scale: f32,
    time: f32,
    seed: u32,
}

@group(0) @binding(0) var<uniform> noise: NoiseParams;
@group(0) @binding(1) var noise_texture: texture_storage_2d<{TEXEL_FORMAT}, write>;

fn hash(lattice: vec2<u32>) -> f32 {
    var h = lattice.x * 374761393u + lattice.y * 668265263u + noise.seed * 2246822519u;
    h = (h ^ (h >> 13u)) * 1274126177u;
    h = h ^ (h >> 16u);
    return f32(h & 0x00ffffffu) / 16777215.0;
}

fn value_noise(position: vec2<f32>) -> f32 {
    let cell = floor(position);
    let offset = position - cell;
    let smooth_offset = offset * offset * (3.0 - 2.0 * offset);
    let base = vec2<u32>(cell);

    let a = hash(base);
    let b = hash(base + vec2<u32>(1u, 0u));
    let c = hash(base + vec2<u32>(0u, 1u));
    let d = hash(base + vec2<u32>(1u, 1u));
    return mix(mix(a, b, smooth_offset.x), mix(c, d, smooth_offset.x), smooth_offset.y);
}

@compute @workgroup_size({NOISE_WORKGROUP_EDGE}, {NOISE_WORKGROUP_EDGE}, 1)
fn generate_noise(@builtin(global_invocation_id) id: vec3<u32>) {
    let size = textureDimensions(noise_texture);
    if (id.x >= size.x || id.y >= size.y) {
        return;
    }

    let drift = vec2<f32>(noise.time, noise.time * 0.5);
    let position = vec2<f32>(id.xy) * noise.scale + drift;
    let grain = value_noise(position);
    textureStore(noise_texture, vec2<i32>(id.xy), vec4<f32>(grain, grain, grain, noise.alpha));
}
"#;

/// Uniform block for the noise kernel; `alpha <= 0` disables the overlay
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct NoiseParams {
    pub alpha: f32,
    /// Noise lattice cells per pixel
    pub scale: f32,
    /// Animation time in seconds
    pub time: f32,
    pub seed: u32,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            alpha: 0.06,
            scale: 0.35,
            time: 0.0,
            seed: 0,
        }
    }
}

impl NoiseParams {
    pub fn is_enabled(&self) -> bool {
        self.alpha > 0.0
    }
}

/// Texture written by one overlay dispatch
#[derive(Debug)]
pub struct NoiseTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub viewport: Viewport,
    /// Work-groups dispatched along x and y
    pub workgroups: (u32, u32),
}

/// Work-groups for `viewport`; a remainder that does not fill a whole group is left out
pub fn noise_workgroups(viewport: Viewport) -> (u32, u32) {
    (
        viewport.width / NOISE_WORKGROUP_EDGE,
        viewport.height / NOISE_WORKGROUP_EDGE,
    )
}

/// WGSL texel format for `format`, if the overlay can write it
pub fn overlay_texel_format(format: PixelFormat) -> GradientResult<&'static str> {
    format
        .storage_texel_format()
        .ok_or_else(|| GradientError::UnsupportedFormat {
            format: format.to_string(),
            reason: "not writable as a storage texture".to_string(),
        })
}

/// Kernel body with the texel format and work-group edge filled in
fn noise_shader_body(texel_format: &str) -> String {
    NOISE_WGSL
        .replace("{TEXEL_FORMAT}", texel_format)
        .replace("{NOISE_WORKGROUP_EDGE}", &NOISE_WORKGROUP_EDGE.to_string())
}

pub struct NoiseOverlay {
    context: GpuContext,
    kernel: ComputeKernel,
    format: PixelFormat,
}

impl NoiseOverlay {
    pub fn new(context: &GpuContext, format: PixelFormat) -> GradientResult<Self> {
        let body = noise_shader_body(overlay_texel_format(format)?);

        let kernel = create_compute_kernel(
            context.device(),
            "Noise Overlay",
            &body,
            ENTRY_POINT,
            &[
                BindingKind::Uniform,
                BindingKind::StorageTexture(format.to_wgpu()),
            ],
        )?;

        log::info!("[NoiseOverlay::new] Noise overlay ready ({})", format);

        Ok(Self {
            context: context.clone(),
            kernel,
            format,
        })
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Fill a viewport-sized texture with noise, blocking until it is written
    ///
    /// Returns `Ok(None)` without touching the GPU when the overlay is disabled.
    pub fn generate(
        &self,
        viewport: Viewport,
        params: &NoiseParams,
    ) -> GradientResult<Option<NoiseTexture>> {
        if !params.is_enabled() {
            log::debug!("[NoiseOverlay::generate] alpha {} <= 0, skipping", params.alpha);
            return Ok(None);
        }
        viewport.validate()?;

        if viewport.width % NOISE_WORKGROUP_EDGE != 0 || viewport.height % NOISE_WORKGROUP_EDGE != 0 {
            log::warn!(
                "[NoiseOverlay::generate] Viewport {} is not a multiple of {}; the remainder stays unwritten",
                viewport,
                NOISE_WORKGROUP_EDGE
            );
        }

        let device = self.context.device();
        let queue = self.context.queue();

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Noise Overlay Texture"),
            size: viewport.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format.to_wgpu(),
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Noise Overlay Params"),
            contents: bytemuck::bytes_of(params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Noise Overlay Bind Group"),
            layout: &self.kernel.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
            ],
        });

        let workgroups = noise_workgroups(viewport);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Noise Overlay Encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Noise Overlay"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.kernel.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(workgroups.0, workgroups.1, 1);
        }
        queue.submit(std::iter::once(encoder.finish()));
        self.context.wait_idle();

        log::debug!(
            "[NoiseOverlay::generate] {} texture written with {}x{} work-groups",
            viewport,
            workgroups.0,
            workgroups.1
        );

        Ok(Some(NoiseTexture {
            texture,
            view,
            viewport,
            workgroups,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::context::test_context;

    #[test]
    fn test_workgroups_floor_to_whole_groups() {
        assert_eq!(noise_workgroups(Viewport::new(128, 128)), (16, 16));
        assert_eq!(noise_workgroups(Viewport::new(1280, 720)), (160, 90));
        assert_eq!(noise_workgroups(Viewport::new(130, 7)), (16, 0));
    }

    #[test]
    fn test_only_storage_formats_accepted() {
        assert_eq!(overlay_texel_format(PixelFormat::Rgba8Unorm).unwrap(), "rgba8unorm");
        assert!(matches!(
            overlay_texel_format(PixelFormat::Bgra8UnormSrgb),
            Err(GradientError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_shader_body_matches_dispatch_edge() {
        let body = noise_shader_body("rgba16float");
        assert!(body.contains("texture_storage_2d<rgba16float, write>"));
        assert!(body.contains(&format!(
            "@workgroup_size({0}, {0}, 1)",
            NOISE_WORKGROUP_EDGE
        )));
        assert!(!body.contains("{NOISE_WORKGROUP_EDGE}"));
        assert!(!body.contains("{TEXEL_FORMAT}"));
    }

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<NoiseParams>(), 16);
        assert!(!NoiseParams { alpha: 0.0, ..Default::default() }.is_enabled());
        assert!(!NoiseParams { alpha: -1.0, ..Default::default() }.is_enabled());
    }

    #[test]
    fn test_zero_alpha_produces_no_texture() {
        let Some(context) = test_context() else { return };
        let overlay = NoiseOverlay::new(&context, PixelFormat::Rgba8Unorm).unwrap();
        let params = NoiseParams {
            alpha: 0.0,
            ..Default::default()
        };
        assert!(overlay
            .generate(Viewport::new(128, 128), &params)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_dispatches_sixteen_by_sixteen_for_128() {
        let Some(context) = test_context() else { return };
        let overlay = NoiseOverlay::new(&context, PixelFormat::Rgba8Unorm).unwrap();
        let params = NoiseParams {
            alpha: 0.25,
            ..Default::default()
        };
        let noise = overlay
            .generate(Viewport::new(128, 128), &params)
            .unwrap()
            .unwrap();
        assert_eq!(noise.workgroups, (16, 16));
        assert_eq!(noise.texture.width(), 128);
        assert_eq!(noise.texture.height(), 128);
    }

    #[test]
    fn test_rejects_empty_viewport() {
        let Some(context) = test_context() else { return };
        let overlay = NoiseOverlay::new(&context, PixelFormat::Rgba16Float).unwrap();
        let result = overlay.generate(Viewport::new(0, 64), &NoiseParams::default());
        assert!(matches!(result, Err(GradientError::InvalidViewport { .. })));
    }
}
