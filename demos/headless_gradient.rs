//! Headless gradient demo
//!
//! Animates a 4x4 control grid with Perlin turbulence, tessellates a few
//! frames on the GPU, then prints pool traffic and writes one noise overlay.
//!
//! Run with `RUST_LOG=debug` to see per-frame pool activity.

use glam::{Vec3, Vec4};
use gradient_mesh::grid::{grid_from_fn, lattice_position};
use gradient_mesh::{
    ControlPoint, GpuContext, GradientConfig, Grid, GridProvider, NoiseOverlay, NoiseParams,
    PixelFormat, TessellationPipeline, Viewport,
};
use noise::{NoiseFn, Perlin};

const GRID_EDGE: u32 = 4;
const FRAMES: u32 = 8;

/// Stand-in for an animation driver: rest lattice plus Perlin displacement
struct TurbulentGrid {
    rest: Grid<ControlPoint>,
    current: Grid<ControlPoint>,
    perlin: Perlin,
}

impl TurbulentGrid {
    fn new(width: u32, height: u32, seed: u32) -> Self {
        let corners = [
            Vec4::new(0.95, 0.45, 0.35, 1.0),
            Vec4::new(0.98, 0.80, 0.40, 1.0),
            Vec4::new(0.30, 0.35, 0.85, 1.0),
            Vec4::new(0.55, 0.20, 0.70, 1.0),
        ];

        let rest = grid_from_fn(width, height, |x, y| {
            let u = x as f32 / (width - 1) as f32;
            let v = y as f32 / (height - 1) as f32;
            let top = corners[0].lerp(corners[1], u);
            let bottom = corners[2].lerp(corners[3], u);

            let mut point = ControlPoint::new(lattice_position(x, y, width, height), top.lerp(bottom, v));
            // Border points stay put so the surface keeps covering the viewport
            let interior = x > 0 && y > 0 && x + 1 < width && y + 1 < height;
            point.turbulence = if interior { 0.25 } else { 0.0 };
            point
        });

        Self {
            current: rest.clone(),
            rest,
            perlin: Perlin::new(seed),
        }
    }

    fn advance(&mut self, time: f64) {
        let (width, height) = (self.rest.width(), self.rest.height());
        for y in 0..height {
            for x in 0..width {
                let (Some(rest), Some(point)) = (self.rest.get(x, y), self.current.get_mut(x, y)) else {
                    continue;
                };
                let sample = [x as f64 * 0.7, y as f64 * 0.7, time];
                let dx = self.perlin.get(sample) as f32;
                let dy = self.perlin.get([sample[0] + 31.4, sample[1], time]) as f32;
                point.position = rest.position + Vec3::new(dx, dy, 0.0) * rest.turbulence;

                let shimmer = self.perlin.get([sample[0], sample[1] + 17.0, time * 0.5]) as f32;
                point.color = (rest.color + Vec4::splat(shimmer * 0.1).truncate().extend(0.0))
                    .clamp(Vec4::ZERO, Vec4::ONE);
            }
        }
    }
}

impl GridProvider for TurbulentGrid {
    fn current_grid(&self) -> &Grid<ControlPoint> {
        &self.current
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let context = GpuContext::new_headless()?;
    let viewport = Viewport::new(512, 512);
    let config = GradientConfig {
        subdivision: 16,
        viewport,
        ..Default::default()
    };
    let pipeline = TessellationPipeline::new(&context, config)?;
    let mut animator = TurbulentGrid::new(GRID_EDGE, GRID_EDGE, 7);

    for frame in 0..FRAMES {
        animator.advance(frame as f64 * 0.1);

        match pipeline.run_frame_from(&animator) {
            Some(output) => {
                println!(
                    "frame {}: {} triangles in block {:?}",
                    output.frame_index(),
                    output.sizes().triangle_count(),
                    output.triangle_block_id()
                );
                // A real renderer would record its draw here before retiring
                output.retire(context.queue());
            }
            None => println!("frame {}: skipped", frame),
        }

        pipeline.poll();
    }

    pipeline.wait_idle();
    println!("{}", pipeline.pool_stats());

    let overlay = NoiseOverlay::new(&context, PixelFormat::Rgba8Unorm)?;
    let params = NoiseParams {
        alpha: 0.08,
        time: FRAMES as f32 * 0.1,
        ..Default::default()
    };
    if let Some(noise) = overlay.generate(viewport, &params)? {
        println!(
            "noise overlay {} written with {}x{} work-groups",
            noise.viewport, noise.workgroups.0, noise.workgroups.1
        );
    }

    Ok(())
}
