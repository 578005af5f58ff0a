// Gradient Mesh - GPU tessellation of animated gradient surfaces
//
// A sparse grid of colored control points is turned into a dense triangle
// list by three compute passes per frame. Device memory for every pass
// comes from a pool that only recycles a block once the GPU is done with it.
//
// Layout follows a data-oriented split:
// - *_data.rs files hold plain structs
// - *_operations.rs files hold the functions that transform them
// - stage objects in tessellation/ own their compiled kernel

// Constants module
pub mod constants;

// Core modules
pub mod config;
pub mod error;
pub mod grid;
pub mod memory;

// GPU and pipeline
pub mod gpu;
pub mod renderer;
pub mod tessellation;

pub use config::GradientConfig;
pub use error::{ErrorContext, ErrorSeverity, GradientError, GradientResult, OptionExt};
pub use gpu::GpuContext;
pub use grid::{ControlPoint, Grid, GridProvider};
pub use memory::{BufferPool, GpuBufferPool, PoolStats, PooledBuffer, StorageClass};
pub use renderer::{
    DenseVertex, NoiseOverlay, NoiseParams, NoiseTexture, PixelFormat, RasterTarget, Viewport,
};
pub use tessellation::{
    tessellate_on_host, BufferKind, FrameCapture, FrameOutput, TessellationPipeline,
    TessellationSizes,
};

// Re-export wgpu so callers can drive the device and draw the output
pub use wgpu;
