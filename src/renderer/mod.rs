//! Renderer Module - output contract and overlay
//!
//! Rasterization itself happens outside this crate. This module describes
//! what the rasterizer receives and hosts the optional noise overlay kernel.

pub mod noise_overlay;
pub mod raster_target;
pub mod vertex;

pub use noise_overlay::{noise_workgroups, NoiseOverlay, NoiseParams, NoiseTexture};
pub use raster_target::{PixelFormat, RasterTarget, Viewport};
pub use vertex::DenseVertex;
