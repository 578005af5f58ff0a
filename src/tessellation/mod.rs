//! GPU tessellation of control-point grids
//!
//! Three compute stages run back to back on one command encoder:
//! coefficient derivation, patch interpolation and primitive assembly.
//! `TessellationPipeline` sequences them per frame and owns the pool
//! traffic; `reference` mirrors the same math on the host.

pub mod assembly_stage;
pub mod coefficient_stage;
pub mod patch_stage;
pub mod pipeline_data;
pub mod pipeline_operations;
pub mod reference;
pub mod sizing;
pub mod stages;

pub use assembly_stage::AssemblyStage;
pub use coefficient_stage::CoefficientStage;
pub use patch_stage::PatchStage;
pub use pipeline_data::{FrameCapture, FrameOutput, TessellationPipeline};
pub use reference::{
    assemble_triangles, derive_coefficients, hermite_basis, interpolate_patches,
    sample_parameter, tessellate_on_host, HostMesh,
};
pub use sizing::{compute_sizes, TessellationSizes};
pub use stages::{BufferKind, TessellationStage};
