//! GPU plumbing shared by the tessellation stages and the noise overlay

pub mod context;
pub mod error_recovery;
pub mod gpu_types;
pub mod readback;
pub mod shader_library;

pub use context::GpuContext;
pub use error_recovery::{with_validation_scope, GpuErrorMonitor, GpuResultExt};
pub use gpu_types::{GpuControlPoint, PatchCoefficients, TessellationParams, GPU_TYPES_WGSL};
pub use readback::{read_buffer, read_elements, typed_view};
pub use shader_library::{
    compose_shader, create_compute_kernel, workgroups_for, BindingKind, ComputeKernel,
};
