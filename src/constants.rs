//! Shared constants for the tessellation pipeline
//!
//! Kernel work-group shapes live here so the WGSL sources and the dispatch
//! arithmetic on the host can never drift apart.

/// Kernel dispatch shapes
pub mod dispatch {
    /// Edge length of the square work-group every tessellation kernel uses
    pub const WORKGROUP_EDGE: u32 = 8;

    /// Edge length of the noise overlay work-group
    pub const NOISE_WORKGROUP_EDGE: u32 = 8;
}

/// Tessellation defaults and limits
pub mod tessellation {
    /// Samples per patch edge when no configuration overrides it
    pub const DEFAULT_SUBDIVISION: u32 = 24;

    /// Largest subdivision factor accepted by configuration
    pub const MAX_SUBDIVISION: u32 = 256;

    /// Smallest legal grid edge (a patch needs two corners per axis)
    pub const MIN_GRID_EDGE: u32 = 2;

    /// Vertices emitted per dense-grid quad (two triangles, no index buffer)
    pub const VERTICES_PER_QUAD: u64 = 6;

    /// Corners per patch record
    pub const PATCH_CORNERS: usize = 4;
}

/// Viewport defaults and limits
pub mod viewport {
    pub const DEFAULT_WIDTH: u32 = 1280;
    pub const DEFAULT_HEIGHT: u32 = 720;

    /// Matches wgpu's default `max_texture_dimension_2d`
    pub const MAX_DIMENSION: u32 = 8192;
}
