//! Per-frame sizing arithmetic
//!
//! All counts are derived once per frame with checked arithmetic so that an
//! absurd grid or subdivision is rejected before any block is acquired.

use crate::constants::tessellation::VERTICES_PER_QUAD;
use crate::error::{GradientError, GradientResult};
use crate::gpu::gpu_types::TessellationParams;
use crate::grid::validate_grid_shape;

/// Every count and extent one frame needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TessellationSizes {
    pub grid_width: u32,
    pub grid_height: u32,
    pub subdivision: u32,
    pub cell_columns: u32,
    pub cell_rows: u32,
    pub dense_width: u32,
    pub dense_height: u32,
    pub quad_columns: u32,
    pub quad_rows: u32,
    pub control_point_count: u64,
    pub cell_count: u64,
    pub dense_vertex_count: u64,
    /// Fits in `u32` so it can be passed straight to a draw call
    pub triangle_vertex_count: u64,
}

impl TessellationSizes {
    /// True when the dense grid has at least one quad to triangulate
    pub fn has_triangles(&self) -> bool {
        self.triangle_vertex_count > 0
    }

    pub fn triangle_count(&self) -> u64 {
        self.triangle_vertex_count / 3
    }

    /// Uniform block for the tessellation kernels
    pub fn params(&self) -> TessellationParams {
        TessellationParams {
            grid_width: self.grid_width,
            grid_height: self.grid_height,
            subdivision: self.subdivision,
            dense_width: self.dense_width,
            dense_height: self.dense_height,
            quad_columns: self.quad_columns,
            quad_rows: self.quad_rows,
            padding: 0,
        }
    }
}

fn too_large(width: u32, height: u32, what: &str) -> GradientError {
    GradientError::DegenerateGrid {
        width,
        height,
        reason: format!("{} overflows", what),
    }
}

/// Derive all sizes for a `width` x `height` grid tessellated with `subdivision`
pub fn compute_sizes(width: u32, height: u32, subdivision: u32) -> GradientResult<TessellationSizes> {
    validate_grid_shape(width, height)?;

    if subdivision == 0 {
        return Err(GradientError::InvalidConfig {
            field: "subdivision".to_string(),
            value: subdivision.to_string(),
            reason: "at least one sample per patch edge is required".to_string(),
        });
    }

    let cell_columns = width - 1;
    let cell_rows = height - 1;

    let dense_width = cell_columns
        .checked_mul(subdivision)
        .ok_or_else(|| too_large(width, height, "dense grid width"))?;
    let dense_height = cell_rows
        .checked_mul(subdivision)
        .ok_or_else(|| too_large(width, height, "dense grid height"))?;

    let quad_columns = dense_width - 1;
    let quad_rows = dense_height - 1;

    let triangle_vertex_count = (quad_columns as u64)
        .checked_mul(quad_rows as u64)
        .and_then(|quads| quads.checked_mul(VERTICES_PER_QUAD))
        .ok_or_else(|| too_large(width, height, "triangle vertex count"))?;

    if triangle_vertex_count > u32::MAX as u64 {
        return Err(too_large(width, height, "triangle vertex count"));
    }

    Ok(TessellationSizes {
        grid_width: width,
        grid_height: height,
        subdivision,
        cell_columns,
        cell_rows,
        dense_width,
        dense_height,
        quad_columns,
        quad_rows,
        control_point_count: width as u64 * height as u64,
        cell_count: cell_columns as u64 * cell_rows as u64,
        dense_vertex_count: dense_width as u64 * dense_height as u64,
        triangle_vertex_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_by_three_at_four() {
        let sizes = compute_sizes(3, 3, 4).unwrap();
        assert_eq!((sizes.dense_width, sizes.dense_height), (8, 8));
        assert_eq!(sizes.dense_vertex_count, 64);
        assert_eq!(sizes.triangle_vertex_count, 7 * 7 * 6);
        assert_eq!(sizes.triangle_vertex_count, 294);
        assert_eq!(sizes.triangle_count(), 98);
        assert_eq!(sizes.cell_count, 4);
    }

    #[test]
    fn test_counts_follow_formula() {
        for width in 2..7u32 {
            for height in 2..7u32 {
                for subdivision in 1..6u32 {
                    let sizes = compute_sizes(width, height, subdivision).unwrap();
                    let dw = (width - 1) * subdivision;
                    let dh = (height - 1) * subdivision;
                    assert_eq!(sizes.dense_vertex_count, dw as u64 * dh as u64);
                    assert_eq!(
                        sizes.triangle_vertex_count,
                        (dw as u64 - 1) * (dh as u64 - 1) * 6
                    );
                }
            }
        }
    }

    #[test]
    fn test_single_sample_two_by_two_has_no_triangles() {
        let sizes = compute_sizes(2, 2, 1).unwrap();
        assert_eq!(sizes.dense_vertex_count, 1);
        assert!(!sizes.has_triangles());
    }

    #[test]
    fn test_rejects_degenerate_inputs() {
        assert!(matches!(
            compute_sizes(1, 4, 8),
            Err(GradientError::DegenerateGrid { .. })
        ));
        assert!(matches!(
            compute_sizes(4, 1, 8),
            Err(GradientError::DegenerateGrid { .. })
        ));
        assert!(matches!(
            compute_sizes(4, 4, 0),
            Err(GradientError::InvalidConfig { .. })
        ));
        assert!(compute_sizes(u32::MAX, 3, 4).is_err());
        assert!(compute_sizes(70_000, 70_000, 1).is_err());
    }

    #[test]
    fn test_params_mirror_sizes() {
        let sizes = compute_sizes(5, 4, 3).unwrap();
        let params = sizes.params();
        assert_eq!(params.dense_width, 12);
        assert_eq!(params.dense_height, 9);
        assert_eq!(params.quad_columns, 11);
        assert_eq!(params.quad_rows, 8);
    }
}
