//! Grid Operations - Pure DOP Functions
//!
//! Construction, validation and layout helpers for control-point grids.

use super::grid_data::{ControlPoint, Grid};
use crate::constants::tessellation::MIN_GRID_EDGE;
use crate::error::{GradientError, GradientResult};
use glam::{Vec3, Vec4};

/// Build a grid from row-major points, rejecting gaps and overflow
pub fn create_grid<T>(width: u32, height: u32, points: Vec<T>) -> GradientResult<Grid<T>> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| GradientError::DegenerateGrid {
            width,
            height,
            reason: "point count overflows".to_string(),
        })?;

    if points.len() != expected {
        return Err(GradientError::GridShapeMismatch {
            width,
            height,
            expected,
            actual: points.len(),
        });
    }

    Ok(Grid {
        width,
        height,
        points,
    })
}

/// Build a grid by evaluating `f(x, y)` for every lattice cell
pub fn grid_from_fn<T, F>(width: u32, height: u32, mut f: F) -> Grid<T>
where
    F: FnMut(u32, u32) -> T,
{
    let mut points = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            points.push(f(x, y));
        }
    }

    Grid {
        width,
        height,
        points,
    }
}

/// Evenly spaced grid spanning clip space [-1, 1] with every point set to `color`
pub fn uniform_grid(width: u32, height: u32, color: Vec4) -> Grid<ControlPoint> {
    grid_from_fn(width, height, |x, y| {
        ControlPoint::new(lattice_position(x, y, width, height), color)
    })
}

/// Rest position of lattice cell (x, y) in clip space, y pointing up
pub fn lattice_position(x: u32, y: u32, width: u32, height: u32) -> Vec3 {
    let u = if width > 1 {
        x as f32 / (width - 1) as f32
    } else {
        0.0
    };
    let v = if height > 1 {
        y as f32 / (height - 1) as f32
    } else {
        0.0
    };
    Vec3::new(u * 2.0 - 1.0, 1.0 - v * 2.0, 0.0)
}

/// Reject grids that cannot form a single patch
pub fn validate_grid_shape(width: u32, height: u32) -> GradientResult<()> {
    if width < MIN_GRID_EDGE || height < MIN_GRID_EDGE {
        return Err(GradientError::DegenerateGrid {
            width,
            height,
            reason: format!(
                "each edge needs at least {} control points",
                MIN_GRID_EDGE
            ),
        });
    }
    Ok(())
}

/// Full validation of a grid borrowed for one frame
pub fn validate_grid<T>(grid: &Grid<T>) -> GradientResult<()> {
    validate_grid_shape(grid.width, grid.height)?;

    let expected = grid.width as usize * grid.height as usize;
    if grid.points.len() != expected {
        return Err(GradientError::GridShapeMismatch {
            width: grid.width,
            height: grid.height,
            expected,
            actual: grid.points.len(),
        });
    }
    Ok(())
}

/// Number of patches spanned by the grid
pub fn cell_count<T>(grid: &Grid<T>) -> u64 {
    grid.width.saturating_sub(1) as u64 * grid.height.saturating_sub(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_grid_rejects_gaps() {
        let result = create_grid(3, 3, vec![0u32; 8]);
        match result {
            Err(GradientError::GridShapeMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 9);
                assert_eq!(actual, 8);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_grid_is_row_major() {
        let grid = grid_from_fn(3, 2, |x, y| (x, y));
        assert_eq!(grid.points().len(), 6);
        assert_eq!(grid.get(2, 0), Some(&(2, 0)));
        assert_eq!(grid.points()[3], (0, 1));
        assert_eq!(grid.get(3, 0), None);
        assert_eq!(grid.rows().count(), 2);
    }

    #[test]
    fn test_validate_rejects_thin_grids() {
        assert!(validate_grid_shape(1, 5).is_err());
        assert!(validate_grid_shape(5, 1).is_err());
        assert!(validate_grid_shape(2, 2).is_ok());

        let thin = uniform_grid(1, 4, Vec4::ONE);
        assert!(validate_grid(&thin).is_err());
    }

    #[test]
    fn test_lattice_spans_clip_space() {
        assert_eq!(lattice_position(0, 0, 3, 3), Vec3::new(-1.0, 1.0, 0.0));
        assert_eq!(lattice_position(2, 2, 3, 3), Vec3::new(1.0, -1.0, 0.0));
        assert_eq!(lattice_position(1, 1, 3, 3), Vec3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_cell_count() {
        let grid = uniform_grid(4, 3, Vec4::ONE);
        assert_eq!(cell_count(&grid), 6);
    }
}
