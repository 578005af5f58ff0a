//! Control-point grids
//!
//! The animator owns and mutates grids between frames; the pipeline only
//! borrows one per frame.

pub mod grid_data;
pub mod grid_operations;

pub use grid_data::{ControlPoint, Grid, GridProvider};
pub use grid_operations::{
    cell_count, create_grid, grid_from_fn, lattice_position, uniform_grid, validate_grid,
    validate_grid_shape,
};
