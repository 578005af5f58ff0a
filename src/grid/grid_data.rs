//! Grid Data - Pure DOP
//!
//! NO METHODS beyond construction and lookup. Validation and sizing live in
//! grid_operations.rs

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// One lattice sample of the gradient surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub position: Vec3,
    /// Straight (non-premultiplied) RGBA in [0, 1]
    pub color: Vec4,
    /// Perturbation amount consumed by the animator, carried through untouched
    pub turbulence: f32,
}

impl ControlPoint {
    pub fn new(position: Vec3, color: Vec4) -> Self {
        Self {
            position,
            color,
            turbulence: 0.0,
        }
    }
}

impl Default for ControlPoint {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec4::ONE)
    }
}

/// Rectangular row-major lattice with exactly `width * height` elements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid<T> {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) points: Vec<T>,
}

impl<T> Grid<T> {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn points(&self) -> &[T] {
        &self.points
    }

    pub fn get(&self, x: u32, y: u32) -> Option<&T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.points.get((y as usize) * (self.width as usize) + x as usize)
    }

    pub fn get_mut(&mut self, x: u32, y: u32) -> Option<&mut T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.points
            .get_mut((y as usize) * (self.width as usize) + x as usize)
    }

    /// Iterate rows top to bottom
    pub fn rows(&self) -> std::slice::Chunks<'_, T> {
        self.points.chunks(self.width.max(1) as usize)
    }
}

/// Pull-based accessor for the grid the animator currently exposes
///
/// The returned grid must stay valid and unmodified while one frame is
/// encoded; the provider swaps in a new grid between frames.
pub trait GridProvider {
    fn current_grid(&self) -> &Grid<ControlPoint>;
}

impl GridProvider for Grid<ControlPoint> {
    fn current_grid(&self) -> &Grid<ControlPoint> {
        self
    }
}
