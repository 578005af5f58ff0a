//! Host tessellator
//!
//! Evaluates the same coefficient, interpolation and assembly math as the
//! compute kernels, in the same operation order, on the CPU. Used to check
//! device output and as a fallback for tooling that has no adapter.

use super::sizing::{compute_sizes, TessellationSizes};
use crate::error::{GradientError, GradientResult};
use crate::gpu::gpu_types::PatchCoefficients;
use crate::grid::{validate_grid, ControlPoint, Grid};
use crate::renderer::vertex::DenseVertex;
use bytemuck::Zeroable;
use glam::{Vec2, Vec4};
use rayon::prelude::*;

/// Everything one host tessellation produces
#[derive(Debug, Clone)]
pub struct HostMesh {
    pub sizes: TessellationSizes,
    pub coefficients: Vec<PatchCoefficients>,
    pub dense: Vec<DenseVertex>,
    pub triangles: Vec<DenseVertex>,
}

/// Cubic Hermite weights (h00, h01, h10, h11) at `t`
pub fn hermite_basis(t: f32) -> Vec4 {
    let t2 = t * t;
    let t3 = t2 * t;
    Vec4::new(
        2.0 * t3 - 3.0 * t2 + 1.0,
        -2.0 * t3 + 3.0 * t2,
        t3 - 2.0 * t2 + t,
        t3 - t2,
    )
}

/// Parameter of local sample `index` within a cell of `subdivision` samples
pub fn sample_parameter(index: u32, subdivision: u32) -> f32 {
    if subdivision <= 1 {
        return 0.0;
    }
    if index + 1 >= subdivision {
        return 1.0;
    }
    index as f32 / (subdivision - 1) as f32
}

fn control_at(grid: &Grid<ControlPoint>, x: u32, y: u32) -> &ControlPoint {
    &grid.points[y as usize * grid.width as usize + x as usize]
}

/// (position, color) difference quotient between two control points
fn difference(a: &ControlPoint, b: &ControlPoint, span: f32) -> (Vec4, Vec4) {
    (
        ((b.position - a.position) / span).extend(0.0),
        (b.color - a.color) / span,
    )
}

fn tangents_u(grid: &Grid<ControlPoint>, x: u32, y: u32) -> (Vec4, Vec4) {
    let prev = x.max(1) - 1;
    let next = (x + 1).min(grid.width - 1);
    difference(
        control_at(grid, prev, y),
        control_at(grid, next, y),
        (next - prev) as f32,
    )
}

fn tangents_v(grid: &Grid<ControlPoint>, x: u32, y: u32) -> (Vec4, Vec4) {
    let prev = y.max(1) - 1;
    let next = (y + 1).min(grid.height - 1);
    difference(
        control_at(grid, x, prev),
        control_at(grid, x, next),
        (next - prev) as f32,
    )
}

fn cell_coefficients(grid: &Grid<ControlPoint>, cell_x: u32, cell_y: u32) -> PatchCoefficients {
    let mut cell = PatchCoefficients::zeroed();
    for corner in 0..4u32 {
        let x = cell_x + (corner & 1);
        let y = cell_y + (corner >> 1);
        let control = control_at(grid, x, y);
        let (position_du, color_du) = tangents_u(grid, x, y);
        let (position_dv, color_dv) = tangents_v(grid, x, y);

        let slot = corner as usize;
        cell.positions[slot] = control.position.extend(1.0).to_array();
        cell.colors[slot] = control.color.to_array();
        cell.position_du[slot] = position_du.to_array();
        cell.position_dv[slot] = position_dv.to_array();
        cell.color_du[slot] = color_du.to_array();
        cell.color_dv[slot] = color_dv.to_array();
    }
    cell
}

/// Per-cell Hermite inputs, row-major over the (W-1) x (H-1) cells
pub fn derive_coefficients(grid: &Grid<ControlPoint>) -> GradientResult<Vec<PatchCoefficients>> {
    validate_grid(grid)?;
    let columns = grid.width - 1;
    let cells = columns as u64 * (grid.height - 1) as u64;

    Ok((0..cells)
        .into_par_iter()
        .map(|index| {
            let cell_x = (index % columns as u64) as u32;
            let cell_y = (index / columns as u64) as u32;
            cell_coefficients(grid, cell_x, cell_y)
        })
        .collect())
}

fn hermite_row(weights: Vec4, a: Vec4, b: Vec4, da: Vec4, db: Vec4) -> Vec4 {
    weights.x * a + weights.y * b + weights.z * da + weights.w * db
}

fn bicubic(
    hu: Vec4,
    hv: Vec4,
    values: &[[f32; 4]; 4],
    du: &[[f32; 4]; 4],
    dv: &[[f32; 4]; 4],
) -> Vec4 {
    let at = |set: &[[f32; 4]; 4], corner: usize| Vec4::from_array(set[corner]);
    let left = hermite_row(hv, at(values, 0), at(values, 2), at(dv, 0), at(dv, 2));
    let right = hermite_row(hv, at(values, 1), at(values, 3), at(dv, 1), at(dv, 3));
    let left_slope = hermite_row(hv, at(du, 0), at(du, 2), Vec4::ZERO, Vec4::ZERO);
    let right_slope = hermite_row(hv, at(du, 1), at(du, 3), Vec4::ZERO, Vec4::ZERO);
    hu.x * left + hu.y * right + hu.z * left_slope + hu.w * right_slope
}

fn dense_vertex(
    coefficients: &[PatchCoefficients],
    sizes: &TessellationSizes,
    x: u32,
    y: u32,
) -> DenseVertex {
    let subdivision = sizes.subdivision.max(1);
    let cell_index = (y / subdivision) as usize * sizes.cell_columns as usize
        + (x / subdivision) as usize;
    let cell = &coefficients[cell_index];

    let hu = hermite_basis(sample_parameter(x % subdivision, subdivision));
    let hv = hermite_basis(sample_parameter(y % subdivision, subdivision));

    let position = bicubic(hu, hv, &cell.positions, &cell.position_du, &cell.position_dv);
    let color = bicubic(hu, hv, &cell.colors, &cell.color_du, &cell.color_dv);

    let uv_scale = Vec2::new(
        (sizes.dense_width.max(2) - 1) as f32,
        (sizes.dense_height.max(2) - 1) as f32,
    );

    DenseVertex {
        position: position.truncate().extend(1.0).to_array(),
        color: color.clamp(Vec4::ZERO, Vec4::ONE).to_array(),
        uv: (Vec2::new(x as f32, y as f32) / uv_scale).to_array(),
        padding: [0.0; 2],
    }
}

/// Evaluate every dense vertex, row-major over the dense grid
pub fn interpolate_patches(
    coefficients: &[PatchCoefficients],
    sizes: &TessellationSizes,
) -> GradientResult<Vec<DenseVertex>> {
    if coefficients.len() as u64 != sizes.cell_count {
        return Err(GradientError::BufferView {
            requested: sizes.cell_count as usize,
            available: coefficients.len(),
        });
    }

    let mut dense = vec![DenseVertex::zeroed(); sizes.dense_vertex_count as usize];
    dense
        .par_chunks_mut(sizes.dense_width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, vertex) in row.iter_mut().enumerate() {
                *vertex = dense_vertex(coefficients, sizes, x as u32, y as u32);
            }
        });
    Ok(dense)
}

/// Expand the dense grid into a flat triangle list, six vertices per quad
pub fn assemble_triangles(
    dense: &[DenseVertex],
    sizes: &TessellationSizes,
) -> GradientResult<Vec<DenseVertex>> {
    if dense.len() as u64 != sizes.dense_vertex_count {
        return Err(GradientError::BufferView {
            requested: sizes.dense_vertex_count as usize,
            available: dense.len(),
        });
    }

    let width = sizes.dense_width as usize;
    let columns = sizes.quad_columns as usize;
    let mut triangles = vec![DenseVertex::zeroed(); sizes.triangle_vertex_count as usize];

    triangles
        .par_chunks_mut(6)
        .enumerate()
        .for_each(|(quad, out)| {
            let x = quad % columns;
            let y = quad / columns;
            let v00 = dense[y * width + x];
            let v10 = dense[y * width + x + 1];
            let v01 = dense[(y + 1) * width + x];
            let v11 = dense[(y + 1) * width + x + 1];
            out.copy_from_slice(&[v00, v10, v11, v00, v11, v01]);
        });
    Ok(triangles)
}

/// Run the whole chain on the host
pub fn tessellate_on_host(grid: &Grid<ControlPoint>, subdivision: u32) -> GradientResult<HostMesh> {
    validate_grid(grid)?;
    let sizes = compute_sizes(grid.width(), grid.height(), subdivision)?;

    let coefficients = derive_coefficients(grid)?;
    let dense = interpolate_patches(&coefficients, &sizes)?;
    let triangles = assemble_triangles(&dense, &sizes)?;

    log::trace!(
        "[tessellate_on_host] {}x{} grid at {} -> {} triangles",
        grid.width(),
        grid.height(),
        subdivision,
        sizes.triangle_count()
    );

    Ok(HostMesh {
        sizes,
        coefficients,
        dense,
        triangles,
    })
}
