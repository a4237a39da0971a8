//! Catmull-Rom mesh subdivision
//!
//! Refines a probed grid into a denser virtual grid with bicubic
//! Catmull-Rom interpolation; corrections are then bilinear over the
//! virtual grid. Original grid points are reproduced exactly. Beyond the
//! mesh edge the missing control points are extrapolated linearly.

use super::mesh::{bilinear, LevelingMesh};
use crate::config::{OffMeshPolicy, MAX_GRID_POINTS, MAX_SUBDIVISIONS};

/// Largest virtual grid side
pub const MAX_VIRTUAL_POINTS: usize = (MAX_GRID_POINTS - 1) * MAX_SUBDIVISIONS + 1;

/// Subdivided copy of a mesh
#[derive(Debug, Clone, PartialEq)]
pub struct SubdividedGrid {
    points: usize,
    origin: [f32; 2],
    spacing: [f32; 2],
    z: [[f32; MAX_VIRTUAL_POINTS]; MAX_VIRTUAL_POINTS],
}

impl SubdividedGrid {
    /// Build the virtual grid; `factor` of 1 copies the mesh
    pub fn new(mesh: &LevelingMesh, factor: usize) -> Self {
        let factor = factor.clamp(1, MAX_SUBDIVISIONS);
        let n = mesh.size();
        let points = (n - 1) * factor + 1;
        let mut z = [[0.0; MAX_VIRTUAL_POINTS]; MAX_VIRTUAL_POINTS];
        for (vx, column) in z.iter_mut().enumerate().take(points) {
            for (vy, out) in column.iter_mut().enumerate().take(points) {
                *out = bicubic(mesh, vx, vy, factor);
            }
        }
        Self {
            points,
            origin: mesh.origin,
            spacing: [
                mesh.spacing[0] / factor as f32,
                mesh.spacing[1] / factor as f32,
            ],
            z,
        }
    }

    /// Virtual points per side
    pub fn points(&self) -> usize {
        self.points
    }

    /// Bilinear height over the virtual grid
    pub fn height(&self, x: f32, y: f32, policy: OffMeshPolicy) -> f32 {
        bilinear(
            |ix, iy| self.z[ix][iy],
            self.points,
            self.origin,
            self.spacing,
            [x, y],
            policy,
        )
    }
}

/// Mesh value with linear extrapolation one point past each edge
fn control(mesh: &LevelingMesh, ix: isize, iy: isize) -> f32 {
    let last = mesh.size() as isize - 1;
    let cx = ix.clamp(0, last);
    let cy = iy.clamp(0, last);
    let base = mesh.value(cx as usize, cy as usize);
    let mut z = base;
    if ix != cx {
        let inner = (cx - (ix - cx).signum()).clamp(0, last);
        z += (base - mesh.value(inner as usize, cy as usize)) * (ix - cx).abs() as f32;
    }
    if iy != cy {
        let inner = (cy - (iy - cy).signum()).clamp(0, last);
        z += (base - mesh.value(cx as usize, inner as usize)) * (iy - cy).abs() as f32;
    }
    z
}

/// Catmull-Rom value between `p1` and `p2` at `t`
fn catmull_rom(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * (2.0 * p1
        + (p2 - p0) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (3.0 * p1 - p0 - 3.0 * p2 + p3) * t3)
}

fn bicubic(mesh: &LevelingMesh, vx: usize, vy: usize, factor: usize) -> f32 {
    let cx = (vx / factor) as isize;
    let cy = (vy / factor) as isize;
    let tx = (vx % factor) as f32 / factor as f32;
    let ty = (vy % factor) as f32 / factor as f32;
    if tx == 0.0 && ty == 0.0 {
        return mesh.value(cx as usize, cy as usize);
    }

    let mut rows = [0.0f32; 4];
    for (k, row) in rows.iter_mut().enumerate() {
        let y = cy + k as isize - 1;
        *row = catmull_rom(
            control(mesh, cx - 1, y),
            control(mesh, cx, y),
            control(mesh, cx + 1, y),
            control(mesh, cx + 2, y),
            tx,
        );
    }
    catmull_rom(rows[0], rows[1], rows[2], rows[3], ty)
}
