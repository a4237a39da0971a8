//! Bed-leveling compensation
//!
//! Adjusts the Z of every planned position by the height of the measured
//! bed surface under it. The surface model is chosen by configuration:
//! a plane (three points or a least-squares fit of the grid), a bilinear
//! grid with optional Catmull-Rom subdivision, or a unified mesh mixing
//! probed and hand-edited points. The correction fades out linearly
//! between the fade start and the fade height.
//!
//! A failed probing pass leaves the active surface untouched.

pub mod mesh;
pub mod plane;
pub mod subdivide;

pub use mesh::{LevelingMesh, PointSource};
pub use plane::Plane;
pub use subdivide::{SubdividedGrid, MAX_VIRTUAL_POINTS};

use crate::config::{LevelingConfig, LevelingStrategy, TravelConfig};
use crate::motion::AxisPosition;
use crate::traits::{ProbeError, ZProbe};

/// Leveling errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LevelingError {
    /// No surface has been measured or installed
    NoMesh,
    /// Mesh still has unset points
    IncompleteMesh,
    /// Mesh dimensions do not match the configuration
    GridMismatch,
    /// Point index outside the grid
    OutOfGrid,
    /// Operation not available for the active strategy
    Unsupported,
    /// Probe points do not define a plane
    Degenerate,
    /// Fade height not above the fade start
    FadeHeight,
    /// Motion must be idle first
    Busy,
    /// Probe failed; the previous surface is kept
    Probe(ProbeError),
}

impl From<ProbeError> for LevelingError {
    fn from(err: ProbeError) -> Self {
        LevelingError::Probe(err)
    }
}

/// Z correction stage between the command layer and the planner
#[derive(Debug, Clone)]
pub struct Compensator {
    config: LevelingConfig,
    bed_min: [f32; 2],
    bed_max: [f32; 2],
    enabled: bool,
    fade_height: Option<f32>,
    plane: Option<Plane>,
    mesh: Option<LevelingMesh>,
    grid: Option<SubdividedGrid>,
}

impl Compensator {
    /// Create a disabled compensator with no surface
    pub fn new(config: &LevelingConfig, travel: &TravelConfig) -> Self {
        Self {
            config: *config,
            bed_min: [travel.min_pos[0], travel.min_pos[1]],
            bed_max: [travel.max_pos[0], travel.max_pos[1]],
            enabled: false,
            fade_height: config.fade_height,
            plane: None,
            mesh: None,
            grid: None,
        }
    }

    /// Active strategy
    pub fn strategy(&self) -> LevelingStrategy {
        self.config.strategy
    }

    /// Whether correction is switched on
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether moves need segmenting to follow the surface
    pub fn is_nonplanar(&self) -> bool {
        self.enabled
            && matches!(
                self.config.strategy,
                LevelingStrategy::Bilinear | LevelingStrategy::Unified
            )
    }

    /// Current mesh, if one was probed or installed
    pub fn mesh(&self) -> Option<&LevelingMesh> {
        self.mesh.as_ref()
    }

    /// Current plane for planar strategies
    pub fn plane(&self) -> Option<&Plane> {
        self.plane.as_ref()
    }

    /// Fade height in use
    pub fn fade_height(&self) -> Option<f32> {
        self.fade_height
    }

    /// Switch correction on or off
    ///
    /// Turning it on needs a usable surface.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<(), LevelingError> {
        if enabled {
            self.surface_ready()?;
        }
        self.enabled = enabled;
        Ok(())
    }

    /// Change the fade height; `None` applies full correction at every Z
    pub fn set_fade_height(&mut self, height: Option<f32>) -> Result<(), LevelingError> {
        if let Some(h) = height {
            if !(h > self.config.fade_start) {
                return Err(LevelingError::FadeHeight);
            }
        }
        self.fade_height = height;
        Ok(())
    }

    /// Correction scale at height `z`, 1 below the fade start, 0 at the fade height
    pub fn fade_factor(&self, z: f32) -> f32 {
        let Some(height) = self.fade_height else {
            return 1.0;
        };
        let start = self.config.fade_start;
        if z <= start {
            1.0
        } else if z >= height {
            0.0
        } else {
            (height - z) / (height - start)
        }
    }

    /// Surface height at `(x, y)`, `None` when no usable surface exists
    pub fn surface_height(&self, x: f32, y: f32) -> Option<f32> {
        match self.config.strategy {
            LevelingStrategy::Disabled => None,
            LevelingStrategy::ThreePoint | LevelingStrategy::LinearPlane => {
                self.plane.map(|p| p.height(x, y))
            }
            LevelingStrategy::Bilinear | LevelingStrategy::Unified => {
                if let Some(grid) = &self.grid {
                    return Some(grid.height(x, y, self.config.off_mesh));
                }
                self.mesh
                    .as_ref()
                    .filter(|m| m.is_complete())
                    .map(|m| m.height(x, y, self.config.off_mesh))
            }
        }
    }

    /// Apply the correction to a logical position
    pub fn correct(&self, position: &AxisPosition) -> AxisPosition {
        let mut out = *position;
        if !self.enabled {
            return out;
        }
        let [x, y, z, _] = position.0;
        let factor = self.fade_factor(z);
        if factor == 0.0 {
            return out;
        }
        if let Some(h) = self.surface_height(x, y) {
            out.0[2] = z + factor * h;
        }
        out
    }

    /// Remove the correction from a corrected position
    ///
    /// Inverse of `correct`, used to report logical positions from the
    /// step counters.
    pub fn uncorrect(&self, position: &AxisPosition) -> AxisPosition {
        let mut out = *position;
        if !self.enabled {
            return out;
        }
        let [x, y, zc, _] = position.0;
        let Some(h) = self.surface_height(x, y) else {
            return out;
        };
        let start = self.config.fade_start;

        // Full correction region
        let z = zc - h;
        let height = match self.fade_height {
            Some(height) if z > start => height,
            _ => {
                out.0[2] = z;
                return out;
            }
        };
        // Fade band: zc = z + h·(H - z)/(H - s)
        let span = height - start;
        let denominator = span - h;
        if denominator.abs() > f32::EPSILON {
            let z = (zc * span - h * height) / denominator;
            if z > start && z < height {
                out.0[2] = z;
                return out;
            }
        }
        out.0[2] = zc;
        out
    }

    /// Measure the bed and install the result
    ///
    /// On any probe failure the previous surface stays active.
    pub fn probe<P: ZProbe>(&mut self, probe: &mut P) -> Result<(), LevelingError> {
        match self.config.strategy {
            LevelingStrategy::Disabled => Err(LevelingError::Unsupported),
            LevelingStrategy::ThreePoint => {
                let mut points = [[0.0f32; 3]; 3];
                for (p, &[x, y]) in points.iter_mut().zip(self.config.three_point.iter()) {
                    *p = [x, y, measure(probe, x, y)?];
                }
                self.plane = Some(Plane::through(&points)?);
                Ok(())
            }
            LevelingStrategy::LinearPlane | LevelingStrategy::Bilinear => {
                let mut mesh = self.blank_mesh()?;
                probe_grid(&mut mesh, probe)?;
                self.install_mesh(mesh)
            }
            LevelingStrategy::Unified => {
                let mut mesh = match &self.mesh {
                    Some(m) if m.grid_points == self.config.grid_points => m.clone(),
                    _ => self.blank_mesh()?,
                };
                probe_grid(&mut mesh, probe)?;
                self.install_mesh(mesh)
            }
        }
    }

    /// Install a mesh from the persistence layer or a probing pass
    ///
    /// The unified strategy accepts an incomplete mesh for editing but
    /// will not correct with it.
    pub fn install_mesh(&mut self, mesh: LevelingMesh) -> Result<(), LevelingError> {
        if !self.config.uses_grid() {
            return Err(LevelingError::Unsupported);
        }
        if mesh.grid_points != self.config.grid_points {
            return Err(LevelingError::GridMismatch);
        }
        if self.config.strategy != LevelingStrategy::Unified && !mesh.is_complete() {
            return Err(LevelingError::IncompleteMesh);
        }
        if self.config.strategy == LevelingStrategy::LinearPlane {
            fit_mesh(&mesh)?;
        }
        self.mesh = Some(mesh);
        self.rebuild();
        Ok(())
    }

    /// Set one mesh point by hand
    pub fn edit_point(&mut self, ix: usize, iy: usize, z: f32) -> Result<(), LevelingError> {
        if !self.config.uses_grid() {
            return Err(LevelingError::Unsupported);
        }
        if self.mesh.is_none() {
            self.mesh = Some(self.blank_mesh()?);
        }
        let mesh = self.mesh.as_mut().ok_or(LevelingError::NoMesh)?;
        mesh.edit(ix, iy, z)?;
        self.rebuild();
        Ok(())
    }

    /// Fill unset mesh points from their neighbours; returns the count filled
    pub fn smart_fill(&mut self) -> Result<usize, LevelingError> {
        let mesh = self.mesh.as_mut().ok_or(LevelingError::NoMesh)?;
        let filled = mesh.smart_fill()?;
        self.rebuild();
        Ok(filled)
    }

    fn blank_mesh(&self) -> Result<LevelingMesh, LevelingError> {
        blank_mesh(&self.config, self.bed_min, self.bed_max, self.fade_height)
    }

    /// Refresh derived surfaces after the mesh changed
    fn rebuild(&mut self) {
        self.grid = None;
        let Some(mesh) = &self.mesh else {
            return;
        };
        if mesh.is_complete() {
            match self.config.strategy {
                LevelingStrategy::Bilinear if self.config.subdivisions > 1 => {
                    self.grid = Some(SubdividedGrid::new(mesh, self.config.subdivisions as usize));
                }
                LevelingStrategy::LinearPlane => self.plane = fit_mesh(mesh).ok(),
                _ => {}
            }
        }
        if self.enabled && self.surface_ready().is_err() {
            self.enabled = false;
        }
    }

    fn surface_ready(&self) -> Result<(), LevelingError> {
        match self.config.strategy {
            LevelingStrategy::Disabled => Err(LevelingError::Unsupported),
            LevelingStrategy::ThreePoint | LevelingStrategy::LinearPlane => {
                self.plane.map(|_| ()).ok_or(LevelingError::NoMesh)
            }
            LevelingStrategy::Bilinear | LevelingStrategy::Unified => match &self.mesh {
                None => Err(LevelingError::NoMesh),
                Some(m) if !m.is_complete() => Err(LevelingError::IncompleteMesh),
                Some(_) => Ok(()),
            },
        }
    }
}

fn blank_mesh(
    config: &LevelingConfig,
    bed_min: [f32; 2],
    bed_max: [f32; 2],
    fade_height: Option<f32>,
) -> Result<LevelingMesh, LevelingError> {
    LevelingMesh::new(config.grid_points, bed_min, bed_max, config.mesh_inset, fade_height)
}

fn measure<P: ZProbe>(probe: &mut P, x: f32, y: f32) -> Result<f32, LevelingError> {
    probe.measure(x, y).map_err(|err| {
        #[cfg(feature = "defmt")]
        defmt::warn!("probe failed at ({}, {}): {}", x, y, err);
        LevelingError::Probe(err)
    })
}

/// Probe every non-edited point, serpentine order
fn probe_grid<P: ZProbe>(mesh: &mut LevelingMesh, probe: &mut P) -> Result<(), LevelingError> {
    let n = mesh.size();
    for iy in 0..n {
        for k in 0..n {
            let ix = if iy % 2 == 0 { k } else { n - 1 - k };
            if mesh.source(ix, iy) == PointSource::Edited {
                continue;
            }
            let [x, y] = mesh.point_xy(ix, iy);
            let z = measure(probe, x, y)?;
            mesh.set_probed(ix, iy, z)?;
        }
    }
    Ok(())
}

fn fit_mesh(mesh: &LevelingMesh) -> Result<Plane, LevelingError> {
    let n = mesh.size();
    Plane::fit((0..n).flat_map(|ix| (0..n).map(move |iy| (ix, iy))).filter_map(|(ix, iy)| {
        let [x, y] = mesh.point_xy(ix, iy);
        mesh.get(ix, iy).map(|z| [x, y, z])
    }))
}
