//! Leveling mesh
//!
//! Square grid of Z corrections over the bed. Each point remembers where
//! its value came from so a re-probe never overwrites a manual edit and an
//! incomplete mesh is never used for correction.

use libm::floorf;

use super::LevelingError;
use crate::config::{OffMeshPolicy, MAX_GRID_POINTS};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Origin of a mesh point value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PointSource {
    /// No value yet
    #[default]
    Unset,
    /// Measured by the probe
    Probed,
    /// Entered by hand
    Edited,
}

/// Sampled Z correction grid
///
/// Values are indexed `[ix][iy]`. Unused rows/columns beyond `grid_points`
/// stay at zero.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LevelingMesh {
    /// Points per side
    pub grid_points: u8,
    /// Margin between the bed edge and the outer grid lines (mm)
    pub inset: f32,
    /// Fade height the mesh was created with (mm)
    pub fade_height: Option<f32>,
    /// Position of point `[0][0]` (mm)
    pub origin: [f32; 2],
    /// Distance between neighbouring points (mm)
    pub spacing: [f32; 2],
    z: [[f32; MAX_GRID_POINTS]; MAX_GRID_POINTS],
    source: [[PointSource; MAX_GRID_POINTS]; MAX_GRID_POINTS],
}

impl LevelingMesh {
    /// Empty mesh covering the bed rectangle `min..max` minus `inset`
    pub fn new(
        grid_points: u8,
        bed_min: [f32; 2],
        bed_max: [f32; 2],
        inset: f32,
        fade_height: Option<f32>,
    ) -> Result<Self, LevelingError> {
        let n = grid_points as usize;
        if !(2..=MAX_GRID_POINTS).contains(&n) {
            return Err(LevelingError::GridMismatch);
        }
        let mut spacing = [0.0; 2];
        let mut origin = [0.0; 2];
        for i in 0..2 {
            origin[i] = bed_min[i] + inset;
            spacing[i] = (bed_max[i] - bed_min[i] - 2.0 * inset) / (n - 1) as f32;
            if !(spacing[i] > 0.0) {
                return Err(LevelingError::GridMismatch);
            }
        }
        Ok(Self {
            grid_points,
            inset,
            fade_height,
            origin,
            spacing,
            z: [[0.0; MAX_GRID_POINTS]; MAX_GRID_POINTS],
            source: [[PointSource::Unset; MAX_GRID_POINTS]; MAX_GRID_POINTS],
        })
    }

    /// Points per side
    pub fn size(&self) -> usize {
        self.grid_points as usize
    }

    /// Bed coordinates of point `(ix, iy)`
    pub fn point_xy(&self, ix: usize, iy: usize) -> [f32; 2] {
        [
            self.origin[0] + ix as f32 * self.spacing[0],
            self.origin[1] + iy as f32 * self.spacing[1],
        ]
    }

    fn check(&self, ix: usize, iy: usize) -> Result<(), LevelingError> {
        if ix >= self.size() || iy >= self.size() {
            return Err(LevelingError::OutOfGrid);
        }
        Ok(())
    }

    /// Value at a point, `None` while unset
    pub fn get(&self, ix: usize, iy: usize) -> Option<f32> {
        if ix >= self.size() || iy >= self.size() || self.source[ix][iy] == PointSource::Unset {
            return None;
        }
        Some(self.z[ix][iy])
    }

    /// Raw value at a point (zero while unset)
    pub(crate) fn value(&self, ix: usize, iy: usize) -> f32 {
        self.z[ix][iy]
    }

    /// Provenance of a point
    pub fn source(&self, ix: usize, iy: usize) -> PointSource {
        if ix >= self.size() || iy >= self.size() {
            return PointSource::Unset;
        }
        self.source[ix][iy]
    }

    /// Store a probe measurement
    ///
    /// Manually edited points keep their value; returns whether the
    /// measurement was stored.
    pub fn set_probed(&mut self, ix: usize, iy: usize, z: f32) -> Result<bool, LevelingError> {
        self.check(ix, iy)?;
        if self.source[ix][iy] == PointSource::Edited {
            return Ok(false);
        }
        self.z[ix][iy] = z;
        self.source[ix][iy] = PointSource::Probed;
        Ok(true)
    }

    /// Store a manual value
    pub fn edit(&mut self, ix: usize, iy: usize, z: f32) -> Result<(), LevelingError> {
        self.check(ix, iy)?;
        self.z[ix][iy] = z;
        self.source[ix][iy] = PointSource::Edited;
        Ok(())
    }

    /// Forget a point's value
    pub fn invalidate(&mut self, ix: usize, iy: usize) -> Result<(), LevelingError> {
        self.check(ix, iy)?;
        self.z[ix][iy] = 0.0;
        self.source[ix][iy] = PointSource::Unset;
        Ok(())
    }

    /// Number of points without a value
    pub fn unset_count(&self) -> usize {
        let n = self.size();
        (0..n)
            .flat_map(|ix| (0..n).map(move |iy| (ix, iy)))
            .filter(|&(ix, iy)| self.source[ix][iy] == PointSource::Unset)
            .count()
    }

    /// Whether every point has a value
    pub fn is_complete(&self) -> bool {
        self.unset_count() == 0
    }

    /// Whether two meshes cover the same grid
    pub fn same_grid(&self, other: &LevelingMesh) -> bool {
        self.grid_points == other.grid_points
            && self.origin == other.origin
            && self.spacing == other.spacing
    }

    /// Fill unset points from their nearest valid neighbours
    ///
    /// An unset point next to two valid points in a row or column continues
    /// their slope; next to a single valid point it copies it. Where several
    /// directions offer a value the highest one wins, keeping the nozzle
    /// clear of the bed. Returns the number of points filled.
    pub fn smart_fill(&mut self) -> Result<usize, LevelingError> {
        let n = self.size() as isize;
        let mut filled = 0;
        loop {
            let mut progress = false;
            for ix in 0..n {
                for iy in 0..n {
                    if self.source[ix as usize][iy as usize] != PointSource::Unset {
                        continue;
                    }
                    let mut best: Option<f32> = None;
                    for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                        let Some(v1) = self.known(ix + dx, iy + dy) else {
                            continue;
                        };
                        let candidate = match self.known(ix + 2 * dx, iy + 2 * dy) {
                            Some(v2) => v1 + (v1 - v2),
                            None => v1,
                        };
                        best = Some(best.map_or(candidate, |b| b.max(candidate)));
                    }
                    if let Some(z) = best {
                        self.z[ix as usize][iy as usize] = z;
                        self.source[ix as usize][iy as usize] = PointSource::Edited;
                        filled += 1;
                        progress = true;
                    }
                }
            }
            if !progress {
                break;
            }
        }
        if self.is_complete() {
            Ok(filled)
        } else {
            Err(LevelingError::IncompleteMesh)
        }
    }

    fn known(&self, ix: isize, iy: isize) -> Option<f32> {
        if ix < 0 || iy < 0 {
            return None;
        }
        self.get(ix as usize, iy as usize)
    }

    /// Bilinear height at bed position `(x, y)`
    pub fn height(&self, x: f32, y: f32, policy: OffMeshPolicy) -> f32 {
        bilinear(
            |ix, iy| self.z[ix][iy],
            self.size(),
            self.origin,
            self.spacing,
            [x, y],
            policy,
        )
    }
}

/// Bilinear interpolation over an `n`×`n` grid
pub(crate) fn bilinear(
    value: impl Fn(usize, usize) -> f32,
    n: usize,
    origin: [f32; 2],
    spacing: [f32; 2],
    at: [f32; 2],
    policy: OffMeshPolicy,
) -> f32 {
    let mut cell = [0usize; 2];
    let mut t = [0.0f32; 2];
    for i in 0..2 {
        let f = (at[i] - origin[i]) / spacing[i];
        let c = floorf(f).clamp(0.0, (n - 2) as f32);
        cell[i] = c as usize;
        t[i] = f - c;
        if policy == OffMeshPolicy::Clamp {
            t[i] = t[i].clamp(0.0, 1.0);
        }
    }
    let [ix, iy] = cell;
    let z0 = lerp(value(ix, iy), value(ix + 1, iy), t[0]);
    let z1 = lerp(value(ix, iy + 1), value(ix + 1, iy + 1), t[0]);
    lerp(z0, z1, t[1])
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
