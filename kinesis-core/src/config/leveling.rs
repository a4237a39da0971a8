//! Bed-leveling configuration types

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest supported grid side
pub const MAX_GRID_POINTS: usize = 10;

/// Largest supported Catmull-Rom subdivision factor
pub const MAX_SUBDIVISIONS: usize = 5;

/// Height-correction strategy
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LevelingStrategy {
    /// No correction
    #[default]
    Disabled,
    /// Plane through three probed points
    ThreePoint,
    /// Least-squares plane over the probe grid
    LinearPlane,
    /// Bilinear interpolation over the probe grid
    Bilinear,
    /// Grid combining probed and manually edited points
    Unified,
}

/// What a grid strategy does outside the probed area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OffMeshPolicy {
    /// Use the nearest edge value
    #[default]
    Clamp,
    /// Continue the edge cell's slope
    Extrapolate,
}

/// Bed-leveling configuration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LevelingConfig {
    /// Active strategy
    pub strategy: LevelingStrategy,
    /// Probe points per grid side
    pub grid_points: u8,
    /// Margin between bed edge and the outer grid lines (mm)
    pub mesh_inset: f32,
    /// Catmull-Rom subdivisions per cell for bilinear grids (1 = none)
    pub subdivisions: u8,
    /// Off-mesh behaviour
    pub off_mesh: OffMeshPolicy,
    /// Full correction below this height (mm)
    pub fade_start: f32,
    /// Zero correction at and above this height (mm), `None` disables fading
    pub fade_height: Option<f32>,
    /// Probe points for the three-point plane (mm)
    pub three_point: [[f32; 2]; 3],
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self {
            strategy: LevelingStrategy::Disabled,
            grid_points: 3,
            mesh_inset: 10.0,
            subdivisions: 3,
            off_mesh: OffMeshPolicy::Clamp,
            fade_start: 0.0,
            fade_height: Some(10.0),
            three_point: [[15.0, 180.0], [15.0, 20.0], [170.0, 20.0]],
        }
    }
}

impl LevelingConfig {
    /// Unified-mesh preset with the larger grid
    pub fn unified() -> Self {
        Self {
            strategy: LevelingStrategy::Unified,
            grid_points: 10,
            mesh_inset: 1.0,
            subdivisions: 1,
            ..Self::default()
        }
    }

    /// Whether the strategy samples a grid
    pub fn uses_grid(&self) -> bool {
        matches!(
            self.strategy,
            LevelingStrategy::LinearPlane | LevelingStrategy::Bilinear | LevelingStrategy::Unified
        )
    }
}
