//! Kinematic transforms between logical and actuator coordinates
//!
//! The topology is picked once from configuration. Every transform is a
//! pure function of the position and the fixed geometry, so it can be used
//! from the planner and from status reporting alike. The extruder axis
//! always passes through unchanged.

use libm::{atan2f, cosf, sinf, sqrtf};

use super::position::{ActuatorPosition, AxisPosition};
use crate::config::{DeltaGeometry, KinematicsConfig, ScaraGeometry};

/// Kinematic transform errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KinematicsError {
    /// Target lies outside the physically valid envelope
    Unreachable,
}

/// Delta tower base angles (degrees) for towers A, B, C
const DELTA_TOWER_ANGLES: [f32; 3] = [210.0, 330.0, 90.0];

/// Precomputed delta geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Delta {
    rod_sq: f32,
    printable_radius_sq: f32,
    towers: [[f32; 2]; 3],
}

impl Delta {
    /// Build tower positions from configuration
    pub fn new(geometry: &DeltaGeometry) -> Self {
        let mut towers = [[0.0; 2]; 3];
        for (i, tower) in towers.iter_mut().enumerate() {
            let angle = (DELTA_TOWER_ANGLES[i] + geometry.tower_angle_trim[i]).to_radians();
            *tower = [cosf(angle) * geometry.radius, sinf(angle) * geometry.radius];
        }
        Self {
            rod_sq: geometry.diagonal_rod * geometry.diagonal_rod,
            printable_radius_sq: geometry.printable_radius * geometry.printable_radius,
            towers,
        }
    }

    fn inverse(&self, p: &AxisPosition) -> Result<ActuatorPosition, KinematicsError> {
        let [x, y, z, e] = p.0;
        if x * x + y * y > self.printable_radius_sq {
            return Err(KinematicsError::Unreachable);
        }
        let mut out = [0.0, 0.0, 0.0, e];
        for (carriage, tower) in out.iter_mut().zip(self.towers.iter()) {
            let dx = tower[0] - x;
            let dy = tower[1] - y;
            let h_sq = self.rod_sq - dx * dx - dy * dy;
            if h_sq < 0.0 {
                return Err(KinematicsError::Unreachable);
            }
            *carriage = z + sqrtf(h_sq);
        }
        Ok(ActuatorPosition(out))
    }

    /// Trilateration of the three rod spheres
    fn forward(&self, a: &ActuatorPosition) -> Result<AxisPosition, KinematicsError> {
        let [z1, z2, z3, e] = a.0;
        let [ta, tb, tc] = self.towers;

        let p12 = [tb[0] - ta[0], tb[1] - ta[1], z2 - z1];
        let d = norm(&p12);
        if d == 0.0 {
            return Err(KinematicsError::Unreachable);
        }
        let ex = scale(&p12, 1.0 / d);

        let p13 = [tc[0] - ta[0], tc[1] - ta[1], z3 - z1];
        let i = dot(&ex, &p13);
        let ey_raw = [p13[0] - ex[0] * i, p13[1] - ex[1] * i, p13[2] - ex[2] * i];
        let j = norm(&ey_raw);
        if j == 0.0 {
            return Err(KinematicsError::Unreachable);
        }
        let ey = scale(&ey_raw, 1.0 / j);
        let ez = [
            ex[1] * ey[2] - ex[2] * ey[1],
            ex[2] * ey[0] - ex[0] * ey[2],
            ex[0] * ey[1] - ex[1] * ey[0],
        ];

        // All rods have the same length, so the sphere radii cancel
        let x_new = d / 2.0;
        let y_new = ((i * i + j * j) / 2.0 - i * x_new) / j;
        let h_sq = self.rod_sq - x_new * x_new - y_new * y_new;
        if h_sq < 0.0 {
            return Err(KinematicsError::Unreachable);
        }
        // Effector hangs below the carriages
        let h = if ez[2] >= 0.0 { -sqrtf(h_sq) } else { sqrtf(h_sq) };

        Ok(AxisPosition([
            ta[0] + ex[0] * x_new + ey[0] * y_new + ez[0] * h,
            ta[1] + ex[1] * x_new + ey[1] * y_new + ez[1] * h,
            z1 + ex[2] * x_new + ey[2] * y_new + ez[2] * h,
            e,
        ]))
    }
}

/// Two-joint SCARA arm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scara {
    l1: f32,
    l2: f32,
    offset: [f32; 2],
}

impl Scara {
    /// Build from configuration
    pub fn new(geometry: &ScaraGeometry) -> Self {
        Self {
            l1: geometry.linkage_1,
            l2: geometry.linkage_2,
            offset: geometry.offset,
        }
    }

    /// Shoulder angle and absolute outer arm angle, in degrees
    fn inverse(&self, p: &AxisPosition) -> Result<ActuatorPosition, KinematicsError> {
        let [x, y, z, e] = p.0;
        let sx = x - self.offset[0];
        let sy = y - self.offset[1];

        let c2 = (sx * sx + sy * sy - self.l1 * self.l1 - self.l2 * self.l2)
            / (2.0 * self.l1 * self.l2);
        if !(-1.0..=1.0).contains(&c2) {
            return Err(KinematicsError::Unreachable);
        }
        let s2 = sqrtf(1.0 - c2 * c2);

        let theta = atan2f(sy, sx) - atan2f(self.l2 * s2, self.l1 + self.l2 * c2);
        let psi = theta + atan2f(s2, c2);

        Ok(ActuatorPosition([theta.to_degrees(), psi.to_degrees(), z, e]))
    }

    fn forward(&self, a: &ActuatorPosition) -> AxisPosition {
        let [theta, psi, z, e] = a.0;
        let (theta, psi) = (theta.to_radians(), psi.to_radians());
        AxisPosition([
            self.l1 * cosf(theta) + self.l2 * cosf(psi) + self.offset[0],
            self.l1 * sinf(theta) + self.l2 * sinf(psi) + self.offset[1],
            z,
            e,
        ])
    }
}

/// Machine topology with its precomputed geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kinematics {
    Cartesian,
    /// A = X + Y, B = X - Y
    CoreXY,
    /// A = X + Z, C = X - Z
    CoreXZ,
    /// B = Y + Z, C = Y - Z
    CoreYZ,
    Delta(Delta),
    Scara(Scara),
}

impl Kinematics {
    /// Select the transform for a configuration
    pub fn from_config(config: &KinematicsConfig) -> Self {
        match config {
            KinematicsConfig::Cartesian => Kinematics::Cartesian,
            KinematicsConfig::CoreXY => Kinematics::CoreXY,
            KinematicsConfig::CoreXZ => Kinematics::CoreXZ,
            KinematicsConfig::CoreYZ => Kinematics::CoreYZ,
            KinematicsConfig::Delta(g) => Kinematics::Delta(Delta::new(g)),
            KinematicsConfig::Scara(g) => Kinematics::Scara(Scara::new(g)),
        }
    }

    /// Whether straight logical lines stay straight in actuator space
    ///
    /// Non-linear topologies need moves split into short segments.
    pub fn is_linear(&self) -> bool {
        !matches!(self, Kinematics::Delta(_) | Kinematics::Scara(_))
    }

    /// Logical position to actuator position
    pub fn to_actuator(&self, p: &AxisPosition) -> Result<ActuatorPosition, KinematicsError> {
        let [x, y, z, e] = p.0;
        match self {
            Kinematics::Cartesian => Ok(ActuatorPosition(p.0)),
            Kinematics::CoreXY => Ok(ActuatorPosition([x + y, x - y, z, e])),
            Kinematics::CoreXZ => Ok(ActuatorPosition([x + z, y, x - z, e])),
            Kinematics::CoreYZ => Ok(ActuatorPosition([x, y + z, y - z, e])),
            Kinematics::Delta(d) => d.inverse(p),
            Kinematics::Scara(s) => s.inverse(p),
        }
    }

    /// Actuator position to logical position
    pub fn to_logical(&self, a: &ActuatorPosition) -> Result<AxisPosition, KinematicsError> {
        let [p, q, r, e] = a.0;
        match self {
            Kinematics::Cartesian => Ok(AxisPosition(a.0)),
            Kinematics::CoreXY => Ok(AxisPosition([(p + q) / 2.0, (p - q) / 2.0, r, e])),
            Kinematics::CoreXZ => Ok(AxisPosition([(p + r) / 2.0, q, (p - r) / 2.0, e])),
            Kinematics::CoreYZ => Ok(AxisPosition([p, (q + r) / 2.0, (q - r) / 2.0, e])),
            Kinematics::Delta(d) => d.forward(a),
            Kinematics::Scara(s) => Ok(s.forward(a)),
        }
    }
}

fn dot(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn norm(v: &[f32; 3]) -> f32 {
    sqrtf(dot(v, v))
}

fn scale(v: &[f32; 3], k: f32) -> [f32; 3] {
    [v[0] * k, v[1] * k, v[2] * k]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn delta() -> Kinematics {
        Kinematics::Delta(Delta::new(&DeltaGeometry {
            diagonal_rod: 250.0,
            radius: 124.0,
            tower_angle_trim: [0.0; 3],
            printable_radius: 90.0,
        }))
    }

    fn scara() -> Kinematics {
        Kinematics::Scara(Scara::new(&ScaraGeometry {
            linkage_1: 150.0,
            linkage_2: 150.0,
            offset: [100.0, -56.0],
            home_angles: [0.0, 90.0],
        }))
    }

    #[test]
    fn test_cartesian_identity() {
        let k = Kinematics::Cartesian;
        let p = AxisPosition::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(k.to_actuator(&p).unwrap().0, p.0);
        assert!(k.is_linear());
    }

    #[test]
    fn test_corexy_mixing() {
        let k = Kinematics::CoreXY;
        let a = k.to_actuator(&AxisPosition::new(10.0, 0.0, 0.0, 0.0)).unwrap();
        assert_eq!(a.0, [10.0, 10.0, 0.0, 0.0]);

        let a = k.to_actuator(&AxisPosition::new(0.0, 10.0, 0.0, 0.0)).unwrap();
        assert_eq!(a.0, [10.0, -10.0, 0.0, 0.0]);
    }

    #[test]
    fn test_delta_center_carriages_level() {
        let k = delta();
        let a = k.to_actuator(&AxisPosition::new(0.0, 0.0, 0.0, 0.0)).unwrap();
        let expected = sqrtf(250.0 * 250.0 - 124.0 * 124.0);
        for tower in 0..3 {
            assert!((a.0[tower] - expected).abs() < 1e-3);
        }
        assert!(!k.is_linear());
    }

    #[test]
    fn test_delta_outside_printable_radius() {
        let k = delta();
        let p = AxisPosition::new(80.0, 80.0, 0.0, 0.0);
        assert_eq!(k.to_actuator(&p), Err(KinematicsError::Unreachable));
    }

    #[test]
    fn test_scara_out_of_reach() {
        let k = scara();
        // 400 mm from the shoulder, arms total 300 mm
        let p = AxisPosition::new(500.0, -56.0, 0.0, 0.0);
        assert_eq!(k.to_actuator(&p), Err(KinematicsError::Unreachable));
    }

    #[test]
    fn test_scara_straight_arm() {
        let k = scara();
        let p = AxisPosition::new(100.0 + 300.0, -56.0, 5.0, 1.0);
        let a = k.to_actuator(&p).unwrap();
        assert!(a.0[0].abs() < 0.1);
        assert!(a.0[1].abs() < 0.1);
        assert_eq!(a.0[2], 5.0);
        assert_eq!(a.0[3], 1.0);
    }

    proptest! {
        #[test]
        fn prop_core_round_trip(x in -200.0f32..200.0, y in -200.0f32..200.0, z in 0.0f32..200.0) {
            for k in [Kinematics::CoreXY, Kinematics::CoreXZ, Kinematics::CoreYZ] {
                let p = AxisPosition::new(x, y, z, 0.0);
                let back = k.to_logical(&k.to_actuator(&p).unwrap()).unwrap();
                prop_assert!(back.approx_eq(&p, 1e-3));
            }
        }

        #[test]
        fn prop_delta_round_trip(r in 0.0f32..85.0, angle in 0.0f32..6.28, z in 0.0f32..200.0) {
            let k = delta();
            let p = AxisPosition::new(r * cosf(angle), r * sinf(angle), z, 0.0);
            let back = k.to_logical(&k.to_actuator(&p).unwrap()).unwrap();
            prop_assert!(back.approx_eq(&p, 1e-2));
        }

        #[test]
        fn prop_scara_round_trip(r in 40.0f32..290.0, angle in 0.0f32..6.28, z in 0.0f32..100.0) {
            let k = scara();
            let p = AxisPosition::new(100.0 + r * cosf(angle), -56.0 + r * sinf(angle), z, 2.0);
            let back = k.to_logical(&k.to_actuator(&p).unwrap()).unwrap();
            prop_assert!(back.approx_eq(&p, 1e-2));
        }
    }
}
