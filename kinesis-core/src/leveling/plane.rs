//! Planar bed models
//!
//! A tilted bed is modelled as `z = a·x + b·y + c`, either through three
//! probed points or as the least-squares fit of a probed grid.

use super::LevelingError;

/// Bed plane `z = a·x + b·y + c`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Plane {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl Plane {
    /// Plane through three points `[x, y, z]`
    pub fn through(points: &[[f32; 3]; 3]) -> Result<Self, LevelingError> {
        let [p1, p2, p3] = points;
        let u = [p2[0] - p1[0], p2[1] - p1[1], p2[2] - p1[2]];
        let v = [p3[0] - p1[0], p3[1] - p1[1], p3[2] - p1[2]];
        let n = [
            u[1] * v[2] - u[2] * v[1],
            u[2] * v[0] - u[0] * v[2],
            u[0] * v[1] - u[1] * v[0],
        ];
        if n[2].abs() < 1e-6 {
            return Err(LevelingError::Degenerate);
        }
        let a = -n[0] / n[2];
        let b = -n[1] / n[2];
        Ok(Self {
            a,
            b,
            c: p1[2] - a * p1[0] - b * p1[1],
        })
    }

    /// Least-squares plane through `points`
    pub fn fit(points: impl Iterator<Item = [f32; 3]>) -> Result<Self, LevelingError> {
        let mut fit = PlaneFit::default();
        for p in points {
            fit.add(p);
        }
        fit.solve()
    }

    /// Height of the plane at `(x, y)`
    pub fn height(&self, x: f32, y: f32) -> f32 {
        self.a * x + self.b * y + self.c
    }
}

/// Running sums for the normal equations of a plane fit
#[derive(Debug, Clone, Copy, Default)]
struct PlaneFit {
    n: f32,
    x: f32,
    y: f32,
    z: f32,
    xx: f32,
    yy: f32,
    xy: f32,
    xz: f32,
    yz: f32,
}

impl PlaneFit {
    fn add(&mut self, [x, y, z]: [f32; 3]) {
        self.n += 1.0;
        self.x += x;
        self.y += y;
        self.z += z;
        self.xx += x * x;
        self.yy += y * y;
        self.xy += x * y;
        self.xz += x * z;
        self.yz += y * z;
    }

    fn solve(&self) -> Result<Plane, LevelingError> {
        if self.n < 3.0 {
            return Err(LevelingError::Degenerate);
        }
        // Centered sums keep the system well conditioned
        let mx = self.x / self.n;
        let my = self.y / self.n;
        let mz = self.z / self.n;
        let sxx = self.xx - self.n * mx * mx;
        let syy = self.yy - self.n * my * my;
        let sxy = self.xy - self.n * mx * my;
        let sxz = self.xz - self.n * mx * mz;
        let syz = self.yz - self.n * my * mz;

        let det = sxx * syy - sxy * sxy;
        if det.abs() < 1e-6 {
            return Err(LevelingError::Degenerate);
        }
        let a = (sxz * syy - syz * sxy) / det;
        let b = (syz * sxx - sxz * sxy) / det;
        Ok(Plane {
            a,
            b,
            c: mz - a * mx - b * my,
        })
    }
}
