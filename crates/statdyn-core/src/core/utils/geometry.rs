use nalgebra::{Matrix3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Number of periodic spatial dimensions in a simulation.
///
/// Two-dimensional systems keep three-component vectors, but the z component is
/// never periodic and never contributes to displacements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimensionality {
    Two,
    Three,
}

impl Dimensionality {
    pub fn from_count(count: u8) -> Option<Self> {
        match count {
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            _ => None,
        }
    }

    pub fn count(self) -> usize {
        match self {
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    /// Projects a vector onto the active dimensions.
    #[inline]
    pub fn project(self, v: Vector3<f64>) -> Vector3<f64> {
        match self {
            Self::Two => Vector3::new(v.x, v.y, 0.0),
            Self::Three => v,
        }
    }
}

/// Shortest periodic image of `delta` in the lattice spanned by the columns of `cell`.
///
/// The fractional components are first reduced into `[-0.5, 0.5]`, which is exact for
/// orthorhombic cells. Skewed cells can still have a shorter image one lattice vector
/// away, so the neighbouring images are searched as well.
pub fn minimum_image(
    delta: &Vector3<f64>,
    cell: &Matrix3<f64>,
    inverse: &Matrix3<f64>,
    dimensions: Dimensionality,
) -> Vector3<f64> {
    let delta = dimensions.project(*delta);
    let mut fractional = inverse * delta;
    let periodic_axes = dimensions.count();
    for axis in 0..periodic_axes {
        fractional[axis] -= fractional[axis].round();
    }
    if dimensions == Dimensionality::Two {
        fractional[2] = 0.0;
    }

    let reduced = dimensions.project(cell * fractional);
    let a = dimensions.project(cell.column(0).into_owned());
    let b = dimensions.project(cell.column(1).into_owned());
    let c = cell.column(2).into_owned();

    let c_range = match dimensions {
        Dimensionality::Two => 0i32..=0,
        Dimensionality::Three => -1i32..=1,
    };

    let mut best = reduced;
    let mut best_norm = reduced.norm_squared();
    for i in -1i32..=1 {
        for j in -1i32..=1 {
            for k in c_range.clone() {
                if i == 0 && j == 0 && k == 0 {
                    continue;
                }
                let candidate = reduced + a * f64::from(i) + b * f64::from(j) + c * f64::from(k);
                let norm = candidate.norm_squared();
                if norm < best_norm {
                    best = candidate;
                    best_norm = norm;
                }
            }
        }
    }
    best
}

/// Wraps an angle into `(-π, π]`.
pub fn wrap_angle(theta: f64) -> f64 {
    let wrapped = (theta + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI { wrapped + 2.0 * PI } else { wrapped }
}

/// Angle rotated between two orientations.
///
/// In two dimensions this is the signed rotation about z in `(-π, π]`; in three
/// dimensions it is the unsigned angle of the relative rotation in `[0, π]`.
pub fn rotation_angle(
    from: &UnitQuaternion<f64>,
    to: &UnitQuaternion<f64>,
    dimensions: Dimensionality,
) -> f64 {
    let relative = to * from.inverse();
    match dimensions {
        Dimensionality::Two => wrap_angle(relative.scaled_axis().z),
        Dimensionality::Three => relative.angle(),
    }
}

/// Ordinary least-squares fit `y = slope * x + intercept`.
pub fn linear_fit(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let (sxx, sxy) = xs
        .iter()
        .zip(ys)
        .fold((0.0, 0.0), |(sxx, sxy), (&x, &y)| {
            let dx = x - mean_x;
            (sxx + dx * dx, sxy + dx * (y - mean_y))
        });
    if sxx <= f64::EPSILON {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}
