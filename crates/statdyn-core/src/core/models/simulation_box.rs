use crate::core::utils::geometry::{self, Dimensionality};
use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BoxError {
    #[error("Box matrix contains non-finite entries")]
    NonFinite,
    #[error("Box matrix is singular (determinant {determinant})")]
    Singular { determinant: f64 },
}

/// Periodic simulation cell.
///
/// The lattice vectors `a`, `b` and `c` are stored as the columns of a 3x3 matrix, so a
/// fractional coordinate `f` maps to the Cartesian position `matrix * f`. Both
/// orthorhombic and triclinic cells are represented the same way.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationBox {
    matrix: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl SimulationBox {
    pub fn from_matrix(matrix: Matrix3<f64>) -> Result<Self, BoxError> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(BoxError::NonFinite);
        }
        let determinant = matrix.determinant();
        if determinant.abs() <= f64::EPSILON {
            return Err(BoxError::Singular { determinant });
        }
        let inverse = matrix
            .try_inverse()
            .ok_or(BoxError::Singular { determinant })?;
        Ok(Self { matrix, inverse })
    }

    pub fn from_lattice_vectors(
        a: Vector3<f64>,
        b: Vector3<f64>,
        c: Vector3<f64>,
    ) -> Result<Self, BoxError> {
        Self::from_matrix(Matrix3::from_columns(&[a, b, c]))
    }

    pub fn orthorhombic(lx: f64, ly: f64, lz: f64) -> Result<Self, BoxError> {
        Self::from_matrix(Matrix3::from_diagonal(&Vector3::new(lx, ly, lz)))
    }

    /// Builds a cell from edge lengths and HOOMD-style tilt factors.
    ///
    /// `a = (Lx, 0, 0)`, `b = (xy·Ly, Ly, 0)`, `c = (xz·Lz, yz·Lz, Lz)`.
    pub fn from_tilt(
        lx: f64,
        ly: f64,
        lz: f64,
        xy: f64,
        xz: f64,
        yz: f64,
    ) -> Result<Self, BoxError> {
        Self::from_lattice_vectors(
            Vector3::new(lx, 0.0, 0.0),
            Vector3::new(xy * ly, ly, 0.0),
            Vector3::new(xz * lz, yz * lz, lz),
        )
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn lattice_vector(&self, index: usize) -> Vector3<f64> {
        self.matrix.column(index).into_owned()
    }

    pub fn volume(&self) -> f64 {
        self.matrix.determinant().abs()
    }

    /// Distance between adjacent lattice planes spanned by the other periodic vectors.
    ///
    /// A point within `d` of a face lies within `d / plane_spacing(axis)` of it in
    /// fractional units along `axis`.
    pub fn plane_spacing(&self, axis: usize, dimensions: Dimensionality) -> f64 {
        match dimensions {
            Dimensionality::Three => {
                let (u, v) = match axis {
                    0 => (1, 2),
                    1 => (2, 0),
                    _ => (0, 1),
                };
                self.volume() / self.lattice_vector(u).cross(&self.lattice_vector(v)).norm()
            }
            Dimensionality::Two => {
                let a = dimensions.project(self.lattice_vector(0));
                let b = dimensions.project(self.lattice_vector(1));
                let other = if axis == 0 { b } else { a };
                a.cross(&b).norm() / other.norm()
            }
        }
    }

    pub fn to_fractional(&self, position: &Vector3<f64>) -> Vector3<f64> {
        self.inverse * position
    }

    pub fn to_cartesian(&self, fractional: &Vector3<f64>) -> Vector3<f64> {
        self.matrix * fractional
    }

    /// Element-wise mean of two cells, used for time-averaged minimum image under NPT.
    pub fn averaged_with(&self, other: &SimulationBox) -> Result<SimulationBox, BoxError> {
        Self::from_matrix((self.matrix + other.matrix) * 0.5)
    }

    pub fn minimum_image(&self, delta: &Vector3<f64>, dimensions: Dimensionality) -> Vector3<f64> {
        geometry::minimum_image(delta, &self.matrix, &self.inverse, dimensions)
    }

    /// Absolute position of a wrapped coordinate given its periodic image counts.
    pub fn unwrap(&self, position: &Vector3<f64>, image: [i32; 3]) -> Vector3<f64> {
        let shift = Vector3::new(
            f64::from(image[0]),
            f64::from(image[1]),
            f64::from(image[2]),
        );
        position + self.matrix * shift
    }
}
