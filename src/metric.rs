//! Metrics: named symmetric bilinear forms over the basis vectors

use ecow::EcoString;
use serde::*;

use crate::{UserError, GagenResult};

const EIGEN_EPSILON: f64 = 1e-10;

/// A named metric. Off-diagonal entries couple distinct basis vectors, as
/// in the conformal model where `no . ni = -1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Rep", into = "Rep")]
pub struct Metric {
    name: EcoString,
    dim: u8,
    /// Row-major `dim` x `dim` symmetric matrix
    matrix: Vec<f64>,
    round: bool,
    diagonal: bool,
    eigen: Option<Eigen>,
}

/// Eigen decomposition of a non-diagonal metric: `matrix = Q diag(values) Q^T`
#[derive(Debug, Clone, PartialEq)]
pub struct Eigen {
    /// Row-major orthogonal matrix; column `k` is the `k`th eigenvector
    pub vectors: Vec<f64>,
    pub values: Vec<f64>,
}

impl Metric {
    /// A metric with the given diagonal and zero off-diagonal entries
    pub fn diagonal(name: impl Into<EcoString>, diag: &[f64]) -> Self {
        let dim = diag.len() as u8;
        let mut matrix = vec![0.0; diag.len() * diag.len()];
        for (i, &v) in diag.iter().enumerate() {
            matrix[i * diag.len() + i] = v;
        }
        Self {
            name: name.into(),
            dim,
            matrix,
            round: false,
            diagonal: true,
            eigen: None,
        }
    }

    pub fn euclidean(name: impl Into<EcoString>, dim: u8) -> Self {
        Self::diagonal(name, &vec![1.0; dim as usize])
    }

    /// A metric from a full symmetric matrix. `round` requests snapping of
    /// near-integer coefficients after symbolic products; it is forced off
    /// for diagonal matrices, where no round-off can accumulate.
    pub fn from_matrix(
        name: impl Into<EcoString>,
        dim: u8,
        matrix: Vec<f64>,
        round: bool,
    ) -> GagenResult<Self> {
        let name = name.into();
        let n = dim as usize;
        if matrix.len() != n * n {
            return Err(UserError::new(format!(
                "Metric {name} must have {n}x{n} entries, but it has {}",
                matrix.len()
            ))
            .into());
        }
        for i in 0..n {
            for j in 0..i {
                if matrix[i * n + j] != matrix[j * n + i] {
                    return Err(UserError::new(format!(
                        "Metric {name} is not symmetric at entry ({i}, {j})"
                    ))
                    .into());
                }
            }
        }
        let diagonal = (0..n).all(|i| (0..n).all(|j| i == j || matrix[i * n + j] == 0.0));
        let eigen = (!diagonal).then(|| jacobi_eigen(&matrix, n));
        Ok(Self {
            name,
            dim,
            matrix,
            round: round && !diagonal,
            diagonal,
            eigen,
        })
    }

    pub fn name(&self) -> &EcoString {
        &self.name
    }
    pub fn dim(&self) -> u8 {
        self.dim
    }
    pub fn is_diagonal(&self) -> bool {
        self.diagonal
    }
    pub fn rounds(&self) -> bool {
        self.round
    }
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.matrix[i * self.dim as usize + j]
    }
    /// The diagonal basis-vector factors. For a non-diagonal metric these
    /// are the eigenvalues, valid only in the eigenbasis.
    pub fn basis_factors(&self) -> Vec<f64> {
        match &self.eigen {
            Some(eigen) => eigen.values.clone(),
            None => (0..self.dim as usize).map(|i| self.get(i, i)).collect(),
        }
    }
    pub fn eigen(&self) -> Option<&Eigen> {
        self.eigen.as_ref()
    }
    pub fn is_degenerate(&self) -> bool {
        self.basis_factors().iter().any(|v| v.abs() < EIGEN_EPSILON)
    }
    pub fn is_positive_definite(&self) -> bool {
        self.basis_factors().iter().all(|&v| v > EIGEN_EPSILON)
    }
}

/// Cyclic Jacobi sweeps. The matrices here are tiny (one row per basis
/// vector), so convergence is immediate in practice.
fn jacobi_eigen(matrix: &[f64], n: usize) -> Eigen {
    let mut a = matrix.to_vec();
    let mut q = vec![0.0; n * n];
    for i in 0..n {
        q[i * n + i] = 1.0;
    }
    for _sweep in 0..64 {
        let mut off = 0.0;
        for i in 0..n {
            for j in i + 1..n {
                off += a[i * n + j] * a[i * n + j];
            }
        }
        if off < EIGEN_EPSILON * EIGEN_EPSILON {
            break;
        }
        for p in 0..n {
            for r in p + 1..n {
                let apr = a[p * n + r];
                if apr.abs() < f64::EPSILON {
                    continue;
                }
                let theta = (a[r * n + r] - a[p * n + p]) / (2.0 * apr);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                for k in 0..n {
                    let akp = a[k * n + p];
                    let akr = a[k * n + r];
                    a[k * n + p] = c * akp - s * akr;
                    a[k * n + r] = s * akp + c * akr;
                }
                for k in 0..n {
                    let apk = a[p * n + k];
                    let ark = a[r * n + k];
                    a[p * n + k] = c * apk - s * ark;
                    a[r * n + k] = s * apk + c * ark;
                }
                for k in 0..n {
                    let qkp = q[k * n + p];
                    let qkr = q[k * n + r];
                    q[k * n + p] = c * qkp - s * qkr;
                    q[k * n + r] = s * qkp + c * qkr;
                }
            }
        }
    }
    let values = (0..n).map(|i| a[i * n + i]).collect();
    Eigen { vectors: q, values }
}

#[derive(Serialize, Deserialize)]
struct Rep {
    name: EcoString,
    dim: u8,
    matrix: Vec<f64>,
    #[serde(default)]
    round: bool,
}

impl From<Rep> for Metric {
    fn from(rep: Rep) -> Self {
        // a serialized metric was validated when first constructed
        Metric::from_matrix(rep.name, rep.dim, rep.matrix, rep.round)
            .unwrap_or_else(|e| panic!("invalid serialized metric: {e}"))
    }
}

impl From<Metric> for Rep {
    fn from(m: Metric) -> Self {
        Rep {
            name: m.name,
            dim: m.dim,
            matrix: m.matrix,
            round: m.round,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn diagonal_metric() {
        let m = Metric::diagonal("default", &[1.0, 1.0, -1.0]);
        assert!(m.is_diagonal());
        assert!(!m.is_degenerate());
        assert!(!m.is_positive_definite());
        assert!(Metric::euclidean("e", 3).is_positive_definite());
        assert!(Metric::diagonal("null", &[1.0, 0.0]).is_degenerate());
    }

    #[test]
    fn conformal_metric_eigen() {
        // no/ni conformal pairing: e4.e5 = -1, e4.e4 = e5.e5 = 0
        let m = Metric::from_matrix(
            "conformal",
            2,
            vec![0.0, -1.0, -1.0, 0.0],
            true,
        )
        .unwrap();
        assert!(!m.is_diagonal());
        assert!(m.rounds());
        let mut values = m.basis_factors();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((values[0] + 1.0).abs() < 1e-9);
        assert!((values[1] - 1.0).abs() < 1e-9);
        assert!(!m.is_degenerate());
        // eigenvectors reconstruct the matrix
        let eigen = m.eigen().unwrap();
        for i in 0..2 {
            for j in 0..2 {
                let mut sum = 0.0;
                for k in 0..2 {
                    sum += eigen.vectors[i * 2 + k] * eigen.values[k] * eigen.vectors[j * 2 + k];
                }
                assert!((sum - m.get(i, j)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn asymmetric_matrix_rejected() {
        let err = Metric::from_matrix("bad", 2, vec![1.0, 2.0, 3.0, 1.0], false);
        assert!(err.is_err());
    }

    #[test]
    fn round_forced_off_for_diagonal() {
        let m = Metric::from_matrix("flat", 2, vec![1.0, 0.0, 0.0, 1.0], true).unwrap();
        assert!(!m.rounds());
    }
}
