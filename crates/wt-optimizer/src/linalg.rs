//! Dense Cholesky factorization for the small symmetric systems the
//! Gaussian process builds (one row per observation).

/// Lower-triangular factor `L` with `L Lᵀ = A`.
#[derive(Debug, Clone)]
pub(crate) struct Cholesky {
    l: Vec<Vec<f64>>,
}

impl Cholesky {
    /// Factor a symmetric matrix; `None` when it is not positive definite.
    pub(crate) fn decompose(matrix: &[Vec<f64>]) -> Option<Self> {
        let n = matrix.len();
        let mut l = vec![vec![0.0; n]; n];

        for i in 0..n {
            for j in 0..=i {
                let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
                if i == j {
                    let val = matrix[i][i] - sum;
                    if val <= 0.0 || !val.is_finite() {
                        return None;
                    }
                    l[i][j] = val.sqrt();
                } else {
                    l[i][j] = (matrix[i][j] - sum) / l[j][j];
                }
            }
        }
        Some(Self { l })
    }

    pub(crate) fn dim(&self) -> usize {
        self.l.len()
    }

    /// Solve `L x = b` by forward substitution.
    pub(crate) fn solve_lower(&self, b: &[f64]) -> Vec<f64> {
        let n = b.len();
        let mut x = vec![0.0; n];
        for i in 0..n {
            let mut sum = b[i];
            for j in 0..i {
                sum -= self.l[i][j] * x[j];
            }
            x[i] = sum / self.l[i][i];
        }
        x
    }

    /// Solve `Lᵀ x = b` by backward substitution.
    pub(crate) fn solve_upper(&self, b: &[f64]) -> Vec<f64> {
        let n = b.len();
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = b[i];
            for j in (i + 1)..n {
                sum -= self.l[j][i] * x[j];
            }
            x[i] = sum / self.l[i][i];
        }
        x
    }

    /// Solve `A x = b`.
    pub(crate) fn solve(&self, b: &[f64]) -> Vec<f64> {
        let y = self.solve_lower(b);
        self.solve_upper(&y)
    }

    /// `½ log |A|`, i.e. the sum of the log-diagonal of `L`.
    pub(crate) fn half_log_det(&self) -> f64 {
        (0..self.dim()).map(|i| self.l[i][i].ln()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spd() -> Vec<Vec<f64>> {
        vec![
            vec![4.0, 12.0, -16.0],
            vec![12.0, 37.0, -43.0],
            vec![-16.0, -43.0, 98.0],
        ]
    }

    #[test]
    fn decomposes_known_matrix() {
        let chol = Cholesky::decompose(&spd()).unwrap();
        let expected = [[2.0, 0.0, 0.0], [6.0, 1.0, 0.0], [-8.0, 5.0, 3.0]];
        for i in 0..3 {
            for j in 0..3 {
                assert!((chol.l[i][j] - expected[i][j]).abs() < 1e-12);
            }
        }
        // |A| = (2·1·3)² = 36
        assert!((chol.half_log_det() - 6.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn solve_recovers_rhs() {
        let a = spd();
        let chol = Cholesky::decompose(&a).unwrap();
        let b = vec![1.0, -2.0, 3.0];
        let x = chol.solve(&b);
        for i in 0..3 {
            let ax: f64 = (0..3).map(|j| a[i][j] * x[j]).sum();
            assert!((ax - b[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn rejects_indefinite_matrix() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        assert!(Cholesky::decompose(&a).is_none());
    }
}
