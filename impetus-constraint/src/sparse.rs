//! Sparse-storage variant of Lemke's algorithm.
//!
//! Problem matrices from large islands are mostly zeros (each constraint
//! couples at most two super-bodies), so the basis is kept as sparse columns
//! and only densified for the factorization step. A dedicated sparse LU
//! would slot in behind `solve_basis` without touching the pivot logic.
//!
//! The pivot loop is the same as the dense variant, and the ratio test reads
//! the freshly solved pivot column throughout.

use impetus_types::{DMatrix, DVector};
use nalgebra_sparse::CscMatrix;
use tracing::debug;

use crate::error::LcpError;
use crate::lemke::{max_lemke_iterations, solve_cascade};

/// A basis column in sparse form: `(row, value)` pairs.
type SparseCol = Vec<(usize, f64)>;

fn csc_column(m: &CscMatrix<f64>, j: usize) -> SparseCol {
    let col = m.col(j);
    col.row_indices()
        .iter()
        .zip(col.values())
        .map(|(&r, &v)| (r, v))
        .collect()
}

fn densify(cols: &[SparseCol], n: usize) -> DMatrix<f64> {
    let mut dense = DMatrix::zeros(n, n);
    for (j, col) in cols.iter().enumerate() {
        for &(r, v) in col {
            dense[(r, j)] = v;
        }
    }
    dense
}

fn solve_basis(cols: &[SparseCol], n: usize, rhs: &DVector<f64>) -> Result<DVector<f64>, LcpError> {
    solve_cascade(&densify(cols, n), rhs)
}

fn csc_amax(m: &CscMatrix<f64>) -> f64 {
    m.values().iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

/// Lemke's method over CSC storage. Semantics match
/// [`lcp_lemke`](crate::lemke::lcp_lemke).
#[allow(clippy::too_many_lines)]
pub fn lcp_lemke_sparse(
    m: &CscMatrix<f64>,
    q: &DVector<f64>,
    z: &mut DVector<f64>,
    piv_tol: f64,
    zero_tol: f64,
) -> Result<(), LcpError> {
    let n = q.len();
    let max_iter = max_lemke_iterations(n);

    if n == 0 {
        *z = DVector::zeros(0);
        return Ok(());
    }

    let zero_tol = if zero_tol > 0.0 {
        zero_tol
    } else {
        f64::EPSILON * csc_amax(m) * n as f64
    };

    if q.min() > -zero_tol {
        *z = DVector::zeros(n);
        return Ok(());
    }

    // Initial basis from the warm-start guess.
    let z0 = z.clone();
    let mut bas: Vec<usize> = Vec::new();
    let mut nonbas: Vec<usize> = Vec::new();
    if z0.len() != n {
        nonbas.extend(0..n);
    } else {
        for i in 0..n {
            if z0[i] > 0.0 {
                bas.push(i);
            } else {
                nonbas.push(i);
            }
        }
    }

    let t = 2 * n;

    // Basis columns: M columns for basic z variables, negated identity for
    // the rest.
    let mut cols: Vec<SparseCol> = Vec::with_capacity(n);
    for &j in &bas {
        cols.push(csc_column(m, j));
    }
    for &j in &nonbas {
        cols.push(vec![(j, -1.0)]);
    }

    let mut x = solve_basis(&cols, n, &(-q))?;

    if x.min() >= 0.0 {
        *z = DVector::zeros(n);
        for (idx, &b) in bas.iter().enumerate() {
            z[b] = x[idx];
        }
        return Ok(());
    }

    // Artificial variable entry.
    let mut lvindex = 0;
    let mut min_x = x[0];
    for i in 1..n {
        if x[i] < min_x {
            min_x = x[i];
            lvindex = i;
        }
    }
    let tval = -min_x;
    for &i in &nonbas {
        bas.push(i + n);
    }
    let mut leaving = bas[lvindex];
    bas[lvindex] = t;

    let u = DVector::from_fn(n, |i, _| if x[i] < 0.0 { 1.0 } else { 0.0 });
    let mut be_dense = DVector::zeros(n);
    for (j, col) in cols.iter().enumerate() {
        if u[j] != 0.0 {
            for &(r, v) in col {
                be_dense[r] -= v;
            }
        }
    }
    x += u * tval;
    x[lvindex] = tval;
    cols[lvindex] = be_dense
        .iter()
        .enumerate()
        .filter(|(_, v)| **v != 0.0)
        .map(|(r, v)| (r, *v))
        .collect();

    for _iter in 0..max_iter {
        if leaving == t {
            let mut z_full = DVector::zeros(2 * n);
            for (idx, &b) in bas.iter().enumerate() {
                if b < 2 * n {
                    z_full[b] = x[idx];
                }
            }
            *z = DVector::from(z_full.rows(0, n).clone_owned());
            return Ok(());
        }

        let (entering, be): (usize, SparseCol) = if leaving < n {
            (n + leaving, vec![(leaving, -1.0)])
        } else {
            let e = leaving - n;
            (e, csc_column(m, e))
        };

        let mut be_rhs = DVector::zeros(n);
        for &(r, v) in &be {
            be_rhs[r] = v;
        }

        // The current pivot column, used for both the candidate filter and
        // the ratio test below.
        let d = solve_basis(&cols, n, &be_rhs)?;

        let piv_tol_iter = if piv_tol > 0.0 {
            piv_tol
        } else {
            f64::EPSILON * n as f64 * be_rhs.amax().max(1.0)
        };

        let mut j: Vec<usize> = (0..n).filter(|&i| d[i] > piv_tol_iter).collect();
        if j.is_empty() {
            debug!("sparse Lemke: ray termination");
            *z = DVector::zeros(n);
            return Err(LcpError::RayTermination);
        }

        let theta = j
            .iter()
            .map(|&i| (x[i] + zero_tol) / d[i])
            .fold(f64::INFINITY, f64::min);
        j.retain(|&i| x[i] / d[i] <= theta);
        if j.is_empty() {
            *z = DVector::zeros(n);
            return Err(LcpError::ToleranceTooLow);
        }

        let jidx = if let Some(&art) = j.iter().find(|&&i| bas[i] == t) {
            art
        } else {
            let mut best = j[0];
            for &i in &j[1..] {
                if d[i] > d[best] {
                    best = i;
                }
            }
            best
        };

        leaving = bas[jidx];

        let ratio = x[jidx] / d[jidx];
        x -= &d * ratio;
        x[jidx] = ratio;
        cols[jidx] = be;
        bas[jidx] = entering;
    }

    *z = DVector::zeros(n);
    Err(LcpError::IterationExhausted)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::lemke::lcp_lemke;
    use approx::assert_relative_eq;
    use nalgebra_sparse::CooMatrix;

    fn to_csc(dense: &DMatrix<f64>) -> CscMatrix<f64> {
        let mut coo = CooMatrix::new(dense.nrows(), dense.ncols());
        for r in 0..dense.nrows() {
            for c in 0..dense.ncols() {
                if dense[(r, c)] != 0.0 {
                    coo.push(r, c, dense[(r, c)]);
                }
            }
        }
        CscMatrix::from(&coo)
    }

    #[test]
    fn test_matches_dense_variant() {
        let m = DMatrix::from_row_slice(3, 3, &[2.0, 0.0, 0.5, 0.0, 1.5, 0.0, 0.5, 0.0, 1.0]);
        let q = DVector::from_vec(vec![-1.0, -0.5, 0.25]);

        let mut z_dense = DVector::zeros(0);
        lcp_lemke(&m, &q, &mut z_dense, 0.0, 0.0).expect("dense");

        let mut z_sparse = DVector::zeros(0);
        lcp_lemke_sparse(&to_csc(&m), &q, &mut z_sparse, 0.0, 0.0).expect("sparse");

        assert_relative_eq!((z_dense - z_sparse).norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_trivial_exit() {
        let m = DMatrix::identity(2, 2);
        let q = DVector::from_vec(vec![0.5, 1.0]);
        let mut z = DVector::zeros(0);
        lcp_lemke_sparse(&to_csc(&m), &q, &mut z, 0.0, 0.0).expect("trivial");
        assert_relative_eq!(z.norm(), 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_zero_size() {
        let coo = CooMatrix::new(0, 0);
        let m = CscMatrix::from(&coo);
        let q = DVector::zeros(0);
        let mut z = DVector::zeros(0);
        assert!(lcp_lemke_sparse(&m, &q, &mut z, 0.0, 0.0).is_ok());
    }

    #[test]
    fn test_complementarity() {
        let m = DMatrix::from_row_slice(2, 2, &[3.0, 1.0, 1.0, 2.0]);
        let q = DVector::from_vec(vec![-2.0, -4.0]);
        let mut z = DVector::zeros(0);
        lcp_lemke_sparse(&to_csc(&m), &q, &mut z, 0.0, 0.0).expect("solvable");
        let w = &m * &z + &q;
        assert!(z.min() >= -1e-9);
        assert!(w.min() >= -1e-9);
        assert!(z.dot(&w).abs() < 1e-8);
    }
}
