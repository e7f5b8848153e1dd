//! Fast pivoting LCP solver for small, mostly-active problems.
//!
//! An active-set method: guess which constraints are active, solve the
//! corresponding linear subsystem, and exchange indices until both
//! feasibility conditions hold. Much cheaper than Lemke for the small
//! well-conditioned systems stabilization produces, but incomplete - the
//! caller escalates to [`lcp_lemke_regularized`] on any failure.
//!
//! [`lcp_lemke_regularized`]: crate::lemke::lcp_lemke_regularized

use impetus_types::{DMatrix, DVector};
use tracing::trace;

use crate::error::LcpError;

/// Pivoting active-set solve of the LCP `(M, q)`.
///
/// `zero_tol <= 0` selects `ε·‖M‖∞·n`.
pub fn lcp_fast(
    m: &DMatrix<f64>,
    q: &DVector<f64>,
    z: &mut DVector<f64>,
    zero_tol: f64,
) -> Result<(), LcpError> {
    let n = q.len();
    if n == 0 {
        *z = DVector::zeros(0);
        return Ok(());
    }

    let tol = if zero_tol > 0.0 {
        zero_tol
    } else {
        f64::EPSILON * m.amax() * n as f64
    };

    // Trivial exit.
    if q.min() > -tol {
        *z = DVector::zeros(n);
        return Ok(());
    }

    let max_iter = 1000.min(50 * n).max(10);
    let mut active: Vec<usize> = Vec::new();

    // Seed with the most violated constraint.
    let mut worst = 0;
    for i in 1..n {
        if q[i] < q[worst] {
            worst = i;
        }
    }
    active.push(worst);

    for _iter in 0..max_iter {
        // Solve M[active, active] · z_active = -q[active].
        let k = active.len();
        let mut maa = DMatrix::zeros(k, k);
        let mut qa = DVector::zeros(k);
        for (r, &i) in active.iter().enumerate() {
            qa[r] = -q[i];
            for (c, &j) in active.iter().enumerate() {
                maa[(r, c)] = m[(i, j)];
            }
        }
        let Some(za) = maa.lu().solve(&qa) else {
            return Err(LcpError::SingularBasis);
        };

        // Drop the most negative active impulse, if any.
        let mut drop_idx: Option<usize> = None;
        let mut most_negative = -tol;
        for (r, &value) in za.iter().enumerate() {
            if value < most_negative {
                most_negative = value;
                drop_idx = Some(r);
            }
        }
        if let Some(r) = drop_idx {
            active.remove(r);
            if active.is_empty() {
                // Everything dropped out despite q having negative entries.
                return Err(LcpError::RayTermination);
            }
            continue;
        }

        // Feasibility of the inactive set.
        let mut z_full = DVector::zeros(n);
        for (r, &i) in active.iter().enumerate() {
            z_full[i] = za[r];
        }
        let w = m * &z_full + q;
        let mut add_idx: Option<usize> = None;
        let mut most_violated = -tol;
        for i in 0..n {
            if !active.contains(&i) && w[i] < most_violated {
                most_violated = w[i];
                add_idx = Some(i);
            }
        }
        match add_idx {
            Some(i) => {
                // Keep the active set sorted for deterministic layouts.
                let pos = active.partition_point(|&a| a < i);
                active.insert(pos, i);
            }
            None => {
                trace!(active = active.len(), "active-set solve converged");
                *z = z_full;
                return Ok(());
            }
        }
    }

    Err(LcpError::IterationExhausted)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_trivial_exit() {
        let m = DMatrix::identity(2, 2);
        let q = DVector::from_vec(vec![1.0, 0.5]);
        let mut z = DVector::zeros(0);
        lcp_fast(&m, &q, &mut z, 0.0).expect("trivial");
        assert_relative_eq!(z.norm(), 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_matches_analytic_single() {
        let m = DMatrix::from_row_slice(1, 1, &[2.0]);
        let q = DVector::from_vec(vec![-4.0]);
        let mut z = DVector::zeros(0);
        lcp_fast(&m, &q, &mut z, 0.0).expect("solvable");
        assert_relative_eq!(z[0], 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_mixed_active_inactive() {
        // First row wants an impulse, second is already separated.
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 0.2, 0.2, 1.0]);
        let q = DVector::from_vec(vec![-1.0, 0.5]);
        let mut z = DVector::zeros(0);
        lcp_fast(&m, &q, &mut z, 0.0).expect("solvable");
        assert_relative_eq!(z[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(z[1], 0.0, epsilon = 1e-12);
        let w = &m * &z + &q;
        assert!(w.min() >= -1e-9);
    }

    #[test]
    fn test_coupled_pair() {
        let m = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]);
        let q = DVector::from_vec(vec![-3.0, -3.0]);
        let mut z = DVector::zeros(0);
        lcp_fast(&m, &q, &mut z, 0.0).expect("solvable");
        // Symmetric problem: z = [1, 1].
        assert_relative_eq!(z[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(z[1], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_size() {
        let m = DMatrix::zeros(0, 0);
        let q = DVector::zeros(0);
        let mut z = DVector::zeros(0);
        assert!(lcp_fast(&m, &q, &mut z, 0.0).is_ok());
    }
}
