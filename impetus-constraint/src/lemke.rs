//! Lemke's algorithm for linear complementarity problems, with a
//! Tikhonov-regularized wrapper.
//!
//! Find `z ≥ 0` with `w = Mz + q ≥ 0` and `zᵀw = 0`. The pivoting core
//! introduces an artificial variable and pivots until it leaves the basis;
//! degenerate bases fall through a linear-solve cascade (LU → SVD
//! least-squares → SVD with a loosened rank cutoff) instead of aborting.
//!
//! Lexicographic anti-cycling is not used; ties break toward the largest
//! pivot direction, with the artificial variable forced out whenever it is
//! among the candidates (this drives termination). Cycling is possible but
//! rare in practice.

use impetus_types::{DMatrix, DVector, LcpConfig};
use tracing::{debug, trace};

use crate::error::LcpError;

/// Hard cap on pivot iterations for a problem of size `n`.
#[must_use]
pub fn max_lemke_iterations(n: usize) -> usize {
    1000.min(50 * n)
}

/// Solve `B·x = rhs` with escalation on singularity.
///
/// The cascade mirrors the exception fall-through of classic dense solvers
/// as a result chain: exact LU first, then an SVD least-squares solve, then
/// the same with a loosened rank cutoff.
pub(crate) fn solve_cascade(b: &DMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>, LcpError> {
    if let Some(x) = b.clone().lu().solve(rhs) {
        if x.iter().all(|v| v.is_finite()) {
            return Ok(x);
        }
    }

    let svd = b.clone().svd(true, true);
    if let Ok(x) = svd.solve(rhs, f64::EPSILON) {
        if x.iter().all(|v| v.is_finite()) {
            return Ok(x);
        }
    }
    if let Ok(x) = svd.solve(rhs, 1e-8) {
        if x.iter().all(|v| v.is_finite()) {
            return Ok(x);
        }
    }
    Err(LcpError::SingularBasis)
}

/// Lemke's method for the dense LCP `(M, q)`.
///
/// On entry `z` may hold a warm-start guess: strictly positive entries seed
/// the initial basis. On success `z` holds the solution; on failure it is
/// zeroed.
///
/// Tolerances of `0.0` select the defaults: `zero_tol = ε·‖M‖∞·n` and a
/// per-pivot `piv_tol = ε·n·max(1, ‖B_e‖∞)`.
pub fn lcp_lemke(
    m: &DMatrix<f64>,
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
        f64::EPSILON * m.amax() * n as f64
    };

    // Trivial exit: q already nonnegative.
    if q.min() > -zero_tol {
        *z = DVector::zeros(n);
        return Ok(());
    }

    // Initial basis from the warm-start guess: positive z entries enter.
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

    // Artificial variable index.
    let t = 2 * n;

    // Basis matrix B = [M·,bas | -I·,nonbas].
    let mut bl = DMatrix::zeros(n, n);
    if bas.is_empty() {
        bl.fill_with_identity();
        bl.neg_mut();
    } else {
        for (col, &j) in bas.iter().enumerate() {
            bl.set_column(col, &m.column(j));
        }
        for (col, &j) in nonbas.iter().enumerate() {
            let mut e = DVector::zeros(n);
            e[j] = -1.0;
            bl.set_column(bas.len() + col, &e);
        }
    }

    // Solve B·x = -q.
    let mut x = solve_cascade(&bl, &(-q))?;

    // The warm-start basis may already satisfy the LCP.
    if x.min() >= 0.0 {
        *z = DVector::zeros(n);
        for (idx, &b) in bas.iter().enumerate() {
            z[b] = x[idx];
        }
        trace!("warm-start basis solved the LCP");
        return Ok(());
    }

    // Drive in the artificial variable at the most negative coordinate.
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
    let be = -(&bl * &u);
    x += u * tval;
    x[lvindex] = tval;
    bl.set_column(lvindex, &be);

    let mut entering;
    let mut be = be;

    for _iter in 0..max_iter {
        // The artificial variable left: basic variables are the solution.
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

        // Entering variable is the complement of the one that left.
        if leaving < n {
            entering = n + leaving;
            be = DVector::zeros(n);
            be[leaving] = -1.0;
        } else {
            entering = leaving - n;
            be = DVector::from(m.column(entering).clone_owned());
        }

        let d = solve_cascade(&bl, &be)?;

        let piv_tol_iter = if piv_tol > 0.0 {
            piv_tol
        } else {
            f64::EPSILON * n as f64 * be.amax().max(1.0)
        };

        // Candidate rows for the ratio test.
        let mut j: Vec<usize> = (0..n).filter(|&i| d[i] > piv_tol_iter).collect();
        if j.is_empty() {
            debug!("ray termination: no pivot candidates");
            *z = DVector::zeros(n);
            return Err(LcpError::RayTermination);
        }

        // Minimal ratios (x + tol)/d over the candidates.
        let theta = j
            .iter()
            .map(|&i| (x[i] + zero_tol) / d[i])
            .fold(f64::INFINITY, f64::min);

        // Keep candidates at (or below) the minimum ratio.
        j.retain(|&i| x[i] / d[i] <= theta);
        if j.is_empty() {
            debug!("empty candidate set after ratio filtering");
            *z = DVector::zeros(n);
            return Err(LcpError::ToleranceTooLow);
        }

        // The artificial variable leaves as soon as it can; otherwise break
        // ties toward the largest pivot direction.
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

        // Pivot.
        let ratio = x[jidx] / d[jidx];
        x -= &d * ratio;
        x[jidx] = ratio;
        bl.set_column(jidx, &be);
        bas[jidx] = entering;
    }

    debug!(max_iter, "Lemke iteration cap exceeded");
    *z = DVector::zeros(n);
    Err(LcpError::IterationExhausted)
}

/// Verify the complementarity triple within `tol`: `z ≥ -tol`,
/// `Mz + q ≥ -tol`, and every product `zᵢwᵢ` inside `(-tol, tol)`.
fn verified(m: &DMatrix<f64>, q: &DVector<f64>, z: &DVector<f64>, tol: f64) -> bool {
    if z.min() < -tol {
        return false;
    }
    let w = m * z + q;
    if w.min() < -tol {
        return false;
    }
    let products = z.component_mul(&w);
    products.min() >= -tol && products.max() < tol
}

/// Regularized wrapper: raw Lemke first, then a sweep of Tikhonov factors
/// `λ = 10^rf` for `rf` in `[min_exp, max_exp)` stepped by `step_exp`,
/// verifying the complementarity triple against the (regularized) matrix at
/// each attempt. The first verified solution wins.
pub fn lcp_lemke_regularized(
    m: &DMatrix<f64>,
    q: &DVector<f64>,
    z: &mut DVector<f64>,
    config: &LcpConfig,
) -> Result<(), LcpError> {
    let n = q.len();
    if n == 0 {
        *z = DVector::zeros(0);
        return Ok(());
    }

    let zero_tol = if config.zero_tol > 0.0 {
        config.zero_tol
    } else {
        n as f64 * f64::EPSILON
    };

    let mut last_err = LcpError::RayTermination;
    match lcp_lemke(m, q, z, config.piv_tol, config.zero_tol) {
        Ok(()) if verified(m, q, z, zero_tol) => {
            trace!("solved with no regularization necessary");
            return Ok(());
        }
        Ok(()) => {}
        Err(e) => last_err = e,
    }

    let mut rf = config.min_exp;
    while rf < config.max_exp {
        let lambda = 10.0_f64.powi(rf);
        let mut m_reg = m.clone();
        for i in 0..n {
            m_reg[(i, i)] += lambda;
        }

        match lcp_lemke(&m_reg, q, z, config.piv_tol, config.zero_tol) {
            Ok(()) if verified(&m_reg, q, z, zero_tol) => {
                debug!(lambda, "solved with regularization");
                return Ok(());
            }
            Ok(()) => {}
            Err(e) => last_err = e,
        }

        rf += config.step_exp as i32;
    }

    debug!("unable to solve given any regularization");
    Err(last_err)
}
