//! Forward dynamics for articulated bodies.
//!
//! The joint-space mass matrix is assembled column-by-column from the
//! inverse-dynamics routine with unit accelerations (velocity and external
//! terms cancel against the zero-acceleration bias), so forward and inverse
//! dynamics are consistent by construction. Accelerations then come from an
//! LU solve of `M qdd = Q_act - bias`.

use impetus_types::{DMatrix, DVector, SpatialVector, Wrench};
use nalgebra::{Point3, Vector3};
use tracing::warn;

use crate::articulated::ArticulatedBody;
use crate::rne::{inverse_dynamics, propagate_accelerations};

/// Per-link external forces (gravity plus accumulated wrenches), world-origin
/// referenced.
#[must_use]
pub fn external_forces(ab: &ArticulatedBody, gravity: &Vector3<f64>) -> Vec<SpatialVector> {
    ab.links()
        .iter()
        .map(|link| {
            let grav = Wrench::from_force_at_point(
                gravity * link.mass(),
                &link.com_world(),
                &Point3::origin(),
            );
            link.ext_wrench_origin() + grav.to_spatial()
        })
        .collect()
}

/// Joint-space mass matrix in the spatial encoding (nv×nv).
#[must_use]
pub fn mass_matrix(ab: &ArticulatedBody) -> DMatrix<f64> {
    let nv = ab.num_generalized_velocities();
    let zero_fext = vec![SpatialVector::zeros(); ab.links().len()];
    let bias = inverse_dynamics(ab, &DVector::zeros(nv), &zero_fext);

    let mut m = DMatrix::zeros(nv, nv);
    let mut unit = DVector::zeros(nv);
    for k in 0..nv {
        unit[k] = 1.0;
        let col = inverse_dynamics(ab, &unit, &zero_fext) - &bias;
        m.set_column(k, &col);
        unit[k] = 0.0;
    }
    m
}

/// Compute generalized accelerations from the current state and accumulated
/// wrenches, storing them (and the induced link accelerations) on the body.
pub fn forward_dynamics(ab: &mut ArticulatedBody, gravity: &Vector3<f64>) {
    let nv = ab.num_generalized_velocities();
    if nv == 0 {
        ab.set_generalized_acceleration(DVector::zeros(0));
        ab.set_link_accelerations(vec![SpatialVector::zeros(); ab.links().len()]);
        return;
    }

    let f_ext = external_forces(ab, gravity);
    let bias = inverse_dynamics(ab, &DVector::zeros(nv), &f_ext);

    let mut q_act = DVector::zeros(nv);
    for (j, joint) in ab.joints().iter().enumerate() {
        let off = ab.joint_dof_offset(j);
        for d in 0..joint.dof() {
            q_act[off + d] = joint.actuator_force[d];
        }
    }

    let m = mass_matrix(ab);
    let rhs = q_act - bias;
    let qdd = m.lu().solve(&rhs).unwrap_or_else(|| {
        warn!(body = %ab.id, "singular joint-space inertia; zeroing accelerations");
        DVector::zeros(nv)
    });

    let link_acc = propagate_accelerations(ab, &qdd);
    ab.set_link_accelerations(link_acc);
    ab.set_generalized_acceleration(qdd);
}
