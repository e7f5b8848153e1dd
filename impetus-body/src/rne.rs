//! Recursive Newton-Euler inverse dynamics.
//!
//! All spatial quantities are world-axis, world-origin referenced, which
//! makes tree propagation plain vector arithmetic (the global-frame
//! specialization of the recursions; a link-frame evaluation would insert
//! rigid SE(3) transports at each hop).
//!
//! Three entry points:
//!
//! - [`inverse_dynamics`] - the general routine over the full
//!   spatial-encoding acceleration vector (floating base handled as six
//!   leading coordinates); also the workhorse behind the mass-matrix
//!   construction in forward dynamics.
//! - [`calc_inv_dyn`] - the per-joint actuator-force API: three-pass
//!   fixed-base recursion, or the composite-inertia floating-base variant
//!   that also returns the base acceleration.
//! - [`calc_constraint_forces`] - recovers joint constraint forces from the
//!   link accelerations stored by forward dynamics.

use impetus_types::{
    spatial_cross_force, spatial_cross_motion, DVector, SpatialInertia, SpatialVector,
};
use nalgebra::{Matrix6, Point3};

use crate::articulated::ArticulatedBody;

/// Result of [`calc_inv_dyn`].
#[derive(Debug, Clone)]
pub struct InvDynResult {
    /// Actuator force per joint (length `dof` each).
    pub joint_forces: Vec<DVector<f64>>,
    /// Base acceleration (floating-base variant only), world-origin
    /// referenced.
    pub base_accel: Option<SpatialVector>,
}

/// Isolated (per-link) spatial inertias about the world origin.
fn iso_inertias(ab: &ArticulatedBody) -> Vec<SpatialInertia> {
    let origin = Point3::origin();
    ab.links()
        .iter()
        .map(|l| l.spatial_inertia_at(&origin))
        .collect()
}

/// Link accelerations induced by a full generalized acceleration vector
/// (spatial encoding), including the velocity-product terms.
pub(crate) fn propagate_accelerations(
    ab: &ArticulatedBody,
    qdd: &DVector<f64>,
) -> Vec<SpatialVector> {
    let nl = ab.links().len();
    let mut acc = vec![SpatialVector::zeros(); nl];

    if ab.is_floating_base() {
        for r in 0..6 {
            acc[0][r] = qdd[r];
        }
    }

    for (j, joint) in ab.joints().iter().enumerate() {
        let parent = joint.parent;
        let child = joint.child;
        let parent_pose = ab.links()[parent].pose;
        let s = joint.spatial_axis_global(&parent_pose);
        let s_dot_mat = joint.spatial_axes_dot(impetus_types::RefFrame::Global);
        let s_dot = SpatialVector::from_iterator(s_dot_mat.column(0).iter().copied());
        let qd = joint.qd[0];
        let off = ab.joint_dof_offset(j);

        let v_child = ab.link_velocity_origin(child);
        let mut a = acc[parent];
        a += spatial_cross_motion(v_child, s * qd);
        a += s * qdd[off];
        a += s_dot * qd;
        acc[child] = a;
    }
    acc
}

/// General inverse dynamics: the generalized force that produces `qdd`
/// (spatial encoding, base coordinates first when floating) under the given
/// per-link external forces (world-origin referenced).
#[must_use]
pub fn inverse_dynamics(
    ab: &ArticulatedBody,
    qdd: &DVector<f64>,
    f_ext: &[SpatialVector],
) -> DVector<f64> {
    let nl = ab.links().len();
    let iso = iso_inertias(ab);
    let acc = propagate_accelerations(ab, qdd);

    // Net wrench per link, then leaves-to-root accumulation. Parents precede
    // children in the arena, so the reverse index loop visits every child
    // before its parent and each link contributes exactly once.
    let mut f = vec![SpatialVector::zeros(); nl];
    for i in 0..nl {
        let v = ab.link_velocity_origin(i);
        f[i] = iso[i].mul_motion(&acc[i]) + spatial_cross_force(v, iso[i].mul_motion(&v))
            - f_ext[i];
    }
    for i in (1..nl).rev() {
        let parent = ab.joints()[i - 1].parent;
        let child_force = f[i];
        f[parent] += child_force;
    }

    // Project onto the motion subspaces.
    let nv = ab.num_generalized_velocities();
    let mut out = DVector::zeros(nv);
    if ab.is_floating_base() {
        for r in 0..6 {
            out[r] = f[0][r];
        }
    }
    for (j, joint) in ab.joints().iter().enumerate() {
        let parent_pose = ab.links()[joint.parent].pose;
        let s = joint.spatial_axis_global(&parent_pose);
        out[ab.joint_dof_offset(j)] = s.dot(&f[joint.child]);
    }
    out
}

/// Per-joint actuator forces for the desired joint accelerations.
///
/// Dispatches on the base type: the fixed-base three-pass recursion, or the
/// floating-base composite-inertia variant (which also solves for the base
/// acceleration `a₀ = (I^C₀)⁻¹(−Z₀)`).
#[must_use]
pub fn calc_inv_dyn(
    ab: &ArticulatedBody,
    qdd_des: &DVector<f64>,
    f_ext: &[SpatialVector],
) -> InvDynResult {
    if ab.is_floating_base() {
        calc_inv_dyn_floating_base(ab, qdd_des, f_ext)
    } else {
        calc_inv_dyn_fixed_base(ab, qdd_des, f_ext)
    }
}

fn calc_inv_dyn_fixed_base(
    ab: &ArticulatedBody,
    qdd_des: &DVector<f64>,
    f_ext: &[SpatialVector],
) -> InvDynResult {
    let q = inverse_dynamics(ab, &joint_to_full(ab, qdd_des), f_ext);
    InvDynResult {
        joint_forces: split_per_joint(ab, &q),
        base_accel: None,
    }
}

fn calc_inv_dyn_floating_base(
    ab: &ArticulatedBody,
    qdd_des: &DVector<f64>,
    f_ext: &[SpatialVector],
) -> InvDynResult {
    let nl = ab.links().len();
    let iso = iso_inertias(ab);

    // Step 1: velocities are current; relative accelerations from the
    // desired joint accelerations with the base held still.
    let acc = propagate_accelerations(ab, &joint_to_full(ab, qdd_des));

    // Step 2: composite inertias and zero-acceleration wrenches.
    let mut composite: Vec<Matrix6<f64>> = iso.iter().map(|i| *i.matrix()).collect();
    let mut z = vec![SpatialVector::zeros(); nl];
    for i in 0..nl {
        let v = ab.link_velocity_origin(i);
        z[i] = iso[i].mul_motion(&acc[i]) + spatial_cross_force(v, iso[i].mul_motion(&v))
            - f_ext[i];
    }

    // Step 3: bottom-up aggregation into the base.
    for i in (1..nl).rev() {
        let parent = ab.joints()[i - 1].parent;
        let (ci, zi) = (composite[i], z[i]);
        composite[parent] += ci;
        z[parent] += zi;
    }

    // Step 4: base acceleration.
    let a0 = composite[0]
        .lu()
        .solve(&(-z[0]))
        .unwrap_or_else(SpatialVector::zeros);

    // Step 5: joint forces against the accelerated base.
    let mut joint_forces = Vec::with_capacity(ab.joints().len());
    for joint in ab.joints() {
        let parent_pose = ab.links()[joint.parent].pose;
        let s = joint.spatial_axis_global(&parent_pose);
        let f = composite[joint.child] * a0 + z[joint.child];
        joint_forces.push(DVector::from_element(1, s.dot(&f)));
    }

    InvDynResult {
        joint_forces,
        base_accel: Some(a0),
    }
}

/// Recover joint constraint forces from externally computed link
/// accelerations (stored by forward dynamics), projecting the accumulated
/// link wrench onto each joint's constrained directions.
pub fn calc_constraint_forces(ab: &mut ArticulatedBody, f_ext: &[SpatialVector]) {
    let nl = ab.links().len();
    let iso = iso_inertias(ab);

    let mut f = vec![SpatialVector::zeros(); nl];
    for i in 0..nl {
        let v = ab.link_velocity_origin(i);
        let a = ab.link_acceleration_origin(i);
        f[i] =
            iso[i].mul_motion(&a) + spatial_cross_force(v, iso[i].mul_motion(&v)) - f_ext[i];
    }
    for i in (1..nl).rev() {
        let parent = ab.joints()[i - 1].parent;
        let child_force = f[i];
        f[parent] += child_force;
    }

    for j in 0..ab.joints().len() {
        let parent_pose = ab.links()[ab.joints()[j].parent].pose;
        let child = ab.joints()[j].child;
        let constraint_axes = ab.joints()[j].constraint_axes_global(&parent_pose);
        let lambda = constraint_axes.transpose() * f[child];
        ab.joints_mut()[j].lambda = lambda;
    }
}

/// Embed a joint-space acceleration into the full spatial-encoding vector
/// (zero base rows).
fn joint_to_full(ab: &ArticulatedBody, qdd_joints: &DVector<f64>) -> DVector<f64> {
    let mut full = DVector::zeros(ab.num_generalized_velocities());
    let base = ab.base_dofs();
    for k in 0..qdd_joints.len() {
        full[base + k] = qdd_joints[k];
    }
    full
}

/// Slice a full generalized-force vector into per-joint vectors.
fn split_per_joint(ab: &ArticulatedBody, q: &DVector<f64>) -> Vec<DVector<f64>> {
    ab.joints()
        .iter()
        .enumerate()
        .map(|(j, joint)| {
            let off = ab.joint_dof_offset(j);
            DVector::from_iterator(joint.dof(), (0..joint.dof()).map(|d| q[off + d]))
        })
        .collect()
}
