//! Articulated bodies: a tree of links connected by joints.
//!
//! Links live in an arena with the base at index 0; every non-base link `i`
//! has exactly one inbound joint at index `i - 1`, and parents always precede
//! children, so downward passes are forward index loops and upward passes are
//! reverse loops. Cross references are indices, never pointers.
//!
//! Two generalized-coordinate encodings coexist:
//!
//! - `Euler` (length nq): base position + unit quaternion (floating base
//!   only) followed by joint coordinates. Used for position integration.
//! - `Spatial` (length nv): base `[ω, v₀]` referenced at the world origin
//!   (floating base only) followed by joint velocities. Used for velocity
//!   integration and solver block layout.

use impetus_types::{
    BodyId, CoordinateEncoding, DMatrix, DVector, Pose, SpatialVector, UnitQuaternion,
};
use nalgebra::{Point3, Quaternion, Vector3};

use crate::joint::Joint;
use crate::rigid::RigidBody;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A kinematic tree of links and joints with a fixed or floating base.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ArticulatedBody {
    /// Stable identifier of the articulated body as a whole.
    pub id: BodyId,
    links: Vec<RigidBody>,
    joints: Vec<Joint>,
    floating_base: bool,
    /// World-origin-referenced spatial velocity per link.
    link_vel: Vec<SpatialVector>,
    /// World-origin-referenced spatial acceleration per link (from the last
    /// forward-dynamics call).
    link_acc: Vec<SpatialVector>,
    /// Generalized acceleration in the spatial encoding.
    qdd: DVector<f64>,
}

impl ArticulatedBody {
    /// Create an articulated body with a fixed (immobile) base.
    #[must_use]
    pub fn with_fixed_base(id: BodyId, mut base: RigidBody) -> Self {
        base.is_static = true;
        Self::build(id, base, false)
    }

    /// Create an articulated body with a floating base.
    #[must_use]
    pub fn with_floating_base(id: BodyId, base: RigidBody) -> Self {
        Self::build(id, base, true)
    }

    fn build(id: BodyId, base: RigidBody, floating_base: bool) -> Self {
        Self {
            id,
            links: vec![base],
            joints: Vec::new(),
            floating_base,
            link_vel: vec![SpatialVector::zeros()],
            link_acc: vec![SpatialVector::zeros()],
            qdd: DVector::zeros(if floating_base { 6 } else { 0 }),
        }
    }

    /// Attach a new link under `parent` through `joint`; returns the new
    /// link's index.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is out of range (scene-construction programmer
    /// error).
    pub fn add_link(&mut self, parent: usize, mut joint: Joint, mut link: RigidBody) -> usize {
        assert!(parent < self.links.len(), "parent link {parent} out of range");
        let child = self.links.len();
        joint.parent = parent;
        joint.child = child;
        link.parent_link = Some(parent);
        link.inbound_joint = Some(child - 1);
        self.links.push(link);
        self.joints.push(joint);
        self.link_vel.push(SpatialVector::zeros());
        self.link_acc.push(SpatialVector::zeros());
        self.qdd = DVector::zeros(self.num_generalized_velocities());
        self.update_kinematics();
        child
    }

    /// Whether the base is floating (6 extra generalized coordinates).
    #[must_use]
    pub fn is_floating_base(&self) -> bool {
        self.floating_base
    }

    /// The links, base first.
    #[must_use]
    pub fn links(&self) -> &[RigidBody] {
        &self.links
    }

    /// Mutable link access.
    pub fn links_mut(&mut self) -> &mut [RigidBody] {
        &mut self.links
    }

    /// The joints; joint `i` is the inbound joint of link `i + 1`.
    #[must_use]
    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    /// Mutable joint access. Call [`Self::update_kinematics`] after editing
    /// coordinates or velocities.
    pub fn joints_mut(&mut self) -> &mut [Joint] {
        &mut self.joints
    }

    /// The inbound joint of a non-base link.
    #[must_use]
    pub fn inner_joint_of(&self, link: usize) -> Option<&Joint> {
        link.checked_sub(1).map(|j| &self.joints[j])
    }

    /// Number of base degrees of freedom in the spatial encoding.
    #[must_use]
    pub fn base_dofs(&self) -> usize {
        if self.floating_base {
            6
        } else {
            0
        }
    }

    /// Generalized-velocity length (spatial encoding).
    #[must_use]
    pub fn num_generalized_velocities(&self) -> usize {
        self.base_dofs() + self.joints.iter().map(Joint::dof).sum::<usize>()
    }

    /// Length of a generalized-coordinate vector in the given encoding.
    #[must_use]
    pub fn num_generalized_coordinates(&self, enc: CoordinateEncoding) -> usize {
        let base = match (self.floating_base, enc) {
            (false, _) => 0,
            (true, CoordinateEncoding::Euler) => 7,
            (true, CoordinateEncoding::Spatial) => 6,
        };
        base + self.joints.iter().map(Joint::dof).sum::<usize>()
    }

    /// Offset of joint `j`'s DOFs within the spatial-encoding vector.
    #[must_use]
    pub fn joint_dof_offset(&self, j: usize) -> usize {
        self.base_dofs() + self.joints[..j].iter().map(Joint::dof).sum::<usize>()
    }

    /// Recompute link poses and velocities from the base state and the joint
    /// coordinates/velocities.
    pub fn update_kinematics(&mut self) {
        // Pose propagation (parents precede children).
        for j in 0..self.joints.len() {
            let parent_pose = self.links[self.joints[j].parent].pose;
            let child = self.joints[j].child;
            self.links[child].pose = self.joints[j].child_pose(&parent_pose);
        }

        // Velocity propagation, world-origin referenced.
        self.link_vel[0] = if self.floating_base {
            self.links[0].spatial_velocity_origin()
        } else {
            SpatialVector::zeros()
        };
        for j in 0..self.joints.len() {
            let parent = self.joints[j].parent;
            let child = self.joints[j].child;
            let parent_pose = self.links[parent].pose;
            let s = self.joints[j].spatial_axis_global(&parent_pose);
            self.link_vel[child] = self.link_vel[parent] + s * self.joints[j].qd[0];
        }

        // Mirror into the per-link twists (body-origin referenced).
        for i in 0..self.links.len() {
            let v = self.link_vel[i];
            self.links[i].set_spatial_velocity_origin(&v);
        }
    }

    /// World-origin-referenced spatial velocity of a link.
    #[must_use]
    pub fn link_velocity_origin(&self, link: usize) -> SpatialVector {
        self.link_vel[link]
    }

    /// World-origin-referenced spatial acceleration of a link (from the last
    /// forward-dynamics call).
    #[must_use]
    pub fn link_acceleration_origin(&self, link: usize) -> SpatialVector {
        self.link_acc[link]
    }

    /// Store per-link accelerations (used by forward dynamics).
    pub fn set_link_accelerations(&mut self, acc: Vec<SpatialVector>) {
        debug_assert_eq!(acc.len(), self.links.len());
        self.link_acc = acc;
    }

    /// Store the generalized acceleration (spatial encoding).
    pub fn set_generalized_acceleration(&mut self, qdd: DVector<f64>) {
        debug_assert_eq!(qdd.len(), self.num_generalized_velocities());
        self.qdd = qdd;
    }

    /// Generalized acceleration in the spatial encoding.
    #[must_use]
    pub fn generalized_acceleration(&self) -> &DVector<f64> {
        &self.qdd
    }

    /// Read the generalized coordinates in the given encoding.
    #[must_use]
    pub fn get_generalized_coordinates(&self, enc: CoordinateEncoding) -> DVector<f64> {
        let mut out = DVector::zeros(self.num_generalized_coordinates(enc));
        let mut k = 0;
        if self.floating_base {
            let pose = &self.links[0].pose;
            out[0] = pose.position.x;
            out[1] = pose.position.y;
            out[2] = pose.position.z;
            match enc {
                CoordinateEncoding::Euler => {
                    let q = pose.rotation.quaternion();
                    out[3] = q.w;
                    out[4] = q.i;
                    out[5] = q.j;
                    out[6] = q.k;
                    k = 7;
                }
                CoordinateEncoding::Spatial => {
                    let sv = pose.rotation.scaled_axis();
                    out[3] = sv.x;
                    out[4] = sv.y;
                    out[5] = sv.z;
                    k = 6;
                }
            }
        }
        for joint in &self.joints {
            for d in 0..joint.dof() {
                out[k] = joint.q[d];
                k += 1;
            }
        }
        out
    }

    /// Write the generalized coordinates in the given encoding and refresh
    /// the kinematics.
    ///
    /// Euler-encoded orientations are renormalized on entry, so integrating
    /// raw quaternion rates stays on the unit sphere.
    pub fn set_generalized_coordinates(&mut self, enc: CoordinateEncoding, v: &DVector<f64>) {
        debug_assert_eq!(v.len(), self.num_generalized_coordinates(enc));
        let mut k = 0;
        if self.floating_base {
            self.links[0].pose.position = Point3::new(v[0], v[1], v[2]);
            match enc {
                CoordinateEncoding::Euler => {
                    self.links[0].pose.rotation = UnitQuaternion::from_quaternion(
                        Quaternion::new(v[3], v[4], v[5], v[6]),
                    );
                    k = 7;
                }
                CoordinateEncoding::Spatial => {
                    self.links[0].pose.rotation =
                        UnitQuaternion::from_scaled_axis(Vector3::new(v[3], v[4], v[5]));
                    k = 6;
                }
            }
        }
        for joint in &mut self.joints {
            for d in 0..joint.dof() {
                joint.q[d] = v[k];
                k += 1;
            }
        }
        self.update_kinematics();
    }

    /// Read the generalized velocity in the given encoding.
    ///
    /// `Spatial` is the solver encoding; `Euler` is the position-integration
    /// rate (base origin velocity + quaternion rate `q̇ = ½ ω ⊗ q`).
    #[must_use]
    pub fn get_generalized_velocity(&self, enc: CoordinateEncoding) -> DVector<f64> {
        let mut out = DVector::zeros(self.num_generalized_coordinates(enc));
        let mut k = 0;
        if self.floating_base {
            match enc {
                CoordinateEncoding::Spatial => {
                    let v0 = self.link_vel[0];
                    for r in 0..6 {
                        out[r] = v0[r];
                    }
                    k = 6;
                }
                CoordinateEncoding::Euler => {
                    let twist = self.links[0].velocity;
                    out[0] = twist.linear.x;
                    out[1] = twist.linear.y;
                    out[2] = twist.linear.z;
                    let q = self.links[0].pose.rotation.into_inner();
                    let qdot = Quaternion::from_parts(0.0, twist.angular) * q * 0.5;
                    out[3] = qdot.w;
                    out[4] = qdot.i;
                    out[5] = qdot.j;
                    out[6] = qdot.k;
                    k = 7;
                }
            }
        }
        for joint in &self.joints {
            for d in 0..joint.dof() {
                out[k] = joint.qd[d];
                k += 1;
            }
        }
        out
    }

    /// Write the generalized velocity (spatial encoding) and refresh link
    /// velocities.
    pub fn set_generalized_velocity(&mut self, v: &DVector<f64>) {
        debug_assert_eq!(v.len(), self.num_generalized_velocities());
        let mut k = 0;
        if self.floating_base {
            let mut base = SpatialVector::zeros();
            for r in 0..6 {
                base[r] = v[r];
            }
            self.links[0].set_spatial_velocity_origin(&base);
            k = 6;
        }
        for joint in &mut self.joints {
            for d in 0..joint.dof() {
                joint.qd[d] = v[k];
                k += 1;
            }
        }
        self.update_kinematics();
    }

    /// Whether joint `j` lies on the path from the base to `link`.
    #[must_use]
    pub fn joint_on_path(&self, j: usize, link: usize) -> bool {
        let mut cur = link;
        while cur != 0 {
            let inbound = cur - 1;
            if inbound == j {
                return true;
            }
            cur = self.joints[inbound].parent;
        }
        false
    }

    /// Jacobian of a world point rigidly attached to `link` with respect to
    /// the spatial-encoding generalized velocity (3×nv).
    #[must_use]
    pub fn point_jacobian(&self, link: usize, point: &Point3<f64>) -> DMatrix<f64> {
        let nv = self.num_generalized_velocities();
        let mut jac = DMatrix::zeros(3, nv);
        let p = point.coords;

        if self.floating_base {
            // ṗ = v₀ + ω × p: the ω block is -[p]×, the v₀ block is identity.
            jac[(0, 1)] = p.z;
            jac[(0, 2)] = -p.y;
            jac[(1, 0)] = -p.z;
            jac[(1, 2)] = p.x;
            jac[(2, 0)] = p.y;
            jac[(2, 1)] = -p.x;
            jac[(0, 3)] = 1.0;
            jac[(1, 4)] = 1.0;
            jac[(2, 5)] = 1.0;
        }

        for j in 0..self.joints.len() {
            if !self.joint_on_path(j, link) {
                continue;
            }
            let parent_pose = self.links[self.joints[j].parent].pose;
            let s = self.joints[j].spatial_axis_global(&parent_pose);
            let s_ang = Vector3::new(s[0], s[1], s[2]);
            let s_lin = Vector3::new(s[3], s[4], s[5]);
            let col = s_lin + s_ang.cross(&p);
            let offset = self.joint_dof_offset(j);
            jac[(0, offset)] = col.x;
            jac[(1, offset)] = col.y;
            jac[(2, offset)] = col.z;
        }
        jac
    }

    /// Total kinetic energy.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        let origin = Point3::origin();
        self.links
            .iter()
            .zip(&self.link_vel)
            .map(|(link, v)| link.spatial_inertia_at(&origin).kinetic_energy(v))
            .sum()
    }

    /// Total gravitational potential energy.
    #[must_use]
    pub fn potential_energy(&self, gravity: &Vector3<f64>) -> f64 {
        self.links.iter().map(|l| l.potential_energy(gravity)).sum()
    }

    /// Whether every link's state is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.links.iter().all(RigidBody::is_finite)
            && self.joints.iter().all(|j| {
                j.q.iter().all(|x| x.is_finite()) && j.qd.iter().all(|x| x.is_finite())
            })
    }

    /// Look up a link index by the link's body id.
    #[must_use]
    pub fn link_index(&self, id: BodyId) -> Option<usize> {
        self.links.iter().position(|l| l.id == id)
    }

    /// A simple pendulum: one revolute link swinging about the world Y axis
    /// from a fixed base at `pivot`.
    ///
    /// The link's COM sits `length` below the pivot at `q = 0`; `q` measures
    /// the deflection angle.
    #[must_use]
    pub fn pendulum(
        id: BodyId,
        base_id: BodyId,
        link_id: BodyId,
        pivot: Point3<f64>,
        length: f64,
        mass: f64,
    ) -> Self {
        use impetus_types::JointId;
        use nalgebra::Matrix3;

        let base = RigidBody::new_static(base_id, Pose::from_position(pivot));
        let mut ab = Self::with_fixed_base(id, base);

        // Point-mass link: tiny rotational inertia about its own COM.
        let link = RigidBody::new(
            link_id,
            Pose::identity(),
            mass,
            Matrix3::identity() * (1e-6 * mass),
        );
        let joint = Joint::revolute(JointId::new(0), Vector3::y_axis())
            .with_child_anchor(Pose::from_position(Point3::new(0.0, 0.0, length)));
        ab.add_link(0, joint, link);
        ab
    }
}

/// Mirror of [`ArticulatedBody::get_generalized_velocity`] for free rigid
/// bodies (shared by the super-body wrapper).
#[must_use]
pub fn rigid_euler_rate(body: &RigidBody) -> DVector<f64> {
    let mut out = DVector::zeros(7);
    out[0] = body.velocity.linear.x;
    out[1] = body.velocity.linear.y;
    out[2] = body.velocity.linear.z;
    let q = body.pose.rotation.into_inner();
    let qdot = Quaternion::from_parts(0.0, body.velocity.angular) * q * 0.5;
    out[3] = qdot.w;
    out[4] = qdot.i;
    out[5] = qdot.j;
    out[6] = qdot.k;
    out
}
