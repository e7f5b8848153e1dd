//! Rigid body state.

use impetus_types::{BodyId, GeomId, Pose, RefFrame, SpatialInertia, SpatialVector, Twist, Wrench};
use nalgebra::{Matrix3, Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Contact response class of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Compliance {
    /// Hard contacts: resolved by impulses and stabilization.
    #[default]
    Rigid,
    /// Soft contacts: resolved by penalty forces; excluded from the
    /// impulsive solve, conservative advancement, and stabilization.
    Compliant,
}

/// A rigid body: either free, or one link of an articulated body.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidBody {
    /// Stable identifier (unique across free bodies and links).
    pub id: BodyId,
    /// Pose in the global frame.
    pub pose: Pose,
    /// Spatial velocity, world axes, referenced at `pose.position`.
    pub velocity: Twist,
    /// Mass (kg). Zero for static bodies.
    mass: f64,
    /// Rotational inertia about the COM in the body frame.
    inertia_body: Matrix3<f64>,
    /// COM offset in the body frame.
    com_local: Vector3<f64>,
    /// Accumulated external wrench, referenced at `pose.position`.
    pub ext_wrench: Wrench,
    /// Spatial acceleration from the last forward-dynamics call,
    /// world-origin referenced.
    pub accel: SpatialVector,
    /// Contact response class.
    pub compliance: Compliance,
    /// Collision geometries attached to this body.
    pub geoms: Vec<GeomId>,
    /// Parent link index when part of an articulated body.
    pub parent_link: Option<usize>,
    /// Inbound joint index when part of an articulated body.
    pub inbound_joint: Option<usize>,
    /// Static bodies never move and have no dynamics.
    pub is_static: bool,
}

impl RigidBody {
    /// Create a dynamic body with the given mass properties.
    #[must_use]
    pub fn new(id: BodyId, pose: Pose, mass: f64, inertia_body: Matrix3<f64>) -> Self {
        Self {
            id,
            pose,
            velocity: Twist::zero(),
            mass,
            inertia_body,
            com_local: Vector3::zeros(),
            ext_wrench: Wrench::zero(),
            accel: SpatialVector::zeros(),
            compliance: Compliance::Rigid,
            geoms: Vec::new(),
            parent_link: None,
            inbound_joint: None,
            is_static: false,
        }
    }

    /// Create a static body (infinite effective mass, never integrated).
    #[must_use]
    pub fn new_static(id: BodyId, pose: Pose) -> Self {
        let mut body = Self::new(id, pose, 0.0, Matrix3::zeros());
        body.is_static = true;
        body
    }

    /// Create a dynamic body with the mass properties of a solid sphere.
    #[must_use]
    pub fn sphere(id: BodyId, pose: Pose, mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self::new(id, pose, mass, Matrix3::identity() * i)
    }

    /// Create a dynamic body with the mass properties of a solid box.
    #[must_use]
    pub fn cuboid(id: BodyId, pose: Pose, mass: f64, half_extents: Vector3<f64>) -> Self {
        let f = mass / 3.0;
        let (x2, y2, z2) = (
            half_extents.x * half_extents.x,
            half_extents.y * half_extents.y,
            half_extents.z * half_extents.z,
        );
        Self::new(
            id,
            pose,
            mass,
            Matrix3::from_diagonal(&Vector3::new(f * (y2 + z2), f * (x2 + z2), f * (x2 + y2))),
        )
    }

    /// Set the COM offset in the body frame.
    #[must_use]
    pub fn with_com(mut self, com_local: Vector3<f64>) -> Self {
        self.com_local = com_local;
        self
    }

    /// Set the initial velocity.
    #[must_use]
    pub fn with_velocity(mut self, velocity: Twist) -> Self {
        self.velocity = velocity;
        self
    }

    /// Mark the body compliant.
    #[must_use]
    pub fn with_compliance(mut self, compliance: Compliance) -> Self {
        self.compliance = compliance;
        self
    }

    /// Attach a collision geometry id.
    pub fn attach_geom(&mut self, geom: GeomId) {
        self.geoms.push(geom);
    }

    /// Body mass.
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// COM position in world coordinates.
    #[must_use]
    pub fn com_world(&self) -> Point3<f64> {
        self.pose.transform_point(&Point3::from(self.com_local))
    }

    /// Rotational inertia about the COM, world axes.
    #[must_use]
    pub fn inertia_world(&self) -> Matrix3<f64> {
        let r = self.pose.rotation.to_rotation_matrix();
        r.matrix() * self.inertia_body * r.matrix().transpose()
    }

    /// Spatial inertia referenced at an arbitrary world point.
    ///
    /// The inertia frame tracks the body pose: the rotational block is the
    /// body inertia rotated into world axes at the current orientation.
    #[must_use]
    pub fn spatial_inertia_at(&self, reference: &Point3<f64>) -> SpatialInertia {
        SpatialInertia::from_mass_properties(
            self.mass,
            &self.inertia_world(),
            self.com_world() - reference,
        )
    }

    /// Isolated spatial inertia in the requested reference frame.
    ///
    /// `Global` is world axes about the world origin (the convention the
    /// dynamics recursions run in); `Link` is body axes about the body
    /// origin.
    #[must_use]
    pub fn spatial_iso_inertia(&self, frame: RefFrame) -> SpatialInertia {
        match frame {
            RefFrame::Global => self.spatial_inertia_at(&Point3::origin()),
            RefFrame::Link => {
                SpatialInertia::from_mass_properties(self.mass, &self.inertia_body, self.com_local)
            }
        }
    }

    /// Spatial velocity referenced at the world origin (`[ω, v₀]`).
    #[must_use]
    pub fn spatial_velocity_origin(&self) -> SpatialVector {
        self.velocity
            .at_point(&Point3::origin(), &self.pose.position)
            .to_spatial()
    }

    /// Overwrite the velocity from a world-origin-referenced spatial vector.
    pub fn set_spatial_velocity_origin(&mut self, v: &SpatialVector) {
        self.velocity = Twist::from_spatial(v).at_point(&self.pose.position, &Point3::origin());
    }

    /// Accumulated external wrench as a world-origin-referenced spatial
    /// force (`[τ₀, f]`).
    #[must_use]
    pub fn ext_wrench_origin(&self) -> SpatialVector {
        self.ext_wrench
            .at_point(&Point3::origin(), &self.pose.position)
            .to_spatial()
    }

    /// Apply a force at a world point.
    pub fn apply_force_at_point(&mut self, force: Vector3<f64>, point: &Point3<f64>) {
        self.ext_wrench
            .accumulate(&Wrench::from_force_at_point(force, point, &self.pose.position));
    }

    /// Apply a pure torque.
    pub fn apply_torque(&mut self, torque: Vector3<f64>) {
        self.ext_wrench.torque += torque;
    }

    /// Clear the accumulated wrench.
    pub fn clear_forces(&mut self) {
        self.ext_wrench = Wrench::zero();
    }

    /// Kinetic energy.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        if self.is_static {
            return 0.0;
        }
        let reference = self.pose.position;
        let inertia = SpatialInertia::from_mass_properties(
            self.mass,
            &self.inertia_world(),
            self.com_world() - reference,
        );
        inertia.kinetic_energy(&self.velocity.to_spatial())
    }

    /// Gravitational potential energy `-m g·com`.
    #[must_use]
    pub fn potential_energy(&self, gravity: &Vector3<f64>) -> f64 {
        -self.mass * gravity.dot(&self.com_world().coords)
    }

    /// Whether pose and velocity are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.pose.is_finite() && self.velocity.is_finite()
    }
}
