//! The time-stepping driver.
//!
//! [`Simulator`] owns the body arena, the collision world, and the per-step
//! pipeline:
//!
//! ```text
//! step(dt): broadphase → pairwise distances → step_si_euler(dt)
//!           → post-step callback → stabilization → telemetry
//! ```
//!
//! `step_si_euler` loops mini-steps until `dt` is consumed. Each mini-step
//! integrates positions under conservative advancement with velocities
//! frozen, computes forward dynamics (RNE-backed for articulated bodies),
//! integrates velocities semi-implicitly, optionally dissipates, and
//! resolves impacts with a pure-projection LCP.
//!
//! Everything mutable lives under exclusive ownership of the driver during a
//! step; callbacks run on the caller's thread at step and mini-step
//! boundaries, the only safe preemption points.

use std::collections::HashMap;

use impetus_body::{Compliance, DynamicBody, RigidBody};
use impetus_collision::{CollisionGeometry, CollisionWorld, Shape};
use impetus_constraint::{calc_impacting_constraint_forces, stabilize};
use impetus_types::{
    BodyId, CoordinateEncoding, DVector, GeomId, Pose, SimError, SimulatorConfig,
};
use nalgebra::{Point3, Vector3};
use tracing::{debug, trace, warn};

use crate::energy::body_energy;
use crate::telemetry::Telemetry;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Penalty model for compliant contacts.
///
/// Compliant pairs bypass the impulsive LCP and stabilization entirely;
/// a spring-damper force at each penetrating contact resists further
/// interpenetration instead.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactParams {
    /// Penalty spring stiffness (N/m).
    pub stiffness: f64,
    /// Penalty damping along the normal (N·s/m).
    pub damping: f64,
}

impl Default for ContactParams {
    fn default() -> Self {
        Self {
            stiffness: 1.0e4,
            damping: 1.0e2,
        }
    }
}

/// Callback invoked at step or mini-step boundaries.
pub type StepCallback = Box<dyn FnMut(&mut [DynamicBody], f64)>;

/// The rigid-multibody simulator.
pub struct Simulator {
    bodies: Vec<DynamicBody>,
    collision: CollisionWorld,
    config: SimulatorConfig,
    contact_params: ContactParams,
    current_time: f64,
    next_geom: u64,
    telemetry: Telemetry,
    post_step_callback: Option<StepCallback>,
    post_mini_step_callback: Option<StepCallback>,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("bodies", &self.bodies.len())
            .field("geoms", &self.collision.len())
            .field("current_time", &self.current_time)
            .finish_non_exhaustive()
    }
}

impl Simulator {
    /// Create a simulator with the given configuration.
    pub fn new(config: SimulatorConfig) -> Result<Self, SimError> {
        config.validate()?;
        let telemetry = Telemetry::open(&config.telemetry)?;
        Ok(Self {
            bodies: Vec::new(),
            collision: CollisionWorld::new(),
            config,
            contact_params: ContactParams::default(),
            current_time: 0.0,
            next_geom: 0,
            telemetry,
            post_step_callback: None,
            post_mini_step_callback: None,
        })
    }

    /// Set the compliant-contact penalty parameters.
    pub fn set_contact_params(&mut self, params: ContactParams) {
        self.contact_params = params;
    }

    /// Current simulation time.
    #[must_use]
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// The driver configuration.
    #[must_use]
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Add a free rigid body; returns its id.
    pub fn add_rigid_body(&mut self, body: RigidBody) -> BodyId {
        let id = body.id;
        self.bodies.push(DynamicBody::Rigid(body));
        id
    }

    /// Add an articulated body; returns its id.
    pub fn add_articulated_body(&mut self, body: impetus_body::ArticulatedBody) -> BodyId {
        let id = body.id;
        self.bodies.push(DynamicBody::Articulated(body));
        id
    }

    /// Attach a collision shape to a body (or link) with a pose offset.
    pub fn attach_geometry(
        &mut self,
        link: BodyId,
        shape: Shape,
        local_pose: Pose,
    ) -> Result<GeomId, SimError> {
        let compliant = self
            .bodies
            .iter()
            .find_map(|b| {
                b.link_ids()
                    .contains(&link)
                    .then(|| b.link_compliance(link) == Compliance::Compliant)
            })
            .ok_or(SimError::InvalidBodyId(link.raw()))?;

        let id = GeomId::new(self.next_geom);
        self.next_geom += 1;
        self.collision.insert(
            CollisionGeometry::new(id, link, shape)
                .with_local_pose(local_pose)
                .with_compliance(compliant),
        );
        Ok(id)
    }

    /// Borrow a body by id.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&DynamicBody> {
        self.bodies.iter().find(|b| b.id() == id)
    }

    /// Mutably borrow a body by id.
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut DynamicBody> {
        self.bodies.iter_mut().find(|b| b.id() == id)
    }

    /// All bodies.
    #[must_use]
    pub fn bodies(&self) -> &[DynamicBody] {
        &self.bodies
    }

    /// The collision world.
    #[must_use]
    pub fn collision(&self) -> &CollisionWorld {
        &self.collision
    }

    /// Install a post-step callback.
    pub fn set_post_step_callback(&mut self, cb: StepCallback) {
        self.post_step_callback = Some(cb);
    }

    /// Install a post-mini-step callback.
    pub fn set_post_mini_step_callback(&mut self, cb: StepCallback) {
        self.post_mini_step_callback = Some(cb);
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// Returns the time actually stepped (equal to `dt` unless the mini-step
    /// loop had to give up early, which is logged).
    pub fn step(&mut self, dt: f64) -> Result<f64, SimError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SimError::invalid_config("step size must be positive"));
        }
        trace!(time = self.current_time, dt, "stepping");

        // Broadphase over the full window, then the initial distance
        // snapshot.
        self.sync_collision();
        self.collision.broad_phase(dt);
        self.collision.calc_pairwise_distances();

        let stepped = self.step_si_euler(dt)?;

        if let Some(mut cb) = self.post_step_callback.take() {
            cb(&mut self.bodies, self.current_time);
            self.post_step_callback = Some(cb);
        }

        stabilize(&mut self.bodies, &mut self.collision, &self.config);

        self.record_telemetry()?;

        // Accumulated wrenches act for one step.
        for body in &mut self.bodies {
            body.clear_forces();
        }

        Ok(stepped)
    }

    /// Semi-implicit Euler with conservative advancement: run mini-steps
    /// until `dt` is consumed.
    fn step_si_euler(&mut self, dt: f64) -> Result<f64, SimError> {
        let mut h = 0.0;
        let mut zero_steps = 0usize;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let max_mini_steps = (dt / self.config.min_step_size).ceil() as usize + 16;

        for _ in 0..max_mini_steps {
            if h >= dt {
                break;
            }
            let advanced = self.do_mini_step(dt - h)?;
            h += advanced;

            if advanced == 0.0 {
                zero_steps += 1;
                if zero_steps > 8 {
                    warn!(h, dt, "mini-step made no progress; abandoning step");
                    break;
                }
            } else {
                zero_steps = 0;
            }
        }
        Ok(h)
    }

    /// One integration cycle (not necessarily the full remaining step).
    #[allow(clippy::too_many_lines)]
    fn do_mini_step(&mut self, remaining: f64) -> Result<f64, SimError> {
        // Snapshot generalized coordinates and the proximity state.
        let q_save: Vec<DVector<f64>> = self
            .bodies
            .iter()
            .map(|b| b.get_generalized_coordinates(CoordinateEncoding::Euler))
            .collect();
        let pdi_save: Vec<impetus_collision::PairwiseDistInfo> =
            self.collision.pairwise_distances().to_vec();

        // Position-integration loop under conservative advancement; the
        // velocities stay frozen throughout.
        let mut h = 0.0;
        while h < remaining {
            self.sync_collision();
            self.collision.broad_phase(remaining - h);
            self.collision.calc_pairwise_distances();

            let ca_step = self.calc_next_ca_euler_step(self.config.contact_dist_thresh);
            if ca_step <= 0.0 {
                // Impact imminent right now: stop integrating positions.
                break;
            }
            let tc = ca_step
                .max(self.config.min_step_size)
                .min(remaining - h);
            if tc <= 0.0 {
                break;
            }
            trace!(tc, "conservative advancement step");

            for (i, body) in self.bodies.iter_mut().enumerate() {
                if body.is_static() {
                    continue;
                }
                body.set_generalized_coordinates(CoordinateEncoding::Euler, &q_save[i]);
                let qd_euler = body.get_generalized_velocity(CoordinateEncoding::Euler);
                let q_new = &q_save[i] + qd_euler * (h + tc);
                body.set_generalized_coordinates(CoordinateEncoding::Euler, &q_new);
            }
            h += tc;
        }
        trace!(h, "position integration ended");

        for body in &self.bodies {
            if !body.coordinates_finite() {
                return Err(SimError::InvalidState { body: body.id() });
            }
        }

        // Refresh proximity at the advanced configuration, then apply
        // compliant penalty forces before computing accelerations.
        self.sync_collision();
        self.collision.broad_phase(0.0);
        self.collision.calc_pairwise_distances();
        self.apply_compliant_contact_forces();

        // Forward dynamics and the semi-implicit velocity update.
        let gravity = self.config.gravity;
        for body in &mut self.bodies {
            if body.is_static() {
                continue;
            }
            body.forward_dynamics(&gravity);
            body.integrate_velocity(h);
        }

        for body in &self.bodies {
            if !body.velocities_finite() {
                return Err(SimError::InvalidVelocity { body: body.id() });
            }
        }

        if let Some(dissipation) = self.config.dissipation {
            self.apply_dissipation(&dissipation, h);
        }

        // Impulsive resolution of any remaining approach velocities; -1.0 is
        // the pure-projection sentinel.
        self.sync_collision();
        self.collision.calc_pairwise_distances();
        calc_impacting_constraint_forces(
            &mut self.bodies,
            &self.collision,
            -1.0,
            self.config.contact_dist_thresh,
            self.config.impact_vel_tol,
            &self.config.lcp,
        )?;

        // Penetration must not have deepened across the mini-step.
        if let Some(worsened) = self.constraints_violated(&pdi_save) {
            return Err(SimError::ImpactToleranceExceeded {
                residual: worsened,
                tolerance: impetus_types::NEAR_ZERO,
            });
        }

        self.current_time += h;
        if let Some(mut cb) = self.post_mini_step_callback.take() {
            cb(&mut self.bodies, self.current_time);
            self.post_mini_step_callback = Some(cb);
        }

        Ok(h)
    }

    /// Check whether any already-penetrating non-compliant pair sank deeper
    /// than the tolerance across the mini-step; returns the worst deepening.
    fn constraints_violated(
        &self,
        previous: &[impetus_collision::PairwiseDistInfo],
    ) -> Option<f64> {
        let mut worst: Option<f64> = None;
        for prev in previous {
            if prev.dist >= 0.0 {
                continue;
            }
            let (Some(ga), Some(gb)) = (
                self.collision.geom(prev.geom_a),
                self.collision.geom(prev.geom_b),
            ) else {
                continue;
            };
            if ga.compliant || gb.compliant {
                continue;
            }
            let Some(now) = self
                .collision
                .pairwise_distances()
                .iter()
                .find(|p| p.geom_a == prev.geom_a && p.geom_b == prev.geom_b)
            else {
                continue;
            };
            if now.dist < prev.dist - impetus_types::NEAR_ZERO {
                let deepening = prev.dist - now.dist;
                warn!(
                    geom_a = %prev.geom_a,
                    geom_b = %prev.geom_b,
                    deepening,
                    "penetration deepened across mini-step"
                );
                worst = Some(worst.map_or(deepening, |w: f64| w.max(deepening)));
            }
        }
        worst
    }

    /// Smallest time-to-event across joint limits and approaching geometry
    /// pairs; infinity when nothing is imminent.
    fn calc_next_ca_euler_step(&self, contact_dist_thresh: f64) -> f64 {
        let mut next_event = f64::INFINITY;

        // Joint DOFs approaching their limits at the current rates.
        for body in &self.bodies {
            let DynamicBody::Articulated(ab) = body else {
                continue;
            };
            for joint in ab.joints() {
                for d in 0..joint.dof() {
                    let (q, qd) = (joint.q[d], joint.qd[d]);
                    if qd > 0.0 && joint.hi[d].is_finite() {
                        if q < joint.hi[d] {
                            next_event = next_event.min((joint.hi[d] - q) / qd);
                        } else if qd > impetus_types::NEAR_ZERO {
                            // At (or past) the bound and still pressing.
                            next_event = 0.0;
                        }
                    }
                    if qd < 0.0 && joint.lo[d].is_finite() {
                        if q > joint.lo[d] {
                            next_event = next_event.min((joint.lo[d] - q) / qd);
                        } else if qd < -impetus_types::NEAR_ZERO {
                            next_event = 0.0;
                        }
                    }
                }
            }
        }

        // Rigid-rigid pairs approaching contact (compliant pairs exempt).
        for pdi in self.collision.pairwise_distances() {
            let (Some(ga), Some(gb)) = (
                self.collision.geom(pdi.geom_a),
                self.collision.geom(pdi.geom_b),
            ) else {
                continue;
            };
            if ga.compliant || gb.compliant {
                continue;
            }
            next_event =
                next_event.min(self.collision.calc_ca_euler_step_pair(pdi, contact_dist_thresh));
        }

        next_event
    }

    /// Spring-damper penalty forces for penetrating compliant pairs.
    fn apply_compliant_contact_forces(&mut self) {
        struct Penalty {
            link_a: BodyId,
            link_b: BodyId,
            point: Point3<f64>,
            force: Vector3<f64>,
        }

        let links: HashMap<BodyId, usize> = self
            .bodies
            .iter()
            .enumerate()
            .flat_map(|(i, b)| b.link_ids().into_iter().map(move |l| (l, i)))
            .collect();

        let mut penalties = Vec::new();
        for pdi in self.collision.pairwise_distances() {
            if !pdi.is_penetrating() {
                continue;
            }
            let (Some(ga), Some(gb)) = (
                self.collision.geom(pdi.geom_a),
                self.collision.geom(pdi.geom_b),
            ) else {
                continue;
            };
            if !(ga.compliant || gb.compliant) {
                continue;
            }

            let depth = -pdi.dist;
            let v_a = ga.velocity_at(&pdi.point_a).linear;
            let v_b = gb.velocity_at(&pdi.point_b).linear;
            // Separation rate along the normal (normal points from B to A).
            let v_n = pdi.normal.dot(&(v_a - v_b));
            let magnitude =
                (self.contact_params.stiffness * depth - self.contact_params.damping * v_n)
                    .max(0.0);
            if magnitude == 0.0 {
                continue;
            }
            penalties.push(Penalty {
                link_a: ga.body,
                link_b: gb.body,
                point: pdi.point_a,
                force: pdi.normal * magnitude,
            });
        }

        for p in penalties {
            if let Some(&i) = links.get(&p.link_a) {
                self.bodies[i].apply_force_at_link(p.link_a, p.force, &p.point);
            }
            if let Some(&i) = links.get(&p.link_b) {
                self.bodies[i].apply_force_at_link(p.link_b, -p.force, &p.point);
            }
        }
    }

    /// Post-integration velocity dissipation.
    fn apply_dissipation(&mut self, d: &impetus_types::DissipationConfig, h: f64) {
        let f_lin = (1.0 - d.linear * h).max(0.0);
        let f_ang = (1.0 - d.angular * h).max(0.0);
        for body in &mut self.bodies {
            match body {
                DynamicBody::Rigid(b) => {
                    if b.is_static {
                        continue;
                    }
                    b.velocity.linear *= f_lin;
                    b.velocity.angular *= f_ang;
                }
                DynamicBody::Articulated(ab) => {
                    if ab.is_floating_base() {
                        let base = &mut ab.links_mut()[0];
                        base.velocity.linear *= f_lin;
                        base.velocity.angular *= f_ang;
                    }
                    for joint in ab.joints_mut() {
                        for dof in 0..joint.dof() {
                            joint.qd[dof] *= f_ang;
                        }
                    }
                    ab.update_kinematics();
                }
            }
        }
    }

    /// Push body poses and twists into the collision geometry cache.
    fn sync_collision(&mut self) {
        let states: HashMap<BodyId, (Pose, impetus_types::Twist)> = self
            .bodies
            .iter()
            .flat_map(|b| {
                b.link_ids()
                    .into_iter()
                    .filter_map(move |l| b.link_state(l).map(|s| (l, s)))
            })
            .collect();
        self.collision
            .sync_geometry(|id| states.get(&id).copied());
    }

    /// Record the per-step telemetry channels.
    fn record_telemetry(&mut self) -> Result<(), SimError> {
        if let Some(id) = self.telemetry.energy_body() {
            if let Some(body) = self.bodies.iter().find(|b| b.id() == id) {
                let (ke, pe) = body_energy(body, &self.config.gravity);
                self.telemetry.record_energy(ke, pe)?;
            }
        }

        // Constraint-violation metric: min(0, min pairwise gap).
        let min_gap = self.collision.min_pairwise_dist();
        let violation = if min_gap.is_finite() {
            min_gap.min(0.0)
        } else {
            0.0
        };
        debug!(violation, "constraint violation");
        self.telemetry.record_cvio(violation)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use impetus_types::Twist;

    #[test]
    fn test_empty_world_advances_time() {
        let mut sim = Simulator::new(SimulatorConfig::default()).unwrap();
        let stepped = sim.step(0.01).unwrap();
        assert_relative_eq!(stepped, 0.01, epsilon = 1e-12);
        assert_relative_eq!(sim.current_time(), 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_free_fall_matches_closed_form() {
        let mut sim = Simulator::new(SimulatorConfig::default()).unwrap();
        sim.add_rigid_body(RigidBody::sphere(
            BodyId::new(0),
            Pose::from_position(Point3::new(0.0, 0.0, 10.0)),
            1.0,
            0.5,
        ));
        for _ in 0..100 {
            sim.step(1e-3).unwrap();
        }
        let DynamicBody::Rigid(b) = sim.body(BodyId::new(0)).unwrap() else {
            unreachable!()
        };
        // Positions integrate with the previous step's velocity, so after n
        // steps z = z0 - g·h²·n(n-1)/2.
        let expected = 10.0 - 9.81 * 1e-6 * (100.0 * 99.0) / 2.0;
        assert_relative_eq!(b.pose.position.z, expected, epsilon = 1e-6);
        assert_relative_eq!(b.velocity.linear.z, -9.81 * 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_dt_rejected() {
        let mut sim = Simulator::new(SimulatorConfig::default()).unwrap();
        assert!(sim.step(0.0).is_err());
        assert!(sim.step(f64::NAN).is_err());
    }

    #[test]
    fn test_nan_state_surfaces_with_body_id() {
        let mut sim = Simulator::new(SimulatorConfig::default()).unwrap();
        let id = sim.add_rigid_body(RigidBody::sphere(
            BodyId::new(3),
            Pose::identity(),
            1.0,
            0.5,
        ));
        if let Some(DynamicBody::Rigid(b)) = sim.body_mut(id) {
            b.velocity = Twist::from_linear(Vector3::new(f64::NAN, 0.0, 0.0));
        }
        let err = sim.step(1e-3).unwrap_err();
        match err {
            SimError::InvalidState { body } | SimError::InvalidVelocity { body } => {
                assert_eq!(body, BodyId::new(3));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_mini_step_callback_fires() {
        let mut sim = Simulator::new(SimulatorConfig::default()).unwrap();
        sim.add_rigid_body(RigidBody::sphere(
            BodyId::new(0),
            Pose::identity(),
            1.0,
            0.5,
        ));
        let count = std::rc::Rc::new(std::cell::Cell::new(0usize));
        let count_cb = count.clone();
        sim.set_post_mini_step_callback(Box::new(move |_, _| {
            count_cb.set(count_cb.get() + 1);
        }));
        sim.step(1e-3).unwrap();
        assert!(count.get() >= 1);
    }

    #[test]
    fn test_dissipation_damps_velocity() {
        let config = SimulatorConfig::default()
            .zero_gravity()
            .with_dissipation(impetus_types::DissipationConfig::new(1.0, 1.0));
        let mut sim = Simulator::new(config).unwrap();
        sim.add_rigid_body(
            RigidBody::sphere(BodyId::new(0), Pose::identity(), 1.0, 0.5)
                .with_velocity(Twist::from_linear(Vector3::new(10.0, 0.0, 0.0))),
        );
        for _ in 0..100 {
            sim.step(1e-2).unwrap();
        }
        let DynamicBody::Rigid(b) = sim.body(BodyId::new(0)).unwrap() else {
            unreachable!()
        };
        assert!(b.velocity.linear.x < 10.0);
        assert!(b.velocity.linear.x > 0.0);
    }
}
