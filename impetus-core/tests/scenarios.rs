//! End-to-end scenario tests for the contact-dynamics pipeline.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;

use approx::assert_relative_eq;
use impetus_body::{ArticulatedBody, DynamicBody, RigidBody};
use impetus_collision::Shape;
use impetus_constraint::{
    assemble_island, collect_constraints, lcp_lemke, partition_islands, solve_island_impacts,
};
use impetus_core::{total_energy, Simulator};
use impetus_types::{
    BodyId, CoordinateEncoding, DMatrix, DVector, Pose, SimulatorConfig, Twist,
};
use nalgebra::{Point3, Vector3};

fn sphere_on_plane_sim(drop_height: f64) -> Simulator {
    let mut sim = Simulator::new(SimulatorConfig::default()).unwrap();
    let ground = sim.add_rigid_body(RigidBody::new_static(BodyId::new(0), Pose::identity()));
    sim.attach_geometry(ground, Shape::Plane, Pose::identity())
        .unwrap();
    let ball = sim.add_rigid_body(RigidBody::sphere(
        BodyId::new(1),
        Pose::from_position(Point3::new(0.0, 0.0, drop_height)),
        1.0,
        0.5,
    ));
    sim.attach_geometry(ball, Shape::sphere(0.5), Pose::identity())
        .unwrap();
    sim
}

/// Scenario 1: a sphere dropped from 2 m settles on the plane with its
/// center at the radius and negligible vertical velocity.
#[test]
fn scenario_free_falling_sphere_onto_plane() {
    let mut sim = sphere_on_plane_sim(2.0);
    for _ in 0..2000 {
        sim.step(1e-3).unwrap();
    }
    let DynamicBody::Rigid(ball) = sim.body(BodyId::new(1)).unwrap() else {
        unreachable!()
    };
    assert!(
        (ball.pose.position.z - 0.5).abs() <= 1e-3,
        "sphere should settle at z = 0.5, got {}",
        ball.pose.position.z
    );
    assert!(
        ball.velocity.linear.z.abs() <= 1e-3,
        "post-settlement vertical velocity {} too large",
        ball.velocity.linear.z
    );
}

/// Scenario 2: a frictionless pendulum's total energy drifts by at most 5%
/// over ten seconds of semi-implicit integration.
#[test]
fn scenario_pendulum_energy_drift() {
    let mut sim = Simulator::new(SimulatorConfig::default()).unwrap();
    let mut ab = ArticulatedBody::pendulum(
        BodyId::new(10),
        BodyId::new(0),
        BodyId::new(1),
        Point3::origin(),
        1.0,
        1.0,
    );
    ab.joints_mut()[0].q[0] = std::f64::consts::FRAC_PI_4;
    ab.update_kinematics();
    sim.add_articulated_body(ab);

    let e0 = {
        let (ke, pe) = total_energy(sim.bodies(), &sim.config().gravity);
        ke + pe
    };
    for _ in 0..10_000 {
        sim.step(1e-3).unwrap();
    }
    let (ke, pe) = total_energy(sim.bodies(), &sim.config().gravity);
    let drift = ((ke + pe) - e0).abs() / e0.abs();
    assert!(drift <= 0.05, "energy drift {drift} exceeds 5%");
}

/// Scenario 3: a unit box resting on the plane reports four contacts, all
/// impulses nonnegative, and the normal impulses balance one step of
/// gravity within 1%.
#[test]
fn scenario_box_resting_on_plane() {
    let dt = 1e-3;
    let mut sim = Simulator::new(SimulatorConfig::default()).unwrap();
    let ground = sim.add_rigid_body(RigidBody::new_static(BodyId::new(0), Pose::identity()));
    sim.attach_geometry(ground, Shape::Plane, Pose::identity())
        .unwrap();
    let cube = sim.add_rigid_body(RigidBody::cuboid(
        BodyId::new(1),
        Pose::from_position(Point3::new(0.0, 0.0, 0.5 + 5e-5)),
        1.0,
        Vector3::new(0.5, 0.5, 0.5),
    ));
    sim.attach_geometry(cube, Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)), Pose::identity())
        .unwrap();

    for _ in 0..1000 {
        sim.step(dt).unwrap();
    }
    let DynamicBody::Rigid(b) = sim.body(BodyId::new(1)).unwrap() else {
        unreachable!()
    };
    assert!(
        (b.pose.position.z - 0.5).abs() <= 2e-3,
        "box should rest at z = 0.5, got {}",
        b.pose.position.z
    );

    // Four face-down contacts at the resting configuration.
    let constraints = collect_constraints(
        sim.bodies(),
        sim.collision(),
        sim.config().contact_dist_thresh,
    );
    assert_eq!(constraints.len(), 4, "expected four corner contacts");

    // Solve one impact round at the resting state with one step of gravity
    // accumulated: the impulses are nonnegative and sum to m·g·dt.
    let mut bodies: Vec<DynamicBody> = sim.bodies().to_vec();
    for body in &mut bodies {
        if let DynamicBody::Rigid(rb) = body {
            if !rb.is_static {
                rb.velocity = Twist::from_linear(Vector3::new(0.0, 0.0, -9.81 * dt));
            }
        }
    }
    let statics: Vec<BodyId> = bodies
        .iter()
        .filter(|b| b.is_static())
        .map(DynamicBody::id)
        .collect();
    let islands = partition_islands(&constraints, |id| statics.contains(&id));
    assert_eq!(islands.len(), 1);
    let refs: HashMap<BodyId, &DynamicBody> = bodies.iter().map(|b| (b.id(), b)).collect();
    let problem = assemble_island(&islands[0], &constraints, &refs);
    let z = solve_island_impacts(&problem, -1.0, &sim.config().lcp).unwrap();

    assert!(z.min() >= -1e-9, "impulses must be nonnegative");
    let total: f64 = z.iter().sum();
    let expected = 9.81 * dt;
    assert!(
        (total - expected).abs() / expected <= 0.01,
        "impulse sum {total} should match m·g·dt = {expected} within 1%"
    );
}

/// Scenario 4: two stacked spheres settle at half-integer heights.
#[test]
fn scenario_stacked_spheres() {
    let mut sim = Simulator::new(SimulatorConfig::default()).unwrap();
    let ground = sim.add_rigid_body(RigidBody::new_static(BodyId::new(0), Pose::identity()));
    sim.attach_geometry(ground, Shape::Plane, Pose::identity())
        .unwrap();
    let lower = sim.add_rigid_body(RigidBody::sphere(
        BodyId::new(1),
        Pose::from_position(Point3::new(0.0, 0.0, 0.55)),
        1.0,
        0.5,
    ));
    sim.attach_geometry(lower, Shape::sphere(0.5), Pose::identity())
        .unwrap();
    let upper = sim.add_rigid_body(RigidBody::sphere(
        BodyId::new(2),
        Pose::from_position(Point3::new(0.0, 0.0, 1.65)),
        1.0,
        0.5,
    ));
    sim.attach_geometry(upper, Shape::sphere(0.5), Pose::identity())
        .unwrap();

    for _ in 0..2000 {
        sim.step(1e-3).unwrap();
    }

    let DynamicBody::Rigid(lo) = sim.body(BodyId::new(1)).unwrap() else {
        unreachable!()
    };
    let DynamicBody::Rigid(hi) = sim.body(BodyId::new(2)).unwrap() else {
        unreachable!()
    };
    assert!(
        (lo.pose.position.z - 0.5).abs() <= 1e-3,
        "lower sphere at {}",
        lo.pose.position.z
    );
    assert!(
        (hi.pose.position.z - 1.5).abs() <= 1e-3,
        "upper sphere at {}",
        hi.pose.position.z
    );
}

/// Scenario 5: a revolute joint driven at constant velocity saturates at
/// its upper limit, with the limit reported as a unilateral constraint.
#[test]
fn scenario_joint_limit_clamp() {
    let config = SimulatorConfig::default().zero_gravity();
    let mut sim = Simulator::new(config).unwrap();
    let mut ab = ArticulatedBody::pendulum(
        BodyId::new(10),
        BodyId::new(0),
        BodyId::new(1),
        Point3::origin(),
        1.0,
        1.0,
    );
    {
        let joint = &mut ab.joints_mut()[0];
        joint.lo[0] = -0.1;
        joint.hi[0] = 0.1;
    }
    ab.update_kinematics();
    let id = sim.add_articulated_body(ab);

    let eps = 1e-6;
    for _ in 0..500 {
        // Constant-velocity drive.
        if let Some(DynamicBody::Articulated(ab)) = sim.body_mut(id) {
            ab.joints_mut()[0].qd[0] = 1.0;
            ab.update_kinematics();
        }
        sim.step(1e-3).unwrap();

        let Some(DynamicBody::Articulated(ab)) = sim.body(id) else {
            unreachable!()
        };
        assert!(
            ab.joints()[0].q[0] <= 0.1 + eps,
            "q = {} exceeded the upper limit",
            ab.joints()[0].q[0]
        );
    }

    let Some(DynamicBody::Articulated(ab)) = sim.body(id) else {
        unreachable!()
    };
    assert_relative_eq!(ab.joints()[0].q[0], 0.1, epsilon = 1e-4);

    // The saturated joint is reported as a limit constraint.
    let constraints = collect_constraints(
        sim.bodies(),
        sim.collision(),
        sim.config().contact_dist_thresh,
    );
    assert!(constraints
        .iter()
        .any(|c| matches!(c, impetus_constraint::UnilateralConstraint::Limit { .. })));
}

/// Scenario 6: trivially feasible LCP solved with zero pivots.
#[test]
fn scenario_lcp_trivial_feasibility() {
    let m = DMatrix::identity(3, 3);
    let q = DVector::from_vec(vec![1.0, 2.0, 3.0]);
    let mut z = DVector::zeros(0);
    lcp_lemke(&m, &q, &mut z, 0.0, 0.0).unwrap();
    assert_eq!(z.len(), 3);
    assert_relative_eq!(z.norm(), 0.0, epsilon = 1e-14);
}

/// Island independence: solving two disjoint islands separately matches the
/// equivalent block-diagonal problem.
#[test]
fn island_independence_matches_block_diagonal() {
    // Two separated spheres approaching the same static plane.
    let mut bodies = vec![DynamicBody::Rigid(RigidBody::new_static(
        BodyId::new(0),
        Pose::identity(),
    ))];
    for (k, x) in [(1u64, 0.0), (2u64, 100.0)] {
        bodies.push(DynamicBody::Rigid(
            RigidBody::sphere(
                BodyId::new(k),
                Pose::from_position(Point3::new(x, 0.0, 0.5)),
                1.0,
                0.5,
            )
            .with_velocity(Twist::from_linear(Vector3::new(0.0, 0.0, -(k as f64)))),
        ));
    }

    let mut world = impetus_collision::CollisionWorld::new();
    world.insert(impetus_collision::CollisionGeometry::new(
        impetus_types::GeomId::new(0),
        BodyId::new(0),
        Shape::Plane,
    ));
    for k in 1..=2u64 {
        world.insert(impetus_collision::CollisionGeometry::new(
            impetus_types::GeomId::new(k),
            BodyId::new(k),
            Shape::sphere(0.5),
        ));
    }
    let links = impetus_constraint::link_map(&bodies);
    world.sync_geometry(|id| links.get(&id).and_then(|&(_, i)| bodies[i].link_state(id)));
    world.broad_phase(0.0);
    world.calc_pairwise_distances();

    let constraints = collect_constraints(&bodies, &world, 1e-3);
    assert_eq!(constraints.len(), 2);
    let islands = partition_islands(&constraints, |id| id == BodyId::new(0));
    assert_eq!(islands.len(), 2, "far-apart spheres are independent islands");

    let refs: HashMap<BodyId, &DynamicBody> = bodies.iter().map(|b| (b.id(), b)).collect();
    let mut per_island = Vec::new();
    let mut blocks = Vec::new();
    let mut rhs = Vec::new();
    for island in &islands {
        let problem = assemble_island(island, &constraints, &refs);
        let z = solve_island_impacts(&problem, -1.0, &impetus_types::LcpConfig::default()).unwrap();
        per_island.extend(z.iter().copied());
        blocks.push(problem.lcp_matrix());
        rhs.extend(problem.impact_rhs(-1.0).iter().copied());
    }

    // Equivalent block-diagonal problem solved in one shot.
    let n: usize = blocks.iter().map(DMatrix::nrows).sum();
    let mut mm = DMatrix::zeros(n, n);
    let mut at = 0;
    for b in &blocks {
        mm.view_mut((at, at), (b.nrows(), b.ncols())).copy_from(b);
        at += b.nrows();
    }
    let q = DVector::from_vec(rhs);
    let mut z = DVector::zeros(0);
    lcp_lemke(&mm, &q, &mut z, 0.0, 0.0).unwrap();

    for (i, &zi) in per_island.iter().enumerate() {
        assert_relative_eq!(z[i], zi, epsilon = 1e-8);
    }
}

/// Stabilization invariant: after a step the minimum pairwise gap clears
/// the stabilizer tolerance, and repeating it is idempotent.
#[test]
fn stabilization_non_penetration_invariant() {
    let mut sim = sphere_on_plane_sim(0.45); // start 5 cm sunk
    sim.step(1e-3).unwrap();
    let DynamicBody::Rigid(ball) = sim.body(BodyId::new(1)).unwrap() else {
        unreachable!()
    };
    assert!(
        ball.pose.position.z >= 0.5 - sim.config().stab_eps,
        "sphere still penetrating after stabilization: z = {}",
        ball.pose.position.z
    );
}

/// Compliant pairs bypass the impulsive solve and stabilization: a
/// compliant sphere sinks into the plane and is pushed back by penalty
/// forces instead of impulses.
#[test]
fn compliant_pair_uses_penalty_forces() {
    let mut sim = Simulator::new(SimulatorConfig::default()).unwrap();
    let ground = sim.add_rigid_body(RigidBody::new_static(BodyId::new(0), Pose::identity()));
    sim.attach_geometry(ground, Shape::Plane, Pose::identity())
        .unwrap();
    let ball = sim.add_rigid_body(
        RigidBody::sphere(
            BodyId::new(1),
            Pose::from_position(Point3::new(0.0, 0.0, 0.6)),
            1.0,
            0.5,
        )
        .with_compliance(impetus_body::Compliance::Compliant),
    );
    sim.attach_geometry(ball, Shape::sphere(0.5), Pose::identity())
        .unwrap();

    for _ in 0..2000 {
        sim.step(1e-3).unwrap();
    }
    let DynamicBody::Rigid(b) = sim.body(BodyId::new(1)).unwrap() else {
        unreachable!()
    };
    // Settles near the surface with the penalty spring carrying the weight
    // (m·g/k ≈ 1 mm of penetration).
    assert!(
        (b.pose.position.z - 0.5).abs() < 0.05,
        "compliant sphere should settle near the plane, got z = {}",
        b.pose.position.z
    );
}

/// Euler-coordinate get/set round trip is the identity.
#[test]
fn generalized_coordinate_roundtrip() {
    let mut body = DynamicBody::Rigid(
        RigidBody::sphere(
            BodyId::new(0),
            Pose::from_position_rotation(
                Point3::new(1.0, -2.0, 3.0),
                nalgebra::UnitQuaternion::from_euler_angles(0.4, -0.2, 1.1),
            ),
            1.0,
            0.5,
        ),
    );
    let q = body.get_generalized_coordinates(CoordinateEncoding::Euler);
    body.set_generalized_coordinates(CoordinateEncoding::Euler, &q);
    let q2 = body.get_generalized_coordinates(CoordinateEncoding::Euler);
    assert_relative_eq!((q2 - q).norm(), 0.0, epsilon = 1e-12);
}
