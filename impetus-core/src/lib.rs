//! Time-stepping driver for the impetus rigid-multibody simulator.
//!
//! This crate orchestrates the pipeline: broadphase and pairwise distances
//! from `impetus-collision`, forward dynamics from `impetus-body`, the
//! impulsive solve and stabilization from `impetus-constraint`, plus the
//! compliant-contact penalty model, dissipation, energy accounting, and
//! append-only telemetry.
//!
//! # Quick Start
//!
//! ```
//! use impetus_core::Simulator;
//! use impetus_body::RigidBody;
//! use impetus_collision::Shape;
//! use impetus_types::{BodyId, Pose, SimulatorConfig, Point3};
//!
//! let mut sim = Simulator::new(SimulatorConfig::default())?;
//!
//! // Ground plane and a sphere dropped from 2 m.
//! let ground = sim.add_rigid_body(RigidBody::new_static(BodyId::new(0), Pose::identity()));
//! sim.attach_geometry(ground, Shape::Plane, Pose::identity())?;
//! let ball = sim.add_rigid_body(RigidBody::sphere(
//!     BodyId::new(1),
//!     Pose::from_position(Point3::new(0.0, 0.0, 2.0)),
//!     1.0,
//!     0.5,
//! ));
//! sim.attach_geometry(ball, Shape::sphere(0.5), Pose::identity())?;
//!
//! for _ in 0..10 {
//!     sim.step(1e-3)?;
//! }
//! # Ok::<(), impetus_types::SimError>(())
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
)]

mod energy;
mod simulator;
mod telemetry;

pub use energy::{body_energy, total_energy};
pub use simulator::{ContactParams, Simulator, StepCallback};
pub use telemetry::Telemetry;
