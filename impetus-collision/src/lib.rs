//! Collision shapes, proximity queries, and contact generation.
//!
//! This crate is the collision facade of the impetus pipeline. It owns:
//!
//! - [`Shape`] / [`CollisionGeometry`] - primitives and their scene instances
//! - [`broad_phase`] - velocity-expanded AABB sweep
//! - [`PairwiseDistInfo`] / [`CollisionWorld::calc_pairwise_distances`] -
//!   signed-distance snapshots per candidate pair
//! - [`calc_ca_euler_step`] - conservative advancement bounds
//! - [`find_contacts`] - narrowphase dispatch producing contact points with
//!   outward normals
//!
//! The crate never reaches into the body model; the driver pushes world poses
//! and twists down with [`CollisionWorld::sync_geometry`] before querying.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,  // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,      // mul_add style changes aren't always clearer
    clippy::missing_errors_doc,
)]

mod broad_phase;
mod ca;
mod contact;
mod geometry;
mod heightfield;
mod pdi;
mod query;
mod shape;
mod world;

pub use broad_phase::broad_phase;
pub use ca::calc_ca_euler_step;
pub use contact::{find_contacts, heightfield_generic, tangent_basis, ContactPoint};
pub use geometry::CollisionGeometry;
pub use heightfield::HeightField;
pub use pdi::PairwiseDistInfo;
pub use query::{calc_signed_dist, Proximity};
pub use shape::{Aabb, Shape, ShapeTag};
pub use world::CollisionWorld;
