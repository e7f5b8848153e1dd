//! The collision world: geometry arena plus cached proximity state.
//!
//! [`CollisionWorld`] owns every collision geometry in the scene and the
//! per-step caches the driver consumes: the broadphase candidate pairs and
//! the pairwise distance snapshots. The driver refreshes geometry poses from
//! body state (`sync_geometry`), runs `broad_phase`, then
//! `calc_pairwise_distances`; everything downstream reads the cached PDIs.

use std::collections::HashMap;

use impetus_types::{BodyId, GeomId, Pose, Twist};
use tracing::trace;

use crate::broad_phase::broad_phase;
use crate::ca::calc_ca_euler_step;
use crate::contact::{find_contacts, ContactPoint};
use crate::geometry::CollisionGeometry;
use crate::pdi::PairwiseDistInfo;
use crate::query::calc_signed_dist;

/// Geometry arena and proximity caches.
#[derive(Debug, Default)]
pub struct CollisionWorld {
    geoms: Vec<CollisionGeometry>,
    index: HashMap<GeomId, usize>,
    pairs: Vec<(usize, usize)>,
    distances: Vec<PairwiseDistInfo>,
}

impl CollisionWorld {
    /// Create an empty collision world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a geometry. Ids must be unique; a duplicate replaces nothing
    /// and returns `false`.
    pub fn insert(&mut self, geom: CollisionGeometry) -> bool {
        if self.index.contains_key(&geom.id) {
            return false;
        }
        self.index.insert(geom.id, self.geoms.len());
        self.geoms.push(geom);
        true
    }

    /// Number of geometries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.geoms.len()
    }

    /// Whether the world has no geometries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geoms.is_empty()
    }

    /// Look up a geometry by id.
    #[must_use]
    pub fn geom(&self, id: GeomId) -> Option<&CollisionGeometry> {
        self.index.get(&id).map(|&i| &self.geoms[i])
    }

    /// Mutable lookup by id.
    pub fn geom_mut(&mut self, id: GeomId) -> Option<&mut CollisionGeometry> {
        self.index.get(&id).map(|&i| &mut self.geoms[i])
    }

    /// All geometries.
    #[must_use]
    pub fn geoms(&self) -> &[CollisionGeometry] {
        &self.geoms
    }

    /// Refresh cached world poses and twists from body state.
    pub fn sync_geometry(&mut self, mut body_state: impl FnMut(BodyId) -> Option<(Pose, Twist)>) {
        for geom in &mut self.geoms {
            if let Some((pose, twist)) = body_state(geom.body) {
                geom.sync(&pose, &twist);
            }
        }
    }

    /// Run the broadphase with the given time window, caching candidate
    /// pairs for the next distance refresh.
    pub fn broad_phase(&mut self, window: f64) {
        self.pairs = broad_phase(&self.geoms, window);
        trace!(pairs = self.pairs.len(), "broadphase");
    }

    /// Recompute pairwise distances for the cached broadphase pairs.
    pub fn calc_pairwise_distances(&mut self) -> &[PairwiseDistInfo] {
        self.distances.clear();
        for &(i, j) in &self.pairs {
            let (ga, gb) = (&self.geoms[i], &self.geoms[j]);
            if let Some(prox) =
                calc_signed_dist(&ga.shape, &ga.world_pose, &gb.shape, &gb.world_pose)
            {
                self.distances.push(PairwiseDistInfo {
                    geom_a: ga.id,
                    geom_b: gb.id,
                    dist: prox.dist,
                    point_a: prox.point_a,
                    point_b: prox.point_b,
                    normal: prox.normal,
                });
            }
        }
        &self.distances
    }

    /// The cached pairwise distances from the last refresh.
    #[must_use]
    pub fn pairwise_distances(&self) -> &[PairwiseDistInfo] {
        &self.distances
    }

    /// Minimum cached pairwise distance (infinity when no pairs).
    #[must_use]
    pub fn min_pairwise_dist(&self) -> f64 {
        self.distances
            .iter()
            .map(|p| p.dist)
            .fold(f64::INFINITY, f64::min)
    }

    /// Signed distance between two geometries by id.
    #[must_use]
    pub fn calc_signed_dist_pair(&self, a: GeomId, b: GeomId) -> Option<PairwiseDistInfo> {
        let ga = self.geom(a)?;
        let gb = self.geom(b)?;
        let prox = calc_signed_dist(&ga.shape, &ga.world_pose, &gb.shape, &gb.world_pose)?;
        Some(PairwiseDistInfo {
            geom_a: a,
            geom_b: b,
            dist: prox.dist,
            point_a: prox.point_a,
            point_b: prox.point_b,
            normal: prox.normal,
        })
    }

    /// Narrowphase contact generation for a pair by id.
    pub fn find_contacts_pair(
        &self,
        a: GeomId,
        b: GeomId,
        tol: f64,
        out: &mut Vec<ContactPoint>,
    ) {
        if let (Some(ga), Some(gb)) = (self.geom(a), self.geom(b)) {
            find_contacts(ga, gb, tol, out);
        }
    }

    /// Conservative-advancement bound for a cached pair.
    #[must_use]
    pub fn calc_ca_euler_step_pair(&self, pdi: &PairwiseDistInfo, thresh: f64) -> f64 {
        match (self.geom(pdi.geom_a), self.geom(pdi.geom_b)) {
            (Some(ga), Some(gb)) => calc_ca_euler_step(pdi, ga, gb, thresh),
            _ => f64::INFINITY,
        }
    }
}
