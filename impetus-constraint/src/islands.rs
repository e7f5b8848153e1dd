//! Constraint island partitioning.
//!
//! Islands are maximal groups of unilateral constraints whose super-body
//! sets intersect; each island is an independent LCP subproblem. Detection
//! is union-find over super-body ids with path compression and union by
//! rank. Static super-bodies never connect constraints: an immobile ground
//! shared by two otherwise-unrelated piles must not merge their islands.

use std::collections::HashMap;

use impetus_types::BodyId;

use crate::unilateral::UnilateralConstraint;

/// One island: the dynamic super-bodies involved and the constraints that
/// couple them.
#[derive(Debug, Clone)]
pub struct Island {
    /// Dynamic super-bodies, sorted by id to pin the matrix layout.
    pub super_bodies: Vec<BodyId>,
    /// Indices into the constraint list this island owns.
    pub constraint_indices: Vec<usize>,
}

impl Island {
    /// Number of constraints in the island.
    #[must_use]
    pub fn num_constraints(&self) -> usize {
        self.constraint_indices.len()
    }
}

/// Partition constraints into independent islands.
///
/// `is_static` marks super-bodies that cannot move; they are excluded from
/// the connectivity graph and from the islands' super-body lists.
#[must_use]
pub fn partition_islands(
    constraints: &[UnilateralConstraint],
    mut is_static: impl FnMut(BodyId) -> bool,
) -> Vec<Island> {
    if constraints.is_empty() {
        return Vec::new();
    }

    // Index the dynamic super-bodies.
    let mut body_ids: Vec<BodyId> = Vec::new();
    let mut body_to_index: HashMap<BodyId, usize> = HashMap::new();
    for c in constraints {
        for sb in c.super_bodies() {
            if is_static(sb) {
                continue;
            }
            body_to_index.entry(sb).or_insert_with(|| {
                body_ids.push(sb);
                body_ids.len() - 1
            });
        }
    }

    let mut uf = UnionFind::new(body_ids.len());
    for c in constraints {
        let dynamic: Vec<usize> = c
            .super_bodies()
            .into_iter()
            .filter_map(|sb| body_to_index.get(&sb).copied())
            .collect();
        for pair in dynamic.windows(2) {
            uf.union(pair[0], pair[1]);
        }
    }

    // Group super-bodies by root.
    let mut root_to_island: HashMap<usize, usize> = HashMap::new();
    let mut islands: Vec<Island> = Vec::new();
    for (idx, &id) in body_ids.iter().enumerate() {
        let root = uf.find(idx);
        let island = *root_to_island.entry(root).or_insert_with(|| {
            islands.push(Island {
                super_bodies: Vec::new(),
                constraint_indices: Vec::new(),
            });
            islands.len() - 1
        });
        islands[island].super_bodies.push(id);
    }

    // Assign constraints to the island of their first dynamic super-body.
    // A constraint with no dynamic participant is dropped (nothing to solve).
    for (ci, c) in constraints.iter().enumerate() {
        let Some(&idx) = c
            .super_bodies()
            .iter()
            .find_map(|sb| body_to_index.get(sb))
        else {
            continue;
        };
        let root = uf.find(idx);
        let island = root_to_island[&root];
        islands[island].constraint_indices.push(ci);
    }

    for island in &mut islands {
        island.super_bodies.sort();
        island.super_bodies.dedup();
    }
    islands.retain(|i| !i.constraint_indices.is_empty());
    islands
}

/// Union-Find (disjoint-set union) with path compression and union by rank.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, x: usize, y: usize) {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x == root_y {
            return;
        }
        match self.rank[root_x].cmp(&self.rank[root_y]) {
            std::cmp::Ordering::Less => self.parent[root_x] = root_y,
            std::cmp::Ordering::Greater => self.parent[root_y] = root_x,
            std::cmp::Ordering::Equal => {
                self.parent[root_y] = root_x;
                self.rank[root_x] += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use impetus_body::LimitSide;
    use nalgebra::{Point3, Vector3};

    fn contact(a: u64, b: u64) -> UnilateralConstraint {
        UnilateralConstraint::Contact {
            geom_a: impetus_types::GeomId::new(a),
            geom_b: impetus_types::GeomId::new(b),
            link_a: BodyId::new(a),
            link_b: BodyId::new(b),
            super_a: BodyId::new(a),
            super_b: BodyId::new(b),
            point: Point3::origin(),
            normal: Vector3::z(),
            tangents: (Vector3::x(), Vector3::y()),
            gap: 0.0,
        }
    }

    fn limit(body: u64) -> UnilateralConstraint {
        UnilateralConstraint::Limit {
            super_body: BodyId::new(body),
            joint: 0,
            dof: 0,
            side: LimitSide::Upper,
            violation: 0.1,
        }
    }

    #[test]
    fn test_chain_is_one_island() {
        let constraints = vec![contact(0, 1), contact(1, 2)];
        let islands = partition_islands(&constraints, |_| false);
        assert_eq!(islands.len(), 1);
        assert_eq!(islands[0].super_bodies.len(), 3);
        assert_eq!(islands[0].num_constraints(), 2);
    }

    #[test]
    fn test_disjoint_pairs_are_two_islands() {
        let constraints = vec![contact(0, 1), contact(2, 3)];
        let islands = partition_islands(&constraints, |_| false);
        assert_eq!(islands.len(), 2);
    }

    #[test]
    fn test_static_ground_does_not_merge() {
        // Bodies 1 and 2 each touch static body 99; they stay separate.
        let constraints = vec![contact(1, 99), contact(2, 99)];
        let islands = partition_islands(&constraints, |id| id == BodyId::new(99));
        assert_eq!(islands.len(), 2);
        for island in &islands {
            assert_eq!(island.super_bodies.len(), 1);
            assert!(!island.super_bodies.contains(&BodyId::new(99)));
        }
    }

    #[test]
    fn test_limit_joins_contact_island() {
        let constraints = vec![contact(0, 1), limit(1)];
        let islands = partition_islands(&constraints, |_| false);
        assert_eq!(islands.len(), 1);
        assert_eq!(islands[0].num_constraints(), 2);
    }

    #[test]
    fn test_super_bodies_sorted() {
        let constraints = vec![contact(5, 2), contact(2, 9)];
        let islands = partition_islands(&constraints, |_| false);
        assert_eq!(islands.len(), 1);
        let ids: Vec<u64> = islands[0].super_bodies.iter().map(|b| b.raw()).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn test_empty_input() {
        assert!(partition_islands(&[], |_| false).is_empty());
    }
}
