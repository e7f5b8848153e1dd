//! Broadphase pair pruning.
//!
//! Sweep-and-prune over velocity-expanded world AABBs: each geometry's box is
//! grown by the distance it can travel within the query window, boxes are
//! sorted along X, and only interval-overlapping candidates are tested on
//! the remaining axes. Pairs on the same body and pairs of two unbounded
//! shapes are never reported.

use crate::geometry::CollisionGeometry;
use crate::shape::Aabb;

/// Static AABB inflation keeping resting-contact pairs (separated by up to
/// the contact threshold) in the candidate set even at zero velocity.
const AABB_MARGIN: f64 = 1e-3;

/// Candidate geometry pairs (indices into `geoms`, `i < j`) whose expanded
/// AABBs overlap within the time window.
#[must_use]
pub fn broad_phase(geoms: &[CollisionGeometry], window: f64) -> Vec<(usize, usize)> {
    let mut boxes: Vec<(usize, Aabb)> = geoms
        .iter()
        .enumerate()
        .filter(|(_, g)| g.enabled)
        .map(|(i, g)| (i, expanded_aabb(g, window)))
        .collect();

    boxes.sort_by(|a, b| a.1.min.x.total_cmp(&b.1.min.x));

    let mut pairs = Vec::new();
    for i in 0..boxes.len() {
        let (idx_i, box_i) = &boxes[i];
        for (idx_j, box_j) in boxes.iter().skip(i + 1) {
            // Sorted sweep: once the next interval starts past this one's
            // end, no later interval can overlap either.
            if box_j.min.x > box_i.max.x {
                break;
            }
            let gi = &geoms[*idx_i];
            let gj = &geoms[*idx_j];
            if gi.body == gj.body {
                continue;
            }
            if gi.is_unbounded() && gj.is_unbounded() {
                continue;
            }
            if box_i.overlaps(box_j) {
                let (a, b) = if idx_i < idx_j {
                    (*idx_i, *idx_j)
                } else {
                    (*idx_j, *idx_i)
                };
                pairs.push((a, b));
            }
        }
    }
    pairs
}

fn expanded_aabb(g: &CollisionGeometry, window: f64) -> Aabb {
    let r = g.shape.bounding_radius();
    let swing = if r.is_finite() {
        g.twist.angular.norm() * r
    } else {
        0.0
    };
    let margin = (g.twist.linear.norm() + swing) * window.max(0.0);
    g.aabb().expanded(margin + AABB_MARGIN)
}
