//! Energy queries.
//!
//! Kinetic energy is `½ v̂ᵀ Φ v̂` summed over the body's links; gravitational
//! potential energy is `-Σ mᵢ g·comᵢ` (so with `g = (0, 0, -9.81)` a raised
//! body stores positive energy).

use impetus_body::DynamicBody;
use nalgebra::Vector3;

/// Kinetic and potential energy of one dynamic body.
#[must_use]
pub fn body_energy(body: &DynamicBody, gravity: &Vector3<f64>) -> (f64, f64) {
    (body.kinetic_energy(), body.potential_energy(gravity))
}

/// Total kinetic and potential energy of a body set.
#[must_use]
pub fn total_energy(bodies: &[DynamicBody], gravity: &Vector3<f64>) -> (f64, f64) {
    bodies.iter().fold((0.0, 0.0), |(ke, pe), b| {
        let (bke, bpe) = body_energy(b, gravity);
        (ke + bke, pe + bpe)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use impetus_body::RigidBody;
    use impetus_types::{BodyId, Pose, Twist};
    use nalgebra::Point3;

    #[test]
    fn test_raised_body_stores_potential() {
        let body = DynamicBody::Rigid(RigidBody::sphere(
            BodyId::new(0),
            Pose::from_position(Point3::new(0.0, 0.0, 3.0)),
            2.0,
            0.5,
        ));
        let (ke, pe) = body_energy(&body, &Vector3::new(0.0, 0.0, -9.81));
        assert_relative_eq!(ke, 0.0, epsilon = 1e-12);
        assert_relative_eq!(pe, 2.0 * 9.81 * 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_moving_body_kinetic() {
        let body = DynamicBody::Rigid(
            RigidBody::sphere(BodyId::new(0), Pose::identity(), 2.0, 0.5)
                .with_velocity(Twist::from_linear(nalgebra::Vector3::new(3.0, 0.0, 0.0))),
        );
        let (ke, _) = body_energy(&body, &Vector3::zeros());
        assert_relative_eq!(ke, 9.0, epsilon = 1e-12);
    }
}
