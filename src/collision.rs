//! Contact response between two bodies: an elastic bounce along the line of
//! centres, overlap correction, then the type-dependent mass transfer rules.
//!
//! | Pair                | Rule                                                   |
//! |---------------------|--------------------------------------------------------|
//! | black hole + any    | black hole swallows the other body, velocity damped    |
//! | star + planet       | star swallows the planet                               |
//! | star + star         | rare collapse into a black hole, else share or absorb  |
//! | planet + planet     | heavier body shares with or absorbs the lighter one    |
//! | meteor + non-hole   | bounce only                                            |

use bevy::prelude::*;
use rand::Rng;

use crate::body::{BodyDesc, BodyId, BodyKind, CelestialBody};
use crate::resources::{
    BLACK_HOLE_FORMATION_CHANCE, BLACK_HOLE_VELOCITY_DAMPING, PARTIAL_TRANSFER_RATIO,
};

/// Structural change a collision asks for. The caller applies removals and
/// insertions once its pass over the body collection is finished.
#[derive(Debug)]
pub enum MassTransfer {
    /// Bounce only.
    None,
    /// `removed` was swallowed whole by `survivor`.
    Absorbed { survivor: BodyId, removed: BodyId },
    /// Half of `donor`'s mass moved to `survivor`; both bodies remain.
    Partial { survivor: BodyId, donor: BodyId },
    /// Two stars collapsed into a new black hole.
    Collapsed {
        removed: [BodyId; 2],
        black_hole: CelestialBody,
    },
}

impl MassTransfer {
    pub fn removed(&self) -> &[BodyId] {
        match self {
            MassTransfer::Absorbed { removed, .. } => std::slice::from_ref(removed),
            MassTransfer::Collapsed { removed, .. } => removed,
            MassTransfer::None | MassTransfer::Partial { .. } => &[],
        }
    }
}

/// Resolves contact between `a` and `b`.
///
/// Returns `None` when the pair does not overlap and is already moving apart;
/// velocities are still updated in that case but no mass changes hands.
pub fn resolve_collision(
    a: &mut CelestialBody,
    b: &mut CelestialBody,
    rng: &mut impl Rng,
) -> Option<MassTransfer> {
    let delta = b.position - a.position;
    let approach = (b.velocity - a.velocity).dot(delta);

    bounce(a, b);

    let distance = delta.length();
    let overlap = a.radius + b.radius - distance;
    if overlap > 0.0 {
        let normal = if distance > 0.0 {
            delta / distance
        } else {
            Vec2::X
        };
        a.position -= normal * (overlap / 2.0);
        b.position += normal * (overlap / 2.0);
    } else if approach > 0.0 {
        return None;
    }

    let form_black_hole = rng.random_bool(BLACK_HOLE_FORMATION_CHANCE);
    Some(transfer_mass(a, b, form_black_hole))
}

/// One-dimensional elastic collision along the line of centres. Each body's
/// rebound is scaled by its own elasticity.
fn bounce(a: &mut CelestialBody, b: &mut CelestialBody) {
    let delta = b.position - a.position;
    let axis = Vec2::from_angle(delta.y.atan2(delta.x));
    let normal = axis.perp();

    let (a_along, a_across) = (a.velocity.dot(axis), a.velocity.dot(normal));
    let (b_along, b_across) = (b.velocity.dot(axis), b.velocity.dot(normal));

    let total_mass = a.mass + b.mass;
    let a_final =
        ((a.mass - b.mass) * a_along + 2.0 * b.mass * b_along) / total_mass * a.elasticity();
    let b_final =
        ((b.mass - a.mass) * b_along + 2.0 * a.mass * a_along) / total_mass * b.elasticity();

    a.velocity = axis * a_final + normal * a_across;
    b.velocity = axis * b_final + normal * b_across;
}

/// Applies the pair rule for the two body kinds. `form_black_hole` only
/// matters for two stars.
pub fn transfer_mass(
    a: &mut CelestialBody,
    b: &mut CelestialBody,
    form_black_hole: bool,
) -> MassTransfer {
    use BodyKind::*;

    match (a.kind, b.kind) {
        (BlackHole, BlackHole) => {
            let (survivor, removed) = heavier_first(a, b);
            absorb(survivor, removed)
        }
        (BlackHole, _) => absorb(a, b),
        (_, BlackHole) => absorb(b, a),
        (Star, Planet) => absorb(a, b),
        (Planet, Star) => absorb(b, a),
        (Star, Star) if form_black_hole => collapse(a, b),
        (Star, Star) | (Planet, Planet) => {
            let (survivor, removed) = heavier_first(a, b);
            share_or_absorb(survivor, removed)
        }
        (Meteor, Planet | Star | Meteor) | (Planet | Star, Meteor) => MassTransfer::None,
    }
}

fn heavier_first<'a>(
    a: &'a mut CelestialBody,
    b: &'a mut CelestialBody,
) -> (&'a mut CelestialBody, &'a mut CelestialBody) {
    if b.mass > a.mass { (b, a) } else { (a, b) }
}

fn absorb(survivor: &mut CelestialBody, removed: &CelestialBody) -> MassTransfer {
    survivor.set_mass_preserving_density(survivor.mass + removed.mass);
    if survivor.kind == BodyKind::BlackHole {
        survivor.velocity /= BLACK_HOLE_VELOCITY_DAMPING;
    }
    MassTransfer::Absorbed {
        survivor: survivor.id(),
        removed: removed.id(),
    }
}

fn share_or_absorb(survivor: &mut CelestialBody, removed: &mut CelestialBody) -> MassTransfer {
    if removed.mass <= survivor.mass * PARTIAL_TRANSFER_RATIO {
        return absorb(survivor, removed);
    }

    let half = removed.mass / 2.0;
    survivor.set_mass_preserving_density(survivor.mass + half);
    removed.set_mass_preserving_density(removed.mass - half);
    MassTransfer::Partial {
        survivor: survivor.id(),
        donor: removed.id(),
    }
}

fn collapse(a: &CelestialBody, b: &CelestialBody) -> MassTransfer {
    let desc = BodyDesc::new(BodyKind::BlackHole)
        .with_mass(a.mass + b.mass)
        .at((a.position + b.position) / 2.0)
        .moving((a.velocity + b.velocity) / 2.0);

    match CelestialBody::new(desc) {
        Ok(black_hole) => MassTransfer::Collapsed {
            removed: [a.id(), b.id()],
            black_hole,
        },
        Err(err) => {
            warn!("stars {} and {} failed to collapse: {err}", a.id(), b.id());
            MassTransfer::None
        }
    }
}
