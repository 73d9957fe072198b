use bevy::prelude::*;
use std::f32::consts::PI;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::resources::DEFAULT_ELASTICITY;

static NEXT_BODY_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identifier assigned once when a body is constructed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyId(pub u64);

impl BodyId {
    fn next() -> Self {
        Self(NEXT_BODY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BodyKind {
    Planet,
    Star,
    BlackHole,
    Meteor,
}

impl BodyKind {
    pub const ALL: [BodyKind; 4] = [
        BodyKind::Planet,
        BodyKind::Star,
        BodyKind::BlackHole,
        BodyKind::Meteor,
    ];

    pub fn label(self) -> &'static str {
        match self {
            BodyKind::Planet => "Planet",
            BodyKind::Star => "Star",
            BodyKind::BlackHole => "Black Hole",
            BodyKind::Meteor => "Meteor",
        }
    }

    /// Density used by the spawn layer when nothing else is specified.
    pub fn default_density(self) -> f32 {
        match self {
            BodyKind::Planet => 0.1,
            BodyKind::Star => 0.5,
            BodyKind::BlackHole => 50.0,
            BodyKind::Meteor => 0.3,
        }
    }

    /// Mass given to bodies placed by hand.
    pub fn default_mass(self) -> f32 {
        match self {
            BodyKind::Planet => 5.0,
            BodyKind::Star => 20000.0,
            BodyKind::BlackHole => 1000.0,
            BodyKind::Meteor => 0.5,
        }
    }

    pub fn default_color(self) -> Color {
        match self {
            BodyKind::Planet => Color::srgb(0.3, 0.6, 1.0),
            BodyKind::Star => Color::srgb(1.0, 0.85, 0.3),
            BodyKind::BlackHole => Color::srgb(0.35, 0.0, 0.45),
            BodyKind::Meteor => Color::srgb(0.6, 0.55, 0.5),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum BodyError {
    #[error("a body needs a mass or a radius")]
    Underdetermined,
    #[error("density must be positive, got {0}")]
    InvalidDensity(f32),
    #[error("mass must be positive, got {0}")]
    InvalidMass(f32),
    #[error("radius must be positive, got {0}")]
    InvalidRadius(f32),
}

/// Everything the spawn layer supplies to create a body.
///
/// Exactly one of `mass` and `radius` may be left out; the missing one is
/// derived from the other through `mass = 4/3 * pi * radius^3 * density`.
#[derive(Clone, Debug)]
pub struct BodyDesc {
    pub kind: BodyKind,
    pub mass: Option<f32>,
    pub radius: Option<f32>,
    pub density: f32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub elasticity: f32,
    pub color: Color,
}

impl BodyDesc {
    pub fn new(kind: BodyKind) -> Self {
        Self {
            kind,
            mass: None,
            radius: None,
            density: kind.default_density(),
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            elasticity: DEFAULT_ELASTICITY,
            color: kind.default_color(),
        }
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = Some(radius);
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn at(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn moving(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_elasticity(mut self, elasticity: f32) -> Self {
        self.elasticity = elasticity;
        self
    }
}

/// Physical state of one simulated mass.
#[derive(Clone, Debug)]
pub struct CelestialBody {
    id: BodyId,
    pub kind: BodyKind,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Recomputed by the physics system every step.
    pub acceleration: Vec2,
    pub mass: f32,
    pub radius: f32,
    pub density: f32,
    elasticity: f32,
    pub color: Color,
}

impl CelestialBody {
    pub fn new(desc: BodyDesc) -> Result<Self, BodyError> {
        if !(desc.density > 0.0) {
            return Err(BodyError::InvalidDensity(desc.density));
        }

        let (mass, radius) = match (desc.mass, desc.radius) {
            (None, None) => return Err(BodyError::Underdetermined),
            (Some(mass), None) => (mass, radius_from_mass(mass, desc.density)),
            (None, Some(radius)) => (mass_from_radius(radius, desc.density), radius),
            (Some(mass), Some(radius)) => (mass, radius),
        };

        if !(mass > 0.0) {
            return Err(BodyError::InvalidMass(mass));
        }
        if !(radius > 0.0) {
            return Err(BodyError::InvalidRadius(radius));
        }

        Ok(Self {
            id: BodyId::next(),
            kind: desc.kind,
            position: desc.position,
            velocity: desc.velocity,
            acceleration: Vec2::ZERO,
            mass,
            radius,
            density: desc.density,
            elasticity: desc.elasticity,
            color: desc.color,
        })
    }

    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn elasticity(&self) -> f32 {
        self.elasticity
    }

    /// Advances one step. Position moves with the current velocity before the
    /// acceleration is folded into velocity.
    pub fn update(&mut self, dt: f32) {
        self.position += self.velocity * dt;
        self.velocity += self.acceleration * dt;
    }

    /// Sets a new mass and rescales the radius so the body keeps the density
    /// implied by its current mass and radius.
    pub fn set_mass_preserving_density(&mut self, new_mass: f32) {
        self.radius = rescaled_radius(self.mass, self.radius, new_mass);
        self.mass = new_mass;
    }

    pub fn contains_point(&self, point: Vec2) -> bool {
        self.position.distance_squared(point) <= self.radius * self.radius
    }
}

pub fn mass_from_radius(radius: f32, density: f32) -> f32 {
    4.0 / 3.0 * PI * radius.powi(3) * density
}

pub fn radius_from_mass(mass: f32, density: f32) -> f32 {
    (mass / (4.0 / 3.0 * PI * density)).cbrt()
}

/// `k = mass / radius^3` taken from the state before the change.
pub fn rescaled_radius(mass: f32, radius: f32, new_mass: f32) -> f32 {
    let k = mass / radius.powi(3);
    (new_mass / k).cbrt()
}

/// The live body collection. Owned by the app and handed to the physics
/// system by mutable reference each step.
#[derive(Resource, Default, Deref, DerefMut)]
pub struct BodySet(pub Vec<CelestialBody>);

impl BodySet {
    pub fn index_of(&self, id: BodyId) -> Option<usize> {
        self.0.iter().position(|body| body.id() == id)
    }

    pub fn remove(&mut self, id: BodyId) -> Option<CelestialBody> {
        self.index_of(id).map(|index| self.0.remove(index))
    }

    /// Topmost body whose disc covers `point`.
    pub fn body_at(&self, point: Vec2) -> Option<BodyId> {
        self.0
            .iter()
            .rev()
            .find(|body| body.contains_point(point))
            .map(CelestialBody::id)
    }

    pub fn integrate(&mut self, dt: f32) {
        for body in self.0.iter_mut() {
            body.update(dt);
        }
    }

    pub fn total_mass(&self) -> f32 {
        self.0.iter().map(|body| body.mass).sum()
    }
}
