use bevy::prelude::*;
use rand::{SeedableRng, rngs::StdRng};

use crate::body::BodyKind;

/// Tunable runtime simulation parameters (G, theta, timestep, tree cadence).
#[derive(Resource, Clone, Debug)]
pub struct SimConfig {
    pub g: f32,
    pub theta: f32,
    pub adaptive_theta: bool,
    pub softening: f32,
    pub min_distance_sq: f32,
    pub dt: f32,
    pub rebuild_interval: u32,
    pub collisions_enabled: bool,
}

// --- Simulation Defaults ---
/// Simulation-space gravitational constant.
pub const DEFAULT_G: f32 = 0.1;
/// Default Barnes-Hut opening angle.
pub const DEFAULT_THETA: f32 = 0.9;
/// Default fixed timestep for physics.
pub const DEFAULT_DT: f32 = 1.0 / 60.0;
/// Added (squared) to every separation before the inverse square root.
pub const SOFTENING: f32 = 0.1;
/// Below this squared separation a node contributes no force at all.
pub const MIN_DISTANCE_SQ: f32 = 1.0e-4;
/// Rebuild the tree every N steps.
pub const DEFAULT_REBUILD_INTERVAL: u32 = 1;

// --- Tree Construction ---
/// Fraction of the body bounding box added on each side of the root.
pub const ROOT_MARGIN: f32 = 0.1;
/// Child quadrants overlap their neighbours by this fraction of the half size.
pub const SUBDIVIDE_EPSILON: f32 = 1.0e-4;
/// Depth below which coincident bodies share a leaf instead of subdividing.
pub const MAX_TREE_DEPTH: u32 = 32;
/// Smallest side length of the root square.
pub const MIN_ROOT_SIZE: f32 = 1.0;
/// Weight of the log mass ratio in the adaptive opening angle.
pub const ADAPTIVE_MASS_WEIGHT: f32 = 0.05;
/// Weight of the log relative distance in the adaptive opening angle.
pub const ADAPTIVE_DISTANCE_WEIGHT: f32 = 0.1;
/// Smallest quadtree node size that will be drawn as a gizmo.
pub const MIN_GIZMO_NODE_SIZE: f32 = 2.0;

// --- Collisions ---
/// Broad-phase search box half size, in multiples of the body radius.
pub const COLLISION_SEARCH_FACTOR: f32 = 2.0;
/// Chance that two colliding stars collapse into a black hole.
pub const BLACK_HOLE_FORMATION_CHANCE: f64 = 0.05;
/// A black hole's velocity is divided by this after it absorbs a body.
pub const BLACK_HOLE_VELOCITY_DAMPING: f32 = 100.0;
/// Above this fraction of the survivor's mass only half of the lighter body transfers.
pub const PARTIAL_TRANSFER_RATIO: f32 = 0.1;
/// Restitution given to bodies that do not specify one.
pub const DEFAULT_ELASTICITY: f32 = 0.6;

// --- Scene ---
/// Mass of the star at the centre of the initial scene.
pub const CENTRAL_STAR_MASS: f32 = 50000.0;
/// Initial camera zoom; larger shows more of the scene.
pub const INITIAL_CAMERA_SCALE: f32 = 1.6;
/// Number of planets spawned around the central star at reset.
pub const NUM_PLANETS: usize = 120;
/// Number of meteors spawned at reset.
pub const NUM_METEORS: usize = 30;

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            g: DEFAULT_G,
            theta: DEFAULT_THETA,
            adaptive_theta: false,
            softening: SOFTENING,
            min_distance_sq: MIN_DISTANCE_SQ,
            dt: DEFAULT_DT,
            rebuild_interval: DEFAULT_REBUILD_INTERVAL,
            collisions_enabled: true,
        }
    }
}

/// User-facing toggles that drive rendering and spawning.
#[derive(Resource)]
pub struct SimSettings {
    pub time_scale: f32,
    pub paused: bool,
    pub show_gizmos: bool,
    pub spawn_kind: BodyKind,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            paused: false,
            show_gizmos: false,
            spawn_kind: BodyKind::Planet,
        }
    }
}

/// Random source for stochastic mass-transfer rules and scene generation.
#[derive(Resource)]
pub struct SimRng(pub StdRng);

impl Default for SimRng {
    fn default() -> Self {
        Self(StdRng::from_os_rng())
    }
}

/// Marker resource to request a simulation reset from the UI.
#[derive(Resource, Default)]
pub struct ResetSimulation {
    pub pending: bool,
}
