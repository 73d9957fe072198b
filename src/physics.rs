use bevy::prelude::*;
use rand::Rng;
use std::collections::HashSet;

use crate::body::{BodyId, CelestialBody};
use crate::collision::{MassTransfer, resolve_collision};
use crate::quadtree::QuadTree;
use crate::resources::{COLLISION_SEARCH_FACTOR, SimConfig};

/// What happened during one call to [`PhysicsSystem::step`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub rebuilt: bool,
    pub collisions: usize,
    pub removed: usize,
    pub spawned: usize,
}

/// Owns the Barnes-Hut tree and decides when to rebuild it.
#[derive(Resource, Default)]
pub struct PhysicsSystem {
    tree: QuadTree,
    frame: u64,
    built: bool,
}

impl PhysicsSystem {
    pub fn tree(&self) -> &QuadTree {
        &self.tree
    }

    /// Computes accelerations for every body and, on rebuild frames, resolves
    /// collisions. Integration is left to the caller.
    pub fn step(
        &mut self,
        bodies: &mut Vec<CelestialBody>,
        config: &SimConfig,
        rng: &mut impl Rng,
    ) -> StepReport {
        let interval = u64::from(config.rebuild_interval.max(1));
        let rebuild = !self.built || self.frame % interval == 0;
        self.frame += 1;

        let mut report = StepReport {
            rebuilt: rebuild,
            ..default()
        };

        if rebuild {
            self.built = self.tree.build(bodies);
            debug!(
                "rebuilt quadtree: {} bodies, {}/{} nodes, extent {:.1}",
                bodies.len(),
                self.tree.live_nodes().len(),
                self.tree.pool_size(),
                self.tree.root().map_or(0.0, |root| root.bounds.size.x)
            );
        }

        self.assign_accelerations(bodies, config);

        if config.collisions_enabled && rebuild {
            self.handle_collisions(bodies, rng, &mut report);
        }

        report
    }

    fn assign_accelerations(&self, bodies: &mut [CelestialBody], config: &SimConfig) {
        for body in bodies.iter_mut() {
            let acceleration = self.tree.calculate_force(body, config) / body.mass;
            body.acceleration = if acceleration.is_finite() {
                acceleration
            } else {
                warn!("non-finite acceleration on body {}, zeroing", body.id());
                Vec2::ZERO
            };
        }
    }

    /// Broad phase through the tree, narrow phase on centre distance. Bodies
    /// swallowed during the pass are skipped from then on, and the collection
    /// only changes shape once the pass is over.
    fn handle_collisions(
        &self,
        bodies: &mut Vec<CelestialBody>,
        rng: &mut impl Rng,
        report: &mut StepReport,
    ) {
        let mut checked: HashSet<(BodyId, BodyId)> = HashSet::new();
        let mut removed: HashSet<BodyId> = HashSet::new();
        let mut spawned = Vec::new();

        for i in 0..bodies.len() {
            let search_radius = bodies[i].radius * COLLISION_SEARCH_FACTOR;
            for j in self.tree.collision_candidates(&bodies[i], search_radius) {
                let (id_a, id_b) = (bodies[i].id(), bodies[j].id());
                if removed.contains(&id_a) {
                    break;
                }
                if removed.contains(&id_b) || !checked.insert(pair_key(id_a, id_b)) {
                    continue;
                }

                let distance = bodies[i].position.distance(bodies[j].position);
                if distance >= bodies[i].radius + bodies[j].radius {
                    continue;
                }

                report.collisions += 1;
                let (a, b) = pair_mut(bodies, i, j);
                let Some(transfer) = resolve_collision(a, b, rng) else {
                    continue;
                };

                match &transfer {
                    MassTransfer::Absorbed { survivor, removed } => {
                        info!("body {survivor} absorbed body {removed}");
                    }
                    MassTransfer::Collapsed { removed, black_hole } => {
                        info!(
                            "stars {} and {} collapsed into black hole {}",
                            removed[0],
                            removed[1],
                            black_hole.id()
                        );
                    }
                    MassTransfer::Partial { survivor, donor } => {
                        debug!("body {survivor} took half the mass of body {donor}");
                    }
                    MassTransfer::None => {}
                }

                removed.extend(transfer.removed().iter().copied());
                if let MassTransfer::Collapsed { black_hole, .. } = transfer {
                    spawned.push(black_hole);
                }
            }
        }

        if !removed.is_empty() {
            bodies.retain(|body| !removed.contains(&body.id()));
        }
        report.removed = removed.len();
        report.spawned = spawned.len();
        bodies.extend(spawned);
    }
}

fn pair_key(a: BodyId, b: BodyId) -> (BodyId, BodyId) {
    if a < b { (a, b) } else { (b, a) }
}

fn pair_mut(
    bodies: &mut [CelestialBody],
    i: usize,
    j: usize,
) -> (&mut CelestialBody, &mut CelestialBody) {
    if i < j {
        let (head, tail) = bodies.split_at_mut(j);
        (&mut head[i], &mut tail[0])
    } else {
        let (head, tail) = bodies.split_at_mut(i);
        (&mut tail[0], &mut head[j])
    }
}
