use bevy::prelude::*;

use crate::body::{BodyId, CelestialBody};
use crate::resources::{
    ADAPTIVE_DISTANCE_WEIGHT, ADAPTIVE_MASS_WEIGHT, MAX_TREE_DEPTH, MIN_ROOT_SIZE, ROOT_MARGIN,
    SUBDIVIDE_EPSILON, SimConfig,
};

/// Axis-aligned square region. Quadrants are indexed in screen order with y
/// growing downward: 0 = NW, 1 = NE, 2 = SW, 3 = SE.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub center: Vec2,
    pub size: Vec2,
}

impl Rect {
    /// Square enclosing every point, widened by `ROOT_MARGIN` on each side.
    pub fn enclosing(points: impl IntoIterator<Item = Vec2>) -> Option<Rect> {
        let mut min = Vec2::splat(f32::INFINITY);
        let mut max = Vec2::splat(f32::NEG_INFINITY);
        for point in points {
            min = min.min(point);
            max = max.max(point);
        }

        if !min.x.is_finite() || !max.x.is_finite() {
            return None;
        }

        let extent = (max - min).max_element().max(MIN_ROOT_SIZE);
        Some(Rect {
            center: (min + max) / 2.0,
            size: Vec2::splat(extent * (1.0 + 2.0 * ROOT_MARGIN)),
        })
    }

    pub fn min(&self) -> Vec2 {
        self.center - self.size / 2.0
    }

    pub fn max(&self) -> Vec2 {
        self.center + self.size / 2.0
    }

    /// Points on the midpoint lines fall into the higher quadrant index.
    pub fn get_quadrant_index(&self, point: Vec2) -> usize {
        let east = point.x >= self.center.x;
        let south = point.y >= self.center.y;
        match (south, east) {
            (false, false) => 0,
            (false, true) => 1,
            (true, false) => 2,
            (true, true) => 3,
        }
    }

    /// Child square for `index`, grown slightly so neighbours overlap and a
    /// point on a boundary is never left outside both.
    pub fn sub_quadrant(&self, index: usize) -> Rect {
        let half_size = self.size / 2.0;
        let offset = half_size / 2.0;
        let center = match index {
            0 => self.center + vec2(-offset.x, -offset.y),
            1 => self.center + vec2(offset.x, -offset.y),
            2 => self.center + vec2(-offset.x, offset.y),
            3 => self.center + vec2(offset.x, offset.y),
            _ => self.center,
        };
        Rect {
            center,
            size: half_size * (1.0 + SUBDIVIDE_EPSILON),
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        let (a_min, a_max) = (self.min(), self.max());
        let (b_min, b_max) = (other.min(), other.max());
        a_min.x <= b_max.x && b_min.x <= a_max.x && a_min.y <= b_max.y && b_min.y <= a_max.y
    }
}

/// Transient handle to a body stored at a leaf. `index` points into the body
/// slice the tree was built from and is only valid until that slice changes.
#[derive(Clone, Copy, Debug)]
pub struct BodyRef {
    pub index: usize,
    pub id: BodyId,
    pub position: Vec2,
    pub mass: f32,
}

pub struct Node {
    pub bounds: Rect,
    pub children: [Option<usize>; 4],
    pub body: Option<BodyRef>,
    pub mass: f32,
    pub center_of_mass: Vec2,
    pub is_leaf: bool,
}

impl Node {
    pub fn empty(bounds: Rect) -> Self {
        Self {
            bounds,
            children: [None; 4],
            body: None,
            mass: 0.0,
            center_of_mass: Vec2::ZERO,
            is_leaf: true,
        }
    }
}

/// Barnes-Hut quadtree over a pooled node arena.
///
/// Nodes below `cursor` are live. Everything past it is left over from an
/// earlier, larger build and is reset in place when the cursor reaches it.
#[derive(Default)]
pub struct QuadTree {
    nodes: Vec<Node>,
    cursor: usize,
}

const ROOT: usize = 0;

impl QuadTree {
    pub fn root(&self) -> Option<&Node> {
        self.live_nodes().first()
    }

    pub fn live_nodes(&self) -> &[Node] {
        &self.nodes[..self.cursor]
    }

    /// Number of nodes ever allocated, live or not.
    pub fn pool_size(&self) -> usize {
        self.nodes.len()
    }

    fn alloc(&mut self, bounds: Rect) -> usize {
        let index = self.cursor;
        if let Some(node) = self.nodes.get_mut(index) {
            *node = Node::empty(bounds);
        } else {
            self.nodes.push(Node::empty(bounds));
        }
        self.cursor += 1;
        index
    }

    /// Drops every node and starts over with an empty root covering `bounds`.
    pub fn reset(&mut self, bounds: Rect) {
        self.cursor = 0;
        self.alloc(bounds);
    }

    /// Empties the tree, keeping the previous root's bounds.
    pub fn clear(&mut self) {
        let bounds = self.nodes.first().map(|node| node.bounds).unwrap_or(Rect {
            center: Vec2::ZERO,
            size: Vec2::splat(MIN_ROOT_SIZE),
        });
        self.reset(bounds);
    }

    /// Rebuilds the tree around `bodies`. Returns false when there is nothing to insert.
    pub fn build(&mut self, bodies: &[CelestialBody]) -> bool {
        let Some(bounds) = Rect::enclosing(bodies.iter().map(|body| body.position)) else {
            self.clear();
            return false;
        };

        self.reset(bounds);
        for (index, body) in bodies.iter().enumerate() {
            self.insert(index, body);
        }
        true
    }

    pub fn insert(&mut self, index: usize, body: &CelestialBody) {
        if self.cursor == 0 {
            return;
        }
        let body = BodyRef {
            index,
            id: body.id(),
            position: body.position,
            mass: body.mass,
        };
        self.insert_recursive(ROOT, body, 0);
    }

    fn insert_recursive(&mut self, index: usize, body: BodyRef, depth: u32) {
        let node = &mut self.nodes[index];
        let was_empty = node.mass == 0.0;
        let total_mass = node.mass + body.mass;
        node.center_of_mass =
            (node.center_of_mass * node.mass + body.position * body.mass) / total_mass;
        node.mass = total_mass;

        if was_empty {
            node.body = Some(body);
            return;
        }

        if node.is_leaf {
            // Coincident bodies would subdivide forever; let the leaf carry
            // their combined mass instead.
            if depth >= MAX_TREE_DEPTH {
                return;
            }
            let existing = node.body.take();
            self.subdivide(index);
            if let Some(existing) = existing {
                let quadrant = self.nodes[index].bounds.get_quadrant_index(existing.position);
                if let Some(child) = self.nodes[index].children[quadrant] {
                    self.insert_recursive(child, existing, depth + 1);
                }
            }
        }

        let quadrant = self.nodes[index].bounds.get_quadrant_index(body.position);
        if let Some(child) = self.nodes[index].children[quadrant] {
            self.insert_recursive(child, body, depth + 1);
        }
    }

    fn subdivide(&mut self, index: usize) {
        let bounds = self.nodes[index].bounds;
        let mut children = [None; 4];
        for (quadrant, child) in children.iter_mut().enumerate() {
            *child = Some(self.alloc(bounds.sub_quadrant(quadrant)));
        }
        let node = &mut self.nodes[index];
        node.children = children;
        node.is_leaf = false;
    }

    /// Net gravitational force on `body`. The result still carries the body's
    /// own mass; divide by it to get an acceleration.
    pub fn calculate_force(&self, body: &CelestialBody, config: &SimConfig) -> Vec2 {
        let Some(root) = self.root() else {
            return Vec2::ZERO;
        };
        let extent = root.bounds.size.x;
        self.calculate_force_recursive(ROOT, body, extent, config)
    }

    fn calculate_force_recursive(
        &self,
        index: usize,
        body: &CelestialBody,
        extent: f32,
        config: &SimConfig,
    ) -> Vec2 {
        let node = &self.nodes[index];
        if node.mass == 0.0 || node.body.is_some_and(|stored| stored.id == body.id()) {
            return Vec2::ZERO;
        }

        let delta = node.center_of_mass - body.position;
        let dist_sq = delta.length_squared();
        if dist_sq < config.min_distance_sq {
            return Vec2::ZERO;
        }

        let inv_dist = (dist_sq + config.softening * config.softening)
            .sqrt()
            .recip();
        let theta = if config.adaptive_theta {
            adaptive_theta(config.theta, node.mass / body.mass, dist_sq.sqrt() / extent)
        } else {
            config.theta
        };

        if node.is_leaf || node.bounds.size.x * inv_dist < theta {
            return delta * (config.g * body.mass * node.mass * inv_dist.powi(3));
        }

        node.children
            .iter()
            .flatten()
            .map(|&child| self.calculate_force_recursive(child, body, extent, config))
            .sum()
    }

    /// Indices of bodies whose leaves overlap the square of half size
    /// `search_radius` around `body`. Broad phase only.
    pub fn collision_candidates(&self, body: &CelestialBody, search_radius: f32) -> Vec<usize> {
        let mut candidates = Vec::new();
        if self.cursor == 0 {
            return candidates;
        }

        let area = Rect {
            center: body.position,
            size: Vec2::splat(2.0 * search_radius),
        };
        let mut stack = vec![ROOT];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.bounds.intersects(&area) {
                continue;
            }
            if node.is_leaf {
                if let Some(stored) = node.body
                    && stored.id != body.id()
                {
                    candidates.push(stored.index);
                }
                continue;
            }
            stack.extend(node.children.iter().flatten());
        }
        candidates
    }
}

/// Opening angle rescaled per node: heavy or close nodes get a wider angle,
/// light or distant ones a narrower one.
fn adaptive_theta(theta: f32, mass_ratio: f32, relative_distance: f32) -> f32 {
    let mass_bias = mass_ratio.max(f32::MIN_POSITIVE).ln() * ADAPTIVE_MASS_WEIGHT;
    let distance_bias = relative_distance.max(f32::MIN_POSITIVE).ln() * ADAPTIVE_DISTANCE_WEIGHT;
    (theta * (1.0 + mass_bias - distance_bias)).clamp(theta * 0.5, theta * 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyDesc, BodyKind};
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn body(position: Vec2, mass: f32) -> CelestialBody {
        CelestialBody::new(BodyDesc::new(BodyKind::Planet).with_mass(mass).at(position))
            .expect("valid test body")
    }

    fn random_bodies(rng: &mut StdRng, count: usize) -> Vec<CelestialBody> {
        (0..count)
            .map(|_| {
                let position = vec2(
                    rng.random_range(-500.0..500.0),
                    rng.random_range(-500.0..500.0),
                );
                body(position, rng.random_range(1.0..20.0))
            })
            .collect()
    }

    fn direct_force(bodies: &[CelestialBody], target: usize, config: &SimConfig) -> Vec2 {
        let body = &bodies[target];
        let mut force = Vec2::ZERO;
        for (index, other) in bodies.iter().enumerate() {
            if index == target {
                continue;
            }
            let delta = other.position - body.position;
            let dist_sq = delta.length_squared();
            if dist_sq < config.min_distance_sq {
                continue;
            }
            let inv_dist = (dist_sq + config.softening * config.softening)
                .sqrt()
                .recip();
            force += delta * (config.g * body.mass * other.mass * inv_dist.powi(3));
        }
        force
    }

    fn approximation_error(bodies: &[CelestialBody], theta: f32) -> f32 {
        let config = SimConfig {
            theta,
            ..default()
        };
        let mut tree = QuadTree::default();
        tree.build(bodies);
        bodies
            .iter()
            .enumerate()
            .map(|(index, body)| {
                let exact = direct_force(bodies, index, &config);
                (tree.calculate_force(body, &config) - exact).length() / exact.length()
            })
            .sum()
    }

    #[test]
    fn root_aggregate_is_independent_of_insertion_order() {
        let mut rng = StdRng::seed_from_u64(7);
        let bodies = random_bodies(&mut rng, 200);
        let mut shuffled = bodies.clone();
        shuffled.shuffle(&mut rng);

        let total_mass: f32 = bodies.iter().map(|b| b.mass).sum();
        let centroid = bodies
            .iter()
            .map(|b| b.position * b.mass)
            .sum::<Vec2>()
            / total_mass;

        let mut first = QuadTree::default();
        first.build(&bodies);
        let mut second = QuadTree::default();
        second.build(&shuffled);

        let (a, b) = (first.root().unwrap(), second.root().unwrap());
        assert!((a.mass - total_mass).abs() / total_mass < 1e-5);
        assert!((a.mass - b.mass).abs() / total_mass < 1e-5);
        assert!((a.center_of_mass - centroid).length() < 5e-2);
        assert!((a.center_of_mass - b.center_of_mass).length() < 5e-2);
    }

    #[test]
    fn internal_nodes_hold_no_body_and_sum_their_children() {
        let mut rng = StdRng::seed_from_u64(11);
        let bodies = random_bodies(&mut rng, 64);
        let mut tree = QuadTree::default();
        tree.build(&bodies);

        for node in tree.live_nodes().iter().filter(|node| !node.is_leaf) {
            assert!(node.body.is_none());
            let child_mass: f32 = node
                .children
                .iter()
                .flatten()
                .map(|&child| tree.live_nodes()[child].mass)
                .sum();
            assert!((child_mass - node.mass).abs() / node.mass < 1e-4);
        }
    }

    #[test]
    fn two_isolated_bodies_match_direct_gravity_for_any_theta() {
        let bodies = vec![body(vec2(-4.0, 1.0), 3.0), body(vec2(6.0, -2.0), 5.0)];
        for theta in [0.1, 0.5, 0.9, 1.5] {
            let config = SimConfig {
                theta,
                ..default()
            };
            let mut tree = QuadTree::default();
            tree.build(&bodies);
            for (index, body) in bodies.iter().enumerate() {
                let expected = direct_force(&bodies, index, &config);
                let actual = tree.calculate_force(body, &config);
                assert!(
                    (actual - expected).length() <= expected.length() * 1e-5,
                    "theta {theta}: expected {expected:?}, got {actual:?}"
                );
            }
        }
    }

    #[test]
    fn smaller_opening_angle_reduces_error() {
        let mut rng = StdRng::seed_from_u64(42);
        let bodies = random_bodies(&mut rng, 300);

        let coarse = approximation_error(&bodies, 0.9);
        let medium = approximation_error(&bodies, 0.5);
        let fine = approximation_error(&bodies, 0.1);

        assert!(coarse >= medium, "0.9 error {coarse} < 0.5 error {medium}");
        assert!(medium >= fine, "0.5 error {medium} < 0.1 error {fine}");
    }

    #[test]
    fn adaptive_theta_widens_for_heavy_near_nodes() {
        assert!(adaptive_theta(0.9, 1000.0, 0.01) > 0.9);
        assert!(adaptive_theta(0.9, 0.001, 1.0) < 0.9);
        assert_eq!(adaptive_theta(0.9, 1.0, 1.0), 0.9);
    }

    #[test]
    fn midpoint_ties_go_to_the_higher_quadrant() {
        let rect = Rect {
            center: Vec2::ZERO,
            size: Vec2::splat(10.0),
        };
        assert_eq!(rect.get_quadrant_index(vec2(-1.0, -1.0)), 0);
        assert_eq!(rect.get_quadrant_index(vec2(0.0, -1.0)), 1);
        assert_eq!(rect.get_quadrant_index(vec2(-1.0, 0.0)), 2);
        assert_eq!(rect.get_quadrant_index(Vec2::ZERO), 3);
    }

    #[test]
    fn root_covers_bodies_with_margin() {
        let rect = Rect::enclosing([vec2(-10.0, -5.0), vec2(20.0, 15.0)]).unwrap();
        assert_eq!(rect.center, vec2(5.0, 5.0));
        assert!((rect.size.x - 36.0).abs() < 1e-4);
        assert!(Rect::enclosing(std::iter::empty()).is_none());
    }

    #[test]
    fn rebuilding_recycles_pooled_nodes() {
        let mut rng = StdRng::seed_from_u64(3);
        let many = random_bodies(&mut rng, 100);
        let few = random_bodies(&mut rng, 3);

        let mut tree = QuadTree::default();
        tree.build(&many);
        let pool = tree.pool_size();
        let live = tree.live_nodes().len();

        tree.build(&few);
        assert_eq!(tree.pool_size(), pool);
        assert!(tree.live_nodes().len() < live);
        let total: f32 = few.iter().map(|b| b.mass).sum();
        assert!((tree.root().unwrap().mass - total).abs() < 1e-4);

        tree.clear();
        assert_eq!(tree.live_nodes().len(), 1);
        assert_eq!(tree.root().unwrap().mass, 0.0);
    }

    #[test]
    fn coincident_bodies_do_not_recurse_forever() {
        let bodies = vec![
            body(vec2(1.0, 1.0), 2.0),
            body(vec2(1.0, 1.0), 3.0),
            body(vec2(9.0, 4.0), 1.0),
        ];
        let mut tree = QuadTree::default();
        tree.build(&bodies);
        assert!((tree.root().unwrap().mass - 6.0).abs() < 1e-5);
    }

    #[test]
    fn candidates_exclude_self_and_distant_bodies() {
        let bodies = vec![
            body(vec2(0.0, 0.0), 1.0),
            body(vec2(1.0, 0.5), 1.0),
            body(vec2(200.0, 200.0), 1.0),
        ];
        let mut tree = QuadTree::default();
        tree.build(&bodies);

        let found = tree.collision_candidates(&bodies[0], 2.0);
        assert_eq!(found, vec![1]);
        assert!(tree.collision_candidates(&bodies[2], 2.0).is_empty());
    }
}
