use bevy::input::mouse::MouseWheel;
use bevy::prelude::MessageReader;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use bevy_egui::input::EguiWantsInput;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::f32::consts::TAU;

use crate::body::{BodyDesc, BodyId, BodyKind, BodySet, CelestialBody};
use crate::components::*;
use crate::physics::PhysicsSystem;
use crate::resources::*;

/// Validates `desc` and adds the body to the live set.
pub fn spawn_body(bodies: &mut BodySet, desc: BodyDesc) -> Option<BodyId> {
    let kind = desc.kind;
    match CelestialBody::new(desc) {
        Ok(body) => {
            let id = body.id();
            bodies.push(body);
            Some(id)
        }
        Err(err) => {
            warn!("rejected {}: {err}", kind.label());
            None
        }
    }
}

/// Body on a circular orbit (scaled by `speed_factor`) around the central star.
fn orbiting(kind: BodyKind, mass: f32, distance: f32, angle: f32, speed_factor: f32) -> BodyDesc {
    let direction = Vec2::from_angle(angle);
    let speed = (DEFAULT_G * CENTRAL_STAR_MASS / distance).sqrt() * speed_factor;
    BodyDesc::new(kind)
        .with_mass(mass)
        .at(direction * distance)
        .moving(direction.perp() * speed)
}

/// A central star with planets on circular orbits, a looser ring of meteors
/// and one black hole further out.
pub fn spawn_initial_bodies(bodies: &mut BodySet, rng: &mut impl Rng) {
    spawn_body(bodies, BodyDesc::new(BodyKind::Star).with_mass(CENTRAL_STAR_MASS));

    for _ in 0..NUM_PLANETS {
        let mass = rng.random_range(1.0..10.0);
        let distance = rng.random_range(80.0..400.0);
        let angle = rng.random_range(0.0..TAU);
        spawn_body(bodies, orbiting(BodyKind::Planet, mass, distance, angle, 1.0));
    }

    for _ in 0..NUM_METEORS {
        let mass = rng.random_range(0.2..1.0);
        let distance = rng.random_range(450.0..650.0);
        let angle = rng.random_range(0.0..TAU);
        let speed_factor = rng.random_range(0.7..1.1);
        spawn_body(
            bodies,
            orbiting(BodyKind::Meteor, mass, distance, angle, speed_factor),
        );
    }

    let angle = rng.random_range(0.0..TAU);
    spawn_body(
        bodies,
        orbiting(BodyKind::BlackHole, 2000.0, 750.0, angle, 0.9),
    );
}

/// Sets up camera, the shared body mesh and the initial scene.
pub fn setup_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut bodies: ResMut<BodySet>,
    mut rng: ResMut<SimRng>,
) {
    commands.spawn((
        Camera2d,
        Transform::from_scale(Vec3::splat(INITIAL_CAMERA_SCALE)),
    ));
    commands.insert_resource(BodyMesh(meshes.add(Circle::new(1.0))));
    spawn_initial_bodies(&mut bodies, &mut rng.0);
    info!("spawned {} bodies", bodies.len());
}

/// One fixed step: forces and collisions, then integration.
pub fn simulation_step(
    mut bodies: ResMut<BodySet>,
    mut physics: ResMut<PhysicsSystem>,
    mut rng: ResMut<SimRng>,
    config: Res<SimConfig>,
    settings: Res<SimSettings>,
) {
    if settings.paused {
        return;
    }

    let report = physics.step(&mut bodies.0, &config, &mut rng.0);
    if report.collisions > 0 {
        debug!(
            "step (rebuilt: {}): {} collisions, {} removed, {} spawned",
            report.rebuilt, report.collisions, report.removed, report.spawned
        );
    }
    bodies.integrate(config.dt * settings.time_scale);
}

fn layer(kind: BodyKind) -> f32 {
    match kind {
        BodyKind::Star => 0.0,
        BodyKind::Planet => 1.0,
        BodyKind::Meteor => 2.0,
        BodyKind::BlackHole => 3.0,
    }
}

fn body_transform(body: &CelestialBody) -> Transform {
    Transform::from_translation(body.position.extend(layer(body.kind)))
        .with_scale(Vec3::splat(body.radius))
}

/// Keeps one circle per live body: moves and resizes existing sprites,
/// despawns those whose body is gone and spawns sprites for new bodies.
pub fn sync_body_sprites(
    mut commands: Commands,
    mut materials: ResMut<Assets<ColorMaterial>>,
    mesh: Res<BodyMesh>,
    bodies: Res<BodySet>,
    mut sprites: Query<(Entity, &BodySprite, &mut Transform)>,
) {
    let live: HashMap<BodyId, &CelestialBody> =
        bodies.iter().map(|body| (body.id(), body)).collect();
    let mut drawn = HashSet::with_capacity(live.len());

    for (entity, sprite, mut transform) in &mut sprites {
        match live.get(&**sprite) {
            Some(body) => {
                *transform = body_transform(body);
                drawn.insert(**sprite);
            }
            None => commands.entity(entity).despawn(),
        }
    }

    for body in bodies.iter().filter(|body| !drawn.contains(&body.id())) {
        commands.spawn((
            Mesh2d(mesh.0.clone()),
            MeshMaterial2d(materials.add(ColorMaterial::from(body.color))),
            body_transform(body),
            BodySprite(body.id()),
        ));
    }
}

fn cursor_world_position(
    windows: &Query<&Window, With<PrimaryWindow>>,
    cameras: &Query<(&Camera, &GlobalTransform)>,
) -> Option<Vec2> {
    let window = windows.single().ok()?;
    let cursor = window.cursor_position()?;
    let (camera, camera_transform) = cameras.single().ok()?;
    camera.viewport_to_world_2d(camera_transform, cursor).ok()
}

/// Left click places a body of the selected kind, right click deletes the
/// body under the cursor.
pub fn spawn_on_click(
    mouse: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    cameras: Query<(&Camera, &GlobalTransform)>,
    egui_input: Res<EguiWantsInput>,
    settings: Res<SimSettings>,
    mut bodies: ResMut<BodySet>,
) {
    if egui_input.wants_any_pointer_input() {
        return;
    }

    let place = mouse.just_pressed(MouseButton::Left);
    let delete = mouse.just_pressed(MouseButton::Right);
    if !place && !delete {
        return;
    }

    let Some(point) = cursor_world_position(&windows, &cameras) else {
        return;
    };

    if place {
        let kind = settings.spawn_kind;
        let desc = BodyDesc::new(kind).with_mass(kind.default_mass()).at(point);
        if let Some(id) = spawn_body(&mut bodies, desc) {
            info!("placed {} {id}", kind.label());
        }
    } else if let Some(id) = bodies.body_at(point) {
        bodies.remove(id);
        info!("deleted body {id}");
    }
}

/// Pans with WASD / arrow keys and zooms with the scroll wheel.
pub fn camera_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut mouse_wheel: MessageReader<MouseWheel>,
    mut query: Query<&mut Transform, With<Camera>>,
    time: Res<Time>,
    egui_input: Res<EguiWantsInput>,
) {
    let Ok(mut transform) = query.single_mut() else {
        return;
    };

    let mut scale = transform.scale.x;
    if !egui_input.wants_any_pointer_input() {
        for event in mouse_wheel.read() {
            if event.y > 0.0 {
                scale /= 1.1;
            } else if event.y < 0.0 {
                scale *= 1.1;
            }
        }
    }

    let bindings = [
        (KeyCode::KeyA, KeyCode::ArrowLeft, Vec3::NEG_X),
        (KeyCode::KeyD, KeyCode::ArrowRight, Vec3::X),
        (KeyCode::KeyW, KeyCode::ArrowUp, Vec3::Y),
        (KeyCode::KeyS, KeyCode::ArrowDown, Vec3::NEG_Y),
    ];
    let direction: Vec3 = bindings
        .iter()
        .filter(|(key, arrow, _)| keyboard.pressed(*key) || keyboard.pressed(*arrow))
        .map(|(_, _, step)| *step)
        .sum();

    if direction != Vec3::ZERO {
        transform.translation += direction.normalize() * 500.0 * scale * time.delta_secs();
    }
    transform.scale = Vec3::splat(scale.clamp(0.1, 20.0));
}

/// Outlines internal quadtree nodes when gizmo display is enabled.
pub fn draw_quadtree_gizmos(
    mut gizmos: Gizmos,
    physics: Res<PhysicsSystem>,
    settings: Res<SimSettings>,
) {
    if !settings.show_gizmos {
        return;
    }

    let color = Color::srgba(0.0, 1.0, 0.0, 0.1);
    for node in physics
        .tree()
        .live_nodes()
        .iter()
        .filter(|node| !node.is_leaf && node.bounds.size.x >= MIN_GIZMO_NODE_SIZE)
    {
        gizmos.rect_2d(
            Isometry2d::from_translation(node.bounds.center),
            node.bounds.size,
            color,
        );
    }
}

/// Responds to a pending reset: restores defaults and respawns the scene.
/// Sprites of the old bodies are cleaned up by [`sync_body_sprites`].
pub fn apply_reset_request(
    mut reset: ResMut<ResetSimulation>,
    mut settings: ResMut<SimSettings>,
    mut sim_config: ResMut<SimConfig>,
    mut bodies: ResMut<BodySet>,
    mut physics: ResMut<PhysicsSystem>,
    mut rng: ResMut<SimRng>,
) {
    if !reset.pending {
        return;
    }
    reset.pending = false;

    *settings = SimSettings::default();
    *sim_config = SimConfig::default();
    *physics = PhysicsSystem::default();
    bodies.clear();
    spawn_initial_bodies(&mut bodies, &mut rng.0);
    info!("simulation reset with {} bodies", bodies.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::ecs::system::SystemState;
    use rand::{SeedableRng, rngs::StdRng};

    fn world_with_bodies(bodies: Vec<CelestialBody>) -> World {
        let mut world = World::new();
        world.insert_resource(BodySet(bodies));
        world.insert_resource(PhysicsSystem::default());
        world.insert_resource(SimConfig::default());
        world.insert_resource(SimSettings::default());
        world.insert_resource(SimRng(StdRng::seed_from_u64(17)));
        world
    }

    fn run_simulation_step(world: &mut World) {
        let mut system_state: SystemState<(
            ResMut<BodySet>,
            ResMut<PhysicsSystem>,
            ResMut<SimRng>,
            Res<SimConfig>,
            Res<SimSettings>,
        )> = SystemState::new(world);

        {
            let (bodies, physics, rng, config, settings) = system_state.get_mut(world);
            simulation_step(bodies, physics, rng, config, settings);
        }
        system_state.apply(world);
    }

    #[test]
    fn simulation_step_accelerates_and_integrates() {
        let a = CelestialBody::new(BodyDesc::new(BodyKind::Planet).with_mass(1.0)).unwrap();
        let b = CelestialBody::new(
            BodyDesc::new(BodyKind::Planet)
                .with_mass(2.0)
                .at(vec2(10.0, 0.0))
                .moving(vec2(0.0, 3.0)),
        )
        .unwrap();
        let mut world = world_with_bodies(vec![a, b]);

        run_simulation_step(&mut world);

        let bodies = world.resource::<BodySet>();
        assert!(bodies[0].acceleration.x > 0.0);
        assert!(bodies[1].acceleration.x < 0.0);
        // Position moved with the old velocity, velocity picked up the pull.
        assert!((bodies[1].position - vec2(10.0, 3.0 * DEFAULT_DT)).length() < 1e-6);
        assert!(bodies[0].velocity.x > 0.0);
    }

    #[test]
    fn paused_simulation_does_not_move() {
        let a = CelestialBody::new(
            BodyDesc::new(BodyKind::Meteor)
                .with_mass(1.0)
                .moving(vec2(5.0, 0.0)),
        )
        .unwrap();
        let mut world = world_with_bodies(vec![a]);
        world.resource_mut::<SimSettings>().paused = true;

        run_simulation_step(&mut world);

        assert_eq!(world.resource::<BodySet>()[0].position, Vec2::ZERO);
    }

    #[test]
    fn initial_scene_is_valid() {
        let mut bodies = BodySet::default();
        let mut rng = StdRng::seed_from_u64(4);
        spawn_initial_bodies(&mut bodies, &mut rng);

        assert_eq!(bodies.len(), 1 + NUM_PLANETS + NUM_METEORS + 1);
        assert_eq!(
            bodies
                .iter()
                .filter(|body| body.kind == BodyKind::BlackHole)
                .count(),
            1
        );
        assert!(bodies.iter().all(|body| body.mass > 0.0 && body.radius > 0.0));
    }

    #[test]
    fn sprites_follow_the_body_set() {
        let planet = CelestialBody::new(
            BodyDesc::new(BodyKind::Planet)
                .with_mass(5.0)
                .at(vec2(3.0, 4.0)),
        )
        .unwrap();
        let star = CelestialBody::new(BodyDesc::new(BodyKind::Star).with_mass(500.0)).unwrap();
        let star_id = star.id();

        let mut world = World::new();
        world.insert_resource(BodySet(vec![planet, star]));
        world.insert_resource(BodyMesh(Handle::default()));
        world.init_resource::<Assets<ColorMaterial>>();

        let mut system_state: SystemState<(
            Commands,
            ResMut<Assets<ColorMaterial>>,
            Res<BodyMesh>,
            Res<BodySet>,
            Query<(Entity, &BodySprite, &mut Transform)>,
        )> = SystemState::new(&mut world);

        let mut run = |world: &mut World| {
            {
                let (commands, materials, mesh, bodies, sprites) = system_state.get_mut(world);
                sync_body_sprites(commands, materials, mesh, bodies, sprites);
            }
            system_state.apply(world);
        };

        run(&mut world);
        let mut query = world.query::<(&BodySprite, &Transform)>();
        assert_eq!(query.iter(&world).count(), 2);

        world.resource_mut::<BodySet>().remove(star_id);
        run(&mut world);

        let remaining: Vec<_> = query.iter(&world).collect();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].1.translation.truncate(), vec2(3.0, 4.0));
    }
}
