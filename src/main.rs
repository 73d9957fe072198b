mod body;
mod collision;
mod components;
mod physics;
mod quadtree;
mod resources;
mod systems;

use bevy::prelude::*;
use bevy::window::WindowResolution;
use bevy_egui::{EguiPlugin, EguiPrimaryContextPass};

use crate::body::BodySet;
use crate::physics::PhysicsSystem;
use crate::resources::{DEFAULT_DT, ResetSimulation, SimConfig, SimRng, SimSettings};
use crate::systems::*;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Celestial Sandbox".into(),
                resolution: WindowResolution::new(1000, 1000),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(EguiPlugin::default())
        .insert_resource(ClearColor(Color::BLACK))
        .init_resource::<SimConfig>()
        .init_resource::<SimSettings>()
        .init_resource::<SimRng>()
        .init_resource::<BodySet>()
        .init_resource::<PhysicsSystem>()
        .init_resource::<ResetSimulation>()
        .add_systems(EguiPrimaryContextPass, ui_controls)
        .add_systems(Startup, setup_scene)
        .add_systems(
            Update,
            (
                apply_reset_request,
                (
                    camera_controls,
                    spawn_on_click,
                    sync_body_sprites,
                    draw_quadtree_gizmos,
                )
                    .chain()
                    .after(apply_reset_request),
            ),
        )
        .add_systems(FixedUpdate, simulation_step)
        .insert_resource(Time::<Fixed>::from_seconds(DEFAULT_DT as f64))
        .run();
}
