use bevy::prelude::*;
use bevy_egui::EguiContexts;
use bevy_egui::egui;

use crate::body::{BodyKind, BodySet};
use crate::resources::{ResetSimulation, SimConfig, SimSettings};

pub fn ui_controls(
    mut contexts: EguiContexts,
    mut settings: ResMut<SimSettings>,
    mut sim_config: ResMut<SimConfig>,
    mut frames_rendered: Local<usize>,
    mut reset: ResMut<ResetSimulation>,
    bodies: Res<BodySet>,
) {
    if *frames_rendered < 5 {
        *frames_rendered += 1;
        return;
    }

    if let Ok(ctx) = contexts.ctx_mut() {
        egui::Window::new("Simulation Controls")
            .default_pos(egui::pos2(10.0, 10.0))
            .max_size([320.0, 420.0])
            .vscroll(true)
            .show(ctx, |ui| {
                ui.heading("Simulation");
                ui.label(format!(
                    "Bodies: {}   Total mass: {:.1}",
                    bodies.len(),
                    bodies.total_mass()
                ));
                ui.checkbox(&mut settings.paused, "Paused");
                ui.add(
                    egui::Slider::new(&mut settings.time_scale, 0.1..=20.0)
                        .text("Time Scale (Speed)"),
                );

                ui.separator();
                ui.heading("Gravity");
                ui.add(egui::Slider::new(&mut sim_config.g, 0.01..=1.0).text("G (Gravity)"));
                ui.add(
                    egui::Slider::new(&mut sim_config.theta, 0.05..=1.5)
                        .text("Theta (Approximation)"),
                );
                ui.checkbox(&mut sim_config.adaptive_theta, "Adaptive Theta");
                ui.add(
                    egui::Slider::new(&mut sim_config.rebuild_interval, 1..=10)
                        .text("Tree Rebuild Interval"),
                );

                ui.separator();
                ui.heading("Collisions");
                ui.checkbox(&mut sim_config.collisions_enabled, "Enable Collisions");

                ui.separator();
                ui.heading("Spawning");
                egui::ComboBox::from_label("Left-click spawns")
                    .selected_text(settings.spawn_kind.label())
                    .show_ui(ui, |ui| {
                        for kind in BodyKind::ALL {
                            ui.selectable_value(&mut settings.spawn_kind, kind, kind.label());
                        }
                    });
                ui.label("Right-click deletes a body");

                ui.separator();
                ui.heading("View");
                ui.checkbox(&mut settings.show_gizmos, "Show QuadTree Grid");
                ui.label("Pan: Arrow Keys / WASD");
                ui.label("Zoom: Scroll Wheel");

                if ui.button("Reset Simulation").clicked() {
                    reset.pending = true;
                }
            });
    }
}
