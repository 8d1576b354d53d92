/*
 * UI Module
 *
 * This module contains functions for creating and updating the user interface
 * using nannou_egui. Behaviour weights and radii are edited in place and picked
 * up by the kernel on the next frame. Population and leader count only take
 * effect when the flock is respawned, since they size the agent buffer.
 */

use nannou_egui::{egui, Egui};

use crate::diagnostics::FrameStats;
use crate::params::FlockParameters;
use crate::pipeline::PipelineState;

// Edits that need a new pipeline
pub struct RespawnSettings {
    pub population: u32,
    pub leader_count: u32,
}

pub struct PanelStatus {
    pub flock: PipelineState,
    pub hands: PipelineState,
    pub culled_draws: u64,
    pub mean_speed: Option<f32>,
}

#[derive(Default)]
pub struct UiActions {
    pub respawn: bool,
    pub reset_camera: bool,
}

pub fn get_population_range() -> std::ops::RangeInclusive<u32> {
    0..=65_536
}

pub fn get_leader_count_range() -> std::ops::RangeInclusive<u32> {
    0..=256
}

pub fn update_ui(
    egui: &mut Egui,
    flock: &mut FlockParameters,
    respawn: &mut RespawnSettings,
    paused: &mut bool,
    stats: &FrameStats,
    status: &PanelStatus,
) -> UiActions {
    let mut actions = UiActions::default();
    let ctx = egui.begin_frame();

    egui::Window::new("Flock Controls")
        .default_pos([10.0, 10.0])
        .show(&ctx, |ui| {
            ui.collapsing("Population", |ui| {
                ui.add(egui::Slider::new(&mut respawn.population, get_population_range()).text("Agents"));
                ui.add(egui::Slider::new(&mut respawn.leader_count, get_leader_count_range()).text("Leaders"));
                if ui.button("Respawn Flock").clicked() {
                    actions.respawn = true;
                }
            });

            ui.collapsing("Flocking Behavior", |ui| {
                ui.add(egui::Slider::new(&mut flock.cohesion_weight, FlockParameters::get_weight_range()).text("Cohesion Weight"));
                ui.add(egui::Slider::new(&mut flock.alignment_weight, FlockParameters::get_weight_range()).text("Alignment Weight"));
                ui.add(egui::Slider::new(&mut flock.avoidance_weight, FlockParameters::get_weight_range()).text("Avoidance Weight"));
                ui.add(egui::Slider::new(&mut flock.neighbor_radius, FlockParameters::get_radius_range()).text("Neighbor Radius"));
                ui.add(egui::Slider::new(&mut flock.avoidance_radius, FlockParameters::get_radius_range()).text("Avoidance Radius"));
                ui.add(egui::Slider::new(&mut flock.min_distance, FlockParameters::get_min_distance_range()).text("Min Distance"));
                ui.add(egui::Slider::new(&mut flock.delta_time, FlockParameters::get_delta_time_range()).text("Delta Time"));
            });

            ui.collapsing("Camera Controls", |ui| {
                ui.label("Orbit: click and drag");
                ui.label("Zoom: mouse wheel");
                if ui.button("Reset Camera").clicked() {
                    actions.reset_camera = true;
                }
            });

            ui.collapsing("Stats", |ui| {
                ui.label(format!("FPS: {:.1}", stats.fps));
                ui.label(format!("Frame time: {:.2} ms", stats.frame_time_ms()));
                ui.label(format!("Frames submitted: {}", stats.frames_submitted));
                ui.label(format!("Dispatch groups: {:?}", stats.last_groups));
                ui.label(format!("Instances: {}", stats.last_instances));
                ui.label(format!("Culled draws: {}", status.culled_draws));
                ui.label(format!("Flock: {:?}  Hands: {:?}", status.flock, status.hands));
                if let Some(speed) = status.mean_speed {
                    ui.label(format!("Mean speed: {speed:.3}"));
                }
            });

            ui.checkbox(paused, "Pause Simulation");
        });

    actions
}
