/*
 * Application Module
 *
 * This module defines the nannou application model for the flock viewer.
 * It owns the wgpu host and two indirect pipelines:
 * - the flock: leaders and followers steered by the flock kernel
 * - the hand avatars: a couple of large, still markers
 *
 * Each update pushes the camera, then runs one frame of both pipelines
 * (dispatch now, draw queued). The view encodes the queued draws and the
 * egui panel. Pausing skips the pipeline frames and keeps re-drawing the
 * last queued draws; a respawn while paused runs the new flock for one frame
 * so it has a draw to show.
 */

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;
use nannou::prelude::*;
use nannou::wgpu;
use nannou_egui::Egui;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::agent::AgentRecord;
use crate::bounds::Bounds;
use crate::camera::Camera;
use crate::config::AppConfig;
use crate::context::PipelineAssets;
use crate::diagnostics::{DiagnosticsSink, FrameStats, VelocityProbe};
use crate::input;
use crate::mesh::MeshData;
use crate::params::{FlockParameters, HandParameters};
use crate::pipeline::IndirectPipeline;
use crate::simulation::AgentSimulation;
use crate::ui::{self, PanelStatus, RespawnSettings};
use crate::wgpu_host::{uniform_block_size, MaterialId, WgpuHost, WgpuMesh};
use crate::KERNEL_ENTRY_POINT;

pub type FlockPipeline = IndirectPipeline<WgpuHost, FlockParameters>;
pub type HandPipeline = IndirectPipeline<WgpuHost, HandParameters>;

// Both populations are centred on the world origin
const WORLD_ORIGIN: Vec3 = Vec3::ZERO;

// Main model for the application
pub struct Model {
    pub host: WgpuHost,
    pub flock: FlockPipeline,
    pub hands: HandPipeline,
    pub flock_material: MaterialId,
    pub egui: Egui,
    pub camera: Camera,
    pub mouse_position: glam::Vec2,
    pub stats: FrameStats,
    pub paused: bool,
    pub respawn: RespawnSettings,
    pub probe: Rc<RefCell<VelocityProbe>>,
    pub diagnostics_interval: Option<u64>,
    pub rng: StdRng,
}

// Initialize the model
pub fn model(app: &App) -> Model {
    let config = AppConfig::from_env();

    let window_id = app
        .new_window()
        .title("Flock Indirect")
        .size(1280, 800)
        .view(view)
        .mouse_moved(input::mouse_moved)
        .mouse_pressed(input::mouse_pressed)
        .mouse_released(input::mouse_released)
        .mouse_wheel(input::mouse_wheel)
        .raw_event(input::raw_window_event)
        .build()
        .expect("Failed to create window");

    let window = app.window(window_id).expect("Window was just created");
    let egui = Egui::from_window(&window);

    let mut host = WgpuHost::new(window.device_queue_pair().clone());
    let sample_count = window.msaa_samples();
    let flock_material = host.create_material(
        &wgpu::include_wgsl!("shaders/agent_vs.wgsl"),
        &wgpu::include_wgsl!("shaders/agent_fs.wgsl"),
        Frame::TEXTURE_FORMAT,
        sample_count,
    );
    let hand_material = host.create_material(
        &wgpu::include_wgsl!("shaders/agent_vs.wgsl"),
        &wgpu::include_wgsl!("shaders/agent_fs.wgsl"),
        Frame::TEXTURE_FORMAT,
        sample_count,
    );
    drop(window);

    let flock_mesh = host.upload_mesh(&MeshData::octahedron());
    let hand_mesh = host.upload_mesh(&MeshData::dart());

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let probe = Rc::new(RefCell::new(VelocityProbe::new()));
    let respawn = RespawnSettings {
        population: config.flock.population,
        leader_count: config.flock.leader_count,
    };

    let flock = spawn_flock(
        &mut host,
        config.flock,
        flock_material,
        flock_mesh,
        &mut rng,
        probe_sink(&probe, config.diagnostics_interval),
    );

    let hand_assets = PipelineAssets {
        shader: host.load_compute_shader(
            &wgpu::include_wgsl!("shaders/hand.wgsl"),
            &[KERNEL_ENTRY_POINT],
            uniform_size(&config.hands),
        ),
        mesh: hand_mesh,
        material: hand_material,
    };
    let mut hands = IndirectPipeline::new(hand_assets, config.hands);
    start_or_log(&mut hands, &mut host, &mut rng);

    Model {
        host,
        flock,
        hands,
        flock_material,
        egui,
        camera: Camera::new(),
        mouse_position: glam::Vec2::ZERO,
        stats: FrameStats::default(),
        paused: false,
        respawn,
        probe,
        diagnostics_interval: config.diagnostics_interval,
        rng,
    }
}

fn uniform_size<S: AgentSimulation>(settings: &S) -> u64 {
    uniform_block_size(&settings.uniforms(&Bounds::from_range(WORLD_ORIGIN, settings.range())))
}

fn probe_sink(
    probe: &Rc<RefCell<VelocityProbe>>,
    interval: Option<u64>,
) -> Option<(impl DiagnosticsSink + 'static, u64)> {
    let probe = Rc::clone(probe);
    interval.map(move |every| {
        let sink = move |frame: u64, agents: &[AgentRecord]| probe.borrow_mut().observe(frame, agents);
        (sink, every)
    })
}

fn spawn_flock(
    host: &mut WgpuHost,
    settings: FlockParameters,
    material: MaterialId,
    mesh: WgpuMesh,
    rng: &mut StdRng,
    diagnostics: Option<(impl DiagnosticsSink + 'static, u64)>,
) -> FlockPipeline {
    let shader = host.load_compute_shader(
        &wgpu::include_wgsl!("shaders/flock.wgsl"),
        &[KERNEL_ENTRY_POINT],
        uniform_size(&settings),
    );

    let mut flock = IndirectPipeline::new(PipelineAssets { mesh, material, shader }, settings);
    if let Some((sink, every)) = diagnostics {
        flock = flock.with_diagnostics(sink, every);
    }

    start_or_log(&mut flock, host, rng);
    flock
}

fn start_or_log<S: AgentSimulation>(
    pipeline: &mut IndirectPipeline<WgpuHost, S>,
    host: &mut WgpuHost,
    rng: &mut StdRng,
) {
    if let Err(err) = pipeline.start(host, WORLD_ORIGIN, rng) {
        tracing::error!(pipeline = pipeline.settings().label(), error = %err, "failed to start pipeline");
    }
}

// Replace the flock with a freshly seeded one at the requested size
fn respawn_flock(model: &mut Model) {
    model.flock.stop(&mut model.host);

    let mut settings = model.flock.settings().clone();
    settings.population = model.respawn.population;
    settings.leader_count = model.respawn.leader_count;
    let mesh = model.flock.assets().mesh.clone();

    model.flock = spawn_flock(
        &mut model.host,
        settings,
        model.flock_material,
        mesh,
        &mut model.rng,
        probe_sink(&model.probe, model.diagnostics_interval),
    );
    tracing::info!(population = model.respawn.population, "flock respawned");
}

// Update the model
pub fn update(app: &App, model: &mut Model, update: Update) {
    model.stats.record_timing(app.fps(), update.since_last);

    let mean_speed = {
        let probe = model.probe.borrow();
        let speed = probe.frame().map(|_| probe.mean_speed());
        speed
    };
    let status = PanelStatus {
        flock: model.flock.state(),
        hands: model.hands.state(),
        culled_draws: model.host.culled_draws(),
        mean_speed,
    };
    let actions = ui::update_ui(
        &mut model.egui,
        model.flock.settings_mut(),
        &mut model.respawn,
        &mut model.paused,
        &model.stats,
        &status,
    );

    if actions.reset_camera {
        model.camera.reset();
    }
    if actions.respawn {
        respawn_flock(model);
    }

    let rect = app.window_rect();
    let aspect = rect.w() / rect.h().max(1.0);
    model.host.set_view_projection(model.camera.view_projection(aspect));

    if model.paused {
        // Releasing the old flock dropped its queued draw; queue the new one
        if actions.respawn {
            flock_frame(model);
        }
        return;
    }

    model.host.begin_frame();
    flock_frame(model);
    if let Err(err) = model.hands.frame(&mut model.host) {
        tracing::error!(pipeline = "hand_avatars", error = %err, "frame failed");
    }
}

fn flock_frame(model: &mut Model) {
    match model.flock.frame(&mut model.host) {
        Ok(report) => model.stats.record(report),
        Err(err) => tracing::error!(pipeline = "flock", error = %err, "frame failed"),
    }
}

// Render the model
pub fn view(_app: &App, model: &Model, frame: Frame) {
    frame.clear(DARKSLATEGRAY);
    model.host.encode_draws(&frame);

    // Draw the egui UI
    if let Err(err) = model.egui.draw_to_frame(&frame) {
        tracing::warn!(error = ?err, "failed to draw ui");
    }
}

// Release both pipelines before the device goes away
pub fn exit(_app: &App, mut model: Model) {
    model.flock.stop(&mut model.host);
    model.hands.stop(&mut model.host);
}
