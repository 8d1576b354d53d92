use std::cell::RefCell;
use std::rc::Rc;

use flock_indirect::agent::AgentRecord;
use flock_indirect::context::{FrameReport, PipelineAssets};
use flock_indirect::headless::{HeadlessHost, HostCall};
use flock_indirect::host::{BufferKind, Stage, Uniform, UniformValue};
use flock_indirect::mesh::MeshData;
use flock_indirect::params::uniform_names;
use flock_indirect::population::{FOLLOWER_SCALE, HAND_AVATAR_SCALE, LEADER_SCALE};
use flock_indirect::{
    record_size, Bounds, FlockParameters, HandParameters, IndirectPipeline, VelocityProbe,
    KERNEL_ENTRY_POINT, PROPERTIES_SLOT,
};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn flock_params(population: u32) -> FlockParameters {
    FlockParameters {
        population,
        leader_count: 27,
        range: 10.0,
        ..FlockParameters::default()
    }
}

fn assets(host: &mut HeadlessHost, mesh: MeshData) -> PipelineAssets<HeadlessHost> {
    let shader = host.add_shader(&[KERNEL_ENTRY_POINT]);
    let material = host.add_material();
    PipelineAssets { mesh, material, shader }
}

fn rng() -> StdRng {
    StdRng::seed_from_u64(7)
}

fn agents_of(host: &HeadlessHost, pipeline_buffer: &flock_indirect::headless::HeadlessBuffer) -> Vec<AgentRecord> {
    bytemuck::pod_collect_to_vec(host.buffer_contents(pipeline_buffer).unwrap())
}

fn created(host: &HeadlessHost) -> Vec<(&'static str, u64, BufferKind)> {
    host.calls()
        .iter()
        .filter_map(|c| match c {
            HostCall::CreateBuffer { label, bytes, kind, .. } => Some((*label, *bytes, *kind)),
            _ => None,
        })
        .collect()
}

#[test]
fn flock_of_128_with_27_leaders() {
    let mut host = HeadlessHost::new();
    let assets = assets(&mut host, MeshData::octahedron());
    let mut flock = IndirectPipeline::new(assets, flock_params(128));
    flock.start(&mut host, Vec3::ZERO, &mut rng()).unwrap();

    let sizes: Vec<_> = created(&host).into_iter().map(|(_, bytes, kind)| (bytes, kind)).collect();
    assert_eq!(
        sizes,
        vec![
            (20, BufferKind::IndirectArguments),
            (128 * record_size() as u64, BufferKind::Structured),
        ]
    );

    let ctx = flock.context().unwrap();
    assert_eq!(ctx.args.instance_count, 128);
    assert_eq!(ctx.args.index_count, 24);

    let agents = agents_of(&host, ctx.agents.raw().unwrap());
    assert_eq!(agents.len(), 128);
    for (i, agent) in agents[..27].iter().enumerate() {
        assert!((agent.uniform_scale() - LEADER_SCALE).abs() < 1e-5, "leader {i}");
    }
    for agent in &agents[27..101] {
        assert!((agent.uniform_scale() - FOLLOWER_SCALE).abs() < 1e-5);
    }

    host.clear_calls();
    let report = flock.frame(&mut host).unwrap();
    assert_eq!(report, FrameReport::Submitted { groups: [2, 1, 1], instances: 128 });
    assert!(host
        .calls()
        .iter()
        .any(|c| matches!(c, HostCall::Dispatch { groups: [2, 1, 1], .. })));
    assert!(host.calls().iter().any(|c| matches!(
        c,
        HostCall::DrawIndirect { submesh: 0, args: Some([24, 128, 0, 0, 0]), .. }
    )));

    flock.stop(&mut host);
}

#[test]
fn zero_population_draws_nothing() {
    let mut host = HeadlessHost::new();
    let assets = assets(&mut host, MeshData::octahedron());
    let mut flock = IndirectPipeline::new(assets, flock_params(0));
    flock.start(&mut host, Vec3::ZERO, &mut rng()).unwrap();

    assert_eq!(created(&host)[1], ("properties", 0, BufferKind::Structured));

    host.clear_calls();
    let report = flock.frame(&mut host).unwrap();
    assert_eq!(report, FrameReport::Submitted { groups: [0, 1, 1], instances: 0 });
    assert!(host.calls().iter().any(|c| matches!(
        c,
        HostCall::DrawIndirect { args: Some([24, 0, 0, 0, 0]), .. }
    )));

    flock.stop(&mut host);
    assert_eq!(host.live_buffer_count(), 0);
}

#[test]
fn every_frame_pushes_uniforms_then_dispatches_then_draws() {
    let mut host = HeadlessHost::new();
    let assets = assets(&mut host, MeshData::octahedron());
    let mut flock = IndirectPipeline::new(assets, flock_params(65));
    flock.start(&mut host, Vec3::ZERO, &mut rng()).unwrap();

    for _ in 0..3 {
        host.clear_calls();
        flock.frame(&mut host).unwrap();

        let calls = host.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], HostCall::SetUniforms { .. }));
        assert!(matches!(calls[1], HostCall::Dispatch { groups: [2, 1, 1], .. }));
        assert!(matches!(calls[2], HostCall::DrawIndirect { .. }));

        let HostCall::SetUniforms { uniforms, .. } = &calls[0] else {
            unreachable!();
        };
        assert_eq!(uniforms.len(), 10);
        assert_eq!(uniforms[0], Uniform::uint(uniform_names::POPULATION, 65));
        assert_eq!(uniforms[8], Uniform::vec3(uniform_names::BOUNDS_SIZE, [11.0; 3]));
        assert_eq!(uniforms[9], Uniform::uint(uniform_names::LEADER_COUNT, 27));
    }

    flock.stop(&mut host);
}

#[test]
fn tuned_weights_reach_the_kernel_on_the_next_frame() {
    let mut host = HeadlessHost::new();
    let assets = assets(&mut host, MeshData::octahedron());
    let mut flock = IndirectPipeline::new(assets, flock_params(64));
    flock.start(&mut host, Vec3::ZERO, &mut rng()).unwrap();

    flock.settings_mut().cohesion_weight = 2.5;
    flock.frame(&mut host).unwrap();

    let kernel = flock.context().unwrap().kernel;
    let uniforms = host.last_uniforms(kernel).unwrap();
    let cohesion = uniforms
        .iter()
        .find(|u| u.name == uniform_names::COHESION_WEIGHT)
        .unwrap();
    assert_eq!(cohesion.value, UniformValue::Float(2.5));

    flock.stop(&mut host);
}

#[test]
fn draw_uses_the_precomputed_bounds_and_fixed_args() {
    let mut host = HeadlessHost::new();
    let assets = assets(&mut host, MeshData::octahedron());
    let mut flock = IndirectPipeline::new(assets, flock_params(100));
    let origin = Vec3::new(3.0, -2.0, 1.0);
    flock.start(&mut host, origin, &mut rng()).unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        host.clear_calls();
        flock.frame(&mut host).unwrap();
        for call in host.calls() {
            if let HostCall::DrawIndirect { bounds, args, .. } = call {
                seen.push((*bounds, *args));
            }
        }
    }

    assert_eq!(seen.len(), 4);
    let expected = (Bounds::from_range(origin, 10.0), Some([24, 100, 0, 0, 0]));
    assert!(seen.iter().all(|s| *s == expected));

    flock.stop(&mut host);
}

#[test]
fn kernel_writes_are_what_the_renderer_reads() {
    let mut host = HeadlessHost::new();
    let assets = assets(&mut host, MeshData::octahedron());
    let mut flock = IndirectPipeline::new(assets, flock_params(64));
    flock.start(&mut host, Vec3::ZERO, &mut rng()).unwrap();

    let kernel = flock.context().unwrap().kernel;
    host.set_kernel_program(kernel, |uniforms: &[Uniform], agents: &mut [AgentRecord]| {
        let UniformValue::Float(dt) = uniforms[1].value else {
            return;
        };
        for agent in agents.iter_mut() {
            agent.velocity = [dt, 0.0, 0.0];
        }
    });

    flock.frame(&mut host).unwrap();

    let agents = agents_of(&host, flock.context().unwrap().agents.raw().unwrap());
    assert!(agents.iter().all(|a| a.velocity == [0.02, 0.0, 0.0]));

    flock.stop(&mut host);
}

#[test]
fn diagnostics_sink_sees_every_nth_frame() {
    let mut host = HeadlessHost::new();
    let assets = assets(&mut host, MeshData::octahedron());
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = {
        let seen = Rc::clone(&seen);
        move |frame: u64, agents: &[AgentRecord]| seen.borrow_mut().push((frame, agents.len()))
    };

    let mut flock = IndirectPipeline::new(assets, flock_params(128)).with_diagnostics(sink, 2);
    flock.start(&mut host, Vec3::ZERO, &mut rng()).unwrap();
    for _ in 0..5 {
        flock.frame(&mut host).unwrap();
    }

    assert_eq!(*seen.borrow(), vec![(0, 128), (2, 128), (4, 128)]);
    let reads = host
        .calls()
        .iter()
        .filter(|c| matches!(c, HostCall::ReadBuffer { .. }))
        .count();
    assert_eq!(reads, 3);

    flock.stop(&mut host);
}

#[test]
fn velocity_probe_tracks_kernel_output() {
    let mut host = HeadlessHost::new();
    let assets = assets(&mut host, MeshData::octahedron());
    let probe = Rc::new(RefCell::new(VelocityProbe::new()));
    let sink = {
        let probe = Rc::clone(&probe);
        move |frame: u64, agents: &[AgentRecord]| {
            use flock_indirect::DiagnosticsSink;
            probe.borrow_mut().observe(frame, agents)
        }
    };

    let mut flock = IndirectPipeline::new(assets, flock_params(10)).with_diagnostics(sink, 1);
    flock.start(&mut host, Vec3::ZERO, &mut rng()).unwrap();
    let kernel = flock.context().unwrap().kernel;
    host.set_kernel_program(kernel, |_: &[Uniform], agents: &mut [AgentRecord]| {
        for agent in agents.iter_mut() {
            agent.velocity = [0.0, 3.0, 4.0];
        }
    });

    flock.frame(&mut host).unwrap();
    assert_eq!(probe.borrow().frame(), Some(0));
    assert_eq!(probe.borrow().velocities().len(), 10);
    assert!((probe.borrow().mean_speed() - 5.0).abs() < 1e-6);

    flock.stop(&mut host);
}

#[test]
fn hand_avatars_push_count_and_bounds_only() {
    let mut host = HeadlessHost::new();
    let assets = assets(&mut host, MeshData::dart());
    let mut hands = IndirectPipeline::new(assets, HandParameters { count: 2, range: 10.0 });
    hands.start(&mut host, Vec3::ZERO, &mut rng()).unwrap();

    let agents = agents_of(&host, hands.context().unwrap().agents.raw().unwrap());
    assert_eq!(agents.len(), 2);
    for agent in &agents {
        assert!((agent.uniform_scale() - HAND_AVATAR_SCALE).abs() < 1e-4);
        assert_eq!(agent.color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(agent.velocity, [0.0; 3]);
    }

    host.clear_calls();
    let report = hands.frame(&mut host).unwrap();
    assert_eq!(report, FrameReport::Submitted { groups: [1, 1, 1], instances: 2 });

    let kernel = hands.context().unwrap().kernel;
    assert_eq!(
        host.last_uniforms(kernel).unwrap(),
        &[
            Uniform::uint(uniform_names::COUNT, 2),
            Uniform::vec3(uniform_names::BOUNDS_SIZE, [11.0; 3]),
        ]
    );

    hands.stop(&mut host);
}

#[test]
fn two_pipelines_share_one_host() {
    let mut host = HeadlessHost::new();
    let flock_assets = assets(&mut host, MeshData::octahedron());
    let hand_assets = assets(&mut host, MeshData::dart());
    let mut flock = IndirectPipeline::new(flock_assets, flock_params(256));
    let mut hands = IndirectPipeline::new(hand_assets, HandParameters::default());

    let mut rng = rng();
    flock.start(&mut host, Vec3::ZERO, &mut rng).unwrap();
    hands.start(&mut host, Vec3::ZERO, &mut rng).unwrap();
    assert_eq!(host.live_buffer_count(), 4);
    assert_eq!(host.bound_slot_count(), 4);

    flock.frame(&mut host).unwrap();
    hands.frame(&mut host).unwrap();

    flock.stop(&mut host);
    assert_eq!(host.live_buffer_count(), 2);
    assert_eq!(hands.frame(&mut host).unwrap(), FrameReport::Submitted { groups: [1, 1, 1], instances: 2 });

    hands.stop(&mut host);
    assert_eq!(host.live_buffer_count(), 0);
}

#[test]
fn respawned_flock_draws_on_its_first_frame() {
    let mut host = HeadlessHost::new();
    let old_assets = assets(&mut host, MeshData::octahedron());
    let material = old_assets.material;

    let mut old = IndirectPipeline::new(old_assets, flock_params(128));
    old.start(&mut host, Vec3::ZERO, &mut rng()).unwrap();
    old.frame(&mut host).unwrap();
    old.stop(&mut host);

    // Same material, fresh kernel and buffers
    let new_assets = PipelineAssets {
        mesh: MeshData::octahedron(),
        material,
        shader: host.add_shader(&[KERNEL_ENTRY_POINT]),
    };
    let mut new = IndirectPipeline::new(new_assets, flock_params(64));
    new.start(&mut host, Vec3::ZERO, &mut rng()).unwrap();
    host.clear_calls();
    new.frame(&mut host).unwrap();

    let ctx = new.context().unwrap();
    let args_id = ctx.arguments.raw().unwrap().id();
    assert!(host.calls().iter().any(|c| matches!(
        c,
        HostCall::DrawIndirect { args_buffer, args: Some([24, 64, 0, 0, 0]), .. } if *args_buffer == args_id
    )));
    assert_eq!(
        host.bound_buffer(Stage::Render(material), PROPERTIES_SLOT),
        Some(ctx.agents.raw().unwrap().id())
    );

    new.stop(&mut host);
    assert_eq!(host.live_kernel_count(), 0);
}
